use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::domain::{
    ComponentId, ComponentWeight, GradedItem, GradedScore, ItemId, ScoreStatus, StudentId,
    WeightPolicy,
};
use super::errors::ConfigurationError;
use super::outcome::StatusCounts;

/// Allowed deviation from 100 for a strict weight set.
pub const WEIGHT_TOLERANCE: f64 = 0.01;

/// Raw and maximum point totals a student accumulated in one component.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComponentTotals {
    pub raw_total: f64,
    pub max_total: f64,
    pub status_counts: StatusCounts,
}

impl ComponentTotals {
    /// Percentage earned in this component. A component with no eligible
    /// (non-excused) items yields zero rather than an error.
    pub fn percent(&self) -> f64 {
        if self.max_total > 0.0 {
            self.raw_total / self.max_total * 100.0
        } else {
            0.0
        }
    }

    fn absorb(&mut self, score: &GradedScore, max_points: f64) {
        match score.status {
            ScoreStatus::Present => {
                self.raw_total += score.points_earned.unwrap_or(0.0);
                self.max_total += max_points;
                self.status_counts.present += 1;
            }
            ScoreStatus::Missing => {
                self.max_total += max_points;
                self.status_counts.missing += 1;
            }
            ScoreStatus::Absent => {
                self.max_total += max_points;
                self.status_counts.absent += 1;
            }
            // Excused scores leave both the numerator and the denominator.
            ScoreStatus::Excused => {
                self.status_counts.excused += 1;
            }
        }
    }
}

/// Per-component totals for one student.
pub type StudentTotals = BTreeMap<ComponentId, ComponentTotals>;

/// Fold graded scores into per-student, per-component totals, honoring the
/// as-of snapshot boundary: scores recorded after `as_of` are invisible.
///
/// The status policy is a fixed business rule: present scores contribute
/// points and max, missing/absent contribute zero against max, excused
/// scores are excluded from both sides of the ratio.
pub fn aggregate_scores(
    items: &[GradedItem],
    scores: &[GradedScore],
    as_of: DateTime<Utc>,
) -> BTreeMap<StudentId, StudentTotals> {
    let item_index: BTreeMap<&ItemId, &GradedItem> =
        items.iter().map(|item| (&item.id, item)).collect();

    let mut totals: BTreeMap<StudentId, StudentTotals> = BTreeMap::new();
    for score in scores {
        if score.created_at > as_of {
            continue;
        }
        let Some(item) = item_index.get(&score.item_id) else {
            continue;
        };

        totals
            .entry(score.student_id.clone())
            .or_default()
            .entry(item.component_id.clone())
            .or_default()
            .absorb(score, item.max_points);
    }

    totals
}

/// Validate the weight set once per run, before any per-student work.
///
/// Strict: the sum must land within [`WEIGHT_TOLERANCE`] of 100, otherwise
/// the run fails carrying the exact sum. Normalize: any positive sum is
/// accepted and later used as the rescaling basis. Returns the total weight.
pub fn reconcile_weights(
    policy: WeightPolicy,
    profile_key: &str,
    weights: &[ComponentWeight],
) -> Result<f64, ConfigurationError> {
    let total: f64 = weights.iter().map(|weight| weight.weight_percent).sum();

    if weights.is_empty() || total <= 0.0 {
        return Err(ConfigurationError::NoActiveWeights {
            profile_key: profile_key.to_string(),
        });
    }

    match policy {
        WeightPolicy::Strict => {
            if (total - 100.0).abs() > WEIGHT_TOLERANCE {
                return Err(ConfigurationError::WeightSumOutOfTolerance {
                    profile_key: profile_key.to_string(),
                    actual_sum: total,
                });
            }
        }
        WeightPolicy::Normalize => {
            if (total - 100.0).abs() > WEIGHT_TOLERANCE {
                warn!(
                    profile_key,
                    total_weight = total,
                    "weight set does not sum to 100, rescaling under normalize policy"
                );
            }
        }
    }

    Ok(total)
}

/// Combine the weighted component scores into the raw percentage grade.
/// Under the normalize policy the sum is rescaled to a 100-point basis by
/// the actual total weight; under strict the reconciled sum already is one.
pub fn initial_grade(policy: WeightPolicy, total_weighted_score: f64, total_weight: f64) -> f64 {
    match policy {
        WeightPolicy::Strict => total_weighted_score,
        WeightPolicy::Normalize => total_weighted_score / total_weight * 100.0,
    }
}
