use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ComponentId, RoundingMode, RunId, SchemeId, SectionId, StudentId, TableId, WeightPolicy,
};
use super::resolver::ResolvedProfile;

/// Lifecycle of a compute run: `Created` transitions exactly once, to either
/// terminal state. Retrying means creating a new run with a fresh as-of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Created,
    Completed,
    Failed,
}

impl RunStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One point-in-time grading request for a section/term.
///
/// The resolved profile and the transmutation table id + version are frozen
/// at creation; execution reads this snapshot instead of re-resolving, so a
/// run's configuration cannot drift between creation and completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeRun {
    pub id: RunId,
    pub organization_id: String,
    pub section_id: SectionId,
    pub term: String,
    pub scheme_id: SchemeId,
    pub scheme_version: u32,
    pub as_of: DateTime<Utc>,
    pub resolved_profile: ResolvedProfile,
    pub transmutation_table_id: Option<TableId>,
    pub transmutation_table_version: Option<u32>,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ComputeRun {
    pub fn status_view(&self) -> RunView {
        RunView {
            run_id: self.id.clone(),
            section_id: self.section_id.clone(),
            term: self.term.clone(),
            status: self.status.label(),
            as_of: self.as_of,
            classification_source: self.resolved_profile.source.label(),
            is_fallback: self.resolved_profile.is_fallback,
            error_message: self.error_message.clone(),
        }
    }
}

/// Sanitized representation of a run's externally visible state.
#[derive(Debug, Clone, Serialize)]
pub struct RunView {
    pub run_id: RunId,
    pub section_id: SectionId,
    pub term: String,
    pub status: &'static str,
    pub as_of: DateTime<Utc>,
    pub classification_source: &'static str,
    pub is_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Tally of score dispositions feeding one component's totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub present: u32,
    pub absent: u32,
    pub excused: u32,
    pub missing: u32,
}

/// Per-component line of the audit breakdown, ordered by the component's
/// display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentBreakdown {
    pub component_id: ComponentId,
    pub code: String,
    pub label: String,
    pub raw_total: f64,
    pub max_total: f64,
    pub percent: f64,
    pub weight_percent: f64,
    pub weighted_score: f64,
    pub status_counts: StatusCounts,
}

/// The canonical audit artifact attached to every computed grade. Fields are
/// explicit (not an open map) so serialization stays backward-compatible and
/// nothing can be silently omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBreakdown {
    pub components: Vec<ComponentBreakdown>,
    pub classification: ResolvedProfile,
    pub section_id: SectionId,
    pub term: String,
    pub rounding_mode: RoundingMode,
    pub weight_policy: WeightPolicy,
    pub initial_grade: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmuted_grade: Option<f64>,
    pub as_of: DateTime<Utc>,
}

/// Durable per-(run, student) output of a completed computation. Never
/// mutated after the bulk write, except for the append-only grade-entry
/// link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedGrade {
    pub run_id: RunId,
    pub student_id: StudentId,
    pub initial_grade: f64,
    pub final_numeric_grade: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmuted_grade: Option<f64>,
    pub breakdown: GradeBreakdown,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade_entry_id: Option<String>,
}

impl ComputedGrade {
    pub fn status_view(&self) -> ComputedGradeView {
        ComputedGradeView {
            student_id: self.student_id.clone(),
            initial_grade: self.initial_grade,
            final_numeric_grade: self.final_numeric_grade,
            transmuted_grade: self.transmuted_grade,
            component_count: self.breakdown.components.len(),
            is_fallback_classification: self.breakdown.classification.is_fallback,
        }
    }
}

/// Compact listing row for API responses; the full breakdown travels on the
/// grade record itself.
#[derive(Debug, Clone, Serialize)]
pub struct ComputedGradeView {
    pub student_id: StudentId,
    pub initial_grade: f64,
    pub final_numeric_grade: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmuted_grade: Option<f64>,
    pub component_count: usize,
    pub is_fallback_classification: bool,
}
