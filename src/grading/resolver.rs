use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::{ProfileId, SectionProfile, WeightProfile};
use super::errors::ConfigurationError;

/// How many syllabus subject names are sampled when inferring a
/// classification for sections that never had one assigned.
const SYLLABUS_SAMPLE_LIMIT: usize = 10;

/// Where a resolved weight profile came from, recorded so an audit can
/// distinguish intentional configuration from inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Canonical,
    SyllabusFallback,
    DefaultFallback,
}

impl ClassificationSource {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Canonical => "canonical",
            Self::SyllabusFallback => "syllabus_fallback",
            Self::DefaultFallback => "default_fallback",
        }
    }
}

/// Outcome of weight-profile resolution, captured onto the compute run at
/// creation time and echoed in every grade breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedProfile {
    pub profile_id: ProfileId,
    pub profile_key: String,
    pub classification_used: Option<String>,
    pub source: ClassificationSource,
    pub is_fallback: bool,
}

/// Resolve which weight profile applies to a section.
///
/// Ordered, short-circuiting chain: the section's canonical classification,
/// then a syllabus-derived subject inference, then the scheme's default
/// profile. Exhausting all three is a configuration error instructing the
/// operator to classify the section; the engine never silently proceeds.
pub fn resolve_weight_profile(
    section: &SectionProfile,
    profiles: &[WeightProfile],
    syllabus_subjects: &[String],
) -> Result<ResolvedProfile, ConfigurationError> {
    if let Some(classification) = section.primary_classification.as_deref() {
        if let Some(profile) = profiles
            .iter()
            .filter(|profile| profile.archived_at.is_none())
            .find(|profile| profile.profile_key == classification)
        {
            return Ok(ResolvedProfile {
                profile_id: profile.id.clone(),
                profile_key: profile.profile_key.clone(),
                classification_used: Some(classification.to_string()),
                source: ClassificationSource::Canonical,
                is_fallback: false,
            });
        }
    } else if let Some(subject) = representative_subject(syllabus_subjects) {
        let needle = subject.to_lowercase();
        if let Some(profile) = profiles
            .iter()
            .filter(|profile| profile.archived_at.is_none())
            .find(|profile| profile.profile_key.to_lowercase().contains(&needle))
        {
            warn!(
                section = %section.id.0,
                subject = %subject,
                profile_key = %profile.profile_key,
                "weight profile inferred from syllabus subject"
            );
            return Ok(ResolvedProfile {
                profile_id: profile.id.clone(),
                profile_key: profile.profile_key.clone(),
                classification_used: Some(subject),
                source: ClassificationSource::SyllabusFallback,
                is_fallback: true,
            });
        }
    }

    if let Some(profile) = profiles
        .iter()
        .filter(|profile| profile.archived_at.is_none())
        .find(|profile| profile.is_default)
    {
        warn!(
            section = %section.id.0,
            profile_key = %profile.profile_key,
            "weight profile fell back to scheme default"
        );
        return Ok(ResolvedProfile {
            profile_id: profile.id.clone(),
            profile_key: profile.profile_key.clone(),
            classification_used: section.primary_classification.clone(),
            source: ClassificationSource::DefaultFallback,
            is_fallback: true,
        });
    }

    Err(ConfigurationError::MissingClassification {
        section_id: section.id.clone(),
    })
}

/// Pick the representative subject from the sampled syllabus names: the most
/// frequent subject wins, ties broken lexicographically so the choice is
/// deterministic across runs.
fn representative_subject(subjects: &[String]) -> Option<String> {
    let mut frequency: BTreeMap<&str, usize> = BTreeMap::new();
    for subject in subjects.iter().take(SYLLABUS_SAMPLE_LIMIT) {
        let trimmed = subject.trim();
        if trimmed.is_empty() {
            continue;
        }
        *frequency.entry(trimmed).or_default() += 1;
    }

    frequency
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
        .map(|(subject, _)| subject.to_string())
}

/// Helper for callers that need the sample limit (e.g. store queries).
pub fn syllabus_sample_limit() -> usize {
    SYLLABUS_SAMPLE_LIMIT
}
