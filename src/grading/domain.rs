use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for grading schemes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemeId(pub String);

/// Identifier wrapper for grading components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub String);

/// Identifier wrapper for weight profiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileId(pub String);

/// Identifier wrapper for transmutation tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub String);

/// Identifier wrapper for graded items.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub String);

/// Identifier wrapper for class sections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectionId(pub String);

/// Identifier wrapper for enrolled students.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudentId(pub String);

/// Identifier wrapper for compute runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub String);

/// Tenant and actor scope threaded into every engine call. Queries and audit
/// events are scoped through this value rather than ambient session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub organization_id: String,
    pub actor_id: String,
}

/// Grading methodology governing a school or program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeType {
    K12,
    HigherEd,
    Continuous,
}

impl SchemeType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::K12 => "k12",
            Self::HigherEd => "higher_ed",
            Self::Continuous => "continuous",
        }
    }

    /// K-12 and higher-ed schemes report on an official transmuted scale;
    /// continuous schemes report the raw weighted percentage directly.
    pub const fn requires_transmutation(self) -> bool {
        matches!(self, Self::K12 | Self::HigherEd)
    }
}

/// How the final numeric grade is derived from the raw weighted percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    Floor,
    Round,
    Ceil,
}

impl RoundingMode {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Floor => "floor",
            Self::Round => "round",
            Self::Ceil => "ceil",
        }
    }

    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::Floor => value.floor(),
            Self::Round => value.round(),
            Self::Ceil => value.ceil(),
        }
    }
}

/// Whether assigned weights must reconcile to exactly 100 or are rescaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightPolicy {
    Strict,
    Normalize,
}

impl WeightPolicy {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Normalize => "normalize",
        }
    }
}

/// Rounding and reconciliation settings carried on the scheme record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeMetadata {
    pub rounding_mode: RoundingMode,
    pub weight_policy: WeightPolicy,
}

impl SchemeMetadata {
    /// K-12 programs truncate by convention; everything else rounds half-up.
    pub fn defaults_for(scheme_type: SchemeType) -> Self {
        let rounding_mode = match scheme_type {
            SchemeType::K12 => RoundingMode::Floor,
            SchemeType::HigherEd | SchemeType::Continuous => RoundingMode::Round,
        };
        Self {
            rounding_mode,
            weight_policy: WeightPolicy::Strict,
        }
    }
}

/// Versioned grading methodology owned by an organization.
///
/// Immutable once referenced by a completed run; structural changes bump
/// `version` on a fresh record instead of editing in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingScheme {
    pub id: SchemeId,
    pub organization_id: String,
    pub name: String,
    pub scheme_type: SchemeType,
    pub version: u32,
    pub metadata: SchemeMetadata,
    pub published_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl GradingScheme {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

/// A weighted grading category within a scheme (e.g. Written Work).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub scheme_id: SchemeId,
    pub code: String,
    pub label: String,
    pub display_order: u32,
    pub archived_at: Option<DateTime<Utc>>,
}

/// A named alternate weighting selectable per section classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightProfile {
    pub id: ProfileId,
    pub scheme_id: SchemeId,
    pub profile_key: String,
    pub is_default: bool,
    pub archived_at: Option<DateTime<Utc>>,
}

/// Weight assignment tying a component to a (scheme, profile-or-none) pair.
///
/// Weight sets are replaced as a whole batch: the active set is archived and
/// the replacement inserted with a bumped `version` in one store operation,
/// so only one active weight per component ever exists for a pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentWeight {
    pub scheme_id: SchemeId,
    pub profile_id: Option<ProfileId>,
    pub component_id: ComponentId,
    pub weight_percent: f64,
    pub version: u32,
    pub archived_at: Option<DateTime<Utc>>,
}

/// Versioned raw-to-scale mapping owned by a scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmutationTable {
    pub id: TableId,
    pub scheme_id: SchemeId,
    pub version: u32,
    pub published_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// Threshold row: raw grades at or above `initial_grade` (and below the next
/// higher threshold) map to `transmuted_grade`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmutationRow {
    pub table_id: TableId,
    pub initial_grade: f64,
    pub transmuted_grade: f64,
    pub archived_at: Option<DateTime<Utc>>,
}

/// A scored assessment anchoring per-student scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedItem {
    pub id: ItemId,
    pub section_id: SectionId,
    pub term: String,
    pub component_id: ComponentId,
    pub title: String,
    pub max_points: f64,
    pub created_at: DateTime<Utc>,
}

/// Disposition of a single student's score on a graded item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreStatus {
    Present,
    Absent,
    Excused,
    Missing,
}

impl ScoreStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Excused => "excused",
            Self::Missing => "missing",
        }
    }
}

/// One student's score on one graded item. `created_at` is the snapshot
/// filter key: scores recorded after a run's as-of boundary are invisible to
/// that run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedScore {
    pub item_id: ItemId,
    pub student_id: StudentId,
    pub status: ScoreStatus,
    pub points_earned: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Section attributes consumed by the classification resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionProfile {
    pub id: SectionId,
    pub organization_id: String,
    pub primary_classification: Option<String>,
    pub classification_source: Option<String>,
    pub program_id: Option<String>,
}

/// Enrollment state of a student-to-section association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Dropped,
    Completed,
}

impl EnrollmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Dropped => "dropped",
            Self::Completed => "completed",
        }
    }
}

/// Roster membership row. Only active members with no end date are graded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterMember {
    pub section_id: SectionId,
    pub student_id: StudentId,
    pub status: EnrollmentStatus,
    pub ended_on: Option<NaiveDate>,
}

impl RosterMember {
    pub fn is_active(&self) -> bool {
        self.status == EnrollmentStatus::Active && self.ended_on.is_none()
    }
}
