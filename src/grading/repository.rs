use chrono::{DateTime, Utc};

use super::domain::{
    Component, ComponentId, ComponentWeight, GradedItem, GradedScore, GradingScheme, ItemId,
    ProfileId, RunId, SchemeId, SectionId, SectionProfile, StudentId, TableId, TransmutationRow,
    TransmutationTable, WeightProfile,
};
use super::outcome::{ComputeRun, ComputedGrade};

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage seam for grading configuration records. Archival is soft: rows
/// gain an `archived_at` timestamp and drop out of the `active_*` reads.
pub trait ConfigStore: Send + Sync {
    fn scheme(&self, id: &SchemeId) -> Result<Option<GradingScheme>, RepositoryError>;
    fn insert_scheme(&self, scheme: GradingScheme) -> Result<(), RepositoryError>;

    fn component(&self, id: &ComponentId) -> Result<Option<Component>, RepositoryError>;
    fn active_components(&self, scheme_id: &SchemeId) -> Result<Vec<Component>, RepositoryError>;
    fn insert_component(&self, component: Component) -> Result<(), RepositoryError>;
    fn archive_component(
        &self,
        id: &ComponentId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    fn weight_profile(&self, id: &ProfileId) -> Result<Option<WeightProfile>, RepositoryError>;
    fn weight_profiles(&self, scheme_id: &SchemeId) -> Result<Vec<WeightProfile>, RepositoryError>;
    fn insert_weight_profile(&self, profile: WeightProfile) -> Result<(), RepositoryError>;
    fn archive_weight_profile(
        &self,
        id: &ProfileId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    fn active_weights(
        &self,
        scheme_id: &SchemeId,
        profile_id: Option<&ProfileId>,
    ) -> Result<Vec<ComponentWeight>, RepositoryError>;

    /// Replace the active weight set for a (scheme, profile-or-none) pair:
    /// archive the current set and insert `entries` with a bumped version in
    /// one operation, so readers never observe an empty active set. Returns
    /// the new version.
    fn replace_weights(
        &self,
        scheme_id: &SchemeId,
        profile_id: Option<&ProfileId>,
        entries: Vec<ComponentWeight>,
    ) -> Result<u32, RepositoryError>;

    fn transmutation_table(
        &self,
        id: &TableId,
    ) -> Result<Option<TransmutationTable>, RepositoryError>;
    fn insert_transmutation_table(
        &self,
        table: TransmutationTable,
    ) -> Result<(), RepositoryError>;
    fn active_transmutation_rows(
        &self,
        table_id: &TableId,
    ) -> Result<Vec<TransmutationRow>, RepositoryError>;

    /// Batch-replace the rows of a transmutation table, same contract as
    /// [`ConfigStore::replace_weights`]. Returns the new table version.
    fn replace_transmutation_rows(
        &self,
        table_id: &TableId,
        rows: Vec<TransmutationRow>,
    ) -> Result<u32, RepositoryError>;
}

/// Read seam for section context: classification attributes, syllabus
/// subjects for fallback inference, graded items/scores, and the roster.
pub trait SectionStore: Send + Sync {
    fn section(&self, id: &SectionId) -> Result<Option<SectionProfile>, RepositoryError>;
    fn syllabus_subjects(
        &self,
        program_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, RepositoryError>;
    fn graded_items(
        &self,
        section_id: &SectionId,
        term: &str,
    ) -> Result<Vec<GradedItem>, RepositoryError>;
    fn scores_for_item(&self, item_id: &ItemId) -> Result<Vec<GradedScore>, RepositoryError>;
    fn active_roster(&self, section_id: &SectionId) -> Result<Vec<StudentId>, RepositoryError>;
}

/// Storage seam for compute runs and their computed grades.
pub trait RunStore: Send + Sync {
    fn insert_run(&self, run: ComputeRun) -> Result<(), RepositoryError>;
    fn update_run(&self, run: ComputeRun) -> Result<(), RepositoryError>;
    fn run(&self, id: &RunId) -> Result<Option<ComputeRun>, RepositoryError>;

    /// Persist every grade of a run as one batch; all-or-nothing. A grade
    /// already present for any (run, student) pair is a conflict and leaves
    /// the store untouched.
    fn insert_grades(&self, grades: Vec<ComputedGrade>) -> Result<(), RepositoryError>;
    fn grades_for_run(&self, id: &RunId) -> Result<Vec<ComputedGrade>, RepositoryError>;

    /// Record the 1:1 link from a computed grade to an external confirmed
    /// grade-entry record. Append-only: linking an already-linked grade is a
    /// conflict. Returns the updated grade for audit snapshots.
    fn link_grade_entry(
        &self,
        run_id: &RunId,
        student_id: &StudentId,
        entry_id: &str,
    ) -> Result<ComputedGrade, RepositoryError>;
}
