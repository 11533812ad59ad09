//! Grade computation engine: configuration data model, classification-driven
//! weight-profile resolution, score aggregation, transmutation, and the
//! compute-run orchestration that persists auditable computed grades.

pub mod aggregation;
pub mod audit;
pub mod configuration;
pub mod domain;
mod errors;
pub mod outcome;
pub mod repository;
pub mod resolver;
pub mod router;
pub mod service;
pub mod store;
pub mod transmutation;

#[cfg(test)]
mod tests;

pub use audit::{AuditAction, AuditError, AuditEvent, AuditSink, TracingAuditSink};
pub use configuration::{ConfigurationService, ThresholdAssignment, WeightAssignment};
pub use domain::{
    Component, ComponentId, ComponentWeight, EnrollmentStatus, GradedItem, GradedScore,
    GradingScheme, ItemId, ProfileId, RequestContext, RosterMember, RoundingMode, RunId, SchemeId,
    SchemeMetadata, SchemeType, ScoreStatus, SectionId, SectionProfile, StudentId, TableId,
    TransmutationRow, TransmutationTable, WeightPolicy, WeightProfile,
};
pub use errors::{ConfigurationError, EngineError};
pub use outcome::{
    ComponentBreakdown, ComputeRun, ComputedGrade, ComputedGradeView, GradeBreakdown, RunStatus,
    RunView, StatusCounts,
};
pub use repository::{ConfigStore, RepositoryError, RunStore, SectionStore};
pub use resolver::{resolve_weight_profile, ClassificationSource, ResolvedProfile};
pub use router::grading_router;
pub use service::{ComputeRunRequest, GradeComputationService, RunOutcome};
pub use store::{InMemoryGradeStore, MemoryAuditSink};
