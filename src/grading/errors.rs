use super::audit::AuditError;
use super::domain::{ComponentId, SchemeId, SectionId, TableId};
use super::outcome::RunStatus;
use super::repository::RepositoryError;

/// Configuration problems that deterministically fail a run (or a
/// configuration mutation) before any grades are written. Each variant
/// embeds the offending value so operators can correct the record it names.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("component weights for profile '{profile_key}' sum to {actual_sum:.2}, expected 100.00 within a 0.01 tolerance")]
    WeightSumOutOfTolerance { profile_key: String, actual_sum: f64 },
    #[error("no active component weights are configured for profile '{profile_key}'")]
    NoActiveWeights { profile_key: String },
    #[error("scheme '{scheme}' requires transmutation but the run captured no table", scheme = .scheme_id.0)]
    MissingTransmutationTable { scheme_id: SchemeId },
    #[error("transmutation table '{table}' has no active rows", table = .table_id.0)]
    EmptyTransmutationTable { table_id: TableId },
    #[error("raw grade {raw_grade:.2} falls below the lowest transmutation threshold {lowest_threshold:.2}")]
    UnmappedRawGrade {
        raw_grade: f64,
        lowest_threshold: f64,
    },
    #[error("duplicate transmutation threshold {value:.2} in replacement batch")]
    DuplicateThreshold { value: f64 },
    #[error("duplicate component '{component}' in weight replacement batch", component = .component_id.0)]
    DuplicateComponent { component_id: ComponentId },
    #[error("component '{component}' is not part of the scheme", component = .component_id.0)]
    UnknownComponent { component_id: ComponentId },
    #[error("weight {weight_percent:.2} for component '{component}' must not be negative", component = .component_id.0)]
    NegativeWeight {
        component_id: ComponentId,
        weight_percent: f64,
    },
    #[error("scheme '{scheme}' already has a default weight profile", scheme = .scheme_id.0)]
    DefaultProfileExists { scheme_id: SchemeId },
    #[error("section '{section}' has no usable classification and the scheme has no default profile; set the section's primary classification", section = .section_id.0)]
    MissingClassification { section_id: SectionId },
}

/// Error taxonomy for the grade computation engine.
///
/// `NotFound` is a missing referenced record, distinct from a configuration
/// problem; `Computation` is the catch-all for unexpected aggregation
/// failures, reported as a run failure rather than thrown uncaught.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("computation failed: {0}")]
    Computation(String),
    #[error("run '{run}' is already {status} and cannot be executed again", run = .run_id.0, status = .status.label())]
    RunNotExecutable {
        run_id: super::domain::RunId,
        status: RunStatus,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}
