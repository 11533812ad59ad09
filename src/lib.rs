//! Grade computation engine for section/term grading runs.
//!
//! The [`grading`] module owns the configuration data model, the
//! classification-driven weight-profile resolution, the score aggregation
//! pipeline, and the compute-run orchestration that produces auditable
//! computed grades. The surrounding modules carry service plumbing:
//! environment configuration, telemetry, and the top-level error type.

pub mod config;
pub mod error;
pub mod grading;
pub mod telemetry;
