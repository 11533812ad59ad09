use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::aggregation::{aggregate_scores, initial_grade, reconcile_weights};
use super::audit::{AuditAction, AuditEvent, AuditSink};
use super::domain::{
    GradedScore, GradingScheme, RequestContext, RunId, SchemeId, SectionId, StudentId, TableId,
};
use super::errors::{ConfigurationError, EngineError};
use super::outcome::{
    ComponentBreakdown, ComputeRun, ComputedGrade, GradeBreakdown, RunStatus,
};
use super::repository::{ConfigStore, RunStore, SectionStore};
use super::resolver::{resolve_weight_profile, syllabus_sample_limit};
use super::transmutation::transmute;

/// Parameters of one grading request. The as-of boundary is part of the
/// request so recomputations of historical states are expressible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeRunRequest {
    pub section_id: SectionId,
    pub term: String,
    pub scheme_id: SchemeId,
    pub as_of: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmutation_table_id: Option<TableId>,
}

/// A finished run together with its persisted grades.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run: ComputeRun,
    pub grades: Vec<ComputedGrade>,
}

static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_run_id() -> RunId {
    let id = RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RunId(format!("run-{id:06}"))
}

/// Orchestrates the compute-run lifecycle: freeze configuration at creation,
/// execute exactly once, persist all grades as one batch, and record every
/// terminal transition on the run itself.
pub struct GradeComputationService<S, A> {
    store: Arc<S>,
    audit: Arc<A>,
}

impl<S, A> GradeComputationService<S, A>
where
    S: ConfigStore + SectionStore + RunStore + 'static,
    A: AuditSink + 'static,
{
    pub fn new(store: Arc<S>, audit: Arc<A>) -> Self {
        Self { store, audit }
    }

    /// Create a run in `Created` state with the weight profile resolved and
    /// the transmutation table version captured. Resolution failures surface
    /// here, before any run record exists.
    pub fn create_run(
        &self,
        ctx: &RequestContext,
        request: ComputeRunRequest,
    ) -> Result<ComputeRun, EngineError> {
        let scheme = self.require_scheme(ctx, &request.scheme_id)?;

        let section = self
            .store
            .section(&request.section_id)?
            .filter(|section| section.organization_id == ctx.organization_id)
            .ok_or_else(|| EngineError::not_found("section", &request.section_id.0))?;

        let profiles = self.store.weight_profiles(&scheme.id)?;
        let syllabus_subjects = match (&section.primary_classification, &section.program_id) {
            (None, Some(program_id)) => self
                .store
                .syllabus_subjects(program_id, syllabus_sample_limit())?,
            _ => Vec::new(),
        };
        let resolved = resolve_weight_profile(&section, &profiles, &syllabus_subjects)?;

        let (table_id, table_version) = match &request.transmutation_table_id {
            Some(table_id) => {
                let table = self
                    .store
                    .transmutation_table(table_id)?
                    .ok_or_else(|| EngineError::not_found("transmutation table", &table_id.0))?;
                (Some(table.id), Some(table.version))
            }
            None => (None, None),
        };

        let run = ComputeRun {
            id: next_run_id(),
            organization_id: ctx.organization_id.clone(),
            section_id: request.section_id.clone(),
            term: request.term.clone(),
            scheme_id: scheme.id.clone(),
            scheme_version: scheme.version,
            as_of: request.as_of,
            resolved_profile: resolved,
            transmutation_table_id: table_id,
            transmutation_table_version: table_version,
            status: RunStatus::Created,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        self.store.insert_run(run.clone())?;
        info!(
            run = %run.id.0,
            section = %run.section_id.0,
            term = %run.term,
            profile = %run.resolved_profile.profile_key,
            source = run.resolved_profile.source.label(),
            "compute run created"
        );
        self.audit.record(
            AuditEvent::new(ctx, AuditAction::Created, "compute_run", run.id.0.clone())
                .with_after(snapshot(&run)),
        )?;

        Ok(run)
    }

    /// Execute a created run to its terminal state. Computation never writes
    /// until every student succeeded; the grade batch lands in one store
    /// operation and only then does the run flip to `Completed`. Any failure
    /// is recorded onto the run and returned to the caller.
    pub fn execute_run(&self, ctx: &RequestContext, run_id: &RunId) -> Result<RunOutcome, EngineError> {
        let run = self
            .store
            .run(run_id)?
            .filter(|run| run.organization_id == ctx.organization_id)
            .ok_or_else(|| EngineError::not_found("compute run", &run_id.0))?;

        if run.status.is_terminal() {
            return Err(EngineError::RunNotExecutable {
                run_id: run.id.clone(),
                status: run.status,
            });
        }

        match self
            .compute_grades(&run)
            .and_then(|grades| {
                self.store.insert_grades(grades.clone())?;
                Ok(grades)
            }) {
            Ok(grades) => {
                let mut completed = run;
                completed.status = RunStatus::Completed;
                completed.completed_at = Some(Utc::now());
                self.store.update_run(completed.clone())?;
                info!(
                    run = %completed.id.0,
                    students = grades.len(),
                    "compute run completed"
                );
                self.audit.record(
                    AuditEvent::new(ctx, AuditAction::Updated, "compute_run", completed.id.0.clone())
                        .with_after(snapshot(&completed)),
                )?;
                self.audit.record(
                    AuditEvent::new(
                        ctx,
                        AuditAction::Created,
                        "computed_grades",
                        completed.id.0.clone(),
                    )
                    .with_after(json!({ "count": grades.len() })),
                )?;
                Ok(RunOutcome {
                    run: completed,
                    grades,
                })
            }
            Err(error) => {
                let mut failed = run;
                failed.status = RunStatus::Failed;
                failed.error_message = Some(error.to_string());
                failed.completed_at = Some(Utc::now());
                self.store.update_run(failed.clone())?;
                warn!(
                    run = %failed.id.0,
                    error = %error,
                    "compute run failed"
                );
                self.audit.record(
                    AuditEvent::new(ctx, AuditAction::Updated, "compute_run", failed.id.0.clone())
                        .with_after(snapshot(&failed)),
                )?;
                Err(error)
            }
        }
    }

    /// Create and immediately execute a run.
    pub fn compute(
        &self,
        ctx: &RequestContext,
        request: ComputeRunRequest,
    ) -> Result<RunOutcome, EngineError> {
        let run = self.create_run(ctx, request)?;
        self.execute_run(ctx, &run.id)
    }

    pub fn run(&self, ctx: &RequestContext, run_id: &RunId) -> Result<ComputeRun, EngineError> {
        self.store
            .run(run_id)?
            .filter(|run| run.organization_id == ctx.organization_id)
            .ok_or_else(|| EngineError::not_found("compute run", &run_id.0))
    }

    pub fn grades(
        &self,
        ctx: &RequestContext,
        run_id: &RunId,
    ) -> Result<Vec<ComputedGrade>, EngineError> {
        self.run(ctx, run_id)?;
        Ok(self.store.grades_for_run(run_id)?)
    }

    /// Record the append-only link from a computed grade to an external
    /// confirmed grade-entry record. Linking twice is a conflict.
    pub fn link_grade_entry(
        &self,
        ctx: &RequestContext,
        run_id: &RunId,
        student_id: &StudentId,
        entry_id: &str,
    ) -> Result<ComputedGrade, EngineError> {
        let run = self.run(ctx, run_id)?;
        if run.status != RunStatus::Completed {
            return Err(EngineError::RunNotExecutable {
                run_id: run.id,
                status: run.status,
            });
        }
        let linked = self.store.link_grade_entry(run_id, student_id, entry_id)?;
        self.audit.record(
            AuditEvent::new(
                ctx,
                AuditAction::Linked,
                "computed_grade",
                format!("{}/{}", run_id.0, student_id.0),
            )
            .with_after(snapshot(&linked)),
        )?;
        Ok(linked)
    }

    /// The read-and-compute pipeline. Pure with respect to the run store:
    /// nothing here writes, so a failure at any step leaves no partial
    /// grades behind.
    fn compute_grades(&self, run: &ComputeRun) -> Result<Vec<ComputedGrade>, EngineError> {
        let scheme = self
            .store
            .scheme(&run.scheme_id)?
            .filter(|scheme| !scheme.is_archived())
            .ok_or_else(|| EngineError::not_found("grading scheme", &run.scheme_id.0))?;

        let rounding_mode = scheme.metadata.rounding_mode;
        let weight_policy = scheme.metadata.weight_policy;

        let components = self.store.active_components(&scheme.id)?;
        let mut weights = self
            .store
            .active_weights(&scheme.id, Some(&run.resolved_profile.profile_id))?;
        if weights.is_empty() {
            // Profiles without their own weight set inherit the scheme-wide
            // base set (the profile-less assignment).
            weights = self.store.active_weights(&scheme.id, None)?;
        }

        let total_weight =
            reconcile_weights(weight_policy, &run.resolved_profile.profile_key, &weights)?;
        for component in &components {
            if !weights
                .iter()
                .any(|weight| weight.component_id == component.id)
            {
                warn!(
                    component = %component.code,
                    profile = %run.resolved_profile.profile_key,
                    "active component has no weight assigned and contributes nothing"
                );
            }
        }

        let transmutation_rows = if scheme.scheme_type.requires_transmutation() {
            let table_id = run.transmutation_table_id.clone().ok_or(
                ConfigurationError::MissingTransmutationTable {
                    scheme_id: scheme.id.clone(),
                },
            )?;
            let rows = self.store.active_transmutation_rows(&table_id)?;
            if rows.is_empty() {
                return Err(ConfigurationError::EmptyTransmutationTable { table_id }.into());
            }
            Some(rows)
        } else {
            None
        };

        let items = self.store.graded_items(&run.section_id, &run.term)?;
        let mut scores: Vec<GradedScore> = Vec::new();
        for item in &items {
            scores.extend(self.store.scores_for_item(&item.id)?);
        }

        let roster = self.store.active_roster(&run.section_id)?;
        let totals_by_student = aggregate_scores(&items, &scores, run.as_of);

        let mut grades = Vec::with_capacity(roster.len());
        for student_id in roster {
            let student_totals = totals_by_student.get(&student_id);

            let mut component_lines = Vec::with_capacity(components.len());
            let mut total_weighted_score = 0.0;
            for component in &components {
                let weight_percent = weights
                    .iter()
                    .find(|weight| weight.component_id == component.id)
                    .map(|weight| weight.weight_percent)
                    .unwrap_or(0.0);

                let totals = student_totals
                    .and_then(|totals| totals.get(&component.id))
                    .copied()
                    .unwrap_or_default();
                let percent = totals.percent();
                let weighted_score = percent * weight_percent / 100.0;
                total_weighted_score += weighted_score;

                component_lines.push(ComponentBreakdown {
                    component_id: component.id.clone(),
                    code: component.code.clone(),
                    label: component.label.clone(),
                    raw_total: totals.raw_total,
                    max_total: totals.max_total,
                    percent,
                    weight_percent,
                    weighted_score,
                    status_counts: totals.status_counts,
                });
            }

            let raw_grade = initial_grade(weight_policy, total_weighted_score, total_weight);
            let rounded_grade = rounding_mode.apply(raw_grade);
            let transmuted_grade = match &transmutation_rows {
                Some(rows) => Some(transmute(rows, rounded_grade)?),
                None => None,
            };
            let final_numeric_grade = transmuted_grade.unwrap_or(rounded_grade);

            grades.push(ComputedGrade {
                run_id: run.id.clone(),
                student_id,
                initial_grade: raw_grade,
                final_numeric_grade,
                transmuted_grade,
                breakdown: GradeBreakdown {
                    components: component_lines,
                    classification: run.resolved_profile.clone(),
                    section_id: run.section_id.clone(),
                    term: run.term.clone(),
                    rounding_mode,
                    weight_policy,
                    initial_grade: raw_grade,
                    transmuted_grade,
                    as_of: run.as_of,
                },
                grade_entry_id: None,
            });
        }

        Ok(grades)
    }

    fn require_scheme(
        &self,
        ctx: &RequestContext,
        scheme_id: &SchemeId,
    ) -> Result<GradingScheme, EngineError> {
        self.store
            .scheme(scheme_id)?
            .filter(|scheme| scheme.organization_id == ctx.organization_id)
            .filter(|scheme| !scheme.is_archived())
            .ok_or_else(|| EngineError::not_found("grading scheme", &scheme_id.0))
    }
}

fn snapshot<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
