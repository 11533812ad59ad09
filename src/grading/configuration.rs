use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::audit::{AuditAction, AuditEvent, AuditSink};
use super::domain::{
    Component, ComponentId, ComponentWeight, GradingScheme, ProfileId, RequestContext, SchemeId,
    TableId, TransmutationRow, TransmutationTable, WeightProfile,
};
use super::errors::{ConfigurationError, EngineError};
use super::repository::ConfigStore;
use super::transmutation::check_unique_thresholds;

/// One entry of a weight replacement batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightAssignment {
    pub component_id: ComponentId,
    pub weight_percent: f64,
}

/// One entry of a transmutation row replacement batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdAssignment {
    pub initial_grade: f64,
    pub transmuted_grade: f64,
}

/// Administration facade for grading configuration. Every mutation is
/// validated before storage is touched and reported to the audit sink with
/// before/after snapshots.
pub struct ConfigurationService<S, A> {
    store: Arc<S>,
    audit: Arc<A>,
}

impl<S, A> ConfigurationService<S, A>
where
    S: ConfigStore + 'static,
    A: AuditSink + 'static,
{
    pub fn new(store: Arc<S>, audit: Arc<A>) -> Self {
        Self { store, audit }
    }

    pub fn create_scheme(
        &self,
        ctx: &RequestContext,
        mut scheme: GradingScheme,
    ) -> Result<GradingScheme, EngineError> {
        scheme.organization_id = ctx.organization_id.clone();
        self.store.insert_scheme(scheme.clone())?;
        self.audit.record(
            AuditEvent::new(ctx, AuditAction::Created, "grading_scheme", scheme.id.0.clone())
                .with_after(snapshot(&scheme)),
        )?;
        Ok(scheme)
    }

    pub fn create_component(
        &self,
        ctx: &RequestContext,
        component: Component,
    ) -> Result<Component, EngineError> {
        self.require_scheme(&component.scheme_id)?;
        self.store.insert_component(component.clone())?;
        self.audit.record(
            AuditEvent::new(ctx, AuditAction::Created, "component", component.id.0.clone())
                .with_after(snapshot(&component)),
        )?;
        Ok(component)
    }

    pub fn create_weight_profile(
        &self,
        ctx: &RequestContext,
        profile: WeightProfile,
    ) -> Result<WeightProfile, EngineError> {
        self.require_scheme(&profile.scheme_id)?;
        if profile.is_default {
            let has_default = self
                .store
                .weight_profiles(&profile.scheme_id)?
                .iter()
                .any(|existing| existing.is_default && existing.archived_at.is_none());
            if has_default {
                return Err(ConfigurationError::DefaultProfileExists {
                    scheme_id: profile.scheme_id.clone(),
                }
                .into());
            }
        }
        self.store.insert_weight_profile(profile.clone())?;
        self.audit.record(
            AuditEvent::new(ctx, AuditAction::Created, "weight_profile", profile.id.0.clone())
                .with_after(snapshot(&profile)),
        )?;
        Ok(profile)
    }

    pub fn create_transmutation_table(
        &self,
        ctx: &RequestContext,
        table: TransmutationTable,
    ) -> Result<TransmutationTable, EngineError> {
        self.require_scheme(&table.scheme_id)?;
        self.store.insert_transmutation_table(table.clone())?;
        self.audit.record(
            AuditEvent::new(
                ctx,
                AuditAction::Created,
                "transmutation_table",
                table.id.0.clone(),
            )
            .with_after(snapshot(&table)),
        )?;
        Ok(table)
    }

    /// Replace the full weight set for a (scheme, profile-or-none) pair.
    ///
    /// The batch is validated against the scheme's active components before
    /// any storage mutation; the store then archives the prior set and
    /// inserts the new one as a single versioned operation.
    pub fn replace_component_weights(
        &self,
        ctx: &RequestContext,
        scheme_id: &SchemeId,
        profile_id: Option<&ProfileId>,
        entries: Vec<WeightAssignment>,
    ) -> Result<u32, EngineError> {
        self.require_scheme(scheme_id)?;
        if let Some(profile_id) = profile_id {
            let profile = self
                .store
                .weight_profile(profile_id)?
                .ok_or_else(|| EngineError::not_found("weight profile", &profile_id.0))?;
            if &profile.scheme_id != scheme_id {
                return Err(EngineError::not_found("weight profile", &profile_id.0));
            }
        }

        let components = self.store.active_components(scheme_id)?;
        let mut seen: Vec<&ComponentId> = Vec::with_capacity(entries.len());
        for entry in &entries {
            if seen.contains(&&entry.component_id) {
                return Err(ConfigurationError::DuplicateComponent {
                    component_id: entry.component_id.clone(),
                }
                .into());
            }
            seen.push(&entry.component_id);

            if !components
                .iter()
                .any(|component| component.id == entry.component_id)
            {
                return Err(ConfigurationError::UnknownComponent {
                    component_id: entry.component_id.clone(),
                }
                .into());
            }
            if entry.weight_percent < 0.0 {
                return Err(ConfigurationError::NegativeWeight {
                    component_id: entry.component_id.clone(),
                    weight_percent: entry.weight_percent,
                }
                .into());
            }
        }

        let before = self.store.active_weights(scheme_id, profile_id)?;
        let rows: Vec<ComponentWeight> = entries
            .iter()
            .map(|entry| ComponentWeight {
                scheme_id: scheme_id.clone(),
                profile_id: profile_id.cloned(),
                component_id: entry.component_id.clone(),
                weight_percent: entry.weight_percent,
                version: 0,
                archived_at: None,
            })
            .collect();

        let version = self.store.replace_weights(scheme_id, profile_id, rows)?;
        info!(
            scheme = %scheme_id.0,
            profile = profile_id.map(|id| id.0.as_str()).unwrap_or("base"),
            version,
            entries = entries.len(),
            "component weight set replaced"
        );
        self.audit.record(
            AuditEvent::new(ctx, AuditAction::Updated, "component_weights", scheme_id.0.clone())
                .with_before(snapshot(&before))
                .with_after(snapshot(&entries)),
        )?;
        Ok(version)
    }

    /// Replace the full row set of a transmutation table. Duplicate
    /// thresholds fail fast before storage is touched.
    pub fn replace_transmutation_rows(
        &self,
        ctx: &RequestContext,
        table_id: &TableId,
        entries: Vec<ThresholdAssignment>,
    ) -> Result<u32, EngineError> {
        self.store
            .transmutation_table(table_id)?
            .ok_or_else(|| EngineError::not_found("transmutation table", &table_id.0))?;

        let rows: Vec<TransmutationRow> = entries
            .iter()
            .map(|entry| TransmutationRow {
                table_id: table_id.clone(),
                initial_grade: entry.initial_grade,
                transmuted_grade: entry.transmuted_grade,
                archived_at: None,
            })
            .collect();
        check_unique_thresholds(&rows)?;

        let before = self.store.active_transmutation_rows(table_id)?;
        let version = self.store.replace_transmutation_rows(table_id, rows)?;
        info!(
            table = %table_id.0,
            version,
            entries = entries.len(),
            "transmutation row set replaced"
        );
        self.audit.record(
            AuditEvent::new(
                ctx,
                AuditAction::Updated,
                "transmutation_rows",
                table_id.0.clone(),
            )
            .with_before(snapshot(&before))
            .with_after(snapshot(&entries)),
        )?;
        Ok(version)
    }

    pub fn archive_component(
        &self,
        ctx: &RequestContext,
        component_id: &ComponentId,
    ) -> Result<(), EngineError> {
        let before = self
            .store
            .component(component_id)?
            .ok_or_else(|| EngineError::not_found("component", &component_id.0))?;
        self.store.archive_component(component_id, Utc::now())?;
        self.audit.record(
            AuditEvent::new(ctx, AuditAction::Archived, "component", component_id.0.clone())
                .with_before(snapshot(&before)),
        )?;
        Ok(())
    }

    pub fn archive_weight_profile(
        &self,
        ctx: &RequestContext,
        profile_id: &ProfileId,
    ) -> Result<(), EngineError> {
        let before = self
            .store
            .weight_profile(profile_id)?
            .ok_or_else(|| EngineError::not_found("weight profile", &profile_id.0))?;
        self.store.archive_weight_profile(profile_id, Utc::now())?;
        self.audit.record(
            AuditEvent::new(ctx, AuditAction::Archived, "weight_profile", profile_id.0.clone())
                .with_before(snapshot(&before)),
        )?;
        Ok(())
    }

    fn require_scheme(&self, scheme_id: &SchemeId) -> Result<GradingScheme, EngineError> {
        self.store
            .scheme(scheme_id)?
            .ok_or_else(|| EngineError::not_found("grading scheme", &scheme_id.0))
    }
}

fn snapshot<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
