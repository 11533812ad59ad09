use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::grading::configuration::{ConfigurationService, ThresholdAssignment, WeightAssignment};
use crate::grading::domain::{
    Component, ComponentId, EnrollmentStatus, GradedItem, GradedScore, GradingScheme, ItemId,
    ProfileId, RequestContext, RosterMember, RoundingMode, SchemeId, SchemeMetadata, SchemeType,
    ScoreStatus, SectionId, SectionProfile, StudentId, TableId, TransmutationTable, WeightPolicy,
    WeightProfile,
};
use crate::grading::service::{ComputeRunRequest, GradeComputationService};
use crate::grading::store::{InMemoryGradeStore, MemoryAuditSink};

pub(super) fn ctx() -> RequestContext {
    RequestContext {
        organization_id: "org-maplewood".to_string(),
        actor_id: "registrar-1".to_string(),
    }
}

pub(super) fn foreign_ctx() -> RequestContext {
    RequestContext {
        organization_id: "org-other".to_string(),
        actor_id: "registrar-9".to_string(),
    }
}

pub(super) fn recorded_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 59)
        .single()
        .expect("valid timestamp")
}

pub(super) fn scheme_id() -> SchemeId {
    SchemeId("scheme-k12".to_string())
}

pub(super) fn table_id() -> TableId {
    TableId("table-doe".to_string())
}

pub(super) fn section_id() -> SectionId {
    SectionId("section-7a".to_string())
}

pub(super) fn k12_scheme() -> GradingScheme {
    GradingScheme {
        id: scheme_id(),
        organization_id: ctx().organization_id,
        name: "Quarterly Averaging".to_string(),
        scheme_type: SchemeType::K12,
        version: 1,
        metadata: SchemeMetadata::defaults_for(SchemeType::K12),
        published_at: Some(recorded_at()),
        archived_at: None,
    }
}

pub(super) fn component(id: &str, code: &str, label: &str, order: u32) -> Component {
    Component {
        id: ComponentId(id.to_string()),
        scheme_id: scheme_id(),
        code: code.to_string(),
        label: label.to_string(),
        display_order: order,
        archived_at: None,
    }
}

pub(super) fn weight_profile(id: &str, key: &str, is_default: bool) -> WeightProfile {
    WeightProfile {
        id: ProfileId(id.to_string()),
        scheme_id: scheme_id(),
        profile_key: key.to_string(),
        is_default,
        archived_at: None,
    }
}

pub(super) fn classified_section(classification: Option<&str>) -> SectionProfile {
    SectionProfile {
        id: section_id(),
        organization_id: ctx().organization_id,
        primary_classification: classification.map(str::to_string),
        classification_source: classification.map(|_| "registrar".to_string()),
        program_id: Some("program-jhs".to_string()),
    }
}

pub(super) fn graded_item(id: &str, component: &str, max_points: f64) -> GradedItem {
    GradedItem {
        id: ItemId(id.to_string()),
        section_id: section_id(),
        term: "2025-q3".to_string(),
        component_id: ComponentId(component.to_string()),
        title: id.to_string(),
        max_points,
        created_at: recorded_at(),
    }
}

pub(super) fn score(
    item: &str,
    student: &str,
    status: ScoreStatus,
    points_earned: Option<f64>,
) -> GradedScore {
    GradedScore {
        item_id: ItemId(item.to_string()),
        student_id: StudentId(student.to_string()),
        status,
        points_earned,
        created_at: recorded_at(),
    }
}

pub(super) fn standard_thresholds() -> Vec<ThresholdAssignment> {
    [
        (0.0, 60.0),
        (40.0, 72.0),
        (45.0, 75.0),
        (50.0, 78.0),
        (60.0, 82.0),
        (70.0, 85.0),
        (80.0, 88.0),
        (90.0, 93.0),
    ]
    .into_iter()
    .map(|(initial_grade, transmuted_grade)| ThresholdAssignment {
        initial_grade,
        transmuted_grade,
    })
    .collect()
}

pub(super) fn configuration_service(
    store: &Arc<InMemoryGradeStore>,
    audit: &Arc<MemoryAuditSink>,
) -> ConfigurationService<InMemoryGradeStore, MemoryAuditSink> {
    ConfigurationService::new(store.clone(), audit.clone())
}

/// Seed the scheme, components, profiles, weight sets, and the transmutation
/// table through the administration facade so the audited path is the one
/// exercised everywhere.
pub(super) fn seed_configuration(store: &Arc<InMemoryGradeStore>, audit: &Arc<MemoryAuditSink>) {
    let ctx = ctx();
    let configuration = configuration_service(store, audit);

    configuration
        .create_scheme(&ctx, k12_scheme())
        .expect("scheme seeds");
    configuration
        .create_component(&ctx, component("comp-ww", "ww", "Written Work", 1))
        .expect("component seeds");
    configuration
        .create_component(&ctx, component("comp-pt", "pt", "Performance Task", 2))
        .expect("component seeds");

    configuration
        .create_weight_profile(&ctx, weight_profile("profile-math", "mathematics", false))
        .expect("profile seeds");
    configuration
        .create_weight_profile(&ctx, weight_profile("profile-general", "general", true))
        .expect("profile seeds");

    configuration
        .replace_component_weights(
            &ctx,
            &scheme_id(),
            Some(&ProfileId("profile-math".to_string())),
            vec![
                WeightAssignment {
                    component_id: ComponentId("comp-ww".to_string()),
                    weight_percent: 60.0,
                },
                WeightAssignment {
                    component_id: ComponentId("comp-pt".to_string()),
                    weight_percent: 40.0,
                },
            ],
        )
        .expect("math weights seed");
    configuration
        .replace_component_weights(
            &ctx,
            &scheme_id(),
            Some(&ProfileId("profile-general".to_string())),
            vec![
                WeightAssignment {
                    component_id: ComponentId("comp-ww".to_string()),
                    weight_percent: 50.0,
                },
                WeightAssignment {
                    component_id: ComponentId("comp-pt".to_string()),
                    weight_percent: 50.0,
                },
            ],
        )
        .expect("general weights seed");

    configuration
        .create_transmutation_table(
            &ctx,
            TransmutationTable {
                id: table_id(),
                scheme_id: scheme_id(),
                version: 0,
                published_at: Some(recorded_at()),
                archived_at: None,
            },
        )
        .expect("table seeds");
    configuration
        .replace_transmutation_rows(&ctx, &table_id(), standard_thresholds())
        .expect("rows seed");
}

/// Seed the mathematics section with two graded items and two students:
/// one with a present 8/10 and a missing score, one with two present scores.
pub(super) fn seed_section(store: &Arc<InMemoryGradeStore>) {
    store.insert_section(classified_section(Some("mathematics")));

    store.insert_item(graded_item("item-quiz", "comp-ww", 10.0));
    store.insert_item(graded_item("item-project", "comp-pt", 10.0));

    store.insert_score(score("item-quiz", "student-ana", ScoreStatus::Present, Some(8.0)));
    store.insert_score(score("item-project", "student-ana", ScoreStatus::Missing, None));
    store.insert_score(score("item-quiz", "student-ben", ScoreStatus::Present, Some(9.0)));
    store.insert_score(score(
        "item-project",
        "student-ben",
        ScoreStatus::Present,
        Some(7.0),
    ));

    for student in ["student-ana", "student-ben"] {
        store.insert_roster_member(RosterMember {
            section_id: section_id(),
            student_id: StudentId(student.to_string()),
            status: EnrollmentStatus::Active,
            ended_on: None,
        });
    }
}

pub(super) fn run_request() -> ComputeRunRequest {
    ComputeRunRequest {
        section_id: section_id(),
        term: "2025-q3".to_string(),
        scheme_id: scheme_id(),
        as_of: as_of(),
        transmutation_table_id: Some(table_id()),
    }
}

pub(super) fn seeded_service() -> (
    GradeComputationService<InMemoryGradeStore, MemoryAuditSink>,
    Arc<InMemoryGradeStore>,
    Arc<MemoryAuditSink>,
) {
    let store = Arc::new(InMemoryGradeStore::default());
    let audit = Arc::new(MemoryAuditSink::default());
    seed_configuration(&store, &audit);
    seed_section(&store);
    let service = GradeComputationService::new(store.clone(), audit.clone());
    (service, store, audit)
}

pub(super) fn continuous_metadata() -> SchemeMetadata {
    SchemeMetadata {
        rounding_mode: RoundingMode::Round,
        weight_policy: WeightPolicy::Strict,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
