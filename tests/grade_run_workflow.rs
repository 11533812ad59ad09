//! Integration scenarios for the grade computation workflow, driven through
//! the public service facade so configuration, resolution, aggregation, and
//! persistence are exercised together.

mod common {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};

    use gradeworks::grading::{
        Component, ComponentId, ComputeRunRequest, ConfigurationService, EnrollmentStatus,
        GradeComputationService, GradedItem, GradedScore, GradingScheme, InMemoryGradeStore,
        ItemId, MemoryAuditSink, ProfileId, RequestContext, RosterMember, SchemeId,
        SchemeMetadata, SchemeType, ScoreStatus, SectionId, SectionProfile, StudentId, TableId,
        ThresholdAssignment, TransmutationTable, WeightAssignment, WeightPolicy, WeightProfile,
    };

    pub(super) fn ctx() -> RequestContext {
        RequestContext {
            organization_id: "org-maplewood".to_string(),
            actor_id: "registrar-1".to_string(),
        }
    }

    pub(super) fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 59)
            .single()
            .expect("valid timestamp")
    }

    fn recorded_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    pub(super) struct Fixture {
        pub(super) service: GradeComputationService<InMemoryGradeStore, MemoryAuditSink>,
        pub(super) store: Arc<InMemoryGradeStore>,
        pub(super) audit: Arc<MemoryAuditSink>,
    }

    pub(super) fn fixture_with(
        weight_policy: WeightPolicy,
        classification: Option<&str>,
    ) -> Fixture {
        let store = Arc::new(InMemoryGradeStore::default());
        let audit = Arc::new(MemoryAuditSink::default());
        let configuration = ConfigurationService::new(store.clone(), audit.clone());
        let ctx = ctx();

        let mut metadata = SchemeMetadata::defaults_for(SchemeType::K12);
        metadata.weight_policy = weight_policy;
        configuration
            .create_scheme(
                &ctx,
                GradingScheme {
                    id: SchemeId("scheme-k12".to_string()),
                    organization_id: ctx.organization_id.clone(),
                    name: "Quarterly Averaging".to_string(),
                    scheme_type: SchemeType::K12,
                    version: 1,
                    metadata,
                    published_at: Some(recorded_at()),
                    archived_at: None,
                },
            )
            .expect("scheme seeds");

        for (id, code, label, order) in [
            ("comp-ww", "ww", "Written Work", 1u32),
            ("comp-pt", "pt", "Performance Task", 2u32),
        ] {
            configuration
                .create_component(
                    &ctx,
                    Component {
                        id: ComponentId(id.to_string()),
                        scheme_id: SchemeId("scheme-k12".to_string()),
                        code: code.to_string(),
                        label: label.to_string(),
                        display_order: order,
                        archived_at: None,
                    },
                )
                .expect("component seeds");
        }

        for (id, key, is_default) in [
            ("profile-math", "mathematics", false),
            ("profile-general", "general", true),
        ] {
            configuration
                .create_weight_profile(
                    &ctx,
                    WeightProfile {
                        id: ProfileId(id.to_string()),
                        scheme_id: SchemeId("scheme-k12".to_string()),
                        profile_key: key.to_string(),
                        is_default,
                        archived_at: None,
                    },
                )
                .expect("profile seeds");
        }

        let weight_sets: [(&str, f64, f64); 2] =
            [("profile-math", 60.0, 40.0), ("profile-general", 50.0, 50.0)];
        for (profile, ww, pt) in weight_sets {
            configuration
                .replace_component_weights(
                    &ctx,
                    &SchemeId("scheme-k12".to_string()),
                    Some(&ProfileId(profile.to_string())),
                    vec![
                        WeightAssignment {
                            component_id: ComponentId("comp-ww".to_string()),
                            weight_percent: ww,
                        },
                        WeightAssignment {
                            component_id: ComponentId("comp-pt".to_string()),
                            weight_percent: pt,
                        },
                    ],
                )
                .expect("weights seed");
        }

        configuration
            .create_transmutation_table(
                &ctx,
                TransmutationTable {
                    id: TableId("table-doe".to_string()),
                    scheme_id: SchemeId("scheme-k12".to_string()),
                    version: 0,
                    published_at: Some(recorded_at()),
                    archived_at: None,
                },
            )
            .expect("table seeds");
        configuration
            .replace_transmutation_rows(
                &ctx,
                &TableId("table-doe".to_string()),
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
                .collect(),
            )
            .expect("rows seed");

        store.insert_section(SectionProfile {
            id: SectionId("section-7a".to_string()),
            organization_id: ctx.organization_id.clone(),
            primary_classification: classification.map(str::to_string),
            classification_source: classification.map(|_| "registrar".to_string()),
            program_id: Some("program-jhs".to_string()),
        });

        for (id, component, max_points) in
            [("item-quiz", "comp-ww", 10.0), ("item-project", "comp-pt", 10.0)]
        {
            store.insert_item(GradedItem {
                id: ItemId(id.to_string()),
                section_id: SectionId("section-7a".to_string()),
                term: "2025-q3".to_string(),
                component_id: ComponentId(component.to_string()),
                title: id.to_string(),
                max_points,
                created_at: recorded_at(),
            });
        }

        for (item, student, status, points_earned) in [
            ("item-quiz", "student-ana", ScoreStatus::Present, Some(8.0)),
            ("item-project", "student-ana", ScoreStatus::Missing, None),
        ] {
            store.insert_score(GradedScore {
                item_id: ItemId(item.to_string()),
                student_id: StudentId(student.to_string()),
                status,
                points_earned,
                created_at: recorded_at(),
            });
        }

        store.insert_roster_member(RosterMember {
            section_id: SectionId("section-7a".to_string()),
            student_id: StudentId("student-ana".to_string()),
            status: EnrollmentStatus::Active,
            ended_on: None,
        });

        let service = GradeComputationService::new(store.clone(), audit.clone());
        Fixture {
            service,
            store,
            audit,
        }
    }

    pub(super) fn run_request() -> ComputeRunRequest {
        ComputeRunRequest {
            section_id: SectionId("section-7a".to_string()),
            term: "2025-q3".to_string(),
            scheme_id: SchemeId("scheme-k12".to_string()),
            as_of: as_of(),
            transmutation_table_id: Some(TableId("table-doe".to_string())),
        }
    }
}

use common::*;
use gradeworks::grading::{
    AuditAction, ClassificationSource, RunStatus, WeightPolicy,
};

#[test]
fn classified_section_grades_through_its_own_profile() {
    let fixture = fixture_with(WeightPolicy::Strict, Some("mathematics"));

    let outcome = fixture
        .service
        .compute(&ctx(), run_request())
        .expect("run completes");

    assert_eq!(outcome.run.status, RunStatus::Completed);
    assert_eq!(
        outcome.run.resolved_profile.source,
        ClassificationSource::Canonical
    );

    let ana = &outcome.grades[0];
    assert_eq!(ana.initial_grade, 48.0);
    assert_eq!(ana.transmuted_grade, Some(75.0));
    assert_eq!(ana.final_numeric_grade, 75.0);
    assert_eq!(ana.breakdown.components.len(), 2);
    assert_eq!(ana.breakdown.components[0].weighted_score, 48.0);
    assert_eq!(ana.breakdown.components[1].weighted_score, 0.0);
}

#[test]
fn unclassified_section_falls_back_to_the_default_profile() {
    let fixture = fixture_with(WeightPolicy::Strict, None);

    let outcome = fixture
        .service
        .compute(&ctx(), run_request())
        .expect("run completes");

    let resolution = &outcome.run.resolved_profile;
    assert_eq!(resolution.profile_key, "general");
    assert_eq!(resolution.source, ClassificationSource::DefaultFallback);
    assert!(resolution.is_fallback);

    // The general profile weighs both components equally: 80% of half the
    // scale floors to 40, which the ladder maps to 72.
    let ana = &outcome.grades[0];
    assert_eq!(ana.initial_grade, 40.0);
    assert_eq!(ana.transmuted_grade, Some(72.0));
}

#[test]
fn normalize_policy_rescales_incomplete_weight_sets() {
    let fixture = fixture_with(WeightPolicy::Normalize, Some("mathematics"));
    let configuration = gradeworks::grading::ConfigurationService::new(
        fixture.store.clone(),
        fixture.audit.clone(),
    );
    configuration
        .replace_component_weights(
            &ctx(),
            &gradeworks::grading::SchemeId("scheme-k12".to_string()),
            Some(&gradeworks::grading::ProfileId("profile-math".to_string())),
            vec![
                gradeworks::grading::WeightAssignment {
                    component_id: gradeworks::grading::ComponentId("comp-ww".to_string()),
                    weight_percent: 70.0,
                },
                gradeworks::grading::WeightAssignment {
                    component_id: gradeworks::grading::ComponentId("comp-pt".to_string()),
                    weight_percent: 10.0,
                },
            ],
        )
        .expect("weights replaced");

    let outcome = fixture
        .service
        .compute(&ctx(), run_request())
        .expect("run completes");

    // 80% of weight 70 is 56 weighted points on an 80-point basis: 70 raw.
    let ana = &outcome.grades[0];
    assert_eq!(ana.initial_grade, 70.0);
    assert_eq!(ana.transmuted_grade, Some(85.0));
}

#[test]
fn run_lifecycle_is_fully_audited() {
    let fixture = fixture_with(WeightPolicy::Strict, Some("mathematics"));
    let before = fixture.audit.events().len();

    let outcome = fixture
        .service
        .compute(&ctx(), run_request())
        .expect("run completes");

    let events = fixture.audit.events();
    let run_events: Vec<_> = events[before..]
        .iter()
        .filter(|event| event.entity_id == outcome.run.id.0)
        .collect();

    assert!(run_events
        .iter()
        .any(|event| event.action == AuditAction::Created && event.entity_kind == "compute_run"));
    assert!(run_events
        .iter()
        .any(|event| event.action == AuditAction::Updated && event.entity_kind == "compute_run"));
    assert!(run_events
        .iter()
        .any(|event| event.action == AuditAction::Created
            && event.entity_kind == "computed_grades"));
}
