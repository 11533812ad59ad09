//! Integration coverage for configuration administration: batch replacement
//! semantics and their interaction with run resolution.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use gradeworks::grading::{
    ClassificationSource, Component, ComponentId, ComputeRunRequest, ConfigStore,
    ConfigurationService, EnrollmentStatus, GradeComputationService, GradedItem, GradedScore,
    GradingScheme, InMemoryGradeStore, ItemId, MemoryAuditSink, ProfileId, RequestContext,
    RosterMember, SchemeId, SchemeMetadata, SchemeType, ScoreStatus, SectionId, SectionProfile,
    StudentId, TableId, ThresholdAssignment, TransmutationTable, WeightAssignment, WeightProfile,
};

fn ctx() -> RequestContext {
    RequestContext {
        organization_id: "org-maplewood".to_string(),
        actor_id: "registrar-1".to_string(),
    }
}

fn seeded() -> (
    Arc<InMemoryGradeStore>,
    Arc<MemoryAuditSink>,
    ConfigurationService<InMemoryGradeStore, MemoryAuditSink>,
) {
    let store = Arc::new(InMemoryGradeStore::default());
    let audit = Arc::new(MemoryAuditSink::default());
    let configuration = ConfigurationService::new(store.clone(), audit.clone());
    let ctx = ctx();

    configuration
        .create_scheme(
            &ctx,
            GradingScheme {
                id: SchemeId("scheme-k12".to_string()),
                organization_id: ctx.organization_id.clone(),
                name: "Quarterly Averaging".to_string(),
                scheme_type: SchemeType::K12,
                version: 1,
                metadata: SchemeMetadata::defaults_for(SchemeType::K12),
                published_at: None,
                archived_at: None,
            },
        )
        .expect("scheme seeds");

    for (id, code, order) in [("comp-ww", "ww", 1u32), ("comp-pt", "pt", 2u32)] {
        configuration
            .create_component(
                &ctx,
                Component {
                    id: ComponentId(id.to_string()),
                    scheme_id: SchemeId("scheme-k12".to_string()),
                    code: code.to_string(),
                    label: code.to_uppercase(),
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
        configuration
            .replace_component_weights(
                &ctx,
                &SchemeId("scheme-k12".to_string()),
                Some(&ProfileId(id.to_string())),
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
            .expect("weights seed");
    }

    configuration
        .create_transmutation_table(
            &ctx,
            TransmutationTable {
                id: TableId("table-doe".to_string()),
                scheme_id: SchemeId("scheme-k12".to_string()),
                version: 0,
                published_at: None,
                archived_at: None,
            },
        )
        .expect("table seeds");
    configuration
        .replace_transmutation_rows(
            &ctx,
            &TableId("table-doe".to_string()),
            vec![
                ThresholdAssignment {
                    initial_grade: 0.0,
                    transmuted_grade: 60.0,
                },
                ThresholdAssignment {
                    initial_grade: 45.0,
                    transmuted_grade: 75.0,
                },
            ],
        )
        .expect("rows seed");

    (store, audit, configuration)
}

#[test]
fn weight_replacement_is_atomic_for_readers() {
    let (store, _audit, configuration) = seeded();
    let scheme = SchemeId("scheme-k12".to_string());
    let profile = ProfileId("profile-math".to_string());

    let version = configuration
        .replace_component_weights(
            &ctx(),
            &scheme,
            Some(&profile),
            vec![
                WeightAssignment {
                    component_id: ComponentId("comp-ww".to_string()),
                    weight_percent: 55.0,
                },
                WeightAssignment {
                    component_id: ComponentId("comp-pt".to_string()),
                    weight_percent: 45.0,
                },
            ],
        )
        .expect("replacement succeeds");
    assert_eq!(version, 2);

    let active = store
        .active_weights(&scheme, Some(&profile))
        .expect("reads");
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|weight| weight.archived_at.is_none()));
    assert!(active.iter().all(|weight| weight.version == 2));
}

#[test]
fn duplicate_thresholds_leave_the_table_untouched() {
    let (store, _audit, configuration) = seeded();
    let table = TableId("table-doe".to_string());

    let before = store.active_transmutation_rows(&table).expect("reads");
    let result = configuration.replace_transmutation_rows(
        &ctx(),
        &table,
        vec![
            ThresholdAssignment {
                initial_grade: 45.0,
                transmuted_grade: 75.0,
            },
            ThresholdAssignment {
                initial_grade: 45.0,
                transmuted_grade: 76.0,
            },
        ],
    );

    assert!(result.is_err());
    let after = store.active_transmutation_rows(&table).expect("reads");
    assert_eq!(before, after);
}

#[test]
fn archiving_a_profile_redirects_resolution_to_the_default() {
    let (store, audit, configuration) = seeded();

    store.insert_section(SectionProfile {
        id: SectionId("section-7a".to_string()),
        organization_id: ctx().organization_id,
        primary_classification: Some("mathematics".to_string()),
        classification_source: Some("registrar".to_string()),
        program_id: None,
    });
    let recorded_at = Utc
        .with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
        .single()
        .expect("valid timestamp");
    store.insert_item(GradedItem {
        id: ItemId("item-quiz".to_string()),
        section_id: SectionId("section-7a".to_string()),
        term: "2025-q3".to_string(),
        component_id: ComponentId("comp-ww".to_string()),
        title: "Quiz".to_string(),
        max_points: 10.0,
        created_at: recorded_at,
    });
    store.insert_score(GradedScore {
        item_id: ItemId("item-quiz".to_string()),
        student_id: StudentId("student-ana".to_string()),
        status: ScoreStatus::Present,
        points_earned: Some(8.0),
        created_at: recorded_at,
    });
    store.insert_roster_member(RosterMember {
        section_id: SectionId("section-7a".to_string()),
        student_id: StudentId("student-ana".to_string()),
        status: EnrollmentStatus::Active,
        ended_on: None,
    });

    configuration
        .archive_weight_profile(&ctx(), &ProfileId("profile-math".to_string()))
        .expect("archives");

    let service = GradeComputationService::new(store, audit);
    let outcome = service
        .compute(
            &ctx(),
            ComputeRunRequest {
                section_id: SectionId("section-7a".to_string()),
                term: "2025-q3".to_string(),
                scheme_id: SchemeId("scheme-k12".to_string()),
                as_of: Utc
                    .with_ymd_and_hms(2025, 3, 31, 0, 0, 0)
                    .single()
                    .expect("valid timestamp"),
                transmutation_table_id: Some(TableId("table-doe".to_string())),
            },
        )
        .expect("run completes");

    let resolution = &outcome.run.resolved_profile;
    assert_eq!(resolution.profile_key, "general");
    assert_eq!(resolution.source, ClassificationSource::DefaultFallback);
    assert!(resolution.is_fallback);
}
