use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use chrono::{DateTime, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use gradeworks::config::AppConfig;
use gradeworks::error::AppError;
use gradeworks::grading::{
    grading_router, Component, ComponentId, ComputeRunRequest, ComputedGrade,
    ConfigurationService, EnrollmentStatus, GradeComputationService, GradedItem, GradedScore,
    GradingScheme, InMemoryGradeStore, ItemId, MemoryAuditSink, ProfileId, RequestContext,
    RosterMember, RunOutcome, SchemeId, SchemeMetadata, SchemeType, ScoreStatus, SectionId,
    SectionProfile, StudentId, TableId, ThresholdAssignment, TransmutationTable, WeightAssignment,
    WeightProfile,
};
use gradeworks::telemetry;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "gradeworks",
    about = "Compute official academic grades for class sections",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Seed an in-memory store and run one grading computation end to end
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
    /// Preload the demo fixtures so the API is exercisable out of the box
    #[arg(long)]
    seed_demo: bool,
}

#[derive(Args, Debug, Default)]
struct DemoArgs {
    /// Snapshot boundary for the run (RFC 3339). Defaults to now.
    #[arg(long, value_parser = parse_timestamp)]
    as_of: Option<DateTime<Utc>>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Demo(args) => run_demo(args),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| format!("failed to parse '{raw}' as RFC 3339 ({err})"))
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let store = Arc::new(InMemoryGradeStore::default());
    let audit = Arc::new(MemoryAuditSink::default());
    if args.seed_demo {
        seed_demo_fixtures(&store, &audit)?;
    }
    let service = Arc::new(GradeComputationService::new(store, audit));

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(grading_router(service))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "grade computation service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

fn demo_context() -> RequestContext {
    RequestContext {
        organization_id: "org-demo".to_string(),
        actor_id: "registrar".to_string(),
    }
}

/// Populate the store with a small quarterly-averaging setup: one K-12
/// scheme, two weighted components, a default profile, a transmutation
/// ladder, and a two-student section roster with scores.
fn seed_demo_fixtures(
    store: &Arc<InMemoryGradeStore>,
    audit: &Arc<MemoryAuditSink>,
) -> Result<(), AppError> {
    let ctx = demo_context();
    let configuration = ConfigurationService::new(store.clone(), audit.clone());

    let scheme = configuration.create_scheme(
        &ctx,
        GradingScheme {
            id: SchemeId("scheme-quarterly".to_string()),
            organization_id: ctx.organization_id.clone(),
            name: "Quarterly Averaging".to_string(),
            scheme_type: SchemeType::K12,
            version: 1,
            metadata: SchemeMetadata::defaults_for(SchemeType::K12),
            published_at: Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).single().expect("valid timestamp")),
            archived_at: None,
        },
    )?;

    for (id, code, label, order) in [
        ("comp-ww", "ww", "Written Work", 1u32),
        ("comp-pt", "pt", "Performance Task", 2u32),
    ] {
        configuration.create_component(
            &ctx,
            Component {
                id: ComponentId(id.to_string()),
                scheme_id: scheme.id.clone(),
                code: code.to_string(),
                label: label.to_string(),
                display_order: order,
                archived_at: None,
            },
        )?;
    }

    let profile = configuration.create_weight_profile(
        &ctx,
        WeightProfile {
            id: ProfileId("profile-general".to_string()),
            scheme_id: scheme.id.clone(),
            profile_key: "general".to_string(),
            is_default: true,
            archived_at: None,
        },
    )?;

    configuration.replace_component_weights(
        &ctx,
        &scheme.id,
        Some(&profile.id),
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
    )?;

    let table = configuration.create_transmutation_table(
        &ctx,
        TransmutationTable {
            id: TableId("table-doe".to_string()),
            scheme_id: scheme.id.clone(),
            version: 0,
            published_at: Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).single().expect("valid timestamp")),
            archived_at: None,
        },
    )?;
    configuration.replace_transmutation_rows(
        &ctx,
        &table.id,
        [
            (0.0, 60.0),
            (40.0, 72.0),
            (45.0, 75.0),
            (50.0, 78.0),
            (60.0, 82.0),
            (70.0, 85.0),
            (80.0, 88.0),
            (90.0, 93.0),
            (98.0, 99.0),
        ]
        .into_iter()
        .map(|(initial_grade, transmuted_grade)| ThresholdAssignment {
            initial_grade,
            transmuted_grade,
        })
        .collect(),
    )?;

    store.insert_section(SectionProfile {
        id: SectionId("section-7a".to_string()),
        organization_id: ctx.organization_id.clone(),
        primary_classification: None,
        classification_source: None,
        program_id: Some("program-jhs".to_string()),
    });

    let recorded_at = Utc.with_ymd_and_hms(2025, 8, 20, 9, 0, 0).single().expect("valid timestamp");
    for (id, component, title, max_points) in [
        ("item-quiz-1", "comp-ww", "Quiz 1", 10.0),
        ("item-project-1", "comp-pt", "Project 1", 10.0),
    ] {
        store.insert_item(GradedItem {
            id: ItemId(id.to_string()),
            section_id: SectionId("section-7a".to_string()),
            term: "2025-q1".to_string(),
            component_id: ComponentId(component.to_string()),
            title: title.to_string(),
            max_points,
            created_at: recorded_at,
        });
    }

    let scores = [
        ("item-quiz-1", "student-ana", ScoreStatus::Present, Some(8.0)),
        ("item-project-1", "student-ana", ScoreStatus::Missing, None),
        ("item-quiz-1", "student-ben", ScoreStatus::Present, Some(9.0)),
        (
            "item-project-1",
            "student-ben",
            ScoreStatus::Present,
            Some(7.0),
        ),
    ];
    for (item, student, status, points_earned) in scores {
        store.insert_score(GradedScore {
            item_id: ItemId(item.to_string()),
            student_id: StudentId(student.to_string()),
            status,
            points_earned,
            created_at: recorded_at,
        });
    }

    for student in ["student-ana", "student-ben"] {
        store.insert_roster_member(RosterMember {
            section_id: SectionId("section-7a".to_string()),
            student_id: StudentId(student.to_string()),
            status: EnrollmentStatus::Active,
            ended_on: None,
        });
    }

    Ok(())
}

fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let store = Arc::new(InMemoryGradeStore::default());
    let audit = Arc::new(MemoryAuditSink::default());
    seed_demo_fixtures(&store, &audit)?;

    let ctx = demo_context();
    let service = GradeComputationService::new(store, audit.clone());
    let as_of = args.as_of.unwrap_or_else(Utc::now);

    let outcome = service.compute(
        &ctx,
        ComputeRunRequest {
            section_id: SectionId("section-7a".to_string()),
            term: "2025-q1".to_string(),
            scheme_id: SchemeId("scheme-quarterly".to_string()),
            as_of,
            transmutation_table_id: Some(TableId("table-doe".to_string())),
        },
    )?;

    render_outcome(&outcome);
    println!("\nAudit events recorded: {}", audit.events().len());
    Ok(())
}

fn render_outcome(outcome: &RunOutcome) {
    let run = &outcome.run;
    println!("Grading run {}", run.id.0);
    println!(
        "Section {} / term {} (as of {})",
        run.section_id.0, run.term, run.as_of
    );
    println!(
        "Weight profile: {} via {}{}",
        run.resolved_profile.profile_key,
        run.resolved_profile.source.label(),
        if run.resolved_profile.is_fallback {
            " (fallback)"
        } else {
            ""
        }
    );
    println!("Status: {}", run.status.label());

    for grade in &outcome.grades {
        print_grade(grade);
    }
}

fn print_grade(grade: &ComputedGrade) {
    println!("\nStudent {}", grade.student_id.0);
    for line in &grade.breakdown.components {
        println!(
            "- {} ({}): {:.1}/{:.1} = {:.1}% x {:.0}% -> {:.2}",
            line.label,
            line.code,
            line.raw_total,
            line.max_total,
            line.percent,
            line.weight_percent,
            line.weighted_score
        );
    }
    match grade.transmuted_grade {
        Some(transmuted) => println!(
            "Initial {:.2} -> transmuted {:.0} (final {:.0})",
            grade.initial_grade, transmuted, grade.final_numeric_grade
        ),
        None => println!(
            "Initial {:.2} (final {:.2})",
            grade.initial_grade, grade.final_numeric_grade
        ),
    }
}
