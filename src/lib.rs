pub mod auth;
pub mod error;
pub mod handlers;
pub mod ical;
pub mod ledger;
pub mod models;
pub mod openapi;
pub mod rate;
pub mod repository;
pub mod schedule;
pub mod settings;
pub mod store;
pub mod summary;
pub mod validation;
pub mod workspace;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, put};
use handlers::{
    create_class, create_rule, delete_class, delete_rule, get_month_ical, get_month_sessions,
    get_month_summary, healthz_live, healthz_ready, list_classes, list_rules, reset_month_sessions,
    root, save_month_sessions, update_class,
};
use tower_http::LatencyUnit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::ical::ICalExporter;
use crate::openapi::ApiDoc;
use crate::repository::Repository;
use crate::settings::Settings;
use crate::store::JsonFileStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub repo: Arc<Repository>,
    pub exporter: Arc<ICalExporter>,
}

impl AppState {
    pub fn new(settings: Settings, repo: Repository) -> Self {
        Self {
            settings,
            repo: Arc::new(repo),
            exporter: Arc::new(ICalExporter::new()),
        }
    }
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;

    let env_filter = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .without_time()
        .init();

    let store = JsonFileStore::open(&settings.data_dir)?;
    info!(data_dir = %settings.data_dir, "Opened schedule store");
    let state = AppState::new(settings, Repository::new(Arc::new(store)));

    let app = build_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.settings.port));
    info!("Starting Tutor Schedule API on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    let mut router = Router::new()
        .route("/", get(root))
        .route("/healthz/live", get(healthz_live))
        .route("/healthz/ready", get(healthz_ready))
        .route("/classes", get(list_classes).post(create_class))
        .route("/classes/{class_id}", put(update_class).delete(delete_class))
        .route("/classes/{class_id}/rules", get(list_rules).post(create_rule))
        .route("/classes/{class_id}/rules/{rule_id}", delete(delete_rule))
        .route(
            "/months/{year}/{month}/sessions",
            get(get_month_sessions).put(save_month_sessions),
        )
        .route(
            "/months/{year}/{month}/classes/{class_id}/sessions",
            delete(reset_month_sessions),
        )
        .route("/months/{year}/{month}/summary", get(get_month_summary))
        .route("/months/{year}/{month}/sessions.ical", get(get_month_ical))
        .with_state(state.clone());

    if state.settings.enable_swagger {
        let openapi = ApiDoc::openapi();
        let swagger = SwaggerUi::new("/docs").url("/openapi.json", openapi);
        router = router.merge(swagger);
    }

    router.layer(trace_layer)
}
