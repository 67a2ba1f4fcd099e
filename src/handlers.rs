use axum::extract::{Path, Query, State};
use axum::{Json, http::StatusCode, response::IntoResponse};
use axum_extra::extract::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use chrono::Utc;
use std::sync::Arc;
use tracing::error;

use crate::models::{
    ClassDefinition, ClassInput, MonthSummary, MonthView, RuleInput, SaveSessionsRequest,
    ScheduleRule,
};
use crate::workspace::Workspace;
use crate::{
    AppState,
    auth::verify_token,
    error::{ApiError, ScheduleResult},
};

type BearerAuth = Option<TypedHeader<Authorization<Bearer>>>;

#[derive(Debug, serde::Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ClassesQuery {
    #[serde(default)]
    pub active_only: bool,
    pub token: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct MonthQuery {
    pub class_id: Option<String>,
    pub token: Option<String>,
}

fn authorize(state: &AppState, auth: BearerAuth, token: Option<&str>) -> Result<(), ApiError> {
    let auth_header = auth.map(|TypedHeader(a)| a);
    verify_token(&state.settings, auth_header, token)
}

/// Store I/O is blocking, so each request's workspace runs on the blocking
/// pool rather than a runtime worker.
async fn with_workspace<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut Workspace<'_>) -> ScheduleResult<T> + Send + 'static,
    T: Send + 'static,
{
    let repo = Arc::clone(&state.repo);
    let options = state.settings.schedule_options();
    let outcome = tokio::task::spawn_blocking(move || {
        let mut workspace = Workspace::new(&repo, options);
        work(&mut workspace)
    })
    .await
    .map_err(|e| {
        error!("Workspace task failed: {e}");
        ApiError::Unavailable("Schedule store is unavailable".into())
    })?;
    Ok(outcome?)
}

#[utoipa::path(get, path = "/", tag = "schedule")]
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Tutor Schedule API",
        "endpoints": {
            "/classes": "List or create classes",
            "/classes/{class_id}/rules": "Extra weekly rules for a class",
            "/months/{year}/{month}/sessions": "Month sessions (generated on read) and edits",
            "/months/{year}/{month}/summary": "Per-class and grand totals",
            "/months/{year}/{month}/sessions.ical": "Download month sessions as iCal file"
        }
    }))
}

#[utoipa::path(get, path = "/healthz/live", tag = "schedule")]
pub async fn healthz_live() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[utoipa::path(
    get,
    path = "/healthz/ready",
    responses(
        (status = 200, description = "Store reachable"),
        (status = 503, description = "Store unavailable")
    ),
    tag = "schedule"
)]
pub async fn healthz_ready(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let repo = Arc::clone(&state.repo);
    tokio::task::spawn_blocking(move || repo.ping())
        .await
        .map_err(|e| {
            error!("Readiness probe task failed: {e}");
            ApiError::Unavailable("Schedule store is unavailable".into())
        })??;
    Ok(Json(serde_json::json!({"status": "ok"})))
}

#[utoipa::path(
    get,
    path = "/classes",
    params(
        ("active_only" = Option<bool>, Query, description = "Only active classes"),
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    responses(
        (status = 200, description = "Classes sorted by name", body = [ClassDefinition]),
        (status = 401, description = "Invalid authentication token")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "classes"
)]
pub async fn list_classes(
    State(state): State<AppState>,
    auth: BearerAuth,
    Query(query): Query<ClassesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, auth, query.token.as_deref())?;
    let active_only = query.active_only;
    let classes = with_workspace(&state, move |ws| ws.list_classes(active_only)).await?;
    Ok(Json(classes))
}

#[utoipa::path(
    post,
    path = "/classes",
    request_body = ClassInput,
    responses(
        (status = 201, description = "Class created", body = ClassDefinition),
        (status = 400, description = "Validation failed or invalid rate expression"),
        (status = 401, description = "Invalid authentication token")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "classes"
)]
pub async fn create_class(
    State(state): State<AppState>,
    auth: BearerAuth,
    Query(query): Query<TokenQuery>,
    Json(input): Json<ClassInput>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, auth, query.token.as_deref())?;
    let class = with_workspace(&state, move |ws| ws.create_class(input, Utc::now())).await?;
    Ok((StatusCode::CREATED, Json(class)))
}

#[utoipa::path(
    put,
    path = "/classes/{class_id}",
    params(("class_id" = String, Path, description = "Class identifier")),
    request_body = ClassInput,
    responses(
        (status = 200, description = "Class saved", body = ClassDefinition),
        (status = 400, description = "Validation failed or invalid rate expression"),
        (status = 404, description = "Class not found")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "classes"
)]
pub async fn update_class(
    State(state): State<AppState>,
    auth: BearerAuth,
    Path(class_id): Path<String>,
    Query(query): Query<TokenQuery>,
    Json(input): Json<ClassInput>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, auth, query.token.as_deref())?;
    let class = with_workspace(&state, move |ws| ws.update_class(&class_id, input)).await?;
    Ok(Json(class))
}

#[utoipa::path(
    delete,
    path = "/classes/{class_id}",
    params(("class_id" = String, Path, description = "Class identifier")),
    responses(
        (status = 204, description = "Class and its rules deleted"),
        (status = 404, description = "Class not found")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "classes"
)]
pub async fn delete_class(
    State(state): State<AppState>,
    auth: BearerAuth,
    Path(class_id): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, auth, query.token.as_deref())?;
    with_workspace(&state, move |ws| ws.delete_class(&class_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/classes/{class_id}/rules",
    params(("class_id" = String, Path, description = "Class identifier")),
    responses(
        (status = 200, description = "Rules of the class", body = [ScheduleRule]),
        (status = 404, description = "Class not found")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "classes"
)]
pub async fn list_rules(
    State(state): State<AppState>,
    auth: BearerAuth,
    Path(class_id): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, auth, query.token.as_deref())?;
    let rules = with_workspace(&state, move |ws| ws.class_rules(&class_id)).await?;
    Ok(Json(rules))
}

#[utoipa::path(
    post,
    path = "/classes/{class_id}/rules",
    params(("class_id" = String, Path, description = "Class identifier")),
    request_body = RuleInput,
    responses(
        (status = 201, description = "Rule created", body = ScheduleRule),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Class not found")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "classes"
)]
pub async fn create_rule(
    State(state): State<AppState>,
    auth: BearerAuth,
    Path(class_id): Path<String>,
    Query(query): Query<TokenQuery>,
    Json(input): Json<RuleInput>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, auth, query.token.as_deref())?;
    let rule = with_workspace(&state, move |ws| ws.add_rule(&class_id, input, Utc::now())).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

#[utoipa::path(
    delete,
    path = "/classes/{class_id}/rules/{rule_id}",
    params(
        ("class_id" = String, Path, description = "Class identifier"),
        ("rule_id" = String, Path, description = "Rule identifier")
    ),
    responses(
        (status = 204, description = "Rule deleted"),
        (status = 404, description = "Class or rule not found")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "classes"
)]
pub async fn delete_rule(
    State(state): State<AppState>,
    auth: BearerAuth,
    Path((class_id, rule_id)): Path<(String, String)>,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, auth, query.token.as_deref())?;
    with_workspace(&state, move |ws| ws.delete_rule(&class_id, &rule_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/months/{year}/{month}/sessions",
    params(
        ("year" = i32, Path, description = "Year"),
        ("month" = u32, Path, description = "Month (1-12)"),
        ("class_id" = Option<String>, Query, description = "Limit the view to one class"),
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    responses(
        (status = 200, description = "Month view with missing sessions generated", body = MonthView),
        (status = 400, description = "Invalid month"),
        (status = 401, description = "Invalid authentication token")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "sessions"
)]
pub async fn get_month_sessions(
    State(state): State<AppState>,
    auth: BearerAuth,
    Path((year, month)): Path<(i32, u32)>,
    Query(query): Query<MonthQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, auth, query.token.as_deref())?;
    let class_id = query.class_id;
    let view = with_workspace(&state, move |ws| {
        ws.prepare_month(year, month, class_id.as_deref(), Utc::now())
    })
    .await?;
    Ok(Json(view))
}

#[utoipa::path(
    put,
    path = "/months/{year}/{month}/sessions",
    params(
        ("year" = i32, Path, description = "Year"),
        ("month" = u32, Path, description = "Month (1-12)")
    ),
    request_body = SaveSessionsRequest,
    responses(
        (status = 200, description = "Edits saved", body = MonthView),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Unknown session id"),
        (status = 409, description = "Edited rows do not match the month view")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "sessions"
)]
pub async fn save_month_sessions(
    State(state): State<AppState>,
    auth: BearerAuth,
    Path((year, month)): Path<(i32, u32)>,
    Query(query): Query<TokenQuery>,
    Json(request): Json<SaveSessionsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, auth, query.token.as_deref())?;
    let view = with_workspace(&state, move |ws| {
        ws.save_month(year, month, &request, Utc::now())
    })
    .await?;
    Ok(Json(view))
}

#[utoipa::path(
    delete,
    path = "/months/{year}/{month}/classes/{class_id}/sessions",
    params(
        ("year" = i32, Path, description = "Year"),
        ("month" = u32, Path, description = "Month (1-12)"),
        ("class_id" = String, Path, description = "Class identifier")
    ),
    responses(
        (status = 200, description = "Month reset to the base schedule", body = MonthView),
        (status = 404, description = "Class not found")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "sessions"
)]
pub async fn reset_month_sessions(
    State(state): State<AppState>,
    auth: BearerAuth,
    Path((year, month, class_id)): Path<(i32, u32, String)>,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, auth, query.token.as_deref())?;
    let view = with_workspace(&state, move |ws| {
        ws.reset_month(year, month, &class_id, Utc::now())
    })
    .await?;
    Ok(Json(view))
}

#[utoipa::path(
    get,
    path = "/months/{year}/{month}/summary",
    params(
        ("year" = i32, Path, description = "Year"),
        ("month" = u32, Path, description = "Month (1-12)")
    ),
    responses(
        (status = 200, description = "Month totals", body = MonthSummary),
        (status = 400, description = "Invalid month")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "sessions"
)]
pub async fn get_month_summary(
    State(state): State<AppState>,
    auth: BearerAuth,
    Path((year, month)): Path<(i32, u32)>,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, auth, query.token.as_deref())?;
    let summary =
        with_workspace(&state, move |ws| ws.month_summary(year, month, Utc::now())).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/months/{year}/{month}/sessions.ical",
    params(
        ("year" = i32, Path, description = "Year"),
        ("month" = u32, Path, description = "Month (1-12)"),
        ("class_id" = Option<String>, Query, description = "Limit the export to one class"),
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    responses(
        (status = 200, description = "iCal file", content_type = "text/calendar"),
        (status = 401, description = "Invalid authentication token"),
        (status = 404, description = "No sessions found")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "sessions"
)]
pub async fn get_month_ical(
    State(state): State<AppState>,
    auth: BearerAuth,
    Path((year, month)): Path<(i32, u32)>,
    Query(query): Query<MonthQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, auth, query.token.as_deref())?;
    let class_id = query.class_id;
    let view = with_workspace(&state, move |ws| {
        ws.prepare_month(year, month, class_id.as_deref(), Utc::now())
    })
    .await?;

    let body = state.exporter.generate(&view.sessions);
    if body.is_empty() {
        return Err(ApiError::NotFound("No sessions found".into()));
    }

    let disposition = format!("attachment; filename=sessions_{year}_{month:02}.ics");
    Ok((
        StatusCode::OK,
        [
            ("content-type", "text/calendar".to_string()),
            ("content-disposition", disposition),
        ],
        body,
    ))
}
