//! HTTP API router and handlers.
//!
//! Thin JSON adapter over [`ReportService`]. Every route except `/health`
//! requires the `x-forum-user` header, which the forum's gateway sets after
//! authenticating the caller.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::{ErrorContext, TribunalError};
use crate::models::{ModerationAction, Report, ReportActionLog, ReportStatus};
use crate::pagination::{Page, PageRequest};
use crate::service::{CreateReportRequest, ReportService, Resolution};

/// Header carrying the authenticated forum username.
pub const USER_HEADER: &str = "x-forum-user";

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReportService>,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl AppState {
    fn page(&self, query: &PageQuery) -> PageRequest {
        PageRequest::new(
            query.page.unwrap_or(1),
            query.per_page.unwrap_or(self.default_page_size),
            self.max_page_size,
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            request_id: None,
        }
    }

    /// Create an error response with a request ID for tracking
    pub fn with_request_id(error: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            request_id: Some(request_id.into()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueueQuery {
    pub status: Option<String>,
    pub community_id: Option<i64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub action: String,
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    pub note: Option<String>,
}

fn error_response(status: StatusCode, msg: &str) -> ApiError {
    (status, Json(ErrorResponse::new(msg)))
}

/// Convert a TribunalError to an API error, logging it with its context.
fn handle_error(error: TribunalError, context: ErrorContext) -> ApiError {
    error.log_with_context(&context);

    let status = match &error {
        TribunalError::Validation(_) => StatusCode::BAD_REQUEST,
        TribunalError::UserNotFound(_)
        | TribunalError::TargetNotFound { .. }
        | TribunalError::ReportNotFound(_) => StatusCode::NOT_FOUND,
        TribunalError::DuplicateReport { .. } | TribunalError::InvalidStateTransition { .. } => {
            StatusCode::CONFLICT
        }
        TribunalError::Database(_) | TribunalError::Io(_) => StatusCode::SERVICE_UNAVAILABLE,
        TribunalError::Config(_) | TribunalError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorResponse::with_request_id(
            error.user_message(),
            context.request_id,
        )),
    )
}

/// Username of the caller, or 401 when the gateway did not set one.
fn caller(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            error_response(
                StatusCode::UNAUTHORIZED,
                &format!("Missing {} header", USER_HEADER),
            )
        })
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/reports", post(create_report))
        .route("/api/reports/mine", get(my_reports))
        .route("/api/reports/{report_id}", get(get_report))
        .route("/api/reports/{report_id}/actions", get(get_action_log))
        .route("/api/reports/{report_id}/review", post(mark_under_review))
        .route("/api/reports/{report_id}/action", post(take_action))
        .route("/api/reports/{report_id}/reject", post(reject_report))
        .route("/api/moderation/queue", get(moderation_queue))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn create_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = caller(&headers)?;

    let report = state
        .service
        .create_report(&username, request)
        .await
        .map_err(|e| {
            handle_error(e, ErrorContext::new("create_report").with_username(&username))
        })?;

    Ok((StatusCode::CREATED, Json(report)))
}

async fn my_reports(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Report>>, ApiError> {
    let username = caller(&headers)?;

    let page = state
        .service
        .my_reports(&username, state.page(&query))
        .await
        .map_err(|e| {
            handle_error(e, ErrorContext::new("my_reports").with_username(&username))
        })?;

    Ok(Json(page))
}

async fn get_report(
    State(state): State<AppState>,
    Path(report_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Report>, ApiError> {
    let username = caller(&headers)?;

    let report = state.service.get_report(report_id).await.map_err(|e| {
        handle_error(
            e,
            ErrorContext::new("get_report")
                .with_report_id(report_id)
                .with_username(&username),
        )
    })?;

    Ok(Json(report))
}

async fn get_action_log(
    State(state): State<AppState>,
    Path(report_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Vec<ReportActionLog>>, ApiError> {
    let username = caller(&headers)?;

    let entries = state.service.action_log(report_id).await.map_err(|e| {
        handle_error(
            e,
            ErrorContext::new("get_action_log")
                .with_report_id(report_id)
                .with_username(&username),
        )
    })?;

    Ok(Json(entries))
}

async fn mark_under_review(
    State(state): State<AppState>,
    Path(report_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Report>, ApiError> {
    let username = caller(&headers)?;

    let report = state
        .service
        .mark_under_review(report_id, &username)
        .await
        .map_err(|e| {
            handle_error(
                e,
                ErrorContext::new("mark_under_review")
                    .with_report_id(report_id)
                    .with_username(&username),
            )
        })?;

    Ok(Json(report))
}

async fn take_action(
    State(state): State<AppState>,
    Path(report_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<ActionRequest>,
) -> Result<Json<Resolution>, ApiError> {
    let username = caller(&headers)?;
    let context = ErrorContext::new("take_action")
        .with_report_id(report_id)
        .with_username(&username);

    let action = ModerationAction::parse(&body.action).ok_or_else(|| {
        handle_error(
            TribunalError::Validation(format!("unknown action: {:?}", body.action)),
            context.clone(),
        )
    })?;

    let resolution = state
        .service
        .take_action(report_id, &username, action, body.note.as_deref())
        .await
        .map_err(|e| handle_error(e, context))?;

    Ok(Json(resolution))
}

async fn reject_report(
    State(state): State<AppState>,
    Path(report_id): Path<i64>,
    headers: HeaderMap,
    body: Option<Json<RejectRequest>>,
) -> Result<Json<Resolution>, ApiError> {
    let username = caller(&headers)?;
    let note = body.and_then(|Json(b)| b.note);

    let resolution = state
        .service
        .reject(report_id, &username, note.as_deref())
        .await
        .map_err(|e| {
            handle_error(
                e,
                ErrorContext::new("reject_report")
                    .with_report_id(report_id)
                    .with_username(&username),
            )
        })?;

    Ok(Json(resolution))
}

async fn moderation_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<QueueQuery>,
) -> Result<Json<Page<Report>>, ApiError> {
    let username = caller(&headers)?;
    let context = ErrorContext::new("moderation_queue").with_username(&username);

    let status = match query.status.as_deref() {
        None => ReportStatus::Pending,
        Some(raw) => ReportStatus::parse(&raw.trim().to_ascii_uppercase()).ok_or_else(|| {
            handle_error(
                TribunalError::Validation(format!("unknown status: {:?}", raw)),
                context.clone(),
            )
        })?,
    };
    let page = state.page(&PageQuery {
        page: query.page,
        per_page: query.per_page,
    });

    let queue = state
        .service
        .moderation_queue(status, query.community_id, page)
        .await
        .map_err(|e| handle_error(e, context))?;

    Ok(Json(queue))
}
