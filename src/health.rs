//! Health check endpoint for deployment platform monitoring.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use crate::database::Database;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: bool,
}

/// Router serving `/health`, to be merged into the API router.
pub fn health_router(db: Arc<Database>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(db)
}

/// 200 when the database answers, 503 otherwise.
async fn health_handler(State(db): State<Arc<Database>>) -> (StatusCode, Json<HealthReport>) {
    match db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthReport {
                status: "ok",
                database: true,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthReport {
                    status: "degraded",
                    database: false,
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::database::Database;
    use crate::health::health_router;

    #[tokio::test]
    async fn health_reports_ok() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let response = health_router(db)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn health_reports_degraded_when_pool_closed() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        db.pool().close().await;

        let response = health_router(db)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
