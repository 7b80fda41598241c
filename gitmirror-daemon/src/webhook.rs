//! Notification and health endpoints.
//!
//! | route      | method | response                                             |
//! |------------|--------|------------------------------------------------------|
//! | `/webhook` | POST   | 200 updated, 401 unauthenticated, 500 update failure |
//! | `/health`  | GET    | JSON [`HealthReport`]                                |

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::state::AppState;
use crate::update::{self, Stage};

/// Largest notification body accepted; covers GitHub's 25 MB payload cap.
pub const MAX_NOTIFICATION_BYTES: usize = 32 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/webhook",
            post(handle_webhook).layer(DefaultBodyLimit::max(MAX_NOTIFICATION_BYTES)),
        )
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    tracing::info!(stage = %Stage::Received, bytes = body.len(), "notification received");

    if !auth::validate(&headers, &body, &state.secret) {
        tracing::warn!(stage = %Stage::Rejected, "notification failed authentication");
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    tracing::info!(stage = %Stage::Authenticated, "notification authenticated");

    // The update runs on its own task so a disconnecting client cannot cancel it.
    let task = tokio::spawn(async move { update::run_update(&state).await });
    match task.await {
        Ok(Ok(report)) => (StatusCode::OK, report.message()).into_response(),
        Ok(Err(err)) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "update task join failure");
            (StatusCode::INTERNAL_SERVER_ERROR, "update task failed").into_response()
        }
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(health_report(&state).await)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub uptime: String,
    pub started_at: String,
    pub repo: RepoHealth,
    #[serde(rename = "repoExists")]
    pub repo_exists: bool,
    pub content_root: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoHealth {
    pub url: String,
    pub active_path: String,
    pub partition: String,
}

pub async fn health_report(state: &AppState) -> HealthReport {
    let partitions = state.partitions().await;
    let source = state.source().await;
    let active_path = partitions.active_path();

    HealthReport {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: format_uptime(state.started.elapsed()),
        started_at: state.started_at.to_rfc3339(),
        repo: RepoHealth {
            url: source.url,
            active_path: active_path.display().to_string(),
            partition: partitions.active().to_string(),
        },
        repo_exists: active_path.exists(),
        content_root: state
            .content
            .current_root()
            .await
            .map(|root| root.display().to_string()),
    }
}

/// `3725s` → `1h2m5s`.
pub fn format_uptime(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
