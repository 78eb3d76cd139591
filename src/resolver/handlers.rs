use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;

use crate::shared::state::AppState;

use super::{ResolveError, ResolveRequest, Resolution};

impl IntoResponse for ResolveError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = self.to_string();
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub fn configure_resolution_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/contacts/resolve", post(resolve_handler))
        .route("/health", get(health_check))
}

pub async fn resolve_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<Resolution>, ResolveError> {
    let resolution = state.resolver.resolve(request).await?;
    Ok(Json(resolution))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let db_ok = state.conn.get().is_ok();

    let status = if db_ok { "healthy" } else { "degraded" };
    let code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "service": "contactserver",
            "version": env!("CARGO_PKG_VERSION"),
            "database": db_ok
        })),
    )
}
