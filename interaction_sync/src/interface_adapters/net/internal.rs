use crate::domain::ObjectId;
use crate::domain::errors::HostError;
use crate::interface_adapters::http::error_response;
use crate::interface_adapters::state::AppState;
use crate::use_cases::SessionError;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{info, warn};

fn default_spawn_locked() -> bool {
    true
}

#[derive(Debug, serde::Deserialize)]
pub struct SpawnObjectRequest {
    // Scene-level kind; participants pick per-kind tuning from it.
    kind: String,
    // Freeze the object until its first exclusive hold.
    #[serde(default = "default_spawn_locked")]
    spawn_locked: bool,
}

#[derive(Debug, serde::Serialize)]
struct SpawnObjectResponse {
    object_id: ObjectId,
}

pub async fn spawn_object_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SpawnObjectRequest>,
) -> impl IntoResponse {
    let kind = payload.kind.trim().to_string();
    if kind.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "kind is required");
    }

    match state.session.spawn_object(kind.clone(), payload.spawn_locked).await {
        Ok(object_id) => {
            info!(object_id, %kind, "object spawned via http");
            (StatusCode::CREATED, Json(SpawnObjectResponse { object_id })).into_response()
        }
        Err(e) => {
            warn!(error = ?e, "spawn failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "session unavailable")
        }
    }
}

pub async fn despawn_object_handler(
    State(state): State<Arc<AppState>>,
    Path(object_id): Path<ObjectId>,
) -> impl IntoResponse {
    match state.session.despawn_object(object_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(SessionError::Host(HostError::UnknownObject(_))) => {
            error_response(StatusCode::NOT_FOUND, "object not found")
        }
        Err(e) => {
            warn!(object_id, error = ?e, "despawn failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "session unavailable")
        }
    }
}

pub async fn health_handler() -> &'static str {
    "ok"
}
