use crate::domain::{OwnershipPolicy, OwnershipRules};
use crate::interface_adapters::http::ErrorResponse;
use crate::interface_adapters::net::client::spawn_table_serializers;
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::ids::conn_id;
use crate::use_cases::TableError;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

const MAX_TABLE_ID_LEN: usize = 128;

#[derive(Debug, Default, serde::Deserialize)]
pub struct TableCreateRequest {
    // Generated when absent.
    #[serde(default)]
    table_id: Option<String>,
    // "permissive" or "exclusive"; the server default when absent.
    #[serde(default)]
    ownership: Option<String>,
    #[serde(default)]
    lock_blocks_drag: Option<bool>,
    #[serde(default)]
    drag_timeout_ms: Option<u64>,
}

#[derive(Debug, serde::Serialize)]
struct TableCreateResponse {
    table_id: String,
}

fn bad_request(error: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response()
}

pub async fn create_table_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TableCreateRequest>,
) -> impl IntoResponse {
    let table_id = match payload.table_id.as_deref().map(str::trim) {
        Some("") => return bad_request("table_id must not be empty".to_string()),
        Some(id) if id.len() > MAX_TABLE_ID_LEN => {
            return bad_request("table_id is too long".to_string());
        }
        Some(id) => id.to_string(),
        None => format!("table-{:x}", conn_id()),
    };

    let mut ownership: OwnershipRules = state.table_registry.default_ownership();
    if let Some(policy) = payload.ownership.as_deref() {
        match policy.parse::<OwnershipPolicy>() {
            Ok(policy) => ownership.policy = policy,
            Err(e) => return bad_request(e),
        }
    }
    if let Some(lock_blocks_drag) = payload.lock_blocks_drag {
        ownership.lock_blocks_drag = lock_blocks_drag;
    }
    if let Some(ms) = payload.drag_timeout_ms {
        // Zero disables the timeout.
        ownership.drag_timeout = (ms > 0).then(|| ms as f64 / 1000.0);
    }

    match state
        .table_registry
        .create_table(table_id.clone(), state.scene.clone(), Some(ownership))
        .await
    {
        Ok(table) => {
            // Serializers first so clients can subscribe immediately.
            spawn_table_serializers(&table);
            (StatusCode::CREATED, Json(TableCreateResponse { table_id })).into_response()
        }
        Err(TableError::AlreadyExists) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "table already exists".to_string(),
            }),
        )
            .into_response(),
    }
}
