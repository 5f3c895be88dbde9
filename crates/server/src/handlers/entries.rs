//! Single-entry CRUD endpoints.

use crate::error::{ApiError, ApiResult};
use crate::identity::Identity;
use crate::state::AppState;
use alcove_core::Entry;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

/// Create a settings entry. `POST /settings/entries`
pub async fn create_entry(
    State(state): State<AppState>,
    identity: Identity,
    Json(entry): Json<Entry>,
) -> ApiResult<StatusCode> {
    let access = state.access(identity);
    let entry = access.create(entry).await?;
    tracing::debug!(
        tenant = %access.tenant(),
        id = %entry.id.unwrap_or_default(),
        scope = %entry.scope,
        "entry created"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Fetch a settings entry. `GET /settings/entries/{id}`
pub async fn get_entry(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Entry>> {
    let access = state.access(identity);
    Ok(Json(access.get(id).await?))
}

/// Replace a settings entry. `PUT /settings/entries/{id}`
pub async fn update_entry(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(entry): Json<Entry>,
) -> ApiResult<StatusCode> {
    if entry.id.is_some_and(|body_id| body_id != id) {
        return Err(ApiError::BadRequest(
            "id in body does not match path".to_string(),
        ));
    }
    let entry = Entry {
        id: Some(id),
        ..entry
    };
    let access = state.access(identity);
    access.update(entry).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a settings entry. `DELETE /settings/entries/{id}`
pub async fn delete_entry(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let access = state.access(identity);
    access.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
