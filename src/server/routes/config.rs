//! Query configuration endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::AnalyticsResult;
use crate::query_config::{manager::EntrySpec, ConfigKind};
use crate::server::state::AppState;

#[derive(Debug, Serialize)]
pub struct ConfigKeysResponse {
    pub kind: ConfigKind,
    pub keys: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfigEntryResponse {
    pub kind: ConfigKind,
    pub key: String,
}

/// GET /api/config/:kind - Entry keys of `queries` or `sessions`.
pub async fn get_config(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> AnalyticsResult<Json<ConfigKeysResponse>> {
    let kind: ConfigKind = kind.parse()?;
    let keys = state.service.config().load(kind).await?.keys();
    Ok(Json(ConfigKeysResponse { kind, keys }))
}

/// POST /api/config/:kind - Append an entry.
pub async fn post_config(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    body: Result<Json<EntrySpec>, JsonRejection>,
) -> AnalyticsResult<(StatusCode, Json<ConfigEntryResponse>)> {
    let Json(spec) = body?;
    let kind: ConfigKind = kind.parse()?;
    let key = state.service.config().append(kind, &spec).await?;
    Ok((StatusCode::CREATED, Json(ConfigEntryResponse { kind, key })))
}

/// PUT /api/config/:kind/:key - Replace an entry.
pub async fn put_config(
    State(state): State<Arc<AppState>>,
    Path((kind, key)): Path<(String, String)>,
    body: Result<Json<EntrySpec>, JsonRejection>,
) -> AnalyticsResult<Json<ConfigEntryResponse>> {
    let Json(spec) = body?;
    let kind: ConfigKind = kind.parse()?;
    let key = state.service.config().update(kind, &key, &spec).await?;
    Ok(Json(ConfigEntryResponse { kind, key }))
}

/// DELETE /api/config/:kind/:key - Remove an entry.
pub async fn delete_config(
    State(state): State<Arc<AppState>>,
    Path((kind, key)): Path<(String, String)>,
) -> AnalyticsResult<StatusCode> {
    let kind: ConfigKind = kind.parse()?;
    state.service.config().delete(kind, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}
