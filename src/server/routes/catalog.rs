//! Event catalog and ingestion endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::analytics::Event;
use crate::error::AnalyticsResult;
use crate::server::state::AppState;

/// GET /api/event-types - Distinct event types.
pub async fn get_event_types(
    State(state): State<Arc<AppState>>,
) -> AnalyticsResult<Json<Vec<String>>> {
    Ok(Json(state.service.event_types().await?))
}

/// GET /api/users - Distinct user names.
pub async fn get_users(State(state): State<Arc<AppState>>) -> AnalyticsResult<Json<Vec<String>>> {
    Ok(Json(state.service.users().await?))
}

/// GET /api/users/interactions - Event count per user.
pub async fn get_user_interactions(
    State(state): State<Arc<AppState>>,
) -> AnalyticsResult<Json<BTreeMap<String, u64>>> {
    Ok(Json(state.service.user_interactions().await?))
}

#[derive(Serialize)]
pub struct IngestResponse {
    pub inserted: usize,
}

/// POST /api/events - Store a batch of recorded events.
pub async fn post_events(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Vec<Event>>, JsonRejection>,
) -> AnalyticsResult<(StatusCode, Json<IngestResponse>)> {
    let Json(events) = body?;
    let inserted = state.service.ingest(events).await?;
    Ok((StatusCode::CREATED, Json(IngestResponse { inserted })))
}
