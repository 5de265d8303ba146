//! Event pool and pooled-count endpoints.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::{non_empty, time_range};
use crate::analytics::{
    EventTypePayloads, EventTypeTimes, OperationCounts, SelectionPool, UserPayloads,
};
use crate::error::AnalyticsResult;
use crate::server::state::AppState;
use crate::service::EventPool;

/// Query parameters for the event pool.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolQuery {
    /// Key in `queries.json`
    pub event_type: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub employee_type: Option<String>,
}

/// Optional window and employee type for the pooled views.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PooledQuery {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub employee_type: Option<String>,
}

/// GET /api/pool - Grouped counts for a configured event type.
///
/// Query params:
/// - `eventType`: key in `queries.json` (required)
/// - `startTime`, `endTime`: window bounds (required)
/// - `employeeType`: optional filter
pub async fn get_event_pool(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PoolQuery>, QueryRejection>,
) -> AnalyticsResult<Json<EventPool>> {
    let Query(query) = query?;
    let range = time_range(non_empty(&query.start_time), non_empty(&query.end_time))?;
    let pool = state
        .service
        .fetch_event_pool(
            non_empty(&query.event_type),
            range,
            non_empty(&query.employee_type),
        )
        .await?;
    Ok(Json(pool))
}

/// GET /api/pool/time - Time spent per event type.
pub async fn get_time_per_event_type(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PooledQuery>, QueryRejection>,
) -> AnalyticsResult<Json<EventTypeTimes>> {
    let Query(query) = query?;
    let range = time_range(non_empty(&query.start_time), non_empty(&query.end_time))?;
    let times = state
        .service
        .time_per_event_type(range, non_empty(&query.employee_type))
        .await?;
    Ok(Json(times))
}

/// GET /api/clicks - Click counts per operation.
pub async fn get_clicks(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PooledQuery>, QueryRejection>,
) -> AnalyticsResult<Json<OperationCounts>> {
    let Query(query) = query?;
    let range = time_range(non_empty(&query.start_time), non_empty(&query.end_time))?;
    let counts = state
        .service
        .clicks_by_operation(range, non_empty(&query.employee_type))
        .await?;
    Ok(Json(counts))
}

/// GET /api/selections - Selection value frequencies.
pub async fn get_selections(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PooledQuery>, QueryRejection>,
) -> AnalyticsResult<Json<SelectionPool>> {
    let Query(query) = query?;
    let range = time_range(non_empty(&query.start_time), non_empty(&query.end_time))?;
    let pool = state
        .service
        .selection_pool(range, non_empty(&query.employee_type))
        .await?;
    Ok(Json(pool))
}

/// GET /api/selections/values - Distinct stored selection values.
pub async fn get_selection_values(
    State(state): State<Arc<AppState>>,
) -> AnalyticsResult<Json<Vec<Value>>> {
    let values = state.service.selection_values().await?;
    Ok(Json(values))
}

/// GET /api/payloads/event-types - Distinct payload counts per event type.
pub async fn get_payloads_by_event_type(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PooledQuery>, QueryRejection>,
) -> AnalyticsResult<Json<Vec<EventTypePayloads>>> {
    let Query(query) = query?;
    let range = time_range(non_empty(&query.start_time), non_empty(&query.end_time))?;
    let payloads = state
        .service
        .payloads_by_event_type(range, non_empty(&query.employee_type))
        .await?;
    Ok(Json(payloads))
}

/// GET /api/payloads/users - Distinct payload counts per user.
pub async fn get_actions_by_user(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PooledQuery>, QueryRejection>,
) -> AnalyticsResult<Json<Vec<UserPayloads>>> {
    let Query(query) = query?;
    let range = time_range(non_empty(&query.start_time), non_empty(&query.end_time))?;
    let actions = state
        .service
        .actions_by_user(range, non_empty(&query.employee_type))
        .await?;
    Ok(Json(actions))
}
