//! Session breakdown and timeline endpoints.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{non_empty, time_range};
use crate::error::AnalyticsResult;
use crate::server::state::AppState;
use crate::service::{SessionBreakdown, SessionTimeline};

/// Query parameters for the session breakdown.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsQuery {
    /// Key in `sessions.json`
    pub event_type: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// Restrict to one user
    pub user_name: Option<String>,
    pub employee_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineQuery {
    /// Optional key in `sessions.json`; labels are event types without it
    pub event_type: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// GET /api/sessions - Per-session label durations with employee totals
/// and per-session averages.
///
/// Query params:
/// - `eventType`: key in `sessions.json` (required)
/// - `startTime`, `endTime`: window bounds (required)
/// - `userName`, `employeeType`: optional filters
pub async fn get_sessions(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SessionsQuery>, QueryRejection>,
) -> AnalyticsResult<Json<SessionBreakdown>> {
    let Query(query) = query?;
    let range = time_range(non_empty(&query.start_time), non_empty(&query.end_time))?;
    let breakdown = state
        .service
        .fetch_session_breakdown(
            non_empty(&query.event_type),
            range,
            non_empty(&query.user_name),
            non_empty(&query.employee_type),
        )
        .await?;
    Ok(Json(breakdown))
}

/// GET /api/sessions/:session_id/timeline - Intervals of one session.
pub async fn get_session_timeline(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    query: Result<Query<TimelineQuery>, QueryRejection>,
) -> AnalyticsResult<Json<SessionTimeline>> {
    let Query(query) = query?;
    let range = time_range(non_empty(&query.start_time), non_empty(&query.end_time))?;
    let timeline = state
        .service
        .fetch_session_timeline(&session_id, range, non_empty(&query.event_type))
        .await?;
    Ok(Json(timeline))
}
