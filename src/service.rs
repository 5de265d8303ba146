//! Request-level analytics operations.
//!
//! Each operation validates its arguments, resolves configuration, pushes
//! its filters into the event source and then runs the in-memory analytics
//! over the fetched batch. Any failure aborts the whole operation.

use crate::analytics::{
    actions_by_user, clicks_by_operation, compute_employee_stats, group_by_session,
    payloads_by_event_type, selection_pool, time_per_event_type, AttributionMode, EmployeeStats,
    Event, EventTypePayloads, EventTypeTimes, IntervalEngine, IntervalRecord, LabelSource,
    OperationCounts, SelectionPool, TimeWindow, UserPayloads, UNKNOWN,
};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::query_config::{ConfigKind, ConfigStore};
use crate::settings::PooledField;
use crate::source::{employee_type_filter, time_interval_filter, EventSource, Filter, SortKey};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Optional time bounds as they arrive from a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Both bounds are mandatory for windowed views.
    pub fn require(self) -> AnalyticsResult<TimeWindow> {
        let start = self.start.ok_or(AnalyticsError::MissingParameter("startTime"))?;
        let end = self.end.ok_or(AnalyticsError::MissingParameter("endTime"))?;
        if start > end {
            return Err(AnalyticsError::InvalidParameter {
                name: "startTime",
                reason: "must not be after endTime".to_string(),
            });
        }
        Ok(TimeWindow::new(start, end))
    }

    fn filter(self) -> Filter {
        time_interval_filter(self.start, self.end)
    }
}

impl From<TimeWindow> for TimeRange {
    fn from(window: TimeWindow) -> Self {
        Self::new(Some(window.start), Some(window.end))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolMeta {
    pub event_type_key: String,
    pub count: usize,
}

/// Grouped event count for one (user, event type, employee type, value).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolEvent {
    pub user_name: String,
    pub event_type: String,
    pub employee_type: String,
    pub payload: Map<String, Value>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventPool {
    pub meta: PoolMeta,
    pub events: Vec<PoolEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionBreakdown {
    pub sessions: Vec<IntervalRecord>,
    #[serde(flatten)]
    pub stats: EmployeeStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionTimeline {
    pub session_id: String,
    pub total_events: usize,
    pub total_duration_seconds: f64,
    pub timeline: Vec<IntervalRecord>,
}

/// The analytics entry points, bound to one event source and config store.
#[derive(Clone)]
pub struct AnalyticsService {
    source: Arc<dyn EventSource>,
    config: Arc<ConfigStore>,
    clicks: PooledField,
    selections: PooledField,
}

impl AnalyticsService {
    pub fn new(
        source: Arc<dyn EventSource>,
        config: Arc<ConfigStore>,
        clicks: PooledField,
        selections: PooledField,
    ) -> Self {
        Self {
            source,
            config,
            clicks,
            selections,
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Counts events of a configured type grouped by user, type, employee
    /// type and the configured payload value.
    pub async fn fetch_event_pool(
        &self,
        event_type_key: Option<&str>,
        range: TimeRange,
        employee_type: Option<&str>,
    ) -> AnalyticsResult<EventPool> {
        let key = required(event_type_key, "eventType")?;
        let window = range.require()?;
        let resolved = self.config.resolve(ConfigKind::Queries, key).await?;

        let filter = resolved
            .filter
            .and(TimeRange::from(window).filter())
            .and(employee_type_filter(employee_type));
        let groups = self
            .source
            .count_grouped_by(
                &filter,
                &["user_name", "event_type", "employee_type", resolved.payload.field()],
            )
            .await?;

        let leaf = resolved.payload.leaf_key().to_string();
        let events: Vec<PoolEvent> = groups
            .into_iter()
            .map(|group| {
                let mut values = group.key.into_iter();
                let user_name = text_or_unknown(values.next());
                let event_type = text_or_unknown(values.next());
                let employee_type = text_or_unknown(values.next());
                let mut payload = Map::new();
                payload.insert(leaf.clone(), values.next().unwrap_or(Value::Null));
                PoolEvent {
                    user_name,
                    event_type,
                    employee_type,
                    payload,
                    count: group.count,
                }
            })
            .collect();

        tracing::info!(event_type = %resolved.key, groups = events.len(), "Built event pool");

        Ok(EventPool {
            meta: PoolMeta {
                event_type_key: resolved.key,
                count: events.len(),
            },
            events,
        })
    }

    /// Per-session, per-label durations with per-employee totals and
    /// averages.
    ///
    /// A session is selected when it has an event at or after the window
    /// start and an event at or before the window end, so sessions whose
    /// only interval spans the whole window are kept. All of their events
    /// are then fetched and intervals crossing the window edges are clamped.
    pub async fn fetch_session_breakdown(
        &self,
        event_type_key: Option<&str>,
        range: TimeRange,
        user_name: Option<&str>,
        employee_type: Option<&str>,
    ) -> AnalyticsResult<SessionBreakdown> {
        let key = required(event_type_key, "eventType")?;
        let window = range.require()?;
        let resolved = self.config.resolve(ConfigKind::Sessions, key).await?;

        let mut base = resolved.filter.and(employee_type_filter(employee_type));
        if let Some(user) = user_name {
            base = base.eq("user_name", user);
        }

        let reach_start = self
            .session_keys(base.clone().and(time_interval_filter(Some(window.start), None)))
            .await?;
        let reach_end = self
            .session_keys(base.clone().and(time_interval_filter(None, Some(window.end))))
            .await?;
        let touched: HashSet<(String, String)> =
            reach_start.intersection(&reach_end).cloned().collect();

        let events = if touched.is_empty() {
            Vec::new()
        } else {
            let mut session_ids: Vec<String> =
                touched.iter().map(|(_, session)| session.clone()).collect();
            session_ids.sort();
            session_ids.dedup();

            self.source
                .fetch_ordered(&base.one_of("session_id", session_ids), &time_order())
                .await?
                .into_iter()
                .filter(|e| touched.contains(&(e.user_name.clone(), e.session_id.clone())))
                .collect()
        };

        let attribution = IntervalEngine::new(
            LabelSource::Payload(resolved.payload),
            AttributionMode::AggregateByLabel,
        )
        .with_window(window)
        .run(group_by_session(events));
        let stats = compute_employee_stats(&attribution.records, &attribution.session_counts);

        tracing::info!(
            event_type = %key,
            sessions = touched.len(),
            records = attribution.records.len(),
            "Built session breakdown"
        );

        Ok(SessionBreakdown {
            sessions: attribution.records,
            stats,
        })
    }

    /// Distinct (user, session) pairs with at least one event matching
    /// `filter`.
    async fn session_keys(&self, filter: Filter) -> AnalyticsResult<HashSet<(String, String)>> {
        let groups = self
            .source
            .count_grouped_by(&filter, &["user_name", "session_id"])
            .await?;
        Ok(groups
            .into_iter()
            .map(|group| {
                let mut values = group.key.into_iter();
                (text_or_unknown(values.next()), text_or_empty(values.next()))
            })
            .collect())
    }

    /// One record per interval of a single session, clamped to the window.
    ///
    /// With an event-type key the label comes from its configured payload
    /// field and its query narrows the events; without one the label is the
    /// event type.
    pub async fn fetch_session_timeline(
        &self,
        session_id: &str,
        range: TimeRange,
        event_type_key: Option<&str>,
    ) -> AnalyticsResult<SessionTimeline> {
        let session_id = required(Some(session_id), "sessionId")?;
        let window = range.require()?;

        let (filter, labels) = match event_type_key {
            Some(key) => {
                let resolved = self.config.resolve(ConfigKind::Sessions, key).await?;
                (resolved.filter, LabelSource::Payload(resolved.payload))
            }
            None => (Filter::new(), LabelSource::EventType),
        };

        let events = self
            .source
            .fetch_ordered(&filter.eq("session_id", session_id), &time_order())
            .await?;
        let total_events = events.len();

        let attribution = IntervalEngine::new(labels, AttributionMode::Timeline)
            .with_window(window)
            .run(group_by_session(events));
        let total_duration_seconds = attribution
            .records
            .iter()
            .map(|r| r.duration_seconds)
            .sum();

        tracing::info!(session_id = %session_id, events = total_events, "Built session timeline");

        Ok(SessionTimeline {
            session_id: session_id.to_string(),
            total_events,
            total_duration_seconds,
            timeline: attribution.records,
        })
    }

    /// Time spent per event type across users.
    pub async fn time_per_event_type(
        &self,
        range: TimeRange,
        employee_type: Option<&str>,
    ) -> AnalyticsResult<EventTypeTimes> {
        let filter = range.filter().and(employee_type_filter(employee_type));
        let sort = [
            SortKey::asc("user_name"),
            SortKey::asc("time_stamp"),
            SortKey::asc("event_number"),
        ];
        let events = self.source.fetch_ordered(&filter, &sort).await?;
        Ok(time_per_event_type(events))
    }

    /// Operation click counts for the configured click event type.
    pub async fn clicks_by_operation(
        &self,
        range: TimeRange,
        employee_type: Option<&str>,
    ) -> AnalyticsResult<OperationCounts> {
        let events = self.fetch_pooled(&self.clicks, range, employee_type).await?;
        Ok(clicks_by_operation(&events, &self.clicks.field))
    }

    /// Selection frequencies for the configured selection event type.
    pub async fn selection_pool(
        &self,
        range: TimeRange,
        employee_type: Option<&str>,
    ) -> AnalyticsResult<SelectionPool> {
        let events = self
            .fetch_pooled(&self.selections, range, employee_type)
            .await?;
        Ok(selection_pool(&events, &self.selections.field))
    }

    /// Distinct stored values of the selection field.
    pub async fn selection_values(&self) -> AnalyticsResult<Vec<Value>> {
        let field = self.selections.field.field();
        let groups = self
            .source
            .count_grouped_by(&Filter::new().exists(field, true), &[field])
            .await?;
        Ok(groups
            .into_iter()
            .filter_map(|g| g.key.into_iter().next())
            .collect())
    }

    /// Distinct payloads per event type with their counts.
    pub async fn payloads_by_event_type(
        &self,
        range: TimeRange,
        employee_type: Option<&str>,
    ) -> AnalyticsResult<Vec<EventTypePayloads>> {
        let events = self.fetch_all(range, employee_type).await?;
        Ok(payloads_by_event_type(&events))
    }

    /// Distinct payloads per user with their counts.
    pub async fn actions_by_user(
        &self,
        range: TimeRange,
        employee_type: Option<&str>,
    ) -> AnalyticsResult<Vec<UserPayloads>> {
        let events = self.fetch_all(range, employee_type).await?;
        Ok(actions_by_user(&events))
    }

    async fn fetch_all(
        &self,
        range: TimeRange,
        employee_type: Option<&str>,
    ) -> AnalyticsResult<Vec<Event>> {
        let filter = range.filter().and(employee_type_filter(employee_type));
        self.source.fetch_ordered(&filter, &time_order()).await
    }

    async fn fetch_pooled(
        &self,
        pooled: &PooledField,
        range: TimeRange,
        employee_type: Option<&str>,
    ) -> AnalyticsResult<Vec<Event>> {
        let filter = Filter::new()
            .eq("event_type", pooled.event_type.as_str())
            .and(range.filter())
            .and(employee_type_filter(employee_type));
        self.source.fetch_ordered(&filter, &time_order()).await
    }

    /// Distinct event types.
    pub async fn event_types(&self) -> AnalyticsResult<Vec<String>> {
        self.distinct("event_type").await
    }

    /// Distinct user names.
    pub async fn users(&self) -> AnalyticsResult<Vec<String>> {
        self.distinct("user_name").await
    }

    /// Number of recorded events per user.
    pub async fn user_interactions(&self) -> AnalyticsResult<BTreeMap<String, u64>> {
        let groups = self
            .source
            .count_grouped_by(&Filter::new(), &["user_name"])
            .await?;
        Ok(groups
            .into_iter()
            .map(|g| (text_or_unknown(g.key.into_iter().next()), g.count))
            .collect())
    }

    async fn distinct(&self, field: &str) -> AnalyticsResult<Vec<String>> {
        let groups = self
            .source
            .count_grouped_by(&Filter::new(), &[field])
            .await?;
        Ok(groups
            .into_iter()
            .map(|g| text_or_unknown(g.key.into_iter().next()))
            .collect())
    }

    /// Stores a batch of recorded events.
    pub async fn ingest(&self, events: Vec<Event>) -> AnalyticsResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        let count = self.source.insert_events(events).await?;
        tracing::info!(count, "Ingested events");
        Ok(count)
    }
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> AnalyticsResult<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AnalyticsError::MissingParameter(name)),
    }
}

fn time_order() -> [SortKey; 2] {
    [SortKey::asc("time_stamp"), SortKey::asc("event_number")]
}

fn text_or_unknown(value: Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => UNKNOWN.to_string(),
        Some(other) => other.to_string(),
    }
}

fn text_or_empty(value: Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
