//! Data types for usage analytics.
//!
//! Defines the recorded GUI event, the payload path used to pull an
//! activity label out of it, and the derived interval records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Label used when the configured payload path yields nothing usable.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Placeholder for missing user names and employee types.
pub const UNKNOWN: &str = "unknown";

/// A single recorded GUI action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Who performed the action.
    #[serde(default = "unknown", deserialize_with = "or_unknown")]
    pub user_name: String,

    /// Employee classification, "unknown" when not recorded.
    #[serde(default = "unknown", deserialize_with = "or_unknown")]
    pub employee_type: String,

    /// Groups the events of one continuous usage session.
    #[serde(default, deserialize_with = "or_empty")]
    pub session_id: String,

    /// Sequence number within the session, independent of wall-clock time.
    #[serde(default)]
    pub event_number: i64,

    /// Kind of action (e.g. "Create", "GraspGUI Start").
    pub event_type: String,

    /// When the action happened.
    pub time_stamp: DateTime<Utc>,

    /// Free-form data whose shape depends on `event_type`.
    #[serde(default)]
    pub payload: Value,
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

fn or_unknown<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(unknown))
}

fn or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Event {
    /// Resolves a payload path against this event. Never fails: any missing
    /// step yields `None`.
    pub fn payload_value(&self, path: &PayloadPath) -> Option<&Value> {
        path.segments
            .iter()
            .try_fold(&self.payload, |value, key| value.get(key.as_str()))
    }

    /// Returns the activity label carried at `path`, or "Unknown".
    pub fn label(&self, path: &PayloadPath) -> String {
        label_of(self.payload_value(path))
    }

    /// Whether `other` belongs to the same (user, session) pair.
    pub fn same_session(&self, other: &Event) -> bool {
        self.user_name == other.user_name && self.session_id == other.session_id
    }
}

/// A dotted path into an event payload, e.g. `payload.tab`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadPath {
    field: String,
    segments: Vec<String>,
}

impl PayloadPath {
    /// Parses `payload.<key>[.<key>...]`. Returns `None` for anything that
    /// does not address a key inside the payload.
    pub fn parse(field: &str) -> Option<Self> {
        let rest = field.strip_prefix("payload.")?;
        let segments: Vec<String> = rest.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(Self {
            field: field.to_string(),
            segments,
        })
    }

    /// The full dotted field, as configured.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The document key holding the payload (always "payload").
    pub fn container_key(&self) -> &str {
        "payload"
    }

    /// The last key of the path, used to name the value in responses.
    pub fn leaf_key(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Keys below the container, outermost first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

/// Converts a looked-up payload value into an activity label.
///
/// Falsy values (missing, null, false, 0, NaN, "") collapse to "Unknown".
pub fn label_of(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => UNKNOWN_LABEL.to_string(),
        Some(Value::String(s)) if s.is_empty() => UNKNOWN_LABEL.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f == 0.0 || f.is_nan() => UNKNOWN_LABEL.to_string(),
            _ => n.to_string(),
        },
        Some(other) => other.to_string(),
    }
}

/// An inclusive query window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

/// Time attributed to one activity label within a session.
///
/// In timeline mode there is one record per adjacent event pair; in
/// aggregate mode one record per distinct label of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalRecord {
    pub user_name: String,
    pub session_id: String,
    pub label: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    /// The interval had no successor event in its session.
    pub session_end: bool,
}

/// Seconds between two instants with millisecond precision, never negative.
pub fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    ((end - start).num_milliseconds() as f64 / 1000.0).max(0.0)
}
