//! Event source abstraction.
//!
//! The analytics only need two primitives from the event store: filtered,
//! sorted retrieval and grouped counting. Filters are built from the query
//! configuration plus the request's time window and employee type, and are
//! pushed down into the store rather than applied after fetching.

use crate::analytics::Event;
use crate::error::{AnalyticsError, AnalyticsResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Field holding the event time, used for window filters.
pub const TIME_STAMP: &str = "time_stamp";

/// One predicate on an event field. Fields are top-level event columns or
/// dotted `payload.` paths.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the value (`null` matches missing or null).
    Equals { field: String, value: Value },
    /// Field is present (non-null) or absent.
    Exists { field: String, exists: bool },
    /// Time stamp within `[start, end]`, inclusive. Absent bounds are open.
    Between {
        field: String,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
    /// Field equals one of the strings.
    In { field: String, values: Vec<String> },
}

/// A conjunction of conditions. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Equals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn exists(mut self, field: impl Into<String>, exists: bool) -> Self {
        self.conditions.push(Condition::Exists {
            field: field.into(),
            exists,
        });
        self
    }

    pub fn one_of(mut self, field: impl Into<String>, values: Vec<String>) -> Self {
        self.conditions.push(Condition::In {
            field: field.into(),
            values,
        });
        self
    }

    /// Adds every condition of `other`.
    pub fn and(mut self, other: Filter) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Builds a filter from a stored query document such as
    /// `{"event_type": "Create", "payload.tab": {"$exists": true}}`.
    pub fn from_document(document: &Map<String, Value>) -> AnalyticsResult<Self> {
        let mut filter = Filter::new();

        for (field, value) in document {
            if field.is_empty() {
                return Err(AnalyticsError::configuration("empty field name in query"));
            }
            match value {
                Value::Object(operator) => match operator.get("$exists") {
                    Some(Value::Bool(exists)) if operator.len() == 1 => {
                        filter.conditions.push(Condition::Exists {
                            field: field.clone(),
                            exists: *exists,
                        });
                    }
                    _ => {
                        return Err(AnalyticsError::configuration(format!(
                            "unsupported query operator for field \"{field}\""
                        )))
                    }
                },
                Value::Array(_) => {
                    return Err(AnalyticsError::configuration(format!(
                        "array values are not supported for field \"{field}\""
                    )))
                }
                scalar => filter = filter.eq(field.clone(), scalar.clone()),
            }
        }

        Ok(filter)
    }
}

/// Matches `time_stamp` within `[start, end]`; absent bounds impose nothing.
pub fn time_interval_filter(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Filter {
    if start.is_none() && end.is_none() {
        return Filter::new();
    }
    Filter {
        conditions: vec![Condition::Between {
            field: TIME_STAMP.to_string(),
            start,
            end,
        }],
    }
}

/// Equality on `employee_type`; `None` imposes nothing.
pub fn employee_type_filter(employee_type: Option<&str>) -> Filter {
    match employee_type {
        Some(kind) => Filter::new().eq("employee_type", kind),
        None => Filter::new(),
    }
}

/// A sort key, ascending unless `descending` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Number of events sharing one combination of group-key values. `key`
/// holds the values in the order the group keys were requested.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupCount {
    pub key: Vec<Value>,
    pub count: u64,
}

/// Read access to persisted events, plus appending for ingestion.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Returns every event matching `filter`, ordered by `sort`.
    async fn fetch_ordered(&self, filter: &Filter, sort: &[SortKey])
        -> AnalyticsResult<Vec<Event>>;

    /// Counts matching events per distinct combination of `group_keys`.
    async fn count_grouped_by(
        &self,
        filter: &Filter,
        group_keys: &[&str],
    ) -> AnalyticsResult<Vec<GroupCount>>;

    /// Persists events, returning how many were stored.
    async fn insert_events(&self, events: Vec<Event>) -> AnalyticsResult<usize>;
}
