//! Pooled statistics across users, without session semantics.
//!
//! These scans feed the time-per-event-type, click-count and selection
//! views. Averages divide a pooled total by the number of distinct users
//! that contributed to it.

use super::types::{label_of, seconds_between, Event, PayloadPath};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Time attributed to one event type across all users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTypeTime {
    pub event_type: String,
    pub total_seconds: f64,
    pub user_count: usize,
    pub average_seconds: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTypeTimes {
    pub event_types: Vec<EventTypeTime>,
    pub per_user: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Attributes the gap between adjacent events of the same user to the
/// earlier event's type.
///
/// Events are ordered by user, time stamp and event number first. A pair
/// whose event number goes backwards marks a restarted sequence and
/// contributes zero seconds.
pub fn time_per_event_type(mut events: Vec<Event>) -> EventTypeTimes {
    events.sort_by(|a, b| {
        a.user_name
            .cmp(&b.user_name)
            .then(a.time_stamp.cmp(&b.time_stamp))
            .then(a.event_number.cmp(&b.event_number))
    });

    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    let mut users: HashMap<String, BTreeSet<String>> = HashMap::new();
    let mut per_user: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();

    for pair in events.windows(2) {
        let (current, next) = (&pair[0], &pair[1]);
        if current.user_name != next.user_name {
            continue;
        }

        let seconds = if next.event_number >= current.event_number {
            seconds_between(current.time_stamp, next.time_stamp)
        } else {
            0.0
        };

        *totals.entry(current.event_type.clone()).or_insert(0.0) += seconds;
        users
            .entry(current.event_type.clone())
            .or_default()
            .insert(current.user_name.clone());
        *per_user
            .entry(current.user_name.clone())
            .or_default()
            .entry(current.event_type.clone())
            .or_insert(0.0) += seconds;
    }

    let event_types = totals
        .into_iter()
        .map(|(event_type, total_seconds)| {
            let user_count = users.get(&event_type).map_or(0, BTreeSet::len);
            EventTypeTime {
                average_seconds: average(total_seconds, user_count),
                event_type,
                total_seconds,
                user_count,
            }
        })
        .collect();

    EventTypeTimes {
        event_types,
        per_user,
    }
}

/// Click counts per operation, pooled and per user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationCounts {
    pub totals: BTreeMap<String, u64>,
    pub averages: BTreeMap<String, f64>,
    pub per_user: BTreeMap<String, BTreeMap<String, u64>>,
}

/// Counts the operation named at `field` for each event. Average is the
/// operation total over the number of users that performed it.
pub fn clicks_by_operation(events: &[Event], field: &PayloadPath) -> OperationCounts {
    let mut counts = OperationCounts::default();
    let mut users: HashMap<String, BTreeSet<&str>> = HashMap::new();

    for event in events {
        let operation = label_of(event.payload_value(field));
        *counts.totals.entry(operation.clone()).or_insert(0) += 1;
        *counts
            .per_user
            .entry(event.user_name.clone())
            .or_default()
            .entry(operation.clone())
            .or_insert(0) += 1;
        users.entry(operation).or_default().insert(&event.user_name);
    }

    counts.averages = counts
        .totals
        .iter()
        .map(|(operation, &total)| {
            let user_count = users.get(operation).map_or(0, BTreeSet::len);
            (operation.clone(), average(total as f64, user_count))
        })
        .collect();

    counts
}

/// One distinct selection value and how often it was picked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionBucket {
    pub value: Value,
    pub total: u64,
    pub user_count: usize,
    pub average: f64,
    pub per_user: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionPool {
    pub total_events: usize,
    pub buckets: Vec<SelectionBucket>,
}

/// Pools selection values after normalization so that `"123"` and `123`
/// land in the same bucket. Buckets keep first-seen order.
pub fn selection_pool(events: &[Event], field: &PayloadPath) -> SelectionPool {
    let mut buckets: Vec<SelectionBucket> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for event in events {
        let value = normalize_selection(event.payload_value(field));
        let key = value.to_string();
        let i = *index.entry(key).or_insert_with(|| {
            buckets.push(SelectionBucket {
                value,
                total: 0,
                user_count: 0,
                average: 0.0,
                per_user: BTreeMap::new(),
            });
            buckets.len() - 1
        });

        let bucket = &mut buckets[i];
        bucket.total += 1;
        *bucket.per_user.entry(event.user_name.clone()).or_insert(0) += 1;
    }

    for bucket in &mut buckets {
        bucket.user_count = bucket.per_user.len();
        bucket.average = average(bucket.total as f64, bucket.user_count);
    }

    SelectionPool {
        total_events: events.len(),
        buckets,
    }
}

/// Normalizes a selection value for pooling.
///
/// Missing and null stay null. JSON numbers, and strings whose trimmed form
/// is non-empty and parses as a finite number, become numbers; integral
/// values are stored as integers. Integers are kept exact at any width.
/// Everything else becomes a string.
pub fn normalize_selection(value: Option<&Value>) -> Value {
    match value {
        None | Some(Value::Null) => Value::Null,
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Value::Number(n.clone()),
        Some(Value::Number(n)) => n.as_f64().map_or(Value::Null, canonical_number),
        Some(Value::String(s)) => match parse_integer(s) {
            Some(exact) => exact,
            None => match parse_finite(s) {
                Some(f) => canonical_number(f),
                None => Value::String(s.clone()),
            },
        },
        Some(Value::Bool(b)) => Value::String(b.to_string()),
        Some(other) => Value::String(other.to_string()),
    }
}

fn parse_integer(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Value::from(i));
    }
    trimmed.parse::<u64>().ok().map(Value::from)
}

fn parse_finite(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn canonical_number(f: f64) -> Value {
    // 2^53: beyond this f64 no longer holds every integer.
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if f.fract() == 0.0 && f.abs() <= MAX_EXACT {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map_or(Value::Null, Value::Number)
    }
}

fn average(total: f64, users: usize) -> f64 {
    if users == 0 {
        0.0
    } else {
        total / users as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 3, h, m, s).unwrap()
    }

    fn event(user: &str, event_type: &str, number: i64, time: DateTime<Utc>, payload: Value) -> Event {
        Event {
            user_name: user.to_string(),
            employee_type: "full-time".to_string(),
            session_id: "s1".to_string(),
            event_number: number,
            event_type: event_type.to_string(),
            time_stamp: time,
            payload,
        }
    }

    #[test]
    fn test_time_per_event_type() {
        let events = vec![
            event("adrian", "GraspGUI Start", 3, at(9, 3, 33), json!({})),
            event("adrian", "Create", 1, at(9, 0, 0), json!({})),
            event("adrian", "Create", 2, at(9, 1, 3), json!({})),
            event("bianca", "Create", 1, at(9, 0, 0), json!({})),
            event("bianca", "Select", 2, at(9, 0, 57), json!({})),
        ];

        let result = time_per_event_type(events);

        let create = result
            .event_types
            .iter()
            .find(|t| t.event_type == "Create")
            .unwrap();
        // adrian: 63s + 150s, bianca: 57s
        assert_eq!(create.total_seconds, 270.0);
        assert_eq!(create.user_count, 2);
        assert_eq!(create.average_seconds, 135.0);

        // Last events of each user have no successor.
        assert!(result.event_types.iter().all(|t| t.event_type != "Select"));
        assert!(result.event_types.iter().all(|t| t.event_type != "GraspGUI Start"));
        assert_eq!(result.per_user["bianca"]["Create"], 57.0);
    }

    #[test]
    fn test_restarted_sequence_contributes_zero() {
        let events = vec![
            event("adrian", "Create", 9, at(9, 0, 0), json!({})),
            event("adrian", "Create", 1, at(9, 10, 0), json!({})),
        ];

        let result = time_per_event_type(events);
        assert_eq!(result.event_types[0].total_seconds, 0.0);
        assert_eq!(result.event_types[0].user_count, 1);
    }

    #[test]
    fn test_clicks_by_operation() {
        let field = PayloadPath::parse("payload.operation").unwrap();
        let events = vec![
            event("adrian", "Create", 1, at(9, 0, 0), json!({"operation": "new menu"})),
            event("adrian", "Create", 2, at(9, 1, 0), json!({"operation": "new menu"})),
            event("bianca", "Create", 1, at(9, 2, 0), json!({"operation": "edit menu"})),
        ];

        let counts = clicks_by_operation(&events, &field);

        assert_eq!(counts.totals["new menu"], 2);
        assert_eq!(counts.totals["edit menu"], 1);
        assert_eq!(counts.averages["new menu"], 2.0);
        assert_eq!(counts.averages["edit menu"], 1.0);
        assert_eq!(counts.per_user["adrian"]["new menu"], 2);
        assert!(!counts.per_user["bianca"].contains_key("new menu"));
    }

    #[test]
    fn test_clicks_missing_operation_is_unknown() {
        let field = PayloadPath::parse("payload.operation").unwrap();
        let events = vec![event("adrian", "Create", 1, at(9, 0, 0), json!({}))];

        let counts = clicks_by_operation(&events, &field);
        assert_eq!(counts.totals["Unknown"], 1);
    }

    #[test]
    fn test_selection_pool_normalization() {
        let field = PayloadPath::parse("payload.objectsExplorerSelection").unwrap();
        let events = vec![
            event("alice", "GraspGUI Start", 1, at(9, 0, 0), json!({"objectsExplorerSelection": "123"})),
            event("bianca", "GraspGUI Start", 1, at(9, 0, 0), json!({"objectsExplorerSelection": 123})),
            event("bianca", "GraspGUI Start", 2, at(9, 1, 0), json!({"objectsExplorerSelection": null})),
        ];

        let pool = selection_pool(&events, &field);

        assert_eq!(pool.total_events, 3);
        assert_eq!(pool.buckets.len(), 2);
        assert_eq!(pool.buckets[0].value, json!(123));
        assert_eq!(pool.buckets[0].total, 2);
        assert_eq!(pool.buckets[0].user_count, 2);
        assert_eq!(pool.buckets[0].average, 1.0);
        assert_eq!(pool.buckets[1].value, Value::Null);
        assert_eq!(pool.buckets[1].total, 1);
    }

    #[test]
    fn test_normalize_selection_edge_cases() {
        assert_eq!(normalize_selection(None), Value::Null);
        assert_eq!(normalize_selection(Some(&json!(" 42 "))), json!(42));
        assert_eq!(normalize_selection(Some(&json!("42.0"))), json!(42));
        assert_eq!(normalize_selection(Some(&json!(42.0))), json!(42));
        assert_eq!(normalize_selection(Some(&json!("1.5"))), json!(1.5));
        assert_eq!(normalize_selection(Some(&json!(""))), json!(""));
        assert_eq!(normalize_selection(Some(&json!("   "))), json!("   "));
        assert_eq!(normalize_selection(Some(&json!("inf"))), json!("inf"));
        assert_eq!(normalize_selection(Some(&json!("NaN"))), json!("NaN"));
        assert_eq!(normalize_selection(Some(&json!("elementA"))), json!("elementA"));
        assert_eq!(normalize_selection(Some(&json!(true))), json!("true"));
    }

    #[test]
    fn test_large_integer_selections_stay_distinct() {
        let above_exact = json!(9_007_199_254_740_993_i64);
        let neighbour = json!(9_007_199_254_740_992_i64);

        assert_eq!(normalize_selection(Some(&above_exact)), above_exact);
        assert_ne!(
            normalize_selection(Some(&above_exact)),
            normalize_selection(Some(&neighbour))
        );
        assert_eq!(
            normalize_selection(Some(&json!("9007199254740993"))),
            above_exact
        );
        assert_eq!(normalize_selection(Some(&json!(u64::MAX))), json!(u64::MAX));

        let path = PayloadPath::parse("payload.objectsExplorerSelection").unwrap();
        let events: Vec<Event> = [above_exact.clone(), neighbour, json!("9007199254740993")]
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                let payload = json!({ "objectsExplorerSelection": value });
                event("alice", "GraspGUI Start", i as i64, at(9, i as u32, 0), payload)
            })
            .collect();
        let pool = selection_pool(&events, &path);

        assert_eq!(pool.buckets.len(), 2);
        assert_eq!(pool.buckets[0].value, above_exact);
        assert_eq!(pool.buckets[0].total, 2);
    }
}
