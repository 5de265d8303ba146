//! Payload frequency tables.
//!
//! Counts identical payloads per event type and per user. Descriptive keys
//! that make otherwise equal actions unique (window titles, class names)
//! are dropped before comparing.

use super::types::Event;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Keys ignored when grouping payloads by event type.
pub const EVENT_TYPE_EXCLUDED_KEYS: [&str; 5] =
    ["className", "object", "Application Title", "classname", "name"];

/// Keys ignored when grouping payloads by user. Nested objects are dropped
/// as well.
pub const USER_EXCLUDED_KEYS: [&str; 4] = ["className", "object", "Application Title", "classname"];

/// One distinct payload and how many events carried it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadCount {
    pub payload: Map<String, Value>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTypePayloads {
    pub event_type: String,
    pub payloads: Vec<PayloadCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPayloads {
    pub user_name: String,
    pub payloads: Vec<PayloadCount>,
}

/// Counts distinct payloads per event type, ignoring
/// [`EVENT_TYPE_EXCLUDED_KEYS`]. Event types come out sorted; payloads keep
/// first-seen order.
pub fn payloads_by_event_type(events: &[Event]) -> Vec<EventTypePayloads> {
    tally(events, |e| &e.event_type, |payload| {
        strip(payload, |key, _| !EVENT_TYPE_EXCLUDED_KEYS.contains(&key))
    })
    .into_iter()
    .map(|(event_type, payloads)| EventTypePayloads {
        event_type,
        payloads,
    })
    .collect()
}

/// Counts distinct payloads per user, ignoring [`USER_EXCLUDED_KEYS`] and
/// nested objects.
pub fn actions_by_user(events: &[Event]) -> Vec<UserPayloads> {
    tally(events, |e| &e.user_name, |payload| {
        strip(payload, |key, value| {
            !USER_EXCLUDED_KEYS.contains(&key) && !value.is_object()
        })
    })
    .into_iter()
    .map(|(user_name, payloads)| UserPayloads {
        user_name,
        payloads,
    })
    .collect()
}

fn tally<'a>(
    events: &'a [Event],
    outer: impl Fn(&'a Event) -> &'a String,
    normalize: impl Fn(&Value) -> Map<String, Value>,
) -> BTreeMap<String, Vec<PayloadCount>> {
    let mut groups: BTreeMap<String, Vec<PayloadCount>> = BTreeMap::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for event in events {
        let group = outer(event);
        let payload = normalize(&event.payload);
        let identity = (group.clone(), Value::Object(payload.clone()).to_string());

        let counts = groups.entry(group.clone()).or_default();
        match index.get(&identity) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(identity, counts.len());
                counts.push(PayloadCount { payload, count: 1 });
            }
        }
    }

    groups
}

/// Keeps the payload entries accepted by `keep`. Non-object payloads are
/// treated as empty.
fn strip(payload: &Value, keep: impl Fn(&str, &Value) -> bool) -> Map<String, Value> {
    match payload {
        Value::Object(map) => map
            .iter()
            .filter(|(key, value)| keep(key, value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        _ => Map::new(),
    }
}
