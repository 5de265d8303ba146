//! Partitions a time-ordered event list into per-(user, session) groups.

use super::types::Event;
use std::collections::HashMap;

/// The ordered events of one (user, session) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionGroup {
    pub user_name: String,
    pub session_id: String,
    pub events: Vec<Event>,
}

/// Groups events by `(user_name, session_id)`.
///
/// Groups come out in the order their first event was encountered and each
/// group keeps the order events were received in. No sorting happens here;
/// the caller supplies time-ordered input. Pairs that reappear later in the
/// input are merged into their existing group.
pub fn group_by_session(events: impl IntoIterator<Item = Event>) -> Vec<SessionGroup> {
    let mut groups: Vec<SessionGroup> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for event in events {
        let key = (event.user_name.clone(), event.session_id.clone());
        match index.get(&key) {
            Some(&i) => groups[i].events.push(event),
            None => {
                index.insert(key, groups.len());
                groups.push(SessionGroup {
                    user_name: event.user_name.clone(),
                    session_id: event.session_id.clone(),
                    events: vec![event],
                });
            }
        }
    }

    groups
}
