//! Interval attribution over reconstructed sessions.
//!
//! Each adjacent pair of events in a session defines an interval from the
//! first event to the second. The interval is attributed to the label of the
//! first (current) event, optionally clamped to a query window, and either
//! emitted as-is (timeline) or summed per label (aggregate).

use super::sessions::SessionGroup;
use super::types::{seconds_between, Event, IntervalRecord, PayloadPath, TimeWindow};
use std::collections::{BTreeMap, HashMap};

/// How intervals are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributionMode {
    /// One record per adjacent event pair, in order.
    Timeline,
    /// One record per distinct label within each session.
    AggregateByLabel,
}

/// Where the activity label of an event comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelSource {
    /// A configured payload path; falsy values become "Unknown".
    Payload(PayloadPath),
    /// The event's own `event_type`.
    EventType,
}

impl LabelSource {
    fn label(&self, event: &Event) -> String {
        match self {
            LabelSource::Payload(path) => event.label(path),
            LabelSource::EventType => event.event_type.clone(),
        }
    }
}

/// Output of an attribution pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attribution {
    pub records: Vec<IntervalRecord>,
    /// Number of non-empty sessions seen per user.
    pub session_counts: BTreeMap<String, u32>,
}

/// Parameterized attribution pass shared by the breakdown and timeline views.
#[derive(Debug, Clone)]
pub struct IntervalEngine {
    labels: LabelSource,
    window: Option<TimeWindow>,
    mode: AttributionMode,
}

impl IntervalEngine {
    pub fn new(labels: LabelSource, mode: AttributionMode) -> Self {
        Self {
            labels,
            window: None,
            mode,
        }
    }

    /// Clamps every interval to `window`.
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Attributes every session. Sessions without events are skipped and
    /// do not count towards their user's session total.
    pub fn run(&self, groups: Vec<SessionGroup>) -> Attribution {
        let mut attribution = Attribution::default();

        for mut group in groups {
            if group.events.is_empty() {
                continue;
            }

            *attribution
                .session_counts
                .entry(group.user_name.clone())
                .or_insert(0) += 1;

            // Stable, so equal event numbers keep their time order.
            group.events.sort_by_key(|e| e.event_number);

            let intervals = self.session_intervals(&group);
            match self.mode {
                AttributionMode::Timeline => attribution.records.extend(intervals),
                AttributionMode::AggregateByLabel => {
                    attribution.records.extend(aggregate_by_label(intervals))
                }
            }
        }

        tracing::debug!(
            records = attribution.records.len(),
            users = attribution.session_counts.len(),
            mode = ?self.mode,
            "Attributed session intervals"
        );

        attribution
    }

    /// Walks one session pairwise and produces its timeline intervals.
    fn session_intervals(&self, group: &SessionGroup) -> Vec<IntervalRecord> {
        let events = &group.events;
        let mut intervals = Vec::with_capacity(events.len());

        for (i, current) in events.iter().enumerate() {
            let next = events.get(i + 1).filter(|next| next.same_session(current));

            let (mut start, mut end, session_end) = match next {
                Some(next) => (current.time_stamp, next.time_stamp, false),
                None => (current.time_stamp, current.time_stamp, true),
            };

            if let Some(window) = self.window {
                if end < window.start {
                    continue;
                }
                // Events are time ordered, nothing later can fall back in range.
                if start > window.end {
                    break;
                }
                start = start.max(window.start);
                end = end.min(window.end);
            }

            intervals.push(IntervalRecord {
                user_name: group.user_name.clone(),
                session_id: group.session_id.clone(),
                label: self.labels.label(current),
                start_time: start,
                end_time: end,
                duration_seconds: seconds_between(start, end),
                session_end,
            });
        }

        intervals
    }
}

/// Folds a session's intervals into one record per label, in first-seen
/// order: durations summed, earliest start, latest end, and the session-end
/// flag of the label's last interval.
fn aggregate_by_label(intervals: Vec<IntervalRecord>) -> Vec<IntervalRecord> {
    let mut records: Vec<IntervalRecord> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for interval in intervals {
        match index.get(&interval.label) {
            Some(&i) => {
                let record = &mut records[i];
                record.duration_seconds += interval.duration_seconds;
                record.start_time = record.start_time.min(interval.start_time);
                record.end_time = record.end_time.max(interval.end_time);
                record.session_end = interval.session_end;
            }
            None => {
                index.insert(interval.label.clone(), records.len());
                records.push(interval);
            }
        }
    }

    records
}
