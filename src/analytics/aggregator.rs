//! Per-employee statistics from attributed session intervals.

use super::types::IntervalRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Seconds per label, keyed by user then label.
pub type LabelSeconds = BTreeMap<String, BTreeMap<String, f64>>;

/// Totals and per-session averages for every (user, label) pair seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmployeeStats {
    pub totals: LabelSeconds,
    pub averages: LabelSeconds,
}

/// Sums interval durations per user and label, then divides by the user's
/// session count. A missing or zero count divides by one.
pub fn compute_employee_stats(
    records: &[IntervalRecord],
    session_counts: &BTreeMap<String, u32>,
) -> EmployeeStats {
    let mut totals: LabelSeconds = BTreeMap::new();

    for record in records {
        *totals
            .entry(record.user_name.clone())
            .or_default()
            .entry(record.label.clone())
            .or_insert(0.0) += record.duration_seconds;
    }

    let averages = totals
        .iter()
        .map(|(user, labels)| {
            let sessions = session_counts.get(user).copied().unwrap_or(0).max(1) as f64;
            let per_session = labels
                .iter()
                .map(|(label, total)| (label.clone(), total / sessions))
                .collect();
            (user.clone(), per_session)
        })
        .collect();

    EmployeeStats { totals, averages }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(user: &str, session: &str, label: &str, secs: f64) -> IntervalRecord {
        let now = Utc::now();
        IntervalRecord {
            user_name: user.to_string(),
            session_id: session.to_string(),
            label: label.to_string(),
            start_time: now,
            end_time: now,
            duration_seconds: secs,
            session_end: false,
        }
    }

    #[test]
    fn test_totals_and_averages() {
        let records = vec![
            record("bianca", "s1", "TabA", 300.0),
            record("bianca", "s2", "TabA", 100.0),
            record("bianca", "s2", "TabB", 50.0),
            record("alice", "s3", "TabB", 0.0),
        ];
        let counts = BTreeMap::from([("bianca".to_string(), 2), ("alice".to_string(), 1)]);

        let stats = compute_employee_stats(&records, &counts);

        assert_eq!(stats.totals["bianca"]["TabA"], 400.0);
        assert_eq!(stats.averages["bianca"]["TabA"], 200.0);
        assert_eq!(stats.averages["bianca"]["TabB"], 25.0);
        assert_eq!(stats.totals["alice"]["TabB"], 0.0);
        // No zero-filling for pairs that never occurred.
        assert!(!stats.totals["alice"].contains_key("TabA"));
    }

    #[test]
    fn test_zero_session_count_divides_by_one() {
        let records = vec![record("bianca", "s1", "TabA", 90.0)];
        let counts = BTreeMap::from([("bianca".to_string(), 0)]);

        let stats = compute_employee_stats(&records, &counts);
        assert_eq!(stats.averages["bianca"]["TabA"], 90.0);

        let stats = compute_employee_stats(&records, &BTreeMap::new());
        assert_eq!(stats.averages["bianca"]["TabA"], 90.0);
    }

    #[test]
    fn test_averages_times_sessions_equal_totals() {
        let records = vec![
            record("bianca", "s1", "TabA", 13.0),
            record("bianca", "s2", "TabA", 7.5),
            record("bianca", "s3", "TabC", 1.25),
        ];
        let counts = BTreeMap::from([("bianca".to_string(), 3)]);
        let stats = compute_employee_stats(&records, &counts);

        for (label, total) in &stats.totals["bianca"] {
            let average = stats.averages["bianca"][label];
            assert!((average * 3.0 - total).abs() < 1e-9);
        }
    }
}
