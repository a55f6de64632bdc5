// src/analyze/cluster.rs
//! Greedy chained-window clustering of one project's relevant events.
//!
//! Each event is compared against the most recently added member of the
//! current cluster, not its first member, so a steady trickle of mentions
//! keeps one story together even when its total span exceeds the window.

use chrono::Duration;

use crate::ingest::types::RawEvent;

pub const DEFAULT_WINDOW_HOURS: i64 = 24;

pub fn default_window() -> Duration {
    Duration::hours(DEFAULT_WINDOW_HOURS)
}

/// Group events into ordered, non-empty clusters covering every input once.
/// The gap test is inclusive: a gap of exactly `window` still chains.
pub fn cluster_events(mut events: Vec<RawEvent>, window: Duration) -> Vec<Vec<RawEvent>> {
    // Stable: equal timestamps keep their arrival order.
    events.sort_by_key(|e| e.timestamp);

    let mut clusters: Vec<Vec<RawEvent>> = Vec::new();
    let mut current: Vec<RawEvent> = Vec::new();
    for ev in events {
        let chains = current
            .last()
            .map(|prev| ev.timestamp - prev.timestamp <= window)
            .unwrap_or(true);
        if !chains {
            clusters.push(std::mem::take(&mut current));
        }
        current.push(ev);
    }
    if !current.is_empty() {
        clusters.push(current);
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::SourceKind;
    use chrono::{TimeZone, Utc};

    fn at(h: i64) -> RawEvent {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        RawEvent::new(
            "p",
            SourceKind::Feed,
            "a",
            format!("event at {h}h"),
            format!("https://p.org/{h}"),
            t0 + Duration::hours(h),
        )
    }

    fn shape(clusters: &[Vec<RawEvent>]) -> Vec<usize> {
        clusters.iter().map(Vec::len).collect()
    }

    #[test]
    fn empty_input_gives_no_clusters() {
        assert!(cluster_events(Vec::new(), default_window()).is_empty());
    }

    #[test]
    fn exact_window_gap_is_inclusive() {
        let c = cluster_events(vec![at(0), at(24)], default_window());
        assert_eq!(shape(&c), vec![2]);
    }

    #[test]
    fn unsorted_input_is_sorted_first() {
        let c = cluster_events(vec![at(60), at(0), at(10)], default_window());
        assert_eq!(shape(&c), vec![2, 1]);
        assert_eq!(c[0][0].url, "https://p.org/0");
        assert_eq!(c[1][0].url, "https://p.org/60");
    }

    #[test]
    fn window_is_tunable() {
        let c = cluster_events(vec![at(0), at(5), at(12)], Duration::hours(6));
        assert_eq!(shape(&c), vec![2, 1]);
    }
}
