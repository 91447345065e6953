//! # Error History
//!
//! Bounded log of recent failures used for spike detection. Each record
//! carries the running occurrence count for its label.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// A single recorded failure
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub label: String,
    pub message: String,
    pub stack_trace: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Failures seen for this label since the executor started
    pub occurrence_count: u64,
    #[serde(skip)]
    recorded_at: Instant,
}

impl ErrorRecord {
    /// Age of the record on the monotonic clock
    pub fn age(&self) -> Duration {
        self.recorded_at.elapsed()
    }
}

/// Summary produced when errors inside the window exceed the threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpikeReport {
    pub total_errors: usize,
    pub window: Duration,
    /// `(label, errors in window)`, most affected first
    pub labels: Vec<(String, usize)>,
}

impl SpikeReport {
    /// Free-text alert body for operators
    pub fn alert_message(&self) -> String {
        let affected = self
            .labels
            .iter()
            .map(|(label, count)| format!("{label} ({count})"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Error spike detected: {} errors in the last {}s. Affected: {}",
            self.total_errors,
            self.window.as_secs(),
            affected
        )
    }
}

#[derive(Debug)]
struct HistoryInner {
    records: VecDeque<ErrorRecord>,
    occurrences: HashMap<String, u64>,
}

#[derive(Debug)]
pub struct ErrorHistory {
    inner: Mutex<HistoryInner>,
    capacity: usize,
}

impl ErrorHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HistoryInner {
                records: VecDeque::with_capacity(capacity.min(1_024)),
                occurrences: HashMap::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Append a record, evicting the oldest once capacity is reached
    pub fn record(&self, label: &str, message: &str, stack_trace: Option<&str>) -> ErrorRecord {
        let mut inner = self.inner.lock();

        let occurrence_count = {
            let count = inner.occurrences.entry(label.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let record = ErrorRecord {
            label: label.to_string(),
            message: message.to_string(),
            stack_trace: stack_trace.map(str::to_string),
            timestamp: Utc::now(),
            occurrence_count,
            recorded_at: Instant::now(),
        };

        if inner.records.len() >= self.capacity {
            inner.records.pop_front();
        }
        inner.records.push_back(record.clone());
        record
    }

    /// Records younger than `window`, oldest first
    pub fn recent(&self, window: Duration) -> Vec<ErrorRecord> {
        self.inner
            .lock()
            .records
            .iter()
            .filter(|r| r.age() <= window)
            .cloned()
            .collect()
    }

    /// Most recent record for a label
    pub fn latest(&self, label: &str) -> Option<ErrorRecord> {
        self.inner
            .lock()
            .records
            .iter()
            .rev()
            .find(|r| r.label == label)
            .cloned()
    }

    /// Drop records older than `window`; returns how many were removed
    pub fn prune(&self, window: Duration) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.records.len();
        // Records are appended in time order, so expired ones sit at the front
        while inner.records.front().is_some_and(|r| r.age() > window) {
            inner.records.pop_front();
        }
        before - inner.records.len()
    }

    /// Spike report when more than `threshold` errors fall inside `window`
    pub fn detect_spike(&self, window: Duration, threshold: usize) -> Option<SpikeReport> {
        let recent = self.recent(window);
        if recent.len() <= threshold {
            return None;
        }

        let mut per_label: HashMap<String, usize> = HashMap::new();
        for record in &recent {
            *per_label.entry(record.label.clone()).or_insert(0) += 1;
        }
        let mut labels: Vec<(String, usize)> = per_label.into_iter().collect();
        labels.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Some(SpikeReport {
            total_errors: recent.len(),
            window,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_occurrence_counts_per_label() {
        let history = ErrorHistory::new(10);
        history.record("ban_command", "boom", None);
        history.record("kick_command", "boom", None);
        let third = history.record("ban_command", "boom again", Some("trace"));

        assert_eq!(third.occurrence_count, 2);
        assert_eq!(
            history.latest("ban_command").map(|r| r.message),
            Some("boom again".to_string())
        );
    }

    #[tokio::test]
    async fn test_capacity_is_bounded() {
        let history = ErrorHistory::new(3);
        for i in 0..5 {
            history.record("label", &format!("error {i}"), None);
        }
        assert_eq!(history.len(), 3);
        let recent = history.recent(Duration::from_secs(60));
        assert_eq!(recent[0].message, "error 2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_spike_detection_respects_window() {
        let history = ErrorHistory::new(100);
        for _ in 0..6 {
            history.record("ban_command", "boom", None);
        }
        tokio::time::advance(Duration::from_secs(400)).await;
        for _ in 0..5 {
            history.record("kick_command", "boom", None);
        }

        // 11 total, but only 5 within the 300s window
        assert!(history
            .detect_spike(Duration::from_secs(300), 10)
            .is_none());

        for _ in 0..6 {
            history.record("warn_command", "boom", None);
        }
        let report = history
            .detect_spike(Duration::from_secs(300), 10)
            .expect("spike");
        assert_eq!(report.total_errors, 11);
        assert_eq!(report.labels[0], ("warn_command".to_string(), 6));
        assert!(report.alert_message().contains("kick_command (5)"));

        assert_eq!(history.prune(Duration::from_secs(300)), 6);
    }
}
