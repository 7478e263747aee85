//! Metrics aggregation over recorded batches.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::worker::report::BatchResult;

/// Aggregate statistics derived from recorded batches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Batches in the reporting window.
    pub batches: usize,
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// `succeeded / (succeeded + failed)`; cancellations are excluded. 0.0 when nothing resolved.
    pub success_rate: f64,
    /// Sum of observed durations of succeeded and failed units.
    pub total_duration: Duration,
    /// Mean observed duration of succeeded and failed units.
    pub average_duration: Duration,
    /// Resolved units per second over the observed window.
    pub throughput: f64,
    /// Span from the first batch start to the last batch finish.
    pub window: Duration,
    /// Handles still in flight when the snapshot was taken.
    pub active_tasks: usize,
}

impl MetricsSnapshot {
    /// Compute a snapshot from a set of batch results.
    pub fn from_batches<'a>(batches: impl IntoIterator<Item = &'a BatchResult>) -> Self {
        let mut snapshot = Self::default();
        let mut first_start: Option<DateTime<Utc>> = None;
        let mut last_finish: Option<DateTime<Utc>> = None;
        let mut longest_batch = Duration::ZERO;

        for batch in batches {
            snapshot.batches += 1;
            snapshot.requested += batch.requested;
            snapshot.succeeded += batch.succeeded;
            snapshot.failed += batch.failed;
            snapshot.cancelled += batch.cancelled;
            snapshot.total_duration += batch
                .units
                .iter()
                .filter(|u| u.outcome.is_resolved_work())
                .map(|u| u.elapsed)
                .sum::<Duration>();

            first_start = Some(first_start.map_or(batch.started_at, |t| t.min(batch.started_at)));
            last_finish = Some(last_finish.map_or(batch.finished_at, |t| t.max(batch.finished_at)));
            longest_batch = longest_batch.max(batch.elapsed);
        }

        let resolved = snapshot.succeeded + snapshot.failed;
        if resolved > 0 {
            snapshot.success_rate = snapshot.succeeded as f64 / resolved as f64;
            snapshot.average_duration = snapshot.total_duration / resolved as u32;
        }

        // Wall-clock span can undercount a single batch; never report less than the longest one.
        let span = match (first_start, last_finish) {
            (Some(start), Some(finish)) => finish
                .signed_duration_since(start)
                .to_std()
                .unwrap_or_default(),
            _ => Duration::ZERO,
        };
        snapshot.window = span.max(longest_batch);
        if !snapshot.window.is_zero() {
            snapshot.throughput = resolved as f64 / snapshot.window.as_secs_f64();
        }

        snapshot
    }

    pub fn with_active_tasks(mut self, active_tasks: usize) -> Self {
        self.active_tasks = active_tasks;
        self
    }
}

/// Keeps a bounded history of batch results.
pub struct MetricsAggregator {
    history: RwLock<VecDeque<Arc<BatchResult>>>,
    window: usize,
}

impl MetricsAggregator {
    /// Create an aggregator retaining the last `window` batches.
    pub fn new(window: usize) -> Self {
        Self {
            history: RwLock::new(VecDeque::with_capacity(window.min(1024))),
            window: window.max(1),
        }
    }

    /// Append a finished batch, evicting the oldest beyond the window.
    pub async fn record(&self, result: BatchResult) {
        let mut history = self.history.write().await;
        history.push_back(Arc::new(result));
        while history.len() > self.window {
            history.pop_front();
        }
    }

    /// Statistics over the retained history, optionally for one user.
    pub async fn snapshot(&self, user_id: Option<&str>) -> MetricsSnapshot {
        let history = self.history.read().await;
        MetricsSnapshot::from_batches(
            history
                .iter()
                .filter(|b| user_id.is_none_or(|u| b.user_id == u))
                .map(Arc::as_ref),
        )
    }

    /// Retained batches, oldest first, optionally for one user.
    pub async fn history(&self, user_id: Option<&str>) -> Vec<Arc<BatchResult>> {
        self.history
            .read()
            .await
            .iter()
            .filter(|b| user_id.is_none_or(|u| b.user_id == u))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.history.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.history.read().await.is_empty()
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::worker::report::UnitReport;
    use crate::worker::state::UnitOutcome;

    fn batch(user: &str, outcomes: &[(UnitOutcome, u64)], elapsed_ms: u64) -> BatchResult {
        let units = outcomes
            .iter()
            .enumerate()
            .map(|(i, (outcome, ms))| UnitReport {
                task_id: i as u64 + 1,
                index: i,
                outcome: *outcome,
                planned: Duration::from_millis(*ms),
                elapsed: Duration::from_millis(*ms),
                completed_at: Utc::now(),
            })
            .collect();
        BatchResult::new(
            Uuid::new_v4(),
            user,
            outcomes.len(),
            Utc::now(),
            Duration::from_millis(elapsed_ms),
            units,
        )
    }

    #[tokio::test]
    async fn empty_snapshot() {
        let metrics = MetricsAggregator::new(10);
        let snapshot = metrics.snapshot(None).await;
        assert_eq!(snapshot, MetricsSnapshot::default());
        assert!(metrics.is_empty().await);
    }

    #[tokio::test]
    async fn success_rate_excludes_cancellations() {
        use UnitOutcome::*;
        let metrics = MetricsAggregator::new(10);
        metrics
            .record(batch(
                "alice",
                &[(Success, 100), (Success, 200), (Failure, 300), (Success, 400), (Cancelled, 450)],
                1000,
            ))
            .await;

        let snapshot = metrics.snapshot(None).await;
        assert_eq!(snapshot.batches, 1);
        assert_eq!(snapshot.requested, 5);
        assert_eq!(snapshot.succeeded, 3);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.cancelled, 1);
        assert_eq!(snapshot.success_rate, 0.75);
        assert_eq!(snapshot.total_duration, Duration::from_millis(1000));
        assert_eq!(snapshot.average_duration, Duration::from_millis(250));
        assert!(snapshot.window >= Duration::from_millis(1000));
        assert!(snapshot.throughput > 0.0 && snapshot.throughput <= 4.0);
    }

    #[tokio::test]
    async fn all_cancelled_has_zero_rate() {
        let metrics = MetricsAggregator::new(10);
        metrics
            .record(batch("alice", &[(UnitOutcome::Cancelled, 10)], 10))
            .await;
        let snapshot = metrics.snapshot(None).await;
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.average_duration, Duration::ZERO);
        assert_eq!(snapshot.throughput, 0.0);
    }

    #[tokio::test]
    async fn per_user_filter() {
        use UnitOutcome::*;
        let metrics = MetricsAggregator::new(10);
        metrics.record(batch("alice", &[(Success, 10)], 10)).await;
        metrics.record(batch("bob", &[(Failure, 10), (Failure, 10)], 10)).await;

        let alice = metrics.snapshot(Some("alice")).await;
        assert_eq!(alice.succeeded, 1);
        assert_eq!(alice.failed, 0);
        assert_eq!(alice.success_rate, 1.0);

        let bob = metrics.snapshot(Some("bob")).await;
        assert_eq!(bob.failed, 2);
        assert_eq!(bob.success_rate, 0.0);

        let all = metrics.snapshot(None).await;
        assert_eq!(all.batches, 2);
        assert_eq!(metrics.history(Some("bob")).await.len(), 1);
    }

    #[tokio::test]
    async fn history_bounded_by_window() {
        let metrics = MetricsAggregator::new(2);
        for _ in 0..5 {
            metrics
                .record(batch("alice", &[(UnitOutcome::Success, 10)], 10))
                .await;
        }
        assert_eq!(metrics.len().await, 2);
        assert_eq!(metrics.snapshot(None).await.batches, 2);
    }

    #[test]
    fn active_tasks_attached() {
        let snapshot = MetricsSnapshot::default().with_active_tasks(3);
        assert_eq!(snapshot.active_tasks, 3);
    }
}
