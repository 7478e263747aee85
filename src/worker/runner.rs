//! Parallel runner: fans a batch of work units out and joins them back.
//!
//! Every unit is registered in the [`TaskRegistry`] before any unit starts,
//! runs on its own tokio task, and deregisters itself from that task as soon
//! as it resolves, whether or not the caller is still waiting on the batch.
//! One unit's failure, cancellation or panic never stops its siblings.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{OrchestratorConfig, UnitConfig};
use crate::error::BatchError;
use crate::worker::metrics::MetricsAggregator;
use crate::worker::registry::{TaskHandle, TaskRegistry};
use crate::worker::report::{BatchResult, UnitReport};
use crate::worker::simulator::WorkUnitSimulator;
use crate::worker::state::{UnitOutcome, WorkUnit};

/// Per-batch options.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Overrides the configured unit parameters.
    pub unit: Option<UnitConfig>,
    /// Cancel every unit still running once this much time has passed.
    pub deadline: Option<Duration>,
    /// Receives each unit's report as it resolves, in completion order.
    pub progress: Option<mpsc::UnboundedSender<UnitReport>>,
}

impl BatchOptions {
    pub fn with_unit(mut self, unit: UnitConfig) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_progress(mut self, progress: mpsc::UnboundedSender<UnitReport>) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Shared dependencies for the runner.
#[derive(Clone)]
pub struct RunnerDeps {
    pub registry: Arc<TaskRegistry>,
    pub metrics: Arc<MetricsAggregator>,
    pub simulator: Arc<WorkUnitSimulator>,
}

/// Spawns batches of work units and assembles their results.
pub struct ParallelRunner {
    config: OrchestratorConfig,
    deps: RunnerDeps,
}

impl ParallelRunner {
    pub fn new(config: OrchestratorConfig, deps: RunnerDeps) -> Self {
        Self { config, deps }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn registry(&self) -> &Arc<TaskRegistry> {
        &self.deps.registry
    }

    fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.deps.metrics
    }

    fn simulator(&self) -> &Arc<WorkUnitSimulator> {
        &self.deps.simulator
    }

    fn check_size(&self, n: usize) -> Result<(), BatchError> {
        if n == 0 || n > self.config.max_batch_size {
            return Err(BatchError::InvalidBatchSize {
                requested: n,
                max: self.config.max_batch_size,
            });
        }
        Ok(())
    }

    /// Run `n` units for `user_id` with the configured unit parameters.
    pub async fn run_batch(&self, user_id: &str, n: usize) -> Result<BatchResult, BatchError> {
        self.run_batch_with(user_id, n, BatchOptions::default())
            .await
    }

    /// Run `n` units for `user_id`.
    ///
    /// Returns only after every unit reached a terminal outcome. The result
    /// is recorded in the metrics aggregator before it is returned. If the
    /// caller stops polling, the units still run out and deregister, but the
    /// batch is not recorded.
    pub async fn run_batch_with(
        &self,
        user_id: &str,
        n: usize,
        options: BatchOptions,
    ) -> Result<BatchResult, BatchError> {
        self.check_size(n)?;

        let unit_config = options.unit.unwrap_or(self.config.unit);
        let batch_id = Uuid::new_v4();
        let batch_token = CancellationToken::new();
        let started_at = Utc::now();
        let started = Instant::now();

        let units: Vec<(WorkUnit, TaskHandle)> = (0..n)
            .map(|index| {
                let id = self.registry().next_task_id();
                let duration = self.simulator().plan_duration(&unit_config);
                let unit = WorkUnit::new(
                    id,
                    batch_id,
                    index,
                    user_id,
                    duration,
                    unit_config.success_probability,
                );
                let handle = TaskHandle::new(id, user_id, batch_id, batch_token.child_token());
                (unit, handle)
            })
            .collect();

        self.register_all(user_id, &units).await?;

        tracing::info!(
            user_id,
            batch_id = %batch_id,
            units = n,
            "Starting batch"
        );

        let deadline = options.deadline.map(|after| {
            let batch_token = batch_token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(after) => {
                        tracing::info!(batch_id = %batch_id, ?after, "Batch deadline reached");
                        batch_token.cancel();
                    }
                    _ = batch_token.cancelled() => {}
                }
            })
        });

        let mut running = FuturesUnordered::new();
        for (mut unit, handle) in units {
            let simulator = Arc::clone(self.simulator());
            let registry = Arc::clone(self.registry());
            let task_id = unit.id;
            let index = unit.index;
            let planned = unit.duration;
            let join = tokio::spawn(async move {
                let executed = AssertUnwindSafe(simulator.execute(handle.token(), &mut unit))
                    .catch_unwind()
                    .await;
                registry.deregister(&handle.user_id, handle.id).await;
                executed.map(|_| unit)
            });
            running.push(async move { (task_id, index, planned, join.await) });
        }

        let mut reports = Vec::with_capacity(n);
        while let Some((task_id, index, planned, joined)) = running.next().await {
            let report = match joined {
                Ok(Ok(unit)) => UnitReport::from_unit(&unit),
                Ok(Err(_)) | Err(_) => {
                    tracing::warn!(user_id, task_id, "Work unit panicked");
                    // The unit task may have died before deregistering itself
                    self.registry().deregister(user_id, task_id).await;
                    UnitReport {
                        task_id,
                        index,
                        outcome: UnitOutcome::Failure,
                        planned,
                        elapsed: started.elapsed(),
                        completed_at: Utc::now(),
                    }
                }
            };
            if let Some(progress) = &options.progress {
                let _ = progress.send(report.clone());
            }
            reports.push(report);
        }

        if let Some(timer) = deadline {
            timer.abort();
        }

        let result = BatchResult::new(
            batch_id,
            user_id,
            n,
            started_at,
            started.elapsed(),
            reports,
        );

        tracing::info!(
            user_id,
            batch_id = %batch_id,
            succeeded = result.succeeded,
            failed = result.failed,
            cancelled = result.cancelled,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Batch finished"
        );

        self.metrics().record(result.clone()).await;
        Ok(result)
    }

    /// Register every handle, rolling back on the first duplicate.
    async fn register_all(
        &self,
        user_id: &str,
        units: &[(WorkUnit, TaskHandle)],
    ) -> Result<(), BatchError> {
        for (position, (_, handle)) in units.iter().enumerate() {
            if let Err(e) = self.registry().register(handle.clone()).await {
                for (_, registered) in &units[..position] {
                    self.registry().deregister(user_id, registered.id).await;
                }
                return Err(e);
            }
        }
        Ok(())
    }
}
