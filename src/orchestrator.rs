//! Orchestrator: the entry point the chat layer talks to.

use std::sync::Arc;

use crate::config::OrchestratorConfig;
use crate::error::{BatchError, ConfigError};
use crate::worker::{
    BatchOptions, BatchResult, MetricsAggregator, MetricsSnapshot, ParallelRunner, Randomness,
    RunnerDeps, SeededRandomness, TaskId, TaskRegistry, WorkUnitSimulator,
};

/// Owns one task registry, one metrics aggregator and one runner.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<TaskRegistry>,
    metrics: Arc<MetricsAggregator>,
    runner: Arc<ParallelRunner>,
}

impl Orchestrator {
    /// Build with randomness seeded from `config.seed` (entropy when unset).
    pub fn new(config: OrchestratorConfig) -> Result<Self, ConfigError> {
        let rng = Arc::new(SeededRandomness::from_seed(config.seed));
        Self::with_randomness(config, rng)
    }

    /// Build with an explicit random source.
    pub fn with_randomness(
        config: OrchestratorConfig,
        rng: Arc<dyn Randomness>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let registry = Arc::new(TaskRegistry::new());
        let metrics = Arc::new(MetricsAggregator::new(config.history_window));
        let deps = RunnerDeps {
            registry: Arc::clone(&registry),
            metrics: Arc::clone(&metrics),
            simulator: Arc::new(WorkUnitSimulator::new(rng)),
        };

        Ok(Self {
            registry,
            metrics,
            runner: Arc::new(ParallelRunner::new(config, deps)),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        self.runner.config()
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    /// Run `n` units for a user and wait for all of them to resolve.
    pub async fn run_batch(&self, user_id: &str, n: usize) -> Result<BatchResult, BatchError> {
        self.runner.run_batch(user_id, n).await
    }

    /// Like [`run_batch`](Self::run_batch) with per-batch overrides.
    pub async fn run_batch_with(
        &self,
        user_id: &str,
        n: usize,
        options: BatchOptions,
    ) -> Result<BatchResult, BatchError> {
        self.runner.run_batch_with(user_id, n, options).await
    }

    /// Signal every active unit of a user. Returns how many were signalled.
    pub async fn cancel_all(&self, user_id: &str) -> usize {
        self.registry.cancel_all(user_id).await
    }

    /// Signal a single unit. Returns `false` if it is not active.
    pub async fn cancel_one(&self, user_id: &str, task_id: TaskId) -> bool {
        self.registry.cancel_one(user_id, task_id).await
    }

    pub async fn active_count(&self, user_id: &str) -> usize {
        self.registry.active_count(user_id).await
    }

    /// Metrics for one user, or for everyone when `user_id` is `None`.
    pub async fn snapshot(&self, user_id: Option<&str>) -> MetricsSnapshot {
        let active = match user_id {
            Some(user) => self.registry.active_count(user).await,
            None => self.registry.total_active().await,
        };
        self.metrics.snapshot(user_id).await.with_active_tasks(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_rejected() {
        let config = OrchestratorConfig {
            max_batch_size: 0,
            ..Default::default()
        };
        assert!(Orchestrator::new(config).is_err());
    }

    #[tokio::test]
    async fn idle_snapshot_is_empty() {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default()).unwrap();
        let snapshot = orchestrator.snapshot(Some("alice")).await;
        assert_eq!(snapshot.batches, 0);
        assert_eq!(snapshot.active_tasks, 0);
        assert_eq!(orchestrator.cancel_all("alice").await, 0);
    }
}
