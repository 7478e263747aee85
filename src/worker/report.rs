//! Batch results.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::worker::state::{TaskId, UnitOutcome, WorkUnit};

/// Result of one resolved unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitReport {
    pub task_id: TaskId,
    /// Position in spawn order.
    pub index: usize,
    pub outcome: UnitOutcome,
    /// Planned simulated duration.
    pub planned: Duration,
    /// Observed time from creation to resolution.
    pub elapsed: Duration,
    pub completed_at: DateTime<Utc>,
}

impl UnitReport {
    pub fn from_unit(unit: &WorkUnit) -> Self {
        Self {
            task_id: unit.id,
            index: unit.index,
            outcome: unit.outcome(),
            planned: unit.duration,
            elapsed: unit.elapsed().unwrap_or_default(),
            completed_at: unit.completed_at().unwrap_or_else(Utc::now),
        }
    }
}

/// Immutable summary of a finished batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub user_id: String,
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Wall time of the whole batch.
    pub elapsed: Duration,
    /// Unit reports in completion order.
    pub units: Vec<UnitReport>,
}

impl BatchResult {
    /// Build from unit reports already in completion order.
    pub fn new(
        batch_id: Uuid,
        user_id: impl Into<String>,
        requested: usize,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        units: Vec<UnitReport>,
    ) -> Self {
        let count = |outcome: UnitOutcome| units.iter().filter(|u| u.outcome == outcome).count();
        let succeeded = count(UnitOutcome::Success);
        let failed = count(UnitOutcome::Failure);
        let cancelled = count(UnitOutcome::Cancelled);

        Self {
            batch_id,
            user_id: user_id.into(),
            requested,
            succeeded,
            failed,
            cancelled,
            started_at,
            finished_at: Utc::now(),
            elapsed,
            units,
        }
    }

    /// Units that ran their work to the end (success or failure).
    pub fn resolved(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Observed unit durations in completion order.
    pub fn durations(&self) -> impl Iterator<Item = Duration> + '_ {
        self.units.iter().map(|u| u.elapsed)
    }

    /// True when every requested unit reached a terminal outcome.
    pub fn is_complete(&self) -> bool {
        self.units.len() == self.requested && self.units.iter().all(|u| u.outcome.is_terminal())
    }
}
