//! Work unit state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Identifier of a work unit, unique within one [`TaskRegistry`](super::TaskRegistry).
pub type TaskId = u64;

/// Outcome of a work unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOutcome {
    /// Unit has not resolved yet.
    Pending,
    /// Simulated work succeeded.
    Success,
    /// Simulated work failed.
    Failure,
    /// Unit was cancelled before its work finished.
    Cancelled,
}

impl UnitOutcome {
    /// Check if this is a terminal outcome.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Success or failure: the unit ran its simulated work to the end.
    pub fn is_resolved_work(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

impl std::fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// One simulated piece of concurrent work.
#[derive(Debug, Clone, Serialize)]
pub struct WorkUnit {
    /// Registry-wide task id.
    pub id: TaskId,
    /// Batch this unit belongs to.
    pub batch_id: Uuid,
    /// Position in spawn order.
    pub index: usize,
    /// User that owns this unit.
    pub user_id: String,
    /// When the unit was created.
    pub created_at: DateTime<Utc>,
    /// Planned simulated duration.
    pub duration: Duration,
    /// Probability that the unit succeeds once its duration elapses.
    pub success_probability: f64,
    outcome: UnitOutcome,
    completed_at: Option<DateTime<Utc>>,
    run_time: Option<Duration>,
    #[serde(skip)]
    started: Instant,
}

impl WorkUnit {
    pub fn new(
        id: TaskId,
        batch_id: Uuid,
        index: usize,
        user_id: impl Into<String>,
        duration: Duration,
        success_probability: f64,
    ) -> Self {
        Self {
            id,
            batch_id,
            index,
            user_id: user_id.into(),
            created_at: Utc::now(),
            duration,
            success_probability,
            outcome: UnitOutcome::Pending,
            completed_at: None,
            run_time: None,
            started: Instant::now(),
        }
    }

    pub fn outcome(&self) -> UnitOutcome {
        self.outcome
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Record the terminal outcome. Only the first call has an effect.
    ///
    /// Returns `false` when the unit had already resolved or `outcome` is `Pending`.
    pub fn resolve(&mut self, outcome: UnitOutcome) -> bool {
        if self.outcome.is_terminal() || !outcome.is_terminal() {
            return false;
        }
        self.outcome = outcome;
        self.completed_at = Some(Utc::now());
        self.run_time = Some(self.started.elapsed());
        true
    }

    /// Time from creation to resolution, measured on the tokio clock.
    pub fn elapsed(&self) -> Option<Duration> {
        self.run_time
    }
}
