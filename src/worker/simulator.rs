//! Work unit simulator: timed artificial work with a random outcome.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

use crate::config::UnitConfig;
use crate::worker::state::{UnitOutcome, WorkUnit};

/// Source of uniform samples in `[0, 1)`.
pub trait Randomness: Send + Sync {
    fn next_f64(&self) -> f64;
}

/// `StdRng`-backed randomness, seedable for reproducible runs.
pub struct SeededRandomness {
    rng: Mutex<StdRng>,
}

impl SeededRandomness {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Seeded when `seed` is set, entropy otherwise.
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::new)
    }
}

impl Randomness for SeededRandomness {
    fn next_f64(&self) -> f64 {
        self.rng
            .lock()
            .expect("Randomness mutex poisoned")
            .r#gen::<f64>()
    }
}

/// Replays a fixed list of samples, cycling when exhausted.
pub struct ScriptedRandomness {
    samples: Mutex<VecDeque<f64>>,
}

impl ScriptedRandomness {
    pub fn new(samples: impl IntoIterator<Item = f64>) -> Self {
        Self {
            samples: Mutex::new(samples.into_iter().collect()),
        }
    }
}

impl Randomness for ScriptedRandomness {
    fn next_f64(&self) -> f64 {
        let mut samples = self.samples.lock().expect("Randomness mutex poisoned");
        match samples.pop_front() {
            Some(value) => {
                samples.push_back(value);
                value
            }
            None => 0.0,
        }
    }
}

/// Executes work units against an injected random source.
pub struct WorkUnitSimulator {
    rng: Arc<dyn Randomness>,
}

impl WorkUnitSimulator {
    pub fn new(rng: Arc<dyn Randomness>) -> Self {
        Self { rng }
    }

    /// Sample a duration uniformly within the configured bounds.
    pub fn plan_duration(&self, config: &UnitConfig) -> Duration {
        if config.max_duration <= config.min_duration {
            return config.min_duration;
        }
        let span = config.max_duration - config.min_duration;
        config.min_duration + span.mul_f64(self.rng.next_f64())
    }

    /// Run one unit until its duration elapses or `token` is cancelled.
    ///
    /// The unit's outcome is written here and nowhere else.
    pub async fn execute(&self, token: &CancellationToken, unit: &mut WorkUnit) -> UnitOutcome {
        if token.is_cancelled() {
            unit.resolve(UnitOutcome::Cancelled);
            return unit.outcome();
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                unit.resolve(UnitOutcome::Cancelled);
            }
            _ = tokio::time::sleep(unit.duration) => {
                let outcome = if self.rng.next_f64() < unit.success_probability {
                    UnitOutcome::Success
                } else {
                    UnitOutcome::Failure
                };
                unit.resolve(outcome);
            }
        }

        tracing::debug!(
            task_id = unit.id,
            user_id = %unit.user_id,
            outcome = %unit.outcome(),
            "Work unit resolved"
        );
        unit.outcome()
    }
}
