//! Worker system: simulated work units and their orchestration.
//!
//! Core components:
//! - `state`: Work unit and its outcome (Pending → Success/Failure/Cancelled)
//! - `simulator`: Timed artificial work with injectable randomness
//! - `registry`: Per-user cancellable task handles
//! - `runner`: Batch fan-out/fan-in
//! - `report`: Batch results
//! - `metrics`: Aggregated statistics over recorded batches

pub mod metrics;
pub mod registry;
pub mod report;
pub mod runner;
pub mod simulator;
pub mod state;

pub use metrics::{MetricsAggregator, MetricsSnapshot};
pub use registry::{TaskHandle, TaskRegistry};
pub use report::{BatchResult, UnitReport};
pub use runner::{BatchOptions, ParallelRunner, RunnerDeps};
pub use simulator::{Randomness, ScriptedRandomness, SeededRandomness, WorkUnitSimulator};
pub use state::{TaskId, UnitOutcome, WorkUnit};
