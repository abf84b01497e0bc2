//! Data types shared by the driver, backends and stores.

pub mod action;
pub mod config;
pub mod metrics;
pub mod outcome;
pub mod record;
pub mod task;

pub use action::{ActionKind, CallRef, Execution, ModelAction, Turn};
pub use config::DriverConfig;
pub use metrics::SessionMetrics;
pub use outcome::{Completion, PersistedRecord, TaskOutcome};
pub use record::{Record, GENRES};
pub use task::Task;
