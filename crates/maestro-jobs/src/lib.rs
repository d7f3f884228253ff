//! Worker job lifecycle: records, cancellation tokens, the concurrency
//! cap, and the typed event bus other components observe.

pub mod events;
pub mod manager;
pub mod types;

pub use events::JobEvent;
pub use manager::{JobManager, StartOutcome};
pub use types::{Job, JobStatus, WorkerType};
