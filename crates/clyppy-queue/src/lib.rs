//! Pending-task persistence.
//!
//! Deferred replies survive a restart as a single framed file. Shutdown
//! writes the file atomically; startup loads it, drops expired slash
//! tasks, and removes it so a crash during replay cannot double-run.

pub mod error;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use store::{PendingTasks, TaskStore};
