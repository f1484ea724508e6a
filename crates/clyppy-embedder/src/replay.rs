//! Startup replay of tasks persisted by the previous process.

use tracing::{info, warn};

use clyppy_queue::PendingTasks;

use crate::orchestrator::Embedder;

/// Load the pending-task file and run every surviving task through the
/// normal pipeline. Returns the number of tasks attempted.
///
/// The store drops expired slash commands on load and deletes the file, so
/// a crash mid-replay loses the batch instead of repeating it.
pub async fn replay_pending(embedder: &Embedder) -> usize {
    let store = &embedder.context().store;
    let pending = match store.load().await {
        Ok(pending) => pending,
        Err(e) => {
            warn!(error = %e, "pending-task file unreadable, skipping replay");
            return 0;
        }
    };
    if pending.is_empty() {
        return 0;
    }

    let PendingTasks {
        quickembeds,
        slash_commands,
    } = pending;
    info!(
        quickembeds = quickembeds.len(),
        slash_commands = slash_commands.len(),
        "replaying tasks from the previous run"
    );

    let mut attempted = 0;
    for task in quickembeds {
        embedder.run_quickembed_task(task).await;
        attempted += 1;
    }
    for task in slash_commands {
        embedder.run_slash_task(task).await;
        attempted += 1;
    }
    attempted
}
