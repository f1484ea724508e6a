//! Graceful-shutdown coordination.
//!
//! One watch channel carries the flag. Entry points consult it and divert
//! new work into the pending queue once it flips; the host then drains
//! in-flight work (bounded) and persists the queue.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use clyppy_models::limits::{SHUTDOWN_DRAIN_TIMEOUT, SHUTDOWN_LOG_INTERVAL};

use crate::state::InflightSets;

/// Write half of the shutdown flag.
#[derive(Debug)]
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

/// Read half, cloned into every entry point.
#[derive(Debug, Clone)]
pub struct ShutdownFlag {
    rx: watch::Receiver<bool>,
}

/// Create the flag pair.
pub fn shutdown_channel() -> (ShutdownController, ShutdownFlag) {
    let (tx, rx) = watch::channel(false);
    (ShutdownController { tx }, ShutdownFlag { rx })
}

impl ShutdownController {
    /// Flip the flag. New work diverts into the pending queue from here on.
    pub fn signal(&self) {
        info!("shutdown signalled");
        let _ = self.tx.send(true);
    }

    pub fn flag(&self) -> ShutdownFlag {
        ShutdownFlag {
            rx: self.tx.subscribe(),
        }
    }
}

impl ShutdownFlag {
    pub fn is_shutting_down(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes when the flag flips (or the controller is gone).
    pub async fn wait(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Poll the in-flight sets until empty, bounded by the drain ceiling.
///
/// Returns the number of entries still active when the loop gave up
/// (0 on a clean drain).
pub async fn drain_inflight(inflight: &InflightSets) -> usize {
    drain_inflight_with(inflight, SHUTDOWN_DRAIN_TIMEOUT, SHUTDOWN_LOG_INTERVAL).await
}

pub async fn drain_inflight_with(
    inflight: &InflightSets,
    ceiling: Duration,
    log_every: Duration,
) -> usize {
    let started = tokio::time::Instant::now();
    let mut last_logged = started;

    loop {
        let active = inflight.active_total();
        if active == 0 {
            info!("in-flight work drained");
            return 0;
        }
        if started.elapsed() >= ceiling {
            warn!(active, "drain ceiling reached with work outstanding");
            return active;
        }
        if last_logged.elapsed() >= log_every {
            info!(
                active,
                elapsed_secs = started.elapsed().as_secs(),
                "waiting for in-flight work"
            );
            last_logged = tokio::time::Instant::now();
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}
