//! Background task that runs reconciliation passes on a fixed cadence.
//!
//! Passes never overlap: the next pass starts one full interval after the
//! previous pass (including its writes) has finished. A shutdown request is
//! observed between passes and during the inter-pass delay; a pass already
//! in flight is allowed to finish its writes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use fieldline_storage::RecordStore;

use crate::{Engine, EngineError};

/// Handle to a running reconciler task.
pub struct ReconcilerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Ask the task to stop and wait for it to exit.
    pub async fn shutdown(self) -> Result<(), EngineError> {
        info!("Stopping reconciler");
        // The receiver only disappears once the task has exited already.
        let _ = self.shutdown_tx.send(true);
        self.task
            .await
            .map_err(|e| EngineError::Task(e.to_string()))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the reconciler onto the current tokio runtime. The first pass runs
/// immediately.
pub fn spawn_reconciler<S>(engine: Arc<Engine<S>>) -> ReconcilerHandle
where
    S: RecordStore + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let interval = engine.config().reconcile_interval();
    let task = tokio::spawn(run_reconciler(engine, interval, shutdown_rx));
    ReconcilerHandle { shutdown_tx, task }
}

async fn run_reconciler<S>(
    engine: Arc<Engine<S>>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    S: RecordStore + 'static,
{
    info!(interval_ms = interval.as_millis() as u64, "Starting reconciler");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // Store I/O is blocking; keep it off the async workers.
        let pass_engine = Arc::clone(&engine);
        match tokio::task::spawn_blocking(move || pass_engine.reconcile_once()).await {
            Ok(Ok(report)) if report.promoted_records > 0 || report.failures > 0 => {
                info!(
                    scanned = report.scanned,
                    promoted_records = report.promoted_records,
                    promoted_fields = report.promoted_fields,
                    failures = report.failures,
                    "Reconciliation pass applied changes"
                );
            }
            Ok(Ok(report)) => {
                debug!(scanned = report.scanned, "Reconciliation pass found nothing due");
            }
            Ok(Err(e)) => error!(error = %e, "Reconciliation pass failed"),
            Err(e) => error!(error = %e, "Reconciliation pass aborted"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // Handle dropped without an explicit shutdown.
                    break;
                }
            }
        }
    }

    info!("Reconciler stopped");
}
