//! Background trial-log writer
//!
//! Records are queued on an unbounded channel and appended by a single
//! blocking task, so the uplink handler never waits on disk I/O.
//! Persistence failures are logged and the record is dropped.

use gur_common::TrialRecord;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::trial_log::TrialLog;

/// Writer counters, reported on drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub written: u64,
    pub failed: u64,
}

/// Handle to the writer task
pub struct TrialLogWriter {
    tx: mpsc::UnboundedSender<TrialRecord>,
    task: JoinHandle<WriterStats>,
}

impl TrialLogWriter {
    /// Start the writer task. Must be called inside a Tokio runtime.
    pub fn spawn(log: TrialLog) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<TrialRecord>();

        let task = tokio::task::spawn_blocking(move || {
            let mut stats = WriterStats::default();
            while let Some(record) = rx.blocking_recv() {
                match log.append(&record) {
                    Ok(()) => stats.written += 1,
                    Err(e) => {
                        stats.failed += 1;
                        error!(
                            error = %e,
                            trial_id = record.trial_id,
                            participant = %record.participant_id,
                            "Failed to append trial record"
                        );
                    }
                }
            }
            stats
        });

        Self { tx, task }
    }

    /// Queue a record. Returns false if the writer has already stopped.
    pub fn submit(&self, record: TrialRecord) -> bool {
        match self.tx.send(record) {
            Ok(()) => true,
            Err(e) => {
                error!(trial_id = e.0.trial_id, "Trial log writer is closed; record dropped");
                false
            }
        }
    }

    /// Close the queue and wait until every queued record has been written
    pub async fn drain(self) -> WriterStats {
        let Self { tx, task } = self;
        drop(tx);

        match task.await {
            Ok(stats) => {
                info!(written = stats.written, failed = stats.failed, "Trial log drained");
                stats
            }
            Err(e) => {
                error!(error = %e, "Trial log writer task panicked");
                WriterStats::default()
            }
        }
    }
}
