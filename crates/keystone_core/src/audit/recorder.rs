//! Post-commit change-log writer backed by a bounded queue.
//!
//! # Responsibility
//! - Turn committed snapshots into change-log rows tagged with the actor.
//! - Write them on a dedicated worker thread through an `AuditSink`.
//! - Drain pending rows before the worker exits.
//!
//! # Invariants
//! - `record` is only called after the entity-store commit succeeded.
//! - Sink failures are logged and counted, never returned to the caller.
//! - A full queue blocks the producer; rows are never dropped for capacity.
//! - `shutdown` (or drop) returns only after every enqueued row was attempted.

use crate::audit::collector::ChangeSnapshot;
use crate::audit::record::{AuditError, AuditResult, NewChangeLogEntry};
use crate::audit::sink::AuditSink;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Queue capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

const WORKER_THREAD_NAME: &str = "keystone-audit";

enum Command {
    Append(NewChangeLogEntry),
    Flush(SyncSender<()>),
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time recorder counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub enqueued: u64,
    pub written: u64,
    pub failed: u64,
}

/// Best-effort change-log writer.
pub struct AuditRecorder {
    sender: Option<SyncSender<Command>>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl AuditRecorder {
    /// Starts the worker thread that owns `sink`.
    pub fn start(sink: impl AuditSink + 'static, queue_capacity: usize) -> AuditResult<Self> {
        let (sender, receiver) = sync_channel(queue_capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker_counters = Arc::clone(&counters);
        let sink: Box<dyn AuditSink> = Box::new(sink);

        let worker = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(sink, receiver, worker_counters))
            .map_err(AuditError::Spawn)?;

        info!(
            "event=audit_start module=audit status=ok queue_capacity={}",
            queue_capacity.max(1)
        );

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            counters,
        })
    }

    /// Serializes `snapshots` and enqueues one row per snapshot.
    ///
    /// Never fails: an unavailable worker is logged and counted as failed.
    pub fn record(&self, actor: &str, snapshots: Vec<ChangeSnapshot>, created_at: i64) {
        for snapshot in snapshots {
            let entry = snapshot.into_entry(actor, created_at);
            if let Err(err) = self.enqueue(entry) {
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                error!(
                    "event=audit_enqueue module=audit status=error error_code=audit_enqueue_failed error={}",
                    err
                );
            }
        }
    }

    /// Blocks until every row enqueued before this call has been attempted.
    pub fn flush(&self) -> AuditResult<()> {
        let sender = self.sender.as_ref().ok_or(AuditError::WorkerUnavailable)?;
        let (ack_sender, ack_receiver) = sync_channel(1);
        sender
            .send(Command::Flush(ack_sender))
            .map_err(|_| AuditError::WorkerUnavailable)?;
        ack_receiver
            .recv()
            .map_err(|_| AuditError::WorkerUnavailable)
    }

    pub fn stats(&self) -> RecorderStats {
        RecorderStats {
            enqueued: self.counters.enqueued.load(Ordering::SeqCst),
            written: self.counters.written.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        }
    }

    /// Stops accepting rows, drains the queue and joins the worker.
    pub fn shutdown(mut self) -> RecorderStats {
        self.stop();
        self.stats()
    }

    fn enqueue(&self, entry: NewChangeLogEntry) -> AuditResult<()> {
        let sender = self.sender.as_ref().ok_or(AuditError::WorkerUnavailable)?;
        sender
            .send(Command::Append(entry))
            .map_err(|_| AuditError::WorkerUnavailable)?;
        self.counters.enqueued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the last sender lets the worker finish the buffered rows
        // and leave its receive loop.
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!(
                    "event=audit_stop module=audit status=error error_code=audit_worker_panicked"
                );
                return;
            }
            let stats = self.stats();
            info!(
                "event=audit_stop module=audit status=ok enqueued={} written={} failed={}",
                stats.enqueued, stats.written, stats.failed
            );
        }
    }
}

impl Drop for AuditRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(sink: Box<dyn AuditSink>, receiver: Receiver<Command>, counters: Arc<Counters>) {
    for command in receiver {
        match command {
            Command::Append(entry) => match sink.append(&entry) {
                Ok(id) => {
                    counters.written.fetch_add(1, Ordering::SeqCst);
                    debug!(
                        "event=audit_write module=audit status=ok log_id={} table={} entity_id={} action={}",
                        id, entry.table_name, entry.entity_id, entry.action
                    );
                }
                Err(err) => {
                    counters.failed.fetch_add(1, Ordering::SeqCst);
                    warn!(
                        "event=audit_write module=audit status=error table={} entity_id={} action={} error_code=audit_write_failed error={}",
                        entry.table_name, entry.entity_id, entry.action, err
                    );
                }
            },
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AuditRecorder;
    use crate::audit::collector::ChangeSnapshot;
    use crate::audit::record::{AuditAction, AuditError, AuditResult, NewChangeLogEntry};
    use crate::audit::sink::AuditSink;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MemorySink {
        rows: Arc<Mutex<Vec<NewChangeLogEntry>>>,
    }

    impl AuditSink for MemorySink {
        fn append(&self, entry: &NewChangeLogEntry) -> AuditResult<i64> {
            let mut rows = self.rows.lock().unwrap();
            rows.push(entry.clone());
            Ok(rows.len() as i64)
        }
    }

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn append(&self, _entry: &NewChangeLogEntry) -> AuditResult<i64> {
            Err(AuditError::InvalidData("sink offline".to_string()))
        }
    }

    fn snapshot(entity_id: i64) -> ChangeSnapshot {
        ChangeSnapshot {
            action: AuditAction::Create,
            table_name: "roles",
            entity_id,
            before: None,
            after: Some(json!({ "id": entity_id })),
        }
    }

    #[test]
    fn flush_waits_for_enqueued_rows() {
        let sink = MemorySink::default();
        let recorder = AuditRecorder::start(sink.clone(), 4).unwrap();
        recorder.record("alice", (1..=10).map(snapshot).collect(), 5);
        recorder.flush().unwrap();

        let rows = sink.rows.lock().unwrap();
        assert_eq!(rows.len(), 10);
        assert!(rows.iter().all(|row| row.actor == "alice"));
        assert_eq!(rows[0].new_values.as_deref(), Some(r#"{"id":1}"#));
    }

    #[test]
    fn shutdown_drains_pending_rows() {
        let sink = MemorySink::default();
        let recorder = AuditRecorder::start(sink.clone(), 1).unwrap();
        recorder.record("system", (1..=5).map(snapshot).collect(), 5);

        let stats = recorder.shutdown();
        assert_eq!(stats.written, 5);
        assert_eq!(sink.rows.lock().unwrap().len(), 5);
    }

    #[test]
    fn sink_failures_are_counted_not_raised() {
        let recorder = AuditRecorder::start(FailingSink, 2).unwrap();
        recorder.record("system", vec![snapshot(1), snapshot(2)], 5);
        recorder.flush().unwrap();

        let stats = recorder.stats();
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.written, 0);
        assert_eq!(stats.failed, 2);
    }
}
