//! In-memory log ingest buffer.
//!
//! `submit` validates synchronously, enqueues, and returns; durability is
//! bounded by the flush policy (queue reaching `batch_size`, or the
//! `flush_interval` timer, whichever comes first). A single flusher task
//! swaps the pending slice under a brief lock and bulk-inserts it through
//! the [`LogSink`] seam. Flush failures are logged, never retried.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::Result;
use crate::config::LogBufferConfig;
use crate::database::Pool;
use crate::error::Error;
use crate::model::host_log::{DEFAULT_TYPE, LEVELS};
use crate::model::{HostLog, NewHostLog};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const DRAINING: u8 = 2;
const CLOSED: u8 = 3;

/// Where flushed batches land. The production sink is the database pool;
/// tests observe flushes through an in-memory implementation.
#[async_trait]
pub trait LogSink: Send + Sync + 'static {
    async fn store_batch(&self, batch: Vec<NewHostLog>) -> Result<usize>;
    async fn enforce_retention(&self) -> Result<usize>;
}

#[async_trait]
impl LogSink for Pool {
    async fn store_batch(&self, batch: Vec<NewHostLog>) -> Result<usize> {
        let mut conn = self.conn().await?;
        HostLog::insert_batch(batch, &mut conn).await
    }

    async fn enforce_retention(&self) -> Result<usize> {
        let mut conn = self.conn().await?;
        HostLog::enforce_retention(&mut conn).await
    }
}

/// An agent's log submission before validation. The host name never comes
/// from the payload; it is taken from the authenticated agent context.
#[derive(Debug, Clone, Deserialize)]
pub struct LogSubmission {
    pub level: String,
    pub component: String,
    pub message: String,
    pub timestamp: Option<String>,
    pub metadata: Option<String>,
    #[serde(rename = "type")]
    pub log_type: Option<String>,
}

impl LogSubmission {
    /// Synchronous validation, applied before a record may be enqueued.
    /// An unparseable timestamp is replaced with server-now, never rejected.
    pub fn validate(self, host_name: &str) -> Result<NewHostLog> {
        let level = self.level.to_lowercase();
        if !LEVELS.contains(&level.as_str()) {
            return Err(Error::validation(format!(
                "level must be one of {LEVELS:?}, got `{}`",
                self.level
            )));
        }
        if self.component.trim().is_empty() {
            return Err(Error::validation("component must not be empty"));
        }
        if self.message.is_empty() {
            return Err(Error::validation("message must not be empty"));
        }

        let timestamp = crate::model::host_log::parse_rfc3339_lenient(self.timestamp.as_deref())
            .unwrap_or_else(Utc::now);

        Ok(NewHostLog {
            host_name: host_name.to_string(),
            level,
            component: self.component,
            message: self.message,
            timestamp,
            metadata: self.metadata.unwrap_or_default(),
            log_type: self
                .log_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_TYPE.to_string()),
        })
    }
}

struct Shared {
    config: LogBufferConfig,
    sink: Arc<dyn LogSink>,
    pending: Mutex<Vec<NewHostLog>>,
    state: AtomicU8,
    notify: Notify,
}

impl Shared {
    fn state(&self) -> u8 {
        self.state.load(Ordering::SeqCst)
    }

    /// One flush round: swap the pending slice for an empty one under the
    /// lock, then do all I/O outside it.
    async fn flush(&self) {
        let batch = {
            let mut pending = self.pending.lock().expect("pending lock");
            std::mem::take(&mut *pending)
        };
        if batch.is_empty() {
            return;
        }

        let n_records = batch.len();
        if let Err(err) = self.sink.store_batch(batch).await {
            // Bounded loss is tolerated; the batch is not retried.
            tracing::error!("dropping {n_records} log records, flush failed: {err:?}");
            return;
        }
        match self.sink.enforce_retention().await {
            Ok(0) => {}
            Ok(evicted) => tracing::info!("log retention evicted {evicted} records"),
            Err(err) => tracing::error!("log retention failed: {err:?}"),
        }
    }
}

pub struct LogBuffer {
    shared: Arc<Shared>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl LogBuffer {
    pub fn new(config: LogBufferConfig, sink: Arc<dyn LogSink>) -> Self {
        LogBuffer {
            shared: Arc::new(Shared {
                config,
                sink,
                pending: Mutex::new(Vec::new()),
                state: AtomicU8::new(IDLE),
                notify: Notify::new(),
            }),
            flusher: Mutex::new(None),
        }
    }

    /// Spawns the flusher. Idempotent; only the idle -> running transition
    /// starts a task.
    pub fn start(&self) {
        if self
            .shared
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let shared = self.shared.clone();
        let handle = tokio::spawn(run_flusher(shared));
        *self.flusher.lock().expect("flusher lock") = Some(handle);
    }

    /// Enqueues a validated record. Acceptance is the commitment point: the
    /// caller gets `Ok` before the record is durable.
    pub fn submit(&self, record: NewHostLog) -> Result<()> {
        if self.shared.state() != RUNNING {
            return Err(Error::Unexpected(anyhow::anyhow!(
                "log buffer is not accepting records"
            )));
        }
        let queued = {
            let mut pending = self.shared.pending.lock().expect("pending lock");
            pending.push(record);
            pending.len()
        };
        if queued >= self.shared.config.batch_size {
            self.shared.notify.notify_one();
        }
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.shared.pending.lock().expect("pending lock").len()
    }

    /// Drains the remainder and stops the flusher. Submissions fail from
    /// the moment draining starts.
    pub async fn close(&self) {
        let was = self
            .shared
            .state
            .swap(DRAINING, Ordering::SeqCst);
        if was == RUNNING {
            self.shared.notify.notify_one();
            let handle = self.flusher.lock().expect("flusher lock").take();
            if let Some(handle) = handle {
                if let Err(err) = handle.await {
                    tracing::error!("log flusher panicked: {err}");
                }
            }
        }
        self.shared.state.store(CLOSED, Ordering::SeqCst);
    }
}

async fn run_flusher(shared: Arc<Shared>) {
    let mut interval = tokio::time::interval(shared.config.flush_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shared.notify.notified() => {}
        }
        shared.flush().await;
        if shared.state() == DRAINING {
            // Nothing new can be submitted once draining; one final pass
            // clears anything that raced in before the transition.
            shared.flush().await;
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[derive(Default)]
    struct MemorySink {
        batches: Mutex<Vec<Vec<NewHostLog>>>,
        retention_runs: AtomicU8,
    }

    #[async_trait]
    impl LogSink for MemorySink {
        async fn store_batch(&self, batch: Vec<NewHostLog>) -> Result<usize> {
            let n_records = batch.len();
            self.batches.lock().unwrap().push(batch);
            Ok(n_records)
        }

        async fn enforce_retention(&self) -> Result<usize> {
            self.retention_runs.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }
    }

    fn record(message: &str) -> NewHostLog {
        LogSubmission {
            level: "info".to_string(),
            component: "osHealth".to_string(),
            message: message.to_string(),
            timestamp: None,
            metadata: None,
            log_type: None,
        }
        .validate("alpha")
        .unwrap()
    }

    fn config(batch_size: usize, flush_interval: Duration) -> LogBufferConfig {
        LogBufferConfig {
            batch_size,
            flush_interval,
        }
    }

    #[tokio::test]
    async fn size_trigger_flushes_in_enqueue_order() {
        let sink = Arc::new(MemorySink::default());
        let buffer = LogBuffer::new(config(3, Duration::from_secs(5)), sink.clone());
        buffer.start();

        for message in ["one", "two", "three"] {
            buffer.submit(record(message)).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let messages: Vec<_> = batches[0].iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, ["one", "two", "three"]);
        assert_eq!(sink.retention_runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timer_flushes_partial_batches() {
        let sink = Arc::new(MemorySink::default());
        let buffer = LogBuffer::new(config(10, Duration::from_millis(100)), sink.clone());
        buffer.start();

        buffer.submit(record("lonely")).unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;

        assert_eq!(sink.batches.lock().unwrap().len(), 1);
        assert_eq!(buffer.pending(), 0);
    }

    #[tokio::test]
    async fn close_drains_and_rejects_further_submissions() {
        let sink = Arc::new(MemorySink::default());
        let buffer = LogBuffer::new(config(10, Duration::from_secs(60)), sink.clone());
        buffer.start();

        buffer.submit(record("a")).unwrap();
        buffer.submit(record("b")).unwrap();
        buffer.close().await;

        let total: usize = sink.batches.lock().unwrap().iter().map(Vec::len).sum();
        assert_eq!(total, 2);
        assert!(buffer.submit(record("late")).is_err());
    }

    #[tokio::test]
    async fn submit_before_start_fails() {
        let sink = Arc::new(MemorySink::default());
        let buffer = LogBuffer::new(config(10, Duration::from_secs(5)), sink);
        assert!(buffer.submit(record("early")).is_err());
    }

    #[test]
    fn validation_rejects_bad_level_and_empty_fields() {
        let bad_level = LogSubmission {
            level: "debug".to_string(),
            component: "osHealth".to_string(),
            message: "hi".to_string(),
            timestamp: None,
            metadata: None,
            log_type: None,
        };
        assert!(bad_level.validate("alpha").is_err());

        let empty_component = LogSubmission {
            level: "error".to_string(),
            component: "  ".to_string(),
            message: "hi".to_string(),
            timestamp: None,
            metadata: None,
            log_type: None,
        };
        assert!(empty_component.validate("alpha").is_err());
    }

    #[test]
    fn validation_normalizes_and_defaults() {
        let submission = LogSubmission {
            level: "ERROR".to_string(),
            component: "mysqlHealth".to_string(),
            message: "replication stopped".to_string(),
            timestamp: Some("not-a-timestamp".to_string()),
            metadata: None,
            log_type: None,
        };
        let before = Utc::now();
        let record = submission.validate("db-1").unwrap();
        assert_eq!(record.level, "error");
        assert_eq!(record.log_type, "monokit");
        assert_eq!(record.host_name, "db-1");
        // Unparseable timestamp became server-now.
        assert!(record.timestamp >= before);

        let keeps_timestamp = LogSubmission {
            level: "info".to_string(),
            component: "osHealth".to_string(),
            message: "ok".to_string(),
            timestamp: Some("2026-07-01T10:00:00Z".to_string()),
            metadata: Some("{\"disk\":91}".to_string()),
            log_type: Some("custom".to_string()),
        }
        .validate("db-1")
        .unwrap();
        assert_eq!(keeps_timestamp.timestamp.to_rfc3339(), "2026-07-01T10:00:00+00:00");
        assert_eq!(keeps_timestamp.log_type, "custom");
    }
}
