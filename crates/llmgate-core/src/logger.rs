//! Bounded, non-blocking telemetry pipeline: request handlers enqueue a
//! [`LogEntry`] and move on; a single background task batches and flushes
//! them, so a slow or unavailable store never adds latency to a client
//! response.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use llmgate_storage::{LogEntry, Store};

#[derive(Debug, Clone, Copy)]
pub struct LoggerConfig {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub flush_timeout: Duration,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 100,
            flush_interval: Duration::from_millis(500),
            flush_timeout: Duration::from_secs(10),
        }
    }
}

/// Handle kept by request handlers. Cloning is cheap (an `Arc` and a
/// channel sender internally); the background worker is owned by the
/// [`JoinHandle`] returned from [`AsyncLogger::spawn`].
#[derive(Clone)]
pub struct AsyncLogger {
    tx: mpsc::Sender<LogEntry>,
    dropped: Arc<AtomicU64>,
}

impl AsyncLogger {
    pub fn spawn<S: Store + 'static>(store: Arc<S>, config: LoggerConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        let handle = tokio::spawn(run_worker(store, rx, config));
        (Self { tx, dropped }, handle)
    }

    /// Non-blocking enqueue. If the queue is full the entry is dropped and
    /// the dropped-counter incremented; callers never await backpressure
    /// from telemetry.
    pub fn enqueue(&self, entry: LogEntry) {
        if self.tx.try_send(entry).is_err() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(event = "log_queue_full", dropped_total = total);
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn run_worker<S: Store>(store: Arc<S>, mut rx: mpsc::Receiver<LogEntry>, config: LoggerConfig) {
    tracing::info!(event = "async_logger_started", queue_capacity = config.queue_capacity);
    let mut buffer = Vec::with_capacity(config.batch_size);
    let mut ticker = tokio::time::interval(config.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            entry = rx.recv() => {
                match entry {
                    Some(entry) => {
                        buffer.push(entry);
                        if buffer.len() >= config.batch_size {
                            flush(&store, &mut buffer, config.flush_timeout).await;
                        }
                    }
                    None => break,
                }
            }
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    flush(&store, &mut buffer, config.flush_timeout).await;
                }
            }
        }
    }

    // drain whatever arrived between the last recv and the channel closing
    while let Ok(entry) = rx.try_recv() {
        buffer.push(entry);
    }
    if !buffer.is_empty() {
        flush(&store, &mut buffer, config.flush_timeout).await;
    }
    tracing::info!(event = "async_logger_stopped");
}

async fn flush<S: Store>(store: &Arc<S>, buffer: &mut Vec<LogEntry>, timeout: Duration) {
    let batch = std::mem::take(buffer);
    let len = batch.len();
    match tokio::time::timeout(timeout, store.insert_log_batch(batch)).await {
        Ok(Ok(())) => tracing::debug!(event = "log_batch_flushed", entries = len),
        Ok(Err(err)) => tracing::warn!(event = "log_batch_flush_failed", entries = len, error = %err),
        Err(_) => tracing::warn!(event = "log_batch_flush_timed_out", entries = len),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgate_storage::{Dialect, InMemoryStore};

    fn sample_entry() -> LogEntry {
        LogEntry {
            key_id: Some(1),
            ts: time::OffsetDateTime::now_utc(),
            method: "POST".into(),
            path: "/v1/messages".into(),
            model: Some("claude-3-5-sonnet".into()),
            input_dialect: Dialect::Anthropic,
            upstream_id: Some(1),
            status: 200,
            latency_ms: 12,
            overhead_us: 3,
            input_tokens: 8,
            output_tokens: 3,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
            cost: 0.001,
            error_message: None,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn flushes_on_batch_size_trigger() {
        let store = Arc::new(InMemoryStore::new());
        let config = LoggerConfig { batch_size: 2, flush_interval: Duration::from_secs(60), ..Default::default() };
        let (logger, handle) = AsyncLogger::spawn(store.clone(), config);
        logger.enqueue(sample_entry());
        logger.enqueue(sample_entry());
        // give the worker a tick to drain and flush
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.logs().len(), 2);
        drop(logger);
        let _ = handle.await;
    }

    #[tokio::test]
    async fn flushes_on_timer_tick_below_batch_size() {
        let store = Arc::new(InMemoryStore::new());
        let config = LoggerConfig {
            batch_size: 100,
            flush_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let (logger, handle) = AsyncLogger::spawn(store.clone(), config);
        logger.enqueue(sample_entry());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.logs().len(), 1);
        drop(logger);
        let _ = handle.await;
    }

    #[tokio::test]
    async fn drains_residual_entries_on_shutdown() {
        let store = Arc::new(InMemoryStore::new());
        let config = LoggerConfig {
            batch_size: 100,
            flush_interval: Duration::from_secs(60),
            ..Default::default()
        };
        let (logger, handle) = AsyncLogger::spawn(store.clone(), config);
        logger.enqueue(sample_entry());
        logger.enqueue(sample_entry());
        drop(logger);
        handle.await.unwrap();
        assert_eq!(store.logs().len(), 2);
    }

    #[tokio::test]
    async fn drops_entries_and_counts_them_when_queue_is_full() {
        let store = Arc::new(InMemoryStore::new());
        let config = LoggerConfig {
            queue_capacity: 1,
            batch_size: 100,
            flush_interval: Duration::from_secs(60),
            ..Default::default()
        };
        let (logger, handle) = AsyncLogger::spawn(store.clone(), config);
        for _ in 0..5 {
            logger.enqueue(sample_entry());
        }
        assert!(logger.dropped_count() > 0);
        drop(logger);
        let _ = handle.await;
    }
}
