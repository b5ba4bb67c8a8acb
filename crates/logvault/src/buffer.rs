//! Batching of accepted records before fan-out
//!
//! The [`Buffer`] collects records and hands them to a [`FlushHandler`] in
//! batches: when the pending count reaches the policy's size, when a record
//! at or above the immediate-flush severity arrives, on every tick of the
//! auto-flush timer, and on explicit request.
//!
//! Batches reach the handler in the order their records were appended.
//! Draining and delivery happen under one gate, so a later batch can never
//! overtake an earlier one.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use logvault_core::{BufferPolicy, LogRecord};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Receives flushed batches
#[async_trait]
pub trait FlushHandler: Send + Sync {
    /// Called with each drained batch. Timer ticks deliver empty batches too.
    async fn on_flush(&self, records: Vec<LogRecord>);
}

struct AutoFlush {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Pending records plus the timer that drains them
pub struct Buffer {
    policy: RwLock<BufferPolicy>,
    pending: Mutex<Vec<LogRecord>>,
    handler: RwLock<Option<Arc<dyn FlushHandler>>>,
    auto_flush: Mutex<Option<AutoFlush>>,
    flush_gate: tokio::sync::Mutex<()>,
}

impl Buffer {
    pub fn new(policy: BufferPolicy) -> Self {
        Self {
            pending: Mutex::new(Vec::with_capacity(policy.max_size)),
            policy: RwLock::new(policy),
            handler: RwLock::new(None),
            auto_flush: Mutex::new(None),
            flush_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn policy(&self) -> BufferPolicy {
        self.policy.read().clone()
    }

    /// Swap the policy; takes effect for the timer on the next start
    pub fn set_policy(&self, policy: BufferPolicy) {
        *self.policy.write() = policy;
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn is_auto_flushing(&self) -> bool {
        self.auto_flush.lock().is_some()
    }

    /// Add a record; returns whether this append triggered a flush
    ///
    /// A triggered flush has completed (handler included) by the time this
    /// returns.
    pub async fn append(&self, record: LogRecord) -> bool {
        let (max_size, immediate) = {
            let policy = self.policy.read();
            (policy.max_size, policy.flushes_immediately(record.severity()))
        };
        let full = {
            let mut pending = self.pending.lock();
            pending.push(record);
            pending.len() >= max_size
        };

        if immediate || full {
            self.deliver(false).await;
            true
        } else {
            false
        }
    }

    /// Add several records, flushing at most once
    pub async fn append_batch(&self, records: impl IntoIterator<Item = LogRecord>) -> bool {
        let (max_size, flush_on) = {
            let policy = self.policy.read();
            (policy.max_size, policy.flush_on)
        };
        let trigger = {
            let mut pending = self.pending.lock();
            let mut immediate = false;
            for record in records {
                immediate |= flush_on.is_some_and(|threshold| record.severity() >= threshold);
                pending.push(record);
            }
            immediate || pending.len() >= max_size
        };

        if trigger {
            self.deliver(false).await;
        }
        trigger
    }

    /// Drain and return everything pending, bypassing the handler
    pub async fn flush(&self) -> Vec<LogRecord> {
        let _gate = self.flush_gate.lock().await;
        std::mem::take(&mut *self.pending.lock())
    }

    /// Drain and hand whatever is pending to the handler
    ///
    /// Returns the number of records delivered.
    pub async fn flush_to_handler(&self) -> usize {
        self.deliver(false).await
    }

    async fn deliver(&self, include_empty: bool) -> usize {
        let _gate = self.flush_gate.lock().await;
        let batch = std::mem::take(&mut *self.pending.lock());
        let count = batch.len();
        if count == 0 && !include_empty {
            return 0;
        }

        let handler = self.handler.read().clone();
        match handler {
            Some(handler) => handler.on_flush(batch).await,
            None if count > 0 => debug!(dropped = count, "Buffer flushed without a handler"),
            None => {}
        }
        count
    }

    /// Register the handler and start the periodic timer
    ///
    /// The handler is kept even when the policy's interval is zero, in which
    /// case only size and severity triggers deliver. A running timer is
    /// replaced.
    pub fn start_auto_flush(self: &Arc<Self>, handler: Arc<dyn FlushHandler>) {
        *self.handler.write() = Some(handler);

        let interval = self.policy.read().flush_interval;
        let previous = self.auto_flush.lock().take();
        if let Some(previous) = previous {
            let _ = previous.stop_tx.send(true);
            previous.task.abort();
        }
        if interval.is_zero() {
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = FlushTask::spawn(Arc::downgrade(self), interval, stop_rx);
        *self.auto_flush.lock() = Some(AutoFlush { stop_tx, task });
    }

    /// Stop the timer
    ///
    /// Waits for a tick that is already delivering, so no handler call from
    /// the timer happens after this returns. Must not be awaited from
    /// inside the handler.
    pub async fn stop_auto_flush(&self) {
        let running = self.auto_flush.lock().take();
        if let Some(AutoFlush { stop_tx, task }) = running {
            let _ = stop_tx.send(true);
            let _ = task.await;
            debug!("Auto-flush stopped");
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(running) = self.auto_flush.get_mut().take() {
            running.task.abort();
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("policy", &*self.policy.read())
            .field("pending", &self.len())
            .field("auto_flushing", &self.is_auto_flushing())
            .finish()
    }
}

/// Periodic drain of a buffer
struct FlushTask {
    buffer: Weak<Buffer>,
    interval: Duration,
    stop_rx: watch::Receiver<bool>,
}

impl FlushTask {
    fn spawn(
        buffer: Weak<Buffer>,
        interval: Duration,
        stop_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let task = Self {
            buffer,
            interval,
            stop_rx,
        };
        tokio::spawn(async move {
            task.run().await;
        })
    }

    async fn run(mut self) {
        debug!(interval_ms = self.interval.as_millis() as u64, "Auto-flush started");

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.stop_rx.changed() => break,
                _ = ticker.tick() => {
                    let Some(buffer) = self.buffer.upgrade() else { break };
                    buffer.deliver(true).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use logvault_core::{CallSite, Severity};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        batches: Mutex<Vec<Vec<String>>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FlushHandler for Recorder {
        async fn on_flush(&self, records: Vec<LogRecord>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batches
                .lock()
                .push(records.iter().map(|r| r.message().to_string()).collect());
        }
    }

    fn record(severity: Severity, message: &str) -> LogRecord {
        LogRecord::new(severity, message, "Test", CallSite::default())
    }

    fn policy(max_size: usize, interval: Duration) -> BufferPolicy {
        BufferPolicy::new(max_size, interval, None, true)
    }

    #[tokio::test]
    async fn test_max_size_triggers_flush() {
        let buffer = Arc::new(Buffer::new(policy(3, Duration::ZERO)));
        let recorder = Arc::new(Recorder::default());
        buffer.start_auto_flush(recorder.clone());

        assert!(!buffer.append(record(Severity::Info, "1")).await);
        assert!(!buffer.append(record(Severity::Info, "2")).await);
        assert!(buffer.append(record(Severity::Info, "3")).await);

        assert!(buffer.is_empty());
        assert_eq!(*recorder.batches.lock(), vec![vec!["1", "2", "3"]]);
        assert!(!buffer.is_auto_flushing());
    }

    #[tokio::test]
    async fn test_severity_threshold_flushes_immediately() {
        let buffer = Arc::new(Buffer::new(BufferPolicy::new(
            100,
            Duration::ZERO,
            Some(Severity::Error),
            true,
        )));
        let recorder = Arc::new(Recorder::default());
        buffer.start_auto_flush(recorder.clone());

        assert!(!buffer.append(record(Severity::Warning, "w")).await);
        assert!(buffer.append(record(Severity::Error, "e")).await);
        assert_eq!(*recorder.batches.lock(), vec![vec!["w", "e"]]);
    }

    #[tokio::test]
    async fn test_manual_flush_returns_pending() {
        let buffer = Buffer::new(policy(10, Duration::ZERO));
        buffer.append(record(Severity::Info, "a")).await;
        buffer.append(record(Severity::Info, "b")).await;

        let drained = buffer.flush().await;
        assert_eq!(drained.len(), 2);
        assert!(buffer.is_empty());
        assert!(buffer.flush().await.is_empty());
    }

    #[tokio::test]
    async fn test_append_batch_flushes_once() {
        let buffer = Arc::new(Buffer::new(policy(2, Duration::ZERO)));
        let recorder = Arc::new(Recorder::default());
        buffer.start_auto_flush(recorder.clone());

        let records = (0..5).map(|i| record(Severity::Info, &i.to_string()));
        assert!(buffer.append_batch(records).await);
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.batches.lock()[0].len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_ticks_deliver_even_empty_batches() {
        let buffer = Arc::new(Buffer::new(policy(100, Duration::from_secs(5))));
        let recorder = Arc::new(Recorder::default());
        buffer.start_auto_flush(recorder.clone());
        assert!(buffer.is_auto_flushing());

        buffer.append(record(Severity::Info, "queued")).await;
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(*recorder.batches.lock(), vec![vec!["queued"]]);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 2);
        assert!(recorder.batches.lock()[1].is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_auto_flush_is_final() {
        let buffer = Arc::new(Buffer::new(policy(100, Duration::from_secs(1))));
        let recorder = Arc::new(Recorder::default());
        buffer.start_auto_flush(recorder.clone());

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        buffer.stop_auto_flush().await;
        let calls = recorder.calls.load(Ordering::SeqCst);
        assert_eq!(calls, 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(recorder.calls.load(Ordering::SeqCst), calls);
        assert!(!buffer.is_auto_flushing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timer() {
        let recorder = Arc::new(Recorder::default());
        {
            let buffer = Arc::new(Buffer::new(policy(100, Duration::from_secs(1))));
            buffer.start_auto_flush(recorder.clone());
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_appends_lose_nothing() {
        let buffer = Arc::new(Buffer::new(policy(7, Duration::ZERO)));
        let recorder = Arc::new(Recorder::default());
        buffer.start_auto_flush(recorder.clone());

        let mut tasks = Vec::new();
        for t in 0..4 {
            let buffer = Arc::clone(&buffer);
            tasks.push(tokio::spawn(async move {
                for i in 0..25 {
                    buffer.append(record(Severity::Info, &format!("{t}-{i}"))).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        buffer.flush_to_handler().await;

        let delivered: usize = recorder.batches.lock().iter().map(Vec::len).sum();
        assert_eq!(delivered, 100);
        assert!(buffer.is_empty());
    }
}
