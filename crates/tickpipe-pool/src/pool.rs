//! Fixed-size worker pool over one bounded queue.

use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::task::Task;
use futures_util::future::join_all;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Point-in-time pool snapshot. Derived from counters, never
/// authoritative state.
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub running: bool,
    pub workers: usize,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub submitted: u64,
    pub processed: u64,
    pub failed: u64,
    pub retried: u64,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct PoolShared {
    queued: AtomicUsize,
    submitted: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    last_error: parking_lot::Mutex<Option<String>>,
}

impl PoolShared {
    fn record_error(&self, message: String) {
        *self.last_error.lock() = Some(message);
    }
}

/// Everything a worker needs to execute and retry tasks.
struct WorkerCtx {
    config: PoolConfig,
    shared: Arc<PoolShared>,
    tx: mpsc::Sender<Task>,
    cancel: CancellationToken,
}

/// Fixed-size pool of workers reading from one bounded queue.
pub struct WorkerPool {
    config: PoolConfig,
    shared: Arc<PoolShared>,
    running: AtomicBool,
    tx: parking_lot::Mutex<Option<mpsc::Sender<Task>>>,
    cancel: parking_lot::Mutex<Option<CancellationToken>>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            shared: Arc::new(PoolShared::default()),
            running: AtomicBool::new(false),
            tx: parking_lot::Mutex::new(None),
            cancel: parking_lot::Mutex::new(None),
            workers: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Spawn the workers. Fails if the pool is already running.
    pub fn start(&self) -> PoolResult<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PoolError::AlreadyRunning);
        }

        let (tx, rx) = mpsc::channel::<Task>(self.config.queue_size);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let cancel = CancellationToken::new();

        let mut handles = Vec::with_capacity(self.config.workers);
        for worker_id in 0..self.config.workers {
            let ctx = WorkerCtx {
                config: self.config.clone(),
                shared: self.shared.clone(),
                tx: tx.clone(),
                cancel: cancel.clone(),
            };
            let queue = rx.clone();
            handles.push(tokio::spawn(worker_loop(worker_id, queue, ctx)));
        }

        *self.tx.lock() = Some(tx);
        *self.cancel.lock() = Some(cancel);
        *self.workers.lock() = handles;

        info!(
            workers = self.config.workers,
            queue_size = self.config.queue_size,
            "Worker pool started"
        );
        Ok(())
    }

    /// Non-blocking enqueue. A full queue is an immediate rejection, not a
    /// wait: this is the admission-control boundary.
    pub fn submit(&self, task: Task) -> PoolResult<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(PoolError::NotRunning);
        }
        let tx = self
            .tx
            .lock()
            .as_ref()
            .cloned()
            .ok_or(PoolError::NotRunning)?;

        match tx.try_send(task) {
            Ok(()) => {
                self.shared.submitted.fetch_add(1, Ordering::Relaxed);
                self.shared.queued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(PoolError::QueueFull(self.config.queue_size))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PoolError::NotRunning),
        }
    }

    /// Enqueue a batch. Stops at the first rejection; tasks accepted
    /// before it stay queued.
    pub fn submit_batch(&self, tasks: Vec<Task>) -> PoolResult<()> {
        for task in tasks {
            self.submit(task)?;
        }
        Ok(())
    }

    /// Stop the pool: cancel, wait up to the shutdown grace for workers to
    /// drain, then proceed regardless. Repeated calls are no-ops.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
        self.tx.lock().take();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        let grace = self.config.shutdown_grace();
        if tokio::time::timeout(grace, join_all(handles)).await.is_err() {
            warn!(
                grace_ms = self.config.shutdown_grace_ms,
                "Worker pool shutdown grace elapsed with work still in flight"
            );
        }
        info!("Worker pool stopped");
    }

    /// Point-in-time status snapshot. Racy across fields relative to the
    /// exact instant, internally consistent per field.
    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            running: self.running.load(Ordering::SeqCst),
            workers: self.config.workers,
            queue_depth: self.shared.queued.load(Ordering::Relaxed),
            queue_capacity: self.config.queue_size,
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            processed: self.shared.processed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            retried: self.shared.retried.load(Ordering::Relaxed),
            last_error: self.shared.last_error.lock().clone(),
        }
    }
}

async fn worker_loop(worker_id: usize, queue: Arc<tokio::sync::Mutex<mpsc::Receiver<Task>>>, ctx: WorkerCtx) {
    debug!(worker_id, "Worker started");
    loop {
        let task = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            task = async { queue.lock().await.recv().await } => match task {
                Some(task) => task,
                None => break,
            },
        };
        ctx.shared.queued.fetch_sub(1, Ordering::Relaxed);
        // Already-dequeued work runs to completion or timeout even if the
        // pool is cancelled meanwhile.
        execute_task(task, &ctx).await;
    }
    debug!(worker_id, "Worker stopped");
}

async fn execute_task(mut task: Task, ctx: &WorkerCtx) {
    let timeout = ctx.config.task_timeout();
    let attempt = task.execute();

    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(())) => {
            ctx.shared.processed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(e)) => {
            handle_failure(task, format!("task failed: {e}"), ctx);
        }
        Err(_) => {
            let message = format!(
                "task timed out after {}ms",
                ctx.config.task_timeout_ms
            );
            handle_failure(task, message, ctx);
        }
    }
}

fn handle_failure(mut task: Task, message: String, ctx: &WorkerCtx) {
    warn!(task_id = %task.id(), retry_count = task.retry_count(), %message, "Task attempt failed");
    ctx.shared.record_error(message);

    if task.retry_count() >= ctx.config.max_retries {
        ctx.shared.failed.fetch_add(1, Ordering::Relaxed);
        return;
    }

    task.bump_retry();
    ctx.shared.retried.fetch_add(1, Ordering::Relaxed);

    // Fixed-delay re-enqueue. Exponential backoff belongs to the
    // persistence retry path, not here.
    let tx = ctx.tx.clone();
    let cancel = ctx.cancel.clone();
    let shared = ctx.shared.clone();
    let delay = ctx.config.retry_delay();
    let capacity = ctx.config.queue_size;
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
            }
            _ = tokio::time::sleep(delay) => {
                let task_id = task.id().to_string();
                match tx.try_send(task) {
                    Ok(()) => {
                        shared.queued.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(_) => {
                        // Queue full (or closing) at retry time: the retry
                        // is dropped and counted as a permanent failure.
                        shared.failed.fetch_add(1, Ordering::Relaxed);
                        shared.record_error(format!(
                            "retry of task {task_id} dropped: queue full (capacity {capacity})"
                        ));
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn test_config() -> PoolConfig {
        PoolConfig {
            workers: 2,
            queue_size: 16,
            task_timeout_ms: 500,
            max_retries: 3,
            retry_delay_ms: 10,
            shutdown_grace_ms: 1000,
        }
    }

    fn ok_task(id: &str, counter: Arc<AtomicU32>) -> Task {
        Task::new(id, move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    async fn wait_until(deadline_ms: u64, mut check: impl FnMut() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(deadline_ms);
        while tokio::time::Instant::now() < deadline {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        check()
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let pool = WorkerPool::new(test_config());
        pool.start().unwrap();
        assert!(matches!(pool.start(), Err(PoolError::AlreadyRunning)));
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_submit_before_start_rejected() {
        let pool = WorkerPool::new(test_config());
        let err = pool
            .submit(ok_task("t", Arc::new(AtomicU32::new(0))))
            .unwrap_err();
        assert!(matches!(err, PoolError::NotRunning));
    }

    #[tokio::test]
    async fn test_tasks_are_processed() {
        let pool = WorkerPool::new(test_config());
        pool.start().unwrap();

        let counter = Arc::new(AtomicU32::new(0));
        for i in 0..10 {
            pool.submit(ok_task(&format!("t{i}"), counter.clone()))
                .unwrap();
        }

        assert!(wait_until(2000, || counter.load(Ordering::SeqCst) == 10).await);
        assert!(wait_until(2000, || pool.status().processed == 10).await);
        assert_eq!(pool.status().failed, 0);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_queue_full_rejects_without_blocking() {
        let config = PoolConfig {
            workers: 1,
            queue_size: 2,
            ..test_config()
        };
        let pool = WorkerPool::new(config);
        pool.start().unwrap();

        // Park the single worker on a task that never finishes on its own.
        let blocker = Task::new("blocker", || {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(400)).await;
                Ok(())
            })
        });
        pool.submit(blocker).unwrap();
        assert!(wait_until(1000, || pool.status().queue_depth == 0).await);

        // Fill the queue, then one more must be rejected immediately.
        for i in 0..2 {
            pool.submit(ok_task(&format!("q{i}"), Arc::new(AtomicU32::new(0))))
                .unwrap();
        }
        let err = pool
            .submit(ok_task("overflow", Arc::new(AtomicU32::new(0))))
            .unwrap_err();
        assert!(matches!(err, PoolError::QueueFull(2)));
        assert!(pool.status().queue_depth <= 2);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_failed_task_is_retried_then_succeeds() {
        let pool = WorkerPool::new(test_config());
        pool.start().unwrap();

        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_in = attempts.clone();
        let task = Task::new("flaky", move || {
            let attempts = attempts_in.clone();
            Box::pin(async move {
                // Fail the first two attempts, succeed on the third.
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("transient glitch".into())
                } else {
                    Ok(())
                }
            })
        });
        pool.submit(task).unwrap();

        assert!(wait_until(3000, || pool.status().processed == 1).await);
        let status = pool.status();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(status.retried, 2);
        assert_eq!(status.failed, 0);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_retries_exhausted_becomes_permanent_failure() {
        let config = PoolConfig {
            max_retries: 2,
            ..test_config()
        };
        let pool = WorkerPool::new(config);
        pool.start().unwrap();

        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_in = attempts.clone();
        let task = Task::new("doomed", move || {
            let attempts = attempts_in.clone();
            Box::pin(async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("always broken".into())
            })
        });
        pool.submit(task).unwrap();

        assert!(wait_until(3000, || pool.status().failed == 1).await);
        let status = pool.status();
        // Initial attempt + exactly max_retries retries.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(status.retried, 2);
        assert_eq!(status.processed, 0);
        assert!(status.last_error.unwrap().contains("always broken"));
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_task_timeout_counts_as_failure() {
        let config = PoolConfig {
            task_timeout_ms: 20,
            max_retries: 0,
            ..test_config()
        };
        let pool = WorkerPool::new(config);
        pool.start().unwrap();

        let task = Task::new("slow", || {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
        });
        pool.submit(task).unwrap();

        assert!(wait_until(2000, || pool.status().failed == 1).await);
        assert!(pool
            .status()
            .last_error
            .unwrap()
            .contains("timed out after 20ms"));
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let pool = WorkerPool::new(test_config());
        pool.start().unwrap();
        pool.stop().await;
        assert!(!pool.status().running);
        // Second stop is a no-op.
        pool.stop().await;
        assert!(matches!(
            pool.submit(ok_task("late", Arc::new(AtomicU32::new(0)))),
            Err(PoolError::NotRunning)
        ));
    }
}
