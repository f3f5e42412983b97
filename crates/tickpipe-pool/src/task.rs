//! Retryable units of work.

use futures_util::future::BoxFuture;
use std::fmt;

/// Outcome of one task execution attempt.
pub type TaskResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Boxed future produced by one execution attempt.
pub type TaskFuture = BoxFuture<'static, TaskResult>;

/// One unit of work submitted to the pool.
///
/// The body is a factory: each execution attempt (including retries)
/// builds a fresh future, so the task can be re-enqueued after a failure
/// without consuming it.
pub struct Task {
    id: String,
    priority: u8,
    retry_count: u32,
    run: Box<dyn FnMut() -> TaskFuture + Send>,
}

impl Task {
    pub const DEFAULT_PRIORITY: u8 = 5;

    pub fn new(id: impl Into<String>, run: impl FnMut() -> TaskFuture + Send + 'static) -> Self {
        Self {
            id: id.into(),
            priority: Self::DEFAULT_PRIORITY,
            retry_count: 0,
            run: Box::new(run),
        }
    }

    /// Lower is more urgent.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Retries already attempted.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub(crate) fn execute(&mut self) -> TaskFuture {
        (self.run)()
    }

    pub(crate) fn bump_retry(&mut self) {
        self.retry_count += 1;
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("retry_count", &self.retry_count)
            .finish()
    }
}
