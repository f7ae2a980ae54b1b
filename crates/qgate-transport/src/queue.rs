//! Bounded-concurrency admission control for outbound requests.
//!
//! [`RequestQueue`] is a capacity limiter, not a FIFO pipeline: at most
//! `max_concurrency` tasks execute at once, and tasks that finish quickly may
//! complete out of submission order.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::trace;

use qgate_core::{ApiError, ApiResult};

/// Limits how many requests are in flight.
#[derive(Clone)]
pub struct RequestQueue {
    handle: Handle,
    slots: Arc<Semaphore>,
    max_concurrency: usize,
}

impl RequestQueue {
    /// Creates a queue that spawns submitted tasks on `handle`.
    ///
    /// `max_concurrency` is clamped to at least one.
    pub fn new(handle: Handle, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            handle,
            slots: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    /// Configured concurrency bound.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Number of tasks currently executing.
    pub fn in_flight(&self) -> usize {
        self.max_concurrency - self.slots.available_permits()
    }

    /// Enqueues a task and returns a handle to its eventual result.
    ///
    /// The task starts once a slot is free.
    pub fn submit<F>(&self, task: F) -> RequestHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let queue = self.clone();
        RequestHandle {
            inner: self.handle.spawn(async move { queue.run(task).await }),
        }
    }

    /// Runs a task on the calling task once a slot is free.
    pub async fn run<F: Future>(&self, task: F) -> F::Output {
        // The semaphore is never closed, so acquiring can only succeed.
        let _permit = self.slots.acquire().await;
        trace!(in_flight = self.in_flight(), "Request admitted");
        task.await
    }
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("max_concurrency", &self.max_concurrency)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Eventual result of a submitted task.
#[derive(Debug)]
pub struct RequestHandle<T> {
    inner: JoinHandle<T>,
}

impl<T> RequestHandle<T> {
    /// Cancels the task. Awaiting the handle then yields [`ApiError::Aborted`].
    pub fn abort(&self) {
        self.inner.abort();
    }

    /// Whether the task has finished.
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl<T> Future for RequestHandle<T> {
    type Output = ApiResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner)
            .poll(cx)
            .map(|result| result.map_err(|e| ApiError::Aborted(e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_max_concurrency() {
        let queue = RequestQueue::new(Handle::current(), 2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5u64)
            .map(|i| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                queue.submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10 * (5 - i))).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    i
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(results, vec![0, 1, 2, 3, 4]);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn zero_is_clamped_to_one() {
        let queue = RequestQueue::new(Handle::current(), 0);
        assert_eq!(queue.max_concurrency(), 1);
        assert_eq!(queue.run(async { 7 }).await, 7);
    }

    #[tokio::test]
    async fn aborted_task_reports_error() {
        let queue = RequestQueue::new(Handle::current(), 1);
        let handle = queue.submit(std::future::pending::<()>());
        handle.abort();
        assert!(matches!(handle.await, Err(ApiError::Aborted(_))));
    }
}
