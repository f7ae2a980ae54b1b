//! User callbacks and the context they are executed in.
//!
//! A [`Callback`] is either synchronous or asynchronous. Synchronous
//! callbacks run on a fixed-size [`WorkerPool`] so they cannot stall the
//! connection's I/O; asynchronous callbacks are spawned on the runtime the
//! [`Scheduler`] was built with.
//!
//! Every invocation goes through [`safe_invoke`], which turns errors *and*
//! panics into a [`CallbackError`] value instead of unwinding into the caller.
//!
//! ```rust,ignore
//! use qgate_core::handler::{Callback, Scheduler};
//!
//! let on_message = Callback::asynchronous(|event: Event| async move {
//!     tracing::info!(content = ?event.content(), "got message");
//!     Ok(())
//! });
//! let scheduler = Scheduler::current(8);
//! scheduler.schedule(&on_message, event, "message");
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info_span};

use crate::error::CallbackError;

/// Synchronous callback.
pub type SyncFn<T> = Arc<dyn Fn(T) -> anyhow::Result<()> + Send + Sync>;

/// Asynchronous callback.
pub type AsyncFn<T> = Arc<dyn Fn(T) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

// =============================================================================
// Callback
// =============================================================================

/// A user-supplied callback taking `T`.
pub enum Callback<T> {
    /// Runs on the worker pool.
    Sync(SyncFn<T>),
    /// Runs on the cooperative scheduler.
    Async(AsyncFn<T>),
}

impl<T> Clone for Callback<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(Arc::clone(f)),
            Self::Async(f) => Self::Async(Arc::clone(f)),
        }
    }
}

impl<T> std::fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Callback::Sync"),
            Self::Async(_) => f.write_str("Callback::Async"),
        }
    }
}

impl<T: Send + 'static> Callback<T> {
    /// Wraps a blocking closure.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Wraps an async closure.
    pub fn asynchronous<F, Fut>(f: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::Async(Arc::new(move |arg| f(arg).boxed()))
    }

    /// Returns `true` for asynchronous callbacks.
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}

// =============================================================================
// Worker Pool
// =============================================================================

/// Fixed-size pool for blocking callbacks.
///
/// At most `size` jobs run at once; the rest wait for a slot without
/// occupying a blocking thread.
#[derive(Clone)]
pub struct WorkerPool {
    handle: Handle,
    slots: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Creates a pool of `size` workers (at least one) on the given runtime.
    pub fn new(handle: Handle, size: usize) -> Self {
        let size = size.max(1);
        Self {
            handle,
            slots: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs a blocking job once a worker is free.
    pub async fn run<F, R>(&self, job: F) -> Result<R, CallbackError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let _permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| CallbackError::Cancelled)?;
        self.handle
            .spawn_blocking(job)
            .await
            .map_err(|e| match e.try_into_panic() {
                Ok(payload) => CallbackError::Panicked(panic_message(payload.as_ref())),
                Err(_) => CallbackError::Cancelled,
            })
    }

    /// Stops admitting new jobs. Jobs already running finish normally.
    pub fn close(&self) {
        self.slots.close();
    }
}

// =============================================================================
// Safe Invoke
// =============================================================================

/// Runs a callback and reports any error or panic as a value.
pub async fn safe_invoke<T: Send + 'static>(
    callback: Callback<T>,
    arg: T,
    workers: &WorkerPool,
) -> Result<(), CallbackError> {
    match callback {
        Callback::Sync(f) => workers
            .run(move || f(arg))
            .await?
            .map_err(CallbackError::Failed),
        Callback::Async(f) => match AssertUnwindSafe(f(arg)).catch_unwind().await {
            Ok(result) => result.map_err(CallbackError::Failed),
            Err(payload) => Err(CallbackError::Panicked(panic_message(payload.as_ref()))),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// The explicit scheduling context shared by the gateway and the dispatcher.
///
/// Holds the runtime handle async work is spawned on and the worker pool for
/// blocking callbacks. Passed in at construction; nothing looks it up
/// ambiently.
#[derive(Clone)]
pub struct Scheduler {
    handle: Handle,
    workers: WorkerPool,
}

impl Scheduler {
    /// Creates a scheduler on `handle` with `max_workers` blocking workers.
    pub fn new(handle: Handle, max_workers: usize) -> Self {
        Self {
            workers: WorkerPool::new(handle.clone(), max_workers),
            handle,
        }
    }

    /// Creates a scheduler on the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current(max_workers: usize) -> Self {
        Self::new(Handle::current(), max_workers)
    }

    /// The runtime handle.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// The blocking worker pool.
    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    /// Spawns a future on the cooperative scheduler.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Schedules a callback; failures are logged under `label` and never
    /// returned.
    ///
    /// The callback runs in a `callback` span nested under the caller's
    /// span, which for gateway events is the shard's.
    pub fn schedule<T: Send + 'static>(
        &self,
        callback: &Callback<T>,
        arg: T,
        label: &'static str,
    ) -> JoinHandle<()> {
        let callback = callback.clone();
        let workers = self.workers.clone();
        let span = info_span!("callback", callback = label);
        self.handle.spawn(
            async move {
                if let Err(e) = safe_invoke(callback, arg, &workers).await {
                    error!(error = %e, details = ?e, "Callback failed");
                }
            }
            .instrument(span),
        )
    }
}
