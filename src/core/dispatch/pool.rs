//! Bounded worker pool
//!
//! A fixed set of tokio tasks pulls units of work from one bounded queue.
//! Submitting into a full queue waits for space, which is the backpressure
//! that keeps intake from outrunning execution.
//!
//! ```text
//! submit/dispatch ──> mpsc (queue_capacity) ──> worker 0..workers
//!                                                  └─ catch_unwind(job)
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::completion::{completion, Completion};
use crate::types::DispatchError;

type Job = BoxFuture<'static, ()>;

/// Default number of queued units of work before `submit` waits
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Configuration for the dispatch pool
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// Units of work buffered before submission waits
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl DispatchConfig {
    /// Create a DispatchConfig, replacing zero values with defaults
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        let default = Self::default();

        let workers = if workers == 0 {
            warn!(
                workers,
                default = default.workers,
                "invalid worker count, using default"
            );
            default.workers
        } else {
            workers
        };

        let queue_capacity = if queue_capacity == 0 {
            warn!(
                queue_capacity,
                default = default.queue_capacity,
                "invalid queue capacity, using default"
            );
            default.queue_capacity
        } else {
            queue_capacity
        };

        Self {
            workers,
            queue_capacity,
        }
    }
}

/// Fixed-size pool of workers consuming a bounded queue
///
/// Must be created inside a tokio runtime. Call [`shutdown`](Self::shutdown)
/// to drain the queue and stop the workers; dropping the pool stops intake
/// but does not wait.
pub struct DispatchPool {
    sender: RwLock<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    config: DispatchConfig,
}

impl DispatchPool {
    /// Spawn `config.workers` workers sharing one queue
    pub fn new(config: DispatchConfig) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(config.queue_capacity);
        let queue = Arc::new(Mutex::new(receiver));

        let workers = (0..config.workers)
            .map(|id| tokio::spawn(worker(id, Arc::clone(&queue))))
            .collect();

        debug!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "dispatch pool started"
        );

        Self {
            sender: RwLock::new(Some(sender)),
            workers: Mutex::new(workers),
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Enqueue a unit of work, waiting for queue space if needed
    ///
    /// The work reports its own result; see [`dispatch`](Self::dispatch) for
    /// the variant that hands one back.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - the work is queued and will run
    /// * `Err(DispatchError::Closed)` - the pool was shut down
    pub async fn submit<F>(&self, work: F) -> Result<(), DispatchError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Clone so a full queue never blocks shutdown behind the read lock.
        let sender = self
            .sender
            .read()
            .await
            .clone()
            .ok_or(DispatchError::Closed)?;

        sender
            .send(work.boxed())
            .await
            .map_err(|_| DispatchError::Closed)
    }

    /// Enqueue `work` and return a handle to its result
    ///
    /// `work` is not called until a worker picks it up. At that point a
    /// cancelled `cancel` short-circuits it with `DispatchError::Cancelled`,
    /// and a panic inside it is reported as `DispatchError::Panicked`
    /// without affecting the worker.
    ///
    /// # Arguments
    ///
    /// * `cancel` - Cancellation token of the submitting caller
    /// * `work` - Zero-argument callable producing the unit of work
    pub async fn dispatch<T, E, F, Fut>(
        &self,
        cancel: CancellationToken,
        work: F,
    ) -> Result<Completion<T, E>, DispatchError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<DispatchError> + Send + 'static,
    {
        let (reporter, completion) = completion::<T, E>();

        self.submit(async move {
            if cancel.is_cancelled() {
                reporter.fail(DispatchError::Cancelled.into());
                return;
            }

            match AssertUnwindSafe(async move { work().await })
                .catch_unwind()
                .await
            {
                Ok(result) => reporter.report(result),
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(%message, "unit of work panicked");
                    reporter.fail(DispatchError::Panicked { message }.into());
                }
            }
        })
        .await?;

        Ok(completion)
    }

    /// Dispatch `work` and wait for its result
    pub async fn run<T, E, F, Fut>(&self, cancel: CancellationToken, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<DispatchError> + Send + 'static,
    {
        self.dispatch(cancel, work).await.map_err(E::from)?.wait().await
    }

    /// Stop intake, then wait until every queued unit of work has run
    ///
    /// Safe to call more than once; later calls wait for the first to
    /// finish and return.
    pub async fn shutdown(&self) {
        drop(self.sender.write().await.take());

        let mut workers = self.workers.lock().await;
        if workers.is_empty() {
            return;
        }
        for handle in workers.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "dispatch worker ended abnormally");
            }
        }
        info!("dispatch pool shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) has started
    pub async fn is_closed(&self) -> bool {
        self.sender.read().await.is_none()
    }
}

async fn worker(id: usize, queue: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        let job = queue.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };

        if let Err(panic) = AssertUnwindSafe(job).catch_unwind().await {
            error!(
                worker = id,
                message = %panic_message(panic.as_ref()),
                "submitted work panicked"
            );
        }
    }
    debug!(worker = id, "dispatch worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
