//! Async Dispatcher
//!
//! Bounded worker pool for upstream queries that may be slow (historical
//! time series). Submitting returns immediately; the command intake path
//! never waits on a query.
//!
//! # Failure containment
//!
//! Each task runs behind `catch_unwind`. Errors and panics are logged and
//! counted, and the worker moves on to the next task.
//!
//! # Shutdown
//!
//! [`AsyncDispatcher::shutdown`] stops the pool immediately: queued tasks are
//! dropped without running and in-flight tasks are abandoned at their next
//! await point.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::infrastructure::metrics::{self, Outcome};

/// Default number of workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Default bound of the pending task queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

// =============================================================================
// Error Type
// =============================================================================

/// Reasons a task was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The dispatcher has been shut down.
    #[error("dispatcher is shut down")]
    ShutDown,

    /// The pending queue is at capacity.
    #[error("task queue is full (capacity {0})")]
    QueueFull(usize),
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    rejected: AtomicU64,
}

/// Snapshot of dispatcher activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    /// Worker count.
    pub workers: usize,
    /// Tasks accepted into the queue.
    pub submitted: u64,
    /// Tasks that finished with `Ok`.
    pub completed: u64,
    /// Tasks that finished with `Err`.
    pub failed: u64,
    /// Tasks that panicked.
    pub panicked: u64,
    /// Tasks refused at submission.
    pub rejected: u64,
    /// Tasks waiting for a worker.
    pub queued: usize,
}

// =============================================================================
// Dispatcher
// =============================================================================

struct Job {
    id: Uuid,
    kind: &'static str,
    task: BoxFuture<'static, anyhow::Result<()>>,
}

/// Fixed-size pool of tokio workers draining a bounded task queue.
pub struct AsyncDispatcher {
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
    worker_count: usize,
    capacity: usize,
}

impl AsyncDispatcher {
    /// Start `workers` worker tasks sharing a queue of `capacity` entries.
    ///
    /// Both values are clamped to at least one. Must be called from within a
    /// tokio runtime.
    #[must_use]
    pub fn start(workers: usize, capacity: usize) -> Self {
        let worker_count = workers.max(1);
        let capacity = capacity.max(1);

        let (tx, rx) = mpsc::channel::<Job>(capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let cancel = CancellationToken::new();
        let counters = Arc::new(Counters::default());

        let handles = (0..worker_count)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&rx),
                    cancel.clone(),
                    Arc::clone(&counters),
                ))
            })
            .collect();

        tracing::debug!(workers = worker_count, capacity, "Dispatcher started");

        Self {
            tx: Mutex::new(Some(tx)),
            cancel,
            workers: Mutex::new(handles),
            counters,
            worker_count,
            capacity,
        }
    }

    /// Queue a task for execution on the pool.
    ///
    /// Returns the task id without waiting for the task to run.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ShutDown`] after shutdown and
    /// [`DispatchError::QueueFull`] when the queue is at capacity.
    pub fn submit<F>(&self, kind: &'static str, task: F) -> Result<Uuid, DispatchError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let result = self.try_enqueue(kind, Box::pin(task));

        match &result {
            Ok(id) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(task_id = %id, kind, "Task queued");
            }
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                metrics::record_task(kind, Outcome::Rejected);
                tracing::warn!(kind, error = %e, "Task rejected");
            }
        }

        result
    }

    fn try_enqueue(
        &self,
        kind: &'static str,
        task: BoxFuture<'static, anyhow::Result<()>>,
    ) -> Result<Uuid, DispatchError> {
        if self.cancel.is_cancelled() {
            return Err(DispatchError::ShutDown);
        }

        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(DispatchError::ShutDown)?;

        let id = Uuid::new_v4();
        tx.try_send(Job { id, kind, task }).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull(self.capacity),
            mpsc::error::TrySendError::Closed(_) => DispatchError::ShutDown,
        })?;

        Ok(id)
    }

    /// Stop the pool without draining.
    ///
    /// Returns the number of queued tasks that were discarded.
    pub fn shutdown(&self) -> usize {
        let discarded = self.queued();

        self.cancel.cancel();
        self.tx.lock().take();
        for handle in self.workers.lock().drain(..) {
            handle.abort();
        }

        tracing::info!(discarded, "Dispatcher shut down");
        discarded
    }

    /// Check if [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Number of tasks waiting for a worker.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.tx
            .lock()
            .as_ref()
            .map_or(0, |tx| tx.max_capacity() - tx.capacity())
    }

    /// Snapshot of dispatcher activity.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            workers: self.worker_count,
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            queued: self.queued(),
        }
    }
}

impl Drop for AsyncDispatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
        for handle in self.workers.get_mut().drain(..) {
            handle.abort();
        }
    }
}

async fn worker_loop(
    worker: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            job = async { rx.lock().await.recv().await } => job,
        };

        let Some(job) = next else {
            break;
        };

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(worker, task_id = %job.id, kind = job.kind, "Task abandoned at shutdown");
                break;
            }
            outcome = AssertUnwindSafe(job.task).catch_unwind() => outcome,
        };

        match outcome {
            Ok(Ok(())) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
                metrics::record_task(job.kind, Outcome::Ok);
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                metrics::record_task(job.kind, Outcome::Failed);
                tracing::warn!(worker, task_id = %job.id, kind = job.kind, error = %e, "Task failed");
            }
            Err(panic) => {
                counters.panicked.fetch_add(1, Ordering::Relaxed);
                metrics::record_task(job.kind, Outcome::Panicked);
                tracing::error!(
                    worker,
                    task_id = %job.id,
                    kind = job.kind,
                    panic = panic_message(panic.as_ref()),
                    "Task panicked"
                );
            }
        }
    }

    tracing::debug!(worker, "Dispatcher worker stopped");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Notify;

    const fn ran_once() -> bool {
        true
    }

    async fn wait_for(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn runs_submitted_tasks() {
        let dispatcher = AsyncDispatcher::start(2, 16);
        let done = Arc::new(AtomicU64::new(0));

        for _ in 0..5 {
            let done = Arc::clone(&done);
            dispatcher
                .submit("test", async move {
                    done.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), anyhow::Error>(())
                })
                .unwrap();
        }

        wait_for(|| done.load(Ordering::SeqCst) == 5).await;
        wait_for(|| dispatcher.stats().completed == 5).await;
        assert_eq!(dispatcher.stats().submitted, 5);
    }

    #[tokio::test]
    async fn failing_task_does_not_stop_later_tasks() {
        let dispatcher = AsyncDispatcher::start(1, 16);
        let done = Arc::new(AtomicU64::new(0));

        dispatcher
            .submit("test", async { Err::<(), _>(anyhow::anyhow!("upstream said no")) })
            .unwrap();

        let after = Arc::clone(&done);
        dispatcher
            .submit("test", async move {
                after.fetch_add(1, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            })
            .unwrap();

        wait_for(|| done.load(Ordering::SeqCst) == 1).await;
        assert_eq!(dispatcher.stats().failed, 1);
    }

    #[tokio::test]
    async fn panicking_task_is_contained() {
        let dispatcher = AsyncDispatcher::start(1, 16);
        let done = Arc::new(AtomicU64::new(0));

        dispatcher
            .submit("test", async {
                if ran_once() {
                    panic!("boom");
                }
                Ok::<(), anyhow::Error>(())
            })
            .unwrap();

        let after = Arc::clone(&done);
        dispatcher
            .submit("test", async move {
                after.fetch_add(1, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            })
            .unwrap();

        wait_for(|| done.load(Ordering::SeqCst) == 1).await;
        assert_eq!(dispatcher.stats().panicked, 1);
    }

    #[tokio::test]
    async fn shutdown_discards_queued_tasks() {
        let dispatcher = AsyncDispatcher::start(1, 16);
        let started = Arc::new(Notify::new());
        let ran = Arc::new(AtomicU64::new(0));

        // Occupy the only worker.
        let blocker_started = Arc::clone(&started);
        dispatcher
            .submit("blocker", async move {
                blocker_started.notify_one();
                std::future::pending::<()>().await;
                Ok::<(), anyhow::Error>(())
            })
            .unwrap();
        started.notified().await;

        for _ in 0..3 {
            let ran = Arc::clone(&ran);
            dispatcher
                .submit("queued", async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), anyhow::Error>(())
                })
                .unwrap();
        }
        assert_eq!(dispatcher.queued(), 3);

        assert_eq!(dispatcher.shutdown(), 3);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let dispatcher = AsyncDispatcher::start(1, 4);
        dispatcher.shutdown();

        assert!(dispatcher.is_shut_down());
        assert_eq!(
            dispatcher.submit("late", async { Ok::<(), anyhow::Error>(()) }),
            Err(DispatchError::ShutDown)
        );
        assert_eq!(dispatcher.stats().rejected, 1);
    }

    #[tokio::test]
    async fn full_queue_rejects() {
        let dispatcher = AsyncDispatcher::start(1, 1);
        let started = Arc::new(Notify::new());

        let blocker_started = Arc::clone(&started);
        dispatcher
            .submit("blocker", async move {
                blocker_started.notify_one();
                std::future::pending::<()>().await;
                Ok::<(), anyhow::Error>(())
            })
            .unwrap();
        started.notified().await;

        dispatcher.submit("fills", async { Ok::<(), anyhow::Error>(()) }).unwrap();
        assert_eq!(
            dispatcher.submit("overflow", async { Ok::<(), anyhow::Error>(()) }),
            Err(DispatchError::QueueFull(1))
        );
    }

    #[test]
    fn panic_message_extracts_strings() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(5_u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
