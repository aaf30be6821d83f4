//! Background worker harness
//!
//! A worker is a spawned task running a restart loop. It waits between
//! attempts with [`WorkerContext::retry_wait`], which ends on whichever comes
//! first: the retry interval elapsing or an explicit wake. Stopping a worker
//! aborts its task outright; in-flight serial or HTTP operations are dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

/// What a worker is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Opening the serial port or logging in
    Opening,
    /// Running the board discovery handshake
    Discovering,
    /// Pushing the initial state
    Syncing,
    /// Processing changes
    Running,
    /// Waiting before the next attempt
    Waiting,
}

/// Why a retry wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Elapsed,
    Woken,
}

/// Handles given to a worker's task
pub struct WorkerContext {
    name: String,
    wake: Arc<Notify>,
    phase: watch::Sender<Phase>,
}

impl WorkerContext {
    /// Worker name used in log output
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_phase(&self, phase: Phase) {
        self.phase.send_if_modified(|current| {
            let changed = *current != phase;
            *current = phase;
            changed
        });
    }

    /// Wait for `interval` (forever when `None`) or until woken
    pub async fn retry_wait(&self, interval: Option<Duration>) -> WaitOutcome {
        self.set_phase(Phase::Waiting);
        let outcome = wait_or_wake(interval, &self.wake).await;
        debug!("{} retry wait ended: {:?}", self.name, outcome);
        outcome
    }
}

/// Sleep for `interval` unless `wake` fires first; `None` waits for `wake` alone
pub async fn wait_or_wake(interval: Option<Duration>, wake: &Notify) -> WaitOutcome {
    match interval {
        Some(interval) => tokio::select! {
            _ = tokio::time::sleep(interval) => WaitOutcome::Elapsed,
            _ = wake.notified() => WaitOutcome::Woken,
        },
        None => {
            wake.notified().await;
            WaitOutcome::Woken
        }
    }
}

/// Cloneable handle that wakes one worker
#[derive(Debug, Clone)]
pub struct WorkerWaker(Arc<Notify>);

impl WorkerWaker {
    pub fn wake(&self) {
        self.0.notify_one();
    }
}

/// A running background worker
///
/// Dropping the handle aborts the task.
pub struct Worker {
    name: String,
    wake: Arc<Notify>,
    phase: watch::Receiver<Phase>,
    task: JoinHandle<()>,
}

impl Worker {
    /// Spawn `run` on the current runtime
    pub fn spawn<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(WorkerContext) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let wake = Arc::new(Notify::new());
        let (phase_tx, phase) = watch::channel(Phase::Opening);

        let context = WorkerContext {
            name: name.clone(),
            wake: Arc::clone(&wake),
            phase: phase_tx,
        };
        let task = tokio::spawn(run(context));

        Self {
            name,
            wake,
            phase,
            task,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cut short a pending retry wait
    ///
    /// A wake sent while the worker is busy is kept and ends its next wait.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub fn waker(&self) -> WorkerWaker {
        WorkerWaker(Arc::clone(&self.wake))
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Receiver following phase changes
    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.phase.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Abort the task
    pub fn stop(&self) {
        debug!("Stopping worker {}", self.name);
        self.task.abort();
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("phase", &self.phase())
            .finish()
    }
}
