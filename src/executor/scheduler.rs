//! Background scheduling
//!
//! A [`Scheduler`] runs a job somewhere other than the submitting thread.
//! Jobs return nothing and the scheduler reports nothing back; results flow
//! through the task's callback instead.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{error, warn};

use crate::error::Error;

/// Name of the thread that runs jobs a runtime dropped unrun
const RESCUE_THREAD_NAME: &str = "cmdrelay-rescue";

/// Unit of background work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs off the caller's thread
pub trait Scheduler: Send + Sync {
    /// Hand `job` to a background context
    fn schedule(&self, job: Job);
}

// ─────────────────────────────────────────────────────────────────
// Scheduler Kinds
// ─────────────────────────────────────────────────────────────────

/// Scheduler selection from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerKind {
    /// One detached OS thread per task
    Thread,
    /// The tokio runtime's blocking pool
    #[default]
    Tokio,
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerKind::Thread => write!(f, "thread"),
            SchedulerKind::Tokio => write!(f, "tokio"),
        }
    }
}

impl FromStr for SchedulerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "thread" => Ok(SchedulerKind::Thread),
            "tokio" => Ok(SchedulerKind::Tokio),
            other => Err(Error::config_field_invalid(
                "executor.scheduler",
                format!("Unknown scheduler '{}'. Must be one of: thread, tokio", other),
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Thread Scheduler
// ─────────────────────────────────────────────────────────────────

/// Spawns a named, detached OS thread for every job
#[derive(Debug)]
pub struct ThreadScheduler {
    name_prefix: String,
    spawned: AtomicU64,
}

impl ThreadScheduler {
    /// Create a scheduler naming its threads `{prefix}-{n}`
    pub fn new(name_prefix: impl Into<String>) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            spawned: AtomicU64::new(0),
        }
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new("cmdrelay-exec")
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, job: Job) {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        if let Err(job) = spawn_named(format!("{}-{}", self.name_prefix, n), job) {
            error!("Failed to spawn worker thread, moving job to fallback");
            run_fallback(job);
        }
    }
}

/// Run `job` on a new named thread, handing it back if the OS refuses one
fn spawn_named(name: String, job: Job) -> Result<(), Job> {
    let slot = Arc::new(Mutex::new(Some(job)));
    let thread_slot = slot.clone();

    let spawned = std::thread::Builder::new().name(name).spawn(move || {
        let job = thread_slot.lock().take();
        if let Some(job) = job {
            job();
        }
    });

    match spawned {
        Ok(_) => Ok(()),
        Err(e) => {
            warn!(error = %e, "Thread spawn failed");
            let job = slot.lock().take();
            match job {
                Some(job) => Err(job),
                None => Ok(()),
            }
        }
    }
}

/// Last resort for a job no worker thread accepted
///
/// Inside a runtime the job goes to its blocking pool, so sinks that block
/// (such as [`ChannelSink`](super::sink::ChannelSink)) never run on an async
/// worker. Outside one it runs on the caller.
fn run_fallback(job: Job) {
    match Handle::try_current() {
        Ok(handle) => {
            let pending = PendingJob::new(job);
            drop(handle.spawn_blocking(move || pending.run()));
        }
        Err(_) => {
            warn!("No runtime available, running job on the caller");
            job();
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tokio Scheduler
// ─────────────────────────────────────────────────────────────────

/// Runs jobs on a tokio runtime's blocking pool
///
/// A job the runtime drops unrun, because it shut down before reaching it,
/// is moved to a plain OS thread instead.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Schedule onto the runtime behind `handle`
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Schedule onto the runtime the caller is running in
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, job: Job) {
        let pending = PendingJob::new(job);
        // Detached; the callback carries the result
        drop(self.handle.spawn_blocking(move || pending.run()));
    }
}

/// Holds a job until a worker runs it
///
/// Dropping it unrun hands the job to a dedicated thread.
struct PendingJob(Option<Job>);

impl PendingJob {
    fn new(job: Job) -> Self {
        Self(Some(job))
    }

    fn run(mut self) {
        if let Some(job) = self.0.take() {
            job();
        }
    }
}

impl Drop for PendingJob {
    fn drop(&mut self) {
        let Some(job) = self.0.take() else {
            return;
        };

        warn!("Runtime dropped a job before it started, moving it to a new thread");
        if let Err(job) = spawn_named(RESCUE_THREAD_NAME.to_string(), job) {
            error!("Failed to spawn rescue thread, running job on the dropping thread");
            job();
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::sink::{CallbackSink, ChannelSink, ExecutionResult};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_scheduler_kind_parse() {
        assert_eq!("thread".parse::<SchedulerKind>().unwrap(), SchedulerKind::Thread);
        assert_eq!("TOKIO".parse::<SchedulerKind>().unwrap(), SchedulerKind::Tokio);
        assert!("fibers".parse::<SchedulerKind>().is_err());
        assert_eq!(SchedulerKind::Thread.to_string(), "thread");
    }

    #[test]
    fn test_thread_scheduler_runs_off_caller() {
        let scheduler = ThreadScheduler::new("test-exec");
        let caller = std::thread::current().id();
        let (tx, rx) = mpsc::channel();

        scheduler.schedule(Box::new(move || {
            let current = std::thread::current();
            tx.send((current.id(), current.name().map(str::to_string)))
                .unwrap();
        }));

        let (id, name) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(id, caller);
        assert_eq!(name.as_deref(), Some("test-exec-0"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_scheduler_runs_job() {
        let scheduler = TokioScheduler::current();
        let (tx, rx) = tokio::sync::oneshot::channel();

        scheduler.schedule(Box::new(move || {
            let _ = tx.send(7);
        }));

        assert_eq!(rx.await.unwrap(), 7);
    }

    #[test]
    fn test_tokio_scheduler_after_runtime_shutdown() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let scheduler = TokioScheduler::new(runtime.handle().clone());
        drop(runtime);

        let (tx, rx) = mpsc::channel();
        scheduler.schedule(Box::new(move || {
            let name = std::thread::current().name().map(str::to_string);
            tx.send(name).unwrap();
        }));

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some(RESCUE_THREAD_NAME));
        // Exactly once
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_pending_job_runs_once() {
        let (tx, rx) = mpsc::channel();
        let pending = PendingJob::new(Box::new(move || tx.send(()).unwrap()));

        pending.run();

        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_fallback_inside_runtime_uses_blocking_pool() {
        let (sink, mut results) = ChannelSink::new(1);
        let caller = std::thread::current().id();
        let (tx, rx) = mpsc::channel();

        // Blocking delivery would panic if it ran on this async worker
        run_fallback(Box::new(move || {
            tx.send(std::thread::current().id()).unwrap();
            sink.deliver(ExecutionResult {
                output_text: String::new(),
                exit_status: 0,
                spawn_failed: false,
                signal: None,
                correlation_value: 11,
            });
        }));

        let result = results.recv().await.unwrap();
        assert_eq!(result.correlation_value, 11);
        assert_ne!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), caller);
    }

    #[test]
    fn test_fallback_outside_runtime_runs_on_caller() {
        let caller = std::thread::current().id();
        let (tx, rx) = mpsc::channel();

        run_fallback(Box::new(move || tx.send(std::thread::current().id()).unwrap()));

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), caller);
    }
}
