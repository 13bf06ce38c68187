//! Task dispatch
//!
//! Builds execution tasks for incoming commands and hands them to a
//! scheduler, counting them on the way through.

use std::sync::Arc;

use tracing::{debug, info};

use super::platform::Shell;
use super::runner::{CommandRunner, DEFAULT_CHUNK_SIZE};
use super::scheduler::{Scheduler, SchedulerKind};
use super::sink::{CallbackSink, ExecutionResult};
use super::state::{DispatchStats, DispatchTracker};
use super::task::ExecutionTask;

// ─────────────────────────────────────────────────────────────────
// Dispatcher Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Shell commands are run under
    pub shell: Shell,

    /// Bytes requested per output read
    pub read_chunk_size: usize,

    /// Scheduler tasks are handed to
    pub scheduler: SchedulerKind,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            shell: Shell::platform_default(),
            read_chunk_size: DEFAULT_CHUNK_SIZE,
            scheduler: SchedulerKind::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────────────────────────

/// Launches commands on background workers
pub struct Dispatcher {
    runner: Arc<CommandRunner>,
    scheduler: Arc<dyn Scheduler>,
    tracker: Arc<DispatchTracker>,
}

impl Dispatcher {
    /// Create a dispatcher that schedules through `scheduler`
    pub fn new(config: &DispatcherConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            runner: Arc::new(CommandRunner::new(
                config.shell.clone(),
                config.read_chunk_size,
            )),
            scheduler,
            tracker: Arc::new(DispatchTracker::new()),
        }
    }

    /// Run `command` in the background and deliver its result to `callback`
    ///
    /// Returns as soon as the task is scheduled. The callback fires exactly
    /// once, on the worker that ran the command.
    pub fn dispatch(
        &self,
        command: impl Into<String>,
        correlation_value: i32,
        callback: Arc<dyn CallbackSink>,
    ) {
        let command = command.into();
        let tracked = Arc::new(TrackedSink {
            inner: callback,
            tracker: self.tracker.clone(),
        });

        info!(correlation = correlation_value, command = %command, "Dispatching command");

        let task = ExecutionTask::with_runner(command, correlation_value, tracked, self.runner.clone());
        self.tracker.mark_dispatched();
        self.scheduler.schedule(Box::new(move || task.run()));
    }

    /// Current dispatch counters
    pub fn stats(&self) -> DispatchStats {
        self.tracker.stats()
    }

    /// The runner shared by every dispatched task
    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }
}

/// Counts a result once the caller's sink has returned
struct TrackedSink {
    inner: Arc<dyn CallbackSink>,
    tracker: Arc<DispatchTracker>,
}

impl CallbackSink for TrackedSink {
    fn deliver(&self, result: ExecutionResult) {
        let spawn_failed = result.spawn_failed;
        let exit_status = result.exit_status;
        let correlation = result.correlation_value;

        self.inner.deliver(result);
        self.tracker.mark_completed(spawn_failed, exit_status);
        debug!(correlation, "Result delivered");
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::scheduler::{ThreadScheduler, TokioScheduler};
    use crate::executor::sink::ChannelSink;

    use std::collections::HashSet;
    use std::sync::mpsc;
    use std::time::Duration;

    fn thread_dispatcher() -> Dispatcher {
        Dispatcher::new(
            &DispatcherConfig {
                scheduler: SchedulerKind::Thread,
                ..Default::default()
            },
            Arc::new(ThreadScheduler::default()),
        )
    }

    #[test]
    fn test_dispatcher_config_default() {
        let config = DispatcherConfig::default();
        assert_eq!(config.read_chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.scheduler, SchedulerKind::Tokio);
    }

    #[test]
    fn test_dispatch_many_exactly_once() {
        let dispatcher = thread_dispatcher();
        let (tx, rx) = mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        let sink: Arc<dyn CallbackSink> = Arc::new(move |result: ExecutionResult| {
            tx.lock().send(result.correlation_value).unwrap();
        });

        let expected: HashSet<i32> = (-10..30).collect();
        for value in &expected {
            dispatcher.dispatch("echo relay", *value, sink.clone());
        }

        let mut seen = Vec::new();
        for _ in 0..expected.len() {
            seen.push(rx.recv_timeout(Duration::from_secs(30)).unwrap());
        }
        // No extra deliveries
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        let unique: HashSet<i32> = seen.iter().copied().collect();
        assert_eq!(seen.len(), expected.len());
        assert_eq!(unique, expected);

        let stats = dispatcher.stats();
        assert_eq!(stats.dispatched, expected.len() as u64);
    }

    #[test]
    fn test_spawn_failure_counted() {
        let dispatcher = Dispatcher::new(
            &DispatcherConfig {
                shell: Shell::new("/nonexistent/cmdrelay-shell", vec![]),
                ..Default::default()
            },
            Arc::new(ThreadScheduler::default()),
        );
        let (tx, rx) = mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        dispatcher.dispatch(
            "echo hi",
            3,
            Arc::new(move |result: ExecutionResult| {
                tx.lock().send(result).unwrap();
            }),
        );

        let result = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(result.spawn_failed);
        assert_eq!(result.correlation_value, 3);

        // The counter is bumped right after the sink returns
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while dispatcher.stats().completed < 1 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(dispatcher.stats().spawn_failures, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_dispatch_onto_shut_down_runtime_still_delivers() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let dispatcher = Dispatcher::new(
            &DispatcherConfig::default(),
            Arc::new(TokioScheduler::new(runtime.handle().clone())),
        );
        drop(runtime);

        let (tx, rx) = mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        dispatcher.dispatch(
            "echo hi",
            1,
            Arc::new(move |result: ExecutionResult| {
                tx.lock().send(result).unwrap();
            }),
        );

        let result = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(result.correlation_value, 1);
        assert_eq!(result.output_text, "hi\n");
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while dispatcher.stats().in_flight() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(dispatcher.stats().completed, 1);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_dispatch_with_channel_sink() {
        let dispatcher = Dispatcher::new(
            &DispatcherConfig::default(),
            Arc::new(TokioScheduler::current()),
        );
        let (sink, mut rx) = ChannelSink::new(8);
        let sink: Arc<dyn CallbackSink> = Arc::new(sink);

        dispatcher.dispatch("echo hello", 42, sink.clone());
        dispatcher.dispatch("exit 7", 1, sink);

        let mut results = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        results.sort_by_key(|r| r.correlation_value);

        assert_eq!(results[0].correlation_value, 1);
        assert_eq!(results[0].exit_status, 7);
        assert_eq!(results[0].output_text, "");
        assert_eq!(results[1].correlation_value, 42);
        assert_eq!(results[1].output_text, "hello\n");
        assert!(!results[1].spawn_failed);
    }
}
