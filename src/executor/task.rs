//! Execution task
//!
//! One (command, correlation value, callback) triple. [`ExecutionTask::run`]
//! is the entry point a scheduler invokes; it consumes the task, so each task
//! delivers at most one result, and it always delivers one.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::runner::CommandRunner;
use super::sink::{CallbackSink, ExecutionResult};
use super::state::{TaskState, TaskTimings};

/// A single command execution awaiting its scheduler
pub struct ExecutionTask {
    command: String,
    correlation_value: i32,
    callback: Arc<dyn CallbackSink>,
    runner: Arc<CommandRunner>,
    state: TaskState,
    timings: TaskTimings,
}

impl ExecutionTask {
    /// Build a task that runs `command` with the default runner
    pub fn new(
        command: impl Into<String>,
        correlation_value: i32,
        callback: Arc<dyn CallbackSink>,
    ) -> Self {
        Self::with_runner(
            command,
            correlation_value,
            callback,
            Arc::new(CommandRunner::default()),
        )
    }

    /// Build a task that runs `command` through `runner`
    pub fn with_runner(
        command: impl Into<String>,
        correlation_value: i32,
        callback: Arc<dyn CallbackSink>,
        runner: Arc<CommandRunner>,
    ) -> Self {
        Self {
            command: command.into(),
            correlation_value,
            callback,
            runner,
            state: TaskState::Created,
            timings: TaskTimings::new(),
        }
    }

    /// The command line as supplied
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The caller's correlation value
    pub fn correlation_value(&self) -> i32 {
        self.correlation_value
    }

    /// Current lifecycle state
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Execute the command and deliver its result
    ///
    /// The callback runs on the calling thread after the process has been
    /// reaped. Nothing is returned to the caller and no error escapes.
    pub fn run(mut self) {
        self.state = TaskState::Running;
        self.timings.started_at = Some(Instant::now());
        debug!(
            correlation = self.correlation_value,
            queue_ms = self.timings.queue_time_ms(),
            "Task started"
        );

        let output = self.runner.run(&self.command);

        let result = ExecutionResult {
            exit_status: output.exit_status(),
            spawn_failed: output.is_spawn_failure(),
            signal: output.signal(),
            output_text: output.output,
            correlation_value: self.correlation_value,
        };

        if result.spawn_failed {
            warn!(correlation = self.correlation_value, "Command could not be started");
        } else {
            info!(
                correlation = self.correlation_value,
                exit_status = result.exit_status,
                bytes = result.output_text.len(),
                "Command finished"
            );
        }

        self.callback.deliver(result);

        self.state = TaskState::Completed;
        self.timings.completed_at = Some(Instant::now());
        debug!(
            correlation = self.correlation_value,
            state = ?self.state,
            execution_ms = self.timings.execution_time_ms(),
            "Task completed"
        );
    }
}

impl std::fmt::Debug for ExecutionTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionTask")
            .field("command", &self.command)
            .field("correlation_value", &self.correlation_value)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
