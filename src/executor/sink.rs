//! Completion sinks
//!
//! A [`CallbackSink`] receives the single [`ExecutionResult`] of a task. The
//! same sink may be shared by many tasks and is called from whichever worker
//! thread finished the command, so implementations must be `Send + Sync`.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Value delivered to a sink once per task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Full captured output; empty when nothing was written
    pub output_text: String,

    /// Exit code of the process; meaningless when `spawn_failed` is set
    pub exit_status: i32,

    /// The process or its output stream could not be created
    pub spawn_failed: bool,

    /// Terminating signal, when the process was killed by one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,

    /// Caller value copied from the originating task
    pub correlation_value: i32,
}

impl ExecutionResult {
    /// Spawned and exited with status 0
    pub fn succeeded(&self) -> bool {
        !self.spawn_failed && self.exit_status == 0
    }
}

/// Receives task results
pub trait CallbackSink: Send + Sync {
    /// Called exactly once per task, on the thread that ran it
    fn deliver(&self, result: ExecutionResult);
}

impl<F> CallbackSink for F
where
    F: Fn(ExecutionResult) + Send + Sync,
{
    fn deliver(&self, result: ExecutionResult) {
        self(result)
    }
}

/// Forwards results into a bounded tokio channel
///
/// Delivery blocks while the channel is full, so it must only be used from
/// threads outside the async runtime (OS threads or the blocking pool).
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ExecutionResult>,
}

impl ChannelSink {
    /// Create a sink and the receiver its results arrive on
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ExecutionResult>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl CallbackSink for ChannelSink {
    fn deliver(&self, result: ExecutionResult) {
        let correlation = result.correlation_value;
        if let Err(e) = self.tx.blocking_send(result) {
            warn!(correlation, error = %e, "Result receiver dropped");
        }
    }
}
