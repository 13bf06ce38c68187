//! cmdrelay - background shell command execution
//!
//! An [`ExecutionTask`] runs one command line under the platform shell on a
//! background worker, captures its output and exit status, and hands the
//! [`ExecutionResult`] to a [`CallbackSink`] exactly once. The caller's
//! correlation value travels with the result unchanged.
//!
//! ```no_run
//! use std::sync::Arc;
//! use cmdrelay::{Dispatcher, DispatcherConfig, ExecutionResult, ThreadScheduler};
//!
//! let dispatcher = Dispatcher::new(&DispatcherConfig::default(), Arc::new(ThreadScheduler::default()));
//! dispatcher.dispatch("echo hello", 42, Arc::new(|result: ExecutionResult| {
//!     println!("{}: {}", result.correlation_value, result.output_text);
//! }));
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod version;

pub use error::{Error, Result};
pub use executor::{
    CallbackSink, ChannelSink, CommandRunner, Dispatcher, DispatcherConfig, ExecutionResult,
    ExecutionTask, Scheduler, SchedulerKind, Shell, ThreadScheduler, TokioScheduler,
};
