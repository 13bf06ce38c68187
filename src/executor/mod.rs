//! Command executor module
//!
//! Handles the command execution lifecycle:
//! - Spawning commands under the platform shell
//! - Capturing their output and exit status
//! - Scheduling tasks on background workers
//! - Delivering each result to its callback exactly once

mod dispatcher;
pub mod platform;
mod runner;
mod scheduler;
mod sink;
mod state;
mod task;

pub use dispatcher::*;
pub use platform::Shell;
pub use runner::*;
pub use scheduler::*;
pub use sink::*;
pub use state::*;
pub use task::*;
