//! Command runner
//!
//! Spawns one child process under the configured shell, drains its output
//! pipe to end-of-stream and reaps it. Failures never escape as errors: a
//! process that cannot be started is reported through [`RunStatus::SpawnFailed`]
//! so the caller decides how to present it.

use std::io::{ErrorKind, Read};
use std::process::{ExitStatus, Stdio};

use tracing::{debug, warn};

use super::platform::{self, Shell};

/// Default size of a single pipe read
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Largest accepted pipe read size (16 MiB)
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Exit status reported when no real status is available
pub const UNKNOWN_EXIT_STATUS: i32 = -1;

/// Offset added to a signal number when it is folded into an exit status
pub const SIGNAL_EXIT_BASE: i32 = 128;

// ─────────────────────────────────────────────────────────────────
// Run Output
// ─────────────────────────────────────────────────────────────────

/// How a spawned process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Normal exit with a status code
    Exited(i32),
    /// Killed by a signal (Unix)
    Signaled(i32),
    /// The process was reaped but its status could not be read
    Unknown,
}

/// Outcome of one runner invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The process ran and was reaped
    Completed(Termination),
    /// The process or its output pipe could not be created
    SpawnFailed,
}

/// Captured output plus status of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// Everything the process wrote to its output stream
    pub output: String,

    /// How the run ended
    pub status: RunStatus,
}

impl RunOutput {
    fn spawn_failed() -> Self {
        Self {
            output: String::new(),
            status: RunStatus::SpawnFailed,
        }
    }

    /// Whether the process could not be started
    pub fn is_spawn_failure(&self) -> bool {
        self.status == RunStatus::SpawnFailed
    }

    /// Numeric exit status; signals fold into `128 + signal`
    pub fn exit_status(&self) -> i32 {
        match self.status {
            RunStatus::Completed(Termination::Exited(code)) => code,
            RunStatus::Completed(Termination::Signaled(signal)) => SIGNAL_EXIT_BASE + signal,
            RunStatus::Completed(Termination::Unknown) | RunStatus::SpawnFailed => {
                UNKNOWN_EXIT_STATUS
            }
        }
    }

    /// Terminating signal, if the process was killed by one
    pub fn signal(&self) -> Option<i32> {
        match self.status {
            RunStatus::Completed(Termination::Signaled(signal)) => Some(signal),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Command Runner
// ─────────────────────────────────────────────────────────────────

/// Executes command lines synchronously on the calling thread
#[derive(Debug, Clone)]
pub struct CommandRunner {
    shell: Shell,
    chunk_size: usize,
}

impl CommandRunner {
    /// Create a runner for `shell` reading `chunk_size` bytes at a time
    pub fn new(shell: Shell, chunk_size: usize) -> Self {
        Self {
            shell,
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE),
        }
    }

    /// The shell commands are handed to
    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    /// Bytes requested per pipe read
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Run `command` to completion and capture its output
    ///
    /// Blocks until the child closes its output stream and has been reaped.
    pub fn run(&self, command: &str) -> RunOutput {
        let mut invocation = platform::shell_command(&self.shell, command);
        invocation
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = match invocation.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(shell = %self.shell.program, error = %e, "Failed to spawn process");
                return RunOutput::spawn_failed();
            }
        };

        let Some(mut stdout) = child.stdout.take() else {
            warn!(pid = child.id(), "Process output pipe unavailable");
            let _ = child.kill();
            let _ = child.wait();
            return RunOutput::spawn_failed();
        };

        debug!(pid = child.id(), "Process spawned");

        let bytes = drain(&mut stdout, self.chunk_size);
        drop(stdout);

        let termination = match child.wait() {
            Ok(status) => classify(&status),
            Err(e) => {
                warn!(pid = child.id(), error = %e, "Failed to wait for process");
                Termination::Unknown
            }
        };

        debug!(bytes = bytes.len(), termination = ?termination, "Process finished");

        RunOutput {
            output: String::from_utf8_lossy(&bytes).into_owned(),
            status: RunStatus::Completed(termination),
        }
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(Shell::platform_default(), DEFAULT_CHUNK_SIZE)
    }
}

/// Read `reader` to end-of-stream in `chunk_size` pieces
///
/// A read error ends the stream; bytes captured before it are kept.
fn drain<R: Read>(reader: &mut R, chunk_size: usize) -> Vec<u8> {
    let mut buffer = Vec::new();
    let mut chunk = vec![0u8; chunk_size];

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, bytes = buffer.len(), "Output read failed, keeping partial output");
                break;
            }
        }
    }

    buffer
}

fn classify(status: &ExitStatus) -> Termination {
    if let Some(code) = status.code() {
        Termination::Exited(code)
    } else if let Some(signal) = platform::termination_signal(status) {
        Termination::Signaled(signal)
    } else {
        Termination::Unknown
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
