//! Platform shell backends
//!
//! The only place that knows how each platform hands a command line to its
//! default interpreter. Everything above this module builds a
//! [`std::process::Command`] through [`shell_command`] and reads termination
//! details through [`termination_signal`].

use std::process::{Command, ExitStatus};

/// Program and leading arguments used to interpret a command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    /// Interpreter executable
    pub program: String,

    /// Arguments placed before the command line (e.g. `-c`)
    pub args: Vec<String>,
}

impl Shell {
    /// Create a shell from an explicit program and argument list
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The platform's default command interpreter
    pub fn platform_default() -> Self {
        let (program, args) = backend::DEFAULT_SHELL;
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::platform_default()
    }
}

/// Build the process invocation for `command_line` under `shell`
pub fn shell_command(shell: &Shell, command_line: &str) -> Command {
    let mut command = Command::new(&shell.program);
    command.args(&shell.args);
    backend::push_command_line(&mut command, command_line);
    command
}

/// Signal number that terminated the process, if any
pub fn termination_signal(status: &ExitStatus) -> Option<i32> {
    backend::signal(status)
}

#[cfg(unix)]
mod backend {
    use std::os::unix::process::ExitStatusExt;
    use std::process::{Command, ExitStatus};

    pub const DEFAULT_SHELL: (&str, &[&str]) = ("/bin/sh", &["-c"]);

    pub fn push_command_line(command: &mut Command, command_line: &str) {
        command.arg(command_line);
    }

    pub fn signal(status: &ExitStatus) -> Option<i32> {
        status.signal()
    }
}

#[cfg(windows)]
mod backend {
    use std::os::windows::process::CommandExt;
    use std::process::{Command, ExitStatus};

    pub const DEFAULT_SHELL: (&str, &[&str]) = ("cmd.exe", &["/C"]);

    // cmd.exe does its own parsing; quoting the line again would change it
    pub fn push_command_line(command: &mut Command, command_line: &str) {
        command.raw_arg(command_line);
    }

    pub fn signal(_status: &ExitStatus) -> Option<i32> {
        None
    }
}

#[cfg(not(any(unix, windows)))]
mod backend {
    use std::process::{Command, ExitStatus};

    pub const DEFAULT_SHELL: (&str, &[&str]) = ("sh", &["-c"]);

    pub fn push_command_line(command: &mut Command, command_line: &str) {
        command.arg(command_line);
    }

    pub fn signal(_status: &ExitStatus) -> Option<i32> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_default_has_program() {
        let shell = Shell::platform_default();
        assert!(!shell.program.is_empty());
        assert_eq!(shell.args.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_shell_command_args() {
        let shell = Shell::platform_default();
        let command = shell_command(&shell, "echo 'a b'");

        assert_eq!(command.get_program(), "/bin/sh");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args, vec!["-c", "echo 'a b'"]);
    }

    #[test]
    fn test_custom_shell() {
        let shell = Shell::new("bash", vec!["-e".to_string(), "-c".to_string()]);
        let command = shell_command(&shell, "true");
        assert_eq!(command.get_program(), "bash");
    }
}
