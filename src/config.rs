//! Configuration system for cmdrelay
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (CMDRELAY_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::executor::{DispatcherConfig, SchedulerKind, Shell, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Shell used to interpret command lines
    pub shell: ShellSettings,

    /// Execution settings
    pub executor: ExecutorSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Shell settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellSettings {
    /// Interpreter program (platform default when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,

    /// Arguments placed before the command line (platform default when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
}

/// Execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Scheduler: "thread" (one OS thread per command) or "tokio" (blocking pool)
    pub scheduler: String,

    /// Maximum blocking threads for the tokio scheduler (0 = number of CPUs)
    pub max_threads: u32,

    /// Bytes requested per output read
    pub read_chunk_size: usize,

    /// Capacity of the result channel
    pub queue_size: usize,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::default().to_string(),
            max_threads: 0, // Auto-detect
            read_chunk_size: DEFAULT_CHUNK_SIZE,
            queue_size: 64,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl RelayConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = toml::from_str(&content).map_err(|e| Error::ConfigParse {
                path: path.clone(),
                source: e,
            })?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            PathBuf::from("cmdrelay.toml"),
            dirs::config_dir()
                .map(|p| p.join("cmdrelay").join("config.toml"))
                .unwrap_or_default(),
            dirs::home_dir()
                .map(|p| p.join(".cmdrelay").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/cmdrelay/config.toml"),
        ];

        for path in &search_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Shell settings
        if let Ok(val) = std::env::var("CMDRELAY_SHELL") {
            self.shell.program = Some(val);
        }
        if let Ok(val) = std::env::var("CMDRELAY_SHELL_ARGS") {
            self.shell.args = Some(val.split_whitespace().map(str::to_string).collect());
        }

        // Executor settings
        if let Ok(val) = std::env::var("CMDRELAY_SCHEDULER") {
            self.executor.scheduler = val;
        }
        if let Ok(val) = std::env::var("CMDRELAY_MAX_THREADS") {
            if let Ok(n) = val.parse() {
                self.executor.max_threads = n;
            }
        }
        if let Ok(val) = std::env::var("CMDRELAY_READ_CHUNK_SIZE") {
            if let Ok(n) = val.parse() {
                self.executor.read_chunk_size = n;
            }
        }
        if let Ok(val) = std::env::var("CMDRELAY_QUEUE_SIZE") {
            if let Ok(n) = val.parse() {
                self.executor.queue_size = n;
            }
        }

        // Logging settings
        if let Ok(val) = std::env::var("CMDRELAY_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("CMDRELAY_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("CMDRELAY_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
        if let Some(ref program) = self.shell.program {
            self.shell.program = Some(expand_path(program));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(ref program) = self.shell.program {
            if program.trim().is_empty() {
                return Err(Error::config_field_invalid(
                    "shell.program",
                    "Shell program cannot be empty",
                ));
            }
        }

        self.executor.scheduler.parse::<SchedulerKind>()?;

        if self.executor.read_chunk_size == 0 {
            return Err(Error::config_field_invalid(
                "executor.read_chunk_size",
                "read_chunk_size must be greater than 0",
            ));
        }

        if self.executor.read_chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::config_field_invalid(
                "executor.read_chunk_size",
                format!(
                    "read_chunk_size must be at most {} bytes",
                    MAX_CHUNK_SIZE
                ),
            ));
        }

        if self.executor.queue_size == 0 {
            return Err(Error::config_field_invalid(
                "executor.queue_size",
                "queue_size must be greater than 0",
            ));
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Shell to run commands under, falling back to the platform default
    pub fn shell(&self) -> Shell {
        let default = Shell::platform_default();
        Shell::new(
            self.shell.program.clone().unwrap_or(default.program),
            self.shell.args.clone().unwrap_or(default.args),
        )
    }

    /// Parsed scheduler selection
    pub fn scheduler(&self) -> SchedulerKind {
        self.executor.scheduler.parse().unwrap_or_default()
    }

    /// Blocking threads for the tokio scheduler
    pub fn worker_threads(&self) -> usize {
        if self.executor.max_threads > 0 {
            self.executor.max_threads as usize
        } else {
            num_cpus::get()
        }
    }

    /// Settings for the dispatcher
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            shell: self.shell(),
            read_chunk_size: self.executor.read_chunk_size,
            scheduler: self.scheduler(),
        }
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or(std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Default location for a new configuration file
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cmdrelay")
        .join("config.toml")
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(default_config_path);

    if config_path.exists() && !force {
        return Err(Error::ConfigExists { path: config_path });
    }

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    format!(
        r#"# cmdrelay configuration

[shell]
# Interpreter for command lines (defaults to /bin/sh on Unix, cmd.exe on Windows)
# program = "/bin/bash"

# Arguments placed before the command line (defaults to ["-c"] / ["/C"])
# args = ["-c"]

[executor]
# Scheduler: "thread" (one OS thread per command) or "tokio" (blocking pool)
scheduler = "tokio"

# Maximum blocking threads for the tokio scheduler (0 = number of CPUs)
max_threads = 0

# Bytes requested per output read
read_chunk_size = {chunk}

# Capacity of the result channel
queue_size = 64

[logging]
# Log level: trace, debug, info, warn, error
level = "warn"

# Log file path (comment out to disable file logging)
# file = "~/.cmdrelay/logs/cmdrelay.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#,
        chunk = DEFAULT_CHUNK_SIZE
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.executor.scheduler, "tokio");
        assert_eq!(config.executor.read_chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.logging.level, "warn");
        assert!(config.shell.program.is_none());
    }

    #[test]
    fn test_env_override() {
        env::set_var("CMDRELAY_SCHEDULER", "thread");
        env::set_var("CMDRELAY_READ_CHUNK_SIZE", "512");
        env::set_var("CMDRELAY_SHELL_ARGS", "-e -c");

        let mut config = RelayConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.scheduler(), SchedulerKind::Thread);
        assert_eq!(config.executor.read_chunk_size, 512);
        assert_eq!(
            config.shell.args,
            Some(vec!["-e".to_string(), "-c".to_string()])
        );

        env::remove_var("CMDRELAY_SCHEDULER");
        env::remove_var("CMDRELAY_READ_CHUNK_SIZE");
        env::remove_var("CMDRELAY_SHELL_ARGS");
    }

    #[test]
    fn test_validation_zero_chunk_size() {
        let mut config = RelayConfig::default();
        config.executor.read_chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_oversized_chunk_size() {
        let mut config = RelayConfig::default();
        config.executor.read_chunk_size = MAX_CHUNK_SIZE;
        assert!(config.validate().is_ok());

        config.executor.read_chunk_size = usize::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at most"));
    }

    #[test]
    fn test_validation_zero_queue_size() {
        let mut config = RelayConfig::default();
        config.executor.queue_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_unknown_scheduler() {
        let mut config = RelayConfig::default();
        config.executor.scheduler = "fibers".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_empty_shell() {
        let mut config = RelayConfig::default();
        config.shell.program = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = RelayConfig::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(RelayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_shell_fallback() {
        let mut config = RelayConfig::default();
        assert_eq!(config.shell(), Shell::platform_default());

        config.shell.program = Some("bash".to_string());
        let shell = config.shell();
        assert_eq!(shell.program, "bash");
        assert_eq!(shell.args, Shell::platform_default().args);
    }

    #[test]
    fn test_worker_threads() {
        let mut config = RelayConfig::default();
        assert!(config.worker_threads() >= 1);
        config.executor.max_threads = 3;
        assert_eq!(config.worker_threads(), 3);
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = RelayConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: RelayConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.executor.scheduler, parsed.executor.scheduler);
        assert_eq!(config.executor.read_chunk_size, parsed.executor.read_chunk_size);
    }

    #[test]
    fn test_generated_default_parses() {
        let config: RelayConfig = toml::from_str(&generate_default_config()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.executor.queue_size, 64);
    }

    #[test]
    fn test_parse_config_file() {
        let config_str = r#"
[shell]
program = "/bin/bash"
args = ["-o", "pipefail", "-c"]

[executor]
scheduler = "thread"
read_chunk_size = 128

[logging]
level = "debug"
"#;

        let config: RelayConfig = toml::from_str(config_str).unwrap();

        assert_eq!(config.shell.program.as_deref(), Some("/bin/bash"));
        assert_eq!(config.shell().args, vec!["-o", "pipefail", "-c"]);
        assert_eq!(config.scheduler(), SchedulerKind::Thread);
        assert_eq!(config.executor.read_chunk_size, 128);
        assert_eq!(config.executor.queue_size, 64);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let err = RelayConfig::load(Some("/nonexistent/cmdrelay.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.toml");
        fs::write(&path, "[executor]\nmax_threads = 2\nqueue_size = 9\n").unwrap();

        let config = RelayConfig::load(path.to_str()).unwrap();
        assert_eq!(config.executor.max_threads, 2);
        assert_eq!(config.executor.queue_size, 9);
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.toml");
        fs::write(&path, "[executor\nbroken").unwrap();

        let err = RelayConfig::load(path.to_str()).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_init_config_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let path_str = path.to_str().unwrap();

        assert_eq!(init_config(Some(path_str), false).unwrap(), path);
        assert!(matches!(
            init_config(Some(path_str), false),
            Err(Error::ConfigExists { .. })
        ));
        assert!(init_config(Some(path_str), true).is_ok());
    }
}
