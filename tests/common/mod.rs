//! Common test utilities and fixtures
//!
//! Shared configuration fixtures for CLI tests.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

/// A temporary directory holding one configuration file
pub struct ConfigFixture {
    _temp_dir: TempDir,
    config_path: PathBuf,
}

impl ConfigFixture {
    /// Create a fixture with `content` written to its config file
    pub fn with_content(content: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("cmdrelay.toml");
        fs::write(&config_path, content).expect("Failed to write config");
        Self {
            _temp_dir: temp_dir,
            config_path,
        }
    }

    /// Path of the config file as a string
    pub fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }
}

/// Get a command for the cmdrelay binary
pub fn relay_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("cmdrelay").unwrap();
    cmd.env_remove("CMDRELAY_CONFIG").env_remove("RUST_LOG");
    cmd
}
