//! Build script for cmdrelay
//!
//! Embeds the git revision, build timestamp, target and toolchain into the
//! binary for `cmdrelay version`.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let git_hash = command_output("git", &["rev-parse", "--short=8", "HEAD"])
        .unwrap_or_else(|| "unknown".to_string());
    let git_dirty = command_output("git", &["status", "--porcelain"])
        .map(|status| (!status.is_empty()).to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let rustc_version = command_output(
        &env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string()),
        &["--version"],
    )
    .unwrap_or_else(|| "unknown".to_string());

    let build_timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

    emit("CMDRELAY_GIT_HASH", &git_hash);
    emit("CMDRELAY_GIT_DIRTY", &git_dirty);
    emit("CMDRELAY_BUILD_TIMESTAMP", &build_timestamp);
    emit("CMDRELAY_TARGET", &env_or_unknown("TARGET"));
    emit("CMDRELAY_PROFILE", &env_or_unknown("PROFILE"));
    emit("CMDRELAY_RUSTC_VERSION", &rustc_version);
}

fn emit(key: &str, value: &str) {
    println!("cargo:rustc-env={}={}", key, value);
}

fn env_or_unknown(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| "unknown".to_string())
}

/// Trimmed stdout of a successful command, if it ran
fn command_output(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}
