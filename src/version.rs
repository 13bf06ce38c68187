//! Version and build information
//!
//! Values are embedded by `build.rs` at compile time.

use std::fmt;

/// Build information embedded at compile time
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Package version from Cargo.toml
    pub version: &'static str,
    /// Package name
    pub name: &'static str,
    /// Git commit hash (short)
    pub git_hash: &'static str,
    git_dirty: &'static str,
    /// Build timestamp
    pub build_timestamp: &'static str,
    /// Target triple
    pub target: &'static str,
    /// Build profile (debug/release)
    pub profile: &'static str,
    /// Rustc version used to build
    pub rustc_version: &'static str,
}

impl BuildInfo {
    /// Get the current build information
    pub const fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            name: env!("CARGO_PKG_NAME"),
            git_hash: env!("CMDRELAY_GIT_HASH"),
            git_dirty: env!("CMDRELAY_GIT_DIRTY"),
            build_timestamp: env!("CMDRELAY_BUILD_TIMESTAMP"),
            target: env!("CMDRELAY_TARGET"),
            profile: env!("CMDRELAY_PROFILE"),
            rustc_version: env!("CMDRELAY_RUSTC_VERSION"),
        }
    }

    /// Whether the working tree had uncommitted changes at build time
    pub fn git_dirty(&self) -> bool {
        self.git_dirty == "true"
    }

    /// Version with git revision (e.g. "0.1.0-abc12345")
    pub fn full_version(&self) -> String {
        let dirty = if self.git_dirty() { "-dirty" } else { "" };
        format!("{}-{}{}", self.version, self.git_hash, dirty)
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.name, self.full_version())?;
        writeln!(f)?;
        writeln!(f, "Build Information:")?;
        writeln!(f, "  Git Hash:  {}", self.git_hash)?;
        writeln!(f, "  Built:     {}", self.build_timestamp)?;
        writeln!(f, "  Profile:   {}", self.profile)?;
        writeln!(f, "  Target:    {}", self.target)?;
        writeln!(f, "  Compiler:  {}", self.rustc_version)
    }
}

/// Get the current build info
pub fn build_info() -> BuildInfo {
    BuildInfo::current()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_info_exists() {
        let info = build_info();
        assert!(!info.version.is_empty());
        assert_eq!(info.name, "cmdrelay");
    }

    #[test]
    fn test_full_version_format() {
        let info = build_info();
        let full = info.full_version();
        assert!(full.starts_with(info.version));
        assert!(full.contains(info.git_hash));
    }

    #[test]
    fn test_display_format() {
        let display = build_info().to_string();
        assert!(display.contains("Build Information:"));
        assert!(display.contains("Git Hash:"));
        assert!(display.contains("Target:"));
    }
}
