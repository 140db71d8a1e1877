//! Tracker configuration with sensible defaults.
//!
//! [`TrackerConfig`] carries every path and tunable the engine needs, so the
//! whole pipeline can be pointed at a temporary directory in tests instead
//! of the real `~/.claude` tree.

use std::path::{Path, PathBuf};

/// Filename of the persisted limit-event history under the Claude dir.
pub const LIMITS_FILE: &str = "token_limits.json";

/// Filename of the status document under the Claude dir.
pub const STATUS_FILE: &str = "token_status.json";

/// Subdirectory of the Claude dir holding per-project transcript trees.
pub const PROJECTS_DIR: &str = "projects";

/// Configuration for a tracker run.
///
/// All state lives in files under `claude_dir`; there are no process-wide
/// globals. Construct with [`Default`] for the real `~/.claude` layout, or
/// point `claude_dir` elsewhere for tests.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Root of the Claude Code home directory. Default: `~/.claude`.
    pub claude_dir: PathBuf,
    /// Weight applied to cache-read tokens in the derived total.
    ///
    /// Cache reads cost roughly a tenth of a fresh token toward the
    /// provider's rate-limit accounting; this is an approximation, not a
    /// published constant, so it stays tunable. Default: `0.1`.
    pub cache_read_weight: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            claude_dir: home.join(".claude"),
            cache_read_weight: 0.1,
        }
    }
}

impl TrackerConfig {
    /// Create a config rooted at the given Claude directory.
    pub fn new(claude_dir: impl Into<PathBuf>) -> Self {
        Self {
            claude_dir: claude_dir.into(),
            ..Self::default()
        }
    }

    /// Override the cache-read weight.
    pub fn with_cache_read_weight(mut self, weight: f64) -> Self {
        self.cache_read_weight = weight;
        self
    }

    /// Root of the Claude dir.
    pub fn claude_dir(&self) -> &Path {
        &self.claude_dir
    }

    /// Usage-log root scanned for `*.jsonl` transcripts.
    pub fn projects_dir(&self) -> PathBuf {
        self.claude_dir.join(PROJECTS_DIR)
    }

    /// Path of the limit-event history document.
    pub fn limits_path(&self) -> PathBuf {
        self.claude_dir.join(LIMITS_FILE)
    }

    /// Path of the status document.
    pub fn status_path(&self) -> PathBuf {
        self.claude_dir.join(STATUS_FILE)
    }

    /// Path of the Claude Code settings document (hook registration).
    pub fn settings_path(&self) -> PathBuf {
        self.claude_dir.join("settings.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_hang_off_claude_dir() {
        let cfg = TrackerConfig::new("/tmp/claude-test");
        assert_eq!(cfg.projects_dir(), Path::new("/tmp/claude-test/projects"));
        assert_eq!(
            cfg.limits_path(),
            Path::new("/tmp/claude-test/token_limits.json")
        );
        assert_eq!(
            cfg.status_path(),
            Path::new("/tmp/claude-test/token_status.json")
        );
    }

    #[test]
    fn default_weight_is_one_tenth() {
        let cfg = TrackerConfig::new("/tmp/x");
        assert!((cfg.cache_read_weight - 0.1).abs() < f64::EPSILON);
        let cfg = cfg.with_cache_read_weight(0.25);
        assert!((cfg.cache_read_weight - 0.25).abs() < f64::EPSILON);
    }
}
