//! Configuration types deserialized from `anvil.toml`.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// The top-level configuration.
///
/// Every section and field has a default, so an empty file (or no file at all)
/// yields a usable configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnvilConfig {
    /// Compile daemon policy and locations.
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// The compiler the client drives.
    #[serde(default)]
    pub compiler: CompilerConfig,
}

/// Compile daemon settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Whether to use a compile daemon at all. When off, every compile runs
    /// in-process.
    pub enabled: bool,
    /// Whether a failed connection or session open is retried once before
    /// falling back.
    pub retry_on_connection_error: bool,
    /// Executable started as the daemon (`<exe> daemon ...`). Defaults to the
    /// running executable.
    pub executable: Option<PathBuf>,
    /// Directory holding daemon port files.
    pub run_dir: Option<PathBuf>,
    /// Directory where client liveness markers are created.
    pub marker_dir: Option<PathBuf>,
    /// How long to wait for a freshly started daemon to publish its port.
    pub startup_timeout_ms: u64,
    /// How often to poll for the port file while waiting.
    pub poll_interval_ms: u64,
    /// How long a session may outlive its client's liveness marker before the
    /// daemon reclaims it.
    pub session_reclaim_timeout_secs: u64,
    /// How often the daemon checks liveness markers.
    pub reaper_interval_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retry_on_connection_error: true,
            executable: None,
            run_dir: None,
            marker_dir: None,
            startup_timeout_ms: 10_000,
            poll_interval_ms: 50,
            session_reclaim_timeout_secs: 60,
            reaper_interval_ms: 1_000,
        }
    }
}

impl DaemonConfig {
    /// The port-file directory, defaulting to `<tmp>/anvil-daemon`.
    pub fn run_dir(&self) -> PathBuf {
        self.run_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("anvil-daemon"))
    }

    /// The marker directory, defaulting to the system temp directory.
    pub fn marker_dir(&self) -> PathBuf {
        self.marker_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Startup timeout as a [`Duration`].
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Session reclaim timeout as a [`Duration`].
    pub fn session_reclaim_timeout(&self) -> Duration {
        Duration::from_secs(self.session_reclaim_timeout_secs)
    }

    /// Reaper interval as a [`Duration`].
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }
}

/// Settings for the compiler being driven.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Path to the compiler executable (also the artifact fingerprinted into the
    /// compiler identity).
    pub path: Option<PathBuf>,
    /// Compiler version string folded into the identity.
    pub version: Option<String>,
    /// Extra arguments appended to every compile, whitespace separated.
    pub additional_arguments: Option<String>,
}

impl CompilerConfig {
    /// The additional arguments, split on whitespace.
    pub fn additional_arguments(&self) -> Vec<String> {
        self.additional_arguments
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
