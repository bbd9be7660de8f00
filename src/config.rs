//! `funcbox.toml`: limits, image builds, workspaces, and language overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sandbox::Limits;

const CONFIG_FILE: &str = "funcbox.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Resource limits and timeout bounds
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Image build retries
    #[serde(default)]
    pub build: BuildConfig,
    /// Where workspaces are staged
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// Per-language overrides and additional languages, keyed by language id
    #[serde(default)]
    pub languages: BTreeMap<String, LanguageConfig>,
}

/// Resource ceilings and timeout bounds applied to every execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Memory limit (e.g., "128m", "1g", or bytes)
    #[serde(default = "default_memory")]
    pub memory: String,

    /// CPU limit in cores (e.g., "1", "0.5")
    #[serde(default = "default_cpus")]
    pub cpus: String,

    /// Maximum number of processes inside a sandbox
    #[serde(default = "default_pids")]
    pub pids: i64,

    /// Timeout used by callers that don't specify one
    #[serde(default = "default_timeout")]
    pub default_timeout_secs: u64,

    /// Requested timeouts above this are clamped
    #[serde(default = "default_max_timeout")]
    pub max_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            memory: default_memory(),
            cpus: default_cpus(),
            pids: default_pids(),
            default_timeout_secs: default_timeout(),
            max_timeout_secs: default_max_timeout(),
        }
    }
}

impl LimitsConfig {
    /// Parse the configured ceilings into sandbox limits
    pub fn to_limits(&self) -> Result<Limits> {
        let memory_bytes = parse_memory_limit(&self.memory)?;
        let cpus: f64 = self
            .cpus
            .parse()
            .with_context(|| format!("Invalid CPU limit: {}", self.cpus))?;
        if cpus <= 0.0 {
            anyhow::bail!("CPU limit must be positive: {}", self.cpus);
        }

        // Whole nanocores are the backend's unit
        #[allow(clippy::cast_possible_truncation)]
        let nano_cpus = (cpus * 1_000_000_000.0) as i64;

        Ok(Limits {
            memory_bytes,
            nano_cpus,
            pids: self.pids,
        })
    }

    /// Clamp a requested timeout into `1..=max_timeout_secs`
    pub fn clamp_timeout(&self, requested: u64) -> u64 {
        requested.clamp(1, self.max_timeout_secs.max(1))
    }
}

/// Image build retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Total build attempts per image
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Delay between attempts
    #[serde(default = "default_backoff")]
    pub backoff_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            backoff_secs: default_backoff(),
        }
    }
}

impl BuildConfig {
    /// Pause between failed build attempts.
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

/// Workspace staging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory workspaces are created under (default: system temp dir).
    /// Must be visible to the Docker daemon at the same path.
    #[serde(default)]
    pub root: Option<String>,
}

impl WorkspaceConfig {
    /// Resolved workspace root, with `~` expanded
    pub fn root_dir(&self) -> Result<Option<PathBuf>> {
        self.root
            .as_deref()
            .map(|root| expand_path(root).map(PathBuf::from))
            .transpose()
    }
}

/// Runtime definition for one language. Unset fields fall back to the
/// built-in runtime of the same name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Image tag (e.g., "funcbox-python:latest")
    #[serde(default)]
    pub image: Option<String>,

    /// Build context directory containing a Dockerfile
    #[serde(default)]
    pub context: Option<String>,

    /// Command run inside the sandbox, split like a shell would
    #[serde(default)]
    pub command: Option<String>,

    /// File name the submitted code is written to
    #[serde(default)]
    pub entry_file: Option<String>,
}

// Default value functions
fn default_memory() -> String {
    "128m".to_string()
}

fn default_cpus() -> String {
    "1".to_string()
}

fn default_pids() -> i64 {
    64
}

fn default_timeout() -> u64 {
    10
}

fn default_max_timeout() -> u64 {
    60
}

fn default_retries() -> u32 {
    3
}

fn default_backoff() -> u64 {
    2
}

impl Config {
    /// Load configuration from file, using defaults if not found
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Resolve the config file: explicit path, then `./funcbox.toml`, then
    /// the user config directory. Falls back to defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Self::load(path);
        }

        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        let local = cwd.join(CONFIG_FILE);
        if local.exists() {
            return Self::load(&local);
        }

        match dirs::config_dir() {
            Some(dir) => Self::load(&dir.join("funcbox").join(CONFIG_FILE)),
            None => Ok(Self::default()),
        }
    }
}

/// Expand ~ to home directory
pub fn expand_path(path: &str) -> Result<String> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(rest).display().to_string())
    } else {
        Ok(path.to_string())
    }
}

/// Parse memory limit string (e.g., "8g", "512m") to bytes
pub fn parse_memory_limit(limit: &str) -> Result<i64> {
    let limit = limit.trim().to_lowercase();

    let bytes = if let Some(num) = limit.strip_suffix('g') {
        let gigs: i64 = num.parse().context("Invalid memory limit")?;
        gigs * 1024 * 1024 * 1024
    } else if let Some(num) = limit.strip_suffix('m') {
        let megs: i64 = num.parse().context("Invalid memory limit")?;
        megs * 1024 * 1024
    } else if let Some(num) = limit.strip_suffix('k') {
        let kibs: i64 = num.parse().context("Invalid memory limit")?;
        kibs * 1024
    } else {
        limit.parse().context("Invalid memory limit")?
    };

    if bytes <= 0 {
        anyhow::bail!("Memory limit must be positive: {limit}");
    }
    Ok(bytes)
}
