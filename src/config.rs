//! Configuration loading.
//!
//! Loaded from TOML (`--config`, `$STRAYLIGHT_CONFIG_PATH`, or
//! `./config.toml`). Environment variables override file values; file
//! values override defaults. A missing file is not an error; defaults
//! apply.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use tracing::warn;

use crate::types::AutonomyLevel;

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent identity and loop bounds.
    pub agent: AgentSection,
    /// LLM endpoint settings.
    pub llm: LlmSection,
    /// Scheduler poller settings.
    pub scheduler: SchedulerSection,
    /// Journal capacity.
    pub journal: JournalSection,
    /// Filesystem locations.
    pub paths: PathsSection,
    /// Built-in tool settings.
    pub tools: ToolsSection,
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when an existing config file cannot be read or
    /// parsed. A missing file falls back to defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = match explicit_path {
            Some(p) => p.to_path_buf(),
            None => std::env::var("STRAYLIGHT_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config.toml")),
        };

        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                toml::from_str(&contents).context("failed to parse config TOML")?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Config::default()
            }
            Err(e) => return Err(anyhow::anyhow!("failed to read config file: {e}")),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML string into config (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error on invalid TOML.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function for testability.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("STRAYLIGHT_API_KEY") {
            self.llm.api_key = v;
        }
        if let Some(v) = env("STRAYLIGHT_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = env("STRAYLIGHT_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = env("STRAYLIGHT_DATA_DIR") {
            self.paths.data_dir = Some(v);
        }
        if let Some(v) = env("STRAYLIGHT_LOGS_DIR") {
            self.paths.logs_dir = Some(v);
        }
        if let Some(v) = env("STRAYLIGHT_AUTONOMY_LEVEL") {
            match v.parse::<u8>().ok().and_then(AutonomyLevel::from_repr) {
                Some(level) => self.agent.autonomy_level = level as u8,
                None => warn!(
                    var = "STRAYLIGHT_AUTONOMY_LEVEL",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("STRAYLIGHT_MAX_ITERATIONS") {
            match v.parse::<u32>() {
                Ok(n) if n > 0 => self.agent.max_iterations = n,
                _ => warn!(
                    var = "STRAYLIGHT_MAX_ITERATIONS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Agent identity and loop bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Display name used in prompts and the console.
    pub name: String,
    /// Persona text for the system prompt.
    pub persona: String,
    /// Bound on reasoning iterations per turn.
    pub max_iterations: u32,
    /// Starting autonomy level (0 = paranoid .. 3 = autonomous).
    pub autonomy_level: u8,
}

impl AgentSection {
    /// The starting autonomy level as an enum.
    pub fn autonomy(&self) -> AutonomyLevel {
        AutonomyLevel::from_repr(self.autonomy_level).unwrap_or(AutonomyLevel::Careful)
    }
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: "Straylight".to_owned(),
            persona: "A capable, concise personal assistant. You can run tools, \
                      schedule tasks for later, and check on your own recent actions."
                .to_owned(),
            max_iterations: 25,
            autonomy_level: AutonomyLevel::Careful as u8,
        }
    }
}

/// LLM endpoint settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// API root including the version prefix.
    pub base_url: String,
    /// Bearer token; may be empty for local servers.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_owned(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_owned(),
            timeout_secs: 120,
        }
    }
}

/// Scheduler poller settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Poll interval in seconds.
    pub tick_seconds: u64,
    /// Maximum executions per tick.
    pub batch_size: usize,
    /// Rolling-minute execution cap shared across all tasks.
    pub max_exec_per_minute: usize,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            tick_seconds: 2,
            batch_size: 10,
            max_exec_per_minute: 30,
        }
    }
}

/// Journal capacity.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JournalSection {
    /// Ring buffer capacity.
    pub capacity: usize,
}

impl Default for JournalSection {
    fn default() -> Self {
        Self { capacity: 200 }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    /// Directory for the database; defaults to the platform data dir.
    pub data_dir: Option<String>,
    /// Directory for log files; defaults to `<data_dir>/logs`.
    pub logs_dir: Option<String>,
}

impl PathsSection {
    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return PathBuf::from(dir);
        }
        ProjectDirs::from("", "", "straylight")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    /// Resolved logs directory.
    pub fn logs_dir(&self) -> PathBuf {
        if let Some(dir) = &self.logs_dir {
            return PathBuf::from(dir);
        }
        self.data_dir().join("logs")
    }

    /// Path of the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("straylight.db")
    }
}

/// Built-in tool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// Register the `shell` tool.
    pub enable_shell: bool,
    /// Register the `web_fetch` tool.
    pub enable_web_fetch: bool,
    /// Shell command timeout in seconds.
    pub shell_timeout_secs: u64,
    /// Default working directory for shell commands.
    pub shell_working_directory: Option<String>,
    /// User agent for web fetches.
    pub web_fetch_user_agent: String,
    /// Web fetch timeout in seconds.
    pub web_fetch_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            enable_shell: true,
            enable_web_fetch: true,
            shell_timeout_secs: 60,
            shell_working_directory: None,
            web_fetch_user_agent: "straylight/0.1".to_owned(),
            web_fetch_timeout_secs: 30,
        }
    }
}
