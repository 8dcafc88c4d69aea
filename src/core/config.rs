//! Configuration management for webpilot
//!
//! Supports environment variables, config files, and runtime overrides.
//! Priority: CLI args > env vars > config file > defaults.
//!
//! Config file location: ~/.config/webpilot/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::error::{PilotError, Result};

/// Main configuration for webpilot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Reasoning service endpoint and model
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    /// Browser collaborator settings
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Loop budgets and memory sizing
    #[serde(default)]
    pub agent: AgentConfig,
    /// Per-suspension-point deadlines
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Run artifacts and diagnostics
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ollama-compatible reasoning service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// Host address (default: localhost)
    pub host: String,
    /// Port number (default: 11434)
    pub port: u16,
    /// Model that plans the next action
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
}

/// Browser automation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Session name for agent-browser
    pub session_name: String,
    /// Whether to run in headed mode (visible browser)
    pub headed: bool,
    /// Settle period used by the wait-and-recheck rung, in ms
    pub settle_ms: u64,
    /// Page scroll distance for the scroll rung when no element is resolved, in px
    pub scroll_step: i64,
    /// Persistent browser profile directory
    pub profile_dir: Option<PathBuf>,
    /// Page opened before the first observation
    pub start_url: Option<String>,
}

/// Agent loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Step budget; the run fails once this many steps are recorded
    /// Default: 50
    pub max_steps: usize,
    /// Optional wall-clock budget in seconds
    pub max_run_secs: Option<u64>,
    /// Steps kept verbatim in the reasoning context
    /// Default: 10
    pub memory_window: usize,
    /// Distinct past attempts the summary remembers
    /// Default: 12
    pub summary_detail: usize,
    /// Upper bound for the visible-text summary of an observation
    /// Default: 2000
    pub max_observation_chars: usize,
    /// Candidates requested per element query
    /// Default: 12
    pub query_limit: usize,
    /// Consecutive reasoning-service failures absorbed as replans
    /// Default: 1
    pub reasoning_retries: usize,
    /// Whether to show debug output
    pub debug: bool,
}

/// Deadlines for the three suspension points
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub reasoning_secs: u64,
    pub action_secs: u64,
    pub confirmation_secs: u64,
}

/// Run artifact configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Parent directory for per-run artifact directories
    pub runs_dir: PathBuf,
    /// Default tracing filter when RUST_LOG is unset
    pub filter: String,
    /// Whether to capture a screenshot per observation
    pub screenshots: bool,
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name).ok().map(|v| v == "true" || v == "1")
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            host: env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env_parse("OLLAMA_PORT").unwrap_or(11434),
            model: env::var("WEBPILOT_MODEL").unwrap_or_else(|_| "qwen3:8b".to_string()),
            temperature: 0.2,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            session_name: env::var("WEBPILOT_BROWSER_SESSION")
                .unwrap_or_else(|_| "webpilot".to_string()),
            headed: env_flag("WEBPILOT_BROWSER_HEADED").unwrap_or(false),
            settle_ms: 1000,
            scroll_step: 600,
            profile_dir: env::var("WEBPILOT_PROFILE_DIR").ok().map(PathBuf::from),
            start_url: None,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: env_parse("WEBPILOT_MAX_STEPS").unwrap_or(50),
            max_run_secs: env_parse("WEBPILOT_MAX_RUN_SECS"),
            memory_window: 10,
            summary_detail: 12,
            max_observation_chars: 2000,
            query_limit: 12,
            reasoning_retries: 1,
            debug: env_flag("WEBPILOT_DEBUG").unwrap_or(false),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            reasoning_secs: 120,
            action_secs: 30,
            confirmation_secs: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            runs_dir: env::var("WEBPILOT_RUNS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./runs")),
            filter: "webpilot=info".to_string(),
            screenshots: true,
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("webpilot")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    pub fn load() -> Self {
        // Try to load .env file if it exists
        let _ = dotenvy::dotenv();

        if let Ok(config) = Self::load_from_file() {
            return config;
        }

        // Fall back to defaults (which respect env vars)
        Self::default()
    }

    /// Load configuration from the default file only
    pub fn load_from_file() -> Result<Self> {
        Self::load_from_path(&Self::config_file())
    }

    /// Load configuration from a specific file
    pub fn load_from_path(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Err(PilotError::config("Config file not found"));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| PilotError::config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| PilotError::config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to the default file and return its path
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .map_err(|e| PilotError::config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PilotError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| PilotError::config(format!("Failed to write config: {}", e)))?;

        Ok(config_path)
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("agent.max_steps", self.agent.max_steps as u64),
            ("agent.memory_window", self.agent.memory_window as u64),
            ("agent.summary_detail", self.agent.summary_detail as u64),
            ("agent.max_observation_chars", self.agent.max_observation_chars as u64),
            ("agent.query_limit", self.agent.query_limit as u64),
            ("timeouts.reasoning_secs", self.timeouts.reasoning_secs),
            ("timeouts.action_secs", self.timeouts.action_secs),
            ("timeouts.confirmation_secs", self.timeouts.confirmation_secs),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(PilotError::config(format!("{} must be greater than zero", name)));
            }
        }
        if self.agent.max_run_secs == Some(0) {
            return Err(PilotError::config(
                "agent.max_run_secs must be greater than zero when set",
            ));
        }
        Ok(())
    }

    /// Get the full reasoning service base URL
    pub fn reasoning_url(&self) -> String {
        format!("http://{}:{}", self.reasoning.host, self.reasoning.port)
    }

    pub fn reasoning_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.reasoning_secs)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.action_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.confirmation_secs)
    }

    pub fn settle_period(&self) -> Duration {
        Duration::from_millis(self.browser.settle_ms)
    }

    pub fn run_budget(&self) -> Option<Duration> {
        self.agent.max_run_secs.map(Duration::from_secs)
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        toml::to_string_pretty(&Config::default())
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.reasoning.port, 11434);
        assert_eq!(config.agent.memory_window, 10);
        assert_eq!(config.agent.query_limit, 12);
        assert_eq!(config.agent.reasoning_retries, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reasoning_url() {
        let mut config = Config::default();
        config.reasoning.host = "localhost".to_string();
        config.reasoning.port = 11434;
        assert_eq!(config.reasoning_url(), "http://localhost:11434");
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = Config::default();
        config.agent.memory_window = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("memory_window"));
    }

    #[test]
    fn test_load_from_path_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[agent]\nmax_steps = 7\nmax_run_secs = 60\nmemory_window = 3\nsummary_detail = 4\n\
             max_observation_chars = 500\nquery_limit = 5\nreasoning_retries = 2\ndebug = true\n",
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.agent.max_steps, 7);
        assert_eq!(config.agent.memory_window, 3);
        assert_eq!(config.run_budget(), Some(Duration::from_secs(60)));
        // Missing sections fall back to defaults
        assert_eq!(config.timeouts.action_secs, 30);
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = Config::default_config_toml();
        assert!(toml_str.contains("memory_window"));
        assert!(toml_str.contains("runs_dir"));
    }

    #[test]
    fn test_config_dir() {
        let dir = Config::config_dir();
        assert!(dir.to_string_lossy().contains("webpilot"));
    }
}
