//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/colloquy/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/colloquy/` (~/.config/colloquy/)
//! - Data: `$XDG_DATA_HOME/colloquy/` (~/.local/share/colloquy/)
//! - State/Logs: `$XDG_STATE_HOME/colloquy/` (~/.local/state/colloquy/)
//!
//! Credentials are never compiled in. The completion API key comes from
//! `[completion] api_key` or the `COLLOQUY_API_KEY` environment variable,
//! which wins when both are set.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable holding the completion API key
pub const API_KEY_ENV: &str = "COLLOQUY_API_KEY";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Chat completion endpoints and request tuning
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Image upload limits and the generation endpoint
    #[serde(default)]
    pub image: ImageConfig,

    /// Web search augmentation
    #[serde(default)]
    pub search: SearchConfig,

    /// Model defaults and plan allow-list
    #[serde(default)]
    pub models: ModelsConfig,

    /// Presentation settings
    #[serde(default)]
    pub ui: UiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Completion endpoint configuration
///
/// Endpoints are tried in order, starting from whichever one last
/// succeeded (or the one picked by the startup probe).
#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    /// Ordered list of OpenAI-compatible chat completion URLs
    #[serde(default = "default_completion_endpoints")]
    pub endpoints: Vec<String>,

    /// Bearer token (overridden by `COLLOQUY_API_KEY`)
    pub api_key: Option<String>,

    /// Client-side request timeout in seconds
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,

    /// `max_tokens` sent with every text request
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// `temperature` sent with every text request
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Health-check all endpoints when a front end starts
    #[serde(default = "default_true")]
    pub probe_on_start: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoints: default_completion_endpoints(),
            api_key: None,
            timeout_secs: default_completion_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            probe_on_start: true,
        }
    }
}

impl CompletionConfig {
    /// Resolve the API key, preferring the environment over the file.
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone())
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::Config(
                "completion.endpoints must list at least one URL".to_string(),
            ));
        }
        if let Some(bad) = self
            .endpoints
            .iter()
            .find(|e| !(e.starts_with("http://") || e.starts_with("https://")))
        {
            return Err(Error::Config(format!(
                "completion endpoint is not an http(s) URL: {}",
                bad
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "completion.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::Config(
                "completion.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_completion_endpoints() -> Vec<String> {
    vec!["https://api.a4f.co/v1/chat/completions".to_string()]
}

fn default_completion_timeout() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_true() -> bool {
    true
}

/// Image upload and generation configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ImageConfig {
    /// Image generation endpoint
    #[serde(default = "default_image_endpoint")]
    pub endpoint: String,

    /// Size requested from the generation endpoint
    #[serde(default = "default_image_size")]
    pub size: String,

    /// Largest accepted upload in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Prompt sent alongside uploaded images
    #[serde(default = "default_analysis_prompt")]
    pub analysis_prompt: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            endpoint: default_image_endpoint(),
            size: default_image_size(),
            max_upload_bytes: default_max_upload_bytes(),
            analysis_prompt: default_analysis_prompt(),
        }
    }
}

fn default_image_endpoint() -> String {
    "https://api.a4f.co/v1/images/generations".to_string()
}

fn default_image_size() -> String {
    "1024x1024".to_string()
}

fn default_max_upload_bytes() -> u64 {
    crate::image::MAX_UPLOAD_BYTES
}

fn default_analysis_prompt() -> String {
    "Please analyze this image and describe what you see.".to_string()
}

/// Web search configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Whether new chat views start with web search switched on
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// DuckDuckGo Instant Answer compatible endpoint
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Search request timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_search_endpoint(),
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_search_endpoint() -> String {
    "https://api.duckduckgo.com/".to_string()
}

fn default_search_timeout() -> u64 {
    10
}

/// Model selection configuration
///
/// Leaving a field unset keeps the built-in catalog defaults.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ModelsConfig {
    /// Model used when nothing (or something unknown) is selected
    pub default: Option<String>,
    /// Vision model used for uploaded images
    pub vision_default: Option<String>,
    /// Models usable on the current plan
    pub allowed: Option<Vec<String>>,
}

/// Presentation settings shared by front ends
#[derive(Debug, Deserialize, Clone)]
pub struct UiConfig {
    /// Name shown next to assistant replies
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            assistant_name: default_assistant_name(),
        }
    }
}

fn default_assistant_name() -> String {
    "Assistant".to_string()
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.completion.validate()?;
        if self.image.max_upload_bytes == 0 {
            return Err(Error::Config(
                "image.max_upload_bytes must be greater than zero".to_string(),
            ));
        }
        if let Some(allowed) = &self.models.allowed {
            if allowed.is_empty() {
                return Err(Error::Config(
                    "models.allowed must not be empty when set".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/colloquy/config.toml` (~/.config/colloquy/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("colloquy").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/colloquy/` (~/.local/share/colloquy/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("colloquy")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/colloquy/` (~/.local/state/colloquy/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("colloquy")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/colloquy/data.db` (~/.local/share/colloquy/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/colloquy/colloquy.log` (~/.local/state/colloquy/colloquy.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("colloquy.log")
    }
}
