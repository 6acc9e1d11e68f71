//! Layered configuration: defaults, optional TOML file, then environment

use crate::error::{Result, SidekickError};
use crate::tiers::ProviderMode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Top-level sidekick configuration
#[derive(Debug, Default, Deserialize)]
pub struct SidekickConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub budget: BudgetConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub structure: StructureConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Provider credentials and endpoints
#[derive(Deserialize)]
pub struct ProviderConfig {
    /// Direct provider key (falls back to OPENAI_API_KEY)
    #[serde(default)]
    pub openai_api_key: Option<SecretString>,

    /// Gateway key (falls back to OPENROUTER_API_KEY); selects gateway mode when set
    #[serde(default)]
    pub openrouter_api_key: Option<SecretString>,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    #[serde(default = "default_openrouter_base_url")]
    pub openrouter_base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openrouter_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openrouter_api_key: None,
            openai_base_url: default_openai_base_url(),
            openrouter_base_url: default_openrouter_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("openrouter_api_key", &self.openrouter_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("openai_base_url", &self.openai_base_url)
            .field("openrouter_base_url", &self.openrouter_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    /// Gateway mode whenever a gateway key is configured
    pub fn mode(&self) -> ProviderMode {
        if self.openrouter_api_key.is_some() {
            ProviderMode::Gateway
        } else {
            ProviderMode::Direct
        }
    }

    /// Credential for the active mode
    pub fn credential(&self) -> Option<&SecretString> {
        match self.mode() {
            ProviderMode::Gateway => self.openrouter_api_key.as_ref(),
            ProviderMode::Direct => self.openai_api_key.as_ref(),
        }
    }

    /// Base URL for the active mode
    pub fn base_url(&self) -> &str {
        match self.mode() {
            ProviderMode::Gateway => &self.openrouter_base_url,
            ProviderMode::Direct => &self.openai_base_url,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn fill_from_env(&mut self) {
        if self.openai_api_key.is_none() {
            if let Ok(val) = std::env::var("OPENAI_API_KEY") {
                if !val.trim().is_empty() {
                    self.openai_api_key = Some(SecretString::new(val));
                }
            }
        }

        if self.openrouter_api_key.is_none() {
            if let Ok(val) = std::env::var("OPENROUTER_API_KEY") {
                if !val.trim().is_empty() {
                    self.openrouter_api_key = Some(SecretString::new(val));
                }
            }
        }
    }
}

/// Token budgeting knobs
#[derive(Debug, Clone, Deserialize)]
pub struct BudgetConfig {
    /// Safety factor applied to estimates before comparing against tier capacity
    #[serde(default = "default_compensation_factor")]
    pub compensation_factor: f64,

    /// Fixed allowance for conversation memory in every request
    #[serde(default = "default_memory_overhead")]
    pub memory_overhead_tokens: usize,

    /// Completion tokens requested from the model
    #[serde(default = "default_response_tokens")]
    pub response_tokens: usize,

    /// Ceiling for automatically selected files
    #[serde(default = "default_auto_context_tokens")]
    pub auto_context_tokens: usize,

    /// Files larger than this are never auto-selected
    #[serde(default = "default_max_file_tokens")]
    pub max_file_tokens: usize,

    /// Unified diff context lines (never below 10)
    #[serde(default = "default_diff_context_lines")]
    pub diff_context_lines: u32,
}

fn default_compensation_factor() -> f64 {
    1.05
}

fn default_memory_overhead() -> usize {
    2048
}

fn default_response_tokens() -> usize {
    1024
}

fn default_auto_context_tokens() -> usize {
    4096
}

fn default_max_file_tokens() -> usize {
    10_000
}

fn default_diff_context_lines() -> u32 {
    10
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            compensation_factor: default_compensation_factor(),
            memory_overhead_tokens: default_memory_overhead(),
            response_tokens: default_response_tokens(),
            auto_context_tokens: default_auto_context_tokens(),
            max_file_tokens: default_max_file_tokens(),
            diff_context_lines: default_diff_context_lines(),
        }
    }
}

/// Model invocation settings
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_streaming")]
    pub streaming: bool,

    /// Token window for the conversation memory
    #[serde(default = "default_memory_tokens")]
    pub memory_tokens: usize,
}

fn default_temperature() -> f32 {
    0.05
}

fn default_streaming() -> bool {
    true
}

fn default_memory_tokens() -> usize {
    2048
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            streaming: default_streaming(),
            memory_tokens: default_memory_tokens(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session file name, relative to the repository root
    #[serde(default = "default_session_file")]
    pub file_name: String,
}

fn default_session_file() -> String {
    ".sidekick_session.json".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            file_name: default_session_file(),
        }
    }
}

impl SessionConfig {
    pub fn path_in(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.file_name)
    }
}

/// Directory structure section of the context
#[derive(Debug, Clone, Deserialize)]
pub struct StructureConfig {
    #[serde(default)]
    pub include: bool,

    #[serde(default = "default_structure_depth")]
    pub depth: usize,

    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    #[serde(default = "default_use_ignore_file")]
    pub use_ignore_file: bool,
}

fn default_structure_depth() -> usize {
    3
}

fn default_ignore_patterns() -> Vec<String> {
    vec![".git".to_string()]
}

fn default_use_ignore_file() -> bool {
    true
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            include: false,
            depth: default_structure_depth(),
            ignore_patterns: default_ignore_patterns(),
            use_ignore_file: default_use_ignore_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl SidekickConfig {
    /// Default location of the user config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sidekick").join("config.toml"))
    }

    /// Load and validate configuration
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = Self::load_unchecked(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file and `SIDEKICK__*` environment
    /// variables without validating it. Commands that never reach the
    /// provider use this.
    pub fn load_unchecked(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = ::config::Config::builder();

        let file = path.map(Path::to_path_buf).or_else(Self::default_path);
        if let Some(file) = file {
            debug!("Reading configuration from {}", file.display());
            builder = builder.add_source(
                ::config::File::from(file)
                    .format(::config::FileFormat::Toml)
                    .required(path.is_some()),
            );
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("SIDEKICK")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: SidekickConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| SidekickError::Configuration(e.to_string()))?;

        config.provider.fill_from_env();
        config.normalize();

        Ok(config)
    }

    /// Clamp values that have hard floors
    pub fn normalize(&mut self) {
        if self.budget.diff_context_lines < 10 {
            self.budget.diff_context_lines = 10;
        }
    }

    /// Validate that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        let factor = self.budget.compensation_factor;
        if factor.is_nan() || factor < 1.0 {
            return Err(SidekickError::Configuration(format!(
                "compensation_factor must be >= 1.0, got {}",
                self.budget.compensation_factor
            )));
        }

        if self.budget.response_tokens == 0 || self.budget.auto_context_tokens == 0 {
            return Err(SidekickError::Configuration(
                "token budgets must be greater than zero".to_string(),
            ));
        }

        match self.provider.credential() {
            Some(key) if !key.expose_secret().trim().is_empty() => Ok(()),
            _ => Err(SidekickError::Configuration(format!(
                "no API key configured for {} mode (set OPENAI_API_KEY or OPENROUTER_API_KEY)",
                self.provider.mode()
            ))),
        }
    }
}
