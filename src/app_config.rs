use anyhow::{anyhow, Context, Result};
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fmt;
use std::path::{Path, PathBuf};

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO)
    pub source_language: String,

    /// Target language code (ISO)
    pub target_language: String,

    /// Scheduler config
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Translation config
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Concurrency ceiling for worker processes: a fixed count or "auto"
/// (derived from the detected hardware tier at controller startup).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyLimit {
    /// Pick the ceiling from the platform tier
    Auto,
    /// Fixed user-configured ceiling
    Fixed(usize),
}

impl Default for ConcurrencyLimit {
    fn default() -> Self {
        Self::Auto
    }
}

impl fmt::Display for ConcurrencyLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Fixed(n) => write!(f, "{}", n),
        }
    }
}

impl Serialize for ConcurrencyLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Auto => serializer.serialize_str("auto"),
            Self::Fixed(n) => serializer.serialize_u64(*n as u64),
        }
    }
}

impl<'de> Deserialize<'de> for ConcurrencyLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LimitVisitor;

        impl Visitor<'_> for LimitVisitor {
            type Value = ConcurrencyLimit;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a positive integer or the string \"auto\"")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                if value == 0 {
                    return Err(E::custom("max_concurrent_processes must be at least 1"));
                }
                Ok(ConcurrencyLimit::Fixed(value as usize))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                if value <= 0 {
                    return Err(E::custom("max_concurrent_processes must be at least 1"));
                }
                self.visit_u64(value as u64)
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                if value.eq_ignore_ascii_case("auto") {
                    Ok(ConcurrencyLimit::Auto)
                } else {
                    Err(E::custom(format!("invalid concurrency limit: {}", value)))
                }
            }
        }

        deserializer.deserialize_any(LimitVisitor)
    }
}

/// Configuration for the process scheduler
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of worker processes running at once, or "auto"
    #[serde(default)]
    pub max_concurrent_processes: ConcurrencyLimit,

    /// Whether to burn the bilingual subtitles back into the video
    #[serde(default)]
    pub burn_in: bool,

    /// Timeout in seconds for the audio extraction step
    #[serde(default = "default_extraction_timeout_secs")]
    pub extraction_timeout_secs: u64,

    /// Working directory for intermediate audio/subtitle files.
    /// Defaults to the platform cache directory when unset.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_processes: ConcurrencyLimit::default(),
            burn_in: false,
            extraction_timeout_secs: default_extraction_timeout_secs(),
            cache_dir: None,
        }
    }
}

impl SchedulerConfig {
    /// Resolve the working directory for intermediate files
    pub fn effective_cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("subweave")
    }
}

/// Configuration for one translation provider
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Per-request timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Default configuration for the primary (OpenAI-compatible) provider
    pub fn openai() -> Self {
        Self {
            provider_type: "openai".to_string(),
            model: default_openai_model(),
            api_key: String::new(),
            endpoint: default_openai_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Default configuration for the Google fallback provider
    pub fn google() -> Self {
        Self {
            provider_type: "google".to_string(),
            model: String::new(),
            api_key: String::new(),
            endpoint: default_google_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Primary translation provider
    #[serde(default = "ProviderConfig::openai")]
    pub primary: ProviderConfig,

    /// Fallback translation provider, used after the primary fails unrecoverably
    #[serde(default = "ProviderConfig::google")]
    pub fallback: ProviderConfig,

    /// Whether the fallback provider may be used at all
    #[serde(default = "default_true")]
    pub enable_fallback: bool,

    /// Maximum total characters per translation batch
    #[serde(default = "default_batch_max_chars")]
    pub batch_max_chars: usize,

    /// Maximum segment count per translation batch
    #[serde(default = "default_batch_max_entries")]
    pub batch_max_entries: usize,

    /// Maximum batches sent concurrently within one job
    #[serde(default = "default_concurrent_batches")]
    pub concurrent_batches: usize,

    /// Retry count for failed batch requests
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential retry backoff, in seconds
    #[serde(default = "default_retry_base_delay_secs")]
    pub retry_base_delay_secs: f64,

    /// Upper bound on a single retry delay, in seconds
    #[serde(default = "default_retry_max_delay_secs")]
    pub retry_max_delay_secs: f64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            primary: ProviderConfig::openai(),
            fallback: ProviderConfig::google(),
            enable_fallback: true,
            batch_max_chars: default_batch_max_chars(),
            batch_max_entries: default_batch_max_entries(),
            concurrent_batches: default_concurrent_batches(),
            max_retries: default_max_retries(),
            retry_base_delay_secs: default_retry_base_delay_secs(),
            retry_max_delay_secs: default_retry_max_delay_secs(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

fn default_extraction_timeout_secs() -> u64 {
    300
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_batch_max_chars() -> usize {
    1200
}

fn default_batch_max_entries() -> usize {
    4
}

fn default_concurrent_batches() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_secs() -> f64 {
    1.0
}

fn default_retry_max_delay_secs() -> f64 {
    60.0
}

fn default_true() -> bool {
    true
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_google_endpoint() -> String {
    "https://translate.googleapis.com".to_string()
}

impl Config {
    /// Load the configuration from a JSON file, falling back to defaults
    /// when the file does not exist yet
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.source_language.trim().is_empty() {
            return Err(anyhow!("source_language must not be empty"));
        }
        if self.target_language.trim().is_empty() {
            return Err(anyhow!("target_language must not be empty"));
        }
        if self.translation.batch_max_chars == 0 {
            return Err(anyhow!("batch_max_chars must be at least 1"));
        }
        if self.translation.batch_max_entries == 0 {
            return Err(anyhow!("batch_max_entries must be at least 1"));
        }
        if self.translation.retry_base_delay_secs <= 0.0 {
            return Err(anyhow!("retry_base_delay_secs must be positive"));
        }
        if self.translation.retry_max_delay_secs < self.translation.retry_base_delay_secs {
            return Err(anyhow!(
                "retry_max_delay_secs must not be below retry_base_delay_secs"
            ));
        }
        if self.translation.primary.provider_type == "openai"
            && self.translation.primary.api_key.is_empty()
        {
            return Err(anyhow!(
                "Translation API key is required for the OpenAI provider"
            ));
        }
        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: "en".to_string(),
            target_language: "zh".to_string(),
            scheduler: SchedulerConfig::default(),
            translation: TranslationConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
