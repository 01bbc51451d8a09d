use crate::error::{Error, Result};
use crate::shrinker::ShrinkConfig;
use std::fmt;
use std::path::PathBuf;

const DEFAULT_FILE_LIMIT: usize = 1_000;
const DEFAULT_MAX_KEYS: usize = 10;
const DEFAULT_MAX_CHARS_FOR_TEXT: usize = 1_000;
const DEFAULT_REPORT_DIR: &str = "report";
const DEFAULT_RUN_NAME: &str = "report";
const DEFAULT_CACHE_PATH: &str = ".llm_cache.json";

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";
const DEFAULT_TEMPERATURE: f32 = 0.1;
const DEFAULT_SITE_URL: &str = "https://github.com/data-describer";
const DEFAULT_SITE_NAME: &str = "Data Describer";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for the profiling pipeline.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Directory holding the JSON records
    pub source_dir: PathBuf,

    /// Directory receiving the staged artifacts
    pub report_dir: PathBuf,

    /// Run name every artifact filename is derived from
    pub run_name: String,

    /// Maximum number of records to ingest
    pub file_limit: usize,

    /// Maximum distribution entries kept for non-categorical columns
    pub max_keys: usize,

    /// Character budget over distribution keys for text columns
    pub max_chars_for_text: usize,

    /// Location of the persistent response cache
    pub cache_path: PathBuf,

    /// Keep a timestamped copy of an artifact before replacing it
    pub backup_existing: bool,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use job_profiler::Config;
    ///
    /// let config = Config::builder()
    ///     .run_name("listings")
    ///     .file_limit(200)
    ///     .build()
    ///     .expect("valid configuration");
    /// assert_eq!(config.file_limit, 200);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// The source directory is not checked here; only the profile stage
    /// needs it, see [`Config::validate_source`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A limit is zero
    /// - The run name is empty or contains a path separator
    pub fn validate(&self) -> Result<()> {
        if self.file_limit == 0 {
            return Err(Error::config("file_limit must be greater than 0"));
        }

        if self.max_keys == 0 {
            return Err(Error::config("max_keys must be greater than 0"));
        }

        if self.max_chars_for_text == 0 {
            return Err(Error::config("max_chars_for_text must be greater than 0"));
        }

        if self.run_name.trim().is_empty() {
            return Err(Error::config("run name must not be empty"));
        }

        if self.run_name.contains(['/', '\\']) {
            return Err(Error::config(format!(
                "run name '{}' must not contain path separators",
                self.run_name
            )));
        }

        Ok(())
    }

    /// Checks that the source directory exists and is a directory.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the offending path.
    pub fn validate_source(&self) -> Result<()> {
        if !self.source_dir.exists() {
            return Err(Error::config(format!(
                "Source directory does not exist: {}",
                self.source_dir.display()
            )));
        }

        if !self.source_dir.is_dir() {
            return Err(Error::config(format!(
                "Source path is not a directory: {}",
                self.source_dir.display()
            )));
        }

        Ok(())
    }

    /// Returns the shrinking limits.
    #[must_use]
    pub const fn shrink_config(&self) -> ShrinkConfig {
        ShrinkConfig {
            max_keys: self.max_keys,
            max_chars_for_text: self.max_chars_for_text,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            report_dir: PathBuf::from(DEFAULT_REPORT_DIR),
            run_name: DEFAULT_RUN_NAME.to_string(),
            file_limit: DEFAULT_FILE_LIMIT,
            max_keys: DEFAULT_MAX_KEYS,
            max_chars_for_text: DEFAULT_MAX_CHARS_FOR_TEXT,
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            backup_existing: false,
        }
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    source_dir: Option<PathBuf>,
    report_dir: Option<PathBuf>,
    run_name: Option<String>,
    file_limit: Option<usize>,
    max_keys: Option<usize>,
    max_chars_for_text: Option<usize>,
    cache_path: Option<PathBuf>,
    backup_existing: bool,
}

impl ConfigBuilder {
    /// Sets the directory holding the JSON records.
    #[must_use]
    pub fn source_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(path.into());
        self
    }

    /// Sets the directory receiving the artifacts.
    #[must_use]
    pub fn report_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(path.into());
        self
    }

    /// Sets the run name used for artifact filenames.
    #[must_use]
    pub fn run_name(mut self, name: impl Into<String>) -> Self {
        self.run_name = Some(name.into());
        self
    }

    /// Sets the maximum number of records to ingest.
    #[must_use]
    pub fn file_limit(mut self, limit: usize) -> Self {
        self.file_limit = Some(limit);
        self
    }

    /// Sets the maximum distribution entries for non-categorical columns.
    #[must_use]
    pub fn max_keys(mut self, keys: usize) -> Self {
        self.max_keys = Some(keys);
        self
    }

    /// Sets the character budget for text column distributions.
    #[must_use]
    pub fn max_chars_for_text(mut self, chars: usize) -> Self {
        self.max_chars_for_text = Some(chars);
        self
    }

    /// Sets the response cache location.
    #[must_use]
    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Enables or disables backups of replaced artifacts.
    #[must_use]
    pub fn backup_existing(mut self, enabled: bool) -> Self {
        self.backup_existing = enabled;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let config = Config {
            source_dir: self.source_dir.unwrap_or_else(|| PathBuf::from(".")),
            report_dir: self
                .report_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_DIR)),
            run_name: self
                .run_name
                .unwrap_or_else(|| DEFAULT_RUN_NAME.to_string()),
            file_limit: self.file_limit.unwrap_or(DEFAULT_FILE_LIMIT),
            max_keys: self.max_keys.unwrap_or(DEFAULT_MAX_KEYS),
            max_chars_for_text: self
                .max_chars_for_text
                .unwrap_or(DEFAULT_MAX_CHARS_FOR_TEXT),
            cache_path: self
                .cache_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_PATH)),
            backup_existing: self.backup_existing,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Settings for the text generation service.
///
/// Built once at startup and handed to the enrichment stage; the library
/// never reads the environment itself.
#[derive(Clone)]
#[non_exhaustive]
pub struct LlmConfig {
    /// API key sent as a bearer token
    pub api_key: Option<String>,

    /// Base URL of the chat-completions API
    pub base_url: String,

    /// Model identifier
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Value of the `HTTP-Referer` header
    pub site_url: String,

    /// Value of the `X-Title` header
    pub site_name: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Creates a new LLM configuration builder.
    #[must_use]
    pub fn builder() -> LlmConfigBuilder {
        LlmConfigBuilder::default()
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The API key is missing or blank
    /// - The base URL is not an http(s) URL
    /// - The temperature is outside `0.0..=2.0`
    /// - The timeout is zero
    pub fn validate(&self) -> Result<()> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {}
            _ => {
                return Err(Error::config(
                    "An API key is required for enrichment. \
                    Set OPENROUTER_API_KEY or pass --api-key",
                ));
            }
        }

        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }

        if self.model.trim().is_empty() {
            return Err(Error::config("model must not be empty"));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::config(format!(
                "temperature ({}) must be between 0.0 and 2.0",
                self.temperature
            )));
        }

        if self.timeout_secs == 0 {
            return Err(Error::config("timeout must be greater than 0 seconds"));
        }

        Ok(())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            site_url: DEFAULT_SITE_URL.to_string(),
            site_name: DEFAULT_SITE_NAME.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("site_url", &self.site_url)
            .field("site_name", &self.site_name)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Builder for creating an [`LlmConfig`].
#[derive(Debug, Default)]
pub struct LlmConfigBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    site_url: Option<String>,
    site_name: Option<String>,
    timeout_secs: Option<u64>,
}

impl LlmConfigBuilder {
    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the API base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the model identifier.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the `HTTP-Referer` header value.
    #[must_use]
    pub fn site_url(mut self, url: impl Into<String>) -> Self {
        self.site_url = Some(url.into());
        self
    }

    /// Sets the `X-Title` header value.
    #[must_use]
    pub fn site_name(mut self, name: impl Into<String>) -> Self {
        self.site_name = Some(name.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Builds the settings without validating them.
    ///
    /// Validation is deferred to the enrichment stage so that the other
    /// stages run without credentials.
    #[must_use]
    pub fn build(self) -> LlmConfig {
        let defaults = LlmConfig::default();
        LlmConfig {
            api_key: self.api_key.filter(|key| !key.is_empty()),
            base_url: self
                .base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            model: self.model.unwrap_or(defaults.model),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            site_url: self.site_url.unwrap_or(defaults.site_url),
            site_name: self.site_name.unwrap_or(defaults.site_name),
            timeout_secs: self.timeout_secs.unwrap_or(defaults.timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::builder().build().unwrap();

        assert_eq!(config.file_limit, DEFAULT_FILE_LIMIT);
        assert_eq!(config.max_keys, 10);
        assert_eq!(config.max_chars_for_text, 1000);
        assert_eq!(config.run_name, "report");
        assert_eq!(config.report_dir, PathBuf::from("report"));
    }

    #[test]
    fn test_invalid_source_dir() {
        let config = Config::builder()
            .source_dir("/nonexistent/path/that/should/not/exist")
            .build()
            .unwrap();

        assert!(config.validate_source().is_err());
    }

    #[test]
    fn test_source_must_be_directory() {
        use assert_fs::prelude::*;

        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("listing.json");
        file.write_str("{}").unwrap();

        let config = Config::builder().source_dir(file.path()).build().unwrap();
        assert!(config.validate_source().is_err());

        let config = Config::builder().source_dir(temp.path()).build().unwrap();
        assert!(config.validate_source().is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        assert!(Config::builder().file_limit(0).build().is_err());
        assert!(Config::builder().max_keys(0).build().is_err());
        assert!(Config::builder().max_chars_for_text(0).build().is_err());
    }

    #[test]
    fn test_invalid_run_name() {
        assert!(Config::builder().run_name("").build().is_err());
        assert!(Config::builder().run_name("../escape").build().is_err());
    }

    #[test]
    fn test_shrink_config_mirrors_limits() {
        let config = Config::builder()
            .max_keys(3)
            .max_chars_for_text(40)
            .build()
            .unwrap();

        let shrink = config.shrink_config();
        assert_eq!(shrink.max_keys, 3);
        assert_eq!(shrink.max_chars_for_text, 40);
    }

    #[test]
    fn test_llm_config_requires_api_key() {
        let err = LlmConfig::builder().build().validate().unwrap_err();
        assert!(err.is_config());

        let blank = LlmConfig::builder().api_key("   ").build();
        assert!(blank.validate().is_err());

        let ok = LlmConfig::builder().api_key("sk-test").build();
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_llm_config_rejects_bad_url_and_temperature() {
        let config = LlmConfig::builder()
            .api_key("sk-test")
            .base_url("ftp://example.com")
            .build();
        assert!(config.validate().is_err());

        let config = LlmConfig::builder()
            .api_key("sk-test")
            .temperature(3.5)
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_llm_config_trims_trailing_slash() {
        let config = LlmConfig::builder()
            .base_url("https://openrouter.ai/api/v1/")
            .build();
        assert_eq!(config.base_url, "https://openrouter.ai/api/v1");
    }

    #[test]
    fn test_llm_config_debug_redacts_key() {
        let config = LlmConfig::builder().api_key("sk-secret").build();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
