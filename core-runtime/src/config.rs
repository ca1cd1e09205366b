//! # Live Album Configuration
//!
//! Provides configuration management for the live-album engine.
//!
//! ## Overview
//!
//! Configuration is built through [`LiveAlbumConfigBuilder`] or loaded from
//! environment variables with [`LiveAlbumConfig::from_env`]. Both paths run the
//! same fail-fast validation, so an engine never starts with a zero sweep
//! interval or a default page size above the ceiling.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LIVE_ALBUMS_ENABLED` | `true` | Enable the periodic scheduler |
//! | `LIVE_ALBUMS_INTERVAL_SECS` | `3600` | Seconds between scheduled sweeps |
//! | `LIVE_ALBUMS_STORE_PATH` | data dir | Definition store file |
//! | `LIVE_ALBUMS_MAX_RESULTS_CEILING` | `5000` | Upper bound for any search page size |
//! | `LIVE_ALBUMS_DEFAULT_MAX_RESULTS` | `1000` | Page size when a definition omits one |
//! | `LIVE_ALBUMS_PREVIEW_LIMIT` | `10` | Ids listed in refresh previews |
//! | `LIVE_ALBUMS_CALL_TIMEOUT_SECS` | `30` | Deadline for each catalog call |
//! | `LIVE_ALBUMS_LOG_FORMAT` | `pretty` (debug) / `json` (release) | `pretty`, `json` or `compact` |
//! | `LIVE_ALBUMS_LOG_LEVEL` | `info` | Level for the engine's crates |
//! | `LIVE_ALBUMS_LOG_FILTER` | - | Full `EnvFilter` directives, overriding the level |
//! | `CATALOG_BASE_URL` | - | Catalog API root, e.g. `https://photos.example.com/api` |
//! | `CATALOG_API_KEY` | - | Catalog API key |
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::LiveAlbumConfig;
//! use std::time::Duration;
//!
//! let config = LiveAlbumConfig::builder()
//!     .sweep_interval(Duration::from_secs(900))
//!     .store_path("/var/lib/live-albums/definitions.json")
//!     .catalog("https://photos.example.com/api", "secret")
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::logging::{parse_level, redact_if_sensitive, LogFormat, LoggingConfig};
use bridge_traits::time::LogLevel;
use std::path::PathBuf;
use std::time::Duration;

/// Hard upper bound on search page size
pub const DEFAULT_MAX_RESULTS_CEILING: u32 = 5000;

/// Page size used when a definition does not specify one
pub const DEFAULT_MAX_RESULTS: u32 = 1000;

/// Number of ids shown in refresh previews
pub const DEFAULT_PREVIEW_LIMIT: usize = 10;

/// Default time between scheduled sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default deadline for a single catalog call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the remote catalog
#[derive(Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// API root, without a trailing slash
    pub base_url: String,
    /// API key sent with every request
    pub api_key: String,
}

impl CatalogConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(Error::Config("Catalog base URL cannot be empty".to_string()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "Catalog base URL must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if self.api_key.trim().is_empty() {
            return Err(Error::Config(
                "Catalog API key cannot be empty. Set CATALOG_API_KEY.".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact_if_sensitive("api_key", &self.api_key))
            .finish()
    }
}

/// Live-album engine configuration.
///
/// Use [`LiveAlbumConfig::builder`] or [`LiveAlbumConfig::from_env`] to
/// construct validated instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveAlbumConfig {
    /// Whether `start()` actually registers the periodic trigger
    pub scheduler_enabled: bool,

    /// Time between scheduled sweeps
    pub sweep_interval: Duration,

    /// Definition store file. `None` resolves to the platform data directory.
    pub store_path: Option<PathBuf>,

    /// Upper bound applied to every definition's `max_results`
    pub max_results_ceiling: u32,

    /// `max_results` used when a definition does not specify one
    pub default_max_results: u32,

    /// Number of ids included in refresh previews
    pub preview_limit: usize,

    /// Deadline for each individual catalog call
    pub call_timeout: Duration,

    /// Remote catalog connection (required by the desktop bootstrap)
    pub catalog: Option<CatalogConfig>,

    /// Console format for the bootstrap's subscriber
    pub log_format: LogFormat,

    /// Level for the engine's own crates
    pub log_level: LogLevel,

    /// `EnvFilter` directives replacing `log_level`
    pub log_filter: Option<String>,
}

impl Default for LiveAlbumConfig {
    fn default() -> Self {
        Self {
            scheduler_enabled: true,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            store_path: None,
            max_results_ceiling: DEFAULT_MAX_RESULTS_CEILING,
            default_max_results: DEFAULT_MAX_RESULTS,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            catalog: None,
            log_format: LogFormat::default(),
            log_level: LogLevel::Info,
            log_filter: None,
        }
    }
}

impl LiveAlbumConfig {
    /// Creates a new builder seeded with defaults
    pub fn builder() -> LiveAlbumConfigBuilder {
        LiveAlbumConfigBuilder::default()
    }

    /// Subscriber settings for [`init_logging`](crate::logging::init_logging)
    pub fn logging(&self) -> LoggingConfig {
        let config = LoggingConfig::default()
            .with_format(self.log_format)
            .with_level(self.log_level);
        match &self.log_filter {
            Some(filter) => config.with_filter(filter.clone()),
            None => config,
        }
    }

    /// Load configuration from the process environment.
    ///
    /// Unset variables fall back to defaults; set-but-unparseable variables
    /// are an error rather than being silently ignored.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(v) = lookup("LIVE_ALBUMS_ENABLED") {
            builder = builder.scheduler_enabled(parse_bool("LIVE_ALBUMS_ENABLED", &v)?);
        }
        if let Some(v) = lookup("LIVE_ALBUMS_INTERVAL_SECS") {
            builder = builder.sweep_interval(Duration::from_secs(parse_num(
                "LIVE_ALBUMS_INTERVAL_SECS",
                &v,
            )?));
        }
        if let Some(v) = lookup("LIVE_ALBUMS_STORE_PATH") {
            if !v.trim().is_empty() {
                builder = builder.store_path(v.trim());
            }
        }
        if let Some(v) = lookup("LIVE_ALBUMS_MAX_RESULTS_CEILING") {
            builder = builder.max_results_ceiling(parse_num("LIVE_ALBUMS_MAX_RESULTS_CEILING", &v)?);
        }
        if let Some(v) = lookup("LIVE_ALBUMS_DEFAULT_MAX_RESULTS") {
            builder = builder.default_max_results(parse_num("LIVE_ALBUMS_DEFAULT_MAX_RESULTS", &v)?);
        }
        if let Some(v) = lookup("LIVE_ALBUMS_PREVIEW_LIMIT") {
            builder = builder.preview_limit(parse_num("LIVE_ALBUMS_PREVIEW_LIMIT", &v)?);
        }
        if let Some(v) = lookup("LIVE_ALBUMS_CALL_TIMEOUT_SECS") {
            builder = builder.call_timeout(Duration::from_secs(parse_num(
                "LIVE_ALBUMS_CALL_TIMEOUT_SECS",
                &v,
            )?));
        }
        if let Some(v) = lookup("LIVE_ALBUMS_LOG_FORMAT") {
            builder = builder.log_format(v.parse()?);
        }
        if let Some(v) = lookup("LIVE_ALBUMS_LOG_LEVEL") {
            builder = builder.log_level(parse_level(&v)?);
        }
        if let Some(v) = lookup("LIVE_ALBUMS_LOG_FILTER") {
            if !v.trim().is_empty() {
                builder = builder.log_filter(v.trim());
            }
        }

        match (lookup("CATALOG_BASE_URL"), lookup("CATALOG_API_KEY")) {
            (Some(url), Some(key)) => builder = builder.catalog(url, key),
            (Some(_), None) => {
                return Err(Error::Config(
                    "CATALOG_BASE_URL is set but CATALOG_API_KEY is missing".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(Error::Config(
                    "CATALOG_API_KEY is set but CATALOG_BASE_URL is missing".to_string(),
                ))
            }
            (None, None) => {}
        }

        builder.build()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval.is_zero() {
            return Err(Error::Config(
                "Sweep interval must be greater than zero".to_string(),
            ));
        }

        if self.max_results_ceiling == 0 {
            return Err(Error::Config(
                "Max results ceiling must be greater than zero".to_string(),
            ));
        }

        if self.default_max_results == 0 || self.default_max_results > self.max_results_ceiling {
            return Err(Error::Config(format!(
                "Default max results must be between 1 and the ceiling ({}), got {}",
                self.max_results_ceiling, self.default_max_results
            )));
        }

        if self.preview_limit == 0 {
            return Err(Error::Config(
                "Preview limit must be at least 1".to_string(),
            ));
        }

        if self.call_timeout.is_zero() {
            return Err(Error::Config(
                "Catalog call timeout must be greater than zero".to_string(),
            ));
        }

        if let Some(catalog) = &self.catalog {
            catalog.validate()?;
        }

        Ok(())
    }

    /// Returns the catalog settings or an actionable error
    pub fn require_catalog(&self) -> Result<&CatalogConfig> {
        self.catalog.as_ref().ok_or_else(|| Error::CapabilityMissing {
            capability: "AssetCatalog".to_string(),
            message: "No catalog connection configured. \
                      Set CATALOG_BASE_URL and CATALOG_API_KEY, \
                      or inject an AssetCatalog implementation directly."
                .to_string(),
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!(
            "{} must be a boolean (true/false), got '{}'",
            key, other
        ))),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        Error::Config(format!(
            "{} must be a non-negative integer, got '{}'",
            key, value
        ))
    })
}

/// Builder for constructing [`LiveAlbumConfig`] instances.
#[derive(Debug, Default)]
pub struct LiveAlbumConfigBuilder {
    config: LiveAlbumConfig,
}

impl LiveAlbumConfigBuilder {
    pub fn scheduler_enabled(mut self, enabled: bool) -> Self {
        self.config.scheduler_enabled = enabled;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    pub fn store_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.store_path = Some(path.into());
        self
    }

    pub fn max_results_ceiling(mut self, ceiling: u32) -> Self {
        self.config.max_results_ceiling = ceiling;
        self
    }

    pub fn default_max_results(mut self, max_results: u32) -> Self {
        self.config.default_max_results = max_results;
        self
    }

    pub fn preview_limit(mut self, limit: usize) -> Self {
        self.config.preview_limit = limit;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    pub fn catalog(mut self, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.config.catalog = Some(CatalogConfig::new(base_url, api_key));
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.log_format = format;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.log_filter = Some(filter.into());
        self
    }

    /// Validate and produce the configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid setting.
    pub fn build(self) -> Result<LiveAlbumConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = LiveAlbumConfig::builder().build().unwrap();
        assert!(config.scheduler_enabled);
        assert_eq!(config.sweep_interval, DEFAULT_SWEEP_INTERVAL);
        assert_eq!(config.max_results_ceiling, 5000);
        assert_eq!(config.default_max_results, 1000);
        assert!(config.catalog.is_none());
    }

    #[test]
    fn test_builder_rejects_zero_interval() {
        let err = LiveAlbumConfig::builder()
            .sweep_interval(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Sweep interval"));
    }

    #[test]
    fn test_builder_rejects_default_above_ceiling() {
        let result = LiveAlbumConfig::builder()
            .max_results_ceiling(100)
            .default_max_results(500)
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_catalog_url_must_be_http() {
        let result = LiveAlbumConfig::builder()
            .catalog("ftp://photos.example.com", "key")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_catalog_trailing_slash_trimmed() {
        let config = LiveAlbumConfig::builder()
            .catalog("https://photos.example.com/api/", "key")
            .build()
            .unwrap();
        assert_eq!(
            config.catalog.unwrap().base_url,
            "https://photos.example.com/api"
        );
    }

    #[test]
    fn test_from_lookup_parses_values() {
        let config = LiveAlbumConfig::from_lookup(lookup_from(&[
            ("LIVE_ALBUMS_ENABLED", "false"),
            ("LIVE_ALBUMS_INTERVAL_SECS", "900"),
            ("LIVE_ALBUMS_STORE_PATH", "/tmp/defs.json"),
            ("LIVE_ALBUMS_PREVIEW_LIMIT", "25"),
            ("CATALOG_BASE_URL", "http://localhost:2283/api"),
            ("CATALOG_API_KEY", "k"),
        ]))
        .unwrap();

        assert!(!config.scheduler_enabled);
        assert_eq!(config.sweep_interval, Duration::from_secs(900));
        assert_eq!(config.store_path, Some(PathBuf::from("/tmp/defs.json")));
        assert_eq!(config.preview_limit, 25);
        assert_eq!(config.require_catalog().unwrap().api_key, "k");
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let result = LiveAlbumConfig::from_lookup(lookup_from(&[(
            "LIVE_ALBUMS_INTERVAL_SECS",
            "hourly",
        )]));
        assert!(result.is_err());

        let result = LiveAlbumConfig::from_lookup(lookup_from(&[("LIVE_ALBUMS_ENABLED", "maybe")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_lookup_requires_both_catalog_settings() {
        let result =
            LiveAlbumConfig::from_lookup(lookup_from(&[("CATALOG_BASE_URL", "https://x.test")]));
        assert!(result.unwrap_err().to_string().contains("CATALOG_API_KEY"));
    }

    #[test]
    fn test_missing_catalog_is_capability_error() {
        let config = LiveAlbumConfig::default();
        assert!(matches!(
            config.require_catalog(),
            Err(Error::CapabilityMissing { .. })
        ));
    }

    #[test]
    fn test_logging_settings_from_lookup() {
        let config = LiveAlbumConfig::from_lookup(lookup_from(&[
            ("LIVE_ALBUMS_LOG_FORMAT", "json"),
            ("LIVE_ALBUMS_LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        let logging = config.logging();
        assert_eq!(logging.format, LogFormat::Json);
        assert_eq!(logging.level, LogLevel::Debug);
        assert!(logging.filter.is_none());
        assert!(logging.logger_sink.is_none());
    }

    #[test]
    fn test_log_filter_passes_through() {
        let config = LiveAlbumConfig::from_lookup(lookup_from(&[(
            "LIVE_ALBUMS_LOG_FILTER",
            " core_live=trace,reqwest=info ",
        )]))
        .unwrap();

        assert_eq!(
            config.logging().filter.as_deref(),
            Some("core_live=trace,reqwest=info")
        );
    }

    #[test]
    fn test_unknown_log_level_is_rejected() {
        let result = LiveAlbumConfig::from_lookup(lookup_from(&[("LIVE_ALBUMS_LOG_LEVEL", "loud")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_catalog_debug_redacts_key() {
        let catalog = CatalogConfig::new("https://x.test", "super-secret");
        let debug = format!("{:?}", catalog);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
