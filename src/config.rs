//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::facet::{ComparatorType, IntervalSetting};
use crate::index::ScriptParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default, rename = "facet")]
    pub facets: Vec<FacetConfig>,

    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One date histogram facet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetConfig {
    /// Facet name, echoed in the result
    pub name: String,

    /// Date field whose values are bucketed
    pub field: String,

    /// Script language
    #[serde(default = "default_lang")]
    pub lang: String,

    /// Value script source
    pub script: String,

    /// Named script parameters
    #[serde(default)]
    pub params: ScriptParams,

    /// UTC offset applied before bucketing
    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    /// Bucket width; `1` keeps every timestamp as its own bucket
    #[serde(default = "default_interval")]
    pub interval: IntervalSetting,

    /// Ordering directive for whoever presents the result
    #[serde(default)]
    pub comparator: ComparatorType,
}

fn default_lang() -> String {
    "expr".to_string()
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

fn default_interval() -> IntervalSetting {
    IntervalSetting::Millis(1)
}

impl FacetConfig {
    /// Create a facet with default language, time zone and interval
    pub fn new(name: impl Into<String>, field: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            lang: default_lang(),
            script: script.into(),
            params: ScriptParams::new(),
            time_zone: default_time_zone(),
            interval: default_interval(),
            comparator: ComparatorType::default(),
        }
    }

    /// Builder: set the script language
    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// Builder: set the bucket interval
    pub fn interval(mut self, interval: impl Into<IntervalSetting>) -> Self {
        self.interval = interval.into();
        self
    }

    /// Builder: set the time zone offset
    pub fn time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = time_zone.into();
        self
    }

    /// Builder: set the comparator directive
    pub fn comparator(mut self, comparator: ComparatorType) -> Self {
        self.comparator = comparator;
        self
    }

    /// Builder: add a script parameter
    pub fn param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// Dataset input configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataConfig {
    /// Dataset file (JSON or CSV)
    pub path: Option<String>,

    /// Run one collector per segment on separate threads
    #[serde(default)]
    pub parallel: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("chronofacet").join("config.toml")),
            Some(PathBuf::from("./chronofacet.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Look up a facet by name
    pub fn facet(&self, name: &str) -> Option<&FacetConfig> {
        self.facets.iter().find(|f| f.name == name)
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("CHRONOFACET_DATA_PATH") {
            self.data.path = Some(path);
        }
        if let Ok(parallel) = std::env::var("CHRONOFACET_PARALLEL") {
            if let Ok(p) = parallel.parse() {
                self.data.parallel = p;
            }
        }

        if let Ok(level) = std::env::var("CHRONOFACET_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("CHRONOFACET_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# chronofacet configuration
#
# Environment variables override these settings:
# - CHRONOFACET_DATA_PATH
# - CHRONOFACET_PARALLEL
# - CHRONOFACET_LOG_LEVEL
# - CHRONOFACET_LOG_FORMAT

[data]
# Dataset file: .json (mappings + segments) or .csv (segment,doc,field,value)
path = "./dataset.json"

# Collect each segment on its own thread and merge the histograms
parallel = false

[[facet]]
# Name echoed in the result
name = "revenue_per_day"

# Date field to bucket on
field = "created"

# Value script: numbers, params.<name>, doc['<field>'], + - * / and parentheses
lang = "expr"
script = "doc['price'] * params.rate"

# Bucket width: milliseconds, or an expression such as "1d", "12h", "hour"
interval = "1d"

# Fixed UTC offset applied before bucketing
time_zone = "UTC"

# Ordering directive forwarded with the result: time, count or total
comparator = "time"

[facet.params]
rate = 1.0

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();

        assert_eq!(config.facets.len(), 1);
        let facet = config.facet("revenue_per_day").unwrap();
        assert_eq!(facet.field, "created");
        assert_eq!(facet.interval, IntervalSetting::Expression("1d".to_string()));
        assert_eq!(facet.interval.to_millis(), Some(86_400_000));
        assert_eq!(facet.comparator, ComparatorType::Time);
        assert_eq!(facet.params.get("rate"), Some(&serde_json::json!(1.0)));
        assert_eq!(config.data.path.as_deref(), Some("./dataset.json"));
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_facet_defaults() {
        let config = Config::parse(
            r#"
            [[facet]]
            name = "hits"
            field = "ts"
            script = "1"
            "#,
        )
        .unwrap();

        let facet = &config.facets[0];
        assert_eq!(facet.lang, "expr");
        assert_eq!(facet.time_zone, "UTC");
        assert_eq!(facet.interval, IntervalSetting::Millis(1));
        assert!(facet.params.is_empty());
        assert!(!config.data.parallel);
    }

    #[test]
    fn test_integer_interval_and_comparator() {
        let config = Config::parse(
            r#"
            [[facet]]
            name = "hits"
            field = "ts"
            script = "1"
            interval = 3600000
            comparator = "total"
            "#,
        )
        .unwrap();

        assert_eq!(config.facets[0].interval.to_millis(), Some(3_600_000));
        assert_eq!(config.facets[0].comparator, ComparatorType::Total);
    }

    #[test]
    fn test_missing_required_field_fails() {
        let result = Config::parse(
            r#"
            [[facet]]
            name = "hits"
            script = "1"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(generate_default_config().as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.facets[0].name, "revenue_per_day");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_facet_builder() {
        let facet = FacetConfig::new("f", "ts", "params.x")
            .interval("1h")
            .time_zone("+01:00")
            .comparator(ComparatorType::Count)
            .param("x", 2);

        assert_eq!(facet.interval.to_millis(), Some(3_600_000));
        assert_eq!(facet.time_zone, "+01:00");
        assert_eq!(facet.params.get("x"), Some(&serde_json::json!(2)));
    }
}
