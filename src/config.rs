//! Store configuration.
//!
//! Loaded from an optional TOML file, then overridden by `SHOP_*`
//! environment variables. Every field has a default so an empty file (or no
//! file at all) is a valid configuration.

use crate::error::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding [`StoreConfig::database_path`].
pub const ENV_DB_PATH: &str = "SHOP_DB_PATH";
/// Environment variable overriding [`LoggingConfig::level`].
pub const ENV_LOG_LEVEL: &str = "SHOP_LOG_LEVEL";

/// SQLite journal mode applied on every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    #[default]
    Wal,
    Delete,
    Memory,
}

impl JournalMode {
    /// Value passed to `PRAGMA journal_mode`.
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
            Self::Memory => "MEMORY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `shop_sqlite=debug`.
    pub level: String,
    /// Optional file receiving a plain-text copy of every log line.
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Shop database configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,
    pub journal_mode: JournalMode,
    /// Busy timeout in milliseconds
    pub busy_timeout_ms: u64,
    /// Page size used when a caller does not ask for one
    pub default_page_size: u32,
    /// Delimiter for CSV files
    pub csv_delimiter: char,
    pub logging: LoggingConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("ecommerce.db"),
            journal_mode: JournalMode::default(),
            busy_timeout_ms: 5_000,
            default_page_size: 10,
            csv_delimiter: ',',
            logging: LoggingConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Create a config for the given database path, other fields defaulted
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Apply `SHOP_DB_PATH` / `SHOP_LOG_LEVEL` overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(ENV_DB_PATH).filter(|v| !v.is_empty()) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.is_empty()) {
            self.logging.level = level;
        }
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    fn validate(&self) -> Result<()> {
        if self.default_page_size == 0 {
            return Err(crate::StoreError::Config(
                "default_page_size must be greater than zero".to_string(),
            ));
        }
        delimiter_byte(self.csv_delimiter)?;
        Ok(())
    }

    /// [`Self::csv_delimiter`] as the byte the CSV reader and writer take.
    pub fn csv_delimiter_byte(&self) -> Result<u8> {
        delimiter_byte(self.csv_delimiter)
    }
}

/// A CSV delimiter must be a single ASCII character.
pub fn delimiter_byte(delimiter: char) -> Result<u8> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| {
            crate::StoreError::Config(format!(
                "csv delimiter must be a single ASCII character, got {delimiter:?}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.database_path, PathBuf::from("ecommerce.db"));
        assert_eq!(config.journal_mode, JournalMode::Wal);
        assert_eq!(config.default_page_size, 10);
        assert_eq!(config.csv_delimiter, ',');
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = StoreConfig::from_toml_str(
            r#"
            database_path = "/tmp/shop.db"
            journal_mode = "delete"

            [logging]
            log_file = "ops.log"
            "#,
        )
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/shop.db"));
        assert_eq!(config.journal_mode, JournalMode::Delete);
        assert_eq!(config.busy_timeout_ms, 5_000);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.log_file, Some(PathBuf::from("ops.log")));
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let err = StoreConfig::from_toml_str("default_page_size = 0").unwrap_err();
        assert!(matches!(err, crate::StoreError::Config(_)));
    }

    #[test]
    fn test_delimiter_must_be_ascii() {
        assert_eq!(delimiter_byte(';').unwrap(), b';');
        // Fits in a byte but is not ASCII.
        assert!(matches!(delimiter_byte('é'), Err(crate::StoreError::Config(_))));
        assert!(matches!(delimiter_byte('→'), Err(crate::StoreError::Config(_))));

        let mut config = StoreConfig::default();
        config.csv_delimiter = '§';
        assert!(config.csv_delimiter_byte().is_err());
        assert!(StoreConfig::from_toml_str("csv_delimiter = \"→\"").is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            HashMap::from([(ENV_DB_PATH, "other.db"), (ENV_LOG_LEVEL, "debug")]);
        let config = StoreConfig::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.database_path, PathBuf::from("other.db"));
        assert_eq!(config.logging.level, "debug");
    }
}
