//! Runtime configuration for the hierarchy engine.
//!
//! # Invariants
//! - Every field has a default; an empty JSON object is a valid config.
//! - `validate()` runs on every load path, so a constructed API never sees a
//!   zero timeout, stride or attempt budget.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_MAX_LOCK_ATTEMPTS: u32 = 3;
const DEFAULT_RENUMBER_STRIDE: i64 = 1;
const DEFAULT_MAX_TITLE_CHARS: usize = 255;
/// Keeps `stride * members` far below `i64::MAX` for any realistic set.
const MAX_RENUMBER_STRIDE: i64 = 1 << 20;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HierarchyConfig {
    /// Bounded wait for one sibling-set lock acquisition.
    pub lock_timeout_ms: u64,
    /// Re-validation budget when an entity changes parent while we queue.
    pub max_lock_attempts: u32,
    /// Spacing used when a sibling set is renumbered. `1` yields `1..N`.
    pub renumber_stride: i64,
    /// When set, new boards start with one list of this title.
    pub default_list_title: Option<String>,
    /// Maximum title length in characters.
    pub max_title_chars: usize,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            max_lock_attempts: DEFAULT_MAX_LOCK_ATTEMPTS,
            renumber_stride: DEFAULT_RENUMBER_STRIDE,
            default_list_title: None,
            max_title_chars: DEFAULT_MAX_TITLE_CHARS,
        }
    }
}

impl HierarchyConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "lock_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_lock_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_lock_attempts must be at least 1".to_string(),
            ));
        }
        if !(1..=MAX_RENUMBER_STRIDE).contains(&self.renumber_stride) {
            return Err(ConfigError::Invalid(format!(
                "renumber_stride must be between 1 and {MAX_RENUMBER_STRIDE}"
            )));
        }
        if self.max_title_chars == 0 {
            return Err(ConfigError::Invalid(
                "max_title_chars must be at least 1".to_string(),
            ));
        }
        if let Some(title) = &self.default_list_title {
            if title.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "default_list_title must not be blank".to_string(),
                ));
            }
            if title.trim().chars().count() > self.max_title_chars {
                return Err(ConfigError::Invalid(format!(
                    "default_list_title must be at most {} characters",
                    self.max_title_chars
                )));
            }
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, HierarchyConfig};
    use std::time::Duration;

    #[test]
    fn empty_document_yields_defaults() {
        let config = HierarchyConfig::from_json_str("{}").unwrap();
        assert_eq!(config, HierarchyConfig::default());
        assert_eq!(config.lock_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config = HierarchyConfig::from_json_str(
            r#"{"renumber_stride": 1024, "default_list_title": "My First List"}"#,
        )
        .unwrap();
        assert_eq!(config.renumber_stride, 1024);
        assert_eq!(config.default_list_title.as_deref(), Some("My First List"));
        assert_eq!(config.max_lock_attempts, 3);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = HierarchyConfig::from_json_str(r#"{"lock_timeout_ms": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("lock_timeout_ms")));
    }

    #[test]
    fn unknown_field_is_a_parse_error() {
        let err = HierarchyConfig::from_json_str(r#"{"lock_timeout": 5}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kanban.json");
        std::fs::write(&path, r#"{"max_title_chars": 40}"#).unwrap();

        let config = HierarchyConfig::load(&path).unwrap();
        assert_eq!(config.max_title_chars, 40);

        let missing = HierarchyConfig::load(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_)));
    }

    #[test]
    fn default_list_title_longer_than_title_limit_is_rejected() {
        let err = HierarchyConfig::from_json_str(
            r#"{"max_title_chars": 5, "default_list_title": "Backlog items"}"#,
        )
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid(message) if message.contains("default_list_title"))
        );
    }

    #[test]
    fn oversized_stride_is_rejected() {
        let err = HierarchyConfig::from_json_str(r#"{"renumber_stride": 9223372036854775807}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("renumber_stride")));
        assert!(HierarchyConfig::from_json_str(r#"{"renumber_stride": 1048576}"#).is_ok());
    }
}
