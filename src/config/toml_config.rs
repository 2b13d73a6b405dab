use crate::core::refresh::DEFAULT_TIMEOUT;
use crate::core::variant_filter::VariantFilter;
use crate::domain::model::{Mode, SelectionType};
use crate::utils::error::{Result, SelectorError};
use crate::utils::validation::{validate_range, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

const MAX_TIMEOUT_SECONDS: u64 = 600;
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub refresh: RefreshConfig,
    pub filter: VariantFilter,
    pub selection: SelectionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub packages_timeout_seconds: u64,
    pub clear_cache_timeout_seconds: u64,
    pub definitions_timeout_seconds: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        let seconds = DEFAULT_TIMEOUT.as_secs();
        Self {
            packages_timeout_seconds: seconds,
            clear_cache_timeout_seconds: seconds,
            definitions_timeout_seconds: seconds,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub selection_type: SelectionType,
    /// Overrides the package service's own mode when set.
    pub mode: Option<Mode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Replaces `${VAR}` with the value of the environment variable, leaving
/// unknown variables as written.
pub(crate) fn substitute_env_vars(content: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([^}]+)\}").expect("environment variable pattern is valid")
    });

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    })
    .into_owned()
}

impl SelectorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(SelectorError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content);
        toml::from_str(&processed).map_err(|e| SelectorError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    pub fn packages_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh.packages_timeout_seconds)
    }

    pub fn clear_cache_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh.clear_cache_timeout_seconds)
    }

    pub fn definitions_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh.definitions_timeout_seconds)
    }
}

impl Validate for SelectorConfig {
    fn validate(&self) -> Result<()> {
        let timeouts = [
            ("refresh.packages_timeout_seconds", self.refresh.packages_timeout_seconds),
            ("refresh.clear_cache_timeout_seconds", self.refresh.clear_cache_timeout_seconds),
            ("refresh.definitions_timeout_seconds", self.refresh.definitions_timeout_seconds),
        ];
        for (field, value) in timeouts {
            validate_range(field, value, 1, MAX_TIMEOUT_SECONDS)?;
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(SelectorError::InvalidConfigValueError {
                field: "logging.level".to_string(),
                value: self.logging.level.clone(),
                reason: format!("Valid levels: {}", LOG_LEVELS.join(", ")),
            });
        }
        Ok(())
    }
}
