//! Store and logging configuration.
//!
//! # Responsibility
//! - Hold the tunables callers pass when building a store or logger.
//! - Validate them up front so later formatting/arithmetic cannot fail on them.
//!
//! # Invariants
//! - A validated `StoreConfig` always yields a usable `FixedOffset` and a
//!   date format chrono can render.

use crate::export::csv::DEFAULT_CSV_DATE_FORMAT;
use crate::logging::default_log_level;
use chrono::format::{Item, StrftimeItems};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

const MAX_OFFSET_SECONDS: i32 = 24 * 60 * 60;

/// Tunables for a `ResponseStore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Offset from UTC used to find calendar month/year boundaries and to
    /// render export dates. `0` means boundaries fall on UTC midnight.
    pub utc_offset_seconds: i32,
    /// `strftime`-style pattern for the CSV date column.
    pub csv_date_format: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            utc_offset_seconds: 0,
            csv_date_format: DEFAULT_CSV_DATE_FORMAT.to_string(),
        }
    }
}

impl StoreConfig {
    /// Checks every field.
    ///
    /// # Errors
    /// - `OffsetOutOfRange` when the offset is not strictly within one day.
    /// - `EmptyDateFormat` / `InvalidDateFormat` for unusable CSV patterns.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.utc_offset()?;

        if self.csv_date_format.trim().is_empty() {
            return Err(ConfigError::EmptyDateFormat);
        }
        if StrftimeItems::new(&self.csv_date_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidDateFormat(self.csv_date_format.clone()));
        }

        Ok(())
    }

    /// Returns the configured calendar offset.
    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        if self.utc_offset_seconds.abs() >= MAX_OFFSET_SECONDS {
            return Err(ConfigError::OffsetOutOfRange(self.utc_offset_seconds));
        }
        FixedOffset::east_opt(self.utc_offset_seconds)
            .ok_or(ConfigError::OffsetOutOfRange(self.utc_offset_seconds))
    }
}

/// Logging bootstrap settings consumed by `init_logging`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of trace|debug|info|warn|error.
    pub level: String,
    /// Absolute directory for rolling log files.
    pub log_dir: String,
}

impl LoggingConfig {
    /// Uses the build-mode default level.
    pub fn new(log_dir: impl Into<String>) -> Self {
        Self {
            level: default_log_level().to_string(),
            log_dir: log_dir.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    OffsetOutOfRange(i32),
    EmptyDateFormat,
    InvalidDateFormat(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OffsetOutOfRange(seconds) => {
                write!(f, "utc offset {seconds}s must be within one day")
            }
            Self::EmptyDateFormat => write!(f, "csv date format cannot be empty"),
            Self::InvalidDateFormat(format) => write!(f, "invalid csv date format `{format}`"),
        }
    }
}

impl Error for ConfigError {}
