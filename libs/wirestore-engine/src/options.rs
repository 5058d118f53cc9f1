use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use wirestore_api::config::ConfigValues;
use wirestore_api::{IdentifierSanitizer, StoreError};

use crate::error::EngineError;
use crate::params::{
    CLEANUP_RATE_SECS, CLEANUP_SCHEDULE, DEFAULT_CLEANUP_RATE_SECS, DEFAULT_RECORDS_TO_KEEP,
    DEFAULT_TABLE_PREFIX, RECORDS_TO_KEEP, TABLE_NAME, TABLE_PREFIX,
};

/// How often retention runs per arming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupSchedule {
    /// One delayed run each time options are applied.
    #[default]
    Once,
    /// Run every `cleanup_rate` until re-armed or shut down.
    Recurring,
}

impl FromStr for CleanupSchedule {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "once" => Ok(CleanupSchedule::Once),
            "recurring" => Ok(CleanupSchedule::Recurring),
            other => Err(EngineError::Config(format!(
                "parameter '{CLEANUP_SCHEDULE}': expected \"once\" or \"recurring\", got \"{other}\""
            ))),
        }
    }
}

impl fmt::Display for CleanupSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupSchedule::Once => f.write_str("once"),
            CleanupSchedule::Recurring => f.write_str("recurring"),
        }
    }
}

/// Immutable options snapshot. Replaced wholesale on reconfiguration.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreOptions {
    pub table_name: String,
    pub table_prefix: String,
    /// Zero disables retention.
    pub cleanup_rate: Duration,
    /// Zero truncates the table on each run.
    pub records_to_keep: u64,
    pub cleanup_schedule: CleanupSchedule,
}

impl StoreOptions {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
            cleanup_rate: Duration::from_secs(DEFAULT_CLEANUP_RATE_SECS),
            records_to_keep: DEFAULT_RECORDS_TO_KEEP,
            cleanup_schedule: CleanupSchedule::Once,
        }
    }

    /// Build from validated config values (see `params::store_values`).
    pub fn from_values(values: &ConfigValues) -> Result<Self, EngineError> {
        let missing = |name: &str| EngineError::Config(format!("parameter '{name}' is not set"));
        Ok(Self {
            table_name: values
                .get_str(TABLE_NAME)
                .ok_or_else(|| missing(TABLE_NAME))?
                .to_string(),
            table_prefix: values
                .get_str(TABLE_PREFIX)
                .ok_or_else(|| missing(TABLE_PREFIX))?
                .to_string(),
            cleanup_rate: Duration::from_secs(
                values
                    .get_u64(CLEANUP_RATE_SECS)
                    .ok_or_else(|| missing(CLEANUP_RATE_SECS))?,
            ),
            records_to_keep: values
                .get_u64(RECORDS_TO_KEEP)
                .ok_or_else(|| missing(RECORDS_TO_KEEP))?,
            cleanup_schedule: values
                .get_str(CLEANUP_SCHEDULE)
                .ok_or_else(|| missing(CLEANUP_SCHEDULE))?
                .parse()?,
        })
    }

    /// Sanitized, prefixed table name.
    ///
    /// Fails with a precondition error when the configured name is blank.
    pub fn qualified_table(&self, sanitizer: &dyn IdentifierSanitizer) -> Result<String, StoreError> {
        let name = self.table_name.trim();
        if name.is_empty() {
            return Err(StoreError::precondition("table name must not be empty"));
        }
        Ok(sanitizer.sanitize(&format!("{}{}", self.table_prefix, name)))
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    pub fn with_cleanup_rate(mut self, rate: Duration) -> Self {
        self.cleanup_rate = rate;
        self
    }

    pub fn with_records_to_keep(mut self, keep: u64) -> Self {
        self.records_to_keep = keep;
        self
    }

    pub fn with_schedule(mut self, schedule: CleanupSchedule) -> Self {
        self.cleanup_schedule = schedule;
        self
    }
}
