use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{FbError, Result};

/// Canonical option key for the maximum allowed vertex parallelism.
pub const MAX_PARALLELISM_KEY: &str = "adaptive-batch-scheduler.max-parallelism";
/// Canonical option key for the minimum allowed vertex parallelism.
pub const MIN_PARALLELISM_KEY: &str = "adaptive-batch-scheduler.min-parallelism";
/// Canonical option key for the per-task data volume target.
pub const AVG_DATA_VOLUME_PER_TASK_KEY: &str = "adaptive-batch-scheduler.avg-data-volume-per-task";
/// Canonical option key for the default source vertex parallelism.
pub const DEFAULT_SOURCE_PARALLELISM_KEY: &str =
    "adaptive-batch-scheduler.default-source-parallelism";

/// Adaptive batch scheduler configuration shared across planning layers.
///
/// A validated snapshot of these values is copied into the parallelism
/// decider at construction; later mutation of an options source has no
/// effect on decisions already being made.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Lower bound for any decided vertex parallelism.
    pub min_parallelism: usize,
    /// Upper bound for any decided vertex parallelism.
    pub max_parallelism: usize,
    /// Target bytes a single downstream subtask should process.
    pub data_volume_per_task: u64,
    /// Parallelism used for source vertices without a user-fixed value.
    pub default_source_parallelism: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_parallelism: 1,
            max_parallelism: 128,
            data_volume_per_task: 1024 * 1024 * 1024, // 1GiB
            default_source_parallelism: 1,
        }
    }
}

impl SchedulerConfig {
    /// Build a configuration from canonical string options.
    ///
    /// Missing keys keep their defaults; unknown keys are ignored. The data
    /// volume accepts either plain bytes or a memory-size suffix (`64m`,
    /// `1g`, ...).
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(value) = options.get(MIN_PARALLELISM_KEY) {
            config.min_parallelism = parse_count(MIN_PARALLELISM_KEY, value)?;
        }
        if let Some(value) = options.get(MAX_PARALLELISM_KEY) {
            config.max_parallelism = parse_count(MAX_PARALLELISM_KEY, value)?;
        }
        if let Some(value) = options.get(AVG_DATA_VOLUME_PER_TASK_KEY) {
            config.data_volume_per_task = parse_memory_size(value)?;
        }
        if let Some(value) = options.get(DEFAULT_SOURCE_PARALLELISM_KEY) {
            config.default_source_parallelism = parse_count(DEFAULT_SOURCE_PARALLELISM_KEY, value)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration contracts enforced at decider construction.
    pub fn validate(&self) -> Result<()> {
        if self.min_parallelism == 0 {
            return Err(FbError::InvalidConfig(
                "the minimum parallelism must be larger than 0".to_string(),
            ));
        }
        if self.max_parallelism < self.min_parallelism {
            return Err(FbError::InvalidConfig(format!(
                "maximum parallelism {} must be greater than or equal to the minimum parallelism {}",
                self.max_parallelism, self.min_parallelism
            )));
        }
        if self.data_volume_per_task == 0 {
            return Err(FbError::InvalidConfig(
                "the data volume per task must be larger than 0".to_string(),
            ));
        }
        if self.default_source_parallelism == 0 {
            return Err(FbError::InvalidConfig(
                "the default source parallelism must be larger than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| FbError::InvalidConfig(format!("invalid value for '{key}': '{value}'")))
}

/// Parse a memory size with an optional unit suffix into bytes.
///
/// Accepted suffixes (case-insensitive): `b`, `k`/`kb`, `m`/`mb`, `g`/`gb`,
/// `t`/`tb`. A bare number is interpreted as bytes.
pub fn parse_memory_size(value: &str) -> Result<u64> {
    let normalized = value.trim().to_ascii_lowercase();
    let digits_end = normalized
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(normalized.len());
    let (digits, unit) = normalized.split_at(digits_end);
    let number = digits
        .parse::<u64>()
        .map_err(|_| FbError::InvalidConfig(format!("invalid memory size: '{value}'")))?;
    let multiplier: u64 = match unit.trim() {
        "" | "b" => 1,
        "k" | "kb" => 1024,
        "m" | "mb" => 1024 * 1024,
        "g" | "gb" => 1024 * 1024 * 1024,
        "t" | "tb" => 1024u64.pow(4),
        other => {
            return Err(FbError::InvalidConfig(format!(
                "unknown memory unit '{other}' in '{value}'"
            )));
        }
    };
    number
        .checked_mul(multiplier)
        .ok_or_else(|| FbError::InvalidConfig(format!("memory size overflows: '{value}'")))
}
