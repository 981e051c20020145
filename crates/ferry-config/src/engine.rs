//! Pipeline sizing.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

const fn default_channel_capacity() -> usize {
    256
}

const fn default_load_concurrency() -> usize {
    4
}

const fn default_page_size() -> u32 {
    100
}

const fn default_checkpoint_batch_size() -> usize {
    50
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Capacity of each bounded channel between pipeline stages.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Number of destination writes in flight at once.
    #[serde(default = "default_load_concurrency")]
    pub load_concurrency: usize,

    /// Rows requested per source page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Maximum outcomes persisted per checkpoint transaction.
    #[serde(default = "default_checkpoint_batch_size")]
    pub checkpoint_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            load_concurrency: default_load_concurrency(),
            page_size: default_page_size(),
            checkpoint_batch_size: default_checkpoint_batch_size(),
        }
    }
}

impl EngineConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::invalid("engine.channel_capacity", "must be at least 1"));
        }
        if self.load_concurrency == 0 {
            return Err(ConfigError::invalid("engine.load_concurrency", "must be at least 1"));
        }
        if self.page_size == 0 {
            return Err(ConfigError::invalid("engine.page_size", "must be at least 1"));
        }
        if self.checkpoint_batch_size == 0 {
            return Err(ConfigError::invalid(
                "engine.checkpoint_batch_size",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}
