//! Configuration for the value cache
//!
//! Plain serde-backed configuration with sensible defaults matching the
//! monitoring-server workload: a day of demand memory, a day of idle
//! tolerance, small initial per-item buffers that grow under load.

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Hard upper bound on a single item's ring buffer capacity
pub const MAX_BUFFER_CAPACITY: usize = 1_000_000;

/// Tolerated clock skew for incoming samples, in seconds
pub const MAX_TIMESTAMP_AHEAD: u32 = 300;

/// Cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Total memory budget for cached payloads and buffer slots, in bytes
    #[serde(default = "default_mem_limit")]
    pub mem_limit_bytes: usize,

    /// Ring buffer capacity for a freshly created item
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,

    /// Seconds a committed demand figure stays authoritative before the
    /// provisional figure replaces it
    #[serde(default = "default_demand_update_interval")]
    pub demand_update_interval: u32,

    /// Seconds an item may go unaccessed before housekeeping evicts it
    #[serde(default = "default_max_idle")]
    pub max_idle: u32,

    /// Buffer growth factor in percent applied when demand forbids eviction
    #[serde(default = "default_grow_percent")]
    pub grow_percent: usize,

    /// Minimum number of slots a grow step adds
    #[serde(default = "default_min_grow")]
    pub min_grow: usize,
}

fn default_mem_limit() -> usize {
    256 * 1024 * 1024
}
fn default_initial_capacity() -> usize {
    10
}
fn default_demand_update_interval() -> u32 {
    86_400
}
fn default_max_idle() -> u32 {
    86_400
}
fn default_grow_percent() -> usize {
    120
}
fn default_min_grow() -> usize {
    8
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mem_limit_bytes: default_mem_limit(),
            initial_capacity: default_initial_capacity(),
            demand_update_interval: default_demand_update_interval(),
            max_idle: default_max_idle(),
            grow_percent: default_grow_percent(),
            min_grow: default_min_grow(),
        }
    }
}

impl CacheConfig {
    /// Set the memory budget in bytes
    pub fn with_mem_limit(mut self, bytes: usize) -> Self {
        self.mem_limit_bytes = bytes;
        self
    }

    /// Set the initial per-item buffer capacity
    pub fn with_initial_capacity(mut self, slots: usize) -> Self {
        self.initial_capacity = slots;
        self
    }

    /// Set the demand renewal interval in seconds
    pub fn with_demand_update_interval(mut self, seconds: u32) -> Self {
        self.demand_update_interval = seconds;
        self
    }

    /// Set the housekeeping idle threshold in seconds
    pub fn with_max_idle(mut self, seconds: u32) -> Self {
        self.max_idle = seconds;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.initial_capacity == 0 {
            return Err(CacheError::Configuration(
                "initial_capacity must be > 0".to_string(),
            ));
        }
        if self.initial_capacity > MAX_BUFFER_CAPACITY {
            return Err(CacheError::Configuration(format!(
                "initial_capacity cannot exceed {}",
                MAX_BUFFER_CAPACITY
            )));
        }
        if self.grow_percent <= 100 {
            return Err(CacheError::Configuration(
                "grow_percent must be > 100".to_string(),
            ));
        }
        if self.mem_limit_bytes == 0 {
            return Err(CacheError::Configuration(
                "mem_limit_bytes must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Capacity a full buffer grows to when eviction is not allowed
    pub fn grow_target(&self, current: usize) -> usize {
        let mut new_size = current * self.grow_percent / 100;
        if new_size - current < self.min_grow {
            new_size = current + self.min_grow;
        }
        new_size.min(MAX_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.initial_capacity, 10);
        assert_eq!(config.demand_update_interval, 86_400);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = CacheConfig::default().with_initial_capacity(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_grow_target_uses_percent_with_minimum_step() {
        let config = CacheConfig::default();
        // 20% of 10 is 2, below the minimum step of 8
        assert_eq!(config.grow_target(10), 18);
        // 20% of 100 is 20, above the minimum step
        assert_eq!(config.grow_target(100), 120);
        // capped at the hard maximum
        assert_eq!(config.grow_target(MAX_BUFFER_CAPACITY), MAX_BUFFER_CAPACITY);
    }
}
