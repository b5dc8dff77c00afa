//! World configuration
//!
//! The only tunables of the runtime: the initial row capacity of archetype
//! columns and the size classes of the column buffer pool. Both can be loaded
//! from JSON; missing fields fall back to defaults.

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, Result};

/// Default initial column capacity
pub const DEFAULT_ARCHETYPE_CAPACITY: usize = 64;

/// Column buffer pool tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Smallest standard size class (rows)
    pub min_standard_size: usize,
    /// Largest standard size class; bigger requests round to the next power of two
    pub max_standard_size: usize,
    /// Free buffers kept per (layout, size class)
    pub max_retained_per_class: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_standard_size: 8,
            max_standard_size: 4096,
            max_retained_per_class: 8,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.min_standard_size.is_power_of_two() {
            return Err(EcsError::InvalidConfig(format!(
                "pool.min_standard_size must be a power of two, got {}",
                self.min_standard_size
            )));
        }
        if !self.max_standard_size.is_power_of_two() {
            return Err(EcsError::InvalidConfig(format!(
                "pool.max_standard_size must be a power of two, got {}",
                self.max_standard_size
            )));
        }
        if self.min_standard_size > self.max_standard_size {
            return Err(EcsError::InvalidConfig(format!(
                "pool.min_standard_size ({}) exceeds pool.max_standard_size ({})",
                self.min_standard_size, self.max_standard_size
            )));
        }
        Ok(())
    }

    /// Standard size classes, smallest first
    pub fn standard_sizes(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(self.min_standard_size), |&size| size.checked_mul(2))
            .take_while(|&size| size <= self.max_standard_size)
    }

    /// Round a requested row count up to its size class
    pub fn size_class(&self, requested: usize) -> usize {
        if requested <= self.min_standard_size {
            self.min_standard_size
        } else {
            requested.checked_next_power_of_two().unwrap_or(requested)
        }
    }

    /// True if buffers of this class are kept for reuse
    pub fn is_standard(&self, class: usize) -> bool {
        class >= self.min_standard_size && class <= self.max_standard_size
    }
}

/// World construction settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Rows reserved in every column of a new archetype
    pub archetype_initial_capacity: usize,
    pub pool: PoolConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            archetype_initial_capacity: DEFAULT_ARCHETYPE_CAPACITY,
            pool: PoolConfig::default(),
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<()> {
        if self.archetype_initial_capacity == 0 {
            return Err(EcsError::InvalidConfig(
                "archetype_initial_capacity must be at least 1".to_string(),
            ));
        }
        self.pool.validate()
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: WorldConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorldConfig::default();
        assert_eq!(config.archetype_initial_capacity, 64);
        assert_eq!(
            config.pool.standard_sizes().collect::<Vec<_>>(),
            vec![8, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096]
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_size_classes() {
        let pool = PoolConfig::default();
        assert_eq!(pool.size_class(1), 8);
        assert_eq!(pool.size_class(64), 64);
        assert_eq!(pool.size_class(65), 128);
        assert_eq!(pool.size_class(5000), 8192);
        assert!(pool.is_standard(4096));
        assert!(!pool.is_standard(8192));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = WorldConfig::from_json_str(r#"{ "archetype_initial_capacity": 16 }"#).unwrap();
        assert_eq!(config.archetype_initial_capacity, 16);
        assert_eq!(config.pool, PoolConfig::default());

        let round_trip = WorldConfig::from_json_str(&config.to_json_string().unwrap()).unwrap();
        assert_eq!(round_trip, config);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(matches!(
            WorldConfig::from_json_str(r#"{ "archetype_initial_capacity": 0 }"#),
            Err(EcsError::InvalidConfig(_))
        ));
        assert!(matches!(
            WorldConfig::from_json_str(r#"{ "pool": { "min_standard_size": 12 } }"#),
            Err(EcsError::InvalidConfig(_))
        ));
        assert!(matches!(
            WorldConfig::from_json_str("not json"),
            Err(EcsError::ConfigParse(_))
        ));
    }
}
