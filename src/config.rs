//! Configuration for range table databases.

use crate::error::{Error, Result};

/// Configuration handed to redb when a database is opened.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Page cache size in bytes.
    ///
    /// Range scans over hot hash keys stay in cache; larger values trade
    /// memory for fewer page reads. Must be greater than 0.
    pub cache_size: usize,
}

impl DbConfig {
    /// Creates a validated configuration.
    ///
    /// # Arguments
    /// * `cache_size` - Page cache size in bytes (must be > 0)
    pub fn new(cache_size: usize) -> Result<Self> {
        if cache_size == 0 {
            return Err(Error::InvalidConfig(
                "cache_size must be greater than 0".to_string(),
            ));
        }

        Ok(Self { cache_size })
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            cache_size: 64 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = DbConfig::new(1024).unwrap();
        assert_eq!(config.cache_size, 1024);
    }

    #[test]
    fn test_invalid_cache_size() {
        let config = DbConfig::new(0);
        assert!(matches!(config, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_default_config() {
        let config = DbConfig::default();
        assert_eq!(config.cache_size, 64 * 1024 * 1024);
    }
}
