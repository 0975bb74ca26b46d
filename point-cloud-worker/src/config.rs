/// Worker configuration.
use constants::processing::POINT_CHUNK_SIZE;
use constants::storage::{
    DEFAULT_CHUNK_CACHE_MAX_ENTRIES, DEFAULT_CHUNK_CACHE_TTL_MINUTES, DEFAULT_RESULT_BUCKET,
    DEFAULT_STORAGE_ROOT,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_STORAGE_ROOT: &str = "LIDAR_STORAGE_ROOT";
pub const ENV_RESULT_BUCKET: &str = "LIDAR_RESULT_BUCKET";
pub const ENV_CHUNKING_TTL_MINUTES: &str = "LIDAR_CHUNKING_TTL_MINUTES";
pub const ENV_POINT_CHUNK_SIZE: &str = "LIDAR_POINT_CHUNK_SIZE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("{var}={value} is not a valid value")]
    InvalidOverride { var: String, value: String },

    #[error("{field} {message}")]
    ValidationFailed { field: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one sub-directory per bucket
    pub root: PathBuf,
    /// Bucket receiving cell tables and comparison results
    pub bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            bucket: DEFAULT_RESULT_BUCKET.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_minutes: u64,
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: DEFAULT_CHUNK_CACHE_TTL_MINUTES,
            max_entries: DEFAULT_CHUNK_CACHE_MAX_ENTRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Points per streamed chunk
    pub point_chunk_size: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            point_chunk_size: POINT_CHUNK_SIZE,
        }
    }
}

/// Worker settings, resolved highest priority first from `LIDAR_*` environment
/// variables, the TOML file passed with `--config`, then compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub processing: ProcessingConfig,
}

impl WorkerConfig {
    /// Load the optional file, then apply environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<string>".to_string(),
            message: e.to_string(),
        })
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(root) = lookup(ENV_STORAGE_ROOT) {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(bucket) = lookup(ENV_RESULT_BUCKET) {
            self.storage.bucket = bucket;
        }
        if let Some(value) = lookup(ENV_CHUNKING_TTL_MINUTES) {
            self.cache.ttl_minutes = parse_override(ENV_CHUNKING_TTL_MINUTES, &value)?;
        }
        if let Some(value) = lookup(ENV_POINT_CHUNK_SIZE) {
            self.processing.point_chunk_size = parse_override(ENV_POINT_CHUNK_SIZE, &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.point_chunk_size == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "processing.point_chunk_size".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.cache.ttl_minutes == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "cache.ttl_minutes".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.storage.bucket.is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "storage.bucket".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_minutes * 60)
    }
}

fn parse_override<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride {
            var: var.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = WorkerConfig::from_toml("[cache]\nttl_minutes = 5\n").unwrap();
        assert_eq!(config.cache.ttl_minutes, 5);
        assert_eq!(config.cache.max_entries, DEFAULT_CHUNK_CACHE_MAX_ENTRIES);
        assert_eq!(config.storage.bucket, "basebucket");
        assert_eq!(config.processing.point_chunk_size, 500_000);
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            (ENV_RESULT_BUCKET, "results"),
            (ENV_POINT_CHUNK_SIZE, "1000"),
        ]
        .into_iter()
        .collect();
        let mut config = WorkerConfig::from_toml("[storage]\nbucket = \"other\"\n").unwrap();
        config
            .apply_overrides(|var| env.get(var).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.storage.bucket, "results");
        assert_eq!(config.processing.point_chunk_size, 1000);
    }

    #[test]
    fn non_numeric_override_is_rejected() {
        let mut config = WorkerConfig::default();
        let err = config
            .apply_overrides(|var| (var == ENV_CHUNKING_TTL_MINUTES).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
    }

    #[test]
    fn zero_chunk_size_fails_validation() {
        let config = WorkerConfig::from_toml("[processing]\npoint_chunk_size = 0\n").unwrap();
        assert!(config.validate().is_err());
        assert!(WorkerConfig::from_toml("[cache\n").is_err());
    }
}
