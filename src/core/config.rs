//! Loader configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::LoadError;

/// Number of light sections a bitmask can address
const LIGHT_MASK_BITS: u32 = u64::BITS;

/// Configuration for holders, batching and the worker pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Changed positions per flush at or above which clients are told to
    /// skip their own light recompute. Chosen empirically.
    pub suppress_light_threshold: usize,
    /// Lowest vertical section coordinate of the world
    pub min_section: i32,
    /// Number of block sections in a chunk column
    pub section_count: u32,
    /// Threads in the generation worker pool
    pub worker_threads: usize,
    /// Maximum stage generations running at once
    pub max_concurrent_generations: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            suppress_light_threshold: 64,
            min_section: -4,
            section_count: 24,
            worker_threads: 2,
            max_concurrent_generations: 8,
        }
    }
}

impl LoadConfig {
    /// Load and validate a config from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path)?;
        let config: LoadConfig = serde_json::from_str(&text)?;
        config.validate()?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Check that the configured world fits the light bitmasks.
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.section_count == 0 {
            return Err(LoadError::InvalidConfig("section_count must be positive".into()));
        }
        if self.light_section_count() > LIGHT_MASK_BITS {
            return Err(LoadError::InvalidConfig(format!(
                "{} light sections do not fit a {}-bit mask",
                self.light_section_count(),
                LIGHT_MASK_BITS
            )));
        }
        if self.worker_threads == 0 || self.max_concurrent_generations == 0 {
            return Err(LoadError::InvalidConfig("worker counts must be positive".into()));
        }
        Ok(())
    }

    /// Light sections span one extra section above and below the world.
    pub fn light_section_count(&self) -> u32 {
        self.section_count + 2
    }

    /// Lowest light section coordinate
    pub fn min_light_section(&self) -> i32 {
        self.min_section - 1
    }

    /// Index of a block section coordinate, if it lies inside the world
    pub fn section_index(&self, section_y: i32) -> Option<usize> {
        let index = section_y - self.min_section;
        (index >= 0 && (index as u32) < self.section_count).then_some(index as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_is_valid() {
        let config = LoadConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.suppress_light_threshold, 64);
        assert_eq!(config.light_section_count(), 26);
    }

    #[test]
    fn test_section_index() {
        let config = LoadConfig::default();
        assert_eq!(config.section_index(-4), Some(0));
        assert_eq!(config.section_index(19), Some(23));
        assert_eq!(config.section_index(20), None);
        assert_eq!(config.section_index(-5), None);
    }

    #[test]
    fn test_from_json_file_partial() {
        let mut file = NamedTempFile::new().expect("failed to create temp file");
        write!(file, r#"{{ "suppress_light_threshold": 32, "worker_threads": 4 }}"#)
            .expect("write failed");

        let config = LoadConfig::from_json_file(file.path()).expect("load failed");
        assert_eq!(config.suppress_light_threshold, 32);
        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.section_count, 24);
    }

    #[test]
    fn test_rejects_oversized_world() {
        let mut file = NamedTempFile::new().expect("failed to create temp file");
        write!(file, r#"{{ "section_count": 63 }}"#).expect("write failed");

        let result = LoadConfig::from_json_file(file.path());
        assert!(matches!(result, Err(LoadError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let mut file = NamedTempFile::new().expect("failed to create temp file");
        write!(file, "not json").expect("write failed");

        let result = LoadConfig::from_json_file(file.path());
        assert!(matches!(result, Err(LoadError::Config(_))));
    }
}
