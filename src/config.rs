//! # Engine Configuration
//!
//! Tunables for one engine instance, loadable from JSON. Every field has a
//! default, so a config file only needs the keys it changes.
//!
//! | Key | Default | Meaning |
//! |-----|---------|---------|
//! | `workers` | min(32, cpus + 4) | fill worker pool size |
//! | `batch_size` | 20 | cell writes per writer request |
//! | `write_timeout_ms` | 30000 | bound on any single document call |
//! | `cache_ttl_secs` | 3600 | default cache entry lifetime |
//! | `cache_max_entries` | 1000 | in-memory cache capacity |
//! | `compress_threshold` | 4096 | cache values this large are deflated |
//! | `output_dir` | `.` | where finished documents go |
//! | `output_prefix` | `DISENO_SOLUCION_` | output file name prefix |
//! | `output_extension` | `.xlsx` | output file name extension |
//! | `min_template_size` | 1000 | smallest plausible template, in bytes |
//!
//! ```
//! use cellfill::config::EngineConfig;
//!
//! let config: EngineConfig = serde_json::from_str(r#"{"batch_size": 1}"#)?;
//! assert_eq!(config.batch_size, 1);
//! assert_eq!(config.output_prefix, "DISENO_SOLUCION_");
//! # Ok::<(), serde_json::Error>(())
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{Cache, DEFAULT_COMPRESS_THRESHOLD, DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
use crate::error::CellfillError;
use crate::fill::{DEFAULT_BATCH_SIZE, FillOptions, default_workers};
use crate::mapping::presets;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub workers: usize,
    pub batch_size: usize,
    pub write_timeout_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
    pub compress_threshold: usize,
    pub output_dir: PathBuf,
    pub output_prefix: String,
    pub output_extension: String,
    pub min_template_size: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: DEFAULT_BATCH_SIZE,
            write_timeout_ms: 30_000,
            cache_ttl_secs: DEFAULT_TTL.as_secs(),
            cache_max_entries: DEFAULT_MAX_ENTRIES,
            compress_threshold: DEFAULT_COMPRESS_THRESHOLD,
            output_dir: PathBuf::from("."),
            output_prefix: presets::OUTPUT_PREFIX.to_string(),
            output_extension: ".xlsx".to_string(),
            min_template_size: 1000,
        }
    }
}

impl EngineConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CellfillError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CellfillError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| CellfillError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CellfillError> {
        let fail = |msg: &str| Err(CellfillError::Config(msg.to_string()));
        if self.workers == 0 {
            return fail("workers must be at least 1");
        }
        if self.batch_size == 0 {
            return fail("batch_size must be at least 1");
        }
        if self.write_timeout_ms == 0 {
            return fail("write_timeout_ms must be positive");
        }
        if self.cache_max_entries == 0 {
            return fail("cache_max_entries must be at least 1");
        }
        if self.output_prefix.contains(['/', '\\']) {
            return fail("output_prefix must not contain path separators");
        }
        if !self.output_extension.starts_with('.') || self.output_extension.contains(['/', '\\']) {
            return fail("output_extension must look like \".xlsx\"");
        }
        Ok(())
    }

    pub fn fill_options(&self) -> FillOptions {
        FillOptions {
            workers: self.workers,
            batch_size: self.batch_size,
        }
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// In-memory cache sized and tuned by this config.
    pub fn build_cache(&self) -> Cache {
        Cache::in_memory(self.cache_max_entries).configured(self.cache_ttl(), self.compress_threshold)
    }
}
