use std::fs;
use std::path::{Path, PathBuf};
use serde::Deserialize;
use crate::core::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site_path: PathBuf,                // index status file lives under <site>/index

    // Query limits
    pub default_query_limit: usize,        // used when the caller gives no limit
    pub max_query_limit: usize,            // hard cap of the index backend

    // Reindexing
    pub batch_threads: usize,              // workers for full reindex
    pub reindex_threads: usize,            // workers for async stale self-healing
    pub auto_reindex_if_stale: bool,
    pub online_reindex: bool,              // build a new schema version while serving the old one

    pub entity_cache_size: usize,          // 0 disables the read-through cache
}

impl Default for Config {
    fn default() -> Self {
        Config {
            site_path: PathBuf::from("./site"),
            default_query_limit: 500,
            max_query_limit: 10_000,
            batch_threads: num_cpus::get(),
            reindex_threads: 2,
            auto_reindex_if_stale: true,
            online_reindex: true,
            entity_cache_size: 1024,
        }
    }
}

impl Config {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.site_path.join("index")
    }
}
