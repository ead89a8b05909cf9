use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Rows accumulated before a bulk write (corpus load and assign).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Terms stored per topic on `model create` unless overridden with
    /// `-N`. No upper cap is applied: large values trade retrieval
    /// simplicity for storage bloat.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Minimum percentage-point delta between two progress reports.
    #[serde(default = "default_progress_margin")]
    pub progress_margin: f64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            top_n: default_top_n(),
            progress_margin: default_progress_margin(),
        }
    }
}

fn default_batch_size() -> usize {
    10_000
}
fn default_top_n() -> usize {
    50
}
fn default_progress_margin() -> f64 {
    1.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
    /// bm25 weight of the title column; titles outrank abstracts.
    #[serde(default = "default_title_weight")]
    pub title_weight: f64,
    #[serde(default = "default_abstract_weight")]
    pub abstract_weight: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            final_limit: default_final_limit(),
            title_weight: default_title_weight(),
            abstract_weight: default_abstract_weight(),
        }
    }
}

fn default_final_limit() -> i64 {
    12
}
fn default_title_weight() -> f64 {
    4.0
}
fn default_abstract_weight() -> f64 {
    1.0
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.ingest.batch_size == 0 {
        anyhow::bail!("ingest.batch_size must be > 0");
    }

    if config.ingest.top_n < 1 {
        anyhow::bail!("ingest.top_n must be >= 1");
    }

    if !(0.0..=100.0).contains(&config.ingest.progress_margin) {
        anyhow::bail!("ingest.progress_margin must be in [0.0, 100.0]");
    }

    if config.search.final_limit < 1 {
        anyhow::bail!("search.final_limit must be >= 1");
    }

    if config.search.title_weight <= 0.0 || config.search.abstract_weight <= 0.0 {
        anyhow::bail!("search.title_weight and search.abstract_weight must be > 0");
    }

    Ok(config)
}
