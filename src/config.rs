//! Run configuration.
//!
//! A [`PipelineConfig`] is built once and handed to the [`Runner`](crate::runner::Runner);
//! there is no process-wide state. Sources, in increasing priority:
//! built-in defaults, an optional JSON file, environment variables.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_CONFIG: &str = "INCIDENT_ETL_CONFIG";
pub const ENV_SOURCE: &str = "INCIDENT_ETL_SOURCE";
pub const ENV_DEST: &str = "INCIDENT_ETL_DEST";
pub const ENV_STRATEGY: &str = "INCIDENT_ETL_STRATEGY";

/// Which ingestor a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStrategy {
    /// Whole-file read with type inference (alias `a`).
    Bulk,
    /// Streaming, schema-constrained, row-tolerant read (alias `b`).
    #[default]
    Streaming,
}

impl FromStr for IngestionStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bulk" | "a" => Ok(Self::Bulk),
            "streaming" | "b" => Ok(Self::Streaming),
            other => bail!("unknown ingestion strategy `{other}` (expected bulk|streaming)"),
        }
    }
}

/// Tuning knobs of the streaming reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingOptions {
    /// Rows parsed together as one parallel block.
    pub block_rows: usize,
    /// Parse blocks on the rayon pool.
    pub use_threads: bool,
    /// Dedicated pool size; `None` uses the global pool.
    pub threads: Option<usize>,
}

impl Default for StreamingOptions {
    fn default() -> Self {
        Self {
            block_rows: 64 * 1024,
            use_threads: true,
            threads: None,
        }
    }
}

impl StreamingOptions {
    /// Threads that will parse blocks: 1 when threading is off, otherwise
    /// `threads` or the number of logical CPUs.
    #[must_use]
    pub fn worker_threads(&self) -> usize {
        if self.use_threads {
            self.threads.unwrap_or_else(num_cpus::get).max(1)
        } else {
            1
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Gzip-compressed CSV input.
    pub source_path: PathBuf,
    /// Parquet output, replaced on every successful run.
    pub dest_path: PathBuf,
    pub strategy: IngestionStrategy,
    pub streaming: StreamingOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from("./data/data.csv.tar.gz"),
            dest_path: PathBuf::from("./output/processed.parquet"),
            strategy: IngestionStrategy::default(),
            streaming: StreamingOptions::default(),
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn new(
        source_path: impl Into<PathBuf>,
        dest_path: impl Into<PathBuf>,
        strategy: IngestionStrategy,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            dest_path: dest_path.into(),
            strategy,
            streaming: StreamingOptions::default(),
        }
    }

    #[must_use]
    pub fn with_streaming(mut self, streaming: StreamingOptions) -> Self {
        self.streaming = streaming;
        self
    }

    /// Load a JSON config; omitted keys keep their defaults.
    ///
    /// # Errors
    /// Fails when the file cannot be opened or is not valid JSON for this shape.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse config {}", path.display()))
    }

    /// Defaults, then the file named by `INCIDENT_ETL_CONFIG`, then the
    /// individual `INCIDENT_ETL_*` overrides.
    ///
    /// # Errors
    /// Fails on an unreadable config file or an unknown strategy name.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable lookup.
    ///
    /// # Errors
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = match lookup(ENV_CONFIG) {
            Some(path) => Self::from_json_file(&path)?,
            None => Self::default(),
        };
        if let Some(source) = lookup(ENV_SOURCE) {
            cfg.source_path = source.into();
        }
        if let Some(dest) = lookup(ENV_DEST) {
            cfg.dest_path = dest.into();
        }
        if let Some(strategy) = lookup(ENV_STRATEGY) {
            cfg.strategy = strategy
                .parse()
                .with_context(|| format!("read {ENV_STRATEGY}"))?;
        }
        Ok(cfg)
    }
}
