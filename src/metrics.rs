//! Per-run metrics: stage timings and row/column counters.
//!
//! A [`RunMetrics`] is filled from the same [`RunEvent`]s the observer sees
//! and returned with every [`RunOutcome`](crate::runner::RunOutcome). It can
//! be exported as JSON.
//!
//! # Example
//!
//! ```no_run
//! use incident_etl::{PipelineConfig, Runner};
//!
//! # fn main() -> anyhow::Result<()> {
//! let outcome = Runner::new(PipelineConfig::default()).run();
//! outcome.metrics.log_summary();
//! outcome.metrics.save_to_file("metrics.json")?;
//! # Ok(())
//! # }
//! ```

use crate::observer::RunEvent;
use crate::runner::Stage;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

pub const ROWS_IN: &str = "rows_in";
pub const COLUMNS_IN: &str = "columns_in";
pub const ROWS_SKIPPED: &str = "rows_skipped";
pub const ROWS_OUT: &str = "rows_out";
pub const COLUMNS_OUT: &str = "columns_out";
pub const ROWS_WRITTEN: &str = "rows_written";

/// Wall-clock entry and exit of one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunMetrics {
    stages: Vec<StageTiming>,
    counters: BTreeMap<String, u64>,
    total_secs: Option<f64>,
}

impl RunMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the metrics.
    pub fn apply(&mut self, event: &RunEvent) {
        match event {
            RunEvent::StageFinished {
                stage,
                started_at,
                finished_at,
                elapsed,
            } => self.stages.push(StageTiming {
                stage: *stage,
                started_at: *started_at,
                finished_at: *finished_at,
                elapsed_secs: elapsed.as_secs_f64(),
            }),
            RunEvent::TableShape {
                stage,
                rows,
                columns,
            } => {
                let (rows_key, cols_key) = match stage {
                    Stage::Reading => (ROWS_IN, Some(COLUMNS_IN)),
                    Stage::Transforming => (ROWS_OUT, Some(COLUMNS_OUT)),
                    Stage::Writing => (ROWS_WRITTEN, None),
                };
                self.set_counter(rows_key, *rows as u64);
                if let Some(key) = cols_key {
                    self.set_counter(key, *columns as u64);
                }
            }
            RunEvent::RowsSkipped { count, .. } => self.increment_counter(ROWS_SKIPPED, *count as u64),
            RunEvent::RunFinished { elapsed, .. } => self.total_secs = Some(elapsed.as_secs_f64()),
            RunEvent::RunStarted { .. } | RunEvent::StageStarted { .. } | RunEvent::StageFailed { .. } => {}
        }
    }

    pub fn set_counter(&mut self, name: &str, value: u64) {
        self.counters.insert(name.to_string(), value);
    }

    pub fn increment_counter(&mut self, name: &str, value: u64) {
        *self.counters.entry(name.to_string()).or_insert(0) += value;
    }

    #[must_use]
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    #[must_use]
    pub fn stages(&self) -> &[StageTiming] {
        &self.stages
    }

    #[must_use]
    pub fn stage_elapsed(&self, stage: Stage) -> Option<Duration> {
        self.stages
            .iter()
            .find(|t| t.stage == stage)
            .map(|t| Duration::from_secs_f64(t.elapsed_secs))
    }

    #[must_use]
    pub fn total(&self) -> Option<Duration> {
        self.total_secs.map(Duration::from_secs_f64)
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| json!({ "error": e.to_string() }))
    }

    /// Log every timing and counter at info level.
    pub fn log_summary(&self) {
        if let Some(total) = self.total_secs {
            info!("Execution time: {total:.3}s");
        }
        for t in &self.stages {
            info!("  {}: {:.3}s", t.stage, t.elapsed_secs);
        }
        for (name, value) in &self.counters {
            info!("  {name}: {value}");
        }
    }

    /// Save the metrics as pretty-printed JSON.
    ///
    /// # Errors
    /// Fails when the file cannot be created or written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let formatted = serde_json::to_string_pretty(self).context("serialize metrics")?;
        let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        file.write_all(formatted.as_bytes())
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}
