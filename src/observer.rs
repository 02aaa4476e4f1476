//! Structured run events and the observers that receive them.
//!
//! The [`Runner`](crate::runner::Runner) emits a [`RunEvent`] for every state
//! change. [`LogObserver`] renders them through the `log` facade;
//! [`RecordingObserver`] keeps them in memory for inspection.

use crate::error::ErrorKind;
use crate::io::csv::SkippedRow;
use crate::runner::{RunState, Stage};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// One notification from a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    RunStarted {
        ingestor: &'static str,
        source: PathBuf,
        dest: PathBuf,
    },
    StageStarted {
        stage: Stage,
        at: DateTime<Utc>,
    },
    /// Emitted when a stage exits, whether it succeeded or not.
    StageFinished {
        stage: Stage,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        elapsed: Duration,
    },
    /// Shape of the table a stage produced.
    TableShape {
        stage: Stage,
        rows: usize,
        columns: usize,
    },
    RowsSkipped {
        count: usize,
        samples: Vec<SkippedRow>,
    },
    StageFailed {
        stage: Stage,
        kind: ErrorKind,
        message: String,
        /// The error with its full cause chain.
        report: String,
    },
    RunFinished {
        state: RunState,
        elapsed: Duration,
    },
}

/// Receives run events. Implementations must not panic.
pub trait Observer: Send + Sync {
    fn notify(&self, event: &RunEvent);
}

/// Writes every event to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn notify(&self, event: &RunEvent) {
        match event {
            RunEvent::RunStarted {
                ingestor,
                source,
                dest,
            } => info!(
                "Pipeline ({ingestor}) - Start: {} -> {}",
                source.display(),
                dest.display()
            ),
            RunEvent::StageStarted { stage, .. } => debug!("{stage} started"),
            RunEvent::StageFinished { stage, elapsed, .. } => {
                debug!("{stage} time: {} sec.", elapsed.as_secs_f64());
            }
            RunEvent::TableShape {
                stage,
                rows,
                columns,
            } => match stage {
                Stage::Reading => debug!("Input has {rows} rows and {columns} columns."),
                Stage::Transforming => debug!("Output has {rows} rows and {columns} columns."),
                Stage::Writing => debug!("Wrote {rows} rows and {columns} columns."),
            },
            RunEvent::RowsSkipped { count, samples } => {
                warn!("Skipped {count} malformed rows");
                for s in samples {
                    warn!("  line {}: {}", s.line, s.reason);
                }
            }
            RunEvent::StageFailed {
                stage, kind, report, ..
            } => error!("Something bad happened while {stage} ({kind}): {report}"),
            RunEvent::RunFinished { state, elapsed } => {
                debug!("Total processing time: {} sec.", elapsed.as_secs_f64());
                info!("Pipeline - {state}");
            }
        }
    }
}

/// Keeps a copy of every event.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events seen so far.
    #[must_use]
    pub fn events(&self) -> Vec<RunEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Error kinds of all `StageFailed` events, in order.
    #[must_use]
    pub fn failures(&self) -> Vec<(Stage, ErrorKind)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RunEvent::StageFailed { stage, kind, .. } => Some((stage, kind)),
                _ => None,
            })
            .collect()
    }
}

impl Observer for RecordingObserver {
    fn notify(&self, event: &RunEvent) {
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event.clone());
    }
}
