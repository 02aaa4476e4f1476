//! Run coordinator: reading, transforming and writing, strictly in sequence.
//!
//! ```text
//! Start -> Reading -> Transforming -> Writing -> Done
//!             \            |             /
//!              +------> Failed <--------+
//! ```
//!
//! Every stage is timed and reported to the [`Observer`]. A failing stage is
//! reported and ends the run in [`RunState::Failed`]; [`Runner::run`] itself
//! never returns an error, the outcome says what happened.

use crate::clock::{Clock, SystemClock};
use crate::config::PipelineConfig;
use crate::error::{EtlError, Result};
use crate::io::csv::{Ingestor, ingestor_for};
use crate::io::parquet::write_output;
use crate::metrics::RunMetrics;
use crate::observer::{LogObserver, Observer, RunEvent};
use crate::transform::transform;
use chrono::Utc;
use log::{Level, debug, log_enabled};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Rows shown in debug previews of the input table.
const PREVIEW_ROWS: usize = 10;

/// A working stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Reading,
    Transforming,
    Writing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reading => "reading",
            Self::Transforming => "transforming",
            Self::Writing => "writing",
        })
    }
}

/// States of the run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Start,
    Reading,
    Transforming,
    Writing,
    Done,
    Failed,
}

impl From<Stage> for RunState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Reading => Self::Reading,
            Stage::Transforming => Self::Transforming,
            Stage::Writing => Self::Writing,
        }
    }
}

impl RunState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "Start",
            Self::Reading => "Reading",
            Self::Transforming => "Transforming",
            Self::Writing => "Writing",
            Self::Done => "Done",
            Self::Failed => "Failed",
        })
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum RunStatus {
    Done { rows_written: usize },
    Failed { stage: Stage, error: EtlError },
}

/// Everything a caller learns from [`Runner::run`].
#[derive(Debug)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// States visited, in order, ending with `Done` or `Failed`.
    pub states: Vec<RunState>,
    pub metrics: RunMetrics,
}

impl RunOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Done { .. })
    }

    #[must_use]
    pub fn final_state(&self) -> RunState {
        match self.status {
            RunStatus::Done { .. } => RunState::Done,
            RunStatus::Failed { .. } => RunState::Failed,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&EtlError> {
        match &self.status {
            RunStatus::Failed { error, .. } => Some(error),
            RunStatus::Done { .. } => None,
        }
    }

    #[must_use]
    pub fn failed_stage(&self) -> Option<Stage> {
        match &self.status {
            RunStatus::Failed { stage, .. } => Some(*stage),
            RunStatus::Done { .. } => None,
        }
    }
}

/// Sequences one run and owns its intermediate tables.
pub struct Runner {
    config: PipelineConfig,
    ingestor: Box<dyn Ingestor>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn Observer>,
}

impl Runner {
    /// Runner with the configured ingestor, the system clock and a [`LogObserver`].
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        let ingestor = ingestor_for(config.strategy, &config.streaming);
        Self {
            config,
            ingestor,
            clock: Arc::new(SystemClock),
            observer: Arc::new(LogObserver),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace the ingestor chosen from the config.
    #[must_use]
    pub fn with_ingestor(mut self, ingestor: Box<dyn Ingestor>) -> Self {
        self.ingestor = ingestor;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute one full run. Never panics on stage errors and never returns `Err`.
    pub fn run(&self) -> RunOutcome {
        let mut tracker = Tracker::new(Arc::clone(&self.observer));
        let started = Instant::now();
        tracker.emit(RunEvent::RunStarted {
            ingestor: self.ingestor.name(),
            source: self.config.source_path.clone(),
            dest: self.config.dest_path.clone(),
        });

        let status = match self.execute(&mut tracker) {
            Ok(rows_written) => {
                tracker.enter(RunState::Done);
                RunStatus::Done { rows_written }
            }
            Err((stage, error)) => RunStatus::Failed { stage, error },
        };

        let state = tracker.state();
        tracker.emit(RunEvent::RunFinished {
            state,
            elapsed: started.elapsed(),
        });
        RunOutcome {
            status,
            states: tracker.states,
            metrics: tracker.metrics,
        }
    }

    fn execute(&self, tracker: &mut Tracker) -> std::result::Result<usize, (Stage, EtlError)> {
        let ingested = tracker.stage(Stage::Reading, || {
            self.ingestor.read(&self.config.source_path)
        })?;
        let table = ingested.table;
        tracker.emit(RunEvent::TableShape {
            stage: Stage::Reading,
            rows: table.num_rows(),
            columns: table.num_columns(),
        });
        if !ingested.skipped.is_empty() {
            tracker.emit(RunEvent::RowsSkipped {
                count: ingested.skipped.count(),
                samples: ingested.skipped.samples().to_vec(),
            });
        }
        if log_enabled!(Level::Debug) {
            debug!("Original input data:\n{}", table.preview(PREVIEW_ROWS));
        }

        let output = tracker.stage(Stage::Transforming, || {
            transform(table, self.clock.as_ref())
        })?;
        tracker.emit(RunEvent::TableShape {
            stage: Stage::Transforming,
            rows: output.num_rows(),
            columns: output.num_columns(),
        });

        let written = tracker.stage(Stage::Writing, || {
            write_output(&output, &self.config.dest_path)
        })?;
        tracker.emit(RunEvent::TableShape {
            stage: Stage::Writing,
            rows: written,
            columns: output.num_columns(),
        });
        Ok(written)
    }
}

/// State history, metrics and event fan-out of one run.
struct Tracker {
    observer: Arc<dyn Observer>,
    metrics: RunMetrics,
    states: Vec<RunState>,
}

impl Tracker {
    fn new(observer: Arc<dyn Observer>) -> Self {
        Self {
            observer,
            metrics: RunMetrics::new(),
            states: vec![RunState::Start],
        }
    }

    fn state(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Start)
    }

    fn enter(&mut self, state: RunState) {
        self.states.push(state);
    }

    fn emit(&mut self, event: RunEvent) {
        self.metrics.apply(&event);
        self.observer.notify(&event);
    }

    /// Run `f` as `stage`, timing it and turning an error into `Failed`.
    fn stage<T>(
        &mut self,
        stage: Stage,
        f: impl FnOnce() -> Result<T>,
    ) -> std::result::Result<T, (Stage, EtlError)> {
        self.enter(stage.into());
        let started_at = Utc::now();
        let clock = Instant::now();
        self.emit(RunEvent::StageStarted {
            stage,
            at: started_at,
        });

        let result = f();

        self.emit(RunEvent::StageFinished {
            stage,
            started_at,
            finished_at: Utc::now(),
            elapsed: clock.elapsed(),
        });
        result.map_err(|error| {
            self.emit(RunEvent::StageFailed {
                stage,
                kind: error.kind(),
                message: error.to_string(),
                report: error.report(),
            });
            self.enter(RunState::Failed);
            (stage, error)
        })
    }
}
