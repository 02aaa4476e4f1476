//! # incident-etl
//!
//! A batch ETL job for the crime-incident dataset: read a gzip-compressed CSV,
//! keep the incidents that happened before 2022 in areas starting with `P`,
//! derive an elapsed-time column and write the result as Parquet.
//!
//! ## Pipeline
//!
//! ```text
//! source .csv.gz --Ingestor--> WorkingTable --transform--> OutputTable --write_output--> .parquet
//! ```
//!
//! - [`io::csv`] holds the two ingestion strategies behind the [`Ingestor`] trait:
//!   [`BulkReader`] (whole file, inferred types, fails on any malformed row) and
//!   [`StreamingReader`] (streaming decode, explicit schema, six columns only,
//!   parallel parsing, malformed rows skipped and counted).
//! - [`transform`] renames, filters, computes `date_math` and projects to the
//!   seven output columns.
//! - [`io::parquet`] persists the output atomically.
//! - [`runner`] sequences the stages, times them and reports to an
//!   [`Observer`]; it always returns a [`RunOutcome`] instead of failing.
//!
//! ## Quick start
//!
//! ```no_run
//! use incident_etl::{IngestionStrategy, PipelineConfig, Runner};
//!
//! let config = PipelineConfig::new(
//!     "data/data.csv.tar.gz",
//!     "output/processed.parquet",
//!     IngestionStrategy::Streaming,
//! );
//! let outcome = Runner::new(config).run();
//! if let Some(err) = outcome.error() {
//!     eprintln!("run failed: {err}");
//! }
//! ```
//!
//! ## Module overview
//!
//! - [`schema`] - static column catalog, filter literals and date format
//! - [`table`] - working and output tables over Arrow record batches
//! - [`io`] - decompression, CSV ingestion, Parquet output
//! - [`transform`] - the transformation stage
//! - [`clock`] - injectable wall clock for `date_math`
//! - [`observer`] / [`metrics`] - run events, logging and timings
//! - [`config`] - run configuration
//! - [`testing`] - fixtures for building source files in tests

pub mod clock;
pub mod config;
pub mod error;
pub mod io;
pub mod metrics;
pub mod observer;
pub mod runner;
pub mod schema;
pub mod table;
pub mod testing;
pub mod transform;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{IngestionStrategy, PipelineConfig, StreamingOptions};
pub use error::{ErrorKind, EtlError};
pub use io::csv::{BulkReader, Ingested, Ingestor, SkipReport, StreamingReader};
pub use io::parquet::{read_output, write_output};
pub use metrics::RunMetrics;
pub use observer::{LogObserver, Observer, RecordingObserver, RunEvent};
pub use runner::{RunOutcome, RunState, RunStatus, Runner, Stage};
pub use table::{OutputTable, WorkingTable};
pub use transform::transform;
