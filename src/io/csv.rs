//! CSV ingestion: two interchangeable [`Ingestor`] implementations.
//!
//! - [`BulkReader`] decompresses the whole source into memory, infers column
//!   types from the header-named data and fails on the first malformed row.
//! - [`StreamingReader`] decodes the source as a stream with the catalog's
//!   explicit column names, keeps only the six required columns, parses
//!   blocks of rows on the rayon pool and skips rows that do not fit the
//!   schema instead of failing.
//!
//! # Design notes
//! - Row order is preserved in both readers; parallel parsing collects each
//!   block back in index order before appending it.
//! - Skipped rows are never silent: every one becomes a [`SkippedRow`] and is
//!   counted in the returned [`SkipReport`].

use crate::config::{IngestionStrategy, StreamingOptions};
use crate::error::{EtlError, Result};
use crate::io::compression::open_source;
use crate::schema::{AGE_COLUMN, SOURCE_COLUMNS, required_columns, source_index};
use crate::table::WorkingTable;
use arrow::array::{ArrayRef, Int64Builder, RecordBatch, StringBuilder};
use arrow::compute::concat_batches;
use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use csv::ByteRecord;
use log::{debug, warn};
use rayon::prelude::*;
use std::fmt;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Physical rows dropped before parsing (the source header).
const HEADER_ROWS: u64 = 1;

/// Skipped rows kept verbatim in a [`SkipReport`]; the rest are only counted.
const MAX_SKIP_SAMPLES: usize = 16;

/// Turns a source file into a [`WorkingTable`].
pub trait Ingestor: Send + Sync {
    /// Short name used in logs and events.
    fn name(&self) -> &'static str;

    /// Read the whole source.
    ///
    /// # Errors
    /// [`EtlError::Ingestion`] when the source cannot be read as a whole.
    fn read(&self, source: &Path) -> Result<Ingested>;
}

/// What an ingestor hands back.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub table: WorkingTable,
    pub skipped: SkipReport,
}

/// Build the ingestor selected by `strategy`.
#[must_use]
pub fn ingestor_for(strategy: IngestionStrategy, options: &StreamingOptions) -> Box<dyn Ingestor> {
    match strategy {
        IngestionStrategy::Bulk => Box::new(BulkReader::default()),
        IngestionStrategy::Streaming => Box::new(StreamingReader::new(options.clone())),
    }
}

// ---------------------------------------------------------------------------
// Bulk reader
// ---------------------------------------------------------------------------

/// Whole-file reader with header-derived names and inferred types.
#[derive(Debug, Clone)]
pub struct BulkReader {
    batch_size: usize,
}

impl Default for BulkReader {
    fn default() -> Self {
        Self {
            batch_size: 64 * 1024,
        }
    }
}

impl Ingestor for BulkReader {
    fn name(&self) -> &'static str {
        "bulk"
    }

    fn read(&self, source: &Path) -> Result<Ingested> {
        let ingest_err = |e: ArrowError| EtlError::ingestion(source, e);

        let (codec, mut stream) = open_source(source).map_err(|e| EtlError::ingestion(source, e))?;
        let mut bytes = Vec::new();
        stream
            .read_to_end(&mut bytes)
            .map_err(|e| EtlError::ingestion(source, e))?;
        debug!("Decompressed {} bytes ({})", bytes.len(), codec.name());

        let format = Format::default().with_header(true).with_delimiter(b',');
        let (schema, _) = format
            .infer_schema(Cursor::new(&bytes), None)
            .map_err(ingest_err)?;
        let schema = Arc::new(schema);

        let reader = ReaderBuilder::new(Arc::clone(&schema))
            .with_format(format)
            .with_batch_size(self.batch_size)
            .build(Cursor::new(&bytes))
            .map_err(ingest_err)?;
        let batches = reader
            .collect::<std::result::Result<Vec<_>, ArrowError>>()
            .map_err(ingest_err)?;
        let batch = concat_batches(&schema, &batches).map_err(ingest_err)?;

        Ok(Ingested {
            table: WorkingTable::new(batch),
            skipped: SkipReport::default(),
        })
    }
}

// ---------------------------------------------------------------------------
// Streaming reader
// ---------------------------------------------------------------------------

/// Why a row was dropped by the [`StreamingReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    FieldCount { expected: usize, found: usize },
    InvalidUtf8 { column: &'static str },
    InvalidInteger { column: &'static str, value: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldCount { expected, found } => {
                write!(f, "expected {expected} fields, found {found}")
            }
            Self::InvalidUtf8 { column } => write!(f, "`{column}` is not valid UTF-8"),
            Self::InvalidInteger { column, value } => {
                write!(f, "`{column}` is not an integer: {value:?}")
            }
        }
    }
}

/// A dropped row and the reason it was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    /// 1-based physical record number, header included.
    pub line: u64,
    pub reason: SkipReason,
}

/// Count of skipped rows plus the first few of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipReport {
    count: usize,
    samples: Vec<SkippedRow>,
}

impl SkipReport {
    pub fn record(&mut self, row: SkippedRow) {
        self.count += 1;
        if self.samples.len() < MAX_SKIP_SAMPLES {
            self.samples.push(row);
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub fn samples(&self) -> &[SkippedRow] {
        &self.samples
    }
}

/// Per-row parse result.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Kept(Vec<Cell>),
    Skipped(SkippedRow),
}

/// One parsed value of a kept row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Int(Option<i64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Text,
    Int,
}

impl ColumnKind {
    fn data_type(self) -> DataType {
        match self {
            Self::Text => DataType::Utf8,
            Self::Int => DataType::Int64,
        }
    }
}

/// A required column: its name, physical position and target type.
#[derive(Debug, Clone, Copy)]
struct ColumnPlan {
    name: &'static str,
    index: usize,
    kind: ColumnKind,
}

fn column_plan() -> Vec<ColumnPlan> {
    required_columns()
        .filter_map(|name| {
            source_index(name).map(|index| ColumnPlan {
                name,
                index,
                kind: if name == AGE_COLUMN {
                    ColumnKind::Int
                } else {
                    ColumnKind::Text
                },
            })
        })
        .collect()
}

/// Explicit schema of the table a [`StreamingReader`] produces.
#[must_use]
pub fn streaming_schema() -> Schema {
    Schema::new(
        column_plan()
            .iter()
            .map(|c| Field::new(c.name, c.kind.data_type(), true))
            .collect::<Vec<_>>(),
    )
}

fn parse_record(line: u64, record: &ByteRecord, plan: &[ColumnPlan]) -> RowOutcome {
    let skip = |reason| RowOutcome::Skipped(SkippedRow { line, reason });
    if record.len() != SOURCE_COLUMNS.len() {
        return skip(SkipReason::FieldCount {
            expected: SOURCE_COLUMNS.len(),
            found: record.len(),
        });
    }

    let mut cells = Vec::with_capacity(plan.len());
    for col in plan {
        let Ok(text) = std::str::from_utf8(&record[col.index]) else {
            return skip(SkipReason::InvalidUtf8 { column: col.name });
        };
        let cell = match col.kind {
            ColumnKind::Text => Cell::Text(text.to_owned()),
            ColumnKind::Int => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Cell::Int(None)
                } else if let Ok(v) = trimmed.parse::<i64>() {
                    Cell::Int(Some(v))
                } else {
                    return skip(SkipReason::InvalidInteger {
                        column: col.name,
                        value: text.to_owned(),
                    });
                }
            }
        };
        cells.push(cell);
    }
    RowOutcome::Kept(cells)
}

enum ColumnBuilder {
    Text(StringBuilder),
    Int(Int64Builder),
}

impl ColumnBuilder {
    fn new(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Text => Self::Text(StringBuilder::new()),
            ColumnKind::Int => Self::Int(Int64Builder::new()),
        }
    }

    fn append(&mut self, cell: Cell) {
        match (self, cell) {
            (Self::Text(b), Cell::Text(v)) => b.append_value(v),
            (Self::Int(b), Cell::Int(v)) => b.append_option(v),
            _ => unreachable!("cells are produced from the same column plan"),
        }
    }

    fn finish(self) -> ArrayRef {
        match self {
            Self::Text(mut b) => Arc::new(b.finish()),
            Self::Int(mut b) => Arc::new(b.finish()),
        }
    }
}

/// Streaming, schema-constrained reader that skips malformed rows.
#[derive(Debug, Clone, Default)]
pub struct StreamingReader {
    options: StreamingOptions,
}

impl StreamingReader {
    #[must_use]
    pub fn new(options: StreamingOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &StreamingOptions {
        &self.options
    }

    fn parse_block(&self, block: &[ByteRecord], first_line: u64, plan: &[ColumnPlan]) -> Vec<RowOutcome> {
        let parse = |(i, rec): (usize, &ByteRecord)| parse_record(first_line + i as u64, rec, plan);
        if self.options.use_threads {
            block.par_iter().enumerate().map(parse).collect()
        } else {
            block.iter().enumerate().map(parse).collect()
        }
    }

    fn read_stream(&self, source: &Path) -> Result<Ingested> {
        let opened = Instant::now();
        let (codec, stream) = open_source(source).map_err(|e| EtlError::ingestion(source, e))?;
        debug!(
            "Decompression stream ({}) opened in {} sec.",
            codec.name(),
            opened.elapsed().as_secs_f64()
        );

        let parsing = Instant::now();
        debug!(
            "Parsing blocks of {} rows on {} thread(s)",
            self.options.block_rows,
            self.options.worker_threads()
        );
        let plan = column_plan();
        let mut builders: Vec<ColumnBuilder> =
            plan.iter().map(|c| ColumnBuilder::new(c.kind)).collect();
        let mut skipped = SkipReport::default();

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(b',')
            .flexible(true)
            .from_reader(stream);

        let block_rows = self.options.block_rows.max(1);
        let mut block: Vec<ByteRecord> = Vec::with_capacity(block_rows);
        let mut line: u64 = 0;
        let mut first_line = HEADER_ROWS + 1;

        for rec in rdr.byte_records() {
            let rec = rec.map_err(|e| EtlError::ingestion(source, e))?;
            line += 1;
            if line <= HEADER_ROWS {
                continue;
            }
            if block.is_empty() {
                first_line = line;
            }
            block.push(rec);
            if block.len() == block_rows {
                self.drain_block(&mut block, first_line, &plan, &mut builders, &mut skipped);
            }
        }
        self.drain_block(&mut block, first_line, &plan, &mut builders, &mut skipped);

        let columns: Vec<ArrayRef> = builders.into_iter().map(ColumnBuilder::finish).collect();
        let batch = RecordBatch::try_new(Arc::new(streaming_schema()), columns)
            .map_err(|e| EtlError::ingestion(source, e))?;

        debug!(
            "Parsed {} rows in {} sec.",
            batch.num_rows(),
            parsing.elapsed().as_secs_f64()
        );
        if !skipped.is_empty() {
            warn!("Skipped {} malformed rows in {}", skipped.count(), source.display());
        }

        Ok(Ingested {
            table: WorkingTable::new(batch),
            skipped,
        })
    }

    fn drain_block(
        &self,
        block: &mut Vec<ByteRecord>,
        first_line: u64,
        plan: &[ColumnPlan],
        builders: &mut [ColumnBuilder],
        skipped: &mut SkipReport,
    ) {
        if block.is_empty() {
            return;
        }
        for outcome in self.parse_block(block, first_line, plan) {
            match outcome {
                RowOutcome::Kept(cells) => {
                    for (builder, cell) in builders.iter_mut().zip(cells) {
                        builder.append(cell);
                    }
                }
                RowOutcome::Skipped(row) => {
                    debug!("Skipping line {}: {}", row.line, row.reason);
                    skipped.record(row);
                }
            }
        }
        block.clear();
    }
}

impl Ingestor for StreamingReader {
    fn name(&self) -> &'static str {
        "streaming"
    }

    fn read(&self, source: &Path) -> Result<Ingested> {
        match self.options.threads {
            Some(n) if self.options.use_threads => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n.max(1))
                    .build()
                    .map_err(|e| EtlError::ingestion(source, e))?;
                pool.install(|| self.read_stream(source))
            }
            _ => self.read_stream(source),
        }
    }
}
