//! In-memory tables passed between pipeline stages.
//!
//! Both tables wrap a single Arrow [`RecordBatch`]. A [`WorkingTable`] is what
//! an ingestor produces and the transformation stage mutates; an
//! [`OutputTable`] is the frozen seven-column result handed to the sink.

use crate::error::{EtlError, Result};
use crate::schema::OUTPUT_COLUMNS;
use arrow::array::{ArrayRef, RecordBatch};
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::util::pretty::pretty_format_batches;
use std::sync::Arc;

/// Columnar table produced by ingestion.
#[derive(Debug, Clone)]
pub struct WorkingTable {
    batch: RecordBatch,
}

impl WorkingTable {
    #[must_use]
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    /// Zero-row table with the given schema.
    #[must_use]
    pub fn empty(schema: SchemaRef) -> Self {
        Self::new(RecordBatch::new_empty(schema))
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        column_names(&self.batch)
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    #[must_use]
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    #[must_use]
    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    /// Rename columns in place according to `renames` (`(from, to)` pairs).
    ///
    /// Every `from` column is checked before anything changes, so a missing
    /// column leaves the table exactly as it was.
    ///
    /// # Errors
    /// [`EtlError::Schema`] naming the first absent source column.
    pub fn rename_columns(&mut self, renames: &[(&str, &str)]) -> Result<()> {
        let schema = self.batch.schema();
        for (from, _) in renames {
            if schema.index_of(from).is_err() {
                return Err(EtlError::schema(*from));
            }
        }

        let fields: Vec<Field> = schema
            .fields()
            .iter()
            .map(|f| {
                let renamed = renames
                    .iter()
                    .find(|(from, _)| f.name() == from)
                    .map(|(_, to)| *to);
                match renamed {
                    Some(to) => f.as_ref().clone().with_name(to),
                    None => f.as_ref().clone(),
                }
            })
            .collect();
        let renamed = Schema::new_with_metadata(fields, schema.metadata().clone());
        self.batch = RecordBatch::try_new(Arc::new(renamed), self.batch.columns().to_vec())
            .map_err(|e| EtlError::schema(e.to_string()))?;
        Ok(())
    }

    /// Replace the underlying batch (used by stages that rebuild rows).
    pub(crate) fn replace_batch(&mut self, batch: RecordBatch) {
        self.batch = batch;
    }

    /// Text grid of the first `n` rows.
    #[must_use]
    pub fn preview(&self, n: usize) -> String {
        preview(&self.batch, n)
    }
}

/// The seven-column result of a transformation. Immutable once built.
#[derive(Debug, Clone)]
pub struct OutputTable {
    batch: RecordBatch,
}

impl OutputTable {
    /// Build from exactly seven arrays given in output column order.
    ///
    /// # Errors
    /// [`EtlError::Schema`] when the array count or lengths do not line up.
    pub fn from_columns(columns: Vec<ArrayRef>) -> Result<Self> {
        if columns.len() != OUTPUT_COLUMNS.len() {
            return Err(EtlError::schema(format!(
                "{} output columns, got {}",
                OUTPUT_COLUMNS.len(),
                columns.len()
            )));
        }
        let fields: Vec<Field> = OUTPUT_COLUMNS
            .iter()
            .zip(&columns)
            .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
            .collect();
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
            .map_err(|e| EtlError::schema(e.to_string()))?;
        Ok(Self { batch })
    }

    /// Wrap an existing batch, checking the column layout.
    ///
    /// # Errors
    /// [`EtlError::Schema`] naming the first output column that is missing or
    /// out of place.
    pub fn try_from_batch(batch: RecordBatch) -> Result<Self> {
        let names = column_names(&batch);
        for (i, expected) in OUTPUT_COLUMNS.iter().enumerate() {
            if names.get(i).map(String::as_str) != Some(*expected) {
                return Err(EtlError::schema(*expected));
            }
        }
        if names.len() != OUTPUT_COLUMNS.len() {
            return Err(EtlError::schema(names[OUTPUT_COLUMNS.len()].clone()));
        }
        Ok(Self { batch })
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        column_names(&self.batch)
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    #[must_use]
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    #[must_use]
    pub fn preview(&self, n: usize) -> String {
        preview(&self.batch, n)
    }
}

fn column_names(batch: &RecordBatch) -> Vec<String> {
    batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}

fn preview(batch: &RecordBatch, n: usize) -> String {
    let head = batch.slice(0, n.min(batch.num_rows()));
    match pretty_format_batches(&[head]) {
        Ok(grid) => grid.to_string(),
        Err(e) => format!("<preview unavailable: {e}>"),
    }
}
