//! Parquet output sink and read-back helpers.
//!
//! - [`write_output`] serialises an [`OutputTable`] in one shot.
//! - [`read_output`] and [`read_parquet_vec`] load a written file back, as an
//!   [`OutputTable`] or as typed rows through `serde_arrow`.
//!
//! The sink writes into a temporary file next to the destination and only
//! renames it over the destination once the Parquet footer is closed, so a
//! failed write never creates or truncates the destination.

use crate::error::{EtlError, Result};
use crate::table::OutputTable;
use anyhow::Context;
use arrow::compute::concat_batches;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;
use serde::de::DeserializeOwned;
use serde_arrow::from_record_batch;
use std::fs::File;
use std::path::Path;
use tempfile::NamedTempFile;

/// Write `table` to `dest`, replacing any existing file.
///
/// The parent directory must already exist.
///
/// # Returns
/// Number of rows written.
///
/// # Errors
/// [`EtlError::Write`] on any filesystem or encoding failure; `dest` is left
/// untouched in that case.
pub fn write_output(table: &OutputTable, dest: impl AsRef<Path>) -> Result<usize> {
    let dest = dest.as_ref();
    let write_err = |e: parquet::errors::ParquetError| EtlError::write(dest, e);

    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| EtlError::write(dest, e))?;

    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(tmp.as_file_mut(), table.batch().schema(), Some(props))
        .map_err(write_err)?;
    writer.write(table.batch()).map_err(write_err)?;
    writer.close().map_err(write_err)?;

    tmp.as_file().sync_all().map_err(|e| EtlError::write(dest, e))?;
    tmp.persist(dest).map_err(|e| EtlError::write(dest, e.error))?;
    Ok(table.num_rows())
}

/// Read a Parquet file produced by [`write_output`] back into an [`OutputTable`].
///
/// # Errors
/// Fails when the file cannot be read or does not have the output layout.
pub fn read_output(path: impl AsRef<Path>) -> anyhow::Result<OutputTable> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("open ParquetRecordBatchReader")?;
    let schema = builder.schema().clone();
    let reader = builder
        .with_batch_size(64 * 1024)
        .build()
        .context("build ParquetRecordBatchReader")?;
    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("read batches")?;
    let batch = concat_batches(&schema, &batches).context("concatenate batches")?;
    Ok(OutputTable::try_from_batch(batch)?)
}

/// Read a Parquet file into typed rows.
///
/// Each `RecordBatch` is converted with `serde_arrow::from_record_batch` and
/// appended to one vector.
///
/// # Errors
/// Fails when the file cannot be opened or a batch does not map onto `T`.
pub fn read_parquet_vec<T: DeserializeOwned>(path: impl AsRef<Path>) -> anyhow::Result<Vec<T>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;

    let mut reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("open ParquetRecordBatchReader")?
        .with_batch_size(64 * 1024)
        .build()
        .context("build ParquetRecordBatchReader")?;

    let mut out: Vec<T> = Vec::new();
    while let Some(batch) = reader.next().transpose().context("read next batch")? {
        let mut rows: Vec<T> =
            from_record_batch(&batch).context("deserialize RecordBatch rows to T")?;
        out.append(&mut rows);
    }
    Ok(out)
}
