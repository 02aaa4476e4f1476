//! Fixtures for tests that need real source files.
//!
//! - [`SourceRow`] builds one 28-field incident record with sensible defaults.
//! - [`write_source`] writes rows as a gzip-compressed CSV with a header.
//! - [`write_gzip_lines`] writes raw text lines, for malformed inputs.
//! - [`scenario_rows`] is the three-row dataset where only the first row
//!   survives the filters.
//!
//! # Example
//!
//! ```
//! use incident_etl::testing::{SourceRow, write_source};
//!
//! # fn main() -> anyhow::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("data.csv.gz");
//! write_source(&path, &[SourceRow::new().area("Pacific")])?;
//! assert!(path.exists());
//! # Ok(())
//! # }
//! ```

use crate::clock::FixedClock;
use crate::schema::{DATE_FORMAT, SOURCE_COLUMNS, source_index};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// One source record, addressable by source column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    fields: Vec<String>,
}

impl Default for SourceRow {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceRow {
    /// A plausible record: occurred 31/12/2021 11 PM in Pacific.
    #[must_use]
    pub fn new() -> Self {
        let defaults = [
            ("DR_NO", "211414090"),
            ("Date Rptd", "01/01/2022 12:00:00 AM"),
            ("DATE OCC", "31/12/2021 11:00:00 PM"),
            ("TIME OCC", "2300"),
            ("AREA", "14"),
            ("AREA NAME", "Pacific"),
            ("Rpt Dist No", "1464"),
            ("Part 1-2", "1"),
            ("Crm Cd", "510"),
            ("Crm Cd Desc", "VEHICLE - STOLEN"),
            ("Vict Age", "36"),
            ("Vict Sex", "M"),
            ("Vict Descent", "W"),
            ("Premis Cd", "101"),
            ("Premis Desc", "STREET"),
            ("Status", "IC"),
            ("Status Desc", "Invest Cont"),
            ("Crm Cd 1", "510"),
            ("LOCATION", "5400 W  CENTURY BL"),
            ("LAT", "33.9456"),
            ("LON", "-118.3703"),
        ];
        let mut row = Self {
            fields: vec![String::new(); SOURCE_COLUMNS.len()],
        };
        for (col, value) in defaults {
            row = row.set(col, value);
        }
        row
    }

    /// Set a field by source column name; unknown names are ignored.
    #[must_use]
    pub fn set(mut self, column: &str, value: impl Into<String>) -> Self {
        if let Some(i) = source_index(column) {
            self.fields[i] = value.into();
        }
        self
    }

    #[must_use]
    pub fn date(self, value: &str) -> Self {
        self.set("DATE OCC", value)
    }

    #[must_use]
    pub fn time(self, value: &str) -> Self {
        self.set("TIME OCC", value)
    }

    #[must_use]
    pub fn area(self, value: &str) -> Self {
        self.set("AREA NAME", value)
    }

    #[must_use]
    pub fn age(self, value: &str) -> Self {
        self.set("Vict Age", value)
    }

    #[must_use]
    pub fn sex(self, value: &str) -> Self {
        self.set("Vict Sex", value)
    }

    #[must_use]
    pub fn descent(self, value: &str) -> Self {
        self.set("Vict Descent", value)
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// Rows dated 31/12/2021 (Pacific), 02/01/2022 (Pacific) and 31/12/2021 (Central).
#[must_use]
pub fn scenario_rows() -> Vec<SourceRow> {
    vec![
        SourceRow::new().date("31/12/2021 11:00:00 PM").area("Pacific"),
        SourceRow::new().date("02/01/2022 09:00:00 AM").area("Pacific"),
        SourceRow::new().date("31/12/2021 10:00:00 PM").area("Central"),
    ]
}

/// Write `rows` under the 28-column header as gzip-compressed CSV.
///
/// # Errors
/// Fails on any I/O or CSV error.
pub fn write_source(path: impl AsRef<Path>, rows: &[SourceRow]) -> Result<()> {
    let path = path.as_ref();
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut wtr = csv::Writer::from_writer(GzEncoder::new(f, Compression::default()));
    wtr.write_record(SOURCE_COLUMNS)?;
    for row in rows {
        wtr.write_record(row.fields())?;
    }
    let gz = wtr
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flush CSV writer: {}", e.error()))?;
    gz.finish().context("finish gzip stream")?;
    Ok(())
}

/// Write raw `lines` (newline-terminated) as a gzip stream.
///
/// # Errors
/// Fails on any I/O error.
pub fn write_gzip_lines(path: impl AsRef<Path>, lines: &[String]) -> Result<()> {
    let path = path.as_ref();
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut gz = GzEncoder::new(f, Compression::default());
    for line in lines {
        gz.write_all(line.as_bytes())?;
        gz.write_all(b"\n")?;
    }
    gz.finish().context("finish gzip stream")?;
    Ok(())
}

/// The header line of a source file.
#[must_use]
pub fn header_line() -> String {
    SOURCE_COLUMNS.join(",")
}

/// A record rendered as one CSV line (fields must not need quoting).
#[must_use]
pub fn csv_line(row: &SourceRow) -> String {
    row.fields().join(",")
}

/// A [`FixedClock`] at a timestamp written in the source date format.
///
/// # Panics
/// Panics when `at` does not match the source date format.
#[must_use]
pub fn clock_at(at: &str) -> FixedClock {
    FixedClock(NaiveDateTime::parse_from_str(at, DATE_FORMAT).expect("fixture timestamp"))
}
