//! Filter, augment and project a [`WorkingTable`] into an [`OutputTable`].
//!
//! Steps run in a fixed order: rename, date cut-off, area prefix, derived
//! `date_math`, projection. Both filters read renamed columns, so renaming
//! must come first.

use crate::clock::Clock;
use crate::error::{EtlError, Result};
use crate::schema::{AREA_PREFIX, DATE_CUTOFF, DATE_FORMAT, DATE_MATH_FACTOR, OUTPUT_COLUMNS, RENAMES};
use crate::table::{OutputTable, WorkingTable};
use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, StringArray};
use arrow::compute::{cast, filter_record_batch};
use arrow::datatypes::DataType;
use chrono::NaiveDateTime;
use log::{Level, debug, log_enabled};
use rayon::prelude::*;
use std::sync::Arc;

/// Rows below this count are computed inline instead of on the rayon pool.
const PARALLEL_THRESHOLD: usize = 4096;

/// Run the whole transformation.
///
/// "now" is read from `clock` once, so every row in one call shares it.
///
/// # Errors
/// - [`EtlError::Schema`] when a required source column is missing.
/// - [`EtlError::DateParse`] when a surviving row has an unparseable `date`.
pub fn transform(mut table: WorkingTable, clock: &dyn Clock) -> Result<OutputTable> {
    table.rename_columns(&RENAMES)?;

    let rows_in = table.num_rows();
    filter_by_date(&mut table)?;
    let after_date = table.num_rows();
    filter_by_area(&mut table)?;
    debug!(
        "Filters kept {} of {} rows ({} after date cut-off)",
        table.num_rows(),
        rows_in,
        after_date
    );

    let dates = string_column(&table, "date")?;
    let date_math = compute_date_math(&dates, clock.now())?;

    let out = project(&table, Arc::new(date_math))?;
    if log_enabled!(Level::Debug) {
        debug!("Transformed output data:\n{}", out.preview(10));
    }
    Ok(out)
}

/// Keep rows whose `date` is strictly before [`DATE_CUTOFF`].
///
/// See [`is_before_cutoff`] for how values are compared.
///
/// # Errors
/// [`EtlError::Schema`] when there is no `date` column.
pub fn filter_by_date(table: &mut WorkingTable) -> Result<()> {
    let dates = string_column(table, "date")?;
    let cutoff = NaiveDateTime::parse_from_str(DATE_CUTOFF, DATE_FORMAT).ok();
    let mask: BooleanArray = dates
        .iter()
        .map(|v| v.map(|d| before(d, cutoff)))
        .collect();
    retain(table, &mask)
}

/// Whether `date` falls strictly before [`DATE_CUTOFF`].
///
/// Values in [`DATE_FORMAT`] compare as timestamps, since day-first strings do
/// not sort chronologically. Anything that does not parse compares as a raw
/// string, so it may survive and then fail in [`compute_date_math`].
#[must_use]
pub fn is_before_cutoff(date: &str) -> bool {
    before(date, NaiveDateTime::parse_from_str(DATE_CUTOFF, DATE_FORMAT).ok())
}

fn before(date: &str, cutoff: Option<NaiveDateTime>) -> bool {
    match (cutoff, NaiveDateTime::parse_from_str(date, DATE_FORMAT)) {
        (Some(cutoff), Ok(at)) => at < cutoff,
        _ => date < DATE_CUTOFF,
    }
}

/// Keep rows whose `area` starts with [`AREA_PREFIX`].
///
/// # Errors
/// [`EtlError::Schema`] when there is no `area` column.
pub fn filter_by_area(table: &mut WorkingTable) -> Result<()> {
    let areas = string_column(table, "area")?;
    let mask: BooleanArray = areas
        .iter()
        .map(|v| v.map(|a| a.starts_with(AREA_PREFIX)))
        .collect();
    retain(table, &mask)
}

/// `(now - parse(date))` in whole seconds, scaled by [`DATE_MATH_FACTOR`].
///
/// # Errors
/// Returns the `chrono` error when `date` does not match [`DATE_FORMAT`].
pub fn date_math(date: &str, now: NaiveDateTime) -> std::result::Result<f64, chrono::ParseError> {
    let occurred = NaiveDateTime::parse_from_str(date, DATE_FORMAT)?;
    #[allow(clippy::cast_precision_loss)]
    let seconds = (now - occurred).num_seconds() as f64;
    Ok(seconds * DATE_MATH_FACTOR)
}

/// Vectorised [`date_math`]; null dates stay null.
///
/// # Errors
/// [`EtlError::DateParse`] for the first row (by position) that fails to parse.
pub fn compute_date_math(dates: &StringArray, now: NaiveDateTime) -> Result<Float64Array> {
    let one = |row: usize| -> Result<Option<f64>> {
        if dates.is_null(row) {
            return Ok(None);
        }
        let value = dates.value(row);
        date_math(value, now)
            .map(Some)
            .map_err(|source| EtlError::DateParse {
                row,
                value: value.to_owned(),
                source,
            })
    };

    let values: Vec<Option<f64>> = if dates.len() < PARALLEL_THRESHOLD {
        (0..dates.len()).map(one).collect::<Result<_>>()?
    } else {
        (0..dates.len()).into_par_iter().map(one).collect::<Result<_>>()?
    };
    Ok(Float64Array::from(values))
}

fn project(table: &WorkingTable, date_math: ArrayRef) -> Result<OutputTable> {
    let mut columns = Vec::with_capacity(OUTPUT_COLUMNS.len());
    for name in &OUTPUT_COLUMNS[..OUTPUT_COLUMNS.len() - 1] {
        let col = table.column(name).ok_or_else(|| EtlError::schema(*name))?;
        columns.push(Arc::clone(col));
    }
    columns.push(date_math);
    OutputTable::from_columns(columns)
}

fn retain(table: &mut WorkingTable, mask: &BooleanArray) -> Result<()> {
    let batch = filter_record_batch(table.batch(), mask).map_err(|e| EtlError::schema(e.to_string()))?;
    table.replace_batch(batch);
    Ok(())
}

/// A column viewed as UTF-8 strings, casting non-string columns.
fn string_column(table: &WorkingTable, name: &str) -> Result<StringArray> {
    let col = table.column(name).ok_or_else(|| EtlError::schema(name))?;
    if col.data_type() == &DataType::Utf8 {
        return Ok(col.as_string::<i32>().clone());
    }
    let casted = cast(col, &DataType::Utf8).map_err(|e| EtlError::schema(format!("{name}: {e}")))?;
    Ok(casted.as_string::<i32>().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn date_math_uses_twelve_hour_clock() {
        let now = at(2022, 1, 1, 0, 0, 0);
        let v = date_math("31/12/2021 11:00:00 PM", now).unwrap();
        assert!((v - 3600.0 * DATE_MATH_FACTOR).abs() < 1e-3);
    }

    #[test]
    fn date_math_counts_whole_days_too() {
        let now = at(2022, 1, 3, 0, 0, 1);
        let v = date_math("01/01/2022 12:00:00 AM", now).unwrap();
        assert!((v - 172_801.0 * DATE_MATH_FACTOR).abs() < 1e-3);
    }

    #[test]
    fn cutoff_compares_day_first_dates_chronologically() {
        assert!(is_before_cutoff("31/12/2021 11:00:00 PM"));
        assert!(is_before_cutoff("31/12/2021 11:59:59 PM"));
        assert!(!is_before_cutoff("01/01/2022 12:00:00 AM"));
        assert!(!is_before_cutoff("02/01/2022 09:00:00 AM"));
        // unparseable values fall back to string order
        assert!(is_before_cutoff("00/00/0000"));
        assert!(!is_before_cutoff("not a date"));
    }

    #[test]
    fn compute_date_math_reports_offending_row() {
        let dates = StringArray::from(vec!["31/12/2021 11:00:00 PM", "2021-12-31"]);
        let err = compute_date_math(&dates, at(2022, 1, 1, 0, 0, 0)).unwrap_err();
        match err {
            EtlError::DateParse { row, value, .. } => {
                assert_eq!(row, 1);
                assert_eq!(value, "2021-12-31");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn compute_date_math_keeps_nulls() {
        let dates = StringArray::from(vec![None, Some("31/12/2021 11:00:00 PM")]);
        let out = compute_date_math(&dates, at(2022, 1, 1, 0, 0, 0)).unwrap();
        assert!(out.is_null(0));
        assert!(out.is_valid(1));
    }
}
