use anyhow::Result;
use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use incident_etl::io::parquet::read_parquet_vec;
use incident_etl::schema::OUTPUT_COLUMNS;
use incident_etl::{ErrorKind, OutputTable, read_output, write_output};
use serde::Deserialize;
use std::fs;
use std::sync::Arc;

#[derive(Debug, Deserialize, PartialEq)]
struct Incident {
    date: String,
    time: String,
    area: String,
    age: Option<i64>,
    sex: String,
    descent: String,
    date_math: Option<f64>,
}

fn output(rows: usize) -> Result<OutputTable> {
    let text = |prefix: &str| -> ArrayRef {
        Arc::new(StringArray::from(
            (0..rows).map(|i| format!("{prefix}{i}")).collect::<Vec<_>>(),
        ))
    };
    let ages: Int64Array = (0..rows as i64).map(|i| (i % 2 == 0).then_some(i)).collect();
    let math: Float64Array = (0..rows).map(|i| Some(i as f64 * 0.5)).collect();
    Ok(OutputTable::from_columns(vec![
        text("d"),
        text("t"),
        text("P"),
        Arc::new(ages),
        text("s"),
        text("x"),
        Arc::new(math),
    ])?)
}

#[test]
fn written_file_reads_back_with_the_same_rows() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dest = tmp.path().join("processed.parquet");
    let table = output(5)?;

    let written = write_output(&table, &dest)?;
    assert_eq!(written, 5);

    let back = read_output(&dest)?;
    assert_eq!(back.num_rows(), 5);
    assert_eq!(back.column_names(), OUTPUT_COLUMNS.to_vec());
    for name in OUTPUT_COLUMNS {
        assert_eq!(
            back.column(name).unwrap().as_ref(),
            table.column(name).unwrap().as_ref(),
            "{name}"
        );
    }
    Ok(())
}

#[test]
fn written_rows_deserialize_into_typed_records() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dest = tmp.path().join("processed.parquet");
    write_output(&output(3)?, &dest)?;

    let rows: Vec<Incident> = read_parquet_vec(&dest)?;
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows[1],
        Incident {
            date: "d1".into(),
            time: "t1".into(),
            area: "P1".into(),
            age: None,
            sex: "s1".into(),
            descent: "x1".into(),
            date_math: Some(0.5),
        }
    );
    assert_eq!(rows[2].age, Some(2));
    Ok(())
}

#[test]
fn empty_table_still_writes_the_schema() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dest = tmp.path().join("empty.parquet");
    assert_eq!(write_output(&output(0)?, &dest)?, 0);

    let back = read_output(&dest)?;
    assert_eq!(back.num_rows(), 0);
    assert_eq!(back.num_columns(), 7);
    Ok(())
}

#[test]
fn existing_destination_is_replaced() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dest = tmp.path().join("processed.parquet");
    fs::write(&dest, b"stale bytes")?;

    write_output(&output(2)?, &dest)?;
    assert_eq!(read_output(&dest)?.num_rows(), 2);
    Ok(())
}

#[test]
fn missing_parent_directory_is_a_write_error() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dest = tmp.path().join("no/such/dir/processed.parquet");

    let err = write_output(&output(2)?, &dest).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Write);
    assert!(!dest.exists());
    Ok(())
}

#[test]
fn failed_write_leaves_destination_and_directory_clean() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dest = tmp.path().join("processed.parquet");
    fs::create_dir(&dest)?;

    let err = write_output(&output(2)?, &dest).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Write);
    assert!(dest.is_dir());
    // no temporary file left next to the destination
    assert_eq!(fs::read_dir(tmp.path())?.count(), 1);
    Ok(())
}
