use anyhow::Result;
use arrow::array::{Array, AsArray};
use arrow::datatypes::{DataType, Int64Type};
use incident_etl::config::StreamingOptions;
use incident_etl::io::csv::{SkipReason, streaming_schema};
use incident_etl::schema::{SOURCE_COLUMNS, required_columns};
use incident_etl::testing::{
    SourceRow, csv_line, header_line, scenario_rows, write_gzip_lines, write_source,
};
use incident_etl::{BulkReader, ErrorKind, Ingestor, StreamingReader};
use std::fs;

fn ages(reader: &dyn Ingestor, path: &std::path::Path) -> Result<Vec<Option<i64>>> {
    let ingested = reader.read(path)?;
    let col = ingested.table.column("Vict Age").expect("age column");
    Ok(col.as_primitive::<Int64Type>().iter().collect())
}

#[test]
fn streaming_keeps_only_required_columns() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("data.csv.gz");
    write_source(&path, &scenario_rows())?;

    let ingested = StreamingReader::default().read(&path)?;
    let table = ingested.table;
    assert_eq!(table.num_rows(), 3);
    assert_eq!(table.column_names(), required_columns().collect::<Vec<_>>());
    assert_eq!(table.schema().as_ref(), &streaming_schema());
    assert!(ingested.skipped.is_empty());

    let areas = table.column("AREA NAME").unwrap().as_string::<i32>();
    assert_eq!(areas.value(0), "Pacific");
    assert_eq!(areas.value(2), "Central");
    let dates = table.column("DATE OCC").unwrap().as_string::<i32>();
    assert_eq!(dates.value(1), "02/01/2022 09:00:00 AM");
    Ok(())
}

#[test]
fn streaming_skips_structurally_invalid_row() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("dirty.csv.gz");
    let rows = scenario_rows();
    let lines = vec![
        header_line(),
        csv_line(&rows[0]),
        "1,2,3".to_string(),
        csv_line(&rows[1]),
        csv_line(&rows[2]),
    ];
    write_gzip_lines(&path, &lines)?;

    let ingested = StreamingReader::default().read(&path)?;
    assert_eq!(ingested.table.num_rows(), 3);
    assert_eq!(ingested.skipped.count(), 1);
    let skipped = &ingested.skipped.samples()[0];
    assert_eq!(skipped.line, 3);
    assert_eq!(
        skipped.reason,
        SkipReason::FieldCount {
            expected: SOURCE_COLUMNS.len(),
            found: 3
        }
    );
    Ok(())
}

#[test]
fn bulk_fails_on_structurally_invalid_row() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("dirty.csv.gz");
    let rows = scenario_rows();
    let lines = vec![
        header_line(),
        csv_line(&rows[0]),
        "1,2,3".to_string(),
        csv_line(&rows[1]),
    ];
    write_gzip_lines(&path, &lines)?;

    let err = BulkReader::default().read(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Ingestion);
    Ok(())
}

#[test]
fn streaming_skips_rows_with_non_integer_age() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("ages.csv.gz");
    let rows = vec![
        SourceRow::new().age("31"),
        SourceRow::new().age("unknown"),
        SourceRow::new().age(""),
    ];
    write_source(&path, &rows)?;

    let reader = StreamingReader::default();
    let ingested = reader.read(&path)?;
    assert_eq!(ingested.skipped.count(), 1);
    assert!(matches!(
        ingested.skipped.samples()[0].reason,
        SkipReason::InvalidInteger { .. }
    ));
    assert_eq!(ages(&reader, &path)?, vec![Some(31), None]);
    Ok(())
}

#[test]
fn bulk_reads_every_column_with_header_names() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("data.csv.gz");
    write_source(&path, &scenario_rows())?;

    let ingested = BulkReader::default().read(&path)?;
    let table = ingested.table;
    assert_eq!(table.num_rows(), 3);
    assert_eq!(table.num_columns(), SOURCE_COLUMNS.len());
    assert_eq!(table.column_names(), SOURCE_COLUMNS.to_vec());
    assert_eq!(table.column("DATE OCC").unwrap().data_type(), &DataType::Utf8);
    assert_eq!(table.column("AREA NAME").unwrap().data_type(), &DataType::Utf8);
    assert_eq!(table.column("Vict Age").unwrap().data_type(), &DataType::Int64);
    Ok(())
}

#[test]
fn streaming_preserves_row_order_across_blocks() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("many.csv.gz");
    let rows: Vec<SourceRow> = (0..50).map(|i| SourceRow::new().age(&i.to_string())).collect();
    write_source(&path, &rows)?;
    let expected: Vec<Option<i64>> = (0..50).map(Some).collect();

    let threaded = StreamingReader::new(StreamingOptions {
        block_rows: 7,
        use_threads: true,
        threads: Some(3),
    });
    assert_eq!(ages(&threaded, &path)?, expected);

    let single = StreamingReader::new(StreamingOptions {
        block_rows: 7,
        use_threads: false,
        threads: None,
    });
    assert_eq!(ages(&single, &path)?, expected);
    Ok(())
}

#[test]
fn missing_source_is_an_ingestion_error() {
    let path = std::path::Path::new("/definitely/not/here.csv.gz");
    for reader in [
        Box::new(BulkReader::default()) as Box<dyn Ingestor>,
        Box::new(StreamingReader::default()),
    ] {
        let err = reader.read(path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Ingestion, "{}", reader.name());
    }
}

#[test]
fn corrupt_gzip_stream_is_an_ingestion_error() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("corrupt.csv.gz");
    fs::write(&path, [0x1f, 0x8b, 0xff, 0x00, 0x13, 0x37, 0x00, 0x00, 0x42])?;

    let err = StreamingReader::default().read(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Ingestion);
    Ok(())
}

#[test]
fn uncompressed_source_is_read_as_plain_text() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("plain.csv");
    let rows = scenario_rows();
    let text = format!("{}\n{}\n", header_line(), csv_line(&rows[0]));
    fs::write(&path, text)?;

    let ingested = StreamingReader::default().read(&path)?;
    assert_eq!(ingested.table.num_rows(), 1);
    Ok(())
}

#[test]
fn header_only_source_yields_empty_table() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("empty.csv.gz");
    write_source(&path, &[])?;

    let ingested = StreamingReader::default().read(&path)?;
    assert_eq!(ingested.table.num_rows(), 0);
    assert_eq!(ingested.table.num_columns(), 6);
    let age = ingested.table.column("Vict Age").unwrap();
    assert_eq!(age.len(), 0);
    Ok(())
}
