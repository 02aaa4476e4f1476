use anyhow::Result;
use incident_etl::config::{ENV_CONFIG, ENV_DEST, ENV_SOURCE, ENV_STRATEGY};
use incident_etl::{IngestionStrategy, PipelineConfig, StreamingOptions};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_point_at_data_and_output_dirs() {
    let cfg = PipelineConfig::default();
    assert_eq!(cfg.source_path, PathBuf::from("./data/data.csv.tar.gz"));
    assert_eq!(cfg.dest_path, PathBuf::from("./output/processed.parquet"));
    assert_eq!(cfg.strategy, IngestionStrategy::Streaming);
    assert_eq!(cfg.streaming, StreamingOptions::default());
}

#[test]
fn no_variables_gives_defaults() -> Result<()> {
    assert_eq!(PipelineConfig::from_lookup(lookup(&[]))?, PipelineConfig::default());
    Ok(())
}

#[test]
fn partial_json_file_keeps_other_defaults() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("etl.json");
    fs::write(
        &path,
        r#"{ "strategy": "bulk", "streaming": { "block_rows": 128 } }"#,
    )?;

    let cfg = PipelineConfig::from_json_file(&path)?;
    assert_eq!(cfg.strategy, IngestionStrategy::Bulk);
    assert_eq!(cfg.streaming.block_rows, 128);
    assert!(cfg.streaming.use_threads);
    assert_eq!(cfg.source_path, PipelineConfig::default().source_path);
    Ok(())
}

#[test]
fn variables_override_the_config_file() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("etl.json");
    fs::write(&path, r#"{ "source_path": "from-file.csv.gz", "strategy": "bulk" }"#)?;
    let path = path.to_string_lossy().into_owned();

    let cfg = PipelineConfig::from_lookup(lookup(&[
        (ENV_CONFIG, path.as_str()),
        (ENV_DEST, "/tmp/out.parquet"),
        (ENV_STRATEGY, "B"),
    ]))?;
    assert_eq!(cfg.source_path, PathBuf::from("from-file.csv.gz"));
    assert_eq!(cfg.dest_path, PathBuf::from("/tmp/out.parquet"));
    assert_eq!(cfg.strategy, IngestionStrategy::Streaming);

    let cfg = PipelineConfig::from_lookup(lookup(&[(ENV_SOURCE, "in.csv.gz")]))?;
    assert_eq!(cfg.source_path, PathBuf::from("in.csv.gz"));
    Ok(())
}

#[test]
fn strategy_names_and_letters_parse() -> Result<()> {
    assert_eq!("bulk".parse::<IngestionStrategy>()?, IngestionStrategy::Bulk);
    assert_eq!(" A ".parse::<IngestionStrategy>()?, IngestionStrategy::Bulk);
    assert_eq!("Streaming".parse::<IngestionStrategy>()?, IngestionStrategy::Streaming);
    assert_eq!("b".parse::<IngestionStrategy>()?, IngestionStrategy::Streaming);
    Ok(())
}

#[test]
fn unknown_strategy_is_rejected() {
    assert!("pandas".parse::<IngestionStrategy>().is_err());
    let err = PipelineConfig::from_lookup(lookup(&[(ENV_STRATEGY, "chunked")])).unwrap_err();
    assert!(format!("{err:#}").contains("chunked"));
}

#[test]
fn missing_config_file_is_an_error() {
    let res = PipelineConfig::from_lookup(lookup(&[(ENV_CONFIG, "/no/such/etl.json")]));
    assert!(res.is_err());
}

#[test]
fn worker_threads_follow_the_options() {
    let off = StreamingOptions {
        use_threads: false,
        threads: Some(8),
        ..StreamingOptions::default()
    };
    assert_eq!(off.worker_threads(), 1);

    let fixed = StreamingOptions {
        threads: Some(3),
        ..StreamingOptions::default()
    };
    assert_eq!(fixed.worker_threads(), 3);
    assert!(StreamingOptions::default().worker_threads() >= 1);
}
