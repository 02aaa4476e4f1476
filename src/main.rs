use incident_etl::{PipelineConfig, Runner};
use log::{error, info};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .format_timestamp_millis()
        .init();

    let config = match PipelineConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Something bad happened: {e:#}");
            return;
        }
    };
    info!(
        "Source: {}, destination: {}, strategy: {:?}",
        config.source_path.display(),
        config.dest_path.display(),
        config.strategy
    );

    let outcome = Runner::new(config).run();
    outcome.metrics.log_summary();
}
