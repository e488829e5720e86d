use clap::Parser;
use log::{error, info};

use litter_bench::{pipeline, Args, PipelineConfig, UltralyticsBackend};

fn main() {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = PipelineConfig::from_args(&args);
    let backend = UltralyticsBackend::from_config(&config);

    info!("Starting the benchmark pipeline in {}...", config.root.display());

    if let Err(e) = pipeline::run(&config, &backend) {
        error!("Pipeline failed: {}", e);
        std::process::exit(1);
    }
}
