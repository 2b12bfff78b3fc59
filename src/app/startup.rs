//! Application startup: arguments, configuration, logging, then the demo

use crate::app::cli::args::Args;
use crate::app::demo;
use crate::core::error_handling::log_error_with_context;
use crate::core::logging::{init_logging, level_for_verbosity};
use crate::core::version;
use crate::pubsub::api::PipelineSettings;
use clap::Parser;

/// Run the application and return the process exit code
pub fn startup() -> i32 {
    let mut args = Args::parse();

    // Stage 1: configuration file, before logging exists
    let config = match args.apply_config_file() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    // Stage 2: logging
    let base_level = args.log_level.clone().unwrap_or_else(|| "info".to_string());
    let level = level_for_verbosity(&base_level, args.verbosity());
    let log_file = args.log_file_path();
    if let Err(e) = init_logging(
        Some(level),
        args.log_format.as_deref(),
        log_file.as_deref(),
        args.use_color(),
    ) {
        eprintln!("Error: could not initialise logging: {}", e);
        return 1;
    }
    log::info!("{}", version::banner());

    // Stage 3: pipeline settings from the [pipeline] table
    let pipeline = match config.as_ref().map(PipelineSettings::from_table).transpose() {
        Ok(pipeline) => pipeline.unwrap_or_default(),
        Err(e) => {
            log::error!("Invalid [{}] configuration: {}", PipelineSettings::TABLE, e);
            return 1;
        }
    };
    let settings = args.demo_settings(pipeline);
    log::debug!("Settings: {:?}", settings);

    // Stage 4: run
    match demo::run(&settings) {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(e) => {
                log::error!("Could not render report: {}", e);
                1
            }
        },
        Err(e) => {
            log_error_with_context(&e, "Running demo pipeline");
            1
        }
    }
}
