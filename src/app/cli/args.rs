//! Command line arguments for the demonstration binary
//!
//! Configuration-file loading lives in `config`; this module only defines
//! the argument structure and the values derived from it.

use crate::pubsub::api::PipelineSettings;
use clap::{ArgAction, Parser};
use std::io::IsTerminal;
use std::path::PathBuf;

pub const DEFAULT_READINGS: usize = 20;
pub const DEFAULT_SENSORS: usize = 3;
pub const DEFAULT_ALARM_THRESHOLD: f64 = 90.0;
pub const DEFAULT_SUMMARY_EVERY: usize = 5;

// Command line options
//
// Every option is optional so that unset values can be filled from the
// configuration file; CLI values always win.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "fanout")]
#[command(about = "Run a small typed publish/subscribe pipeline")]
#[command(version)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config-file", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Force colored output
    #[arg(short = 'g', long = "color", conflicts_with = "no_color")]
    pub color: bool,

    /// Disable colored output
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Log level
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error", "off"])]
    pub log_level: Option<String>,

    /// Log file path (use 'none' to disable file logging)
    #[arg(short = 'f', long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(short = 'o', long = "log-format", value_name = "FORMAT", value_parser = ["text", "ext", "json"])]
    pub log_format: Option<String>,

    /// Increase verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Decrease verbosity (repeatable)
    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    /// Readings published per sensor
    #[arg(short = 'n', long = "readings", value_name = "COUNT")]
    pub readings: Option<usize>,

    /// Number of simulated sensors
    #[arg(short = 's', long = "sensors", value_name = "COUNT")]
    pub sensors: Option<usize>,

    /// Reading value at or above which an alarm is raised
    #[arg(short = 'a', long = "alarm-threshold", value_name = "VALUE")]
    pub alarm_threshold: Option<f64>,

    /// Readings between two summaries
    #[arg(long = "summary-every", value_name = "COUNT")]
    pub summary_every: Option<usize>,

    /// Master queue depth of each subscriber (0 = unbounded)
    #[arg(long = "governor", value_name = "DEPTH")]
    pub governor: Option<usize>,
}

/// Everything the demo pipeline needs, after CLI and config are merged
#[derive(Debug, Clone, PartialEq)]
pub struct DemoSettings {
    pub readings: usize,
    pub sensors: usize,
    pub alarm_threshold: f64,
    pub summary_every: usize,
    pub pipeline: PipelineSettings,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            readings: DEFAULT_READINGS,
            sensors: DEFAULT_SENSORS,
            alarm_threshold: DEFAULT_ALARM_THRESHOLD,
            summary_every: DEFAULT_SUMMARY_EVERY,
            pipeline: PipelineSettings::default(),
        }
    }
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Net `-v`/`-q` count
    pub fn verbosity(&self) -> i8 {
        (self.verbose as i8).saturating_sub(self.quiet as i8)
    }

    /// Explicit flags first, otherwise color only when stdout is a terminal
    pub fn use_color(&self) -> bool {
        if self.no_color {
            false
        } else if self.color {
            true
        } else {
            std::io::stdout().is_terminal()
        }
    }

    /// Log file path, with the magic values "none" and "-" disabling it
    pub fn log_file_path(&self) -> Option<String> {
        let path = self.log_file.as_ref()?.to_string_lossy().to_string();
        if path.eq_ignore_ascii_case("none") || path == "-" {
            None
        } else {
            Some(path)
        }
    }

    /// Merge arguments over the pipeline settings read from the config file
    pub fn demo_settings(&self, pipeline: PipelineSettings) -> DemoSettings {
        let mut pipeline = pipeline;
        if let Some(governor) = self.governor {
            pipeline.master_queue_capacity = governor;
        }
        DemoSettings {
            readings: self.readings.unwrap_or(DEFAULT_READINGS),
            sensors: self.sensors.unwrap_or(DEFAULT_SENSORS).max(1),
            alarm_threshold: self.alarm_threshold.unwrap_or(DEFAULT_ALARM_THRESHOLD),
            summary_every: self.summary_every.unwrap_or(DEFAULT_SUMMARY_EVERY).max(1),
            pipeline,
        }
    }
}
