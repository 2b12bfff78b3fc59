//! Logging initialisation on top of flexi_logger
//!
//! The library only emits through the `log` facade; the binary (or any
//! other orchestration layer) decides where the records go by calling
//! [`init_logging`] once at startup.

use std::sync::{Mutex, OnceLock};

// File output stops when the handle is dropped, so it lives for the process
static LOGGER_HANDLE: OnceLock<Mutex<flexi_logger::LoggerHandle>> = OnceLock::new();

/// Initialise the global logger
///
/// `log_format` is one of `text` (default), `ext` (adds source location) or
/// `json`. When `log_file` is given, records go to that file instead of
/// stderr.
pub fn init_logging(
    log_level: Option<&str>,
    log_format: Option<&str>,
    log_file: Option<&str>,
    color_enabled: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    use flexi_logger::{FileSpec, Logger};

    let level_str = log_level.unwrap_or("info");
    let format_type = log_format.unwrap_or("text");

    let mut logger = Logger::try_with_str(level_str)?;

    logger = match (format_type, color_enabled) {
        ("json", _) => logger.format(json_format),
        ("ext", true) => logger.format(extended_color_format),
        ("ext", false) => logger.format(extended_format),
        (_, true) => logger.format(simple_color_format),
        (_, false) => logger.format(simple_format),
    };

    if let Some(file_path) = log_file {
        let file_spec = FileSpec::try_from(std::path::Path::new(file_path))?;
        logger = logger.log_to_file(file_spec);
    }

    let handle = logger.start()?;
    let _ = LOGGER_HANDLE.set(Mutex::new(handle));

    Ok(())
}

/// Map `-v`/`-q` counts onto a level name
///
/// Zero keeps `base`; each `-v` raises verbosity by one step and each `-q`
/// lowers it, clamped to `trace`..`off`.
pub fn level_for_verbosity(base: &str, verbosity: i8) -> &'static str {
    const LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];
    let start = LEVELS
        .iter()
        .position(|level| level.eq_ignore_ascii_case(base))
        .unwrap_or(3) as i16;
    let index = (start + verbosity as i16).clamp(0, LEVELS.len() as i16 - 1);
    LEVELS[index as usize]
}

fn level_abbr(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERR",
        log::Level::Warn => "WRN",
        log::Level::Info => "INF",
        log::Level::Debug => "DBG",
        log::Level::Trace => "TRC",
    }
}

fn level_colored(level: log::Level) -> colored::ColoredString {
    use colored::*;

    let abbr = level_abbr(level);
    match level {
        log::Level::Error => abbr.red().bold(),
        log::Level::Warn => abbr.yellow(),
        log::Level::Info => abbr.green(),
        log::Level::Debug => abbr.blue(),
        log::Level::Trace => abbr.magenta(),
    }
}

/// Every pipeline stage runs on its own named thread, so records carry it
fn thread_label() -> String {
    std::thread::current()
        .name()
        .unwrap_or("unnamed")
        .to_string()
}

// "YYYY-MM-DD HH:mm:ss.fff INF [thread] message", plus " (path.rs:line)"
// when the source location is requested
fn write_line(
    w: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &log::Record,
    color: bool,
    with_source: bool,
) -> Result<(), std::io::Error> {
    use colored::*;

    let timestamp = now.format("%Y-%m-%d %H:%M:%S%.3f").to_string();
    let thread = format!("[{}]", thread_label());
    if color {
        write!(
            w,
            "{} {} {} {}",
            timestamp.dimmed(),
            level_colored(record.level()),
            thread.cyan(),
            record.args()
        )?;
    } else {
        write!(
            w,
            "{} {} {} {}",
            timestamp,
            level_abbr(record.level()),
            thread,
            record.args()
        )?;
    }
    if with_source {
        let source = format_target_as_path(record.target(), record.line());
        if color {
            write!(w, " ({})", source.dimmed())?;
        } else {
            write!(w, " ({})", source)?;
        }
    }
    Ok(())
}

fn simple_format(
    w: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    write_line(w, now, record, false, false)
}

fn simple_color_format(
    w: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    write_line(w, now, record, true, false)
}

fn extended_format(
    w: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    write_line(w, now, record, false, true)
}

fn extended_color_format(
    w: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    write_line(w, now, record, true, true)
}

fn json_format(
    w: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    let line = serde_json::json!({
        "timestamp": now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        "level": level_abbr(record.level()),
        "thread": thread_label(),
        "message": record.args().to_string(),
        "target": format_target_as_path(record.target(), record.line())
    });

    match serde_json::to_string(&line) {
        Ok(text) => w.write_all(text.as_bytes()),
        Err(_) => w.write_all(b"{\"error\":\"unserialisable log record\"}"),
    }
}

// fanout::pubsub::subscriber -> pubsub/subscriber.rs
fn format_target_as_path(target: &str, line: Option<u32>) -> String {
    let path = match target.strip_prefix("fanout::") {
        Some(module) => format!("{}.rs", module.replace("::", "/")),
        None => target.replace("::", "/"),
    };
    match line {
        Some(line) => format!("{path}:{line}"),
        None => path,
    }
}
