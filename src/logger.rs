//! stderr logger for the command line front end.
//!
//! The library only uses the `log` macros; installing a logger is up to the
//! binary.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use parking_lot::Mutex;

/// Level filter, e.g. `GITWIKI_LOG=debug`.
pub const LOG_LEVEL_VAR: &str = "GITWIKI_LOG";
/// Also append log lines to this file.
pub const LOG_FILE_VAR: &str = "GITWIKI_LOG_FILE";

pub struct Logger {
    level: Level,
    colors: bool,
    file: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(level: Level, colors: bool, file: Option<&Path>) -> Self {
        let file = file.and_then(|path| {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    eprintln!("cannot create log directory {}: {}", parent.display(), e);
                    return None;
                }
            }
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => Some(file),
                Err(e) => {
                    eprintln!("cannot open log file {}: {}", path.display(), e);
                    None
                }
            }
        });
        Self {
            level,
            colors,
            file: file.map(Mutex::new),
        }
    }

    /// Install the logger. `verbose` forces debug output, otherwise the
    /// level comes from `GITWIKI_LOG` / `RUST_LOG` and defaults to warn.
    pub fn init(verbose: bool) -> Result<(), SetLoggerError> {
        let level = if verbose {
            Level::Debug
        } else {
            std::env::var(LOG_LEVEL_VAR)
                .or_else(|_| std::env::var("RUST_LOG"))
                .ok()
                .and_then(|value| value.parse::<Level>().ok())
                .unwrap_or(Level::Warn)
        };
        let colors = std::env::var_os("NO_COLOR").is_none();
        let file = std::env::var_os(LOG_FILE_VAR);

        let logger = Logger::new(level, colors, file.as_deref().map(Path::new));
        log::set_max_level(LevelFilter::Trace);
        log::set_logger(Box::leak(Box::new(logger)))
    }

    fn color(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[36m",
            Level::Debug => "\x1b[35m",
            Level::Trace => "\x1b[37m",
        }
    }

    fn format(&self, record: &Record, colors: bool) -> String {
        let timestamp = Local::now().format("%H:%M:%S");
        let level = record.level().as_str();
        if colors {
            format!(
                "{}[{}] {}\x1b[0m {}",
                Self::color(record.level()),
                timestamp,
                level,
                record.args()
            )
        } else {
            format!("[{}] {} {}", timestamp, level, record.args())
        }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let _ = writeln!(std::io::stderr(), "{}", self.format(record, self.colors));
        if let Some(file) = &self.file {
            let _ = writeln!(file.lock(), "{}", self.format(record, false));
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
        if let Some(file) = &self.file {
            let _ = file.lock().flush();
        }
    }
}
