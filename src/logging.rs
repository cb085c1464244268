use std::io::Write;

use chrono::{DateTime, Local};
use clap::ValueEnum;
use env_logger::{Builder, Env};
use log::{Level, LevelFilter};

/// `--log-level` values accepted by the binaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Installs the global logger. `RUST_LOG` applies unless `level` is given;
/// the default is `info`.
pub fn init(level: Option<LogLevel>) {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.filter_level(level.into());
    }
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{}",
            format_line(Local::now(), record.level(), &record.args().to_string())
        )
    });
    // A logger may already be installed when running under a test harness.
    let _ = builder.try_init();
}

fn format_line(now: DateTime<Local>, level: Level, message: &str) -> String {
    match level {
        Level::Info => format!("{} {}", now.format("%H:%M:%S"), message),
        _ => format!("{} {:<5} {}", now.format("%H:%M:%S"), level, message),
    }
}
