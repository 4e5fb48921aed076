#![forbid(unsafe_code)]

use std::fs::OpenOptions;
use std::io::IsTerminal as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use time::UtcOffset;
use time::format_description::well_known::Rfc3339;
use tracing::Subscriber;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogConfig, LogFormat};
use crate::error::ScanwatchError;

/// Overrides `log.level` when set.
pub const LOG_ENV: &str = "SCANWATCH_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// Appends to a file; used while the TUI owns the screen.
    File(PathBuf),
}

pub fn init(cfg: &LogConfig, target: &LogTarget) -> Result<(), ScanwatchError> {
    let filter = mk_filter(&effective_level(cfg))?;
    let (writer, ansi) = match target {
        LogTarget::Stderr => (
            BoxMakeWriter::new(std::io::stderr),
            std::io::stderr().is_terminal(),
        ),
        LogTarget::File(path) => (BoxMakeWriter::new(open_log_file(path)?), false),
    };

    match cfg.format {
        LogFormat::Text => {
            let layer = fmt::layer()
                .with_ansi(ansi)
                .with_target(true)
                .with_timer(mk_timer())
                .with_writer(writer);
            init_with(tracing_subscriber::registry().with(filter).with(layer))
        }
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(true)
                .with_timer(mk_timer())
                .with_writer(writer);
            init_with(tracing_subscriber::registry().with(filter).with(layer))
        }
    }
}

fn effective_level(cfg: &LogConfig) -> String {
    std::env::var(LOG_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| cfg.level.clone())
}

fn mk_filter(level: &str) -> Result<EnvFilter, ScanwatchError> {
    EnvFilter::try_new(level).map_err(|e| ScanwatchError::InvalidConfigValue {
        key: "log.level".to_owned(),
        msg: format!("'{level}': {e}"),
    })
}

fn mk_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn open_log_file(path: &Path) -> Result<Mutex<std::fs::File>, ScanwatchError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            ScanwatchError::Config(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ScanwatchError::Config(format!("failed to open {}: {e}", path.display())))?;
    Ok(Mutex::new(file))
}

fn init_with<S>(subscriber: S) -> Result<(), ScanwatchError>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber
        .try_init()
        .map_err(|e| ScanwatchError::Other(format!("failed to initialize logging: {e}")))
}
