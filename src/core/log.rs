use std::path::PathBuf;

use anyhow::Result;
use tracing::metadata::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt::Layer, prelude::*, registry, EnvFilter};

/// Keeps the non-blocking writers alive. Dropping this flushes any buffered logs
pub struct Guard {
    _logfile: Option<WorkerGuard>,
    _stdout: WorkerGuard,
}

fn global_filter() -> Result<EnvFilter> {
    Ok(EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?)
}

pub fn init_logging_no_file() -> Result<Guard> {
    let (stdout, guard) = tracing_appender::non_blocking(std::io::stdout());
    let stdout_layer = Layer::new().with_writer(stdout).pretty();
    tracing::subscriber::set_global_default(
        registry().with(stdout_layer).with(global_filter()?),
    )?;
    // actix logs through the `log` facade
    LogTracer::init()?;
    Ok(Guard {
        _logfile: None,
        _stdout: guard,
    })
}

pub fn init_logging_with_file(log_dir: PathBuf) -> Result<Guard> {
    let appender = tracing_appender::rolling::hourly(log_dir, "sensord.log");
    let (logfile, guard0) = tracing_appender::non_blocking(appender);
    let logfile_layer = Layer::new().with_writer(logfile).with_ansi(false).compact();
    let (stdout, guard1) = tracing_appender::non_blocking(std::io::stdout());
    let stdout_layer = Layer::new().with_writer(stdout).pretty();
    tracing::subscriber::set_global_default(
        registry()
            .with(logfile_layer)
            .with(stdout_layer)
            .with(global_filter()?),
    )?;
    LogTracer::init()?;
    Ok(Guard {
        _logfile: Some(guard0),
        _stdout: guard1,
    })
}
