//! CLI command implementations

pub mod config;
pub mod demo;
pub mod exists;
pub mod export;
pub mod import;
pub mod logs;
pub mod services;

use std::path::PathBuf;

use anyhow::{Context, Result};
use ratekit_core::{EntryPoint, LogEvent, LoggingService, RatekitContext};

use crate::output;

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let ratekit_dir = get_ratekit_dir().ok()?;
    std::fs::create_dir_all(&ratekit_dir).ok()?;
    LoggingService::new(&ratekit_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Record that a command ran, ignoring any errors
pub fn log_command(command: &str) {
    if let Some(l) = get_logger() {
        let _ = l.log_command(command);
    }
}

/// Get the ratekit directory from `RATEKIT_DIR` or `~/.ratekit`
pub fn get_ratekit_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("RATEKIT_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".ratekit"))
        .context("Could not find home directory; set RATEKIT_DIR")
}

/// Build the ratekit context, loading the service catalog
///
/// Prints connection warnings (disabled TLS verification, unavailable
/// catalog) to stderr unless `quiet` is set.
pub fn get_context(quiet: bool) -> Result<RatekitContext> {
    let ratekit_dir = get_ratekit_dir()?;

    std::fs::create_dir_all(&ratekit_dir)
        .with_context(|| format!("Failed to create ratekit directory: {:?}", ratekit_dir))?;

    let context = RatekitContext::new(&ratekit_dir).context("Failed to connect to billing API")?;

    if !quiet {
        if !context.config.demo_mode && !context.config.connection.verify_ssl {
            output::warning("Warning: TLS certificate verification is disabled");
        }
        if let Some(warning) = &context.catalog_warning {
            output::warning(&format!("Warning: {}", warning));
        }
    }

    Ok(context)
}
