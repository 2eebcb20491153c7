use crate::config::LogSettings;
use crate::error::{ConfigError, ShellError};
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode, WriteLogger};
use std::fs::{self, OpenOptions};
use std::str::FromStr;

/// Picks the level: the configured one (default `warn`), raised to at
/// least `debug` by `-v`.
pub fn level(verbose: bool, configured: Option<&str>) -> Result<LevelFilter, ConfigError> {
    let level = match configured {
        Some(name) => {
            LevelFilter::from_str(name).map_err(|_| ConfigError::LogLevel(name.to_string()))?
        }
        None => LevelFilter::Warn,
    };
    Ok(if verbose {
        level.max(LevelFilter::Debug)
    } else {
        level
    })
}

/// Installs the global logger. Called once, before anything logs.
pub fn init(verbose: bool, settings: &LogSettings) -> Result<(), ShellError> {
    let level = level(verbose, settings.level.as_deref())?;
    let config = ConfigBuilder::new()
        .set_thread_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .build();

    match &settings.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            WriteLogger::init(level, config, file)?;
        }
        None => TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto)?,
    }
    Ok(())
}
