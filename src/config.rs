use crate::error::ConfigError;
use crate::parser::{Limits, MAX_ARGS, MAX_COMMANDS};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "minish";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub shell: ShellSettings,
    pub log: LogSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShellSettings {
    /// Where line history is persisted. Defaults to `<data_dir>/minish/history`.
    pub history_file: Option<PathBuf>,
    pub history_size: usize,
    pub color_prompt: bool,
    pub max_commands: usize,
    pub max_args: usize,
}

impl Default for ShellSettings {
    fn default() -> Self {
        ShellSettings {
            history_file: None,
            history_size: 1000,
            color_prompt: true,
            max_commands: MAX_COMMANDS,
            max_args: MAX_ARGS,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `error`, `warn`, `info`, `debug`, `trace` or `off`.
    pub level: Option<String>,
    /// Log to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist and parse. Without one, the default
    /// location `~/.config/minish/config.toml` is tried and a missing file
    /// silently yields the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) => match fs::read_to_string(&path) {
                Ok(text) => Self::from_toml(&text, &path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
                Err(source) => Err(ConfigError::Read { path, source }),
            },
            None => Ok(Config::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
    }

    pub fn history_path(&self) -> Option<PathBuf> {
        self.shell
            .history_file
            .clone()
            .or_else(|| dirs_next::data_dir().map(|d| d.join(APP_DIR).join("history")))
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_commands: self.shell.max_commands.max(1),
            max_args: self.shell.max_args.max(1),
        }
    }
}
