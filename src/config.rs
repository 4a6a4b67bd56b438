//! Configuration for spongeshell.
//!
//! Settings are read from `~/.spongeshell/config.toml` if it exists. The
//! file is optional and never written; every key falls back to a default.
//!
//! ```toml
//! # Shell program (default: cmd.exe on Windows, $SHELL elsewhere)
//! shell = "pwsh.exe"
//!
//! # Replaces the shell's default arguments
//! args = ["-NoLogo", "-NoExit"]
//!
//! # Start directory (default: home directory)
//! working_dir = "C:/work"
//!
//! # "crlf" or "lf" (default: crlf on Windows, lf elsewhere)
//! line_ending = "crlf"
//!
//! # Quit when the shell exits
//! close_on_exit = true
//!
//! # Log filter, overridden by RUST_LOG
//! log_level = "info"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::shell::{home_dir, LineEnding, ShellCommand};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shell program
    pub shell: Option<String>,
    /// Shell arguments, replacing the defaults for the program
    pub args: Option<Vec<String>>,
    /// Start directory
    pub working_dir: Option<PathBuf>,
    /// Line ending written after a command
    pub line_ending: Option<LineEnding>,
    /// Quit when the shell exits
    pub close_on_exit: bool,
    /// Log filter directive
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: None,
            args: None,
            working_dir: None,
            line_ending: None,
            close_on_exit: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load from the default location; a missing file yields defaults
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `~/.spongeshell`
    pub fn config_dir() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".spongeshell"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Shell command with this config applied over the platform default
    pub fn shell_command(&self) -> ShellCommand {
        let mut command = ShellCommand::platform_default();
        if let Some(shell) = &self.shell {
            command = command.with_program(shell.clone());
        }
        if let Some(args) = &self.args {
            command.args = args.clone();
        }
        if let Some(dir) = &self.working_dir {
            command.working_dir = Some(dir.clone());
        }
        if let Some(line_ending) = self.line_ending {
            command.line_ending = line_ending;
        }
        command
    }
}
