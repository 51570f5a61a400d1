//! Configuration module for Vagrant Indicator.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `VAGRANT_HOME` | No | `~/.vagrant.d` | Vagrant home directory (`~` is expanded) |
//! | `VAGRANT_INDICATOR_DEBOUNCE_MS` | No | 100 | Quiet period before the index is re-read |
//! | `VAGRANT_INDICATOR_RETRY_DELAY_MS` | No | 50 | Delay before retrying a failed re-read |
//! | `VAGRANT_INDICATOR_MAX_WAIT_MS` | No | 1000 | Longest a burst of writes can defer a re-read |
//! | `VAGRANT_INDICATOR_VAGRANT_BIN` | No | `vagrant` | Vagrant executable |
//! | `VAGRANT_INDICATOR_TERMINAL` | No | `x-terminal-emulator` | Terminal launcher |
//!
//! # Example
//!
//! ```no_run
//! use vagrant_indicator::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Machine index: {}", config.index_path().display());
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use thiserror::Error;

/// Environment variable Vagrant itself uses to relocate its home directory.
pub const VAGRANT_HOME_VAR: &str = "VAGRANT_HOME";

/// Default Vagrant home relative to the user's home directory.
const DEFAULT_VAGRANT_HOME: &str = ".vagrant.d";

/// Location of the machine index relative to the Vagrant home.
pub const MACHINE_INDEX_PATH: &str = "data/machine-index/index";

/// Default quiet period before re-reading the index (in milliseconds).
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Default delay before the single retry of a failed re-read (in milliseconds).
pub const DEFAULT_RETRY_DELAY_MS: u64 = 50;

/// Default upper bound on how long a burst of writes can defer a re-read
/// (in milliseconds).
pub const DEFAULT_MAX_WAIT_MS: u64 = 1000;

const DEFAULT_VAGRANT_BIN: &str = "vagrant";

const DEFAULT_TERMINAL: &str = "x-terminal-emulator";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Configuration for Vagrant Indicator.
#[derive(Debug, Clone)]
pub struct Config {
    /// Vagrant home directory (`VAGRANT_HOME`, default `~/.vagrant.d`).
    pub vagrant_home: PathBuf,

    /// How long the index must stay quiet after a change before it is re-read.
    pub debounce: Duration,

    /// Delay before a failed re-read is retried once.
    pub retry_delay: Duration,

    /// Longest a continuous burst of changes can defer a re-read.
    pub max_wait: Duration,

    /// Vagrant executable used for lifecycle commands.
    pub vagrant_bin: String,

    /// Terminal emulator launched by "Open terminal".
    pub terminal: String,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - A millisecond setting is present but not a non-negative integer
    /// - The home directory cannot be determined (needed for default paths)
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
        let home_dir = base_dirs.home_dir();

        // Optional: VAGRANT_HOME (default: ~/.vagrant.d)
        let vagrant_home = non_empty_var(VAGRANT_HOME_VAR)
            .map(|val| expand_home(&val, home_dir))
            .unwrap_or_else(|| home_dir.join(DEFAULT_VAGRANT_HOME));

        let debounce = millis_var("VAGRANT_INDICATOR_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)?;
        let retry_delay = millis_var("VAGRANT_INDICATOR_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS)?;
        let max_wait = millis_var("VAGRANT_INDICATOR_MAX_WAIT_MS", DEFAULT_MAX_WAIT_MS)?;

        let vagrant_bin = non_empty_var("VAGRANT_INDICATOR_VAGRANT_BIN")
            .unwrap_or_else(|| DEFAULT_VAGRANT_BIN.to_string());
        let terminal = non_empty_var("VAGRANT_INDICATOR_TERMINAL")
            .unwrap_or_else(|| DEFAULT_TERMINAL.to_string());

        Ok(Self {
            vagrant_home,
            debounce,
            retry_delay,
            max_wait,
            vagrant_bin,
            terminal,
        })
    }

    /// Creates a configuration rooted at an explicit Vagrant home, with every
    /// other setting at its default.
    #[must_use]
    pub fn with_vagrant_home(vagrant_home: impl Into<PathBuf>) -> Self {
        Self {
            vagrant_home: vagrant_home.into(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_wait: Duration::from_millis(DEFAULT_MAX_WAIT_MS),
            vagrant_bin: DEFAULT_VAGRANT_BIN.to_string(),
            terminal: DEFAULT_TERMINAL.to_string(),
        }
    }

    /// Returns the path where the machine index is expected.
    ///
    /// The path is not checked for existence.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.vagrant_home.join(MACHINE_INDEX_PATH)
    }
}

/// Expands a leading `~` to the user's home directory.
fn expand_home(value: &str, home_dir: &Path) -> PathBuf {
    if value == "~" {
        return home_dir.to_path_buf();
    }
    match value.strip_prefix("~/") {
        Some(rest) => home_dir.join(rest),
        None => PathBuf::from(value),
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

fn millis_var(key: &str, default: u64) -> Result<Duration, ConfigError> {
    match env::var(key) {
        Ok(val) => {
            let millis = val
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("expected milliseconds as a non-negative integer, got '{val}'"),
                })?;
            Ok(Duration::from_millis(millis))
        }
        Err(_) => Ok(Duration::from_millis(default)),
    }
}
