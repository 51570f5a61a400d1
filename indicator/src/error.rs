//! Error types for Vagrant Indicator.
//!
//! Each module defines its own error type next to the code that raises it.
//! [`IndicatorError`] gathers them for callers that drive several modules.

use thiserror::Error;

use crate::config::ConfigError;
use crate::control::ControlError;
use crate::index::IndexError;
use crate::watcher::WatcherError;

/// Errors that can occur anywhere in the indicator.
#[derive(Error, Debug)]
pub enum IndicatorError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Locating, reading or parsing the machine index failed.
    #[error("machine index error: {0}")]
    Index(#[from] IndexError),

    /// Setting up a file watch failed.
    #[error("file watch error: {0}")]
    Watch(#[from] WatcherError),

    /// Launching a Vagrant command or terminal failed.
    #[error("control error: {0}")]
    Control(#[from] ControlError),
}

/// A specialized `Result` type for indicator operations.
pub type Result<T> = std::result::Result<T, IndicatorError>;
