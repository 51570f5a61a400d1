//! Vagrant Indicator - machine-index watcher for Vagrant VMs.
//!
//! This crate provides the core of a desktop indicator for Vagrant: it reads
//! Vagrant's machine index, watches it for changes, works out which machines
//! appeared, disappeared or changed state, and models the resulting menu and
//! notifications.
//!
//! # Overview
//!
//! Vagrant keeps the state of every machine it manages in
//! `~/.vagrant.d/data/machine-index/index` (or under `VAGRANT_HOME`). The
//! [`watcher`] re-reads that file after every settled write and hands each
//! subscriber the new snapshot together with a [`diff`] against the previous
//! one. Rendering the tray and its balloons is left to the embedding
//! application.
//!
//! # Modules
//!
//! - [`types`]: Machine records and index snapshots
//! - [`index`]: Locating and parsing the machine index
//! - [`diff`]: Added / removed / changed classification between snapshots
//! - [`watcher`]: File system watcher and subscriptions
//! - [`menu`]: Menu model for the indicator
//! - [`notification`]: Balloon notifications for a diff
//! - [`control`]: Pass-through `vagrant` commands
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for indicator operations
//! - [`utils`]: Shared utilities (debouncing)

pub mod config;
pub mod control;
pub mod diff;
pub mod error;
pub mod index;
pub mod menu;
pub mod notification;
pub mod types;
pub mod utils;
pub mod watcher;

pub use config::Config;
pub use control::{ControlError, MachineAction, VagrantControl};
pub use diff::{diff, IndexDiff};
pub use error::{IndicatorError, Result};
pub use index::{get_index, IndexError, MachineIndexReader};
pub use menu::{build_menu, MenuAction, MenuEntry};
pub use notification::{notifications_for, Notification};
pub use types::{Machine, MachineIndex, MachineState};
pub use watcher::{
    FileMonitor, IndexUpdate, IndexWatcher, MonitorHandle, NotifyMonitor, SubscriptionId,
    WatchSettings, WatcherError,
};
