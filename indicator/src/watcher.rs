//! Watcher for Vagrant's machine index.
//!
//! This module re-reads the machine index whenever Vagrant rewrites it and
//! hands every subscriber the new snapshot together with what changed since
//! the previous one.
//!
//! # Architecture
//!
//! Each subscription owns three things:
//!
//! - a [`MonitorHandle`] from a [`FileMonitor`], which turns file-system
//!   events for the index into unit signals on a channel;
//! - a Tokio task that waits for each burst of signals to settle, re-reads the
//!   index, diffs it against the subscription's last known snapshot and calls
//!   the listener;
//! - the listener itself, behind a mutex that cancellation clears.
//!
//! The monitor callback never blocks: it uses `try_send`, and a full channel
//! already guarantees a pending re-read. Signals are processed by a single
//! task per subscription, so updates reach the listener in the order the
//! changes were observed.
//!
//! # Example
//!
//! ```no_run
//! use vagrant_indicator::config::Config;
//! use vagrant_indicator::watcher::IndexWatcher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let mut watcher = IndexWatcher::new(&config);
//!
//!     watcher.subscribe(|update| {
//!         println!("{} machines", update.index.len());
//!         if let Some(diff) = &update.diff {
//!             for machine in &diff.changed {
//!                 println!("{} went {}", machine.name, machine.state);
//!             }
//!         }
//!     })?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     watcher.unsubscribe_all();
//!     Ok(())
//! }
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use notify::{
    event::{AccessKind, AccessMode, ModifyKind},
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::{Config, DEFAULT_DEBOUNCE_MS, DEFAULT_MAX_WAIT_MS, DEFAULT_RETRY_DELAY_MS};
use crate::diff::{self, IndexDiff};
use crate::index::{IndexError, MachineIndexReader};
use crate::types::MachineIndex;
use crate::utils::debounce::settle;

/// Capacity of each subscription's signal channel.
///
/// Signals carry no data, so a full channel loses nothing: a re-read is
/// already queued.
const SIGNAL_CAPACITY: usize = 16;

/// Errors that can occur while setting up a subscription.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to initialize the file system watcher.
    #[error("failed to create watcher: {0}")]
    MonitorInit(#[from] notify::Error),

    /// The directory holding the index does not exist.
    #[error("machine index directory does not exist: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// `subscribe` was called outside a Tokio runtime.
    #[error("subscriptions require a running Tokio runtime")]
    NoRuntime,
}

/// Result type for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Keeps an OS-level monitor registration alive.
///
/// Dropping the handle cancels the registration.
pub struct MonitorHandle {
    _guard: Box<dyn Any + Send>,
}

impl MonitorHandle {
    /// Wraps whatever value keeps a monitor registration alive.
    pub fn new<G: Send + 'static>(guard: G) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

impl fmt::Debug for MonitorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorHandle").finish_non_exhaustive()
    }
}

/// Source of change notifications for a single file.
pub trait FileMonitor: Send + Sync + 'static {
    /// Starts reporting changes to `path`.
    ///
    /// Every observed change sends one signal on `on_change`. Signals stop
    /// once the returned handle is dropped.
    fn watch(&self, path: &Path, on_change: mpsc::Sender<()>) -> Result<MonitorHandle>;
}

/// [`FileMonitor`] backed by the platform's native notification API.
///
/// Watches the index's parent directory rather than the file itself, so the
/// registration survives the file being replaced by a rename.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyMonitor;

impl FileMonitor for NotifyMonitor {
    fn watch(&self, path: &Path, on_change: mpsc::Sender<()>) -> Result<MonitorHandle> {
        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        if !dir.is_dir() {
            return Err(WatcherError::DirectoryNotFound(dir));
        }

        let file_name = path.file_name().map(OsString::from).unwrap_or_default();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                handle_notify_event(res, &file_name, &on_change);
            },
            notify::Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        debug!(
            dir = %dir.display(),
            path = %path.display(),
            "Started machine index watch"
        );

        Ok(MonitorHandle::new(watcher))
    }
}

/// Filters notify events down to content changes of the index file.
fn handle_notify_event(
    res: std::result::Result<Event, notify::Error>,
    file_name: &OsString,
    on_change: &mpsc::Sender<()>,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "File watcher error");
            return;
        }
    };

    trace!(kind = ?event.kind, paths = ?event.paths, "Received notify event");

    let touches_index = event
        .paths
        .iter()
        .any(|path| path.file_name() == Some(file_name.as_os_str()));
    if !touches_index || !is_content_change(&event.kind) {
        return;
    }

    // A full channel means a re-read is already pending.
    if let Err(mpsc::error::TrySendError::Closed(())) = on_change.try_send(()) {
        trace!("Change signal dropped, subscription closed");
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Remove(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
    )
}

/// Timing knobs for a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    /// Quiet period that marks the end of a write.
    pub debounce: Duration,

    /// Delay before a failed re-read is retried once.
    pub retry_delay: Duration,

    /// Longest a continuous burst of changes can defer a re-read.
    pub max_wait: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_wait: Duration::from_millis(DEFAULT_MAX_WAIT_MS),
        }
    }
}

impl From<&Config> for WatchSettings {
    fn from(config: &Config) -> Self {
        Self {
            debounce: config.debounce,
            retry_delay: config.retry_delay,
            max_wait: config.max_wait,
        }
    }
}

/// What a listener receives after each settled change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexUpdate {
    /// The freshly read snapshot.
    pub index: MachineIndex,

    /// Changes since the subscription's previous snapshot.
    ///
    /// `None` when there was no previous snapshot, e.g. the index did not
    /// exist yet when the subscription was made.
    pub diff: Option<IndexDiff>,
}

/// Identifies one subscription on an [`IndexWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type Listener = Box<dyn FnMut(&IndexUpdate) + Send + 'static>;

type SharedListener = Arc<Mutex<Option<Listener>>>;

struct Subscription {
    _monitor: MonitorHandle,
    listener: SharedListener,
    task: JoinHandle<()>,
}

impl Subscription {
    fn cancel(self) {
        // Taking the listener under its lock waits out a call in flight.
        lock_listener(&self.listener).take();
        self.task.abort();
    }
}

/// Watches the machine index and notifies subscribers of changes.
///
/// Every subscription keeps its own last known snapshot, replaced wholesale
/// after each successful read and listener call. A failed re-read is retried
/// once; if it fails again the cycle is skipped and the last known snapshot
/// stays in place.
///
/// Dropping the watcher cancels all subscriptions.
pub struct IndexWatcher<M: FileMonitor = NotifyMonitor> {
    reader: MachineIndexReader,
    monitor: M,
    settings: WatchSettings,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    next_id: u64,
}

impl IndexWatcher<NotifyMonitor> {
    /// Creates a watcher for the configured index using native notifications.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::with_monitor(config.index_path(), NotifyMonitor, WatchSettings::from(config))
    }
}

impl<M: FileMonitor> IndexWatcher<M> {
    /// Creates a watcher for the index at `index_path` using `monitor` as the
    /// source of change notifications.
    pub fn with_monitor(index_path: impl Into<PathBuf>, monitor: M, settings: WatchSettings) -> Self {
        Self {
            reader: MachineIndexReader::new(index_path),
            monitor,
            settings,
            subscriptions: HashMap::new(),
            next_id: 0,
        }
    }

    /// Returns the watched index path.
    #[must_use]
    pub fn index_path(&self) -> &Path {
        self.reader.path()
    }

    #[must_use]
    pub fn settings(&self) -> WatchSettings {
        self.settings
    }

    /// Returns the number of active subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Subscribes `listener` to index changes.
    ///
    /// The monitor is registered first and the baseline snapshot is read
    /// afterwards, so a write landing in between still triggers an update.
    /// A baseline read that fails on a partly written index is retried once
    /// after `retry_delay`. If the index is missing or stays unreadable, the
    /// first update carries no diff.
    ///
    /// The listener runs on a Tokio worker. It must not block for long and
    /// must not cancel its own subscription.
    ///
    /// # Errors
    ///
    /// - [`WatcherError::NoRuntime`] outside a Tokio runtime
    /// - [`WatcherError::DirectoryNotFound`] if the index directory is missing
    /// - [`WatcherError::MonitorInit`] if the OS watch cannot be registered
    pub fn subscribe<F>(&mut self, listener: F) -> Result<SubscriptionId>
    where
        F: FnMut(&IndexUpdate) + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| WatcherError::NoRuntime)?;

        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CAPACITY);
        let monitor = self.monitor.watch(self.reader.path(), signal_tx)?;

        let baseline = self.reader.read();
        Ok(self.start(&runtime, monitor, signal_rx, baseline, listener))
    }

    /// Subscribes `listener`, diffing the first update against `baseline`.
    ///
    /// Use this when the caller already shows a snapshot, so that the
    /// subscription reports every change relative to what the caller has.
    /// The index is re-read once right after the monitor is registered,
    /// which reports changes made since `baseline` was read.
    ///
    /// # Errors
    ///
    /// Same as [`IndexWatcher::subscribe`].
    pub fn subscribe_from<F>(&mut self, baseline: MachineIndex, listener: F) -> Result<SubscriptionId>
    where
        F: FnMut(&IndexUpdate) + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| WatcherError::NoRuntime)?;

        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CAPACITY);
        let monitor = self.monitor.watch(self.reader.path(), signal_tx.clone())?;

        // Catch up on writes that landed before the monitor existed.
        let _ = signal_tx.try_send(());

        Ok(self.start(&runtime, monitor, signal_rx, Ok(baseline), listener))
    }

    fn start<F>(
        &mut self,
        runtime: &Handle,
        monitor: MonitorHandle,
        signal_rx: mpsc::Receiver<()>,
        baseline: std::result::Result<MachineIndex, IndexError>,
        listener: F,
    ) -> SubscriptionId
    where
        F: FnMut(&IndexUpdate) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let listener: Listener = Box::new(listener);
        let listener: SharedListener = Arc::new(Mutex::new(Some(listener)));
        let task = runtime.spawn(run_subscription(
            id,
            signal_rx,
            self.reader.clone(),
            self.settings,
            Arc::clone(&listener),
            baseline,
        ));

        self.subscriptions.insert(
            id,
            Subscription {
                _monitor: monitor,
                listener,
                task,
            },
        );

        info!(
            subscription = %id,
            path = %self.reader.path().display(),
            "Subscribed to machine index"
        );

        id
    }

    /// Cancels one subscription.
    ///
    /// Returns `false` if `id` is not active. Once this returns, the
    /// subscription's listener is not called again.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        match self.subscriptions.remove(&id) {
            Some(subscription) => {
                subscription.cancel();
                debug!(subscription = %id, "Unsubscribed from machine index");
                true
            }
            None => false,
        }
    }

    /// Cancels every subscription and releases their monitors.
    ///
    /// Once this returns, no listener is called until `subscribe` is called
    /// again. Does nothing when there are no subscriptions.
    pub fn unsubscribe_all(&mut self) {
        if self.subscriptions.is_empty() {
            return;
        }

        let count = self.subscriptions.len();
        for (_, subscription) in self.subscriptions.drain() {
            subscription.cancel();
        }

        info!(count, "Cancelled all machine index subscriptions");
    }
}

impl<M: FileMonitor> Drop for IndexWatcher<M> {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

impl<M: FileMonitor> fmt::Debug for IndexWatcher<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexWatcher")
            .field("index_path", &self.reader.path())
            .field("settings", &self.settings)
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

/// Drives one subscription until its signal channel closes or it is cancelled.
async fn run_subscription(
    id: SubscriptionId,
    mut signals: mpsc::Receiver<()>,
    reader: MachineIndexReader,
    settings: WatchSettings,
    listener: SharedListener,
    baseline: std::result::Result<MachineIndex, IndexError>,
) {
    let mut last_known = resolve_baseline(id, &reader, settings.retry_delay, baseline).await;

    while let Some(signal_count) = settle(&mut signals, settings.debounce, settings.max_wait).await {
        debug!(subscription = %id, signal_count, "Machine index changed");

        let index = match read_with_retry(&reader, settings.retry_delay).await {
            Ok(index) => index,
            Err(e) => {
                warn!(
                    subscription = %id,
                    path = %reader.path().display(),
                    error = %e,
                    "Failed to re-read machine index, keeping last known state"
                );
                continue;
            }
        };

        let changes = last_known.as_ref().map(|old| diff::diff(&index, old));
        if let Some(changes) = &changes {
            debug!(
                subscription = %id,
                added = changes.added.len(),
                removed = changes.removed.len(),
                changed = changes.changed.len(),
                "Computed machine index diff"
            );
        }

        let update = IndexUpdate {
            index,
            diff: changes,
        };

        {
            let mut guard = lock_listener(&listener);
            match guard.as_mut() {
                Some(listener) => listener(&update),
                None => break,
            }
        }

        last_known = Some(update.index);
    }

    debug!(subscription = %id, "Subscription task finished");
}

/// Turns the read made at subscribe time into the subscription's baseline.
///
/// A missing index means there is nothing to diff against. Any other failure
/// is treated like a failed re-read and retried once.
async fn resolve_baseline(
    id: SubscriptionId,
    reader: &MachineIndexReader,
    retry_delay: Duration,
    baseline: std::result::Result<MachineIndex, IndexError>,
) -> Option<MachineIndex> {
    let retried = match baseline {
        Ok(index) => return Some(index),
        Err(e) if e.is_not_found() => Err(e),
        Err(e) => {
            debug!(
                subscription = %id,
                error = %e,
                retry_ms = retry_delay.as_millis(),
                "Baseline read failed, retrying once"
            );
            tokio::time::sleep(retry_delay).await;
            reader.read()
        }
    };

    match retried {
        Ok(index) => Some(index),
        Err(e) => {
            warn!(
                subscription = %id,
                path = %reader.path().display(),
                error = %e,
                "No baseline machine index, first update will carry no diff"
            );
            None
        }
    }
}

/// Reads the index, retrying once after `retry_delay`.
///
/// Change notifications can arrive while Vagrant is still mid-write, in which
/// case the first read sees a truncated document.
async fn read_with_retry(
    reader: &MachineIndexReader,
    retry_delay: Duration,
) -> std::result::Result<MachineIndex, IndexError> {
    match reader.read() {
        Ok(index) => Ok(index),
        Err(e) => {
            debug!(
                error = %e,
                retry_ms = retry_delay.as_millis(),
                "Machine index read failed, retrying once"
            );
            tokio::time::sleep(retry_delay).await;
            reader.read()
        }
    }
}

fn lock_listener(listener: &SharedListener) -> MutexGuard<'_, Option<Listener>> {
    listener.lock().unwrap_or_else(PoisonError::into_inner)
}
