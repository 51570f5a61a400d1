//! Vagrant Indicator - machine-index watcher for Vagrant VMs.
//!
//! This binary is the console front end of the indicator: it lists machines,
//! follows the machine index and prints what a tray would show, and runs
//! lifecycle commands.
//!
//! # Commands
//!
//! - `vagrant-indicator list`: Print the menu for the current machine index
//! - `vagrant-indicator watch`: Follow the machine index and print notifications
//! - `vagrant-indicator up|halt|destroy <ID>`: Run a lifecycle command
//! - `vagrant-indicator terminal <ID>`: Open a terminal in a machine's directory
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use vagrant_indicator::config::Config;
use vagrant_indicator::control::{ControlError, MachineAction, VagrantControl};
use vagrant_indicator::index::get_index;
use vagrant_indicator::menu::build_menu;
use vagrant_indicator::notification::notifications_for;
use vagrant_indicator::types::{Machine, MachineIndex};
use vagrant_indicator::watcher::{IndexUpdate, IndexWatcher};

/// Capacity of the channel between the watcher and the print loop.
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Vagrant Indicator - machine-index watcher for Vagrant VMs.
///
/// Reads Vagrant's machine index, follows it for state changes and runs
/// lifecycle commands against machines.
#[derive(Parser, Debug)]
#[command(name = "vagrant-indicator")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    VAGRANT_HOME                      Vagrant home (default: ~/.vagrant.d)
    VAGRANT_INDICATOR_DEBOUNCE_MS     Quiet period before re-reading (default: 100)
    VAGRANT_INDICATOR_RETRY_DELAY_MS  Delay before retrying a failed read (default: 50)
    VAGRANT_INDICATOR_MAX_WAIT_MS     Longest a burst of writes defers a read (default: 1000)
    VAGRANT_INDICATOR_VAGRANT_BIN     Vagrant executable (default: vagrant)
    VAGRANT_INDICATOR_TERMINAL        Terminal launcher (default: x-terminal-emulator)

EXAMPLES:
    # Show all machines
    vagrant-indicator list

    # Follow state changes
    vagrant-indicator watch

    # Start a machine by id
    vagrant-indicator up 1a2b3c4
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Print the menu for the current machine index.
    List,

    /// Follow the machine index and print notifications and the menu.
    ///
    /// Runs until Ctrl+C or SIGTERM.
    Watch,

    /// Start a machine (`vagrant up`).
    Up {
        /// Machine id from the machine index.
        id: String,
    },

    /// Stop a machine (`vagrant halt`).
    Halt {
        /// Machine id from the machine index.
        id: String,
    },

    /// Destroy a machine (`vagrant destroy --force`).
    Destroy {
        /// Machine id from the machine index.
        id: String,
    },

    /// Open a terminal in the machine's Vagrantfile directory.
    Terminal {
        /// Machine id from the machine index.
        id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging();

    let config = Config::from_env().context("Failed to load configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    match cli.command {
        Command::List => run_list(&config),
        Command::Watch => runtime.block_on(run_watch(&config)),
        Command::Up { id } => runtime.block_on(run_action(&config, MachineAction::Up, &id)),
        Command::Halt { id } => runtime.block_on(run_action(&config, MachineAction::Halt, &id)),
        Command::Destroy { id } => {
            runtime.block_on(run_action(&config, MachineAction::Destroy, &id))
        }
        Command::Terminal { id } => runtime.block_on(run_terminal(&config, &id)),
    }
}

/// Prints the menu for the current index.
fn run_list(config: &Config) -> Result<()> {
    let index = get_index(config).context("Failed to read machine index")?;
    print_menu(&index);
    Ok(())
}

/// Follows the index until a shutdown signal arrives.
async fn run_watch(config: &Config) -> Result<()> {
    info!(
        index_path = %config.index_path().display(),
        "Starting Vagrant Indicator"
    );

    // First read happens up front so a missing index is reported, not shown
    // as an empty menu. The watcher diffs against this same snapshot.
    let index = get_index(config).context("Failed to read machine index")?;
    print_menu(&index);

    let (update_tx, mut update_rx) = mpsc::channel::<IndexUpdate>(UPDATE_CHANNEL_CAPACITY);

    let mut watcher = IndexWatcher::new(config);
    watcher
        .subscribe_from(index, move |update| {
            if let Err(e) = update_tx.try_send(update.clone()) {
                warn!(error = %e, "Dropping machine index update, print loop is behind");
            }
        })
        .context(format!(
            "Failed to watch machine index at {}",
            config.index_path().display()
        ))?;

    info!("Watching machine index. Press Ctrl+C to stop.");

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }

            Some(update) = update_rx.recv() => {
                print_update(&update);
            }
        }
    }

    watcher.unsubscribe_all();
    info!("Indicator stopped");
    Ok(())
}

/// Runs a lifecycle command for one machine.
async fn run_action(config: &Config, action: MachineAction, id: &str) -> Result<()> {
    let machine = find_machine(config, id)?;
    let control = VagrantControl::from_config(config);

    let status = control
        .run(action, &machine)
        .await
        .context(format!("Failed to run vagrant {action}"))?;

    if !status.success() {
        anyhow::bail!("vagrant {action} exited with {status}");
    }
    Ok(())
}

/// Opens a terminal for one machine.
async fn run_terminal(config: &Config, id: &str) -> Result<()> {
    let machine = find_machine(config, id)?;
    let control = VagrantControl::from_config(config);

    control
        .open_terminal(&machine)
        .context("Failed to open terminal")?;
    Ok(())
}

fn find_machine(config: &Config, id: &str) -> Result<Machine> {
    let index = get_index(config).context("Failed to read machine index")?;
    index
        .get(id)
        .cloned()
        .ok_or_else(|| ControlError::MachineNotFound(id.to_string()).into())
}

fn print_update(update: &IndexUpdate) {
    if let Some(diff) = &update.diff {
        if diff.is_empty() {
            debug!("Machine index rewritten without changes");
            return;
        }
        for notification in notifications_for(diff) {
            println!("{notification}");
        }
    }
    print_menu(&update.index);
}

fn print_menu(index: &MachineIndex) {
    if index.is_empty() {
        println!("(no machines)");
        return;
    }

    for entry in build_menu(index) {
        let actions: Vec<_> = entry.actions.iter().map(|a| a.label()).collect();
        println!("{}  [{}]  {}", entry.machine_id, actions.join(", "), entry.label);
    }
}

/// Initializes the logging subsystem.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
