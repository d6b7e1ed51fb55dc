//! RSTone2MIDI - Rust implementation
//!
//! Follows the active Rocksmith 2014 tone and mirrors it as MIDI Control
//! Change or Program Change messages.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod console;

use rstone2midi::config::{FileConfigStore, MessageType, MidiConfig};
use rstone2midi::emitter;
use rstone2midi::paths::AppPaths;
use rstone2midi::test_value::TestValue;

/// RSTone2MIDI - send MIDI messages based on the current Rocksmith 2014 tone
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: detected per install mode)
    #[arg(short, long, env = "RSTONE2MIDI_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI output ports
    #[arg(long)]
    list_ports: bool,

    /// Store this MIDI output port index in the configuration and exit
    #[arg(long, requires = "set_message_type")]
    set_port: Option<usize>,

    /// Store this message type in the configuration and exit
    #[arg(long, value_enum, requires = "set_port")]
    set_message_type: Option<MessageType>,

    /// Print status to the terminal instead of opening the window
    #[arg(long)]
    headless: bool,

    /// Initial test value sent while the game is not running (0-3)
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
    test_value: u8,
}

fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let paths = match &args.config {
        Some(config) => AppPaths::with_config(config),
        None => AppPaths::detect(),
    };
    paths
        .ensure_directories()
        .with_context(|| format!("Failed to prepare {}", paths.base_dir().display()))?;

    let _log_guard = init_logging(&args.log_level, &paths)?;

    info!("Starting RSTone2MIDI v{}...", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration file: {} ({})",
        paths.config.display(),
        if paths.is_portable { "portable" } else { "installed" }
    );

    if args.list_ports {
        emitter::list_ports_formatted();
        return Ok(());
    }

    let store = FileConfigStore::new(&paths.config);

    if let (Some(port_index), Some(message_type)) = (args.set_port, args.set_message_type) {
        store
            .save(&MidiConfig {
                port_index,
                message_type,
            })
            .context("Failed to write configuration")?;
        println!("Saved: port {}, {}", port_index, message_type);
        return Ok(());
    }

    let test_value = TestValue::new(args.test_value);

    if args.headless {
        return console::run(store, test_value);
    }

    run_window(store, test_value)
}

#[cfg(feature = "gui")]
fn run_window(store: FileConfigStore, test_value: TestValue) -> Result<()> {
    rstone2midi::gui::run(store, test_value)
}

#[cfg(not(feature = "gui"))]
fn run_window(store: FileConfigStore, test_value: TestValue) -> Result<()> {
    info!("Built without the monitor window, running in the terminal");
    console::run(store, test_value)
}

fn init_logging(level: &str, paths: &AppPaths) -> Result<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::daily(&paths.logs_dir, "rstone2midi.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_thread_names(true),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}
