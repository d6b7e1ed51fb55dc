//! Terminal front-end (`--headless`)
//!
//! The main thread prints every poller event until the poller stops. The
//! test value stays at whatever `--test-value` set.

use anyhow::{Context, Result};
use colored::*;

use rstone2midi::config::FileConfigStore;
use rstone2midi::events::{self, PollerEvent};
use rstone2midi::poller;
use rstone2midi::test_value::TestValue;

pub fn run(store: FileConfigStore, test_value: TestValue) -> Result<()> {
    let (sink, stream) = events::channel();

    println!("{}", "=== RSTone2MIDI ===".bold().cyan());
    println!("Press Ctrl+C to exit\n");

    let handle = poller::spawn(store.path().to_path_buf(), test_value, sink)
        .context("Failed to start the tone poller")?;

    while let Some(event) = stream.next_blocking() {
        match event {
            PollerEvent::Status(status) => {
                let line = status.display_line();
                if status.message.starts_with("Sent MIDI") {
                    println!("{}", line.green());
                } else if status.message.starts_with("Failed") || status.message.starts_with("Error") {
                    println!("{}", line.red());
                } else {
                    println!("{}", line);
                }
            }
            PollerEvent::Phase(phase) => {
                tracing::debug!("Phase: {:?}", phase);
            }
            PollerEvent::Stopped => break,
        }
    }

    let _ = handle.join();
    println!("{}", "Poller stopped. Fix the configuration (see --help) and restart.".yellow());
    Ok(())
}
