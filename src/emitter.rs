//! MIDI output emitter
//!
//! Opens a single output port by index and writes Control Change / Program
//! Change messages to it. The public send helpers take 1-based channels.

use midir::{MidiOutput, MidiOutputConnection};
use thiserror::Error;
use tracing::{debug, info};

use crate::midi::{format_hex, MidiMessage};

/// Client name announced to the MIDI subsystem
const CLIENT_NAME: &str = "RSTone2MIDI";

/// MIDI subsystem failures
#[derive(Debug, Error)]
pub enum MidiError {
    #[error("MIDI subsystem unavailable: {0}")]
    Init(String),

    #[error("MIDI output port {index} is not available ({available} port(s) found)")]
    PortUnavailable { index: usize, available: usize },

    #[error("failed to connect to MIDI output port {index}: {reason}")]
    Connect { index: usize, reason: String },

    #[error("failed to send MIDI message: {0}")]
    Send(String),
}

/// An open MIDI output.
pub trait MidiEmitter {
    /// Write one message to the port
    fn send(&mut self, message: &MidiMessage) -> Result<(), MidiError>;

    /// Send a Control Change on a 1-based channel
    fn send_control_change(&mut self, channel: u8, controller: u8, value: u8) -> Result<(), MidiError> {
        self.send(&MidiMessage::ControlChange {
            channel: channel.wrapping_sub(1),
            cc: controller,
            value,
        })
    }

    /// Send a Program Change on a 1-based channel
    fn send_program_change(&mut self, channel: u8, program: u8) -> Result<(), MidiError> {
        self.send(&MidiMessage::ProgramChange {
            channel: channel.wrapping_sub(1),
            program,
        })
    }

    /// Release the port
    fn close(self)
    where
        Self: Sized,
    {
    }
}

/// Source of MIDI output ports.
pub trait MidiPorts {
    type Emitter: MidiEmitter;

    /// Names of the output ports currently available, indexed by port number
    fn output_ports(&self) -> Result<Vec<String>, MidiError>;

    /// Open the output port at `index`
    fn open(&self, index: usize) -> Result<Self::Emitter, MidiError>;
}

/// Output ports of the system MIDI API (WinMM, ALSA, CoreMIDI) via midir
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

impl MidiPorts for SystemPorts {
    type Emitter = MidirEmitter;

    fn output_ports(&self) -> Result<Vec<String>, MidiError> {
        output_port_names()
    }

    fn open(&self, index: usize) -> Result<MidirEmitter, MidiError> {
        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;

        let ports = midi_out.ports();
        let port = ports.get(index).ok_or(MidiError::PortUnavailable {
            index,
            available: ports.len(),
        })?;
        let port_name = midi_out
            .port_name(port)
            .unwrap_or_else(|_| format!("port {}", index));

        let connection = midi_out
            .connect(port, "rstone2midi-out")
            .map_err(|e| MidiError::Connect {
                index,
                reason: e.to_string(),
            })?;

        info!("MIDI output opened: {} ({})", index, port_name);
        Ok(MidirEmitter {
            connection,
            port_name,
        })
    }
}

/// Emitter backed by a midir output connection
pub struct MidirEmitter {
    connection: MidiOutputConnection,
    port_name: String,
}

impl MidiEmitter for MidirEmitter {
    fn send(&mut self, message: &MidiMessage) -> Result<(), MidiError> {
        let bytes = message.encode();
        debug!("MIDI OUT -> {}: {}", self.port_name, format_hex(&bytes));
        self.connection
            .send(&bytes)
            .map_err(|e| MidiError::Send(e.to_string()))
    }

    fn close(self) {
        debug!("Closing MIDI output: {}", self.port_name);
        self.connection.close();
    }
}

/// List available MIDI output ports by index
pub fn output_port_names() -> Result<Vec<String>, MidiError> {
    let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;

    Ok(midi_out
        .ports()
        .iter()
        .enumerate()
        .map(|(index, port)| {
            midi_out
                .port_name(port)
                .unwrap_or_else(|_| format!("<unnamed port {}>", index))
        })
        .collect())
}

/// Print available output ports (for `--list-ports`)
pub fn list_ports_formatted() {
    use colored::*;

    println!("\n{}", "=== Available MIDI Output Ports ===".bold().cyan());

    match output_port_names() {
        Ok(ports) if ports.is_empty() => {
            println!("  {}", "No output ports found".dimmed());
        }
        Ok(ports) => {
            for (index, name) in ports.iter().enumerate() {
                println!("  {} {}", format!("{}:", index).yellow(), name);
            }
        }
        Err(e) => println!("  {}", e.to_string().red()),
    }
    println!();
}


#[cfg(test)]
mod tests {
    use super::fake::*;
    use super::*;

    #[test]
    fn test_control_change_uses_zero_based_wire_channel() {
        let mut emitter = RecordingEmitter::default();
        emitter.send_control_change(1, 1, 3).unwrap();
        emitter.send_control_change(16, 7, 127).unwrap();

        assert_eq!(emitter.sent(), vec![vec![0xB0, 0x01, 3], vec![0xBF, 7, 127]]);
    }

    #[test]
    fn test_program_change_wire_bytes() {
        let mut emitter = RecordingEmitter::default();
        emitter.send_program_change(1, 2).unwrap();
        emitter.send_program_change(10, 0).unwrap();

        assert_eq!(emitter.sent(), vec![vec![0xC0, 2], vec![0xC9, 0]]);
    }

    #[test]
    fn test_send_failure_is_reported() {
        let mut emitter = RecordingEmitter {
            fail_sends: true,
            ..Default::default()
        };
        let err = emitter.send_program_change(1, 1).unwrap_err();
        assert!(matches!(err, MidiError::Send(_)));
        assert!(emitter.sent().is_empty());
    }

    #[test]
    fn test_port_discovery() {
        // Only ensures discovery does not panic on machines without MIDI
        let _ = output_port_names();
    }
}
