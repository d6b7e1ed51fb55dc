//! MIDI message types
//!
//! Only the two channel-voice messages the tone follower emits are modelled.
//! Channels are 0-based here, exactly as they appear on the wire.

use std::fmt;

/// MIDI message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Program Change: channel (0-15), program (0-127)
    ProgramChange { channel: u8, program: u8 },
}

impl MidiMessage {
    /// Parse a MIDI message from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        let channel = status & 0x0F;

        match status & 0xF0 {
            0xB0 => match rest {
                [cc, value, ..] => Some(MidiMessage::ControlChange {
                    channel,
                    cc: cc & 0x7F,
                    value: value & 0x7F,
                }),
                _ => None,
            },
            0xC0 => rest.first().map(|program| MidiMessage::ProgramChange {
                channel,
                program: program & 0x7F,
            }),
            _ => None,
        }
    }

    /// Encode the message to MIDI bytes.
    ///
    /// Data bytes are written as given; keeping them in 0-127 is the caller's job.
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![0xB0 | (channel & 0x0F), cc, value]
            }
            MidiMessage::ProgramChange { channel, program } => {
                vec![0xC0 | (channel & 0x0F), program]
            }
        }
    }
}

impl fmt::Display for MidiMessage {
    /// Human readable form with a 1-based channel, used for status lines
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::ControlChange { channel, cc, value } => write!(
                f,
                "Control Change: Channel {}, Control {}, Value {}",
                channel + 1,
                cc,
                value
            ),
            MidiMessage::ProgramChange { channel, program } => {
                write!(f, "Program Change: Channel {}, Program {}", channel + 1, program)
            }
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
