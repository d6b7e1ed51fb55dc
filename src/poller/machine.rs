//! Tone follower state machine
//!
//! Pure logic: each poll produces one [`Observation`], [`Machine::step`]
//! folds it into the state and returns the [`Effect`]s to carry out. No OS,
//! MIDI or clock access happens here.

use std::time::Duration;

use tracing::debug;

use crate::config::{MessageType, MIDI_CHANNEL, TONE_CONTROLLER};
use crate::midi::MidiMessage;
use crate::process::ProcessId;

/// Raw tone identifier the game uses for "no tone"
pub const NO_TONE: i32 = 5;

/// Poll interval while the game is not attached
pub const IDLE_INTERVAL: Duration = Duration::from_secs(1);

/// Poll interval while attached to the game
pub const ATTACHED_INTERVAL: Duration = Duration::from_millis(100);

/// Poller phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Game not running (or not attachable yet)
    Idle,
    /// Attached, but the tone pointer chain is currently null
    AttachedWaitingForData,
    /// Attached and following tone changes
    AttachedTracking,
}

impl Phase {
    pub fn is_attached(self) -> bool {
        !matches!(self, Phase::Idle)
    }

    /// How long the poller sleeps after an iteration in this phase
    pub fn poll_interval(self) -> Duration {
        if self.is_attached() {
            ATTACHED_INTERVAL
        } else {
            IDLE_INTERVAL
        }
    }
}

/// What one poll found out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The game is not running; carries the current test value
    ProcessAbsent { test_value: u8 },
    /// The game runs but its main module is not loaded yet
    ModuleMissing { pid: ProcessId },
    /// The game runs but could not be opened
    AttachFailed { pid: ProcessId, reason: String },
    /// A new session started: process opened, module resolved
    Attached { pid: ProcessId },
    /// Pointer chain read within the current session
    Chain(Option<i32>),
    /// The session's process is gone
    ProcessExited,
}

/// Work the driver carries out, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Status(String),
    Emit(MidiMessage),
    Phase(Phase),
}

/// One-shot messages, repeated only after something else was announced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Notice {
    NotRunning,
    ModuleMissing(ProcessId),
    AttachFailed(ProcessId),
    WaitingForSong,
}

/// Map a raw tone identifier onto the 0-127 MIDI data range.
///
/// The "no tone" identifier becomes 0.
pub fn effective_value(tone_id: i32) -> u8 {
    if tone_id == NO_TONE {
        0
    } else {
        tone_id.clamp(0, 127) as u8
    }
}

/// MIDI message announcing `value` in the configured mode
pub fn tone_message(message_type: MessageType, value: u8) -> MidiMessage {
    let channel = MIDI_CHANNEL - 1;
    match message_type {
        MessageType::ControlChange => MidiMessage::ControlChange {
            channel,
            cc: TONE_CONTROLLER,
            value,
        },
        MessageType::ProgramChange => MidiMessage::ProgramChange {
            channel,
            program: value,
        },
    }
}

/// Tone follower state
#[derive(Debug, Clone)]
pub struct Machine {
    target_name: &'static str,
    module_name: &'static str,
    message_type: MessageType,
    phase: Phase,
    /// Last raw tone identifier emitted in this session
    last_tone: Option<i32>,
    /// Last value put on the wire in this session
    session_value: Option<u8>,
    /// Test value the device is assumed to hold while idle
    test_baseline: u8,
    notice: Option<Notice>,
}

impl Machine {
    pub fn new(target_name: &'static str, module_name: &'static str, message_type: MessageType) -> Self {
        Self {
            target_name,
            module_name,
            message_type,
            phase: Phase::Idle,
            last_tone: None,
            session_value: None,
            test_baseline: 0,
            notice: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_tone(&self) -> Option<i32> {
        self.last_tone
    }

    /// Fold one observation into the state
    pub fn step(&mut self, observation: Observation) -> Vec<Effect> {
        let mut effects = Vec::new();

        match observation {
            Observation::ProcessAbsent { test_value } => {
                self.enter(Phase::Idle, &mut effects);
                self.announce(Notice::NotRunning, &mut effects);

                if test_value != self.test_baseline {
                    self.test_baseline = test_value;
                    effects.push(Effect::Status(format!("Test value {} sent", test_value)));
                    effects.push(Effect::Emit(tone_message(self.message_type, test_value)));
                }
            }

            Observation::ModuleMissing { pid } => {
                self.enter(Phase::Idle, &mut effects);
                self.announce(Notice::ModuleMissing(pid), &mut effects);
            }

            Observation::AttachFailed { pid, reason } => {
                self.enter(Phase::Idle, &mut effects);
                if self.notice != Some(Notice::AttachFailed(pid)) {
                    self.notice = Some(Notice::AttachFailed(pid));
                    effects.push(Effect::Status(format!(
                        "Could not attach to {} (process {}): {}. Retrying...",
                        self.target_name, pid, reason
                    )));
                }
            }

            Observation::Attached { pid } => {
                debug!("Attached to {} (process {})", self.target_name, pid);
                self.last_tone = None;
                self.session_value = None;
                self.enter(Phase::AttachedWaitingForData, &mut effects);
            }

            Observation::Chain(None) => {
                self.enter(Phase::AttachedWaitingForData, &mut effects);
                self.announce(Notice::WaitingForSong, &mut effects);
            }

            Observation::Chain(Some(tone)) => {
                self.enter(Phase::AttachedTracking, &mut effects);
                self.notice = None;

                if self.last_tone != Some(tone) {
                    let value = effective_value(tone);
                    debug!("Tone {} -> value {}", tone, value);
                    effects.push(Effect::Emit(tone_message(self.message_type, value)));
                    self.last_tone = Some(tone);
                    self.session_value = Some(value);
                }
            }

            Observation::ProcessExited => {
                if let Some(value) = self.session_value.take() {
                    self.test_baseline = value;
                }
                self.last_tone = None;
                self.enter(Phase::Idle, &mut effects);
                effects.push(Effect::Status(format!(
                    "{} closed. Waiting for it to restart...",
                    self.target_name
                )));
                // The closing message already says we are waiting
                self.notice = Some(Notice::NotRunning);
            }
        }

        effects
    }

    fn enter(&mut self, phase: Phase, effects: &mut Vec<Effect>) {
        if self.phase != phase {
            debug!("Poller phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
            effects.push(Effect::Phase(phase));
        }
    }

    fn announce(&mut self, notice: Notice, effects: &mut Vec<Effect>) {
        if self.notice == Some(notice) {
            return;
        }
        self.notice = Some(notice);

        let message = match notice {
            Notice::NotRunning => format!(
                "{} is not running. Waiting...\nBefore you launch the game you can test your MIDI connectivity / map your controls with the test slider.",
                self.target_name
            ),
            Notice::ModuleMissing(pid) => format!(
                "Module '{}' not found in process {}. Waiting for it to load...",
                self.module_name, pid
            ),
            Notice::WaitingForSong => "Waiting for song...".to_string(),
            Notice::AttachFailed(_) => return,
        };
        effects.push(Effect::Status(message));
    }
}
