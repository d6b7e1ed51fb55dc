//! Background poller following the game's active tone
//!
//! The [`Poller`] owns the MIDI output and, while the game runs, the open
//! process handle. Every iteration it turns what the OS reports into an
//! [`Observation`], lets the [`Machine`] decide, and carries out the
//! resulting effects. Only start-up can fail: a missing configuration or an
//! unusable MIDI port ends the poller thread, nothing else does.

mod machine;

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

pub use machine::{effective_value, tone_message, Effect, Machine, Observation, Phase, NO_TONE};

use crate::config::{ConfigStore, FileConfigStore, MessageType};
use crate::emitter::{MidiEmitter, MidiError, MidiPorts, SystemPorts};
use crate::events::EventSink;
use crate::pointer_chain::{read_chain, Target, ROCKSMITH_2014};
use crate::process::{Address, ProcessBackend, ProcessHandle, ProcessId, SystemBackend};
use crate::test_value::TestValue;

/// Reasons the poller never gets going
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Missing port or message type selection. Please configure them in Settings.")]
    MissingConfig,

    #[error("Port {port} from the config file is not available. Please choose a valid port in Settings.")]
    PortUnavailable { port: usize, available: usize },

    #[error("Error with MIDI: {0}")]
    Midi(#[from] MidiError),
}

/// One continuous run of the game process
struct Session<H> {
    handle: H,
    module_base: Address,
}

/// Tone follower bound to a process backend and an open MIDI output
pub struct Poller<B: ProcessBackend, E: MidiEmitter> {
    backend: B,
    emitter: E,
    target: Target,
    machine: Machine,
    session: Option<Session<B::Handle>>,
    test_value: TestValue,
    sink: EventSink,
}

impl<B: ProcessBackend, E: MidiEmitter> Poller<B, E> {
    /// Read the configuration once, validate the port and open it.
    ///
    /// Nothing is opened when the configuration is missing or names a port
    /// that does not exist.
    pub fn start<P, C>(
        backend: B,
        ports: &P,
        store: &C,
        target: Target,
        test_value: TestValue,
        sink: EventSink,
    ) -> Result<Self, StartupError>
    where
        P: MidiPorts<Emitter = E>,
        C: ConfigStore + ?Sized,
    {
        let config = store.read_config().ok_or(StartupError::MissingConfig)?;

        let available = ports.output_ports()?;
        let Some(port_name) = available.get(config.port_index) else {
            return Err(StartupError::PortUnavailable {
                port: config.port_index,
                available: available.len(),
            });
        };

        let emitter = ports.open(config.port_index)?;
        sink.status(format!(
            "Sending MIDI {} messages to port {}: {}",
            config.message_type.label(),
            config.port_index,
            port_name
        ));

        Ok(Self::with_emitter(backend, emitter, config.message_type, target, test_value, sink))
    }

    /// Poller around an already open emitter
    pub fn with_emitter(
        backend: B,
        emitter: E,
        message_type: MessageType,
        target: Target,
        test_value: TestValue,
        sink: EventSink,
    ) -> Self {
        Self {
            backend,
            emitter,
            target,
            machine: Machine::new(target.display_name, target.module_name, message_type),
            session: None,
            test_value,
            sink,
        }
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    /// Run one iteration; returns how long to wait before the next one
    pub fn tick(&mut self) -> Duration {
        let observation = self.observe();
        for effect in self.machine.step(observation) {
            self.apply(effect);
        }
        self.machine.phase().poll_interval()
    }

    /// Poll forever
    pub fn run(mut self) -> ! {
        loop {
            let wait = self.tick();
            thread::sleep(wait);
        }
    }

    fn observe(&mut self) -> Observation {
        let located = self.backend.find_process(self.target.process_name);

        if let Some(session) = &self.session {
            if located == Some(session.handle.pid()) {
                return Observation::Chain(read_chain(
                    &session.handle,
                    session.module_base,
                    &self.target.chain,
                ));
            }

            debug!(
                "Process {} no longer running (now: {:?})",
                session.handle.pid(),
                located
            );
            self.session = None;
            return Observation::ProcessExited;
        }

        match located {
            None => Observation::ProcessAbsent {
                test_value: self.test_value.get(),
            },
            Some(pid) => self.attach(pid),
        }
    }

    fn attach(&mut self, pid: ProcessId) -> Observation {
        let handle = match self.backend.open(pid) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to open process {}: {}", pid, e);
                return Observation::AttachFailed {
                    pid,
                    reason: e.to_string(),
                };
            }
        };

        match handle.module_base(self.target.module_name) {
            Some(module_base) => {
                info!(
                    "Attached to {} (pid {}, module base {:#x})",
                    self.target.display_name, pid, module_base
                );
                self.session = Some(Session { handle, module_base });
                Observation::Attached { pid }
            }
            None => Observation::ModuleMissing { pid },
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Status(message) => self.sink.status(message),
            Effect::Phase(phase) => self.sink.phase(phase),
            Effect::Emit(message) => match self.emitter.send(&message) {
                Ok(()) => self.sink.status(format!("Sent MIDI {}", message)),
                Err(e) => {
                    warn!("MIDI send failed: {}", e);
                    self.sink.status(format!("Failed to send MIDI {}: {}", message, e));
                }
            },
        }
    }
}

/// Start a poller and keep it running; returns only if start-up fails,
/// after reporting why.
pub fn run<B, P, C>(
    backend: B,
    ports: P,
    store: C,
    target: Target,
    test_value: TestValue,
    sink: EventSink,
) -> StartupError
where
    B: ProcessBackend,
    P: MidiPorts,
    C: ConfigStore,
{
    match Poller::start(backend, &ports, &store, target, test_value, sink.clone()) {
        Ok(poller) => poller.run(),
        Err(e) => {
            warn!("Poller not started: {}", e);
            sink.status(e.to_string());
            e
        }
    }
}

/// Sends [`EventSink::stopped`] when the poller thread ends, panics included
struct StopNotice(EventSink);

impl Drop for StopNotice {
    fn drop(&mut self) {
        self.0.stopped();
    }
}

/// Spawn the poller thread against the real OS and MIDI system
pub fn spawn(config_path: PathBuf, test_value: TestValue, sink: EventSink) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("tone-poller".to_string())
        .spawn(move || {
            let _stopped = StopNotice(sink.clone());
            run(
                SystemBackend::default(),
                SystemPorts,
                FileConfigStore::new(config_path),
                ROCKSMITH_2014,
                test_value,
                sink,
            );
        })
}
