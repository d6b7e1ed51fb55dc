//! Tests for the poller driver, against in-memory process and MIDI fakes

use super::*;
use crate::config::MidiConfig;
use crate::emitter::fake::{FakePorts, RecordingEmitter};
use crate::events::{self, EventStream, PollerEvent};
use crate::pointer_chain::fake::FakeMemory;
use crate::process::{AttachError, MemoryReader, ReadError};
use std::sync::{Arc, Mutex};

const BASE: Address = 0x0040_0000;
const GAME_PID: ProcessId = 4242;

/// Mutable stand-in for the OS process table
#[derive(Default)]
struct World {
    running: Option<ProcessId>,
    module_loaded: bool,
    deny_access: bool,
    memory: FakeMemory,
    opened: usize,
}

#[derive(Clone, Default)]
struct FakeBackend {
    world: Arc<Mutex<World>>,
}

impl FakeBackend {
    fn with<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        f(&mut self.world.lock().unwrap())
    }

    fn launch(&self, pid: ProcessId) {
        self.with(|w| {
            w.running = Some(pid);
            w.module_loaded = true;
        });
    }

    fn kill(&self) {
        self.with(|w| w.running = None);
    }

    fn set_tone(&self, tone: Option<i32>) {
        let chain = &ROCKSMITH_2014.chain;
        self.with(|w| {
            w.memory = match tone {
                Some(tone) => FakeMemory::chained(BASE, chain, tone),
                None => FakeMemory::default().with(BASE + chain.base_offset, 0),
            }
        });
    }
}

struct FakeHandle {
    pid: ProcessId,
    world: Arc<Mutex<World>>,
}

impl MemoryReader for FakeHandle {
    fn read_i32(&self, address: Address) -> Result<i32, ReadError> {
        self.world.lock().unwrap().memory.read_i32(address)
    }
}

impl ProcessHandle for FakeHandle {
    fn pid(&self) -> ProcessId {
        self.pid
    }

    fn module_base(&self, module_name: &str) -> Option<Address> {
        let world = self.world.lock().unwrap();
        (world.module_loaded && module_name == ROCKSMITH_2014.module_name).then_some(BASE)
    }
}

impl ProcessBackend for FakeBackend {
    type Handle = FakeHandle;

    fn find_process(&self, name: &str) -> Option<ProcessId> {
        if name != ROCKSMITH_2014.process_name {
            return None;
        }
        self.with(|w| w.running)
    }

    fn open(&self, pid: ProcessId) -> Result<FakeHandle, AttachError> {
        self.with(|w| {
            if w.deny_access {
                return Err(AttachError::AccessDenied(pid));
            }
            w.opened += 1;
            Ok(FakeHandle {
                pid,
                world: self.world.clone(),
            })
        })
    }
}

fn cc_config(port_index: usize) -> Option<MidiConfig> {
    Some(MidiConfig {
        port_index,
        message_type: MessageType::ControlChange,
    })
}

fn started(
    backend: &FakeBackend,
    ports: &FakePorts,
    config: Option<MidiConfig>,
    test_value: &TestValue,
) -> (Poller<FakeBackend, RecordingEmitter>, EventStream) {
    let (sink, stream) = events::channel();
    let poller = Poller::start(
        backend.clone(),
        ports,
        &config,
        ROCKSMITH_2014,
        test_value.clone(),
        sink,
    )
    .unwrap();
    // Drop the start-up banner
    stream.drain();
    (poller, stream)
}

fn statuses(stream: &EventStream) -> Vec<String> {
    stream
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            PollerEvent::Status(s) => Some(s.message),
            _ => None,
        })
        .collect()
}

#[test]
fn test_scripted_game_session() {
    let backend = FakeBackend::default();
    let ports = FakePorts::with_ports(&["Loopback", "USB MIDI"]);
    let test_value = TestValue::default();
    let (mut poller, stream) = started(&backend, &ports, cc_config(1), &test_value);
    let mut log = Vec::new();

    // absent
    assert_eq!(poller.tick(), Duration::from_secs(1));
    log.extend(statuses(&stream));

    // appears with module loaded: silent attach
    backend.launch(GAME_PID);
    backend.set_tone(None);
    assert_eq!(poller.tick(), Duration::from_millis(100));
    assert!(statuses(&stream).is_empty());
    assert_eq!(poller.phase(), Phase::AttachedWaitingForData);

    // chain unavailable
    poller.tick();
    log.extend(statuses(&stream));

    backend.set_tone(Some(3));
    poller.tick();
    log.extend(statuses(&stream));

    backend.set_tone(Some(5));
    poller.tick();
    log.extend(statuses(&stream));

    backend.kill();
    assert_eq!(poller.tick(), Duration::from_secs(1));
    log.extend(statuses(&stream));

    assert_eq!(log.len(), 5);
    assert!(log[0].starts_with("Rocksmith 2014 is not running. Waiting..."));
    assert_eq!(log[1], "Waiting for song...");
    assert_eq!(log[2], "Sent MIDI Control Change: Channel 1, Control 1, Value 3");
    assert_eq!(log[3], "Sent MIDI Control Change: Channel 1, Control 1, Value 0");
    assert_eq!(log[4], "Rocksmith 2014 closed. Waiting for it to restart...");

    assert_eq!(ports.opened(), vec![1]);
    assert_eq!(ports.emitter.sent(), vec![vec![0xB0, 0x01, 3], vec![0xB0, 0x01, 0]]);
    assert_eq!(poller.phase(), Phase::Idle);
}

#[test]
fn test_phase_events_follow_the_session() {
    let backend = FakeBackend::default();
    let ports = FakePorts::with_ports(&["Loopback"]);
    let (mut poller, stream) = started(&backend, &ports, cc_config(0), &TestValue::default());

    backend.launch(GAME_PID);
    backend.set_tone(Some(1));
    poller.tick();
    poller.tick();
    backend.kill();
    poller.tick();

    let phases: Vec<Phase> = stream
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            PollerEvent::Phase(p) => Some(p),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![Phase::AttachedWaitingForData, Phase::AttachedTracking, Phase::Idle]
    );
}

#[test]
fn test_restart_opens_a_fresh_session() {
    let backend = FakeBackend::default();
    let ports = FakePorts::with_ports(&["Loopback"]);
    let (mut poller, stream) = started(&backend, &ports, cc_config(0), &TestValue::default());

    backend.launch(GAME_PID);
    backend.set_tone(Some(2));
    poller.tick();
    poller.tick();

    // Game restarted between two polls under a new pid
    backend.launch(GAME_PID + 1);
    poller.tick();
    assert_eq!(poller.phase(), Phase::Idle);
    poller.tick();
    poller.tick();

    assert_eq!(backend.with(|w| w.opened), 2);
    assert_eq!(ports.emitter.sent(), vec![vec![0xB0, 0x01, 2], vec![0xB0, 0x01, 2]]);
    assert!(statuses(&stream)
        .iter()
        .any(|s| s == "Rocksmith 2014 closed. Waiting for it to restart..."));
}

#[test]
fn test_test_value_only_while_game_absent() {
    let backend = FakeBackend::default();
    let ports = FakePorts::with_ports(&["Loopback"]);
    let test_value = TestValue::default();
    let (mut poller, _stream) = started(&backend, &ports, cc_config(0), &test_value);

    for value in [0, 2, 2, 1] {
        test_value.set(value);
        poller.tick();
    }
    assert_eq!(ports.emitter.sent(), vec![vec![0xB0, 0x01, 2], vec![0xB0, 0x01, 1]]);

    backend.launch(GAME_PID);
    backend.set_tone(None);
    test_value.set(3);
    poller.tick();
    poller.tick();
    assert_eq!(ports.emitter.sent().len(), 2);
}

#[test]
fn test_module_not_loaded_keeps_retrying() {
    let backend = FakeBackend::default();
    let ports = FakePorts::with_ports(&["Loopback"]);
    let (mut poller, stream) = started(&backend, &ports, cc_config(0), &TestValue::default());

    backend.with(|w| w.running = Some(GAME_PID));
    assert_eq!(poller.tick(), Duration::from_secs(1));
    assert_eq!(poller.tick(), Duration::from_secs(1));
    assert_eq!(
        statuses(&stream),
        vec!["Module 'Rocksmith2014.exe' not found in process 4242. Waiting for it to load..."]
    );

    backend.with(|w| w.module_loaded = true);
    poller.tick();
    assert_eq!(poller.phase(), Phase::AttachedWaitingForData);
}

#[test]
fn test_denied_access_is_not_fatal() {
    let backend = FakeBackend::default();
    let ports = FakePorts::with_ports(&["Loopback"]);
    let (mut poller, stream) = started(&backend, &ports, cc_config(0), &TestValue::default());

    backend.launch(GAME_PID);
    backend.with(|w| w.deny_access = true);
    poller.tick();
    poller.tick();
    let reported = statuses(&stream);
    assert_eq!(reported.len(), 1);
    assert!(reported[0].contains("access denied to process 4242"));

    backend.with(|w| w.deny_access = false);
    poller.tick();
    assert!(poller.phase().is_attached());
}

#[test]
fn test_read_faults_while_attached_mean_no_data() {
    let backend = FakeBackend::default();
    let ports = FakePorts::with_ports(&["Loopback"]);
    let (mut poller, stream) = started(&backend, &ports, cc_config(0), &TestValue::default());

    backend.launch(GAME_PID);
    poller.tick();
    // Empty memory: every read fails
    poller.tick();
    poller.tick();

    assert_eq!(statuses(&stream), vec!["Waiting for song..."]);
    assert_eq!(poller.phase(), Phase::AttachedWaitingForData);
    assert!(ports.emitter.sent().is_empty());
}

#[test]
fn test_send_failure_is_reported_and_polling_continues() {
    let backend = FakeBackend::default();
    let (sink, stream) = events::channel();
    let emitter = RecordingEmitter {
        fail_sends: true,
        ..Default::default()
    };
    let mut poller = Poller::with_emitter(
        backend.clone(),
        emitter,
        MessageType::ProgramChange,
        ROCKSMITH_2014,
        TestValue::default(),
        sink,
    );

    backend.launch(GAME_PID);
    backend.set_tone(Some(1));
    poller.tick();
    poller.tick();
    backend.set_tone(Some(2));
    poller.tick();

    let reported = statuses(&stream);
    assert_eq!(
        reported,
        vec![
            "Failed to send MIDI Program Change: Channel 1, Program 1: failed to send MIDI message: port went away",
            "Failed to send MIDI Program Change: Channel 1, Program 2: failed to send MIDI message: port went away",
        ]
    );
    assert_eq!(poller.phase(), Phase::AttachedTracking);
}

#[test]
fn test_program_change_mode() {
    let backend = FakeBackend::default();
    let ports = FakePorts::with_ports(&["Loopback"]);
    let config = Some(MidiConfig {
        port_index: 0,
        message_type: MessageType::ProgramChange,
    });
    let (mut poller, stream) = started(&backend, &ports, config, &TestValue::default());

    backend.launch(GAME_PID);
    backend.set_tone(Some(2));
    poller.tick();
    poller.tick();

    assert_eq!(ports.emitter.sent(), vec![vec![0xC0, 2]]);
    assert_eq!(statuses(&stream), vec!["Sent MIDI Program Change: Channel 1, Program 2"]);
}

#[test]
fn test_start_announces_the_port() {
    let ports = FakePorts::with_ports(&["Loopback", "USB MIDI"]);
    let (sink, stream) = events::channel();
    Poller::start(
        FakeBackend::default(),
        &ports,
        &cc_config(1),
        ROCKSMITH_2014,
        TestValue::default(),
        sink,
    )
    .unwrap();

    assert_eq!(
        statuses(&stream),
        vec!["Sending MIDI Control Change messages to port 1: USB MIDI"]
    );
}

#[test]
fn test_port_out_of_range_stops_without_midi() {
    let ports = FakePorts::with_ports(&["Port 0", "Port 1"]);
    let (sink, stream) = events::channel();

    let err = run(
        FakeBackend::default(),
        ports.clone(),
        cc_config(2),
        ROCKSMITH_2014,
        TestValue::default(),
        sink,
    );

    assert!(matches!(err, StartupError::PortUnavailable { port: 2, available: 2 }));
    assert!(ports.opened().is_empty());
    assert!(ports.emitter.sent().is_empty());
    assert_eq!(
        statuses(&stream),
        vec!["Port 2 from the config file is not available. Please choose a valid port in Settings."]
    );
}

#[test]
fn test_port_that_refuses_connection_stops_without_midi() {
    let ports = FakePorts {
        busy: true,
        ..FakePorts::with_ports(&["Busy"])
    };
    let (sink, stream) = events::channel();

    let err = run(
        FakeBackend::default(),
        ports.clone(),
        cc_config(0),
        ROCKSMITH_2014,
        TestValue::default(),
        sink,
    );

    assert!(matches!(err, StartupError::Midi(MidiError::Connect { index: 0, .. })));
    assert!(ports.opened().is_empty());
    assert!(ports.emitter.sent().is_empty());
    assert_eq!(
        statuses(&stream),
        vec!["Error with MIDI: failed to connect to MIDI output port 0: device busy"]
    );
}

#[test]
fn test_missing_config_stops_without_midi() {
    let ports = FakePorts::with_ports(&["Port 0"]);
    let (sink, stream) = events::channel();

    let err = run(
        FakeBackend::default(),
        ports.clone(),
        None::<MidiConfig>,
        ROCKSMITH_2014,
        TestValue::default(),
        sink,
    );

    assert!(matches!(err, StartupError::MissingConfig));
    assert!(ports.opened().is_empty());
    assert_eq!(
        statuses(&stream),
        vec!["Missing port or message type selection. Please configure them in Settings."]
    );
}

#[test]
fn test_stop_notice_fires_when_thread_ends() {
    let (sink, stream) = events::channel();
    let worker = std::thread::spawn(move || {
        let _stopped = StopNotice(sink.clone());
        run(
            FakeBackend::default(),
            FakePorts::default(),
            None::<MidiConfig>,
            ROCKSMITH_2014,
            TestValue::default(),
            sink,
        );
    });
    worker.join().unwrap();

    let events = stream.drain();
    assert_eq!(events.last(), Some(&PollerEvent::Stopped));
}
