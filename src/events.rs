//! Status event channel between the poller and the display
//!
//! Single producer (the poller thread), single consumer (the display). Events
//! arrive in the order they were produced, each exactly once. Every status
//! line is also written to the log.

use chrono::{DateTime, Local};
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use tracing::info;

use crate::poller::Phase;

/// A human readable status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub at: DateTime<Local>,
    pub message: String,
}

impl StatusEvent {
    /// `[HH:MM:SS] message`
    pub fn display_line(&self) -> String {
        format!("[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// Everything the poller reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerEvent {
    Status(StatusEvent),
    /// The poller's state machine changed phase
    Phase(Phase),
    /// The poller thread has ended; no further events follow
    Stopped,
}

/// Create a connected sink/stream pair
pub fn channel() -> (EventSink, EventStream) {
    let (tx, rx) = channel::unbounded();
    (EventSink { tx }, EventStream { rx })
}

/// Producer half, owned by the poller
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<PollerEvent>,
}

impl EventSink {
    /// Publish a status line
    pub fn status(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.publish(PollerEvent::Status(StatusEvent {
            at: Local::now(),
            message,
        }));
    }

    pub fn phase(&self, phase: Phase) {
        self.publish(PollerEvent::Phase(phase));
    }

    pub fn stopped(&self) {
        self.publish(PollerEvent::Stopped);
    }

    fn publish(&self, event: PollerEvent) {
        // A closed display leaves nobody to tell
        let _ = self.tx.send(event);
    }
}

/// Consumer half, owned by the display
#[derive(Debug)]
pub struct EventStream {
    rx: Receiver<PollerEvent>,
}

impl EventStream {
    /// Next event without blocking
    pub fn try_next(&self) -> Option<PollerEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Block until the next event; `None` once every sink is dropped
    pub fn next_blocking(&self) -> Option<PollerEvent> {
        self.rx.recv().ok()
    }

    /// Everything queued right now, in order
    pub fn drain(&self) -> Vec<PollerEvent> {
        self.rx.try_iter().collect()
    }
}
