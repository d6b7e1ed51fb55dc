//! RSTone2MIDI - Rocksmith 2014 tone follower
//!
//! Watches the memory of a running Rocksmith 2014 process for the currently
//! active tone and mirrors every change as a MIDI Control Change or Program
//! Change on a user-selected output port.

pub mod config;
pub mod emitter;
pub mod events;
#[cfg(feature = "gui")]
pub mod gui;
pub mod midi;
pub mod paths;
pub mod pointer_chain;
pub mod poller;
pub mod process;
pub mod test_value;
