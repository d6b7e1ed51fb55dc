//! Configuration management for RSTone2MIDI
//!
//! The configuration is a two-line text file: the MIDI output port index,
//! then the message type (`control change` or `program change`). It is
//! read once when the poller starts; edits apply to the next poller.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, info, warn};

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "RSTone2MIDI_config.txt";

/// MIDI channel every message goes out on (1-based)
pub const MIDI_CHANNEL: u8 = 1;

/// Controller number used in Control Change mode
pub const TONE_CONTROLLER: u8 = 1;

/// Kind of MIDI message a tone change is translated to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum MessageType {
    #[value(name = "control-change")]
    ControlChange,
    #[value(name = "program-change")]
    ProgramChange,
}

impl MessageType {
    pub const ALL: [MessageType; 2] = [MessageType::ProgramChange, MessageType::ControlChange];

    /// Lowercase form stored in the config file
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::ControlChange => "control change",
            MessageType::ProgramChange => "program change",
        }
    }

    /// Title-case form for menus and dialogs
    pub fn label(&self) -> &'static str {
        match self {
            MessageType::ControlChange => "Control Change",
            MessageType::ProgramChange => "Program Change",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "control change" => Ok(MessageType::ControlChange),
            "program change" => Ok(MessageType::ProgramChange),
            other => Err(ConfigError::UnknownMessageType(other.to_string())),
        }
    }
}

/// Selected MIDI output and message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiConfig {
    pub port_index: usize,
    pub message_type: MessageType,
}

impl MidiConfig {
    /// Parse the two-line file format. Lines after the second are ignored.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut lines = contents.lines();
        let (Some(port), Some(message_type)) = (lines.next(), lines.next()) else {
            return Err(ConfigError::Incomplete);
        };

        let port = port.trim();
        let port_index = port
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidPort(port.to_string()))?;

        Ok(Self {
            port_index,
            message_type: message_type.parse()?,
        })
    }

    /// Render in the file format
    pub fn render(&self) -> String {
        format!("{}\n{}", self.port_index, self.message_type)
    }
}

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {0} does not exist")]
    Missing(PathBuf),

    #[error("configuration needs a port line and a message type line")]
    Incomplete,

    #[error("invalid MIDI port index '{0}'")]
    InvalidPort(String),

    #[error("unknown message type '{0}' (expected 'control change' or 'program change')")]
    UnknownMessageType(String),

    #[error("configuration I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Source of the MIDI configuration.
pub trait ConfigStore {
    /// Current configuration, or `None` when it is missing or unusable
    fn read_config(&self) -> Option<MidiConfig>;
}

/// Configuration kept in a text file
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the configuration file
    pub fn load(&self) -> Result<MidiConfig, ConfigError> {
        let contents = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::Missing(self.path.clone()),
            _ => ConfigError::Io {
                path: self.path.clone(),
                source: e,
            },
        })?;

        let config = MidiConfig::parse(&contents)?;
        debug!("Loaded configuration from {}: {:?}", self.path.display(), config);
        Ok(config)
    }

    /// Write the configuration file, creating its directory if needed
    pub fn save(&self, config: &MidiConfig) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&self.path, config.render()).map_err(io_err)?;

        info!(
            "Saved configuration to {}: port {}, {}",
            self.path.display(),
            config.port_index,
            config.message_type
        );
        Ok(())
    }
}

impl ConfigStore for FileConfigStore {
    fn read_config(&self) -> Option<MidiConfig> {
        match self.load() {
            Ok(config) => Some(config),
            Err(ConfigError::Missing(path)) => {
                debug!("No configuration at {}", path.display());
                None
            }
            Err(e) => {
                warn!("Ignoring configuration {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

impl ConfigStore for Option<MidiConfig> {
    fn read_config(&self) -> Option<MidiConfig> {
        *self
    }
}
