//! Process discovery and remote memory access
//!
//! Three small services the poller drives:
//!
//! - **locator**: find a process id by exact executable name
//! - **resolver**: find the load address of a module inside an opened process
//! - **reader**: read 4-byte integers out of the opened process
//!
//! Absence is never an error here. A missing process or a module that is not
//! loaded yet is reported as `None`; only failing to open a process that does
//! exist, or a failed read, produces an error value.

use thiserror::Error;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(windows)]
mod win32;

/// OS process identifier
pub type ProcessId = u32;

/// Address inside the target process
pub type Address = usize;

/// A single remote memory read failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("address {0:#x} is not readable")]
    Unreadable(Address),
}

/// Opening a located process failed
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("access denied to process {0}")]
    AccessDenied(ProcessId),

    #[error("process {0} is gone")]
    Gone(ProcessId),

    #[error("process access is not supported on this platform")]
    Unsupported,

    #[error("could not open process {pid}: {source}")]
    Io {
        pid: ProcessId,
        #[source]
        source: std::io::Error,
    },
}

/// Reads 4-byte little-endian integers from a process
pub trait MemoryReader {
    fn read_i32(&self, address: Address) -> Result<i32, ReadError>;
}

/// An opened process
pub trait ProcessHandle: MemoryReader {
    fn pid(&self) -> ProcessId;

    /// Base address of the first loaded module named exactly `module_name`
    fn module_base(&self, module_name: &str) -> Option<Address>;
}

/// Entry point to the OS process table
pub trait ProcessBackend {
    type Handle: ProcessHandle;

    /// Find a process whose executable name equals `name` (case-sensitive).
    ///
    /// Processes that cannot be inspected or vanish during enumeration are
    /// skipped.
    fn find_process(&self, name: &str) -> Option<ProcessId>;

    /// Open a process for memory reads
    fn open(&self, pid: ProcessId) -> Result<Self::Handle, AttachError>;
}

#[cfg(windows)]
pub use self::win32::Win32Backend as SystemBackend;

#[cfg(target_os = "linux")]
pub use self::linux::ProcfsBackend as SystemBackend;

#[cfg(not(any(windows, target_os = "linux")))]
pub use self::unsupported::UnsupportedBackend as SystemBackend;

#[cfg(not(any(windows, target_os = "linux")))]
mod unsupported {
    use super::*;

    /// Platforms without a memory reader: the target is never found
    #[derive(Debug, Default, Clone, Copy)]
    pub struct UnsupportedBackend;

    pub enum UnsupportedProcess {}

    impl MemoryReader for UnsupportedProcess {
        fn read_i32(&self, _address: Address) -> Result<i32, ReadError> {
            match *self {}
        }
    }

    impl ProcessHandle for UnsupportedProcess {
        fn pid(&self) -> ProcessId {
            match *self {}
        }

        fn module_base(&self, _module_name: &str) -> Option<Address> {
            match *self {}
        }
    }

    impl ProcessBackend for UnsupportedBackend {
        type Handle = UnsupportedProcess;

        fn find_process(&self, _name: &str) -> Option<ProcessId> {
            None
        }

        fn open(&self, _pid: ProcessId) -> Result<UnsupportedProcess, AttachError> {
            Err(AttachError::Unsupported)
        }
    }
}

/// Last path component, accepting both `/` and `\` separators
/// (Windows paths show up verbatim in Wine command lines).
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
