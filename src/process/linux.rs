//! procfs process backend
//!
//! Covers the game running under Wine/Proton: the Windows executable shows up
//! as argv[0] (or as the `exe` link for native binaries), module bases come
//! from `/proc/<pid>/maps` and reads go through `process_memory`.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::PathBuf;

use process_memory::{CopyAddress, Pid, ProcessHandle as RemoteHandle, TryIntoProcessHandle};
use tracing::{debug, trace};

use super::{file_name, Address, AttachError, MemoryReader, ProcessBackend, ProcessHandle, ProcessId, ReadError};

/// Process table access through `/proc`
#[derive(Debug, Clone)]
pub struct ProcfsBackend {
    root: PathBuf,
}

impl Default for ProcfsBackend {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/proc"),
        }
    }
}

impl ProcfsBackend {
    /// Executable names a process answers to: the `exe` link target and argv[0]
    fn process_names(&self, pid: ProcessId) -> Vec<String> {
        let dir = self.root.join(pid.to_string());
        let mut names = Vec::with_capacity(2);

        if let Ok(target) = fs::read_link(dir.join("exe")) {
            if let Some(name) = target.file_name() {
                names.push(name.to_string_lossy().into_owned());
            }
        }

        if let Ok(cmdline) = fs::read(dir.join("cmdline")) {
            if let Some(argv0) = cmdline.split(|&b| b == 0).next().filter(|a| !a.is_empty()) {
                names.push(file_name(&String::from_utf8_lossy(argv0)).to_string());
            }
        }

        names
    }
}

impl ProcessBackend for ProcfsBackend {
    type Handle = ProcfsProcess;

    fn find_process(&self, name: &str) -> Option<ProcessId> {
        let entries = fs::read_dir(&self.root).ok()?;

        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str()?.parse::<ProcessId>().ok())
            .find(|&pid| self.process_names(pid).iter().any(|n| n == name))
    }

    fn open(&self, pid: ProcessId) -> Result<ProcfsProcess, AttachError> {
        let dir = self.root.join(pid.to_string());

        // `maps` needs the same ptrace access as reading memory does
        File::open(dir.join("maps")).map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => AttachError::AccessDenied(pid),
            ErrorKind::NotFound => AttachError::Gone(pid),
            _ => AttachError::Io { pid, source: e },
        })?;

        let raw = i32::try_from(pid).map_err(|_| AttachError::Gone(pid))?;
        let handle = (raw as Pid)
            .try_into_process_handle()
            .map_err(|e| AttachError::Io { pid, source: e })?;

        debug!("Attached to process {}", pid);
        Ok(ProcfsProcess { pid, dir, handle })
    }
}

/// Process opened for `process_vm_readv` reads
pub struct ProcfsProcess {
    pid: ProcessId,
    dir: PathBuf,
    handle: RemoteHandle,
}

impl MemoryReader for ProcfsProcess {
    fn read_i32(&self, address: Address) -> Result<i32, ReadError> {
        let mut buf = [0u8; 4];
        self.handle.copy_address(address, &mut buf).map_err(|e| {
            trace!("read at {:#x} in {} failed: {}", address, self.pid, e);
            ReadError::Unreadable(address)
        })?;
        Ok(i32::from_le_bytes(buf))
    }
}

impl ProcessHandle for ProcfsProcess {
    fn pid(&self) -> ProcessId {
        self.pid
    }

    fn module_base(&self, module_name: &str) -> Option<Address> {
        let maps = fs::read_to_string(self.dir.join("maps")).ok()?;
        maps.lines().find_map(|line| parse_maps_line(line, module_name))
    }
}

/// Start address of a `/proc/<pid>/maps` line whose mapped file is `module_name`.
///
/// Line format: `start-end perms offset dev inode [path]`; the path may
/// contain spaces.
fn parse_maps_line(line: &str, module_name: &str) -> Option<Address> {
    let mut fields = line.splitn(6, char::is_whitespace);
    let range = fields.next()?;
    let path = fields.nth(4)?.trim_start();

    if path.is_empty() || file_name(path) != module_name {
        return None;
    }

    let start = range.split('-').next()?;
    Address::from_str_radix(start, 16).ok()
}
