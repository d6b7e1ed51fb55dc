//! Win32 process backend (ToolHelp32 enumeration, `process_memory` reads)

use std::mem::size_of;

use process_memory::{CopyAddress, ProcessHandle as RemoteHandle, TryIntoProcessHandle};
use tracing::{debug, trace};
use windows::Win32::Foundation::{CloseHandle, ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER, HANDLE};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Module32FirstW, Module32NextW, Process32FirstW, Process32NextW,
    CREATE_TOOLHELP_SNAPSHOT_FLAGS, MODULEENTRY32W, PROCESSENTRY32W, TH32CS_SNAPMODULE,
    TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
};

use super::{Address, AttachError, MemoryReader, ProcessBackend, ProcessHandle, ProcessId, ReadError};

/// Owned ToolHelp32 snapshot, closed on drop
struct Snapshot(HANDLE);

impl Snapshot {
    fn take(flags: CREATE_TOOLHELP_SNAPSHOT_FLAGS, pid: ProcessId) -> Option<Self> {
        // Module snapshots fail transiently (ERROR_BAD_LENGTH) while the target is
        // still loading; callers just retry on their next poll.
        match unsafe { CreateToolhelp32Snapshot(flags, pid) } {
            Ok(handle) => Some(Self(handle)),
            Err(e) => {
                trace!("CreateToolhelp32Snapshot({}) failed: {}", pid, e);
                None
            }
        }
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// Decode a NUL-terminated UTF-16 buffer
fn wide_to_string(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

/// Process table access through ToolHelp32 snapshots
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Backend;

impl ProcessBackend for Win32Backend {
    type Handle = Win32Process;

    fn find_process(&self, name: &str) -> Option<ProcessId> {
        let snapshot = Snapshot::take(TH32CS_SNAPPROCESS, 0)?;

        let mut entry = PROCESSENTRY32W {
            dwSize: size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };

        let mut more = unsafe { Process32FirstW(snapshot.0, &mut entry) }.is_ok();
        while more {
            if wide_to_string(&entry.szExeFile) == name {
                return Some(entry.th32ProcessID);
            }
            more = unsafe { Process32NextW(snapshot.0, &mut entry) }.is_ok();
        }
        None
    }

    fn open(&self, pid: ProcessId) -> Result<Win32Process, AttachError> {
        match pid.try_into_process_handle() {
            Ok(handle) => {
                debug!("Opened process {}", pid);
                Ok(Win32Process { pid, handle })
            }
            Err(e) => Err(open_error(pid, e)),
        }
    }
}

fn open_error(pid: ProcessId, e: std::io::Error) -> AttachError {
    match e.raw_os_error().map(|code| code as u32) {
        Some(code) if code == ERROR_ACCESS_DENIED.0 => AttachError::AccessDenied(pid),
        Some(code) if code == ERROR_INVALID_PARAMETER.0 => AttachError::Gone(pid),
        _ => AttachError::Io { pid, source: e },
    }
}

/// Open process handle, closed on drop
pub struct Win32Process {
    pid: ProcessId,
    handle: RemoteHandle,
}

impl MemoryReader for Win32Process {
    fn read_i32(&self, address: Address) -> Result<i32, ReadError> {
        let mut buf = [0u8; 4];
        self.handle.copy_address(address, &mut buf).map_err(|e| {
            trace!("read at {:#x} in {} failed: {}", address, self.pid, e);
            ReadError::Unreadable(address)
        })?;
        Ok(i32::from_le_bytes(buf))
    }
}

impl ProcessHandle for Win32Process {
    fn pid(&self) -> ProcessId {
        self.pid
    }

    fn module_base(&self, module_name: &str) -> Option<Address> {
        // SNAPMODULE32 makes a 64-bit build see the modules of a 32-bit target
        let snapshot = Snapshot::take(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, self.pid)?;

        let mut entry = MODULEENTRY32W {
            dwSize: size_of::<MODULEENTRY32W>() as u32,
            ..Default::default()
        };

        let mut more = unsafe { Module32FirstW(snapshot.0, &mut entry) }.is_ok();
        while more {
            if wide_to_string(&entry.szModule) == module_name {
                return Some(entry.modBaseAddr as Address);
            }
            more = unsafe { Module32NextW(snapshot.0, &mut entry) }.is_ok();
        }
        None
    }
}

impl Drop for Win32Process {
    fn drop(&mut self) {
        debug!("Closing process handle {}", self.pid);
        unsafe {
            let _ = CloseHandle(HANDLE(self.handle.0 as isize));
        }
    }
}
