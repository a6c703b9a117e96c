#![cfg_attr(not(test), no_std)]

pub mod argv;
pub mod fill;
pub mod memory;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use argv::fill_argv;
pub use fill::fill_record;
pub use memory::{KernelMemory, TaskContext, UserMemory};
pub use task::{TaskOffsets, read_parent_tgid};

/// Matches `TASK_COMM_LEN` in `<linux/sched.h>`.
pub const COMM_LEN: usize = 16;
pub const PATH_LEN: usize = 256;
pub const ARGV_LEN: usize = 256;

/// Upper bound on argv slots visited per exec.
pub const MAX_ARGS: usize = 16;

pub const EXEC_RINGBUF_SIZE: u32 = 1 << 24; // 16 MiB
pub const EXEC_EVENTS_MAP: &str = "EXEC_EVENTS";

/// Read-only global the loader fills with `task_struct` field offsets.
pub const TASK_OFFSETS_GLOBAL: &str = "TASK_OFFSETS";

/// Kernel-populated record published on `EXEC_EVENTS`.
///
/// The layout is shared byte for byte with userspace:
/// pid@0, ppid@4, uid@8, gid@12, comm@16, filename@32, argv@288, 544 bytes total.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ExecRecord {
    pub pid: u32,
    pub ppid: u32,
    pub uid: u32,
    pub gid: u32,
    pub comm: [u8; COMM_LEN],
    pub filename: [u8; PATH_LEN],
    pub argv: [u8; ARGV_LEN],
}

pub const EXEC_RECORD_SIZE: usize = core::mem::size_of::<ExecRecord>();

const _: () = {
    assert!(EXEC_RECORD_SIZE == 544);
    assert!(core::mem::offset_of!(ExecRecord, pid) == 0);
    assert!(core::mem::offset_of!(ExecRecord, ppid) == 4);
    assert!(core::mem::offset_of!(ExecRecord, uid) == 8);
    assert!(core::mem::offset_of!(ExecRecord, gid) == 12);
    assert!(core::mem::offset_of!(ExecRecord, comm) == 16);
    assert!(core::mem::offset_of!(ExecRecord, filename) == 32);
    assert!(core::mem::offset_of!(ExecRecord, argv) == 288);
};

impl ExecRecord {
    pub const fn zeroed() -> Self {
        Self {
            pid: 0,
            ppid: 0,
            uid: 0,
            gid: 0,
            comm: [0; COMM_LEN],
            filename: [0; PATH_LEN],
            argv: [0; ARGV_LEN],
        }
    }

    /// Decode a ring sample. Returns `None` unless `bytes` is exactly one record.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != EXEC_RECORD_SIZE {
            return None;
        }
        // SAFETY: length checked above; every bit pattern is a valid ExecRecord.
        Some(unsafe { core::ptr::read_unaligned(bytes.as_ptr() as *const ExecRecord) })
    }

    pub fn as_bytes(&self) -> &[u8; EXEC_RECORD_SIZE] {
        // SAFETY: repr(C) with no padding, asserted above.
        unsafe { &*(self as *const ExecRecord as *const [u8; EXEC_RECORD_SIZE]) }
    }
}

impl Default for ExecRecord {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for ExecRecord {}

/// The two exec syscalls the probe instruments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecVariant {
    Execve,
    Execveat,
}

impl ExecVariant {
    pub const ALL: [ExecVariant; 2] = [ExecVariant::Execve, ExecVariant::Execveat];

    /// Syscall argument index holding the path pointer.
    pub const fn path_arg(self) -> usize {
        match self {
            ExecVariant::Execve => 0,
            ExecVariant::Execveat => 1,
        }
    }

    /// Syscall argument index holding the argv pointer.
    pub const fn argv_arg(self) -> usize {
        match self {
            ExecVariant::Execve => 1,
            ExecVariant::Execveat => 2,
        }
    }

    pub const fn program_name(self) -> &'static str {
        match self {
            ExecVariant::Execve => "trace_execve",
            ExecVariant::Execveat => "trace_execveat",
        }
    }

    pub const fn tracepoint(self) -> &'static str {
        match self {
            ExecVariant::Execve => "sys_enter_execve",
            ExecVariant::Execveat => "sys_enter_execveat",
        }
    }
}

pub const TRACEPOINT_CATEGORY: &str = "syscalls";

/// Returns the bytes of `field` before its first NUL, or all of it when no NUL is present.
pub fn c_str_bytes(field: &[u8]) -> &[u8] {
    match field.iter().position(|&b| b == 0) {
        Some(end) => &field[..end],
        None => field,
    }
}
