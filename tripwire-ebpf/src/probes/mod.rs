//! Kernel-side implementations of the record filler's context traits.

use aya_ebpf::helpers::{
    bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_get_current_uid_gid,
    bpf_probe_read_kernel, bpf_probe_read_user, bpf_probe_read_user_str_bytes,
    generated::bpf_get_current_task,
};
use tripwire_common::{
    COMM_LEN, KernelMemory, TaskContext, TaskOffsets, UserMemory, read_parent_tgid,
};

pub mod exec;
pub mod syscall_types;

/// Filled in by the loader with `EbpfLoader::set_global`.
#[unsafe(no_mangle)]
static TASK_OFFSETS: TaskOffsets = TaskOffsets::UNRESOLVED;

/// The task executing the current program.
pub struct CurrentTask;

impl TaskContext for CurrentTask {
    #[inline(always)]
    fn pid_tgid(&self) -> u64 {
        bpf_get_current_pid_tgid()
    }

    #[inline(always)]
    fn uid_gid(&self) -> u64 {
        bpf_get_current_uid_gid()
    }

    /// `current->real_parent->tgid` at the offsets the loader resolved.
    #[inline(always)]
    fn parent_tgid(&self) -> u32 {
        let offsets = unsafe { core::ptr::read_volatile(&TASK_OFFSETS) };
        let task = unsafe { bpf_get_current_task() };
        read_parent_tgid(&KernelSpace, task, &offsets)
    }

    #[inline(always)]
    fn comm(&self) -> [u8; COMM_LEN] {
        bpf_get_current_comm().unwrap_or([0; COMM_LEN])
    }
}

pub struct KernelSpace;

impl KernelMemory for KernelSpace {
    #[inline(always)]
    fn read_kernel_ptr(&self, addr: u64) -> Result<u64, i64> {
        unsafe { bpf_probe_read_kernel(addr as *const u64) }
    }

    #[inline(always)]
    fn read_kernel_i32(&self, addr: u64) -> Result<i32, i64> {
        unsafe { bpf_probe_read_kernel(addr as *const i32) }
    }
}

/// User address space of the current task.
pub struct UserSpace;

impl UserMemory for UserSpace {
    #[inline(always)]
    fn read_user_ptr(&self, addr: u64) -> Result<u64, i64> {
        unsafe { bpf_probe_read_user(addr as *const u64) }
    }

    #[inline(always)]
    fn read_user_str(&self, src: u64, dst: &mut [u8]) -> Result<usize, i64> {
        unsafe { bpf_probe_read_user_str_bytes(src as *const u8, dst) }.map(|s| s.len())
    }
}
