use crate::memory::KernelMemory;

/// Byte offsets of the `task_struct` fields behind `ppid`, resolved by the
/// loader from the running kernel's BTF. Zero means unresolved.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskOffsets {
    pub real_parent: u32,
    pub tgid: u32,
}

impl TaskOffsets {
    pub const UNRESOLVED: Self = Self {
        real_parent: 0,
        tgid: 0,
    };

    pub const fn is_resolved(&self) -> bool {
        self.real_parent != 0 && self.tgid != 0
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for TaskOffsets {}

/// `task->real_parent->tgid`, or 0 when an offset is unresolved or a read faults.
#[inline(always)]
pub fn read_parent_tgid<K: KernelMemory>(mem: &K, task: u64, offsets: &TaskOffsets) -> u32 {
    if task == 0 || !offsets.is_resolved() {
        return 0;
    }
    let parent = match mem.read_kernel_ptr(task.wrapping_add(offsets.real_parent as u64)) {
        Ok(parent) if parent != 0 => parent,
        _ => return 0,
    };
    match mem.read_kernel_i32(parent.wrapping_add(offsets.tgid as u64)) {
        Ok(tgid) if tgid > 0 => tgid as u32,
        _ => 0,
    }
}
