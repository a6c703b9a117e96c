//! Accessors the fill logic reads through.
//!
//! The eBPF program implements these with the kernel helpers
//! (`bpf_probe_read_user*`, `bpf_probe_read_kernel`, `bpf_get_current_*`);
//! tests implement them over in-memory fakes.

/// Fault-safe reads from the traced process's address space.
pub trait UserMemory {
    /// Reads one pointer-sized word at `addr`.
    fn read_user_ptr(&self, addr: u64) -> Result<u64, i64>;

    /// Copies the NUL-terminated string at `src` into `dst`.
    ///
    /// At most `dst.len() - 1` bytes are copied and `dst` is NUL-terminated
    /// on success. Returns the number of bytes copied, excluding the NUL.
    fn read_user_str(&self, src: u64, dst: &mut [u8]) -> Result<usize, i64>;
}

/// Fault-safe reads from kernel memory.
pub trait KernelMemory {
    fn read_kernel_ptr(&self, addr: u64) -> Result<u64, i64>;

    fn read_kernel_i32(&self, addr: u64) -> Result<i32, i64>;
}

/// Identity of the task that hit the tracepoint.
pub trait TaskContext {
    /// `tgid << 32 | tid`
    fn pid_tgid(&self) -> u64;

    /// `gid << 32 | uid`
    fn uid_gid(&self) -> u64;

    /// `current->real_parent->tgid`, or 0 when the read faults.
    fn parent_tgid(&self) -> u32;

    fn comm(&self) -> [u8; crate::COMM_LEN];
}
