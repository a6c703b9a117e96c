/// Common tracepoint header for syscall events (sys_enter_*, sys_exit_*)
#[repr(C)]
#[allow(dead_code)]
pub struct SyscallTraceHeader {
    pub common_type: u16,
    pub common_flags: u8,
    pub common_preempt_count: u8,
    pub common_pid: i32,
    pub __syscall_nr: i32,
    pub _pad: i32,
}

/// Generic sys_enter_* record: six raw argument words after the header.
///
/// sys_enter_execve:   filename, argv, envp
/// sys_enter_execveat: fd, filename, argv, envp, flags
#[repr(C)]
#[allow(dead_code)]
pub struct SysEnter {
    pub header: SyscallTraceHeader,
    pub args: [u64; 6],
}
