//! Exec tracepoints: one record per execve/execveat entry.

use core::mem::offset_of;

use aya_ebpf::{
    helpers::bpf_get_current_pid_tgid,
    macros::{map, tracepoint},
    maps::RingBuf,
    programs::TracePointContext,
};
use aya_log_ebpf::debug;
use tripwire_common::{EXEC_RINGBUF_SIZE, ExecRecord, ExecVariant, fill_record};

use super::{CurrentTask, UserSpace, syscall_types::SysEnter};

#[map]
pub static EXEC_EVENTS: RingBuf = RingBuf::with_byte_size(EXEC_RINGBUF_SIZE, 0);

/// Tracepoint for sys_enter_execve.
#[tracepoint]
pub fn trace_execve(ctx: TracePointContext) -> u32 {
    emit_exec(&ctx, ExecVariant::Execve)
}

/// Tracepoint for sys_enter_execveat.
#[tracepoint]
pub fn trace_execveat(ctx: TracePointContext) -> u32 {
    emit_exec(&ctx, ExecVariant::Execveat)
}

/// Raw syscall argument `idx`, or 0 when the context read fails.
#[inline(always)]
fn syscall_arg(ctx: &TracePointContext, idx: usize) -> u64 {
    let offset = offset_of!(SysEnter, args) + idx * core::mem::size_of::<u64>();
    unsafe { ctx.read_at::<u64>(offset) }.unwrap_or(0)
}

#[inline(always)]
fn emit_exec(ctx: &TracePointContext, variant: ExecVariant) -> u32 {
    let Some(mut slot) = EXEC_EVENTS.reserve::<ExecRecord>(0) else {
        let pid = (bpf_get_current_pid_tgid() >> 32) as u32;
        debug!(ctx, "exec ring full, dropped record for pid {}", pid);
        return 0;
    };

    let filename_ptr = syscall_arg(ctx, variant.path_arg());
    let argv_ptr = syscall_arg(ctx, variant.argv_arg());

    let record = unsafe { &mut *slot.as_mut_ptr() };
    fill_record(&CurrentTask, &UserSpace, record, filename_ptr, argv_ptr);
    slot.submit(0);

    0
}
