use crate::{
    ExecRecord,
    argv::fill_argv,
    memory::{TaskContext, UserMemory},
};

/// Populates every field of `record` in place.
///
/// `record` may point at uninitialised ring memory: the string fields are
/// zeroed before they are copied into, the integer fields are always written.
/// Faulting user reads leave a shorter, still NUL-terminated field; a faulting
/// parent read leaves `ppid` at 0.
#[inline(always)]
pub fn fill_record<T: TaskContext, M: UserMemory>(
    task: &T,
    mem: &M,
    record: &mut ExecRecord,
    filename_ptr: u64,
    argv_ptr: u64,
) {
    let pid_tgid = task.pid_tgid();
    let uid_gid = task.uid_gid();

    record.pid = (pid_tgid >> 32) as u32;
    record.ppid = task.parent_tgid();
    record.uid = uid_gid as u32;
    record.gid = (uid_gid >> 32) as u32;

    record.comm = task.comm();
    record.comm[record.comm.len() - 1] = 0;

    record.filename.fill(0);
    if filename_ptr != 0 {
        let _ = mem.read_user_str(filename_ptr, &mut record.filename);
    }

    record.argv.fill(0);
    fill_argv(mem, argv_ptr, &mut record.argv);
}
