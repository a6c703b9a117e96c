//! In-memory stand-ins for the kernel helpers, used by unit tests.

use std::{
    cell::Cell,
    collections::{HashMap, HashSet},
};

use crate::{
    COMM_LEN,
    memory::{KernelMemory, TaskContext, UserMemory},
};

const EFAULT: i64 = -14;
const BASE_ADDR: u64 = 0x7ffd_0000_0000;

/// Sparse fake of a user address space: pointer words and C strings.
#[derive(Default)]
pub struct FakeUser {
    words: HashMap<u64, u64>,
    strings: HashMap<u64, Vec<u8>>,
    faulting_words: HashSet<u64>,
    faulting_strings: HashSet<u64>,
    next_addr: u64,
    pointer_reads: Cell<usize>,
}

impl FakeUser {
    fn alloc(&mut self, size: usize) -> u64 {
        if self.next_addr == 0 {
            self.next_addr = BASE_ADDR;
        }
        let addr = self.next_addr;
        // keep 16-byte spacing so allocations never overlap
        self.next_addr += (size as u64 + 16) & !0xf;
        addr
    }

    pub fn string(&mut self, s: &str) -> u64 {
        let addr = self.alloc(s.len() + 1);
        self.strings.insert(addr, s.as_bytes().to_vec());
        addr
    }

    /// Lays out a NULL-terminated argv array and returns its address.
    pub fn argv(&mut self, args: &[&str]) -> u64 {
        self.argv_with_hole(args, &[])
    }

    /// Like [`FakeUser::argv`], but places `after` behind the NULL slot.
    pub fn argv_with_hole(&mut self, args: &[&str], after: &[&str]) -> u64 {
        let mut ptrs: Vec<u64> = args.iter().map(|a| self.string(a)).collect();
        ptrs.push(0);
        ptrs.extend(after.iter().map(|a| self.string(a)));
        ptrs.push(0);

        let base = self.alloc(ptrs.len() * 8);
        for (i, ptr) in ptrs.into_iter().enumerate() {
            self.words.insert(base + i as u64 * 8, ptr);
        }
        base
    }

    pub fn put_word(&mut self, addr: u64, value: u64) {
        self.words.insert(addr, value);
    }

    pub fn word(&self, addr: u64) -> u64 {
        self.words.get(&addr).copied().unwrap_or_default()
    }

    pub fn fault_word(&mut self, addr: u64) {
        self.faulting_words.insert(addr);
    }

    pub fn fault_string(&mut self, addr: u64) {
        self.faulting_strings.insert(addr);
    }

    pub fn pointer_reads(&self) -> usize {
        self.pointer_reads.get()
    }
}

impl UserMemory for FakeUser {
    fn read_user_ptr(&self, addr: u64) -> Result<u64, i64> {
        self.pointer_reads.set(self.pointer_reads.get() + 1);
        if self.faulting_words.contains(&addr) {
            return Err(EFAULT);
        }
        self.words.get(&addr).copied().ok_or(EFAULT)
    }

    fn read_user_str(&self, src: u64, dst: &mut [u8]) -> Result<usize, i64> {
        if dst.is_empty() || self.faulting_strings.contains(&src) {
            return Err(EFAULT);
        }
        let s = self.strings.get(&src).ok_or(EFAULT)?;
        let n = s.len().min(dst.len() - 1);
        dst[..n].copy_from_slice(&s[..n]);
        dst[n] = 0;
        Ok(n)
    }
}

/// Sparse fake of kernel memory holding pointers and `i32` fields.
#[derive(Default)]
pub struct FakeKernel {
    ptrs: HashMap<u64, u64>,
    ints: HashMap<u64, i32>,
    reads: Cell<usize>,
}

impl FakeKernel {
    pub fn put_ptr(&mut self, addr: u64, value: u64) {
        self.ptrs.insert(addr, value);
    }

    pub fn put_i32(&mut self, addr: u64, value: i32) {
        self.ints.insert(addr, value);
    }

    pub fn reads(&self) -> usize {
        self.reads.get()
    }
}

impl KernelMemory for FakeKernel {
    fn read_kernel_ptr(&self, addr: u64) -> Result<u64, i64> {
        self.reads.set(self.reads.get() + 1);
        self.ptrs.get(&addr).copied().ok_or(EFAULT)
    }

    fn read_kernel_i32(&self, addr: u64) -> Result<i32, i64> {
        self.reads.set(self.reads.get() + 1);
        self.ints.get(&addr).copied().ok_or(EFAULT)
    }
}

/// Fixed task identity.
pub struct FakeTask {
    pub pid: u32,
    pub tid: u32,
    pub ppid: u32,
    pub uid: u32,
    pub gid: u32,
    pub comm: [u8; COMM_LEN],
}

impl FakeTask {
    pub fn new(pid: u32, ppid: u32, uid: u32, gid: u32, comm: &str) -> Self {
        let mut buf = [0u8; COMM_LEN];
        let n = comm.len().min(COMM_LEN - 1);
        buf[..n].copy_from_slice(&comm.as_bytes()[..n]);
        Self {
            pid,
            tid: pid,
            ppid,
            uid,
            gid,
            comm: buf,
        }
    }
}

impl TaskContext for FakeTask {
    fn pid_tgid(&self) -> u64 {
        ((self.pid as u64) << 32) | self.tid as u64
    }

    fn uid_gid(&self) -> u64 {
        ((self.gid as u64) << 32) | self.uid as u64
    }

    fn parent_tgid(&self) -> u32 {
        self.ppid
    }

    fn comm(&self) -> [u8; COMM_LEN] {
        self.comm
    }
}
