//! `task_struct` field offsets read from the running kernel's BTF.
//!
//! The probe reads `current->real_parent->tgid` through raw offsets, so they
//! are looked up here at startup instead of being baked in at build time.

use std::{fs, path::Path};

use anyhow::{Context, Result, bail, ensure};
use tripwire_common::TaskOffsets;

pub const VMLINUX_BTF: &str = "/sys/kernel/btf/vmlinux";

const BTF_MAGIC: u16 = 0xeb9f;
const HEADER_LEN: usize = 24;
const TYPE_LEN: usize = 12;
const MEMBER_LEN: usize = 12;

const KIND_INT: u32 = 1;
const KIND_PTR: u32 = 2;
const KIND_ARRAY: u32 = 3;
const KIND_STRUCT: u32 = 4;
const KIND_UNION: u32 = 5;
const KIND_ENUM: u32 = 6;
const KIND_FWD: u32 = 7;
const KIND_TYPEDEF: u32 = 8;
const KIND_VOLATILE: u32 = 9;
const KIND_CONST: u32 = 10;
const KIND_RESTRICT: u32 = 11;
const KIND_FUNC: u32 = 12;
const KIND_FUNC_PROTO: u32 = 13;
const KIND_VAR: u32 = 14;
const KIND_DATASEC: u32 = 15;
const KIND_FLOAT: u32 = 16;
const KIND_DECL_TAG: u32 = 17;
const KIND_TYPE_TAG: u32 = 18;
const KIND_ENUM64: u32 = 19;

// Nested anonymous struct/union members followed when looking up a field.
const MAX_NESTING: usize = 8;

#[derive(Debug, Clone, Copy)]
struct TypeEntry {
    name_off: u32,
    kind: u32,
    kind_flag: bool,
    vlen: usize,
    // start of the kind-specific data inside the type section
    data: usize,
}

/// Type and string sections of a raw BTF blob.
pub struct Btf<'a> {
    types: &'a [u8],
    strings: &'a [u8],
    entries: Vec<TypeEntry>,
}

fn read_u32(data: &[u8], at: usize) -> Result<u32> {
    let bytes: [u8; 4] = at
        .checked_add(4)
        .and_then(|end| data.get(at..end))
        .and_then(|b| b.try_into().ok())
        .context("BTF truncated")?;
    Ok(u32::from_ne_bytes(bytes))
}

fn section(body: &[u8], off: u32, len: u32) -> Result<&[u8]> {
    let start = off as usize;
    start
        .checked_add(len as usize)
        .and_then(|end| body.get(start..end))
        .context("BTF section out of bounds")
}

impl<'a> Btf<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        ensure!(data.len() >= HEADER_LEN, "BTF header truncated");
        let magic = u16::from_ne_bytes([data[0], data[1]]);
        ensure!(
            magic == BTF_MAGIC,
            "bad BTF magic {:#06x} (not BTF, or foreign byte order)",
            magic
        );

        let hdr_len = read_u32(data, 4)? as usize;
        let body = data.get(hdr_len..).context("BTF header length out of bounds")?;
        let types = section(body, read_u32(data, 8)?, read_u32(data, 12)?)?;
        let strings = section(body, read_u32(data, 16)?, read_u32(data, 20)?)?;

        let mut entries = Vec::new();
        let mut pos = 0;
        while pos < types.len() {
            let name_off = read_u32(types, pos)?;
            let info = read_u32(types, pos + 4)?;
            let kind = (info >> 24) & 0x1f;
            let vlen = (info & 0xffff) as usize;
            let start = pos + TYPE_LEN;

            let extra = match kind {
                KIND_INT | KIND_VAR | KIND_DECL_TAG => 4,
                KIND_PTR | KIND_FWD | KIND_TYPEDEF | KIND_VOLATILE | KIND_CONST
                | KIND_RESTRICT | KIND_FUNC | KIND_FLOAT | KIND_TYPE_TAG => 0,
                KIND_ARRAY => 12,
                KIND_STRUCT | KIND_UNION => vlen * MEMBER_LEN,
                KIND_ENUM | KIND_FUNC_PROTO => vlen * 8,
                KIND_DATASEC | KIND_ENUM64 => vlen * 12,
                other => bail!("unknown BTF kind {} at type {}", other, entries.len() + 1),
            };

            entries.push(TypeEntry {
                name_off,
                kind,
                kind_flag: info >> 31 == 1,
                vlen,
                data: start,
            });
            pos = start + extra;
        }
        ensure!(pos == types.len(), "BTF type section truncated");

        Ok(Self {
            types,
            strings,
            entries,
        })
    }

    fn name(&self, off: u32) -> Result<&'a str> {
        let tail = self
            .strings
            .get(off as usize..)
            .context("BTF name offset out of bounds")?;
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .context("unterminated BTF name")?;
        std::str::from_utf8(&tail[..end]).context("BTF name is not UTF-8")
    }

    /// Type ids start at 1; 0 is `void`.
    fn entry(&self, id: u32) -> Option<&TypeEntry> {
        (id as usize).checked_sub(1).and_then(|i| self.entries.get(i))
    }

    fn find_struct(&self, name: &str) -> Result<&TypeEntry> {
        for entry in &self.entries {
            if entry.kind == KIND_STRUCT && entry.vlen > 0 && self.name(entry.name_off)? == name {
                return Ok(entry);
            }
        }
        bail!("struct {} not found in BTF", name)
    }

    /// Bit offset of `field`, descending into anonymous struct/union members.
    fn member_bits(&self, record: &TypeEntry, field: &str, depth: usize) -> Result<Option<u32>> {
        for i in 0..record.vlen {
            let at = record.data + i * MEMBER_LEN;
            let name_off = read_u32(self.types, at)?;
            let type_id = read_u32(self.types, at + 4)?;
            let raw = read_u32(self.types, at + 8)?;
            // kind_flag packs the bitfield size into the top byte
            let bits = if record.kind_flag { raw & 0x00ff_ffff } else { raw };

            if name_off == 0 {
                if depth >= MAX_NESTING {
                    continue;
                }
                let Some(inner) = self.entry(type_id) else {
                    continue;
                };
                if matches!(inner.kind, KIND_STRUCT | KIND_UNION) {
                    if let Some(nested) = self.member_bits(inner, field, depth + 1)? {
                        return Ok(Some(bits + nested));
                    }
                }
            } else if self.name(name_off)? == field {
                return Ok(Some(bits));
            }
        }
        Ok(None)
    }

    /// Byte offset of `field` within `struct <name>`.
    pub fn member_offset(&self, name: &str, field: &str) -> Result<u32> {
        let record = self.find_struct(name)?;
        let Some(bits) = self.member_bits(record, field, 0)? else {
            bail!("struct {} has no member {}", name, field);
        };
        ensure!(bits % 8 == 0, "{}.{} is a bitfield", name, field);
        Ok(bits / 8)
    }

    pub fn task_offsets(&self) -> Result<TaskOffsets> {
        Ok(TaskOffsets {
            real_parent: self.member_offset("task_struct", "real_parent")?,
            tgid: self.member_offset("task_struct", "tgid")?,
        })
    }
}

/// Resolves [`TaskOffsets`] from the BTF file at `path`.
pub fn load_task_offsets(path: &Path) -> Result<TaskOffsets> {
    let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Btf::parse(&data)?.task_offsets()
}
