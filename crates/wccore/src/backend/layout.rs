//! Linear-memory layout — spec.md §4.4.
//!
//! The backend keeps one linear memory for the data pool and the shim
//! shadow stack the built-ins expect, per spec.md's fixed layout: the data
//! pool starts at byte offset 8 (the first 8 bytes are reserved exactly as
//! the teacher's own data-segment convention reserves a null sentinel
//! region), `__stack_pointer` starts 32-byte aligned past the end of the
//! pool, and `__heap_base` sits just past the stack.

use ahash::AHashMap;

use crate::ir::{IrModule, StringId};

/// Bytes reserved before the data pool begins.
const DATA_POOL_OFFSET: u32 = 8;

/// Conservative fixed shadow-stack size; large enough for the built-in
/// snippets' own locals without the backend needing a real stack-depth
/// analysis (this rewrite has no recursion-depth-sensitive built-ins).
const STACK_SIZE: u32 = 64 * 1024;

fn align32(n: u32) -> u32 {
    (n + 31) & !31
}

/// Where in linear memory each string literal's UTF-8 bytes live.
pub struct MemoryLayout {
    pub data: Vec<u8>,
    pub string_offsets: AHashMap<StringId, (u32, u32)>,
    pub data_end: u32,
    pub stack_pointer: u32,
    pub heap_base: u32,
}

pub fn build(module: &IrModule) -> MemoryLayout {
    let mut data = Vec::new();
    let mut string_offsets = AHashMap::new();
    for (idx, s) in module.strings.iter().enumerate() {
        let offset = DATA_POOL_OFFSET + data.len() as u32;
        let bytes = s.as_bytes();
        data.extend_from_slice(bytes);
        string_offsets.insert(StringId(idx as u32), (offset, bytes.len() as u32));
    }

    let data_end = align32(DATA_POOL_OFFSET + data.len() as u32);
    let stack_pointer = data_end + STACK_SIZE;
    let heap_base = stack_pointer;

    MemoryLayout { data, string_offsets, data_end, stack_pointer, heap_base }
}
