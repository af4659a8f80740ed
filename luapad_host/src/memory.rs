use std::sync::Arc;

use crate::core::EmulatorCore;

/// Width of a scalar memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Short,
    Int,
    Float,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemoryValue {
    Byte(u8),
    Short(u16),
    Int(u32),
    Float(f32),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { address: u32 },
    /// A recorded movie is replaying; memory stays untouched.
    ReplayLocked,
    /// The pointer chain resolved to address zero.
    Unresolved,
}

/// Follows a multilevel pointer chain starting at `base`.
///
/// Each offset re-reads the 32-bit pointer at the running address and adds
/// the offset to it. An empty chain yields `base` itself. A chain that ends
/// on address zero is unresolved; intermediate links are not checked.
pub fn resolve_pointer_chain(core: &dyn EmulatorCore, base: u32, offsets: &[u32]) -> Option<u32> {
    if offsets.is_empty() {
        return Some(base);
    }
    let address = offsets
        .iter()
        .fold(base, |address, offset| core.read_u32(address).wrapping_add(*offset));
    (address != 0).then_some(address)
}

/// Typed reads and writes against emulated memory on behalf of a script.
#[derive(Debug, Clone)]
pub struct MemoryAccessBridge {
    core: Arc<dyn EmulatorCore>,
}

impl MemoryAccessBridge {
    pub fn new(core: Arc<dyn EmulatorCore>) -> Self {
        Self { core }
    }

    pub fn resolve(&self, base: u32, offsets: &[u32]) -> Option<u32> {
        resolve_pointer_chain(self.core.as_ref(), base, offsets)
    }

    /// Reads a scalar; unresolved chains read as zero.
    pub fn read(&self, width: Width, base: u32, offsets: &[u32]) -> MemoryValue {
        let address = self.resolve(base, offsets);
        match width {
            Width::Byte => MemoryValue::Byte(address.map_or(0, |a| self.core.read_u8(a))),
            Width::Short => MemoryValue::Short(address.map_or(0, |a| self.core.read_u16(a))),
            Width::Int => MemoryValue::Int(address.map_or(0, |a| self.core.read_u32(a))),
            Width::Float => MemoryValue::Float(address.map_or(0.0, |a| self.core.read_f32(a))),
        }
    }

    /// Reads exactly `len` bytes, terminators included.
    pub fn read_string(&self, base: u32, offsets: &[u32], len: usize) -> Vec<u8> {
        match self.resolve(base, offsets) {
            Some(address) => self.core.read_bytes(address, len),
            None => Vec::new(),
        }
    }

    pub fn write(&self, base: u32, offsets: &[u32], value: &MemoryValue) -> WriteOutcome {
        if self.core.is_playing_input() {
            log::debug!("memory write at 0x{base:08X} skipped during movie playback");
            return WriteOutcome::ReplayLocked;
        }
        let Some(address) = self.resolve(base, offsets) else {
            log::debug!("memory write skipped: pointer chain from 0x{base:08X} is unresolved");
            return WriteOutcome::Unresolved;
        };
        match value {
            MemoryValue::Byte(v) => self.core.write_u8(address, *v),
            MemoryValue::Short(v) => self.core.write_u16(address, *v),
            MemoryValue::Int(v) => self.core.write_u32(address, *v),
            MemoryValue::Float(v) => self.core.write_f32(address, *v),
            MemoryValue::Bytes(bytes) => self.core.write_bytes(address, bytes),
        }
        WriteOutcome::Written { address }
    }

    /// With no offsets, returns the pointer stored at `base`; otherwise the
    /// address the chain resolves to (zero when unresolved).
    pub fn pointer(&self, base: u32, offsets: &[u32]) -> u32 {
        if offsets.is_empty() {
            return self.core.read_u32(base);
        }
        self.resolve(base, offsets).unwrap_or(0)
    }
}
