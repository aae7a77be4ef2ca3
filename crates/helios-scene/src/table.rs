//! Record tables of the scene database.
//!
//! A [`DynTable`] carries variably sized records located through
//! [`LookupEntry`] headers; a [`FixTable`] carries uniform records with
//! an explicit entry count. Both are filled once by the loader and
//! treated as opaque bytes afterwards.

use bytemuck::{Pod, Zeroable};

/// Header locating one variably sized record inside a [`DynTable`].
///
/// Generated shader code assumes this exact 16-byte layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct LookupEntry {
    pub type_id: u32,
    pub flags: u32,
    pub offset: u64,
}

/// Table of variably sized records addressed through lookup entries.
#[derive(Debug, Clone, Default)]
pub struct DynTable {
    lookups: Vec<LookupEntry>,
    data: Vec<u8>,
}

impl DynTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.lookups.len()
    }

    pub fn reserve(&mut self, size: usize) {
        self.data.reserve(size);
    }

    /// Register a new record and return the writable data blob.
    ///
    /// The record starts at the current end of the blob, padded by
    /// `alignment - len % alignment` bytes when non-zero; a blob that
    /// already sits on a boundary still pads a full `alignment` step.
    /// Offsets are monotonically non-decreasing under insertion order.
    pub fn add_lookup(&mut self, type_id: u32, flags: u32, alignment: usize) -> &mut Vec<u8> {
        if alignment != 0 && !self.data.is_empty() {
            let defect = alignment - self.data.len() % alignment;
            self.data.resize(self.data.len() + defect, 0);
        }

        self.lookups.push(LookupEntry {
            type_id,
            flags,
            offset: self.data.len() as u64,
        });
        &mut self.data
    }

    #[must_use]
    pub fn lookups(&self) -> &[LookupEntry] {
        &self.lookups
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn current_offset(&self) -> usize {
        self.data.len()
    }
}

/// Table of uniform records.
///
/// Exposed to shaders as a flat buffer; element layout bookkeeping is
/// beyond the scope of this type.
#[derive(Debug, Clone, Default)]
pub struct FixTable {
    count: usize,
    data: Vec<u8>,
}

impl FixTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, size: usize) {
        self.data.reserve(size);
    }

    /// Register a new entry and return the writable data blob.
    ///
    /// Pads like [`DynTable::add_lookup`], including the full
    /// `alignment` step when the blob already sits on a boundary.
    pub fn add_entry(&mut self, alignment: usize) -> &mut Vec<u8> {
        if alignment != 0 && !self.data.is_empty() {
            let defect = alignment - self.data.len() % alignment;
            self.data.resize(self.data.len() + defect, 0);
        }

        self.count += 1;
        &mut self.data
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn current_offset(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn lookup_entry_layout() {
        // Generated code assumes this exact 16-byte layout
        assert_eq!(size_of::<LookupEntry>(), 16);
        assert_eq!(offset_of!(LookupEntry, type_id), 0);
        assert_eq!(offset_of!(LookupEntry, flags), 4);
        assert_eq!(offset_of!(LookupEntry, offset), 8);
    }

    #[test]
    fn dyntable_offsets_are_monotonic() {
        let mut table = DynTable::new();
        table.add_lookup(0, 0, 0).extend_from_slice(&[1, 2, 3]);
        table.add_lookup(1, 0, 4).extend_from_slice(&[4; 8]);
        table.add_lookup(2, 0, 4).extend_from_slice(&[5]);

        let lookups = table.lookups();
        assert_eq!(lookups.len(), 3);
        assert_eq!(lookups[0].offset, 0);
        assert_eq!(lookups[1].offset, 4); // padded from 3
        // An aligned blob still pads a full step: 12 becomes 16
        assert_eq!(lookups[2].offset, 16);
        assert!(lookups.windows(2).all(|w| w[0].offset <= w[1].offset));
        assert!(lookups.iter().all(|l| l.offset as usize <= table.data().len()));
    }

    #[test]
    fn fixtable_counts_entries() {
        let mut table = FixTable::new();
        table.add_entry(0).extend_from_slice(&[0; 16]);
        table.add_entry(16).extend_from_slice(&[0; 16]);
        assert_eq!(table.entry_count(), 2);
        // The second entry starts after a full alignment step at 32
        assert_eq!(table.data().len(), 48);
    }
}
