//! # i386 Page Directory
//!
//! - [`DirectoryIndex`]: index type for VA bits `[31:22]`.
//! - [`PdEntry`]: a directory entry; when present it points to a [`PageTable`](super::pt::PageTable).
//! - [`PageDirectory`]: a 4 KiB-aligned array of 1024 PDEs.
//!
//! Large (4 MiB) pages are never used, so `PS` is forced to 0.

use crate::PageEntryBits;
use crate::page_table::ENTRIES;
use kernel_memory_addresses::{FrameNumber, PhysicalPage, VirtualAddress};

/// Index into the page directory (derived from VA bits `[31:22]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DirectoryIndex(u16);

/// A single page directory entry (PDE).
#[doc(alias = "PDE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PdEntry(PageEntryBits);

/// The page directory: 1024 entries, 4 KiB-aligned.
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PdEntry; ENTRIES],
}

impl DirectoryIndex {
    /// Extract bits `[31:22]` of `va`.
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new((va.as_u32() >> 22) as u16)
    }

    /// Construct from a raw `u16`.
    ///
    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!(v < 1024);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0 as u32
    }

    /// First virtual address covered by this directory slot.
    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.as_u32() << 22)
    }

    /// All directory indices in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..1024u16).map(Self)
    }
}

impl PdEntry {
    /// Create a zero (non-present) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    /// A not-present entry that keeps the permission bits of `flags`.
    #[inline]
    #[must_use]
    pub const fn unmapped(flags: PageEntryBits) -> Self {
        Self(flags.with_present(false).with_frame(FrameNumber::new(0)))
    }

    /// Point at the page table stored in `table`; forces `present=1`, `PS=0`.
    #[inline]
    #[must_use]
    pub const fn make_table(table: PhysicalPage, flags: PageEntryBits) -> Self {
        Self(
            flags
                .with_present(true)
                .with_large_page(false)
                .with_frame(table.frame()),
        )
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    /// If present, the physical page holding the next-level page table.
    #[inline]
    #[must_use]
    pub const fn next_table(self) -> Option<PhysicalPage> {
        if self.is_present() {
            Some(self.0.physical_page())
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }
}

impl PageDirectory {
    /// Read the entry at `i`.
    #[inline]
    #[must_use]
    pub const fn get(&self, i: DirectoryIndex) -> PdEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`.
    ///
    /// Caller must handle any required TLB invalidation when changing active mappings.
    #[inline]
    pub const fn set(&mut self, i: DirectoryIndex, e: PdEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Overwrite every entry with `e`.
    #[inline]
    pub fn fill(&mut self, e: PdEntry) {
        self.entries.fill(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_pointer() {
        let table = FrameNumber::new(0x201).page();
        let e = PdEntry::make_table(table, PageEntryBits::new_user_rw().with_large_page(true));
        assert_eq!(e.raw(), 0x0020_1007);
        assert_eq!(e.next_table(), Some(table));
    }

    #[test]
    fn unmapped_keeps_permissions() {
        let e = PdEntry::unmapped(PageEntryBits::new_user_rw().with_frame(FrameNumber::new(9)));
        assert!(!e.is_present());
        assert_eq!(e.raw(), 0b110);
        assert_eq!(e.next_table(), None);
    }

    #[test]
    fn directory_index_base() {
        let i = DirectoryIndex::from(VirtualAddress::new(0x4012_3456));
        assert_eq!(i.as_usize(), 0x100);
        assert_eq!(i.base(), VirtualAddress::new(0x4000_0000));
        assert_eq!(DirectoryIndex::all().count(), 1024);
    }
}
