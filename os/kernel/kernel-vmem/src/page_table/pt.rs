//! # i386 Page Table
//!
//! - [`TableIndex`]: index type for VA bits `[21:12]`.
//! - [`PtEntry`]: a PTE; when present it maps exactly one 4 KiB page.
//! - [`PageTable`]: a 4 KiB-aligned array of 1024 PTEs.

use crate::PageEntryBits;
use crate::page_table::ENTRIES;
use kernel_memory_addresses::{FrameNumber, PhysicalPage, VirtualAddress};

/// Index into a page table (derived from VA bits `[21:12]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

/// A single page table entry (PTE).
#[doc(alias = "PTE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PtEntry(PageEntryBits);

/// A page table: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PT")]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PtEntry; ENTRIES],
}

impl TableIndex {
    /// Extract bits `[21:12]` of `va`.
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new(((va.as_u32() >> 12) & 0x3FF) as u16)
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

    /// All table indices in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..1024u16).map(Self)
    }
}

impl PtEntry {
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

    /// Map `page`; forces `present=1` and clears PAT.
    #[inline]
    #[must_use]
    pub const fn make_page(page: PhysicalPage, flags: PageEntryBits) -> Self {
        Self(
            flags
                .with_present(true)
                .with_large_page(false)
                .with_frame(page.frame()),
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

    /// If present, the mapped physical page.
    #[inline]
    #[must_use]
    pub const fn page(self) -> Option<PhysicalPage> {
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

impl PageTable {
    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PtEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`.
    ///
    /// Caller must handle any required TLB invalidation when changing active mappings.
    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PtEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Overwrite every entry with `e`.
    #[inline]
    pub fn fill(&mut self, e: PtEntry) {
        self.entries.fill(e);
    }

    /// Iterate over the present entries with their indices.
    pub fn present_pages(&self) -> impl Iterator<Item = (TableIndex, PhysicalPage)> + '_ {
        TableIndex::all().filter_map(|i| self.get(i).page().map(|page| (i, page)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_mapping() {
        let page = FrameNumber::new(0x1234).page();
        let e = PtEntry::make_page(page, PageEntryBits::new_user_rw());
        assert_eq!(e.raw(), 0x0123_4007);
        assert_eq!(e.page(), Some(page));
        assert!(e.flags().user_access());
    }

    #[test]
    fn table_index() {
        assert_eq!(TableIndex::from(VirtualAddress::new(0x0040_3ABC)).as_usize(), 3);
        assert_eq!(TableIndex::from(VirtualAddress::new(0xFFFF_F000)).as_usize(), 1023);
    }
}
