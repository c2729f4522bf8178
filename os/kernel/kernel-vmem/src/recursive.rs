//! # Recursive Page Directory Mapping
//!
//! The last directory slot of every address space points at the directory
//! itself. The MMU then treats the directory as a page table for the top
//! 4 MiB of the virtual address space, which exposes the live paging
//! structures at fixed addresses:
//!
//! ```text
//! 0xFFC0_0000 + i * 4 KiB   page table behind directory slot i
//! 0xFFFF_F000               the page directory itself (i = 1023)
//! ```
//!
//! [`RecursiveMapping`] turns these aliases into typed references. It only
//! describes the address space that is *currently loaded*.

use crate::hardware::PagingHardware;
use crate::page_table::pd::{DirectoryIndex, PageDirectory};
use crate::page_table::pt::PageTable;
use kernel_memory_addresses::VirtualAddress;

/// Directory slot holding the self reference.
pub const RECURSIVE_SLOT: DirectoryIndex = DirectoryIndex::new(1023);

/// First virtual address of the 4 MiB window occupied by the self map.
pub const RECURSIVE_REGION_BASE: VirtualAddress = VirtualAddress::new(0xFFC0_0000);

/// Accessor for the paging structures of the loaded address space.
pub struct RecursiveMapping<'h, H: PagingHardware> {
    hardware: &'h H,
}

impl<'h, H: PagingHardware> RecursiveMapping<'h, H> {
    #[must_use]
    pub const fn new(hardware: &'h H) -> Self {
        Self { hardware }
    }

    /// Virtual alias of the current page directory (`0xFFFF_F000`).
    #[must_use]
    pub const fn directory_alias() -> VirtualAddress {
        Self::table_alias(RECURSIVE_SLOT)
    }

    /// Virtual alias of the page table behind directory slot `index`.
    #[must_use]
    pub const fn table_alias(index: DirectoryIndex) -> VirtualAddress {
        VirtualAddress::new(RECURSIVE_REGION_BASE.as_u32() | (index.as_u32() << 12))
    }

    /// Whether `va` lies in the self-map window.
    #[must_use]
    pub const fn covers(va: VirtualAddress) -> bool {
        va.as_u32() >= RECURSIVE_REGION_BASE.as_u32()
    }

    /// The directory of the currently loaded address space.
    ///
    /// # Safety
    /// - Paging must be enabled with an address space built by this crate loaded.
    /// - The caller must not hold another mutable reference to the directory.
    #[must_use]
    pub unsafe fn current_directory(&self) -> &'h mut PageDirectory {
        unsafe { self.hardware.virt_to_mut(Self::directory_alias()) }
    }

    /// The page table behind directory slot `index` of the loaded address space.
    ///
    /// # Safety
    /// Same as [`current_directory`](Self::current_directory); additionally
    /// the directory entry at `index` must be present.
    #[must_use]
    pub unsafe fn current_table(&self, index: DirectoryIndex) -> &'h mut PageTable {
        unsafe { self.hardware.virt_to_mut(Self::table_alias(index)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_machine::TestMachine;

    #[test]
    fn aliases() {
        type Map<'a> = RecursiveMapping<'a, TestMachine>;
        assert_eq!(Map::directory_alias(), VirtualAddress::new(0xFFFF_F000));
        assert_eq!(
            Map::table_alias(DirectoryIndex::new(0)),
            VirtualAddress::new(0xFFC0_0000)
        );
        assert_eq!(
            Map::table_alias(DirectoryIndex::new(0x100)),
            VirtualAddress::new(0xFFD0_0000)
        );
        assert!(Map::covers(VirtualAddress::new(0xFFC0_0000)));
        assert!(!Map::covers(VirtualAddress::new(0xFFBF_FFFF)));
    }
}
