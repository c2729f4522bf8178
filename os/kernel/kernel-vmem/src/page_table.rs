//! # i386 Paging Structures
//!
//! A 32-bit virtual address is split into three fields:
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | Directory | Table | Offset |
//! ```
//!
//! - [`pd::PageDirectory`]: 1024 PDEs, each covering 4 MiB; one per address space.
//! - [`pt::PageTable`]: 1024 PTEs, each mapping one 4 KiB page.

pub mod pd;
pub mod pt;

use crate::page_table::pd::DirectoryIndex;
use crate::page_table::pt::TableIndex;
use kernel_memory_addresses::VirtualAddress;

/// Number of entries in a page directory or page table.
pub const ENTRIES: usize = 1024;

/// Bytes of virtual memory covered by one directory entry (4 MiB).
pub const DIRECTORY_ENTRY_SPAN: u32 = 1 << 22;

/// Decompose `va` into its directory and table index.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (DirectoryIndex, TableIndex) {
    (DirectoryIndex::from(va), TableIndex::from(va))
}
