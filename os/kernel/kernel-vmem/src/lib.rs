//! # Virtual Memory Support
//!
//! Demand-paged virtual memory for a 32-bit x86 teaching kernel.
//!
//! ## What you get
//! - [`init_paging`] and [`Paging`]: the process-wide paging configuration.
//! - [`PageTableManager`]: one address space, its page fault handler and
//!   the registry of [`VmPool`] windows that are legitimate fault territory.
//! - [`VmPool`]: a per-process allocator of virtual regions that are backed
//!   lazily, page by page, on first touch.
//! - [`PageEntryBits`]: the 32-bit entry layout shared by directories and tables.
//! - [`PagingHardware`]: the seam between this crate and CR0/CR2/CR3.
//!
//! ## i386 Virtual Address → Physical Address Walk
//!
//! Each 32-bit virtual address is divided into three fields:
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  PD   |  PT   | Offset |
//! ```
//!
//! ```text
//!  CR3 → PD → PT → Physical Page
//!         │    │
//!         │    └───► PTE (Page Table Entry)     → maps a 4 KiB page
//!         └────────► PDE (Page Directory Entry) → points to a page table
//! ```
//!
//! | Level | Table | Entry | Description |
//! |:------|:------|:------|:------------|
//! | 1 | **PD** (Page Directory) | **PDE** | 1024 entries, each covering 4 MiB. Referenced by CR3. |
//! | 2 | **PT** (Page Table) | **PTE** | 1024 entries, each mapping one 4 KiB page. |
//!
//! The last directory slot points back at the directory itself, see
//! [`recursive`].
//!
//! ## Demand paging
//!
//! ```text
//! VmPool::allocate ─► address range reserved, nothing mapped
//!        │
//!   first touch ─► #PF ─► PageTableManager::handle_fault
//!                            ├─ not present?  else ProtectionViolation
//!                            ├─ inside a registered window?  else UnauthorizedFault
//!                            ├─ page table missing ─► kernel pool frame
//!                            └─ page missing ─► process pool frame, zero-filled
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

extern crate alloc;

pub mod address_space;
pub mod fault;
pub mod hardware;
pub mod page_entry_bits;
pub mod page_table;
pub mod paging;
pub mod recursive;
pub mod vm_pool;

#[cfg(test)]
mod test_machine;

pub use crate::address_space::PageTableManager;
pub use crate::fault::{PageFault, PageFaultError};
#[cfg(all(feature = "asm", target_arch = "x86"))]
pub use crate::hardware::X86Paging;
pub use crate::hardware::PagingHardware;
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::paging::{Paging, PagingConfig, PagingError, init_paging};
pub use crate::vm_pool::{MAX_REGIONS, VmPool, VmPoolError, VmRegion, VmWindow};

/// Re-export constants as info module.
pub use kernel_info::memory as info;
