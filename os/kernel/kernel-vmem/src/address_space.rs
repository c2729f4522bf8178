//! # Address Space (i386, page-directory rooted)
//!
//! A [`PageTableManager`] owns the paging structures of one address space
//! and resolves its page faults by demand paging.
//!
//! ## Layout of every address space
//!
//! ```text
//! 0x0000_0000 ┌──────────────────────────────┐
//!             │ shared window (identity,     │  directory slot 0, one table,
//!             │ present + writable, kernel)  │  allocated at construction
//! shared_size ├──────────────────────────────┤
//!             │ not mapped                   │  rest of slot 0, never backed
//! 0x0040_0000 ├──────────────────────────────┤
//!             │ VM pool windows              │  backed on first touch
//!             │ (not present until faulted)  │
//! 0xFFC0_0000 ├──────────────────────────────┤
//!             │ recursive self map           │  directory slot 1023
//! 0xFFFF_FFFF └──────────────────────────────┘
//! ```
//!
//! ## Frame ownership
//!
//! - The page directory, the shared table and every demand-allocated page
//!   table come from the **kernel pool**.
//! - Demand-allocated pages come from the **process pool**.
//!
//! ## Accessing the structures
//!
//! While the address space is loaded, tables are reached through the
//! [recursive mapping](crate::recursive). Otherwise they are reached through
//! the [`PhysMapper`], which works because the kernel pool lies inside the
//! identity-mapped shared window.

use crate::fault::{PageFault, PageFaultError};
use crate::hardware::PagingHardware;
use crate::page_table::pd::{DirectoryIndex, PageDirectory, PdEntry};
use crate::page_table::pt::{PageTable, PtEntry, TableIndex};
use crate::page_table::{DIRECTORY_ENTRY_SPAN, split_indices};
use crate::paging::{Paging, PagingError};
use crate::recursive::{RECURSIVE_REGION_BASE, RECURSIVE_SLOT, RecursiveMapping};
use crate::vm_pool::VmWindow;
use crate::PageEntryBits;
use alloc::vec::Vec;
use kernel_alloc::phys_mapper::PhysMapper;
use kernel_memory_addresses::{
    FrameNumber, PAGE_SIZE, PhysicalAddress, PhysicalPage, VirtualAddress,
};
use spin::Mutex;

/// Page directory, shared table and VM pool registry of one address space.
pub struct PageTableManager<'a, M: PhysMapper, H: PagingHardware> {
    paging: &'a Paging<'a, M, H>,
    directory: PhysicalPage,
    shared_table: PhysicalPage,
    vm_pools: Mutex<Vec<VmWindow>>,
}

impl<'a, M: PhysMapper, H: PagingHardware> PageTableManager<'a, M, H> {
    /// Build a new address space.
    ///
    /// ### Semantics
    /// - Allocates the directory and the shared table from the kernel pool.
    /// - The shared table identity maps `[0, shared_size)` present+writable;
    ///   the rest of slot 0 stays not present.
    /// - Every other slot starts not present (writable, supervisor).
    /// - Slot 1023 maps the directory onto itself.
    ///
    /// # Errors
    /// - [`PagingError::Frames`] if the kernel pool is exhausted.
    pub fn new(paging: &'a Paging<'a, M, H>) -> Result<Self, PagingError> {
        let frames = paging.frames();
        let kernel_pool = paging.config().kernel_pool;

        let directory = frames.get_frames(kernel_pool, 1)?.page();
        let shared_table = match frames.get_frames(kernel_pool, 1) {
            Ok(frame) => frame.page(),
            Err(e) => {
                if let Err(release) = frames.release_frames(directory.frame()) {
                    log::error!("Failed to release frame {}: {release}", directory.frame());
                }
                return Err(e.into());
            }
        };

        let shared_pages = paging.config().shared_size / PAGE_SIZE;
        // SAFETY: Both frames were just allocated from the kernel pool, which
        // the mapper can reach; nobody else references them.
        let table = unsafe { paging.mapper().phys_to_mut::<PageTable>(shared_table.base()) };
        for index in TableIndex::all() {
            let frame = index.as_u32();
            let entry = if frame < shared_pages {
                PtEntry::make_page(FrameNumber::new(frame).page(), PageEntryBits::new_kernel_rw())
            } else {
                PtEntry::unmapped(PageEntryBits::unmapped_kernel_rw())
            };
            table.set(index, entry);
        }

        let dir = unsafe { paging.mapper().phys_to_mut::<PageDirectory>(directory.base()) };
        dir.fill(PdEntry::unmapped(PageEntryBits::unmapped_kernel_rw()));
        dir.set(
            DirectoryIndex::new(0),
            PdEntry::make_table(shared_table, PageEntryBits::new_kernel_rw()),
        );
        dir.set(
            RECURSIVE_SLOT,
            PdEntry::make_table(directory, PageEntryBits::new_kernel_rw()),
        );

        log::info!(
            "Constructed address space: directory {}, shared table {}",
            directory,
            shared_table
        );

        Ok(Self {
            paging,
            directory,
            shared_table,
            vm_pools: Mutex::new(Vec::new()),
        })
    }

    /// Physical page holding the page directory.
    #[must_use]
    pub const fn directory(&self) -> PhysicalPage {
        self.directory
    }

    #[must_use]
    pub const fn paging(&self) -> &'a Paging<'a, M, H> {
        self.paging
    }

    /// Make this address space the active one.
    ///
    /// Writing the translation root flushes all cached translations.
    pub fn load(&self) {
        // SAFETY: The directory was built by `new` and identity maps the
        // shared window the kernel executes from.
        unsafe { self.paging.hardware().load_address_space(self.directory) };
        self.paging.set_current_directory(self.directory);
        log::info!("Loaded address space {}", self.directory);
    }

    /// Whether this address space is the active one.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.paging.current_directory() == Some(self.directory)
    }

    /// Register the window of a VM pool as legitimate fault territory.
    ///
    /// # Errors
    /// - [`PagingError::ReservedAddress`] if the window touches directory
    ///   slot 0 (the shared window's slot) or the recursive mapping.
    ///   Slot 0 is supervisor-only and its table is never torn down.
    /// - [`PagingError::OverlappingWindow`] if it overlaps a registered window.
    /// - [`PagingError::RegistryFull`] once the configured capacity is reached.
    pub fn register_pool(&self, window: VmWindow) -> Result<(), PagingError> {
        if window.base().as_u32() < DIRECTORY_ENTRY_SPAN
            || window.end() > u64::from(RECURSIVE_REGION_BASE.as_u32())
        {
            return Err(PagingError::ReservedAddress(window.base()));
        }

        let mut pools = self.vm_pools.lock();
        if pools.iter().any(|other| other.overlaps(&window)) {
            log::warn!("Rejected VM pool window at {}: overlap", window.base());
            return Err(PagingError::OverlappingWindow(window.base()));
        }

        let capacity = self.paging.config().vm_pool_capacity;
        if pools.len() >= capacity {
            log::warn!("Rejected VM pool window at {}: registry full", window.base());
            return Err(PagingError::RegistryFull { capacity });
        }

        pools.push(window);
        log::debug!(
            "Registered VM pool window {}..{:#x}",
            window.base(),
            window.end()
        );
        Ok(())
    }

    pub(crate) fn unregister_pool(&self, window: VmWindow) {
        self.vm_pools.lock().retain(|w| *w != window);
    }

    /// Number of registered VM pool windows.
    #[must_use]
    pub fn registered_pools(&self) -> usize {
        self.vm_pools.lock().len()
    }

    fn is_authorized(&self, address: VirtualAddress) -> bool {
        self.vm_pools
            .lock()
            .iter()
            .any(|window| window.is_legitimate(address))
    }

    /// Resolve the page fault at `address`.
    ///
    /// ### Semantics
    /// 1. Only not-present faults are handled; a protection violation is
    ///    reported as [`PagingError::ProtectionViolation`].
    /// 2. The address must lie in a registered VM pool window.
    /// 3. A missing page table is allocated from the kernel pool, its entries
    ///    initialized not-present/user/writable and the directory entry
    ///    installed present/user/writable.
    /// 4. The page itself is allocated from the process pool, mapped
    ///    present/user/writable and zero-filled.
    ///
    /// A fault on an entry that is already present is considered resolved.
    ///
    /// # Errors
    /// Every error is fatal for the faulting context; nothing is retried.
    pub fn handle_fault(&self, address: VirtualAddress, error_code: u32) -> Result<(), PagingError> {
        let error = PageFaultError::from_bits(error_code);
        if error.present() {
            log::error!("Page fault at {address}: {}", error.explain());
            return Err(PagingError::ProtectionViolation { address, error });
        }
        if !self.paging.is_enabled() {
            return Err(PagingError::PagingDisabled);
        }
        if !self.is_loaded() {
            return Err(PagingError::NotLoaded);
        }
        if !self.is_authorized(address) {
            log::warn!("Unauthorized page fault at {address}");
            return Err(PagingError::UnauthorizedFault(address));
        }

        let frames = self.paging.frames();
        let config = self.paging.config();
        let recursive = RecursiveMapping::new(self.paging.hardware());
        let (di, ti) = split_indices(address);

        // SAFETY: This address space is loaded and paging is enabled.
        let directory = unsafe { recursive.current_directory() };
        if !directory.get(di).is_present() {
            let table_frame = frames.get_frames(config.kernel_pool, 1)?;
            directory.set(
                di,
                PdEntry::make_table(table_frame.page(), PageEntryBits::new_user_rw()),
            );
            // SAFETY: The directory entry was just installed.
            let table = unsafe { recursive.current_table(di) };
            table.fill(PtEntry::unmapped(PageEntryBits::unmapped_user_rw()));
            log::debug!("Installed page table {} for {}", table_frame, di.base());
        }

        // SAFETY: The directory entry for `di` is present.
        let table = unsafe { recursive.current_table(di) };
        if table.get(ti).is_present() {
            log::debug!("Page fault at {address} already resolved");
            return Ok(());
        }

        let frame = frames.get_frames(config.process_pool, 1)?;
        table.set(ti, PtEntry::make_page(frame.page(), PageEntryBits::new_user_rw()));

        let page = address.page().base();
        // SAFETY: The page was just mapped and is exclusively owned.
        let bytes = unsafe {
            self.paging
                .hardware()
                .virt_to_mut::<[u8; PAGE_SIZE as usize]>(page)
        };
        bytes.fill(0);

        log::trace!("Mapped {page} to frame {frame}");
        Ok(())
    }

    /// Read the pending fault from the hardware and resolve it.
    ///
    /// # Errors
    /// See [`handle_fault`](Self::handle_fault).
    pub fn handle_current_fault(&self) -> Result<PageFault, PagingError> {
        let fault = self.paging.hardware().read_fault_info();
        self.handle_fault(fault.address, fault.error.into_bits())?;
        Ok(fault)
    }

    /// Unmap the page containing `address` and return its frame to its pool.
    ///
    /// Pages that were never touched are left alone. The caller reloads the
    /// address space (or invalidates the page) afterwards.
    ///
    /// # Errors
    /// - [`PagingError::ReservedAddress`] for directory slot 0 or the
    ///   recursive mapping.
    /// - [`PagingError::Frames`] if the mapped frame cannot be released.
    pub fn free_page(&self, address: VirtualAddress) -> Result<(), PagingError> {
        if address.as_u32() < DIRECTORY_ENTRY_SPAN || RecursiveMapping::<H>::covers(address)
        {
            return Err(PagingError::ReservedAddress(address));
        }

        let (di, ti) = split_indices(address);
        let Some(table) = self.table_mut(di) else {
            return Ok(());
        };
        let Some(page) = table.get(ti).page() else {
            return Ok(());
        };

        self.paging.frames().release_frames(page.frame())?;
        table.set(ti, PtEntry::unmapped(PageEntryBits::unmapped_user_rw()));
        log::trace!("Freed {} (frame {})", address.page().base(), page.frame());
        Ok(())
    }

    /// Translate `va` through this address space, loaded or not.
    #[must_use]
    pub fn query(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let (di, ti) = split_indices(va);
        let mapper = self.paging.mapper();
        // SAFETY: Directory and tables live in the identity-mapped kernel pool.
        let directory = unsafe { mapper.phys_to_mut::<PageDirectory>(self.directory.base()) };
        let table_page = directory.get(di).next_table()?;
        let table = unsafe { mapper.phys_to_mut::<PageTable>(table_page.base()) };
        let page = table.get(ti).page()?;
        Some(page.base() + va.page_offset())
    }

    /// The page table behind slot `di`, if present.
    fn table_mut(&self, di: DirectoryIndex) -> Option<&'a mut PageTable> {
        if self.is_loaded() && self.paging.is_enabled() {
            let recursive = RecursiveMapping::new(self.paging.hardware());
            // SAFETY: This address space is loaded and paging is enabled.
            let directory = unsafe { recursive.current_directory() };
            if !directory.get(di).is_present() {
                return None;
            }
            // SAFETY: The entry is present.
            return Some(unsafe { recursive.current_table(di) });
        }

        let mapper = self.paging.mapper();
        // SAFETY: Directory and tables live in the identity-mapped kernel pool.
        let directory = unsafe { mapper.phys_to_mut::<PageDirectory>(self.directory.base()) };
        let table_page = directory.get(di).next_table()?;
        Some(unsafe { mapper.phys_to_mut::<PageTable>(table_page.base()) })
    }

    fn release_or_log(&self, frame: FrameNumber) {
        if let Err(e) = self.paging.frames().release_frames(frame) {
            log::error!("Failed to release frame {frame}: {e}");
        }
    }
}

impl<M: PhysMapper, H: PagingHardware> Drop for PageTableManager<'_, M, H> {
    fn drop(&mut self) {
        if self.is_loaded() {
            log::error!(
                "Dropping the loaded address space {}; leaking its frames",
                self.directory
            );
            return;
        }

        let mapper = self.paging.mapper();
        // SAFETY: Directory and tables live in the identity-mapped kernel pool,
        // and the address space is not in use.
        let directory = unsafe { mapper.phys_to_mut::<PageDirectory>(self.directory.base()) };
        for di in DirectoryIndex::all().filter(|&di| di != RECURSIVE_SLOT) {
            let Some(table_page) = directory.get(di).next_table() else {
                continue;
            };
            if table_page == self.shared_table {
                continue;
            }
            let table = unsafe { mapper.phys_to_mut::<PageTable>(table_page.base()) };
            for (_, page) in table.present_pages() {
                self.release_or_log(page.frame());
            }
            self.release_or_log(table_page.frame());
        }

        self.release_or_log(self.shared_table.frame());
        self.release_or_log(self.directory.frame());
        log::info!("Destroyed address space {}", self.directory);
    }
}
