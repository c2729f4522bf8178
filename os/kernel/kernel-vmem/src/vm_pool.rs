//! # Virtual Memory Pools
//!
//! A [`VmPool`] reserves a window of virtual addresses inside one address
//! space and hands out page-rounded regions from it. Regions are *not*
//! backed when allocated: the window is registered with the
//! [`PageTableManager`], whose fault handler backs pages on first touch.
//!
//! ```text
//! base            base + 4 KiB                                 base + size
//!  ┌──────────────┬──────────┬─────────┬──────────┬────────────────┐
//!  │ region table │ region 0 │ region 1│ region 2 │   unallocated  │
//!  └──────────────┴──────────┴─────────┴──────────┴────────────────┘
//!                                                 ▲ next_start (bump)
//! ```
//!
//! - The first page of the window holds up to [`MAX_REGIONS`] descriptors.
//! - Allocation is a bump pointer; released ranges are not reused.
//! - Release requires the exact start address of a region.

use crate::address_space::PageTableManager;
use crate::hardware::PagingHardware;
use crate::paging::PagingError;
use kernel_alloc::PoolId;
use kernel_alloc::phys_mapper::PhysMapper;
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress, is_page_aligned, page_align_up};

/// Number of region descriptors that fit into the descriptor page.
pub const MAX_REGIONS: usize = PAGE_SIZE as usize / size_of::<VmRegion>();

/// Errors raised by [`VmPool`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmPoolError {
    #[error("cannot allocate {requested} bytes, {free} bytes free")]
    Exhausted { requested: u32, free: u32 },
    #[error("requested an empty region")]
    EmptyRequest,
    #[error("invalid VM pool window {base} with size {size:#x}")]
    InvalidWindow { base: VirtualAddress, size: u32 },
    #[error("no region starts at {0}")]
    UnknownRegion(VirtualAddress),
    #[error("region table is full ({MAX_REGIONS} regions)")]
    RegionTableFull,
    #[error("frame pool {0} is not registered")]
    UnknownFramePool(usize),
    #[error(transparent)]
    Paging(#[from] PagingError),
}

/// A reserved window of virtual addresses.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VmWindow {
    base: VirtualAddress,
    size: u32,
}

impl VmWindow {
    #[must_use]
    pub const fn new(base: VirtualAddress, size: u32) -> Self {
        Self { base, size }
    }

    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Exclusive end address; may be `2^32`.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base.as_u32() as u64 + self.size as u64
    }

    /// Whether `address` lies in `[base, base + size)`.
    #[must_use]
    pub const fn is_legitimate(&self, address: VirtualAddress) -> bool {
        let a = address.as_u32() as u64;
        a >= self.base.as_u32() as u64 && a < self.end()
    }

    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        (self.base.as_u32() as u64) < other.end() && (other.base.as_u32() as u64) < self.end()
    }
}

/// Descriptor of one allocated region, as stored in the descriptor page.
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VmRegion {
    start: VirtualAddress,
    size: u32,
}

impl VmRegion {
    #[must_use]
    pub const fn start(&self) -> VirtualAddress {
        self.start
    }

    /// Size in bytes, a multiple of the page size.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Base addresses of all pages of this region.
    pub fn pages(&self) -> impl Iterator<Item = VirtualAddress> + use<> {
        let start = self.start;
        (0..self.size / PAGE_SIZE).map(move |i| start + i * PAGE_SIZE)
    }
}

#[repr(C, align(4096))]
struct RegionTable {
    regions: [VmRegion; MAX_REGIONS],
}

/// Per-process allocator of virtual address regions.
pub struct VmPool<'a, M: PhysMapper, H: PagingHardware> {
    page_table: &'a PageTableManager<'a, M, H>,
    frame_pool: PoolId,
    window: VmWindow,
    free_bytes: u32,
    region_count: usize,
    next_start: VirtualAddress,
}

impl<'a, M: PhysMapper, H: PagingHardware> VmPool<'a, M, H> {
    /// Reserve the window `[base, base + size)` and register it with `page_table`.
    ///
    /// The address space must be loaded: the first page of the window is
    /// faulted in right away to hold the region descriptors.
    ///
    /// # Errors
    /// - [`VmPoolError::InvalidWindow`] unless base and size are page aligned,
    ///   the window holds more than the descriptor page and fits 32 bits.
    /// - [`VmPoolError::UnknownFramePool`] if `frame_pool` is not registered.
    /// - [`VmPoolError::Paging`] if the address space is not loaded or the
    ///   window cannot be registered or backed.
    pub fn new(
        page_table: &'a PageTableManager<'a, M, H>,
        base: VirtualAddress,
        size: u32,
        frame_pool: PoolId,
    ) -> Result<Self, VmPoolError> {
        let window = VmWindow::new(base, size);
        if !base.is_page_aligned()
            || !is_page_aligned(size)
            || size <= PAGE_SIZE
            || window.end() > 1 << 32
        {
            return Err(VmPoolError::InvalidWindow { base, size });
        }
        if !page_table.paging().frames().is_registered(frame_pool) {
            return Err(VmPoolError::UnknownFramePool(frame_pool.index()));
        }
        if !page_table.is_loaded() {
            return Err(PagingError::NotLoaded.into());
        }

        page_table.register_pool(window)?;
        if let Err(e) = page_table.handle_fault(base, 0) {
            page_table.unregister_pool(window);
            return Err(e.into());
        }

        log::info!("Created VM pool {}..{:#x}", base, window.end());
        Ok(Self {
            page_table,
            frame_pool,
            window,
            free_bytes: size,
            region_count: 0,
            next_start: base + PAGE_SIZE,
        })
    }

    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.window.base()
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.window.size()
    }

    #[must_use]
    pub const fn window(&self) -> VmWindow {
        self.window
    }

    #[must_use]
    pub const fn free_bytes(&self) -> u32 {
        self.free_bytes
    }

    #[must_use]
    pub const fn frame_pool(&self) -> PoolId {
        self.frame_pool
    }

    /// Whether `address` lies inside this pool's window.
    ///
    /// This does not check whether a live region covers `address`.
    #[must_use]
    pub const fn is_legitimate(&self, address: VirtualAddress) -> bool {
        self.window.is_legitimate(address)
    }

    fn region_table(&self) -> Result<&'a mut RegionTable, VmPoolError> {
        if !self.page_table.is_loaded() {
            return Err(PagingError::NotLoaded.into());
        }
        // SAFETY: The descriptor page was faulted in by `new` and is only
        // accessed through this pool while the address space is loaded.
        Ok(unsafe {
            self.page_table
                .paging()
                .hardware()
                .virt_to_mut::<RegionTable>(self.window.base())
        })
    }

    /// The live regions in allocation order.
    ///
    /// # Errors
    /// - [`VmPoolError::Paging`] if the address space is not loaded.
    pub fn regions(&self) -> Result<&[VmRegion], VmPoolError> {
        let table = self.region_table()?;
        Ok(&table.regions[..self.region_count])
    }

    /// Reserve `byte_size` bytes (rounded up to whole pages).
    ///
    /// No physical memory is touched; pages are backed on first access.
    ///
    /// # Errors
    /// - [`VmPoolError::EmptyRequest`] for a zero-sized request.
    /// - [`VmPoolError::Exhausted`] if `byte_size` is not smaller than the
    ///   free byte count, or the rounded size does not fit the window.
    /// - [`VmPoolError::RegionTableFull`] if all descriptors are in use.
    pub fn allocate(&mut self, byte_size: u32) -> Result<VirtualAddress, VmPoolError> {
        if byte_size == 0 {
            return Err(VmPoolError::EmptyRequest);
        }
        let exhausted = VmPoolError::Exhausted {
            requested: byte_size,
            free: self.free_bytes,
        };
        if byte_size >= self.free_bytes {
            return Err(exhausted);
        }
        let size = page_align_up(byte_size).ok_or(exhausted)?;
        let start = self.next_start;
        if size > self.free_bytes || u64::from(start.as_u32()) + u64::from(size) > self.window.end()
        {
            return Err(exhausted);
        }

        let table = self.region_table()?;
        if self.region_count == MAX_REGIONS {
            log::warn!("VM pool {}: region table full", self.base());
            return Err(VmPoolError::RegionTableFull);
        }

        table.regions[self.region_count] = VmRegion { start, size };
        self.region_count += 1;
        self.next_start = start + size;
        self.free_bytes -= size;

        log::debug!("VM pool {}: allocated {size:#x} bytes at {start}", self.base());
        Ok(start)
    }

    /// Release the region starting exactly at `start`.
    ///
    /// Every backed page of the region is unmapped and returned to its frame
    /// pool, the translation is reloaded and the free byte count restored.
    ///
    /// # Errors
    /// - [`VmPoolError::UnknownRegion`] if no region starts at `start`.
    /// - [`VmPoolError::Paging`] if the address space is not loaded or a
    ///   page cannot be freed.
    pub fn release(&mut self, start: VirtualAddress) -> Result<(), VmPoolError> {
        let table = self.region_table()?;
        let count = self.region_count;
        let Some(index) = table.regions[..count]
            .iter()
            .position(|region| region.start == start)
        else {
            return Err(VmPoolError::UnknownRegion(start));
        };

        let region = table.regions[index];
        for page in region.pages() {
            self.page_table.free_page(page)?;
        }

        table.regions.copy_within(index + 1..count, index);
        self.region_count -= 1;
        self.page_table.load();
        self.free_bytes += region.size;

        log::debug!(
            "VM pool {}: released {:#x} bytes at {start}",
            self.base(),
            region.size
        );
        Ok(())
    }
}

impl<M: PhysMapper, H: PagingHardware> Drop for VmPool<'_, M, H> {
    fn drop(&mut self) {
        // Faults back any page of the window, not only those below `next_start`.
        let base = self.window.base();
        for offset in (0..self.window.size()).step_by(PAGE_SIZE as usize) {
            let page = base + offset;
            if let Err(e) = self.page_table.free_page(page) {
                log::error!("VM pool {base}: failed to free {page}: {e}");
            }
        }
        self.page_table.unregister_pool(self.window);
        if self.page_table.is_loaded() {
            self.page_table.load();
        }
        log::info!("Destroyed VM pool {}", self.base());
    }
}
