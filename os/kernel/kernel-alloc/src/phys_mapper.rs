//! # Physical Memory Access
//!
//! Code that manipulates page directories, page tables or frame pool
//! bookkeeping needs to "touch" physical memory, but can only dereference
//! addresses of the current address space. A [`PhysMapper`] abstracts how
//! that happens:
//!
//! - On the teaching machine the low physical memory is identity mapped
//!   (the shared window), so [`IdentityPhysMapper`] simply reinterprets the
//!   physical address as a pointer.
//! - Tests supply a mapper over a simulated RAM buffer.
//!
//! ## Example
//! ```rust,no_run
//! use kernel_alloc::phys_mapper::{IdentityPhysMapper, PhysMapper};
//! use kernel_memory_addresses::FrameNumber;
//!
//! let mapper = IdentityPhysMapper;
//! let bytes = unsafe { mapper.frame_bytes_mut(FrameNumber::new(512), 1) };
//! bytes.fill(0);
//! ```

use kernel_memory_addresses::{FrameNumber, PAGE_SIZE, PhysicalAddress};

/// Converts physical addresses into references usable by the running code.
pub trait PhysMapper {
    /// Convert a *physical* address to a usable mutable reference in the
    /// current address space.
    ///
    /// # Safety
    /// - `pa` must be mapped (identity or otherwise) for the lifetime `'a`.
    /// - The memory at `pa` must be valid for `T` and suitably aligned.
    /// - The caller must not create aliasing mutable references.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;

    /// View `frames` consecutive physical frames starting at `first` as bytes.
    ///
    /// # Safety
    /// Same requirements as [`phys_to_mut`](Self::phys_to_mut), for the whole
    /// byte range. The default implementation additionally requires the
    /// frames to be contiguous in the mapper's view.
    unsafe fn frame_bytes_mut<'a>(&self, first: FrameNumber, frames: u32) -> &'a mut [u8] {
        let len = frames as usize * PAGE_SIZE as usize;
        let head: &'a mut u8 = unsafe { self.phys_to_mut::<u8>(first.base()) };
        unsafe { core::slice::from_raw_parts_mut(core::ptr::from_mut(head), len) }
    }
}

/// [`PhysMapper`] for identity-mapped physical memory.
///
/// # Safety
/// - Only valid for physical addresses inside the shared window, which is
///   identity mapped into every address space, or before paging is enabled.
pub struct IdentityPhysMapper;

impl PhysMapper for IdentityPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let ptr = pa.as_u32() as usize as *mut T;
        // SAFETY: Caller must ensure the physical address is identity mapped.
        unsafe { &mut *ptr }
    }
}
