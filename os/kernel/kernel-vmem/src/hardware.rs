//! # Paging Hardware Capability
//!
//! Everything the paging code needs from the CPU, behind one trait:
//!
//! | Operation | x86 |
//! |-----------|-----|
//! | [`load_address_space`](PagingHardware::load_address_space) | write CR3 (flushes the TLB) |
//! | [`read_fault_info`](PagingHardware::read_fault_info) | read CR2 plus the pushed error code |
//! | [`set_translation_enabled`](PagingHardware::set_translation_enabled) | toggle CR0.PG |
//! | [`virt_to_mut`](PagingHardware::virt_to_mut) | dereference a virtual address |
//!
//! [`X86Paging`] is the real implementation (feature `asm`, 32-bit x86 only);
//! tests drive the fault handling logic against a software MMU.

use crate::fault::PageFault;
use kernel_memory_addresses::{PhysicalPage, VirtualAddress};

/// Capability interface to the paging unit.
pub trait PagingHardware {
    /// Make the page directory in `directory` the active translation root.
    ///
    /// # Safety
    /// The directory must be a valid page directory that maps the code and
    /// data currently in use (the shared window).
    unsafe fn load_address_space(&self, directory: PhysicalPage);

    /// Address and error code of the most recent page fault.
    fn read_fault_info(&self) -> PageFault;

    /// Turn address translation on or off.
    ///
    /// # Safety
    /// When enabling, a valid address space must already be loaded.
    unsafe fn set_translation_enabled(&self, enabled: bool);

    /// Access memory at virtual address `va` through the current translation.
    ///
    /// # Safety
    /// - `va` must be mapped (or be covered by an authorized fault path) and
    ///   valid for `T` for the lifetime `'a`.
    /// - The caller must not create aliasing mutable references.
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T;
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
pub use x86::X86Paging;

#[cfg(all(feature = "asm", target_arch = "x86"))]
mod x86 {
    use super::PagingHardware;
    use crate::fault::{PageFault, PageFaultError};
    use core::sync::atomic::{AtomicU32, Ordering};
    use kernel_memory_addresses::{PhysicalPage, VirtualAddress};
    use kernel_registers::cr0::Cr0;
    use kernel_registers::cr2::Cr2;
    use kernel_registers::cr3::Cr3;
    use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};

    /// Control-register backed [`PagingHardware`].
    ///
    /// The CPU pushes the page-fault error code onto the stack rather than
    /// into a register; the `#PF` entry stub hands it over with
    /// [`record_error_code`](Self::record_error_code) before dispatching.
    pub struct X86Paging {
        error_code: AtomicU32,
    }

    impl X86Paging {
        /// # Safety
        /// Must only be used at CPL 0 in 32-bit protected mode.
        #[must_use]
        pub const unsafe fn new() -> Self {
            Self {
                error_code: AtomicU32::new(0),
            }
        }

        /// Remember the error code of the fault currently being handled.
        pub fn record_error_code(&self, code: u32) {
            self.error_code.store(code, Ordering::Relaxed);
        }
    }

    impl PagingHardware for X86Paging {
        unsafe fn load_address_space(&self, directory: PhysicalPage) {
            let cr3 = Cr3::from_directory(directory, false, false);
            unsafe { cr3.store_unsafe() };
        }

        fn read_fault_info(&self) -> PageFault {
            // SAFETY: X86Paging only exists at CPL 0 (see `new`).
            let cr2 = unsafe { Cr2::load_unsafe() };
            PageFault::new(
                cr2.fault_address(),
                PageFaultError::from_bits(self.error_code.load(Ordering::Relaxed)),
            )
        }

        unsafe fn set_translation_enabled(&self, enabled: bool) {
            let cr0 = unsafe { Cr0::load_unsafe() }.with_pg_paging(enabled);
            unsafe { cr0.store_unsafe() };
        }

        unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T {
            let ptr = va.as_u32() as usize as *mut T;
            // SAFETY: Caller guarantees `va` is mapped and valid for `T`.
            unsafe { &mut *ptr }
        }
    }
}
