//! # Virtual and Physical Memory Address Types (i386)
//!
//! Strongly typed wrappers for raw 32-bit memory addresses, page bases and
//! frame numbers used by the paging and frame allocation code.
//!
//! ## Overview
//!
//! The two-level i386 paging architecture translates a 32-bit virtual address
//! through a page directory and a page table down to a 4 KiB physical frame.
//! The types in this crate prevent mixing the different kinds of numbers that
//! show up along that walk, while staying zero-cost wrappers around `u32`:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`MemoryAddress`] | A raw 32-bit address, either physical or virtual. |
//! | [`VirtualAddress`] / [`VirtualPage`] | Addresses as seen through page translation. |
//! | [`PhysicalAddress`] / [`PhysicalPage`] | Addresses of RAM or MMIO. |
//! | [`FrameNumber`] | Absolute index of a 4 KiB physical frame (`address >> 12`). |
//!
//! Only one page size exists: [`PAGE_SIZE`] (4 KiB). There is no huge-page
//! support on purpose.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x0040_1234);
//! let page = va.page();
//! assert_eq!(page.base().as_u32(), 0x0040_1000);
//! assert_eq!(va.page_offset(), 0x234);
//!
//! let frame = FrameNumber::new(100);
//! assert_eq!(frame.base().as_u32(), 100 * PAGE_SIZE);
//! assert_eq!(PhysicalAddress::new(0x0006_4FFF).frame(), frame);
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` and implement `Copy`, `Eq`, `Ord`,
//!   and `Hash`.
//! - All alignment and index computations are `const fn`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod frame_number;
mod memory_address;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use frame_number::FrameNumber;
pub use memory_address::MemoryAddress;
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;

/// Size of a page (and of a physical frame) in bytes.
pub const PAGE_SIZE: u32 = 4096;

/// log2([`PAGE_SIZE`]), i.e. the number of in-page offset bits.
pub const PAGE_SHIFT: u32 = 12;

/// Mask selecting the in-page offset bits of an address.
pub const PAGE_OFFSET_MASK: u32 = PAGE_SIZE - 1;

/// Align `x` down to the nearest multiple of [`PAGE_SIZE`].
///
/// ```rust
/// # use kernel_memory_addresses::page_align_down;
/// assert_eq!(page_align_down(0), 0);
/// assert_eq!(page_align_down(4095), 0);
/// assert_eq!(page_align_down(4097), 4096);
/// ```
#[inline(always)]
#[must_use]
pub const fn page_align_down(x: u32) -> u32 {
    x & !PAGE_OFFSET_MASK
}

/// Align `x` up to the nearest multiple of [`PAGE_SIZE`].
///
/// Returns `None` if the aligned value does not fit into 32 bits.
///
/// ```rust
/// # use kernel_memory_addresses::page_align_up;
/// assert_eq!(page_align_up(0), Some(0));
/// assert_eq!(page_align_up(1), Some(4096));
/// assert_eq!(page_align_up(4096), Some(4096));
/// assert_eq!(page_align_up(u32::MAX), None);
/// ```
#[inline(always)]
#[must_use]
pub const fn page_align_up(x: u32) -> Option<u32> {
    match x.checked_add(PAGE_OFFSET_MASK) {
        Some(v) => Some(v & !PAGE_OFFSET_MASK),
        None => None,
    }
}

/// Number of whole pages needed to hold `bytes` bytes.
///
/// ```rust
/// # use kernel_memory_addresses::pages_for;
/// assert_eq!(pages_for(0), 0);
/// assert_eq!(pages_for(1), 1);
/// assert_eq!(pages_for(8192), 2);
/// assert_eq!(pages_for(8193), 3);
/// ```
#[inline(always)]
#[must_use]
pub const fn pages_for(bytes: u32) -> u32 {
    bytes.div_ceil(PAGE_SIZE)
}

/// Whether `x` is a multiple of [`PAGE_SIZE`].
#[inline(always)]
#[must_use]
pub const fn is_page_aligned(x: u32) -> bool {
    x & PAGE_OFFSET_MASK == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_virtual_address() {
        let va = VirtualAddress::new(0xFFC0_3ABC);
        assert_eq!(va.page().base().as_u32(), 0xFFC0_3000);
        assert_eq!(va.page_offset(), 0xABC);
        assert_eq!(va.page().base() + va.page_offset(), va);
    }

    #[test]
    fn frames_and_physical_pages_agree() {
        let pa = PhysicalAddress::new(0x0040_0042);
        let frame = pa.frame();
        assert_eq!(frame.as_u32(), 0x400);
        assert_eq!(frame.page(), pa.page());
        assert_eq!(PhysicalPage::from_frame(frame).frame(), frame);
        assert_eq!(frame.base().as_u32(), 0x0040_0000);
    }

    #[test]
    fn alignment_helpers() {
        assert_eq!(page_align_down(0x12345), 0x12000);
        assert_eq!(page_align_up(0x12345), Some(0x13000));
        assert_eq!(page_align_up(0xFFFF_F001), None);
        assert!(is_page_aligned(0x3000));
        assert!(!is_page_aligned(0x3001));
        assert_eq!(pages_for(PAGE_SIZE * 3 + 1), 4);
    }

    #[test]
    fn virtual_page_walks_forward() {
        let page = VirtualPage::containing_address(VirtualAddress::new(0x0040_0FFF));
        assert_eq!(page.base().as_u32(), 0x0040_0000);
        assert_eq!(page.next().map(VirtualPage::base), Some(VirtualAddress::new(0x0040_1000)));
        assert_eq!(
            VirtualPage::containing_address(VirtualAddress::new(0xFFFF_F000)).next(),
            None
        );
    }

    #[test]
    fn checked_arithmetic() {
        assert_eq!(
            VirtualAddress::new(0xFFFF_F000).checked_add(PAGE_SIZE),
            None
        );
        assert_eq!(
            FrameNumber::new(7).checked_add(3),
            Some(FrameNumber::new(10))
        );
    }
}
