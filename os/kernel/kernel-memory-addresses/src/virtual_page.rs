use crate::{MemoryAddress, PAGE_SIZE, VirtualAddress};
use core::fmt;

/// Virtual memory page base.
///
/// ### Invariants
/// - The low 12 bits of the base are always zero (page aligned).
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let vp = VirtualPage::containing_address(VirtualAddress::new(0x0040_1234));
/// assert_eq!(vp.base().as_u32(), 0x0040_1000);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage(MemoryAddress);

impl VirtualPage {
    /// Page that contains `addr` (aligns down to page boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: VirtualAddress) -> Self {
        Self(addr.0.align_down())
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress(self.0)
    }

    /// The page directly following this one, if it is still addressable.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(PAGE_SIZE) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Display for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage(0x{:08X})", self.0.as_u32())
    }
}

impl TryFrom<VirtualAddress> for VirtualPage {
    type Error = VirtualAddress;

    /// Succeeds only for page-aligned addresses; hands the address back otherwise.
    #[inline]
    fn try_from(va: VirtualAddress) -> Result<Self, VirtualAddress> {
        if va.is_page_aligned() {
            Ok(va.page())
        } else {
            Err(va)
        }
    }
}
