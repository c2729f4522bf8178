use crate::{FrameNumber, MemoryAddress, PAGE_SHIFT, PhysicalAddress};
use core::fmt;

/// Physical page base.
///
/// A `PhysicalPage` is the **frame-aligned** base address of a 4 KiB
/// physical frame. It is interchangeable with a [`FrameNumber`]; the page
/// form is what gets written into page-table entries, the number form is what
/// the frame pools hand out.
///
/// ### Invariants
/// - The low 12 bits of the base are always zero.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage(MemoryAddress);

impl PhysicalPage {
    /// The page containing `p` (aligns down).
    #[inline]
    #[must_use]
    pub const fn from_addr(p: PhysicalAddress) -> Self {
        Self(p.0.align_down())
    }

    #[inline]
    #[must_use]
    pub const fn from_frame(frame: FrameNumber) -> Self {
        Self(MemoryAddress::new(frame.as_u32() << PAGE_SHIFT))
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress(self.0)
    }

    #[inline]
    #[must_use]
    pub const fn frame(self) -> FrameNumber {
        FrameNumber::new(self.0.as_u32() >> PAGE_SHIFT)
    }
}

impl fmt::Display for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage(0x{:08X})", self.0.as_u32())
    }
}

impl From<FrameNumber> for PhysicalPage {
    #[inline]
    fn from(frame: FrameNumber) -> Self {
        Self::from_frame(frame)
    }
}
