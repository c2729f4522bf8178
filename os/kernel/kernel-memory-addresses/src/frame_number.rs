use crate::{PAGE_SHIFT, PhysicalAddress, PhysicalPage};
use core::fmt;
use core::ops::Add;

/// Absolute number of a 4 KiB physical frame.
///
/// Frame `n` covers the physical bytes `[n * 4096, (n + 1) * 4096)`. Frame
/// pools hand out and take back frame numbers; page-table entries store the
/// corresponding [`PhysicalPage`].
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FrameNumber(u32);

impl FrameNumber {
    #[inline]
    #[must_use]
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// The frame containing the physical address `pa`.
    #[inline]
    #[must_use]
    pub const fn containing(pa: PhysicalAddress) -> Self {
        Self(pa.as_u32() >> PAGE_SHIFT)
    }

    /// Physical address of the first byte of this frame.
    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 << PAGE_SHIFT)
    }

    #[inline]
    #[must_use]
    pub const fn page(self) -> PhysicalPage {
        PhysicalPage::from_frame(self)
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, n: u32) -> Option<Self> {
        match self.0.checked_add(n) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", self.0)
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u32> for FrameNumber {
    #[inline]
    fn from(n: u32) -> Self {
        Self::new(n)
    }
}

impl From<PhysicalPage> for FrameNumber {
    #[inline]
    fn from(page: PhysicalPage) -> Self {
        page.frame()
    }
}

impl Add<u32> for FrameNumber {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}
