use core::fmt;
use core::ops::{Add, AddAssign};

/// Principal raw memory address ([virtual](super::VirtualAddress) or [physical](super::PhysicalAddress)).
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MemoryAddress(u32);

impl MemoryAddress {
    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// The in-page offset (low 12 bits).
    #[inline]
    #[must_use]
    pub const fn page_offset(self) -> u32 {
        self.0 & crate::PAGE_OFFSET_MASK
    }

    /// Align down to the page boundary.
    #[inline]
    #[must_use]
    pub const fn align_down(self) -> Self {
        Self(crate::page_align_down(self.0))
    }

    /// Add `rhs` bytes, returning `None` on 32-bit overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u32) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryAddress(0x{:08X})", self.0)
    }
}

impl fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u32> for MemoryAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl From<MemoryAddress> for u32 {
    #[inline]
    fn from(a: MemoryAddress) -> Self {
        a.as_u32()
    }
}

impl Add<u32> for MemoryAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u32> for MemoryAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}
