use bitfield_struct::bitfield;
use kernel_memory_addresses::{FrameNumber, PhysicalPage};

/// A single 32-bit i386 paging entry in its raw bitfield form.
///
/// Page directory entries (PDEs) and page table entries (PTEs) share the
/// same layout in 32-bit paging without PAE, so one type models both.
///
/// ### Bit layout
///
/// | Bits  | Name / Mnemonic | Meaning |
/// |-------|-----------------|---------|
/// | 0     | `P` (present)   | Valid entry if set |
/// | 1     | `RW`            | Writable if set |
/// | 2     | `US`            | User-mode accessible if set |
/// | 3     | `PWT`           | Write-through caching |
/// | 4     | `PCD`           | Disable caching |
/// | 5     | `A`             | Accessed |
/// | 6     | `D`             | Dirty (PTE only) |
/// | 7     | `PS` / `PAT`    | 4 MiB page in a PDE (unused here); PAT in a PTE |
/// | 8     | `G`             | Global (PTE only) |
/// | 9–11  | OS avail        | Reserved for OS use |
/// | 12–31 | `frame`         | Physical frame number |
///
/// ### Notes
/// - When `present` is clear the hardware ignores all other bits, but the
///   kernel keeps `writable` / `user_access` set on not-present entries so
///   the intended permissions survive until the entry is backed.
/// - Permissions are the intersection of the PDE and PTE along the walk.
///
/// ### Example
/// ```rust
/// # use kernel_vmem::PageEntryBits;
/// # use kernel_memory_addresses::FrameNumber;
/// let e = PageEntryBits::new_user_rw().with_frame(FrameNumber::new(0x400));
/// assert_eq!(e.into_bits(), 0x0040_0007);
/// assert!(e.present() && e.writable() && e.user_access());
/// ```
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    ///
    /// Clear means any access through this entry raises a not-present fault.
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    ///
    /// Set to allow user-mode (CPL 3) access.
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5).
    ///
    /// Set by the CPU on first access through this entry.
    pub accessed: bool,

    /// Dirty (D, bit 6), PTE only.
    ///
    /// Set by the CPU on first write to the page.
    pub dirty: bool,

    /// Page Size (PS, bit 7) in a PDE; PAT in a PTE.
    ///
    /// Always clear: only 4 KiB pages are mapped.
    pub large_page: bool,

    /// Global (G, bit 8), PTE only.
    pub global_translation: bool,

    /// OS-available (bits 9..=11).
    #[bits(3)]
    pub os_available: u8,

    /// Physical frame number (bits 12..=31).
    #[bits(20)]
    frame_bits: u32,
}

impl PageEntryBits {
    /// Store the frame number.
    #[inline]
    #[must_use]
    pub const fn with_frame(self, frame: FrameNumber) -> Self {
        self.with_frame_bits(frame.as_u32())
    }

    #[inline]
    #[must_use]
    pub const fn frame(&self) -> FrameNumber {
        FrameNumber::new(self.frame_bits())
    }

    #[inline]
    #[must_use]
    pub const fn physical_page(&self) -> PhysicalPage {
        PhysicalPage::from_frame(self.frame())
    }

    /// Present, writable, supervisor only (`0b011`).
    ///
    /// Used for the shared kernel window and the recursive slot.
    #[inline]
    #[must_use]
    pub const fn new_kernel_rw() -> Self {
        Self::new().with_present(true).with_writable(true)
    }

    /// Present, writable, user accessible (`0b111`).
    ///
    /// Used for demand-allocated tables and pages.
    #[inline]
    #[must_use]
    pub const fn new_user_rw() -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user_access(true)
    }

    /// Not present, writable, supervisor (`0b010`).
    ///
    /// Initial state of unused directory slots.
    #[inline]
    #[must_use]
    pub const fn unmapped_kernel_rw() -> Self {
        Self::new().with_writable(true)
    }

    /// Not present, writable, user accessible (`0b110`).
    ///
    /// Initial state of entries in a freshly allocated page table.
    #[inline]
    #[must_use]
    pub const fn unmapped_user_rw() -> Self {
        Self::new().with_writable(true).with_user_access(true)
    }
}
