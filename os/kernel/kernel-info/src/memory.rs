//! # Memory Layout

use kernel_memory_addresses::{FrameNumber, PAGE_SIZE};

/// Frames per MiB of physical memory.
const FRAMES_PER_MIB: u32 = (1024 * 1024) / PAGE_SIZE;

/// Largest shared window a single page table can cover (1024 pages).
pub const MAX_SHARED_WINDOW: u32 = 1024 * PAGE_SIZE;

/// A contiguous range of physical frames.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameRange {
    /// First frame of the range.
    pub start: FrameNumber,
    /// Number of frames in the range.
    pub count: u32,
}

impl FrameRange {
    #[must_use]
    pub const fn new(start: FrameNumber, count: u32) -> Self {
        Self { start, count }
    }

    /// Exclusive end frame number.
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.start.as_u32() + self.count
    }

    /// Whether `other` lies completely inside this range.
    #[must_use]
    pub const fn covers(&self, other: &Self) -> bool {
        other.start.as_u32() >= self.start.as_u32() && other.end() <= self.end()
    }

    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start.as_u32() < other.end() && other.start.as_u32() < self.end()
    }
}

/// Physical memory layout handed to the boot-time pool construction.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryLayout {
    /// Frames backing page directories, page tables and pool bookkeeping.
    pub kernel_pool: FrameRange,
    /// Frames backing demand-paged process memory.
    pub process_pool: FrameRange,
    /// A range inside the process pool that must never be handed out.
    pub memory_hole: Option<FrameRange>,
    /// Bytes at the bottom of every address space that are identity mapped.
    pub shared_size: u32,
}

impl MemoryLayout {
    /// Checks the structural rules every layout must obey:
    ///
    /// - both pools are non-empty and do not overlap,
    /// - the memory hole (if any) lies inside the process pool,
    /// - the shared window is page aligned, non-empty, fits one page table,
    /// - the shared window covers the whole kernel pool, so page tables
    ///   allocated from it are reachable in every address space.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        if self.kernel_pool.count == 0 || self.process_pool.count == 0 {
            return false;
        }
        if self.kernel_pool.overlaps(&self.process_pool) {
            return false;
        }
        if let Some(hole) = &self.memory_hole
            && !self.process_pool.covers(hole)
        {
            return false;
        }
        if self.shared_size == 0
            || !self.shared_size.is_multiple_of(PAGE_SIZE)
            || self.shared_size > MAX_SHARED_WINDOW
        {
            return false;
        }
        self.kernel_pool.end() <= self.shared_size / PAGE_SIZE
    }
}

/// The classic 32 MiB machine: kernel pool 2–4 MiB, process pool 4–32 MiB
/// with a 1 MiB hole at 15 MiB, and a 4 MiB shared window.
pub const STANDARD_LAYOUT: MemoryLayout = MemoryLayout {
    kernel_pool: FrameRange::new(FrameNumber::new(2 * FRAMES_PER_MIB), 2 * FRAMES_PER_MIB),
    process_pool: FrameRange::new(FrameNumber::new(4 * FRAMES_PER_MIB), 28 * FRAMES_PER_MIB),
    memory_hole: Some(FrameRange::new(
        FrameNumber::new(15 * FRAMES_PER_MIB),
        FRAMES_PER_MIB,
    )),
    shared_size: 4 * 1024 * 1024,
};

const _: () = {
    assert!(FRAMES_PER_MIB == 256);
    assert!(STANDARD_LAYOUT.is_consistent());
};
