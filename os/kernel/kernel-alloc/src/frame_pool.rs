//! # Contiguous Frame Pool
//!
//! A [`ContFramePool`] manages a contiguous range of physical frames and hands
//! out *runs* of physically contiguous frames. The bookkeeping is a state map
//! with two bits per frame:
//!
//! | Bits | State | Meaning |
//! |------|-------|---------|
//! | `00` | [`FrameState::Free`] | Available for allocation. |
//! | `01` | [`FrameState::Used`] | Part of a run (not its first frame), or pool bookkeeping. |
//! | `10` | [`FrameState::HeadOfSequence`] | First frame of an allocated run. |
//!
//! A run is released knowing only its first frame: releasing walks forward
//! from the head until the next frame that is free or starts another run.
//!
//! ## State Storage
//!
//! The state map needs [`ContFramePool::needed_info_frames`] whole frames.
//! They are either taken from the front of the pool itself
//! ([`InfoFrames::Internal`], the frames are marked used and never released)
//! or supplied by the caller ([`InfoFrames::External`], typically frames
//! drawn from the kernel pool).
//!
//! ## Search Policy
//!
//! [`ContFramePool::get_frames`] is *first fit*: the free run with the lowest
//! base frame that is long enough wins.

use crate::phys_mapper::PhysMapper;
use kernel_memory_addresses::{FrameNumber, PAGE_SIZE};

/// Number of frame states packed into one byte.
const STATES_PER_BYTE: u32 = 4;

/// Number of frames whose state fits into one info frame.
pub const FRAMES_PER_INFO_FRAME: u32 = PAGE_SIZE * STATES_PER_BYTE;

/// Errors raised by frame pools and the pool registry.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FramePoolError {
    #[error("no run of {requested} free frames available ({free} frames free)")]
    ExhaustedPool { requested: u32, free: u32 },
    #[error("frame {0} does not start an allocated run")]
    InvalidRelease(FrameNumber),
    #[error("frames {first}..{end} are outside of the pool")]
    OutOfRange { first: FrameNumber, end: u32 },
    #[error("pool at frame {0} overlaps an already registered pool")]
    OverlappingPool(FrameNumber),
    #[error("no pool registered under id {0}")]
    UnknownPool(usize),
    #[error("state storage holds {available} bytes, {required} required")]
    InfoStorageTooSmall { available: usize, required: usize },
    #[error("a frame pool must manage at least one allocatable frame")]
    EmptyPool,
    #[error("requested a run of zero frames")]
    EmptyRequest,
    #[error("inconsistent memory layout")]
    InvalidLayout,
}

/// Allocation state of a single frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum FrameState {
    Free = 0b00,
    Used = 0b01,
    HeadOfSequence = 0b10,
}

impl FrameState {
    const MASK: u8 = 0b11;

    const fn from_bits(bits: u8) -> Self {
        match bits & Self::MASK {
            0b00 => Self::Free,
            0b10 => Self::HeadOfSequence,
            _ => Self::Used,
        }
    }
}

/// Where a pool keeps its state map.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum InfoFrames {
    /// The first frames of the pool itself.
    Internal,
    /// Caller-provided frames starting at the given frame number.
    External(FrameNumber),
}

/// Two-bit-per-frame state store.
struct FrameStateMap {
    bytes: &'static mut [u8],
}

impl FrameStateMap {
    const fn bytes_for(n_frames: u32) -> usize {
        n_frames.div_ceil(STATES_PER_BYTE) as usize
    }

    const fn slot(index: u32) -> (usize, u32) {
        ((index / STATES_PER_BYTE) as usize, (index % STATES_PER_BYTE) * 2)
    }

    fn get(&self, index: u32) -> FrameState {
        let (byte, shift) = Self::slot(index);
        FrameState::from_bits(self.bytes[byte] >> shift)
    }

    fn set(&mut self, index: u32, state: FrameState) {
        let (byte, shift) = Self::slot(index);
        let cleared = self.bytes[byte] & !(FrameState::MASK << shift);
        self.bytes[byte] = cleared | ((state as u8) << shift);
    }
}

/// Bitmap allocator over a contiguous range of physical frames.
pub struct ContFramePool {
    base: FrameNumber,
    n_frames: u32,
    free: u32,
    states: FrameStateMap,
}

impl core::fmt::Debug for ContFramePool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ContFramePool")
            .field("base", &self.base)
            .field("n_frames", &self.n_frames)
            .field("free", &self.free)
            .finish_non_exhaustive()
    }
}

impl ContFramePool {
    /// Number of whole frames needed to hold the state of `n_frames` frames.
    ///
    /// ```rust
    /// # use kernel_alloc::frame_pool::ContFramePool;
    /// assert_eq!(ContFramePool::needed_info_frames(1), 1);
    /// assert_eq!(ContFramePool::needed_info_frames(16384), 1);
    /// assert_eq!(ContFramePool::needed_info_frames(16385), 2);
    /// ```
    #[must_use]
    pub const fn needed_info_frames(n_frames: u32) -> u32 {
        n_frames.div_ceil(FRAMES_PER_INFO_FRAME)
    }

    /// Create a pool over `n_frames` frames starting at `base`, with the
    /// state map located according to `info`.
    ///
    /// # Safety
    /// - The info frames must be reachable through `mapper` for the rest of
    ///   the kernel's lifetime.
    /// - For [`InfoFrames::External`], the frames must be exclusively owned
    ///   by this pool (e.g. freshly allocated from another pool).
    ///
    /// # Errors
    /// - [`FramePoolError::EmptyPool`] if nothing would be left to allocate.
    /// - [`FramePoolError::OutOfRange`] if the range exceeds the 32-bit frame space.
    pub unsafe fn new<M: PhysMapper>(
        mapper: &M,
        base: FrameNumber,
        n_frames: u32,
        info: InfoFrames,
    ) -> Result<Self, FramePoolError> {
        let needed = Self::needed_info_frames(n_frames);
        let (location, reserved) = match info {
            InfoFrames::Internal => (base, needed),
            InfoFrames::External(frame) => (frame, 0),
        };
        if n_frames <= reserved {
            return Err(FramePoolError::EmptyPool);
        }

        // SAFETY: Caller guarantees the info frames are mapped and exclusive.
        let storage = unsafe { mapper.frame_bytes_mut(location, needed) };
        Self::build(base, n_frames, storage, reserved)
    }

    /// Create a pool whose state map lives in caller-provided storage.
    ///
    /// # Errors
    /// - [`FramePoolError::InfoStorageTooSmall`] if `storage` cannot hold
    ///   two bits per frame.
    /// - [`FramePoolError::EmptyPool`] if `n_frames` is zero.
    pub fn with_state_storage(
        base: FrameNumber,
        n_frames: u32,
        storage: &'static mut [u8],
    ) -> Result<Self, FramePoolError> {
        if n_frames == 0 {
            return Err(FramePoolError::EmptyPool);
        }
        Self::build(base, n_frames, storage, 0)
    }

    fn build(
        base: FrameNumber,
        n_frames: u32,
        storage: &'static mut [u8],
        reserved: u32,
    ) -> Result<Self, FramePoolError> {
        if base.checked_add(n_frames).is_none() {
            return Err(FramePoolError::OutOfRange {
                first: base,
                end: u32::MAX,
            });
        }

        let required = FrameStateMap::bytes_for(n_frames);
        if storage.len() < required {
            return Err(FramePoolError::InfoStorageTooSmall {
                available: storage.len(),
                required,
            });
        }
        storage[..required].fill(0);

        let mut pool = Self {
            base,
            n_frames,
            free: n_frames,
            states: FrameStateMap { bytes: storage },
        };

        for index in 0..reserved {
            pool.states.set(index, FrameState::Used);
        }
        pool.free -= reserved;

        log::info!(
            "Frame pool at frame {base}: {n_frames} frames, {reserved} used for bookkeeping"
        );
        Ok(pool)
    }

    /// First frame managed by this pool.
    #[must_use]
    pub const fn base(&self) -> FrameNumber {
        self.base
    }

    /// Number of frames managed by this pool, including bookkeeping frames.
    #[must_use]
    pub const fn frame_count(&self) -> u32 {
        self.n_frames
    }

    /// Number of frames currently free.
    #[must_use]
    pub const fn free_frames(&self) -> u32 {
        self.free
    }

    /// Exclusive end frame number.
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.base.as_u32() + self.n_frames
    }

    /// Whether `frame` belongs to this pool.
    #[must_use]
    pub const fn contains(&self, frame: FrameNumber) -> bool {
        frame.as_u32() >= self.base.as_u32() && frame.as_u32() < self.end()
    }

    /// State of `frame`, or `None` if the frame is not part of this pool.
    #[must_use]
    pub fn state(&self, frame: FrameNumber) -> Option<FrameState> {
        self.contains(frame)
            .then(|| self.states.get(frame.as_u32() - self.base.as_u32()))
    }

    /// Allocate a run of `n` physically contiguous frames.
    ///
    /// ### Semantics
    /// - First fit: the lowest-addressed free run of at least `n` frames is used.
    /// - The first frame becomes [`FrameState::HeadOfSequence`], the other
    ///   `n - 1` become [`FrameState::Used`].
    ///
    /// # Errors
    /// - [`FramePoolError::EmptyRequest`] if `n` is zero.
    /// - [`FramePoolError::ExhaustedPool`] if no sufficient run exists.
    pub fn get_frames(&mut self, n: u32) -> Result<FrameNumber, FramePoolError> {
        if n == 0 {
            return Err(FramePoolError::EmptyRequest);
        }
        let exhausted = FramePoolError::ExhaustedPool {
            requested: n,
            free: self.free,
        };
        if self.free == 0 || n > self.free {
            return Err(exhausted);
        }

        let mut run_start = 0;
        let mut run_len = 0;
        let mut found = None;
        for index in 0..self.n_frames {
            if self.states.get(index) != FrameState::Free {
                run_len = 0;
                continue;
            }
            if run_len == 0 {
                run_start = index;
            }
            run_len += 1;
            if run_len == n {
                found = Some(run_start);
                break;
            }
        }

        let Some(start) = found else {
            return Err(exhausted);
        };

        self.mark_run(start, n);
        self.free -= n;

        let first = self.base + start;
        log::debug!("Allocated {n} frame(s) at frame {first}");
        Ok(first)
    }

    /// Withhold the frames `first .. first + n` from allocation.
    ///
    /// The range is marked like an allocated run (head plus used frames)
    /// without searching; frames that were already allocated stay
    /// accounted for only once.
    ///
    /// # Errors
    /// - [`FramePoolError::OutOfRange`] if the range is not fully inside the pool.
    pub fn mark_inaccessible(&mut self, first: FrameNumber, n: u32) -> Result<(), FramePoolError> {
        let Some(end) = first.as_u32().checked_add(n) else {
            return Err(FramePoolError::OutOfRange {
                first,
                end: u32::MAX,
            });
        };
        if first.as_u32() < self.base.as_u32() || end > self.end() {
            return Err(FramePoolError::OutOfRange { first, end });
        }
        if n == 0 {
            return Ok(());
        }

        let start = first.as_u32() - self.base.as_u32();
        let mut previously_free = 0;
        for index in start..start + n {
            if self.states.get(index) == FrameState::Free {
                previously_free += 1;
            }
        }
        self.mark_run(start, n);
        self.free -= previously_free;

        log::info!("Frames {first}..{end} marked inaccessible");
        Ok(())
    }

    /// Release the run whose head is `first`, returning the number of freed frames.
    ///
    /// Callers normally go through
    /// [`FramePoolRegistry::release_frames`](crate::FramePoolRegistry::release_frames)
    /// which locates the owning pool.
    ///
    /// # Errors
    /// - [`FramePoolError::InvalidRelease`] if `first` is outside this pool
    ///   or not the head of a run.
    pub fn release_run(&mut self, first: FrameNumber) -> Result<u32, FramePoolError> {
        if self.state(first) != Some(FrameState::HeadOfSequence) {
            return Err(FramePoolError::InvalidRelease(first));
        }

        let mut index = first.as_u32() - self.base.as_u32();
        self.states.set(index, FrameState::Free);
        let mut released = 1;
        index += 1;
        while index < self.n_frames && self.states.get(index) == FrameState::Used {
            self.states.set(index, FrameState::Free);
            released += 1;
            index += 1;
        }

        self.free += released;
        log::debug!("Released {released} frame(s) at frame {first}");
        Ok(released)
    }

    /// Release the run starting at `first` in whichever pool of `registry` owns it.
    ///
    /// # Errors
    /// See [`FramePoolRegistry::release_frames`](crate::FramePoolRegistry::release_frames).
    pub fn release_frames(
        registry: &crate::FramePoolRegistry,
        first: FrameNumber,
    ) -> Result<u32, FramePoolError> {
        registry.release_frames(first)
    }

    fn mark_run(&mut self, start: u32, n: u32) {
        self.states.set(start, FrameState::HeadOfSequence);
        for index in start + 1..start + n {
            self.states.set(index, FrameState::Used);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_for(n_frames: u32) -> &'static mut [u8] {
        let len = FrameStateMap::bytes_for(n_frames);
        Box::leak(vec![0xFFu8; len].into_boxed_slice())
    }

    fn pool(base: u32, n: u32) -> ContFramePool {
        ContFramePool::with_state_storage(FrameNumber::new(base), n, storage_for(n))
            .expect("pool")
    }

    fn f(n: u32) -> FrameNumber {
        FrameNumber::new(n)
    }

    #[test]
    fn allocate_and_release_scenario() {
        let mut pool = pool(100, 128);
        assert_eq!(pool.free_frames(), 128);

        assert_eq!(pool.get_frames(5), Ok(f(100)));
        assert_eq!(pool.state(f(100)), Some(FrameState::HeadOfSequence));
        for frame in 101..=104 {
            assert_eq!(pool.state(f(frame)), Some(FrameState::Used));
        }

        assert_eq!(pool.get_frames(3), Ok(f(105)));
        assert_eq!(pool.state(f(105)), Some(FrameState::HeadOfSequence));
        assert_eq!(pool.state(f(106)), Some(FrameState::Used));
        assert_eq!(pool.state(f(107)), Some(FrameState::Used));
        assert_eq!(pool.free_frames(), 120);

        assert_eq!(pool.release_run(f(100)), Ok(5));
        assert_eq!(pool.free_frames(), 125);
        for frame in 100..=104 {
            assert_eq!(pool.state(f(frame)), Some(FrameState::Free));
        }
        assert_eq!(pool.state(f(105)), Some(FrameState::HeadOfSequence));
        assert_eq!(pool.state(f(107)), Some(FrameState::Used));
    }

    #[test]
    fn first_fit_prefers_lowest_base() {
        let mut pool = pool(0, 32);
        let a = pool.get_frames(4).unwrap();
        let b = pool.get_frames(2).unwrap();
        let _c = pool.get_frames(4).unwrap();
        pool.release_run(a).unwrap();
        pool.release_run(b).unwrap();

        // Holes: 0..6 (6 frames) and 10..32; a 3-frame run fits the first one.
        assert_eq!(pool.get_frames(3), Ok(f(0)));
        assert_eq!(pool.get_frames(3), Ok(f(3)));
        assert_eq!(pool.get_frames(3), Ok(f(10)));
    }

    #[test]
    fn release_stops_at_next_head() {
        let mut pool = pool(10, 16);
        let a = pool.get_frames(3).unwrap();
        let b = pool.get_frames(3).unwrap();
        assert_eq!(pool.release_run(a), Ok(3));
        assert_eq!(pool.state(b), Some(FrameState::HeadOfSequence));
        assert_eq!(pool.free_frames(), 13);
    }

    #[test]
    fn release_stops_at_pool_end() {
        let mut pool = pool(0, 8);
        assert_eq!(pool.get_frames(8), Ok(f(0)));
        assert_eq!(pool.free_frames(), 0);
        assert_eq!(pool.release_run(f(0)), Ok(8));
        assert_eq!(pool.free_frames(), 8);
    }

    #[test]
    fn release_rejects_non_head_frames() {
        let mut pool = pool(0, 16);
        pool.get_frames(4).unwrap();
        assert_eq!(pool.release_run(f(1)), Err(FramePoolError::InvalidRelease(f(1))));
        assert_eq!(pool.release_run(f(8)), Err(FramePoolError::InvalidRelease(f(8))));
        assert_eq!(pool.release_run(f(99)), Err(FramePoolError::InvalidRelease(f(99))));
        assert_eq!(pool.free_frames(), 12);
    }

    #[test]
    fn double_release_is_rejected() {
        let mut pool = pool(0, 16);
        let run = pool.get_frames(2).unwrap();
        pool.release_run(run).unwrap();
        assert_eq!(pool.release_run(run), Err(FramePoolError::InvalidRelease(run)));
        assert_eq!(pool.free_frames(), 16);
    }

    #[test]
    fn exhaustion() {
        let mut pool = pool(0, 8);
        assert!(matches!(
            pool.get_frames(9),
            Err(FramePoolError::ExhaustedPool { requested: 9, free: 8 })
        ));
        pool.get_frames(2).unwrap();
        pool.get_frames(2).unwrap();
        pool.release_run(f(0)).unwrap();
        // Six frames are free, but only as runs of 2 and 4.
        assert!(matches!(
            pool.get_frames(5),
            Err(FramePoolError::ExhaustedPool { requested: 5, free: 6 })
        ));
        pool.get_frames(6).unwrap_err();
        assert_eq!(pool.get_frames(4), Ok(f(4)));
        assert_eq!(pool.get_frames(2), Ok(f(0)));
        assert!(matches!(
            pool.get_frames(1),
            Err(FramePoolError::ExhaustedPool { free: 0, .. })
        ));
        assert_eq!(pool.get_frames(0), Err(FramePoolError::EmptyRequest));
    }

    #[test]
    fn inaccessible_frames_are_never_handed_out() {
        let mut pool = pool(0, 16);
        pool.mark_inaccessible(f(4), 4).unwrap();
        assert_eq!(pool.free_frames(), 12);
        assert_eq!(pool.state(f(4)), Some(FrameState::HeadOfSequence));
        assert_eq!(pool.state(f(7)), Some(FrameState::Used));

        assert_eq!(pool.get_frames(4), Ok(f(0)));
        assert_eq!(pool.get_frames(4), Ok(f(8)));
        assert!(pool.get_frames(5).is_err());
    }

    #[test]
    fn mark_inaccessible_counts_free_frames_once() {
        let mut pool = pool(0, 16);
        pool.get_frames(2).unwrap();
        pool.mark_inaccessible(f(1), 3).unwrap();
        // Frame 1 was already used; only frames 2 and 3 were free.
        assert_eq!(pool.free_frames(), 12);
    }

    #[test]
    fn mark_inaccessible_checks_range() {
        let mut pool = pool(100, 16);
        assert!(matches!(
            pool.mark_inaccessible(f(99), 2),
            Err(FramePoolError::OutOfRange { .. })
        ));
        assert!(matches!(
            pool.mark_inaccessible(f(110), 7),
            Err(FramePoolError::OutOfRange { .. })
        ));
        assert_eq!(pool.free_frames(), 16);
        assert!(pool.mark_inaccessible(f(110), 6).is_ok());
    }

    #[test]
    fn mark_inaccessible_rejects_overflowing_ranges() {
        let top = u32::MAX - 16;
        let mut pool = pool(top, 16);
        assert_eq!(pool.end(), u32::MAX);
        assert_eq!(
            pool.mark_inaccessible(f(top + 8), u32::MAX),
            Err(FramePoolError::OutOfRange {
                first: f(top + 8),
                end: u32::MAX
            })
        );
        assert_eq!(pool.free_frames(), 16);
        assert!(pool.mark_inaccessible(f(top + 8), 8).is_ok());
        assert_eq!(pool.free_frames(), 8);
    }

    #[test]
    fn free_counter_matches_states() {
        let mut pool = pool(0, 64);
        let mut heads = Vec::new();
        for n in [3, 1, 7, 2, 5] {
            heads.push(pool.get_frames(n).unwrap());
        }
        pool.release_run(heads[1]).unwrap();
        pool.release_run(heads[3]).unwrap();
        heads.push(pool.get_frames(2).unwrap());

        let free_states = (0..64)
            .filter(|&i| pool.state(f(i)) == Some(FrameState::Free))
            .count();
        assert_eq!(free_states, pool.free_frames() as usize);
    }

    #[test]
    fn storage_must_be_large_enough() {
        let storage = Box::leak(vec![0u8; 3].into_boxed_slice());
        assert_eq!(
            ContFramePool::with_state_storage(f(0), 16, storage).unwrap_err(),
            FramePoolError::InfoStorageTooSmall {
                available: 3,
                required: 4
            }
        );
    }

    #[test]
    fn state_map_packs_four_frames_per_byte() {
        let mut map = FrameStateMap {
            bytes: Box::leak(vec![0u8; 2].into_boxed_slice()),
        };
        map.set(0, FrameState::HeadOfSequence);
        map.set(1, FrameState::Used);
        map.set(5, FrameState::Used);
        assert_eq!(map.bytes[0], 0b0000_0110);
        assert_eq!(map.bytes[1], 0b0000_0100);
        map.set(0, FrameState::Free);
        assert_eq!(map.get(0), FrameState::Free);
        assert_eq!(map.get(1), FrameState::Used);
    }
}
