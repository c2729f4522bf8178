//! # Frame Pool Registry
//!
//! Releasing a run only requires its first frame number; the registry finds
//! the pool that owns that frame. It is created once during boot, filled with
//! [`register`](FramePoolRegistry::register) while still exclusively owned,
//! and then shared by reference. Each pool sits behind its own spin lock, so
//! allocations in different pools never contend.

use crate::frame_pool::{ContFramePool, FramePoolError};
use alloc::vec::Vec;
use kernel_memory_addresses::FrameNumber;
use spin::Mutex;

/// Handle of a pool registered in a [`FramePoolRegistry`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PoolId(usize);

impl PoolId {
    /// Position of the pool in registration order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Process-wide list of all frame pools.
#[derive(Debug, Default)]
pub struct FramePoolRegistry {
    pools: Vec<Mutex<ContFramePool>>,
}

impl FramePoolRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self { pools: Vec::new() }
    }

    /// Add `pool` to the registry.
    ///
    /// # Errors
    /// - [`FramePoolError::OverlappingPool`] if the pool shares frames with an
    ///   already registered pool.
    pub fn register(&mut self, pool: ContFramePool) -> Result<PoolId, FramePoolError> {
        let overlaps = self.pools.iter_mut().any(|other| {
            let other = other.get_mut();
            pool.base().as_u32() < other.end() && other.base().as_u32() < pool.end()
        });
        if overlaps {
            log::warn!("Refusing to register overlapping frame pool at {}", pool.base());
            return Err(FramePoolError::OverlappingPool(pool.base()));
        }

        let id = PoolId(self.pools.len());
        log::debug!(
            "Registered frame pool {} for frames {}..{}",
            id.0,
            pool.base(),
            pool.end()
        );
        self.pools.push(Mutex::new(pool));
        Ok(id)
    }

    fn pool(&self, id: PoolId) -> Result<&Mutex<ContFramePool>, FramePoolError> {
        self.pools.get(id.0).ok_or(FramePoolError::UnknownPool(id.0))
    }

    /// Whether `id` refers to a registered pool.
    #[must_use]
    pub fn is_registered(&self, id: PoolId) -> bool {
        id.0 < self.pools.len()
    }

    /// Allocate a run of `n` contiguous frames from pool `id`.
    ///
    /// # Errors
    /// - [`FramePoolError::UnknownPool`] for an unregistered id.
    /// - Any error of [`ContFramePool::get_frames`].
    pub fn get_frames(&self, id: PoolId, n: u32) -> Result<FrameNumber, FramePoolError> {
        self.pool(id)?.lock().get_frames(n)
    }

    /// Withhold a frame range of pool `id` from allocation.
    ///
    /// # Errors
    /// - [`FramePoolError::UnknownPool`] for an unregistered id.
    /// - Any error of [`ContFramePool::mark_inaccessible`].
    pub fn mark_inaccessible(
        &self,
        id: PoolId,
        first: FrameNumber,
        n: u32,
    ) -> Result<(), FramePoolError> {
        self.pool(id)?.lock().mark_inaccessible(first, n)
    }

    /// Release the run starting at `first`, in whichever pool owns it.
    ///
    /// Returns the number of frames freed.
    ///
    /// # Errors
    /// - [`FramePoolError::InvalidRelease`] if no pool owns `first` or it
    ///   does not start an allocated run.
    pub fn release_frames(&self, first: FrameNumber) -> Result<u32, FramePoolError> {
        let Some(id) = self.owner_of(first) else {
            log::warn!("Release of frame {first} which no pool owns");
            return Err(FramePoolError::InvalidRelease(first));
        };
        self.pools[id.0].lock().release_run(first)
    }

    /// The pool that manages `frame`, if any.
    #[must_use]
    pub fn owner_of(&self, frame: FrameNumber) -> Option<PoolId> {
        self.pools
            .iter()
            .position(|pool| pool.lock().contains(frame))
            .map(PoolId)
    }

    /// Free frame count of pool `id`.
    ///
    /// # Errors
    /// - [`FramePoolError::UnknownPool`] for an unregistered id.
    pub fn free_frames(&self, id: PoolId) -> Result<u32, FramePoolError> {
        Ok(self.pool(id)?.lock().free_frames())
    }

    /// Run `f` with shared access to pool `id`.
    ///
    /// # Errors
    /// - [`FramePoolError::UnknownPool`] for an unregistered id.
    pub fn inspect<R>(
        &self,
        id: PoolId,
        f: impl FnOnce(&ContFramePool) -> R,
    ) -> Result<R, FramePoolError> {
        Ok(f(&self.pool(id)?.lock()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_pool::FrameState;

    fn pool(base: u32, n: u32) -> ContFramePool {
        let storage = Box::leak(vec![0u8; n.div_ceil(4) as usize].into_boxed_slice());
        ContFramePool::with_state_storage(FrameNumber::new(base), n, storage).expect("pool")
    }

    fn two_pools() -> (FramePoolRegistry, PoolId, PoolId) {
        let mut registry = FramePoolRegistry::new();
        let low = registry.register(pool(100, 128)).unwrap();
        let high = registry.register(pool(1000, 64)).unwrap();
        (registry, low, high)
    }

    #[test]
    fn release_finds_the_owning_pool() {
        let (registry, low, high) = two_pools();
        let a = registry.get_frames(low, 5).unwrap();
        let b = registry.get_frames(high, 3).unwrap();
        assert_eq!(a, FrameNumber::new(100));
        assert_eq!(b, FrameNumber::new(1000));

        assert_eq!(registry.release_frames(b), Ok(3));
        assert_eq!(registry.free_frames(high), Ok(64));
        assert_eq!(registry.free_frames(low), Ok(123));

        assert_eq!(
            ContFramePool::release_frames(&registry, a),
            Ok(5)
        );
        assert_eq!(registry.free_frames(low), Ok(128));
    }

    #[test]
    fn unowned_frames_cannot_be_released() {
        let (registry, _, _) = two_pools();
        let stray = FrameNumber::new(500);
        assert_eq!(registry.owner_of(stray), None);
        assert_eq!(
            registry.release_frames(stray),
            Err(FramePoolError::InvalidRelease(stray))
        );
    }

    #[test]
    fn owner_lookup() {
        let (registry, low, high) = two_pools();
        assert_eq!(registry.owner_of(FrameNumber::new(100)), Some(low));
        assert_eq!(registry.owner_of(FrameNumber::new(227)), Some(low));
        assert_eq!(registry.owner_of(FrameNumber::new(228)), None);
        assert_eq!(registry.owner_of(FrameNumber::new(1063)), Some(high));
    }

    #[test]
    fn overlapping_pools_are_rejected() {
        let (mut registry, _, _) = two_pools();
        assert_eq!(
            registry.register(pool(200, 64)).unwrap_err(),
            FramePoolError::OverlappingPool(FrameNumber::new(200))
        );
        assert!(registry.register(pool(228, 16)).is_ok());
    }

    #[test]
    fn unknown_pool_ids() {
        let (registry, _, _) = two_pools();
        let bogus = PoolId(7);
        assert!(!registry.is_registered(bogus));
        assert_eq!(registry.get_frames(bogus, 1), Err(FramePoolError::UnknownPool(7)));
        assert_eq!(registry.free_frames(bogus), Err(FramePoolError::UnknownPool(7)));
    }

    #[test]
    fn inspect_exposes_frame_states() {
        let (registry, low, _) = two_pools();
        registry.mark_inaccessible(low, FrameNumber::new(110), 2).unwrap();
        let state = registry
            .inspect(low, |pool| pool.state(FrameNumber::new(110)))
            .unwrap();
        assert_eq!(state, Some(FrameState::HeadOfSequence));
    }
}
