use core::cell::UnsafeCell;
use kernel_alloc::phys_mapper::PhysMapper;
use kernel_alloc::{FrameState, FramePoolError, bootstrap_pools};
use kernel_info::memory::{FrameRange, MemoryLayout};
use kernel_memory_addresses::{FrameNumber, PAGE_SIZE, PhysicalAddress};

#[repr(C, align(4096))]
struct Frame([u8; PAGE_SIZE as usize]);

/// Simulated physical RAM; frame `n` lives at index `n`.
struct Ram {
    frames: Box<[UnsafeCell<Frame>]>,
}

impl Ram {
    fn with_frames(n: usize) -> Self {
        let frames = (0..n)
            .map(|_| UnsafeCell::new(Frame([0xAA; PAGE_SIZE as usize])))
            .collect();
        Self { frames }
    }
}

impl PhysMapper for Ram {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let frame = pa.frame().as_u32() as usize;
        assert!(frame < self.frames.len(), "{pa:?} outside of simulated RAM");
        let base = UnsafeCell::raw_get(self.frames.as_ptr()).cast::<u8>();
        unsafe { &mut *base.add(pa.as_u32() as usize).cast::<T>() }
    }
}

fn small_layout() -> MemoryLayout {
    MemoryLayout {
        kernel_pool: FrameRange::new(FrameNumber::new(32), 32),
        process_pool: FrameRange::new(FrameNumber::new(64), 448),
        memory_hole: Some(FrameRange::new(FrameNumber::new(200), 16)),
        shared_size: 64 * PAGE_SIZE,
    }
}

#[test]
fn builds_kernel_and_process_pools() {
    let ram = Ram::with_frames(512);
    let layout = small_layout();
    assert!(layout.is_consistent());

    let pools = unsafe { bootstrap_pools(&ram, &layout) }.expect("bootstrap");
    let registry = &pools.registry;

    // Kernel pool: one internal info frame plus one for the process pool's map.
    assert_eq!(registry.free_frames(pools.kernel), Ok(30));
    let (internal, external) = registry
        .inspect(pools.kernel, |pool| {
            (
                pool.state(FrameNumber::new(32)),
                pool.state(FrameNumber::new(33)),
            )
        })
        .unwrap();
    assert_eq!(internal, Some(FrameState::Used));
    assert_eq!(external, Some(FrameState::HeadOfSequence));

    // Process pool: everything but the hole.
    assert_eq!(registry.free_frames(pools.process), Ok(448 - 16));
    assert_eq!(registry.owner_of(FrameNumber::new(64)), Some(pools.process));
    assert_eq!(registry.owner_of(FrameNumber::new(40)), Some(pools.kernel));
    assert_eq!(registry.owner_of(FrameNumber::new(10)), None);
}

#[test]
fn hole_is_skipped_by_allocations() {
    let ram = Ram::with_frames(512);
    let pools = unsafe { bootstrap_pools(&ram, &small_layout()) }.expect("bootstrap");
    let registry = &pools.registry;

    // 64..200 holds 136 frames; a larger run must go past the hole.
    assert_eq!(
        registry.get_frames(pools.process, 137),
        Ok(FrameNumber::new(216))
    );
    assert_eq!(
        registry.get_frames(pools.process, 136),
        Ok(FrameNumber::new(64))
    );
}

#[test]
fn internal_info_frames_cannot_be_released() {
    let ram = Ram::with_frames(512);
    let pools = unsafe { bootstrap_pools(&ram, &small_layout()) }.expect("bootstrap");
    assert_eq!(
        pools.registry.release_frames(FrameNumber::new(32)),
        Err(FramePoolError::InvalidRelease(FrameNumber::new(32)))
    );
}

#[test]
fn kernel_pool_too_small_for_process_state() {
    let ram = Ram::with_frames(64);
    let layout = MemoryLayout {
        kernel_pool: FrameRange::new(FrameNumber::new(8), 1),
        process_pool: FrameRange::new(FrameNumber::new(16), 16),
        memory_hole: None,
        shared_size: 16 * PAGE_SIZE,
    };
    let err = unsafe { bootstrap_pools(&ram, &layout) }.unwrap_err();
    assert_eq!(err, FramePoolError::EmptyPool);
}

#[test]
fn kernel_pool_outside_the_shared_window_is_rejected() {
    let ram = Ram::with_frames(512);
    let layout = MemoryLayout {
        shared_size: 32 * PAGE_SIZE,
        ..small_layout()
    };
    assert!(!layout.is_consistent());
    let err = unsafe { bootstrap_pools(&ram, &layout) }.unwrap_err();
    assert_eq!(err, FramePoolError::InvalidLayout);
}
