//! # Boot-Time Pool Construction
//!
//! Builds the two frame pools of the machine from a [`MemoryLayout`]:
//!
//! 1. The kernel pool keeps its state map in its own first frame(s).
//! 2. The process pool's state map is allocated from the kernel pool.
//! 3. The memory hole (if any) is withheld from the process pool.

use crate::frame_pool::{ContFramePool, FramePoolError, InfoFrames};
use crate::phys_mapper::PhysMapper;
use crate::registry::{FramePoolRegistry, PoolId};
use kernel_info::memory::MemoryLayout;

/// Result of [`bootstrap_pools`].
#[derive(Debug)]
pub struct BootPools {
    pub registry: FramePoolRegistry,
    /// Pool for page directories, page tables and bookkeeping.
    pub kernel: PoolId,
    /// Pool for demand-paged process memory.
    pub process: PoolId,
}

/// Construct and register the kernel and process frame pools.
///
/// # Safety
/// Every frame of the kernel pool must be reachable through `mapper`, and
/// no other code may use the frames described by `layout`.
///
/// # Errors
/// - [`FramePoolError::InvalidLayout`] if `layout` fails
///   [`MemoryLayout::is_consistent`], e.g. when the kernel pool is not
///   covered by the identity-mapped shared window.
/// - Any other [`FramePoolError`] raised while constructing the pools,
///   e.g. when the kernel pool cannot hold the process pool's state map.
pub unsafe fn bootstrap_pools<M: PhysMapper>(
    mapper: &M,
    layout: &MemoryLayout,
) -> Result<BootPools, FramePoolError> {
    if !layout.is_consistent() {
        log::error!("Refusing inconsistent memory layout {layout:?}");
        return Err(FramePoolError::InvalidLayout);
    }

    let mut registry = FramePoolRegistry::new();

    let kernel_pool = unsafe {
        ContFramePool::new(
            mapper,
            layout.kernel_pool.start,
            layout.kernel_pool.count,
            InfoFrames::Internal,
        )?
    };
    let kernel = registry.register(kernel_pool)?;

    let info_frames = ContFramePool::needed_info_frames(layout.process_pool.count);
    let info = registry.get_frames(kernel, info_frames)?;
    let process_pool = unsafe {
        ContFramePool::new(
            mapper,
            layout.process_pool.start,
            layout.process_pool.count,
            InfoFrames::External(info),
        )?
    };
    let process = registry.register(process_pool)?;

    if let Some(hole) = layout.memory_hole {
        registry.mark_inaccessible(process, hole.start, hole.count)?;
    }

    log::info!(
        "Frame pools ready: kernel {} frames free, process {} frames free",
        registry.free_frames(kernel)?,
        registry.free_frames(process)?
    );

    Ok(BootPools {
        registry,
        kernel,
        process,
    })
}
