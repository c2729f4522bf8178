//! # Process-Wide Paging State
//!
//! [`init_paging`] fixes, once during boot, which frame pool backs paging
//! structures (kernel pool) and which backs demand-allocated pages (process
//! pool), and how large the identity-mapped shared window is. The returned
//! [`Paging`] object is then shared by reference with every
//! [`PageTableManager`](crate::PageTableManager).
//!
//! ```text
//!   boot ──► bootstrap_pools ──► init_paging ──► PageTableManager::new
//!                                                   │
//!                                                   ├─► load
//!                                                   └─► Paging::enable_paging
//! ```

use crate::fault::PageFaultError;
use crate::hardware::PagingHardware;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use kernel_alloc::phys_mapper::PhysMapper;
use kernel_alloc::{ContFramePool, FramePoolError, FramePoolRegistry, PoolId};
use kernel_info::memory::MAX_SHARED_WINDOW;
use kernel_memory_addresses::{
    FrameNumber, PAGE_SIZE, PhysicalPage, VirtualAddress, is_page_aligned,
};

/// Errors raised by paging setup, address-space management and fault handling.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PagingError {
    #[error("page fault at {0} is not covered by any registered VM pool")]
    UnauthorizedFault(VirtualAddress),
    #[error("protection violation at {address}: {}", .error.explain())]
    ProtectionViolation {
        address: VirtualAddress,
        error: PageFaultError,
    },
    #[error("VM pool registry is full ({capacity} pools)")]
    RegistryFull { capacity: usize },
    #[error("VM pool window at {0} overlaps a registered window")]
    OverlappingWindow(VirtualAddress),
    #[error("shared window of {0:#x} bytes exceeds a single page table")]
    SharedWindowTooLarge(u32),
    #[error("shared window of {0:#x} bytes is not page aligned")]
    SharedWindowUnaligned(u32),
    #[error("shared window must not be empty")]
    EmptySharedWindow,
    #[error("kernel pool ends at frame {0}, beyond the shared window")]
    KernelPoolNotShared(u32),
    #[error("the address space is not loaded")]
    NotLoaded,
    #[error("paging is not enabled")]
    PagingDisabled,
    #[error("{0} lies in the shared directory slot or the recursive mapping")]
    ReservedAddress(VirtualAddress),
    #[error(transparent)]
    Frames(#[from] FramePoolError),
}

/// Parameters of [`init_paging`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PagingConfig {
    /// Pool for page directories and page tables.
    pub kernel_pool: PoolId,
    /// Pool for demand-allocated pages.
    pub process_pool: PoolId,
    /// Bytes at the bottom of every address space that are identity mapped.
    pub shared_size: u32,
    /// Maximum number of VM pools per address space.
    pub vm_pool_capacity: usize,
}

impl PagingConfig {
    pub const DEFAULT_VM_POOL_CAPACITY: usize = 5;

    #[must_use]
    pub const fn new(kernel_pool: PoolId, process_pool: PoolId, shared_size: u32) -> Self {
        Self {
            kernel_pool,
            process_pool,
            shared_size,
            vm_pool_capacity: Self::DEFAULT_VM_POOL_CAPACITY,
        }
    }

    #[must_use]
    pub const fn with_vm_pool_capacity(mut self, capacity: usize) -> Self {
        self.vm_pool_capacity = capacity;
        self
    }
}

/// Sentinel for "no address space loaded yet".
const NO_DIRECTORY: u32 = u32::MAX;

/// Process-wide paging configuration and state.
pub struct Paging<'a, M: PhysMapper, H: PagingHardware> {
    mapper: &'a M,
    hardware: &'a H,
    frames: &'a FramePoolRegistry,
    config: PagingConfig,
    enabled: AtomicBool,
    current: AtomicU32,
}

/// Validate `config` and set up the process-wide paging state.
///
/// # Errors
/// - [`PagingError::Frames`] with [`FramePoolError::UnknownPool`] if either
///   pool is not registered in `frames`.
/// - [`PagingError::EmptySharedWindow`], [`PagingError::SharedWindowUnaligned`]
///   or [`PagingError::SharedWindowTooLarge`] for an unusable shared window.
/// - [`PagingError::KernelPoolNotShared`] if the kernel pool is not fully
///   inside the shared window, where its frames are identity mapped.
pub fn init_paging<'a, M: PhysMapper, H: PagingHardware>(
    mapper: &'a M,
    hardware: &'a H,
    frames: &'a FramePoolRegistry,
    config: PagingConfig,
) -> Result<Paging<'a, M, H>, PagingError> {
    for pool in [config.kernel_pool, config.process_pool] {
        if !frames.is_registered(pool) {
            return Err(FramePoolError::UnknownPool(pool.index()).into());
        }
    }

    let shared = config.shared_size;
    if shared == 0 {
        return Err(PagingError::EmptySharedWindow);
    }
    if !is_page_aligned(shared) {
        return Err(PagingError::SharedWindowUnaligned(shared));
    }
    if shared > MAX_SHARED_WINDOW {
        return Err(PagingError::SharedWindowTooLarge(shared));
    }

    let kernel_end = frames.inspect(config.kernel_pool, ContFramePool::end)?;
    if kernel_end > shared / PAGE_SIZE {
        log::error!("Kernel pool ends at frame {kernel_end}, outside of the shared window");
        return Err(PagingError::KernelPoolNotShared(kernel_end));
    }

    log::info!(
        "Initialized paging: shared window {shared:#x} bytes, kernel pool {}, process pool {}",
        config.kernel_pool.index(),
        config.process_pool.index()
    );

    Ok(Paging {
        mapper,
        hardware,
        frames,
        config,
        enabled: AtomicBool::new(false),
        current: AtomicU32::new(NO_DIRECTORY),
    })
}

impl<'a, M: PhysMapper, H: PagingHardware> Paging<'a, M, H> {
    /// Turn on address translation. Calling it again is a no-op.
    ///
    /// # Errors
    /// - [`PagingError::NotLoaded`] if no address space has been loaded yet.
    pub fn enable_paging(&self) -> Result<(), PagingError> {
        if self.is_enabled() {
            log::debug!("Paging already enabled");
            return Ok(());
        }
        if self.current_directory().is_none() {
            return Err(PagingError::NotLoaded);
        }

        // SAFETY: An address space built by `PageTableManager` is loaded,
        // and it identity maps the shared window the kernel runs in.
        unsafe { self.hardware.set_translation_enabled(true) };
        self.enabled.store(true, Ordering::Release);
        log::info!("Paging enabled");
        Ok(())
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Directory of the loaded address space, if any.
    #[must_use]
    pub fn current_directory(&self) -> Option<PhysicalPage> {
        match self.current.load(Ordering::Acquire) {
            NO_DIRECTORY => None,
            frame => Some(FrameNumber::new(frame).page()),
        }
    }

    pub(crate) fn set_current_directory(&self, directory: PhysicalPage) {
        self.current
            .store(directory.frame().as_u32(), Ordering::Release);
    }

    #[must_use]
    pub const fn config(&self) -> &PagingConfig {
        &self.config
    }

    #[must_use]
    pub const fn frames(&self) -> &'a FramePoolRegistry {
        self.frames
    }

    #[must_use]
    pub const fn mapper(&self) -> &'a M {
        self.mapper
    }

    #[must_use]
    pub const fn hardware(&self) -> &'a H {
        self.hardware
    }
}
