//! # Physical Frame Allocation
//!
//! This crate owns physical memory: which 4 KiB frames are free, which are
//! allocated, and which must never be handed out.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              FramePoolRegistry                      │
//! │    • owns every pool, one spin lock per pool        │
//! │    • pool-agnostic release by frame number          │
//! └──────────┬──────────────────────────┬───────────────┘
//!            │                          │
//! ┌──────────▼───────────┐   ┌──────────▼───────────────┐
//! │  ContFramePool       │   │  ContFramePool           │
//! │  (kernel pool)       │   │  (process pool)          │
//! │  2 bits per frame    │   │  state map lives in a    │
//! │  state map inside    │   │  kernel-pool frame       │
//! └──────────────────────┘   └──────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! * [`frame_pool`]: the contiguous-run allocator and its state map.
//! * [`registry`]: the process-wide pool list, used to release a run given
//!   only its first frame.
//! * [`phys_mapper`]: access to physical memory (identity mapped on the
//!   target, simulated in tests).
//! * [`boot`]: builds the kernel and process pools from a
//!   [`MemoryLayout`](kernel_info::memory::MemoryLayout).
//!
//! ## Usage
//!
//! ```rust
//! use kernel_alloc::{ContFramePool, FramePoolRegistry};
//! use kernel_memory_addresses::FrameNumber;
//!
//! let storage = Box::leak(vec![0u8; 32].into_boxed_slice());
//! let pool = ContFramePool::with_state_storage(FrameNumber::new(100), 128, storage)?;
//!
//! let mut registry = FramePoolRegistry::new();
//! let id = registry.register(pool)?;
//!
//! let run = registry.get_frames(id, 5)?;
//! assert_eq!(run, FrameNumber::new(100));
//! assert_eq!(registry.release_frames(run)?, 5);
//! # Ok::<(), kernel_alloc::FramePoolError>(())
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod boot;
pub mod frame_pool;
pub mod phys_mapper;
pub mod registry;

pub use boot::{BootPools, bootstrap_pools};
pub use frame_pool::{ContFramePool, FrameState, FramePoolError, InfoFrames};
pub use registry::{FramePoolRegistry, PoolId};
