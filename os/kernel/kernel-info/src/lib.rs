//! # Machine Memory Configuration
//!
//! This crate is the single place that describes how physical memory of the
//! target machine is carved up between the kernel and processes. The frame
//! pools and the paging code read their parameters from here instead of
//! hard-coding them.
//!
//! ## Physical Memory Layout
//!
//! The [standard layout](memory::STANDARD_LAYOUT) models the classic 32 MiB
//! teaching machine:
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  Low memory, kernel image       │  (identity mapped,
//!             │                                 │   not managed by pools)
//! 0x0020_0000 ├─────────────────────────────────┤ 2 MiB
//!             │        Kernel frame pool        │  page directories,
//!             │                                 │  page tables, bookkeeping
//! 0x0040_0000 ├─────────────────────────────────┤ 4 MiB
//!             │        Process frame pool       │  demand-paged memory
//! 0x00F0_0000 ├ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┤ 15 MiB
//!             │   Memory hole (withheld)        │
//! 0x0100_0000 ├ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┤ 16 MiB
//!             │        Process frame pool       │
//! 0x0200_0000 └─────────────────────────────────┘ 32 MiB
//! ```
//!
//! The first 4 MiB of virtual memory (the *shared window*) are identity
//! mapped into every address space, so kernel code and the kernel pool are
//! reachable no matter which address space is loaded.
//!
//! ## Compile-Time Checks
//!
//! Layouts are `const` values; [`MemoryLayout::is_consistent`](memory::MemoryLayout::is_consistent)
//! is `const fn` so the standard layout is verified at build time.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
