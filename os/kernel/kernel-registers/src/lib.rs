//! # Typed i386 Control Registers
//!
//! Bitfield models of the control registers involved in two-level paging:
//!
//! | Register | Role |
//! |----------|------|
//! | [`cr0::Cr0`] | Bit 31 (PG) turns address translation on or off. |
//! | [`cr2::Cr2`] | Linear address that caused the most recent page fault. |
//! | [`cr3::Cr3`] | Physical base of the active page directory; writing it flushes the TLB. |
//!
//! The actual `mov crN` instructions are only compiled with the `asm` feature
//! on a 32-bit x86 target; on any other target the types remain usable as
//! plain values (e.g. in tests).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr0")]
pub mod cr0;

#[cfg(feature = "cr2")]
pub mod cr2;

#[cfg(feature = "cr3")]
pub mod cr3;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// Control register access is privileged and requires kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// Writing a control register changes how every subsequent memory access
    /// is translated; the new value must describe a valid configuration.
    unsafe fn store_unsafe(self);
}
