//! # Page Fault Information

use bitfield_struct::bitfield;
use kernel_memory_addresses::VirtualAddress;

/// Page-fault error code layout (i386).
///
/// Pushed by the CPU when raising `#PF` (vector 14); each bit describes the
/// condition that caused the fault.
/// Reference: Intel SDM Vol. 3A, §6.15 "Page-Fault Exception (#PF)".
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageFaultError {
    /// 0 = non-present page.
    /// 1 = protection violation (page present but access disallowed).
    pub present: bool, // bit 0

    /// 0 = read access.
    /// 1 = write access.
    pub write: bool, // bit 1

    /// 0 = supervisor (CPL 0–2).
    /// 1 = user mode (CPL 3).
    pub user: bool, // bit 2

    /// 1 = caused by reserved bit set in a paging structure.
    pub reserved_bit: bool, // bit 3

    /// 1 = instruction fetch.
    pub instruction_fetch: bool, // bit 4

    #[bits(27)]
    __: u32, // reserved / ignored bits
}

impl PageFaultError {
    /// Human-readable summary of the fault cause.
    #[must_use]
    pub const fn explain(&self) -> &'static str {
        if !self.present() {
            "Non-present page (page not mapped yet)"
        } else if self.reserved_bit() {
            "Reserved bit set in a paging structure"
        } else if self.instruction_fetch() {
            "Instruction fetch on protected page"
        } else if self.write() {
            if self.user() {
                "User-mode write access to protected page"
            } else {
                "Write access to protected page"
            }
        } else if self.user() {
            "User-mode read access to supervisor page"
        } else {
            "Read access to protected page"
        }
    }
}

/// Everything the hardware reports about a page fault.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PageFault {
    /// The faulting linear address (CR2).
    pub address: VirtualAddress,
    /// The error code pushed by the CPU.
    pub error: PageFaultError,
}

impl PageFault {
    #[must_use]
    pub const fn new(address: VirtualAddress, error: PageFaultError) -> Self {
        Self { address, error }
    }
}
