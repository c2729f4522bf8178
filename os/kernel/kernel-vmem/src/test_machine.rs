//! Software model of a small i386 machine for unit tests.
//!
//! 512 frames of RAM, a CR3/CR0.PG pair and an MMU walk that honours the
//! present bit, including the recursive directory slot.

use crate::PageEntryBits;
use crate::fault::{PageFault, PageFaultError};
use crate::hardware::PagingHardware;
use crate::paging::{Paging, PagingConfig, init_paging};
use core::cell::{Cell, OnceCell, UnsafeCell};
use kernel_alloc::phys_mapper::PhysMapper;
use kernel_alloc::{BootPools, FramePoolRegistry, bootstrap_pools};
use kernel_info::memory::{FrameRange, MemoryLayout};
use kernel_memory_addresses::{FrameNumber, PAGE_SIZE, PhysicalAddress, PhysicalPage, VirtualAddress};

pub const RAM_FRAMES: u32 = 512;
pub const SHARED_SIZE: u32 = 128 * PAGE_SIZE;

pub const LAYOUT: MemoryLayout = MemoryLayout {
    kernel_pool: FrameRange::new(FrameNumber::new(64), 64),
    process_pool: FrameRange::new(FrameNumber::new(128), RAM_FRAMES - 128),
    memory_hole: None,
    shared_size: SHARED_SIZE,
};

#[repr(C, align(4096))]
struct Frame([u8; PAGE_SIZE as usize]);

pub struct TestMachine {
    ram: Box<[UnsafeCell<Frame>]>,
    cr3: Cell<Option<PhysicalPage>>,
    paging: Cell<bool>,
    loads: Cell<usize>,
    fault: Cell<PageFault>,
    pools: OnceCell<BootPools>,
}

impl TestMachine {
    /// A fresh machine with bootstrapped frame pools. RAM starts out as `0xAA`.
    pub fn boot() -> &'static Self {
        let ram = (0..RAM_FRAMES)
            .map(|_| UnsafeCell::new(Frame([0xAA; PAGE_SIZE as usize])))
            .collect();
        let machine: &'static Self = Box::leak(Box::new(Self {
            ram,
            cr3: Cell::new(None),
            paging: Cell::new(false),
            loads: Cell::new(0),
            fault: Cell::new(PageFault::new(
                VirtualAddress::zero(),
                PageFaultError::new(),
            )),
            pools: OnceCell::new(),
        }));
        let pools = unsafe { bootstrap_pools(machine, &LAYOUT) }.expect("bootstrap pools");
        machine.pools.set(pools).expect("booted once");
        machine
    }

    pub fn boot_pools(&self) -> &BootPools {
        self.pools.get().expect("booted")
    }

    pub fn frames(&self) -> &FramePoolRegistry {
        &self.boot_pools().registry
    }

    pub fn kernel_free(&self) -> u32 {
        self.frames().free_frames(self.boot_pools().kernel).unwrap()
    }

    pub fn process_free(&self) -> u32 {
        self.frames().free_frames(self.boot_pools().process).unwrap()
    }

    pub fn paging_config(&self) -> PagingConfig {
        let pools = self.boot_pools();
        PagingConfig::new(pools.kernel, pools.process, SHARED_SIZE)
    }

    pub fn init_paging(&'static self) -> &'static Paging<'static, Self, Self> {
        let paging = init_paging(self, self, self.frames(), self.paging_config()).expect("paging");
        Box::leak(Box::new(paging))
    }

    pub fn translation_enabled(&self) -> bool {
        self.paging.get()
    }

    pub fn cr3(&self) -> Option<PhysicalPage> {
        self.cr3.get()
    }

    pub fn load_count(&self) -> usize {
        self.loads.get()
    }

    pub fn set_fault(&self, address: VirtualAddress, error_code: u32) {
        self.fault
            .set(PageFault::new(address, PageFaultError::from_bits(error_code)));
    }

    fn entry(&self, table: PhysicalPage, index: u32) -> PageEntryBits {
        let raw = unsafe { *self.phys_to_mut::<u32>(table.base() + index * 4) };
        PageEntryBits::from_bits(raw)
    }

    /// Walk the loaded translation like the MMU would.
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        if !self.paging.get() {
            return Some(PhysicalAddress::new(va.as_u32()));
        }
        let directory = self.cr3.get()?;
        let pde = self.entry(directory, va.as_u32() >> 22);
        if !pde.present() {
            return None;
        }
        let pte = self.entry(pde.physical_page(), (va.as_u32() >> 12) & 0x3FF);
        if !pte.present() {
            return None;
        }
        Some(pte.physical_page().base() + va.page_offset())
    }

    pub fn read_u8(&self, va: VirtualAddress) -> Option<u8> {
        let pa = self.translate(va)?;
        Some(unsafe { *self.phys_to_mut::<u8>(pa) })
    }

    pub fn write_u8(&self, va: VirtualAddress, value: u8) -> bool {
        let Some(pa) = self.translate(va) else {
            return false;
        };
        unsafe { *self.phys_to_mut::<u8>(pa) = value };
        true
    }
}

impl PhysMapper for TestMachine {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let frame = pa.frame().as_u32();
        assert!(frame < RAM_FRAMES, "{pa:?} outside of simulated RAM");
        let base = UnsafeCell::raw_get(self.ram.as_ptr()).cast::<u8>();
        unsafe { &mut *base.add(pa.as_u32() as usize).cast::<T>() }
    }
}

impl PagingHardware for TestMachine {
    unsafe fn load_address_space(&self, directory: PhysicalPage) {
        self.cr3.set(Some(directory));
        self.loads.set(self.loads.get() + 1);
    }

    fn read_fault_info(&self) -> PageFault {
        self.fault.get()
    }

    unsafe fn set_translation_enabled(&self, enabled: bool) {
        self.paging.set(enabled);
    }

    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T {
        let pa = self
            .translate(va)
            .unwrap_or_else(|| panic!("{va:?} is not mapped"));
        unsafe { self.phys_to_mut(pa) }
    }
}
