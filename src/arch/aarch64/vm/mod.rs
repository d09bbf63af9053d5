//! Boot translation tables.
//!
//! One level 1 table is shared by TTBR0 and TTBR1. With T0SZ = T1SZ = 25 both halves start
//! their walk at level 1 and index it with VA bits [38:30], so the low (identity) windows and
//! the higher half window only have to land in different slots. Every slot we fill points at
//! one of three level 2 tables that map 2 MiB blocks.
//!
//! All of this runs with the MMU off, where every data access is Device memory: no atomics,
//! no locks, no logging. Outcomes are returned to the caller and reported once translation
//! is up.

use crate::vm::{AttributeClass, MappingRequest, PhysicalAddress, VirtualAddress};
use table::{level1_index, level2_index, IntermediateLevel, Level1Table, Level2, Level2Table};

mod fmt;
pub mod table;

pub const VA_BITS: u32 = 39;
pub const HIGHER_HALF_BASE: VirtualAddress = VirtualAddress(0xffff_ffa0_0000_0000);
pub const BLOCK_SIZE: usize = Level2::BLOCK_SIZE as usize;
pub const WINDOW_SIZE: usize = table::Level1::BLOCK_SIZE as usize;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Level2Id {
    Identity,
    HigherHalf,
    Device,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageMapping {
    pub identity_slot: usize,
    pub higher_half_slot: usize,
    pub blocks: usize,
    /// The image runs past the end of its 1 GiB window. Only the load window's level 1 slot
    /// is installed, so the identity blocks past the end wrapped to the low slots of the same
    /// level 2 table: those low addresses translate to the tail (VA != PA) and the tail's own
    /// identity addresses are unmapped. The higher half is only affected from 1 GiB of image
    /// upwards.
    pub crosses_window: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceMapping {
    /// The window was empty and got the dedicated device table.
    Dedicated { slot: usize },
    /// The window already had a table (the identity image table), the block went there.
    SharedWindow { table: Level2Id, slot: usize },
    /// The 2 MiB slot was already an image block and was left alone.
    AlreadyMapped { table: Level2Id, slot: usize },
    /// The level 1 slot points at something that isn't one of ours.
    Foreign { window: usize },
}

impl DeviceMapping {
    /// Whether the device is now reachable through the identity map as Device memory.
    pub fn is_device_memory(&self) -> bool {
        matches!(self, DeviceMapping::Dedicated { .. } | DeviceMapping::SharedWindow { .. })
    }
}

#[repr(C)]
pub struct BootTables {
    level1: Level1Table,
    identity: Level2Table,
    higher_half: Level2Table,
    device: Level2Table,
}

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
#[no_mangle]
static mut BOOT_TABLES: BootTables = BootTables::new();

/// # Safety
/// Boot core only, and nothing else may hold a reference into the tables. The result is the
/// table memory at whatever address the image currently runs at, which is the physical one
/// before the handoff.
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub(crate) unsafe fn boot_tables() -> &'static mut BootTables {
    &mut *core::ptr::addr_of_mut!(BOOT_TABLES)
}

impl BootTables {
    pub const fn new() -> Self {
        BootTables {
            level1: Level1Table::new(),
            identity: Level2Table::new(),
            higher_half: Level2Table::new(),
            device: Level2Table::new(),
        }
    }

    pub fn level1(&self) -> &Level1Table {
        &self.level1
    }

    pub fn level2(&self, id: Level2Id) -> &Level2Table {
        match id {
            Level2Id::Identity => &self.identity,
            Level2Id::HigherHalf => &self.higher_half,
            Level2Id::Device => &self.device,
        }
    }

    fn level2_mut(&mut self, id: Level2Id) -> &mut Level2Table {
        match id {
            Level2Id::Identity => &mut self.identity,
            Level2Id::HigherHalf => &mut self.higher_half,
            Level2Id::Device => &mut self.device,
        }
    }

    /// What goes into TTBR0_EL1 and TTBR1_EL1.
    pub fn level1_phys(&self) -> PhysicalAddress {
        self.level1.physical_address()
    }

    pub fn level2_phys(&self, id: Level2Id) -> PhysicalAddress {
        self.level2(id).physical_address()
    }

    fn level2_at(&self, phys: PhysicalAddress) -> Option<Level2Id> {
        [Level2Id::Identity, Level2Id::HigherHalf, Level2Id::Device]
            .into_iter()
            .find(|&id| self.level2_phys(id) == phys)
    }

    /// Maps the image twice: at its physical address and at `HIGHER_HALF_BASE`, in matching
    /// 2 MiB strides. Overwrites the two level 1 slots, so it has to run before
    /// [`map_device`](Self::map_device).
    pub fn map_image(&mut self, request: MappingRequest) -> ImageMapping {
        let MappingRequest { load_addr, image_size } = request;
        let identity_slot = level1_index(load_addr.0);
        let higher_half_slot = level1_index(HIGHER_HALF_BASE.0);

        let identity_phys = self.level2_phys(Level2Id::Identity);
        let higher_half_phys = self.level2_phys(Level2Id::HigherHalf);
        self.level1.force_insert(identity_phys, identity_slot);
        self.level1.force_insert(higher_half_phys, higher_half_slot);

        let mut offset = 0;
        let mut blocks = 0;
        while image_size - offset >= BLOCK_SIZE {
            let phys = load_addr + offset;
            let identity = VirtualAddress::identity(phys);
            let higher = HIGHER_HALF_BASE + offset;

            self.identity
                .force_insert_block(phys, level2_index(identity.0), AttributeClass::Normal);
            self.higher_half
                .force_insert_block(phys, level2_index(higher.0), AttributeClass::Normal);

            offset += BLOCK_SIZE;
            blocks += 1;
        }

        ImageMapping {
            identity_slot,
            higher_half_slot,
            blocks,
            crosses_window: (load_addr.0 % WINDOW_SIZE) + blocks * BLOCK_SIZE > WINDOW_SIZE,
        }
    }

    /// Identity maps the 2 MiB block holding `device_base` as Device memory.
    pub fn map_device(&mut self, device_base: PhysicalAddress) -> DeviceMapping {
        let window = level1_index(device_base.0);
        let slot = level2_index(device_base.0);

        let existing = *self.level1.entry(window);
        let id = match existing.table_address() {
            None => {
                let device_phys = self.level2_phys(Level2Id::Device);
                self.level1.force_insert(device_phys, window);
                self.device.force_insert_block(device_base, slot, AttributeClass::Device);
                return DeviceMapping::Dedicated { slot };
            }
            Some(phys) => match self.level2_at(phys) {
                Some(id) => id,
                None => return DeviceMapping::Foreign { window },
            },
        };

        match self.level2_mut(id).insert_block(device_base, slot, AttributeClass::Device) {
            Ok(()) => DeviceMapping::SharedWindow { table: id, slot },
            Err(()) => DeviceMapping::AlreadyMapped { table: id, slot },
        }
    }

    /// Walks the boot tables the way the MMU would, without the TLB.
    pub fn translate(&self, virt: VirtualAddress) -> Option<PhysicalAddress> {
        let top = virt.0 >> VA_BITS;
        if top != 0 && top != usize::MAX >> VA_BITS {
            return None;
        }

        let table = self.level1.entry(table::Level1::index(virt)).table_address()?;
        let id = self.level2_at(table)?;
        let block = self.level2(id).entry(Level2::index(virt)).block_address()?;
        Some(block + (virt.0 & (BLOCK_SIZE - 1)))
    }
}

impl Default for BootTables {
    fn default() -> Self {
        Self::new()
    }
}
