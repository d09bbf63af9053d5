use crate::vm::{AttributeClass, PhysicalAddress, VirtualAddress};
use bitflags::bitflags;
use core::{fmt::{Debug, Formatter}, marker::PhantomData};

pub const ENTRIES: usize = 512;
const INDEX_MASK: usize = ENTRIES - 1;
const TABLE_ADDRESS_MASK: u64 = 0x0000_FFFF_FFFF_F000;

bitflags! {
    pub struct TableDescriptor: u64 {
        const NS_TABLE = 1 << 63;
        const AP_TABLE = 0b11 << 61;
        const XN_TABLE = 1 << 60;
        const PXN_TABLE = 1 << 59;

        // [58:52] ignored. [51:48] res0. [47:12] next-level table address. [11:2] ignored.
        const ADDRESS_MASK = 0x0000_FFFF_FFFF_F000;

        const VALID = 1 << 0;
        const TABLE = 1 << 1;
    }
}

bitflags! {
    pub struct BlockDescriptor: u64 {
        // 63 ignored. [62:59] PBHA. [58:55] ignored.
        const XN = 1 << 54;
        const PXN = 1 << 53;
        const CONTIGUOUS = 1 << 52;
        const DIRTY = 1 << 51;
        const GUARDED = 1 << 50;

        // [49:48] res0.

        const NOT_GLOBAL = 1 << 11;
        const ACCESS = 1 << 10;
        const INNER_SHAREABLE = 0b11 << 8;
        const ACCESS_PERMISSIONS = 0b11 << 6;
        const NON_SECURE = 1 << 5;
        const ATTR_INDEX = 0b111 << 2;

        // bit 1 clear makes this a block rather than a table
        const VALID = 1 << 0;
    }
}

const ATTR_INDEX_SHIFT: u64 = 2;
const SHAREABILITY_SHIFT: u64 = 8;

pub trait IntermediateLevel: Copy {
    const VIRT_SHIFT_AMT: u64;
    /// The size in bytes of one block at this table level.
    const BLOCK_SIZE: u64;
    const BLOCK_ADDRESS_MASK: u64;

    fn index(virt: VirtualAddress) -> usize {
        (virt.0 >> Self::VIRT_SHIFT_AMT) & INDEX_MASK
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct Level1;
impl IntermediateLevel for Level1 {
    const VIRT_SHIFT_AMT: u64 = 30;
    // 1 GiB
    const BLOCK_SIZE: u64 = 0x4000_0000;
    const BLOCK_ADDRESS_MASK: u64 = 0x0000_FFFF_C000_0000;
}

#[derive(Copy, Clone, Debug, Default)]
pub struct Level2;
impl IntermediateLevel for Level2 {
    const VIRT_SHIFT_AMT: u64 = 21;
    // 2 MiB
    const BLOCK_SIZE: u64 = 0x0020_0000;
    const BLOCK_ADDRESS_MASK: u64 = 0x0000_FFFF_FFE0_0000;
}

/// Bits [38:30] of `addr`.
pub const fn level1_index(addr: usize) -> usize {
    (addr >> Level1::VIRT_SHIFT_AMT) & INDEX_MASK
}

/// Bits [29:21] of `addr`.
pub const fn level2_index(addr: usize) -> usize {
    (addr >> Level2::VIRT_SHIFT_AMT) & INDEX_MASK
}

pub const fn make_table_descriptor(child: PhysicalAddress) -> u64 {
    (child.0 as u64 & TABLE_ADDRESS_MASK)
        | TableDescriptor::VALID.bits()
        | TableDescriptor::TABLE.bits()
}

/// A level 2 block descriptor. Attribute index and shareability have to agree with the MAIR
/// layout the sequencer programs.
pub const fn make_block_descriptor(phys: PhysicalAddress, class: AttributeClass) -> u64 {
    let base = (phys.0 as u64 & Level2::BLOCK_ADDRESS_MASK)
        | BlockDescriptor::VALID.bits()
        | BlockDescriptor::ACCESS.bits()
        | (class.mair_index() << ATTR_INDEX_SHIFT);
    match class {
        AttributeClass::Normal => base | BlockDescriptor::INNER_SHAREABLE.bits(),
        // shareability is ignored for device memory, never execute from it
        AttributeClass::Device => base | BlockDescriptor::XN.bits() | BlockDescriptor::PXN.bits(),
    }
}

#[repr(C, align(4096))]
pub struct IntermediateTable<L: IntermediateLevel> {
    entries: [IntermediateTableEntry<L>; ENTRIES],
}

pub type Level1Table = IntermediateTable<Level1>;
pub type Level2Table = IntermediateTable<Level2>;

impl<L: IntermediateLevel> IntermediateTable<L> {
    pub const fn new() -> Self {
        Self {
            entries: [IntermediateTableEntry::<L>::new_invalid(); ENTRIES],
        }
    }

    /// Points slot `idx` at a next-level table, replacing whatever was there.
    pub fn force_insert(&mut self, next: PhysicalAddress, idx: usize) {
        self.entries[idx] = IntermediateTableEntry::new(next);
    }

    /// Returns Err(()) and leaves the slot alone if it is already valid.
    pub fn insert_block(
        &mut self,
        block: PhysicalAddress,
        idx: usize,
        class: AttributeClass,
    ) -> Result<(), ()> {
        if self.entries[idx].is_valid() {
            return Err(());
        }
        self.force_insert_block(block, idx, class);
        Ok(())
    }

    pub fn force_insert_block(&mut self, phys: PhysicalAddress, idx: usize, class: AttributeClass) {
        self.entries[idx] = IntermediateTableEntry::new_block(phys, class);
    }

    pub fn entry(&self, idx: usize) -> &IntermediateTableEntry<L> {
        &self.entries[idx]
    }

    pub fn valid_entries(&self) -> impl Iterator<Item = (usize, &IntermediateTableEntry<L>)> {
        self.entries.iter().enumerate().filter(|(_, e)| e.is_valid())
    }

    pub fn physical_address(&self) -> PhysicalAddress {
        PhysicalAddress::from(self as *const Self)
    }
}

impl<L: IntermediateLevel> Default for IntermediateTable<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: IntermediateLevel> PartialEq for IntermediateTable<L> {
    fn eq(&self, other: &Self) -> bool {
        self.entries.iter().zip(other.entries.iter()).all(|(a, b)| a.value == b.value)
    }
}

impl<L: IntermediateLevel> Debug for IntermediateTable<L> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.valid_entries()).finish()
    }
}

#[derive(Copy, Clone)]
#[repr(transparent)]
pub struct IntermediateTableEntry<L: IntermediateLevel> {
    value: u64,
    _marker: PhantomData<L>,
}

impl<L: IntermediateLevel> Debug for IntermediateTableEntry<L> {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        if !self.is_valid() {
            return write!(f, "{:?}", Option::<()>::None);
        }
        if let Some(table) = self.table_address() {
            return f.debug_tuple("Table").field(&table).finish();
        }
        super::fmt::debug_block(self, f)
    }
}

impl<L: IntermediateLevel> IntermediateTableEntry<L> {
    pub fn value(&self) -> u64 {
        self.value
    }

    fn new(phys: PhysicalAddress) -> Self {
        Self {
            value: make_table_descriptor(phys),
            _marker: PhantomData,
        }
    }

    fn new_block(phys: PhysicalAddress, class: AttributeClass) -> Self {
        let value = (make_block_descriptor(phys, class) & !Level2::BLOCK_ADDRESS_MASK)
            | (phys.0 as u64 & L::BLOCK_ADDRESS_MASK);
        Self {
            value,
            _marker: PhantomData,
        }
    }

    const fn new_invalid() -> Self {
        Self {
            value: 0,
            _marker: PhantomData,
        }
    }

    pub const fn is_valid(&self) -> bool {
        self.value & 1 == 1
    }

    pub fn is_table(&self) -> bool {
        self.value & 0b11 == 0b11
    }

    pub fn is_block(&self) -> bool {
        self.value & 0b11 == 0b01
    }

    pub fn table_address(&self) -> Option<PhysicalAddress> {
        match self.is_table() {
            true => Some(PhysicalAddress((self.value & TABLE_ADDRESS_MASK) as _)),
            false => None,
        }
    }

    pub fn block_address(&self) -> Option<PhysicalAddress> {
        match self.is_block() {
            true => Some(PhysicalAddress((self.value & L::BLOCK_ADDRESS_MASK) as _)),
            false => None,
        }
    }

    pub fn attribute_class(&self) -> Option<AttributeClass> {
        match self.is_block() {
            true => AttributeClass::from_mair_index(
                (self.value & BlockDescriptor::ATTR_INDEX.bits()) >> ATTR_INDEX_SHIFT,
            ),
            false => None,
        }
    }

    pub fn flags(&self) -> BlockDescriptor {
        BlockDescriptor::from_bits_truncate(self.value)
    }

    pub fn shareability(&self) -> u64 {
        (self.value & BlockDescriptor::INNER_SHAREABLE.bits()) >> SHAREABILITY_SHIFT
    }
}
