//! Translation regime programming.
//!
//! The register sequence is built as a list of [`SysRegOp`]s first and only executed on the
//! target, so the order and the values can be checked anywhere.

use aarch64_cpu::registers::{MAIR_EL1, SCTLR_EL1, TCR_EL1};

use super::vm::VA_BITS;
use crate::vm::PhysicalAddress;

/// T0SZ/T1SZ: the halves are 2^39 bytes each, so walks start at level 1.
pub const TXSZ: u64 = 64 - VA_BITS as u64;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Barrier {
    Isb,
    /// dsb ishst: prior stores are visible to every observer in the inner shareable domain
    DsbIshst,
    /// dsb ish: waits for the TLB maintenance before it to complete
    DsbIsh,
}

/// Whether SCTLR_EL1.I is set along with M and C.
///
/// The map path has historically been built both ways: turning on the instruction cache
/// before the vector table exists is fine on the cores we run on so far, but that has not
/// been checked on every target. The reset path always sets it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CachePolicy {
    DataOnly,
    DataAndInstruction,
}

impl CachePolicy {
    pub fn sctlr_bits(self) -> u64 {
        let data = SCTLR_EL1::M::Enable + SCTLR_EL1::C::Cacheable;
        match self {
            CachePolicy::DataOnly => data.value,
            CachePolicy::DataAndInstruction => (data + SCTLR_EL1::I::Cacheable).value,
        }
    }
}

#[cfg(feature = "early-icache")]
pub const MAP_CACHE_POLICY: CachePolicy = CachePolicy::DataAndInstruction;
#[cfg(not(feature = "early-icache"))]
pub const MAP_CACHE_POLICY: CachePolicy = CachePolicy::DataOnly;

pub const RESET_CACHE_POLICY: CachePolicy = CachePolicy::DataAndInstruction;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SysRegOp {
    Barrier(Barrier),
    WriteTcr(u64),
    WriteMair(u64),
    WriteTtbr0(PhysicalAddress),
    WriteTtbr1(PhysicalAddress),
    /// tlbi vmalle1is
    InvalidateTlb,
    /// Read-modify-write of SCTLR_EL1, OR-ing in the policy's bits.
    EnableMmu(CachePolicy),
}

pub fn tcr_value() -> u64 {
    (TCR_EL1::EPD0::EnableTTBR0Walks
        + TCR_EL1::EPD1::EnableTTBR1Walks
        + TCR_EL1::A1::TTBR0
        + TCR_EL1::IPS::Bits_40
        + TCR_EL1::IRGN0::WriteBack_ReadAlloc_WriteAlloc_Cacheable
        + TCR_EL1::IRGN1::WriteBack_ReadAlloc_WriteAlloc_Cacheable
        + TCR_EL1::ORGN0::WriteBack_ReadAlloc_WriteAlloc_Cacheable
        + TCR_EL1::ORGN1::WriteBack_ReadAlloc_WriteAlloc_Cacheable
        + TCR_EL1::SH0::Inner
        + TCR_EL1::SH1::Inner
        + TCR_EL1::T0SZ.val(TXSZ)
        + TCR_EL1::T1SZ.val(TXSZ)
        + TCR_EL1::TBI0::Used
        + TCR_EL1::TBI1::Used
        + TCR_EL1::TG0::KiB_4
        + TCR_EL1::TG1::KiB_4)
        .value
}

/// Attribute 0 is Device-nGnRnE, attribute 1 is Normal write-back. Block descriptors pick
/// these through [`AttributeClass`](crate::vm::AttributeClass).
pub fn mair_value() -> u64 {
    (MAIR_EL1::Attr0_Device::nonGathering_nonReordering_noEarlyWriteAck
        + MAIR_EL1::Attr1_Normal_Outer::WriteBack_NonTransient_ReadWriteAlloc
        + MAIR_EL1::Attr1_Normal_Inner::WriteBack_NonTransient_ReadWriteAlloc)
        .value
}

/// Everything between "tables are written" and "MMU is on".
pub fn map_sequence(level1: PhysicalAddress, policy: CachePolicy) -> [SysRegOp; 12] {
    [
        // table stores have to land before anything can walk them
        SysRegOp::Barrier(Barrier::DsbIshst),
        SysRegOp::WriteTcr(tcr_value()),
        SysRegOp::WriteMair(mair_value()),
        SysRegOp::WriteTtbr0(level1),
        SysRegOp::WriteTtbr1(level1),
        SysRegOp::InvalidateTlb,
        SysRegOp::Barrier(Barrier::DsbIsh),
        SysRegOp::Barrier(Barrier::Isb),
        SysRegOp::Barrier(Barrier::DsbIshst),
        SysRegOp::EnableMmu(policy),
        SysRegOp::Barrier(Barrier::DsbIshst),
        SysRegOp::Barrier(Barrier::Isb),
    ]
}

/// Turns translation back on from a level 1 table that [`map_sequence`] already published.
/// TTBR1 is left as it is.
pub fn reset_sequence(level1: PhysicalAddress) -> [SysRegOp; 10] {
    [
        SysRegOp::WriteTcr(tcr_value()),
        SysRegOp::WriteMair(mair_value()),
        SysRegOp::WriteTtbr0(level1),
        SysRegOp::InvalidateTlb,
        SysRegOp::Barrier(Barrier::DsbIsh),
        SysRegOp::Barrier(Barrier::Isb),
        SysRegOp::Barrier(Barrier::DsbIshst),
        SysRegOp::EnableMmu(RESET_CACHE_POLICY),
        SysRegOp::Barrier(Barrier::DsbIshst),
        SysRegOp::Barrier(Barrier::Isb),
    ]
}

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
impl SysRegOp {
    /// # Safety
    /// This is the MMU. A wrong value traps with no vector table to catch it.
    #[inline(always)]
    pub unsafe fn apply(self) {
        use aarch64_cpu::asm::barrier;
        use aarch64_cpu::registers::{Readable, Writeable, TTBR0_EL1, TTBR1_EL1};

        match self {
            SysRegOp::Barrier(Barrier::Isb) => barrier::isb(barrier::SY),
            SysRegOp::Barrier(Barrier::DsbIshst) => barrier::dsb(barrier::ISHST),
            SysRegOp::Barrier(Barrier::DsbIsh) => barrier::dsb(barrier::ISH),
            SysRegOp::WriteTcr(tcr) => TCR_EL1.set(tcr),
            SysRegOp::WriteMair(mair) => MAIR_EL1.set(mair),
            SysRegOp::WriteTtbr0(table) => TTBR0_EL1.set(table.0 as u64),
            SysRegOp::WriteTtbr1(table) => TTBR1_EL1.set(table.0 as u64),
            SysRegOp::InvalidateTlb => {
                core::arch::asm!("tlbi vmalle1is", options(nostack, preserves_flags))
            }
            SysRegOp::EnableMmu(policy) => {
                SCTLR_EL1.set(SCTLR_EL1.get() | policy.sctlr_bits())
            }
        }
    }
}

/// # Safety
/// See [`SysRegOp::apply`]. The ops run strictly in slice order.
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub unsafe fn execute(ops: &[SysRegOp]) {
    for op in ops {
        op.apply();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enable_position(ops: &[SysRegOp]) -> usize {
        let positions: Vec<usize> = ops
            .iter()
            .enumerate()
            .filter(|(_, op)| matches!(op, SysRegOp::EnableMmu(_)))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(positions.len(), 1, "exactly one SCTLR write");
        positions[0]
    }

    fn assert_bracketed(ops: &[SysRegOp]) {
        let i = enable_position(ops);
        assert_eq!(&ops[i - 2..i], &[
            SysRegOp::Barrier(Barrier::Isb),
            SysRegOp::Barrier(Barrier::DsbIshst),
        ]);
        assert_eq!(&ops[i + 1..i + 3], &[
            SysRegOp::Barrier(Barrier::DsbIshst),
            SysRegOp::Barrier(Barrier::Isb),
        ]);
    }

    #[test]
    fn tcr_selects_39_bit_halves_with_4k_granule() {
        let tcr = tcr_value();
        assert_eq!(TCR_EL1::T0SZ.read(tcr), 25);
        assert_eq!(TCR_EL1::T1SZ.read(tcr), 25);
        // TG0 and TG1 encode 4 KiB differently
        assert_eq!(TCR_EL1::TG0.read(tcr), 0b00);
        assert_eq!(TCR_EL1::TG1.read(tcr), 0b10);
        assert_eq!(TCR_EL1::SH0.read(tcr), 0b11);
        assert_eq!(TCR_EL1::SH1.read(tcr), 0b11);
        assert_eq!(TCR_EL1::IRGN1.read(tcr), 0b01);
        assert_eq!(TCR_EL1::ORGN0.read(tcr), 0b01);
        assert_eq!(TCR_EL1::EPD0.read(tcr), 0);
        assert_eq!(TCR_EL1::EPD1.read(tcr), 0);
    }

    #[test]
    fn mair_matches_attribute_classes() {
        use crate::vm::AttributeClass;

        let mair = mair_value();
        let attr = |class: AttributeClass| (mair >> (8 * class.mair_index())) & 0xff;
        assert_eq!(attr(AttributeClass::Device), 0x00);
        assert_eq!(attr(AttributeClass::Normal), 0xff);
        assert_eq!(mair, 0xff00);
    }

    #[test]
    fn map_sequence_order() {
        let l1 = PhysicalAddress(0x4008_0000);
        let ops = map_sequence(l1, CachePolicy::DataOnly);

        assert_eq!(ops[0], SysRegOp::Barrier(Barrier::DsbIshst));
        assert_eq!(ops[1], SysRegOp::WriteTcr(tcr_value()));
        assert_eq!(ops[2], SysRegOp::WriteMair(mair_value()));
        assert_eq!(ops[3], SysRegOp::WriteTtbr0(l1));
        assert_eq!(ops[4], SysRegOp::WriteTtbr1(l1));
        assert_eq!(ops[5], SysRegOp::InvalidateTlb);
        assert_eq!(ops[9], SysRegOp::EnableMmu(CachePolicy::DataOnly));
        assert_bracketed(&ops);
    }

    #[test]
    fn reset_sequence_reuses_level1_and_keeps_icache() {
        let l1 = PhysicalAddress(0x4008_0000);
        let ops = reset_sequence(l1);

        assert!(ops.contains(&SysRegOp::WriteTtbr0(l1)));
        assert!(!ops.iter().any(|op| matches!(op, SysRegOp::WriteTtbr1(_))));
        let tlbi = ops.iter().position(|op| *op == SysRegOp::InvalidateTlb).unwrap();
        let enable = enable_position(&ops);
        assert!(tlbi < enable);
        assert_eq!(ops[enable], SysRegOp::EnableMmu(CachePolicy::DataAndInstruction));
        assert_bracketed(&ops);
    }

    #[test]
    fn sctlr_bits_per_policy() {
        assert_eq!(CachePolicy::DataOnly.sctlr_bits(), (1 << 0) | (1 << 2));
        assert_eq!(
            CachePolicy::DataAndInstruction.sctlr_bits(),
            (1 << 0) | (1 << 2) | (1 << 12)
        );
    }

    #[test]
    fn map_path_cache_policy_follows_feature() {
        assert_eq!(
            MAP_CACHE_POLICY == CachePolicy::DataAndInstruction,
            cfg!(feature = "early-icache")
        );
    }
}
