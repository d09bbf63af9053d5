use core::fmt::Formatter;

use crate::fmt::ForceLowerHex;

use super::table::{BlockDescriptor, IntermediateLevel, IntermediateTableEntry};

pub fn debug_block<L: IntermediateLevel>(
    v: &IntermediateTableEntry<L>,
    f: &mut Formatter<'_>,
) -> core::fmt::Result {
    let flags = v.flags();
    f.debug_struct("Block")
        .field("address", &v.block_address())
        .field("attr", &v.attribute_class())
        .field("shareability", &v.shareability())
        .field("xn", &flags.contains(BlockDescriptor::XN))
        .field("pxn", &flags.contains(BlockDescriptor::PXN))
        .field("access", &flags.contains(BlockDescriptor::ACCESS))
        .field("not_global", &flags.contains(BlockDescriptor::NOT_GLOBAL))
        .field("raw", &ForceLowerHex(v.value()))
        .finish()
}
