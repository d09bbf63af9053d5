pub use crate::arch::vm::{DeviceMapping, ImageMapping};

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PhysicalAddress(pub usize);

impl<T> From<*const T> for PhysicalAddress {
    /// Only meaningful while translation is off or inside the identity window.
    fn from(ptr: *const T) -> Self {
        PhysicalAddress(ptr as usize)
    }
}

impl core::fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.0 <= 0xffff_ffff {
            write!(f, "0p{:08x}", self.0)
        } else {
            write!(f, "0p{:016x}", self.0)
        }
    }
}

impl core::ops::Add<usize> for PhysicalAddress {
    type Output = Self;
    fn add(self, rhs: usize) -> Self::Output {
        PhysicalAddress(self.0 + rhs)
    }
}

impl core::ops::AddAssign<usize> for PhysicalAddress {
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

impl core::ops::Sub<PhysicalAddress> for PhysicalAddress {
    type Output = usize;
    fn sub(self, rhs: PhysicalAddress) -> Self::Output {
        self.0 - rhs.0
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct VirtualAddress(pub usize);

impl VirtualAddress {
    /// The identity view of a physical address.
    pub const fn identity(phys: PhysicalAddress) -> Self {
        VirtualAddress(phys.0)
    }
}

impl core::fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.0 <= 0xffff_ffff {
            write!(f, "0v{:08x}", self.0)
        } else {
            write!(f, "0v{:016x}", self.0)
        }
    }
}

impl core::ops::Add<usize> for VirtualAddress {
    type Output = Self;
    fn add(self, rhs: usize) -> Self::Output {
        VirtualAddress(self.0 + rhs)
    }
}

impl core::ops::AddAssign<usize> for VirtualAddress {
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

impl core::ops::Sub<VirtualAddress> for VirtualAddress {
    type Output = usize;
    fn sub(self, rhs: VirtualAddress) -> Self::Output {
        self.0 - rhs.0
    }
}

/// Which MAIR_EL1 slot a block refers to. The discriminant is the attribute index.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AttributeClass {
    /// Device-nGnRnE
    Device = 0,
    /// Normal, inner and outer write-back cacheable
    Normal = 1,
}

impl AttributeClass {
    pub const fn mair_index(self) -> u64 {
        self as u64
    }

    pub const fn from_mair_index(idx: u64) -> Option<Self> {
        match idx {
            0 => Some(AttributeClass::Device),
            1 => Some(AttributeClass::Normal),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AddressRegion {
    pub base: PhysicalAddress,
    pub size: usize,
    pub class: AttributeClass,
}

impl AddressRegion {
    pub const fn normal(base: PhysicalAddress, size: usize) -> Self {
        AddressRegion { base, size, class: AttributeClass::Normal }
    }

    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress(self.base.0 + self.size)
    }

    pub const fn contains(&self, addr: PhysicalAddress) -> bool {
        addr.0 >= self.base.0 && addr.0 - self.base.0 < self.size
    }
}

/// What the loader hands us: where the image sits and how much of it to map.
///
/// `image_size` is expected to be a multiple of 2 MiB already. Nothing here
/// rounds it, so a short size leaves the tail of the image unmapped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MappingRequest {
    pub load_addr: PhysicalAddress,
    pub image_size: usize,
}

impl MappingRequest {
    pub const fn new(load_addr: PhysicalAddress, image_size: usize) -> Self {
        MappingRequest { load_addr, image_size }
    }

    pub const fn region(&self) -> AddressRegion {
        AddressRegion::normal(self.load_addr, self.image_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_debug_uses_short_form_below_4g() {
        assert_eq!(alloc_fmt(PhysicalAddress(0x4000_0000)), "0p40000000");
        assert_eq!(
            alloc_fmt(VirtualAddress(0xffff_ffa0_0000_0000)),
            "0vffffffa000000000"
        );
    }

    #[test]
    fn region_bounds() {
        let image = MappingRequest::new(PhysicalAddress(0x4000_0000), 0x40_0000).region();
        assert_eq!(image.class, AttributeClass::Normal);
        assert_eq!(image.end(), PhysicalAddress(0x4040_0000));
        assert!(image.contains(PhysicalAddress(0x403f_ffff)));
        assert!(!image.contains(PhysicalAddress(0x4040_0000)));
        assert!(!image.contains(PhysicalAddress(0x3fff_ffff)));
    }

    #[test]
    fn attribute_index_round_trips_through_mair_slot() {
        assert_eq!(AttributeClass::Device.mair_index(), 0);
        assert_eq!(AttributeClass::Normal.mair_index(), 1);
        assert_eq!(AttributeClass::from_mair_index(1), Some(AttributeClass::Normal));
        assert_eq!(AttributeClass::from_mair_index(5), None);
    }

    fn alloc_fmt(v: impl core::fmt::Debug) -> String {
        format!("{:?}", v)
    }
}
