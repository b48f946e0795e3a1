//! Named bit ranges and masks within 64-bit system registers.

use derive_more::{BitAnd, BitOr, Display, From, Into, Not};

/// Generate a mask with bits `lo..=hi` set.
pub const fn genmask(hi: u32, lo: u32) -> u64 {
    (!0u64 - (1u64 << lo) + 1) & (!0u64 >> (63 - hi))
}

/// A set of bits within a register.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, BitAnd, BitOr, Not, From, Into, Display)]
#[display(fmt = "{:#018x}", _0)]
pub struct Mask(u64);

impl Mask {
    /// The empty mask.
    pub const EMPTY: Mask = Mask(0);

    /// Raw bits of the mask.
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Union of two masks, usable in constant expressions.
    pub const fn union(self, other: Mask) -> Mask {
        Mask(self.0 | other.0)
    }

    /// `value` with every bit of this mask set.
    pub const fn set_in(self, value: u64) -> u64 {
        value | self.0
    }

    /// `value` with every bit of this mask cleared.
    pub const fn clear_in(self, value: u64) -> u64 {
        value & !self.0
    }

    /// Bits of `value` that fall inside this mask.
    pub const fn select(self, value: u64) -> u64 {
        value & self.0
    }

    /// Whether any bit of this mask is set in `value`.
    pub const fn any_in(self, value: u64) -> bool {
        value & self.0 != 0
    }

    /// Whether every bit of this mask is set in `value`.
    pub const fn all_in(self, value: u64) -> bool {
        value & self.0 == self.0
    }
}

/// A contiguous field `lo..=hi` of a 64-bit register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitRange {
    hi: u32,
    lo: u32,
}

impl BitRange {
    /// Field spanning bits `lo..=hi`.
    pub const fn new(hi: u32, lo: u32) -> Self {
        assert!(hi < 64 && lo <= hi);
        BitRange { hi, lo }
    }

    /// Single-bit field.
    pub const fn bit(nr: u32) -> Self {
        BitRange::new(nr, nr)
    }

    /// Lowest bit of the field.
    pub const fn lo(&self) -> u32 {
        self.lo
    }

    /// Number of bits in the field.
    pub const fn width(&self) -> u32 {
        self.hi - self.lo + 1
    }

    /// Mask covering the field.
    pub const fn mask(&self) -> Mask {
        Mask(genmask(self.hi, self.lo))
    }

    /// Value held by the field in `reg`.
    pub const fn get(&self, reg: u64) -> u64 {
        (reg & genmask(self.hi, self.lo)) >> self.lo
    }

    /// `reg` with the field replaced by `value`; bits of `value` wider than the field are dropped.
    pub const fn put(&self, reg: u64, value: u64) -> u64 {
        let mask = genmask(self.hi, self.lo);
        (reg & !mask) | ((value << self.lo) & mask)
    }
}
