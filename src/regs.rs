//! The PMU register file and the primitives used to access it.
//!
//! Every register here is core-local: a read or write only ever observes the bank of the core
//! executing it.

use crate::bits::{BitRange, Mask};
use crate::{Error, Result};
use std::convert::TryFrom;

/// Number of hardware counters.
pub const NUM_COUNTERS: usize = 10;

/// Index of one of the ten hardware counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CounterIndex(u8);

impl CounterIndex {
    /// All counters in increasing order.
    pub const ALL: [CounterIndex; NUM_COUNTERS] = [
        CounterIndex(0),
        CounterIndex(1),
        CounterIndex(2),
        CounterIndex(3),
        CounterIndex(4),
        CounterIndex(5),
        CounterIndex(6),
        CounterIndex(7),
        CounterIndex(8),
        CounterIndex(9),
    ];

    /// Position of this counter, `0..=9`.
    pub fn get(self) -> usize {
        self.0 as usize
    }

    /// Counter register backing this index.
    pub fn register(self) -> Register {
        Register::COUNTERS[self.get()]
    }
}

impl TryFrom<usize> for CounterIndex {
    type Error = Error;

    fn try_from(idx: usize) -> Result<Self> {
        CounterIndex::ALL
            .get(idx)
            .copied()
            .ok_or(Error::InvalidCounter(idx))
    }
}

impl std::fmt::Display for CounterIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PMC{}", self.0)
    }
}

/// PMU system registers of Apple cores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Register {
    Pmcr0,
    Pmcr1,
    Pmesr0,
    Pmesr1,
    Pmc0,
    Pmc1,
    Pmc2,
    Pmc3,
    Pmc4,
    Pmc5,
    Pmc6,
    Pmc7,
    Pmc8,
    Pmc9,
}

impl Register {
    /// Number of registers in the bank.
    pub const COUNT: usize = 14;

    /// Every register, in bank order.
    pub const ALL: [Register; Register::COUNT] = [
        Register::Pmcr0,
        Register::Pmcr1,
        Register::Pmesr0,
        Register::Pmesr1,
        Register::Pmc0,
        Register::Pmc1,
        Register::Pmc2,
        Register::Pmc3,
        Register::Pmc4,
        Register::Pmc5,
        Register::Pmc6,
        Register::Pmc7,
        Register::Pmc8,
        Register::Pmc9,
    ];

    /// Counter registers, PMC0 first.
    pub const COUNTERS: [Register; NUM_COUNTERS] = [
        Register::Pmc0,
        Register::Pmc1,
        Register::Pmc2,
        Register::Pmc3,
        Register::Pmc4,
        Register::Pmc5,
        Register::Pmc6,
        Register::Pmc7,
        Register::Pmc8,
        Register::Pmc9,
    ];

    /// Position of the register in `Register::ALL`.
    pub fn slot(self) -> usize {
        self as usize
    }

    /// The counter this register holds, if it is one of PMC0..PMC9.
    pub fn counter(self) -> Option<CounterIndex> {
        self.slot()
            .checked_sub(Register::Pmc0.slot())
            .and_then(|idx| CounterIndex::try_from(idx).ok())
    }

    /// Name as used in vendor documentation.
    pub fn name(self) -> &'static str {
        match self {
            Register::Pmcr0 => "PMCR0",
            Register::Pmcr1 => "PMCR1",
            Register::Pmesr0 => "PMESR0",
            Register::Pmesr1 => "PMESR1",
            Register::Pmc0 => "PMC0",
            Register::Pmc1 => "PMC1",
            Register::Pmc2 => "PMC2",
            Register::Pmc3 => "PMC3",
            Register::Pmc4 => "PMC4",
            Register::Pmc5 => "PMC5",
            Register::Pmc6 => "PMC6",
            Register::Pmc7 => "PMC7",
            Register::Pmc8 => "PMC8",
            Register::Pmc9 => "PMC9",
        }
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fields of the control register, PMCR0.
pub mod pmcr0 {
    use super::*;

    /// Count enable for PMC0..PMC7.
    pub const COUNTER_ENABLE_0_7: BitRange = BitRange::new(7, 0);
    /// Count enable for PMC8..PMC9.
    pub const COUNTER_ENABLE_8_9: BitRange = BitRange::new(33, 32);
    /// Interrupt mode selector, see `InterruptMode`.
    pub const INTERRUPT_MODE: BitRange = BitRange::new(10, 8);
    /// PMI enable for PMC0..PMC7.
    pub const PMI_ENABLE_0_7: BitRange = BitRange::new(19, 12);
    /// PMI enable for PMC8..PMC9.
    pub const PMI_ENABLE_8_9: BitRange = BitRange::new(45, 44);
    /// Freeze counting when a PMI is raised.
    pub const STOP_ON_PMI: BitRange = BitRange::bit(20);
    /// Hold PMIs until the next exception return.
    pub const DEFER_PMI_TO_ERET: BitRange = BitRange::bit(22);
    /// Count L2C events from every core, not just this one.
    pub const COUNT_GLOBAL_L2C: BitRange = BitRange::bit(23);
    /// Allow EL0 to access the PMU registers.
    pub const USER_ACCESS: BitRange = BitRange::bit(30);

    /// Every per-counter enable bit.
    pub const COUNTER_ENABLE: Mask = COUNTER_ENABLE_0_7
        .mask()
        .union(COUNTER_ENABLE_8_9.mask());
    /// Every per-counter PMI enable bit.
    pub const PMI_ENABLE: Mask = PMI_ENABLE_0_7.mask().union(PMI_ENABLE_8_9.mask());

    /// Enable bit of a single counter.
    pub fn counter_enable(idx: CounterIndex) -> Mask {
        split_bit(COUNTER_ENABLE_0_7, COUNTER_ENABLE_8_9, idx)
    }

    /// PMI enable bit of a single counter.
    pub fn pmi_enable(idx: CounterIndex) -> Mask {
        split_bit(PMI_ENABLE_0_7, PMI_ENABLE_8_9, idx)
    }
}

/// Fields of the mode register, PMCR1.
pub mod pmcr1 {
    use super::*;

    /// Count PMC0..PMC7 while at EL0 in A64 state.
    pub const EL0_A64_0_7: BitRange = BitRange::new(15, 8);
    /// Count PMC8..PMC9 while at EL0 in A64 state.
    pub const EL0_A64_8_9: BitRange = BitRange::new(41, 40);
    /// Count PMC0..PMC7 while at EL1 in A64 state.
    pub const EL1_A64_0_7: BitRange = BitRange::new(23, 16);
    /// Count PMC8..PMC9 while at EL1 in A64 state.
    pub const EL1_A64_8_9: BitRange = BitRange::new(49, 48);

    /// EL0 counting for every counter.
    pub const EL0_A64: Mask = EL0_A64_0_7.mask().union(EL0_A64_8_9.mask());
    /// EL1 counting for every counter.
    pub const EL1_A64: Mask = EL1_A64_0_7.mask().union(EL1_A64_8_9.mask());

    /// Bits arming a single counter at either level.
    pub fn counter_modes(idx: CounterIndex) -> Mask {
        split_bit(EL0_A64_0_7, EL0_A64_8_9, idx) | split_bit(EL1_A64_0_7, EL1_A64_8_9, idx)
    }
}

/// Layout of the event select registers, PMESR0 and PMESR1.
pub mod pmesr {
    use super::*;

    /// Number of 8-bit event fields packed in each register.
    pub const FIELDS: usize = 4;

    /// Field selecting the event of the `n`th counter served by a register.
    ///
    /// # Panics
    ///
    /// Panics if `n` is not below `FIELDS`.
    pub const fn field(n: usize) -> BitRange {
        assert!(n < FIELDS);
        BitRange::new(8 * n as u32 + 7, 8 * n as u32)
    }

    /// Register and field selecting the event for `idx`.
    ///
    /// PMC0 and PMC1 count fixed events and have no selector.
    pub fn selector(idx: CounterIndex) -> Option<(Register, BitRange)> {
        match idx.get() {
            i @ 2..=5 => Some((Register::Pmesr0, field(i - 2))),
            i @ 6..=9 => Some((Register::Pmesr1, field(i - 6))),
            _ => None,
        }
    }

    /// Pack `event_id` into every field of a register value.
    pub fn replicate(event_id: u8) -> u64 {
        (0..FIELDS).fold(0, |val, n| field(n).put(val, event_id as u64))
    }
}

/// Bit for counter `idx` in a field split into a low range for counters 0..7 and a high range
/// for counters 8..9.
fn split_bit(low: BitRange, high: BitRange, idx: CounterIndex) -> Mask {
    match idx.get() {
        i @ 0..=7 => BitRange::bit(low.lo() + i as u32).mask(),
        i => BitRange::bit(high.lo() + (i - 8) as u32).mask(),
    }
}

/// Interrupt delivery modes selectable in PMCR0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum InterruptMode {
    /// No interrupts are delivered.
    Off = 0,
    /// Performance monitor interrupt.
    Pmi = 1,
    /// Routed through the interrupt controller.
    Aic = 2,
    /// Halt the core.
    Halt = 3,
    /// Fast interrupt request.
    Fiq = 4,
}

/// Raw access to a core's PMU register bank.
///
/// Writes carry no ordering guarantee relative to each other until `barrier` is issued.
pub trait RegisterBank {
    /// Read `reg`.
    fn read(&self, reg: Register) -> u64;

    /// Write `value` to `reg`.
    fn write(&self, reg: Register, value: u64);

    /// Make every prior write visible before any later instruction executes.
    fn barrier(&self);
}

impl<B: RegisterBank + ?Sized> RegisterBank for &B {
    #[inline]
    fn read(&self, reg: Register) -> u64 {
        (**self).read(reg)
    }

    #[inline]
    fn write(&self, reg: Register, value: u64) {
        (**self).write(reg, value)
    }

    #[inline]
    fn barrier(&self) {
        (**self).barrier()
    }
}
