//! Utilities to configure and read the performance monitoring unit of Apple-silicon cores.
//!
//! The PMU is driven entirely through core-local system registers. `Pmu` sequences accesses to
//! those registers over any `RegisterBank`: the hardware bank on aarch64, or the in-memory
//! `sim::SimulatedBank`.

#![deny(missing_docs, missing_debug_implementations)]

mod errors;
pub use errors::{Error, Result};

pub mod bits;

pub mod regs;
pub use regs::{CounterIndex, InterruptMode, Register, RegisterBank, NUM_COUNTERS};

pub mod pmu;
pub use pmu::{CounterSnapshot, Pmu, PmuConfig};

pub mod sim;

pub mod cpu;

#[cfg(target_os = "linux")]
pub mod percpu;

/// Architecture specific implementation details of performance counters:
#[cfg(target_arch = "aarch64")]
#[path = "arch/aarch64/mod.rs"]
pub mod arch;

mod global;
pub use global::*;
