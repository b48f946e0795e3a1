//! An in-memory register bank for running the PMU protocol without the hardware.
//!
//! Direct reads and writes take effect immediately, as they do for a core reading back its own
//! system registers. The counting logic, however, only observes the control and event select
//! registers as of the most recent `barrier`, so a sequence that forgets a barrier is visible in
//! the counts it produces.

use crate::regs::{pmcr0, pmcr1, pmesr, CounterIndex, Register, RegisterBank};
use log::trace;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// A single access made to a `SimulatedBank`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Register read.
    Read(Register),
    /// Register write with the value written.
    Write(Register, u64),
    /// Instruction barrier.
    Barrier,
}

/// Configuration registers latched by a barrier.
#[derive(Clone, Copy, Debug, Default)]
struct Committed {
    pmcr0: u64,
    pmcr1: u64,
    pmesr0: u64,
    pmesr1: u64,
}

/// Simulated register bank of a single core.
#[derive(Debug, Default)]
pub struct SimulatedBank {
    /// Current register contents, indexed by `Register::slot`.
    regs: [AtomicU64; Register::COUNT],
    /// Configuration as seen by the counting logic.
    committed: Mutex<Committed>,
    /// Every access in program order.
    log: Mutex<Vec<Access>>,
}

impl SimulatedBank {
    /// Bank in the hardware reset state, every register zero.
    pub fn new() -> Self {
        SimulatedBank::default()
    }

    /// Current contents of `reg` without recording an access.
    pub fn peek(&self, reg: Register) -> u64 {
        self.regs[reg.slot()].load(Ordering::SeqCst)
    }

    /// Overwrite `reg` without recording an access.
    ///
    /// Useful to seed state left behind by an earlier session.
    pub fn poke(&self, reg: Register, value: u64) {
        self.regs[reg.slot()].store(value, Ordering::SeqCst);
    }

    /// Every access recorded so far.
    pub fn accesses(&self) -> Vec<Access> {
        self.log().clone()
    }

    /// Writes recorded so far, in order.
    pub fn writes(&self) -> Vec<(Register, u64)> {
        self.accesses()
            .into_iter()
            .filter_map(|a| match a {
                Access::Write(reg, val) => Some((reg, val)),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded accesses.
    pub fn clear_log(&self) {
        self.log().clear();
    }

    /// Advance every armed counter by `n`, as a workload of `n` cycles would.
    pub fn tick(&self, n: u64) {
        let state = *self.committed();
        CounterIndex::ALL
            .iter()
            .filter(|&&idx| armed(&state, idx))
            .for_each(|&idx| self.advance(idx, n));
    }

    /// Record `n` occurrences of `event_id`.
    ///
    /// Only the configurable counters (PMC2..PMC9) that are armed and select `event_id` advance.
    pub fn count_event(&self, event_id: u8, n: u64) {
        let state = *self.committed();
        CounterIndex::ALL
            .iter()
            .filter(|&&idx| armed(&state, idx))
            .filter(|&&idx| match pmesr::selector(idx) {
                Some((Register::Pmesr0, field)) => field.get(state.pmesr0) == event_id as u64,
                Some((_, field)) => field.get(state.pmesr1) == event_id as u64,
                None => false,
            })
            .for_each(|&idx| self.advance(idx, n));
    }

    fn advance(&self, idx: CounterIndex, n: u64) {
        self.regs[idx.register().slot()].fetch_add(n, Ordering::SeqCst);
    }

    // A panic on another thread mid-access leaves at worst a truncated log.
    fn log(&self) -> MutexGuard<'_, Vec<Access>> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn committed(&self) -> MutexGuard<'_, Committed> {
        self.committed.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, access: Access) {
        trace!("{:?}", access);
        self.log().push(access);
    }
}

/// Whether the counting logic would advance `idx` under `state`.
fn armed(state: &Committed, idx: CounterIndex) -> bool {
    pmcr0::counter_enable(idx).any_in(state.pmcr0) && pmcr1::counter_modes(idx).any_in(state.pmcr1)
}

impl RegisterBank for SimulatedBank {
    fn read(&self, reg: Register) -> u64 {
        self.record(Access::Read(reg));
        self.peek(reg)
    }

    fn write(&self, reg: Register, value: u64) {
        self.record(Access::Write(reg, value));
        self.poke(reg, value);
    }

    fn barrier(&self) {
        self.record(Access::Barrier);
        *self.committed() = Committed {
            pmcr0: self.peek(Register::Pmcr0),
            pmcr1: self.peek(Register::Pmcr1),
            pmesr0: self.peek(Register::Pmesr0),
            pmesr1: self.peek(Register::Pmesr1),
        };
    }
}
