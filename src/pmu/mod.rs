//! Sequencing of the PMU register protocol.
//!
//! `Pmu` owns no hardware state of its own; it issues ordered accesses against a `RegisterBank`
//! and keeps the most recent counter snapshot. Every operation runs to completion on the calling
//! core, and each one that reconfigures the PMU ends with a barrier.

use crate::regs::{pmcr0, CounterIndex, Register, RegisterBank};
use log::{debug, warn};

mod config;
pub use config::{parse_event_id, PmuConfig};

mod snapshot;
pub use snapshot::CounterSnapshot;

/// Controller for the PMU of the core `bank` refers to.
#[derive(Debug)]
pub struct Pmu<B> {
    /// Registers being driven.
    bank: B,
    /// Values applied by `enable`.
    config: PmuConfig,
    /// Counts captured by the last `read_all_counters`.
    snapshot: CounterSnapshot,
}

impl<B: RegisterBank> Pmu<B> {
    /// Controller using the default configuration.
    pub fn new(bank: B) -> Self {
        Pmu::with_config(bank, PmuConfig::default())
    }

    /// Controller applying `config` on `enable`.
    pub fn with_config(bank: B, config: PmuConfig) -> Self {
        Pmu {
            bank,
            config,
            snapshot: CounterSnapshot::default(),
        }
    }

    /// Underlying register bank.
    pub fn bank(&self) -> &B {
        &self.bank
    }

    /// Configuration applied by `enable`.
    pub fn config(&self) -> &PmuConfig {
        &self.config
    }

    /// Arm the PMU: program PMCR0 then PMCR1, then barrier.
    ///
    /// Counters are left disabled; use `enable_all_counters` to start counting.
    pub fn enable(&self) {
        let control = self.config.pmcr0();
        let mode = self.config.pmcr1();
        self.bank.write(Register::Pmcr0, control);
        self.bank.write(Register::Pmcr1, mode);
        self.bank.barrier();
        debug!("PMU enabled: PMCR0={:#x} PMCR1={:#x}", control, mode);
    }

    /// Quiesce the PMU and zero every register.
    ///
    /// PMCR0 goes first so no interrupt source stays armed past the first write. Safe to call
    /// on a core that was never enabled.
    pub fn disable(&self) {
        self.bank.write(Register::Pmcr0, 0);
        self.bank.write(Register::Pmcr1, 0);
        self.bank.write(Register::Pmesr0, 0);
        self.bank.write(Register::Pmesr1, 0);
        for reg in Register::COUNTERS.iter() {
            self.bank.write(*reg, 0);
        }
        self.bank.barrier();
        debug!("PMU disabled");
    }

    /// Read-modify-write PMCR0 with `f`, then barrier.
    fn modify_control<F: FnOnce(u64) -> u64>(&self, f: F) {
        let val = self.bank.read(Register::Pmcr0);
        self.bank.write(Register::Pmcr0, f(val));
        self.bank.barrier();
    }

    /// Raise a PMI on overflow of any counter.
    pub fn enable_pmi_for_all_counters(&self) {
        self.modify_control(|val| pmcr0::PMI_ENABLE.set_in(val));
    }

    /// Stop raising PMIs on counter overflow.
    pub fn disable_pmi_for_all_counters(&self) {
        self.modify_control(|val| pmcr0::PMI_ENABLE.clear_in(val));
    }

    /// Start all ten counters.
    pub fn enable_all_counters(&self) {
        self.modify_control(|val| pmcr0::COUNTER_ENABLE.set_in(val));
    }

    /// Stop all ten counters.
    pub fn disable_all_counters(&self) {
        self.modify_control(|val| pmcr0::COUNTER_ENABLE.clear_in(val));
    }

    /// Select `event_id` for every configurable counter.
    ///
    /// The same id is written to all four fields of both PMESR0 and PMESR1. Counters must not
    /// run while their selectors change, so any that are enabled are stopped first and stay
    /// stopped. Clear them before the next read: they still hold counts of the previous event.
    pub fn set_event_id(&self, event_id: u8) {
        let control = self.bank.read(Register::Pmcr0);
        if pmcr0::COUNTER_ENABLE.any_in(control) {
            warn!(
                "Counters running while selecting event {:#x}; stopping them",
                event_id
            );
            self.bank
                .write(Register::Pmcr0, pmcr0::COUNTER_ENABLE.clear_in(control));
            self.bank.barrier();
        }
        let val = crate::regs::pmesr::replicate(event_id);
        self.bank.write(Register::Pmesr0, val);
        self.bank.write(Register::Pmesr1, val);
        self.bank.barrier();
        debug!("Selected event {:#x}", event_id);
    }

    /// Zero all ten counters.
    pub fn clear_all_counters(&self) {
        for reg in Register::COUNTERS.iter() {
            self.bank.write(*reg, 0);
        }
        self.bank.barrier();
    }

    /// Copy every counter into `snapshot`, PMC0 first.
    pub fn read_all_counters_into(&self, snapshot: &mut CounterSnapshot) {
        for idx in CounterIndex::ALL.iter() {
            snapshot.set(*idx, self.bank.read(idx.register()));
        }
    }

    /// Copy every counter into this controller's snapshot.
    pub fn read_all_counters(&mut self) -> &CounterSnapshot {
        let mut snapshot = self.snapshot;
        self.read_all_counters_into(&mut snapshot);
        self.snapshot = snapshot;
        &self.snapshot
    }

    /// Take a mutually consistent snapshot.
    ///
    /// Counting is paused around the reads and whichever counters were enabled before are
    /// enabled again afterwards.
    pub fn sample(&mut self) -> &CounterSnapshot {
        let running = pmcr0::COUNTER_ENABLE.select(self.bank.read(Register::Pmcr0));
        if running != 0 {
            self.disable_all_counters();
        }
        self.read_all_counters();
        if running != 0 {
            self.modify_control(|val| val | running);
        }
        &self.snapshot
    }

    /// Last captured value of counter `idx`.
    pub fn get_counter(&self, idx: CounterIndex) -> u64 {
        self.snapshot.get(idx)
    }

    /// Counts captured by the last read.
    pub fn snapshot(&self) -> &CounterSnapshot {
        &self.snapshot
    }

    /// Read every counter and print one line per counter.
    pub fn print_all_counters(&mut self) {
        print!("{}", self.read_all_counters());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::{pmcr1, pmesr, InterruptMode};
    use crate::sim::{Access, SimulatedBank};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn counts(bank: &SimulatedBank) -> Vec<u64> {
        Register::COUNTERS.iter().map(|r| bank.peek(*r)).collect()
    }

    #[test]
    fn test_enable_sequence() {
        init_logging();
        let bank = SimulatedBank::new();
        let pmu = Pmu::new(&bank);
        pmu.enable();
        assert_eq!(
            bank.accesses(),
            vec![
                Access::Write(Register::Pmcr0, PmuConfig::default().pmcr0()),
                Access::Write(Register::Pmcr1, PmuConfig::default().pmcr1()),
                Access::Barrier,
            ]
        );
        let control = bank.peek(Register::Pmcr0);
        assert!(pmcr0::USER_ACCESS.mask().all_in(control));
        assert_eq!(pmcr0::INTERRUPT_MODE.get(control), InterruptMode::Pmi as u64);
        assert!((pmcr1::EL0_A64 | pmcr1::EL1_A64).all_in(bank.peek(Register::Pmcr1)));
    }

    #[test]
    fn test_disable_sequence() {
        init_logging();
        let bank = SimulatedBank::new();
        let pmu = Pmu::new(&bank);
        pmu.disable();
        let mut expected: Vec<Access> = Register::ALL
            .iter()
            .map(|r| Access::Write(*r, 0))
            .collect();
        expected.push(Access::Barrier);
        assert_eq!(bank.accesses(), expected);
    }

    #[test]
    fn test_enable_disable_round_trip() {
        init_logging();
        let bank = SimulatedBank::new();
        // Leftovers from an earlier session
        bank.poke(Register::Pmesr1, 0xdead_beef);
        bank.poke(Register::Pmc4, 1234);

        let mut pmu = Pmu::new(&bank);
        pmu.enable();
        pmu.set_event_id(0x8c);
        pmu.enable_pmi_for_all_counters();
        pmu.enable_all_counters();
        bank.tick(100);
        pmu.disable();

        for reg in Register::ALL.iter() {
            assert_eq!(bank.peek(*reg), 0, "{} not cleared", reg);
        }

        // A second disable is harmless
        pmu.disable();
        assert!(Register::ALL.iter().all(|r| bank.peek(*r) == 0));

        // Nothing counts once disabled
        bank.tick(10);
        assert_eq!(pmu.read_all_counters().counts(), &[0; 10]);
    }

    #[test]
    fn test_clear_then_read_is_zero() {
        init_logging();
        let bank = SimulatedBank::new();
        for (n, reg) in Register::COUNTERS.iter().enumerate() {
            bank.poke(*reg, n as u64 + 1);
        }
        let mut pmu = Pmu::new(&bank);
        pmu.clear_all_counters();
        assert_eq!(pmu.read_all_counters().counts(), &[0; 10]);
    }

    #[test]
    fn test_set_event_id_fills_both_selectors() {
        init_logging();
        let bank = SimulatedBank::new();
        let pmu = Pmu::new(&bank);
        pmu.set_event_id(0x8c);
        for reg in [Register::Pmesr0, Register::Pmesr1].iter() {
            let val = bank.peek(*reg);
            for n in 0..pmesr::FIELDS {
                assert_eq!(pmesr::field(n).get(val), 0x8c);
            }
        }
        assert_eq!(bank.accesses().last(), Some(&Access::Barrier));
    }

    #[test]
    fn test_set_event_id_stops_running_counters() {
        init_logging();
        let bank = SimulatedBank::new();
        let pmu = Pmu::new(&bank);
        pmu.enable();
        pmu.enable_all_counters();
        bank.clear_log();

        pmu.set_event_id(0x02);
        let writes = bank.writes();
        assert_eq!(writes[0].0, Register::Pmcr0);
        assert!(!pmcr0::COUNTER_ENABLE.any_in(writes[0].1));
        // The enable bits were cleared and committed before any selector changed
        let accesses = bank.accesses();
        let cleared = accesses
            .iter()
            .position(|a| *a == Access::Write(Register::Pmcr0, writes[0].1))
            .unwrap();
        let selected = accesses
            .iter()
            .position(|a| matches!(a, Access::Write(Register::Pmesr0, _)))
            .unwrap();
        assert!(accesses[cleared..selected].contains(&Access::Barrier));
        assert!(!pmcr0::COUNTER_ENABLE.any_in(bank.peek(Register::Pmcr0)));
    }

    #[test]
    fn test_counter_enable_is_isolated() {
        init_logging();
        let bank = SimulatedBank::new();
        let pmu = Pmu::new(&bank);
        pmu.enable();
        pmu.enable_pmi_for_all_counters();
        let before = bank.peek(Register::Pmcr0);

        pmu.enable_all_counters();
        let during = bank.peek(Register::Pmcr0);
        assert!(pmcr0::COUNTER_ENABLE.all_in(during));
        assert_eq!(pmcr0::COUNTER_ENABLE.clear_in(during), before);

        pmu.disable_all_counters();
        assert_eq!(bank.peek(Register::Pmcr0), before);
    }

    #[test]
    fn test_pmi_enable_is_isolated() {
        init_logging();
        let bank = SimulatedBank::new();
        let pmu = Pmu::new(&bank);
        pmu.enable();
        pmu.enable_all_counters();
        let before = bank.peek(Register::Pmcr0);

        pmu.enable_pmi_for_all_counters();
        let during = bank.peek(Register::Pmcr0);
        assert!(pmcr0::PMI_ENABLE.all_in(during));
        assert_eq!(pmcr0::PMI_ENABLE.clear_in(during), before);

        pmu.disable_pmi_for_all_counters();
        let after = bank.peek(Register::Pmcr0);
        assert_eq!(after, before);
        assert!(pmcr0::COUNTER_ENABLE.all_in(after));
    }

    #[test]
    fn test_pmi_before_enable() {
        init_logging();
        let bank = SimulatedBank::new();
        let pmu = Pmu::new(&bank);
        pmu.enable_pmi_for_all_counters();
        assert_eq!(bank.peek(Register::Pmcr0), pmcr0::PMI_ENABLE.bits());
        // Global enable overwrites the control register wholesale
        pmu.enable();
        assert!(!pmcr0::PMI_ENABLE.any_in(bank.peek(Register::Pmcr0)));
    }

    #[test]
    fn test_end_to_end() {
        init_logging();
        let bank = SimulatedBank::new();
        let mut pmu = Pmu::new(&bank);
        pmu.enable();
        pmu.set_event_id(0x8c);
        pmu.clear_all_counters();
        pmu.enable_all_counters();
        bank.tick(1000);
        bank.count_event(0x8c, 25);
        pmu.disable_all_counters();
        // Work after the counters stopped is not counted
        bank.tick(1000);
        pmu.read_all_counters();

        let expected = [1000, 1000, 1025, 1025, 1025, 1025, 1025, 1025, 1025, 1025];
        for idx in CounterIndex::ALL.iter() {
            assert_eq!(pmu.get_counter(*idx), bank.peek(idx.register()));
            assert_eq!(pmu.get_counter(*idx), expected[idx.get()]);
        }
    }

    #[test]
    fn test_no_counts_for_previous_event() {
        init_logging();
        let bank = SimulatedBank::new();
        let mut pmu = Pmu::new(&bank);
        pmu.enable();
        pmu.set_event_id(0x8c);
        pmu.clear_all_counters();
        pmu.enable_all_counters();
        bank.count_event(0x8c, 5);

        pmu.set_event_id(0x02);
        bank.count_event(0x8c, 5);
        pmu.clear_all_counters();
        pmu.enable_all_counters();
        bank.count_event(0x8c, 7);
        bank.count_event(0x02, 3);
        pmu.read_all_counters();

        assert_eq!(&counts(&bank)[2..], &[3; 8]);
        assert_eq!(pmu.snapshot().counts()[2..], [3; 8]);
    }

    #[test]
    fn test_sample_restores_enable_bits() {
        init_logging();
        let bank = SimulatedBank::new();
        let mut pmu = Pmu::new(&bank);
        pmu.enable();
        pmu.enable_all_counters();
        bank.tick(9);
        let before = bank.peek(Register::Pmcr0);

        assert_eq!(pmu.sample().counts(), &[9; 10]);
        assert_eq!(bank.peek(Register::Pmcr0), before);
        bank.tick(1);
        assert_eq!(counts(&bank), vec![10; 10]);

        // Stopped counters stay stopped
        pmu.disable_all_counters();
        let stopped = bank.peek(Register::Pmcr0);
        pmu.sample();
        assert_eq!(bank.peek(Register::Pmcr0), stopped);
    }

    #[test]
    fn test_config_excludes_kernel() {
        init_logging();
        let bank = SimulatedBank::new();
        let pmu = Pmu::with_config(&bank, PmuConfig::build().count_kernel(false));
        pmu.enable();
        assert_eq!(bank.peek(Register::Pmcr1), pmcr1::EL0_A64.bits());
        assert!(!pmcr1::EL1_A64.any_in(pmu.config().pmcr1()));
    }

    #[test]
    fn test_serialized_snapshots() {
        init_logging();
        use rayon::prelude::*;
        use std::sync::Mutex;

        let bank = SimulatedBank::new();
        let pmu = Mutex::new(Pmu::new(&bank));
        {
            let pmu = pmu.lock().unwrap();
            pmu.enable();
            pmu.enable_all_counters();
        }
        (0..64u64).into_par_iter().for_each(|_| {
            let mut pmu = pmu.lock().unwrap();
            bank.tick(1);
            let snap = *pmu.read_all_counters();
            assert!(snap.counts().iter().all(|&c| c == snap.counts()[0]));
        });
        assert_eq!(pmu.lock().unwrap().snapshot().counts(), &[64; 10]);
    }
}
