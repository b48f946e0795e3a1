//! Process-wide entry points bound to the current core's hardware registers.
//!
//! Each function acts on whichever core the caller runs on. Applying a configuration to every
//! core means calling it once per core, pinned there; see `percpu::on_each_cpu`.
//!
//! Counter reads share a single process-wide snapshot guarded by a mutex. The register entry
//! points only exist on aarch64; the snapshot can also be filled from any other `RegisterBank`
//! through `read_all_counters_with`.

#[cfg(target_arch = "aarch64")]
use crate::arch::SysRegBank;
#[cfg(target_arch = "aarch64")]
use crate::pmu::PmuConfig;
use crate::pmu::{CounterSnapshot, Pmu};
use crate::regs::{CounterIndex, RegisterBank};
use crate::Result;
use lazy_static::lazy_static;
use std::convert::TryFrom;
use std::sync::{Mutex, MutexGuard};

lazy_static! {
    static ref SNAPSHOT: Mutex<CounterSnapshot> = Mutex::new(CounterSnapshot::default());
}

fn lock_snapshot() -> MutexGuard<'static, CounterSnapshot> {
    // At worst a panicking reader leaves a torn snapshot behind.
    SNAPSHOT.lock().unwrap_or_else(|e| e.into_inner())
}

/// # Safety
///
/// See `SysRegBank::new`.
#[cfg(target_arch = "aarch64")]
unsafe fn current_core() -> Pmu<SysRegBank> {
    Pmu::with_config(SysRegBank::new(), PmuConfig::from_env())
}

/// Arm the current core's PMU with the configuration from `PmuConfig::from_env`.
///
/// # Safety
///
/// Must run at EL1.
#[cfg(target_arch = "aarch64")]
pub unsafe fn pmu_enable() {
    current_core().enable()
}

/// Quiesce and zero the current core's PMU.
///
/// # Safety
///
/// Must run at EL1.
#[cfg(target_arch = "aarch64")]
pub unsafe fn pmu_disable() {
    current_core().disable()
}

/// Select `event_id` for every configurable counter of the current core.
///
/// # Safety
///
/// The current core must allow PMU access at the caller's exception level.
#[cfg(target_arch = "aarch64")]
pub unsafe fn set_event_id(event_id: u8) {
    current_core().set_event_id(event_id)
}

/// Start every counter of the current core.
///
/// # Safety
///
/// The current core must allow PMU access at the caller's exception level.
#[cfg(target_arch = "aarch64")]
pub unsafe fn enable_all_counters() {
    current_core().enable_all_counters()
}

/// Stop every counter of the current core.
///
/// # Safety
///
/// The current core must allow PMU access at the caller's exception level.
#[cfg(target_arch = "aarch64")]
pub unsafe fn disable_all_counters() {
    current_core().disable_all_counters()
}

/// Raise PMIs on overflow of any counter of the current core.
///
/// # Safety
///
/// The current core must allow PMU access at the caller's exception level.
#[cfg(target_arch = "aarch64")]
pub unsafe fn enable_pmi_for_all_counters() {
    current_core().enable_pmi_for_all_counters()
}

/// Stop raising PMIs on the current core.
///
/// # Safety
///
/// The current core must allow PMU access at the caller's exception level.
#[cfg(target_arch = "aarch64")]
pub unsafe fn disable_pmi_for_all_counters() {
    current_core().disable_pmi_for_all_counters()
}

/// Zero every counter of the current core.
///
/// # Safety
///
/// The current core must allow PMU access at the caller's exception level.
#[cfg(target_arch = "aarch64")]
pub unsafe fn clear_all_counters() {
    current_core().clear_all_counters()
}

/// Copy the current core's counters into the process-wide snapshot.
///
/// # Safety
///
/// The current core must allow PMU access at the caller's exception level.
#[cfg(target_arch = "aarch64")]
pub unsafe fn read_all_counters() {
    read_all_counters_with(&current_core());
}

/// Read the current core's counters and print them.
///
/// # Safety
///
/// The current core must allow PMU access at the caller's exception level.
#[cfg(target_arch = "aarch64")]
pub unsafe fn print_all_counters() {
    let mut snapshot = lock_snapshot();
    current_core().read_all_counters_into(&mut snapshot);
    print!("{}", *snapshot);
}

/// Copy the counters of `pmu` into the process-wide snapshot.
pub fn read_all_counters_with<B: RegisterBank>(pmu: &Pmu<B>) {
    let mut snapshot = lock_snapshot();
    pmu.read_all_counters_into(&mut snapshot);
}

/// Value of counter `index` in the process-wide snapshot.
pub fn get_counter(index: usize) -> Result<u64> {
    let idx = CounterIndex::try_from(index)?;
    Ok(lock_snapshot().get(idx))
}

/// Copy of the process-wide snapshot.
pub fn snapshot() -> CounterSnapshot {
    *lock_snapshot()
}
