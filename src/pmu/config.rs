//! Values programmed into the control and mode registers when the PMU is enabled.

use crate::regs::{pmcr0, pmcr1, InterruptMode};
use crate::Result;

/// Helper struct to build the PMCR0/PMCR1 values applied by `Pmu::enable`.
///
/// The defaults grant userspace access, count global L2C events, raise PMIs with counting
/// stopped and delivery deferred to exception return, and count at both EL0 and EL1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmuConfig {
    /// Allow EL0 to access the PMU registers.
    ///
    /// Defaults to `true`.
    user_access: bool,
    /// Count L2C events from every core.
    ///
    /// Defaults to `true`.
    count_global_l2c: bool,
    /// Interrupt delivery mode.
    ///
    /// Defaults to `InterruptMode::Pmi`.
    interrupt_mode: InterruptMode,
    /// Stop counting when a PMI is raised.
    ///
    /// Defaults to `true`.
    stop_on_pmi: bool,
    /// Defer PMIs until the next exception return.
    ///
    /// Defaults to `true`.
    defer_pmi_to_eret: bool,
    /// Count while executing at EL0.
    ///
    /// Defaults to `true`.
    count_user: bool,
    /// Count while executing at EL1.
    ///
    /// Defaults to `true`.
    count_kernel: bool,
}

impl Default for PmuConfig {
    fn default() -> Self {
        PmuConfig {
            user_access: true,
            count_global_l2c: true,
            interrupt_mode: InterruptMode::Pmi,
            stop_on_pmi: true,
            defer_pmi_to_eret: true,
            count_user: true,
            count_kernel: true,
        }
    }
}

macro_rules! builder_pattern {
    ($(#[$outer:meta])* $var_name: ident : $var_type: ty) => {
        builder_pattern!($(#[$outer])* $var_name => $var_name: $var_type);
    };
    ($(#[$outer:meta])* $name: ident => $var_name: ident : $var_type: ty) => {
        $(#[$outer])*
        pub fn $name(mut self, $var_name: $var_type) -> Self {
            self.$var_name = $var_name;
            self
        }
    };
}

impl PmuConfig {
    /// Construct a configuration starting from the defaults.
    pub fn build() -> Self {
        PmuConfig::default()
    }

    /// Defaults, adjusted by the environment.
    ///
    /// `PMU_EXCLUDE_KERNEL` disables EL1 counting and `PMU_EXCLUDE_USER` disables EL0 counting
    /// when set to any value.
    pub fn from_env() -> Self {
        PmuConfig::default()
            .count_kernel(std::env::var_os("PMU_EXCLUDE_KERNEL").is_none())
            .count_user(std::env::var_os("PMU_EXCLUDE_USER").is_none())
    }

    /// Value written to PMCR0.
    ///
    /// Counter enable and PMI enable bits are never set here; those are managed separately.
    pub fn pmcr0(&self) -> u64 {
        let flags = [
            (self.user_access, pmcr0::USER_ACCESS),
            (self.count_global_l2c, pmcr0::COUNT_GLOBAL_L2C),
            (self.stop_on_pmi, pmcr0::STOP_ON_PMI),
            (self.defer_pmi_to_eret, pmcr0::DEFER_PMI_TO_ERET),
        ];
        let val = flags
            .iter()
            .filter(|(on, _)| *on)
            .fold(0, |val, (_, field)| field.mask().set_in(val));
        pmcr0::INTERRUPT_MODE.put(val, self.interrupt_mode as u64)
    }

    /// Value written to PMCR1.
    pub fn pmcr1(&self) -> u64 {
        let mut val = 0;
        if self.count_user {
            val = pmcr1::EL0_A64.set_in(val);
        }
        if self.count_kernel {
            val = pmcr1::EL1_A64.set_in(val);
        }
        val
    }

    builder_pattern!(
        /// Allow or deny EL0 access to the PMU.
        user_access: bool
    );

    builder_pattern!(
        /// Count L2C events from every core.
        count_global_l2c: bool
    );

    builder_pattern!(
        /// Set the interrupt delivery mode.
        interrupt_mode: InterruptMode
    );

    builder_pattern!(
        /// Stop counting when a PMI is raised.
        stop_on_pmi: bool
    );

    builder_pattern!(
        /// Defer PMIs until the next exception return.
        defer_pmi_to_eret: bool
    );

    builder_pattern!(
        /// Count while executing at EL0.
        count_user: bool
    );

    builder_pattern!(
        /// Count while executing at EL1.
        count_kernel: bool
    );
}

/// Parse an event id written in decimal or as `0x`-prefixed hex.
pub fn parse_event_id(s: &str) -> Result<u8> {
    let s = s.trim();
    let id = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16)?,
        None => s.parse::<u8>()?,
    };
    Ok(id)
}
