//! Access to the implementation-defined PMU system registers of Apple cores.

use crate::regs::{Register, RegisterBank};
use std::arch::asm;

/// Read the system register with encoding `$sr`.
macro_rules! mrs {
    ($sr: literal) => {{
        let val: u64;
        unsafe {
            asm!(concat!("mrs {}, ", $sr), out(reg) val, options(nostack, preserves_flags));
        }
        val
    }};
}

/// Write `$val` to the system register with encoding `$sr`.
macro_rules! msr {
    ($sr: literal, $val: expr) => {{
        let val: u64 = $val;
        unsafe {
            asm!(concat!("msr ", $sr, ", {}"), in(reg) val, options(nostack, preserves_flags));
        }
    }};
}

/// Expand `$op!` with the encoding of `$reg`, plus any trailing arguments.
macro_rules! with_encoding {
    ($reg: expr, $op: ident $(, $arg: expr)?) => {
        match $reg {
            Register::Pmcr0 => $op!("s3_1_c15_c0_0" $(, $arg)?),
            Register::Pmcr1 => $op!("s3_1_c15_c1_0" $(, $arg)?),
            Register::Pmesr0 => $op!("s3_1_c15_c5_0" $(, $arg)?),
            Register::Pmesr1 => $op!("s3_1_c15_c6_0" $(, $arg)?),
            Register::Pmc0 => $op!("s3_2_c15_c0_0" $(, $arg)?),
            Register::Pmc1 => $op!("s3_2_c15_c1_0" $(, $arg)?),
            Register::Pmc2 => $op!("s3_2_c15_c2_0" $(, $arg)?),
            Register::Pmc3 => $op!("s3_2_c15_c3_0" $(, $arg)?),
            Register::Pmc4 => $op!("s3_2_c15_c4_0" $(, $arg)?),
            Register::Pmc5 => $op!("s3_2_c15_c5_0" $(, $arg)?),
            Register::Pmc6 => $op!("s3_2_c15_c6_0" $(, $arg)?),
            Register::Pmc7 => $op!("s3_2_c15_c7_0" $(, $arg)?),
            Register::Pmc8 => $op!("s3_2_c15_c9_0" $(, $arg)?),
            Register::Pmc9 => $op!("s3_2_c15_c10_0" $(, $arg)?),
        }
    };
}

/// Handle to the PMU register bank of whichever core is executing.
///
/// The handle carries no state; every access goes to the current core. Moving it to another
/// thread, or letting the scheduler migrate the thread, silently retargets it.
#[derive(Debug, Clone, Copy)]
pub struct SysRegBank {
    _private: (),
}

impl SysRegBank {
    /// Get a handle to the current core's PMU registers.
    ///
    /// # Safety
    ///
    /// The calling context must be allowed to execute the PMU `mrs`/`msr` instructions: either
    /// it runs at EL1, or PMCR0's userspace access bit has already been set on every core this
    /// thread may run on. Otherwise the first access traps.
    pub unsafe fn new() -> Self {
        SysRegBank { _private: () }
    }
}

impl RegisterBank for SysRegBank {
    #[inline]
    fn read(&self, reg: Register) -> u64 {
        with_encoding!(reg, mrs)
    }

    #[inline]
    fn write(&self, reg: Register, value: u64) {
        with_encoding!(reg, msr, value)
    }

    #[inline]
    fn barrier(&self) {
        unsafe {
            asm!("isb", options(nostack, preserves_flags));
        }
    }
}
