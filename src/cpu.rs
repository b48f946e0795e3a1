//! Identification of the CPU from its main ID register, MIDR_EL1.
//!
//! Linux exports the register of each core under
//! `/sys/devices/system/cpu/cpuN/regs/identification/midr_el1`.

use crate::bits::BitRange;
use crate::{Error, Result};
use derive_more::{From, Into};
use log::debug;

const IMPLEMENTER: BitRange = BitRange::new(31, 24);
const VARIANT: BitRange = BitRange::new(23, 20);
const ARCHITECTURE: BitRange = BitRange::new(19, 16);
const PART_NUM: BitRange = BitRange::new(15, 4);
const REVISION: BitRange = BitRange::new(3, 0);

/// Implementer code assigned to Apple.
pub const IMPLEMENTER_APPLE: u64 = 0x61;

/// Decoded value of MIDR_EL1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, From, Into)]
pub struct Midr(u64);

impl Midr {
    /// Implementer code.
    pub fn implementer(self) -> u64 {
        IMPLEMENTER.get(self.0)
    }

    /// Major revision.
    pub fn variant(self) -> u64 {
        VARIANT.get(self.0)
    }

    /// Architecture code.
    pub fn architecture(self) -> u64 {
        ARCHITECTURE.get(self.0)
    }

    /// Implementer-defined part number.
    pub fn part_num(self) -> u64 {
        PART_NUM.get(self.0)
    }

    /// Minor revision.
    pub fn revision(self) -> u64 {
        REVISION.get(self.0)
    }

    /// Whether this is an Apple core, the only PMU this crate programs.
    pub fn is_apple(self) -> bool {
        self.implementer() == IMPLEMENTER_APPLE
    }
}

impl std::str::FromStr for Midr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        Ok(Midr(u64::from_str_radix(hex, 16)?))
    }
}

impl std::fmt::Display for Midr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let vendor = if self.is_apple() { "Apple" } else { "Unknown" };
        write!(
            f,
            "{}-{:#x}-r{}p{}",
            vendor,
            self.part_num(),
            self.variant(),
            self.revision()
        )
    }
}

/// Read MIDR_EL1 of `cpu` from sysfs.
pub fn read_midr(cpu: usize) -> Result<Midr> {
    let path = format!(
        "/sys/devices/system/cpu/cpu{}/regs/identification/midr_el1",
        cpu
    );
    std::fs::read_to_string(path)?.parse()
}

/// Get CPU model string of the boot CPU.
pub fn get_cpu_string() -> Result<String> {
    let cpu = read_midr(0)?.to_string();
    debug!("Detected aarch64 processor - {}", cpu);
    Ok(cpu)
}

/// Fail unless `cpu` is an Apple core.
pub fn ensure_apple(cpu: usize) -> Result<Midr> {
    let midr = read_midr(cpu)?;
    if midr.is_apple() {
        Ok(midr)
    } else {
        Err(Error::UnsupportedCpu(midr.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_firestorm() {
        let midr: Midr = "0x00000000611f0231\n".parse().unwrap();
        assert_eq!(midr.implementer(), 0x61);
        assert_eq!(midr.variant(), 1);
        assert_eq!(midr.architecture(), 0xf);
        assert_eq!(midr.part_num(), 0x23);
        assert_eq!(midr.revision(), 1);
        assert!(midr.is_apple());
        assert_eq!(midr.to_string(), "Apple-0x23-r1p1");
    }

    #[test]
    fn test_decode_other_vendor() {
        // Cortex-A72
        let midr = Midr::from(0x410f_d083);
        assert!(!midr.is_apple());
        assert_eq!(midr.part_num(), 0xd08);
        assert_eq!(u64::from(midr), 0x410f_d083);
        assert!("not-hex".parse::<Midr>().is_err());
    }
}
