//! Utilities specific to the aarch64 architecture.

mod sysreg;
pub use sysreg::*;
