//! Utilities dealing with error handling in this crate.

use failure::Fail;

/// Errors produced by this crate.
///
/// Register accesses themselves never fail; these cover the surfaces around them.
#[derive(Debug, Fail)]
pub enum Error {
    /// Errors originating from calls to `std::io::*`.
    #[fail(display = "IO Error - {}", _0)]
    IO(#[cause] std::io::Error),
    /// Errors parsing Glob patterns.
    #[fail(display = "Glob Error - {}", _0)]
    GlobPattern(#[cause] glob::PatternError),
    /// Errors interating over entries in a glob.
    #[fail(display = "Glob Error - {}", _0)]
    GlobIter(#[cause] glob::GlobError),
    /// Errors caused by parsing integers from strings.
    #[fail(display = "Parse Error - {}", _0)]
    ParseInt(#[cause] std::num::ParseIntError),
    /// Errors originating from calls to `libc` or other system utilties.
    #[fail(display = "System Error - {}", _0)]
    System(#[cause] nix::Error),
    /// A counter index outside `0..=9`.
    #[fail(display = "No such counter - PMC{}", _0)]
    InvalidCounter(usize),
    /// The core is not one whose PMU this crate knows how to program.
    #[fail(display = "Unsupported CPU - {}", _0)]
    UnsupportedCpu(String),
    /// A closure dispatched to a CPU panicked before completing.
    #[fail(display = "Dispatch to cpu {} failed", _0)]
    DispatchFailed(usize),
}

macro_rules! error_from {
    ($et: ty => $cet: expr) => {
        impl From<$et> for Error {
            #[inline]
            fn from(err: $et) -> Self {
                $cet(err)
            }
        }
    };
}

error_from!(std::io::Error => Error::IO);
error_from!(glob::PatternError => Error::GlobPattern);
error_from!(glob::GlobError => Error::GlobIter);
error_from!(std::num::ParseIntError => Error::ParseInt);
error_from!(nix::Error => Error::System);

/// Result type used in this crate.
pub type Result<T> = std::result::Result<T, Error>;
