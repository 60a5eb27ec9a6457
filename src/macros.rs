//! Logging macros
//!
//! Forward to [`defmt`] when the `defmt` feature is enabled. Host tests and builds
//! without the feature evaluate the arguments and drop them, so the format strings
//! must stay valid for `defmt` (plain `{}` placeholders with `defmt::Format` args).

#[cfg(all(not(test), feature = "defmt"))]
mod with_defmt {
    macro_rules! debug {
        ($($arg:tt)*) => { defmt::debug!($($arg)*) };
    }

    macro_rules! info {
        ($($arg:tt)*) => { defmt::info!($($arg)*) };
    }

    macro_rules! warn {
        ($($arg:tt)*) => { defmt::warn!($($arg)*) };
    }

    pub(crate) use {debug, info, warn};
}

#[cfg(any(test, not(feature = "defmt")))]
mod without_defmt {
    macro_rules! debug {
        ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
    }

    macro_rules! info {
        ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
    }

    macro_rules! warn {
        ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
    }

    pub(crate) use {debug, info, warn};
}

#[cfg(all(not(test), feature = "defmt"))]
pub(crate) use with_defmt::*;
#[cfg(any(test, not(feature = "defmt")))]
pub(crate) use without_defmt::*;
