//! Logging facade.
//!
//! `fb_info!` and friends forward to `defmt` on target builds and to
//! `tracing` on host builds. With neither backend enabled the arguments are
//! still evaluated by reference so call sites stay warning-free.
//!
//! Format strings must be valid for both backends: plain `{}` placeholders
//! with integer, `bool` or `Display + defmt::Format` arguments.

macro_rules! fb_log {
    ($defmt:ident, $tracing:ident, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        defmt::$defmt!($fmt $(, $arg)*);
        #[cfg(feature = "tracing")]
        tracing::$tracing!($fmt $(, $arg)*);
        #[cfg(not(any(feature = "defmt", feature = "tracing")))]
        {
            $( let _ = &$arg; )*
        }
    }};
}

macro_rules! fb_debug {
    ($($t:tt)*) => { fb_log!(debug, debug, $($t)*) };
}

macro_rules! fb_info {
    ($($t:tt)*) => { fb_log!(info, info, $($t)*) };
}

macro_rules! fb_warn {
    ($($t:tt)*) => { fb_log!(warn, warn, $($t)*) };
}

macro_rules! fb_error {
    ($($t:tt)*) => { fb_log!(error, error, $($t)*) };
}
