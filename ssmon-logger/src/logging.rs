//! Unified logging support for ssmon-logger
//!
//! Call sites use the `ss_*!` macros instead of the `log` macros directly,
//! so the interception path compiles to nothing when the `log` feature is
//! off. Arguments are still type-checked in that configuration.

/// Unified trace-level logging
#[macro_export]
macro_rules! ss_trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        log::trace!($($arg)*);
        #[cfg(not(feature = "log"))]
        let _ = format_args!($($arg)*);
    }};
}

/// Unified debug-level logging
#[macro_export]
macro_rules! ss_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        log::debug!($($arg)*);
        #[cfg(not(feature = "log"))]
        let _ = format_args!($($arg)*);
    }};
}

/// Unified info-level logging
#[macro_export]
macro_rules! ss_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        log::info!($($arg)*);
        #[cfg(not(feature = "log"))]
        let _ = format_args!($($arg)*);
    }};
}

/// Unified warn-level logging
#[macro_export]
macro_rules! ss_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        log::warn!($($arg)*);
        #[cfg(not(feature = "log"))]
        let _ = format_args!($($arg)*);
    }};
}

/// Unified error-level logging
#[macro_export]
macro_rules! ss_error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        log::error!($($arg)*);
        #[cfg(not(feature = "log"))]
        let _ = format_args!($($arg)*);
    }};
}
