//! Logging macros that respect a per-module `ENABLE_LOGS` switch.
//!
//! A module opts in by declaring the flag and importing the macros:
//!
//! ```text
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_info, log_warn};
//! ```
//!
//! The background session loops use these so a noisy channel can be muted
//! without touching `RUST_LOG`.

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}
