// src/macros.rs

//! Crate-local logging macros.
//!
//! With the `logging` feature enabled every level forwards to `tracing`.
//! With it disabled, errors still reach stderr — failures on the ack and
//! delivery paths must stay visible — and the other levels compile to
//! nothing.

#![allow(unused_macros)]

#[cfg(feature = "logging")]
mod imp {
    macro_rules! log_error {
        ($($arg:tt)*) => { tracing::error!($($arg)*) };
    }

    macro_rules! log_warn {
        ($($arg:tt)*) => { tracing::warn!($($arg)*) };
    }

    macro_rules! log_info {
        ($($arg:tt)*) => { tracing::info!($($arg)*) };
    }

    macro_rules! log_debug {
        ($($arg:tt)*) => { tracing::debug!($($arg)*) };
    }

    pub(crate) use {log_debug, log_error, log_info, log_warn};
}

#[cfg(not(feature = "logging"))]
mod imp {
    macro_rules! log_error {
        ($($arg:tt)*) => { eprintln!($($arg)*) };
    }

    macro_rules! log_warn {
        ($($arg:tt)*) => {};
    }

    macro_rules! log_info {
        ($($arg:tt)*) => {};
    }

    macro_rules! log_debug {
        ($($arg:tt)*) => {};
    }

    pub(crate) use {log_debug, log_error, log_info, log_warn};
}

pub(crate) use imp::{log_debug, log_error, log_info, log_warn};
