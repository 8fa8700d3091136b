//! Logging shims.
//!
//! Forward to the `log` crate when the `log` feature is enabled and expand to
//! nothing otherwise, so the driver can log from interrupt context without
//! pulling in a logger on targets that have none.

#![allow(unused_macros)]

#[cfg(feature = "log")]
macro_rules! trace {
    ($($arg:expr),* $(,)?) => { ::log::trace!($($arg),*) };
}

#[cfg(feature = "log")]
macro_rules! debug {
    ($($arg:expr),* $(,)?) => { ::log::debug!($($arg),*) };
}

#[cfg(feature = "log")]
macro_rules! info {
    ($($arg:expr),* $(,)?) => { ::log::info!($($arg),*) };
}

#[cfg(feature = "log")]
macro_rules! warn {
    ($($arg:expr),* $(,)?) => { ::log::warn!($($arg),*) };
}

#[cfg(feature = "log")]
macro_rules! error {
    ($($arg:expr),* $(,)?) => { ::log::error!($($arg),*) };
}

#[cfg(not(feature = "log"))]
macro_rules! trace {
    ($($arg:expr),* $(,)?) => { { $( let _ = &$arg; )* } };
}

#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:expr),* $(,)?) => { { $( let _ = &$arg; )* } };
}

#[cfg(not(feature = "log"))]
macro_rules! info {
    ($($arg:expr),* $(,)?) => { { $( let _ = &$arg; )* } };
}

#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($arg:expr),* $(,)?) => { { $( let _ = &$arg; )* } };
}

#[cfg(not(feature = "log"))]
macro_rules! error {
    ($($arg:expr),* $(,)?) => { { $( let _ = &$arg; )* } };
}
