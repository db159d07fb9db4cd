//! Thin logging wrappers, gated behind the `tracing` feature. Centralized here
//! instead of sprinkled with `#[cfg]` at each call site.

#[cfg(feature = "tracing")]
macro_rules! log_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {{}};
}

#[cfg(feature = "tracing")]
macro_rules! log_trace {
    ($($arg:tt)*) => { tracing::trace!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! log_trace {
    ($($arg:tt)*) => {{}};
}

pub(crate) use log_debug;
pub(crate) use log_trace;
