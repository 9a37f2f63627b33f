//! Runtime facade shared by the JoyNet crates.
//!
//! Everything async in the workspace goes through the re-exports here so that the runtime, the lock
//! flavour and the timer primitive are chosen in one place.
#![forbid(unsafe_code)]

pub mod standard;
pub mod timer;

pub use standard::locks::*;
pub use standard::spawn::*;

#[cfg(feature = "deadlock-detection")]
pub use parking_lot::deadlock;

pub use tokio;
pub use tokio_util;

/// Cancels every task tied to a single group session at once
pub use tokio_util::sync::CancellationToken;
