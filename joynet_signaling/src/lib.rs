//! The signaling side of JoyNet group chat.
//!
//! Two collaborators live here. [`SignalingClient`] is the stateless RPC facade over the signaling HTTP API,
//! shared read-only by every peer link of a session. [`SignalingSocket`] is the real-time channel the
//! signaling server pushes `join-group`/`offer`/`answer`/`ice-candidate` frames through. Both are traits so the
//! transport behind them stays an external concern; [`HttpSignalingClient`] and [`LocalSignalingSocket`] are
//! the implementations shipped with the crate.
#![deny(
    missing_docs,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    variant_size_differences,
    unused_features,
    unused_results
)]

pub mod client;
pub mod http;
pub mod socket;

pub use client::SignalingClient;
pub use http::HttpSignalingClient;
pub use socket::{LocalSignalingSocket, SignalingSocket};
