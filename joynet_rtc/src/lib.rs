//! Transport seams for JoyNet group chat.
//!
//! The chat core never talks to a WebRTC stack directly. It goes through [`PeerConnector`],
//! [`PeerConnection`], [`DataChannel`] and [`MediaDevices`], whose asynchronous callbacks are delivered as
//! typed event streams. Two backends exist: [`simulator`], an in-memory stack with failure injection, and
//! `webrtc_rs` (behind the `webrtc` feature) on top of webrtc-rs.
#![forbid(unsafe_code)]

pub mod channel;
pub mod connection;
pub mod error;
pub mod media;
pub mod simulator;
#[cfg(feature = "webrtc")]
pub mod webrtc_rs;

pub mod prelude {
    pub use crate::channel::*;
    pub use crate::connection::*;
    pub use crate::error::RtcError;
    pub use crate::media::*;
}
