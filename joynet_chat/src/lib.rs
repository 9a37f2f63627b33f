//! Peer-to-peer group chat and video calls.
//!
//! A [`GroupChatBuilder`](crate::builder::GroupChatBuilder) produces a
//! [`PeerConnectionManager`](crate::manager::PeerConnectionManager) for one group. The manager keeps a full
//! mesh of peer links to the other members, relays negotiation through a
//! [`SignalingClient`](joynet_signaling::SignalingClient) and carries chat text over one data channel per
//! link. [`ChatViewModel`](crate::view_model::ChatViewModel) wires the manager to a signaling socket and is
//! what a chat screen talks to.
//!
//! ```no_run
//! use joynet_chat::prelude::*;
//! use joynet_rtc::simulator::{SimulatedConnector, SimulatedMediaDevices};
//! use joynet_signaling::LocalSignalingSocket;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let session = GroupSession::new("42", Member::new("alice", "Alice"), vec![Member::new("bob", "Bob")]);
//! let chat = GroupChatBuilder::default()
//!     .with_connector(SimulatedConnector::new())
//!     .with_media_devices(SimulatedMediaDevices::new())
//!     .build_view_model(session, LocalSignalingSocket::new())?;
//!
//! chat.open(Vec::new()).await?;
//! let _ = chat.send_text("hello").await?;
//! chat.close().await;
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]
#![deny(
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces
)]

pub mod builder;
pub mod constants;
pub mod events;
pub mod manager;
pub mod media;
pub mod message_channel;
pub mod peer_link;
pub mod session;
pub mod settings;
pub mod view_model;

pub mod prelude {
    pub use crate::builder::GroupChatBuilder;
    pub use crate::events::{ChatEvent, Notification};
    pub use crate::manager::{CallStartReport, PeerConnectionManager};
    pub use crate::media::{MediaState, RemoteStream};
    pub use crate::message_channel::SendReport;
    pub use crate::session::GroupSession;
    pub use crate::settings::ChatSettings;
    pub use crate::view_model::ChatViewModel;
    pub use joynet_types::prelude::*;
}
