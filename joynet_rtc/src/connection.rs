use crate::channel::DataChannel;
use crate::error::RtcError;
use crate::media::{LocalTrack, RemoteTrack};
use async_trait::async_trait;
use auto_impl::auto_impl;
use joynet_io::tokio::sync::mpsc::UnboundedReceiver;
use joynet_types::prelude::*;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct OfferOptions {
    /// Generate fresh ICE credentials so connectivity checks start over
    pub ice_restart: bool,
}

impl OfferOptions {
    pub fn ice_restart() -> Self {
        Self { ice_restart: true }
    }
}

/// Everything a peer connection reports asynchronously
pub enum PeerEvent {
    /// A local candidate was gathered and must be relayed to the remote peer
    IceCandidate(IceCandidate),
    IceConnectionStateChange(IceConnectionState),
    /// The remote peer opened a data channel
    DataChannel(Arc<dyn DataChannel>),
    Track(RemoteTrack),
}

impl std::fmt::Debug for PeerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IceCandidate(candidate) => write!(f, "IceCandidate({})", candidate.candidate),
            Self::IceConnectionStateChange(state) => write!(f, "IceConnectionStateChange({state})"),
            Self::DataChannel(channel) => write!(f, "DataChannel({})", channel.label()),
            Self::Track(track) => write!(f, "Track({:?})", track),
        }
    }
}

/// One peer-to-peer connection. Callbacks are surfaced as a typed [`PeerEvent`] stream instead of closures
#[async_trait]
#[auto_impl(Arc, Box)]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self, options: OfferOptions) -> Result<SessionDescription, RtcError>;
    async fn create_answer(&self) -> Result<SessionDescription, RtcError>;
    async fn set_local_description(&self, description: SessionDescription) -> Result<(), RtcError>;
    /// Accepts [`SdpType::Rollback`] to discard a remote offer that has not been answered
    async fn set_remote_description(&self, description: SessionDescription)
        -> Result<(), RtcError>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), RtcError>;
    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>, RtcError>;
    async fn add_track(&self, track: LocalTrack) -> Result<(), RtcError>;
    fn ice_connection_state(&self) -> IceConnectionState;
    /// Hands out the event stream. Only the first call returns `Some`
    fn take_events(&self) -> Option<UnboundedReceiver<PeerEvent>>;
    async fn close(&self) -> Result<(), RtcError>;
}

/// Creates peer connections for a session
#[async_trait]
#[auto_impl(Arc, Box)]
pub trait PeerConnector: Send + Sync {
    async fn connect(
        &self,
        config: &IceConfig,
        peer: &MemberId,
    ) -> Result<Arc<dyn PeerConnection>, RtcError>;
}
