//! The relay facade every peer link talks through
use async_trait::async_trait;
use auto_impl::auto_impl;
use joynet_types::prelude::*;

/// Relays negotiation payloads to remote members and serves the ICE configuration.
///
/// Implementations hold no per-session state. `peer` is always the *recipient* of the relayed payload.
#[async_trait]
#[auto_impl(Arc, Box)]
pub trait SignalingClient: Send + Sync {
    /// Fetches and validates the ICE configuration. Fails with [`ChatError::ConfigFetch`]
    async fn fetch_ice_config(&self) -> Result<IceConfig, ChatError>;
    /// Relays an SDP offer. Fails with [`ChatError::SignalingSend`]
    async fn send_offer(
        &self,
        offer: &SessionDescription,
        peer: &MemberId,
        group: &GroupId,
    ) -> Result<(), ChatError>;
    /// Relays an SDP answer. Fails with [`ChatError::SignalingSend`]
    async fn send_answer(
        &self,
        answer: &SessionDescription,
        peer: &MemberId,
        group: &GroupId,
    ) -> Result<(), ChatError>;
    /// Relays a locally gathered ICE candidate. Fails with [`ChatError::SignalingSend`]
    async fn send_ice_candidate(
        &self,
        candidate: &IceCandidate,
        peer: &MemberId,
        group: &GroupId,
    ) -> Result<(), ChatError>;
    /// Asks the server to help re-establish a dropped link
    async fn request_reconnect(&self, peer: &MemberId, group: &GroupId) -> Result<(), ChatError>;
}
