//! An in-memory transport used by tests and local demos.
//!
//! Nothing here touches the network. Tests drive the remote side by hand: they push ICE state changes,
//! announce data channels, deliver frames, and inject failures into individual operations. Every call the
//! chat core makes is recorded so it can be asserted on afterwards.

use crate::channel::{ChannelEvent, DataChannel, DataChannelState};
use crate::connection::{OfferOptions, PeerConnection, PeerConnector, PeerEvent};
use crate::error::RtcError;
use crate::media::{
    LocalStream, LocalTrack, MediaConstraints, MediaDevices, RemoteTrack, TrackKind, TrackSource,
};
use async_trait::async_trait;
use joynet_io::tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use joynet_io::tokio::sync::Notify;
use joynet_io::Mutex;
use joynet_types::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Operations that can be made to fail or to wait in a [`SimulatedPeerConnection`]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SimulatedOp {
    CreateOffer,
    CreateAnswer,
    SetLocalDescription,
    SetRemoteDescription,
    AddIceCandidate,
    CreateDataChannel,
    AddTrack,
}

/// Hands out a fresh [`SimulatedPeerConnection`] per `connect` call and remembers all of them
#[derive(Default)]
pub struct SimulatedConnector {
    connections: Mutex<HashMap<MemberId, Vec<Arc<SimulatedPeerConnection>>>>,
    refused: Mutex<HashSet<MemberId>>,
    configs: Mutex<Vec<IceConfig>>,
}

impl SimulatedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every future `connect` for `peer` fail
    pub fn refuse(&self, peer: &MemberId) {
        let _ = self.refused.lock().insert(peer.clone());
    }

    /// The most recent connection created for `peer`
    pub fn connection(&self, peer: &MemberId) -> Option<Arc<SimulatedPeerConnection>> {
        self.connections
            .lock()
            .get(peer)
            .and_then(|conns| conns.last().cloned())
    }

    pub fn connections_for(&self, peer: &MemberId) -> Vec<Arc<SimulatedPeerConnection>> {
        self.connections
            .lock()
            .get(peer)
            .cloned()
            .unwrap_or_default()
    }

    pub fn connect_count(&self) -> usize {
        self.connections.lock().values().map(Vec::len).sum()
    }

    /// The ICE configurations connections were created with
    pub fn configs(&self) -> Vec<IceConfig> {
        self.configs.lock().clone()
    }
}

#[async_trait]
impl PeerConnector for SimulatedConnector {
    async fn connect(
        &self,
        config: &IceConfig,
        peer: &MemberId,
    ) -> Result<Arc<dyn PeerConnection>, RtcError> {
        if self.refused.lock().contains(peer) {
            return Err(RtcError::msg(format!("connection to {peer} refused")));
        }

        self.configs.lock().push(config.clone());
        let conn = Arc::new(SimulatedPeerConnection::new(peer.clone()));
        self.connections
            .lock()
            .entry(peer.clone())
            .or_default()
            .push(conn.clone());
        Ok(conn)
    }
}

#[derive(Default)]
struct PeerState {
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    stable_remote: Option<SessionDescription>,
    ice: Option<IceConnectionState>,
    closed: bool,
    sdp_counter: usize,
    offers: Vec<OfferOptions>,
    answers: usize,
    candidates: Vec<IceCandidate>,
    tracks: Vec<LocalTrack>,
    channels: Vec<Arc<SimulatedDataChannel>>,
    rollbacks: usize,
    failures: HashSet<SimulatedOp>,
}

pub struct SimulatedPeerConnection {
    peer: MemberId,
    state: Mutex<PeerState>,
    held: Mutex<HashMap<SimulatedOp, Arc<Notify>>>,
    events_tx: Mutex<Option<UnboundedSender<PeerEvent>>>,
    events_rx: Mutex<Option<UnboundedReceiver<PeerEvent>>>,
}

impl SimulatedPeerConnection {
    fn new(peer: MemberId) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            peer,
            state: Mutex::new(PeerState::default()),
            held: Mutex::new(HashMap::new()),
            events_tx: Mutex::new(Some(tx)),
            events_rx: Mutex::new(Some(rx)),
        }
    }

    pub fn peer(&self) -> &MemberId {
        &self.peer
    }

    /// Makes every future call of `op` fail until [`Self::clear_failures`]
    pub fn fail_on(&self, op: SimulatedOp) {
        let _ = self.state.lock().failures.insert(op);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Makes future calls of `op` wait until [`Self::release`]
    pub fn hold(&self, op: SimulatedOp) {
        let _ = self
            .held
            .lock()
            .entry(op)
            .or_insert_with(|| Arc::new(Notify::new()));
    }

    /// Lets every call waiting on `op` continue
    pub fn release(&self, op: SimulatedOp) {
        if let Some(gate) = self.held.lock().remove(&op) {
            gate.notify_waiters();
        }
    }

    async fn enter(&self, op: SimulatedOp) -> Result<(), RtcError> {
        let gate = self.held.lock().get(&op).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.check(op)
    }

    fn check(&self, op: SimulatedOp) -> Result<(), RtcError> {
        let state = self.state.lock();
        if state.closed {
            return Err(RtcError::Closed);
        }

        if state.failures.contains(&op) {
            return Err(RtcError::Negotiation(format!("injected {op:?} failure")));
        }

        Ok(())
    }

    fn emit(&self, event: PeerEvent) -> bool {
        match self.events_tx.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Simulates the ICE agent moving to `state`
    pub fn set_ice_state(&self, state: IceConnectionState) -> bool {
        self.state.lock().ice = Some(state);
        self.emit(PeerEvent::IceConnectionStateChange(state))
    }

    /// Simulates local candidate gathering
    pub fn gather_candidate(&self, candidate: IceCandidate) -> bool {
        self.emit(PeerEvent::IceCandidate(candidate))
    }

    /// Simulates the remote peer opening a data channel towards us
    pub fn announce_data_channel(&self, label: &str) -> Arc<SimulatedDataChannel> {
        let channel = SimulatedDataChannel::new(label);
        self.state.lock().channels.push(channel.clone());
        let _ = self.emit(PeerEvent::DataChannel(channel.clone()));
        channel
    }

    /// Simulates a remote media track arriving
    pub fn receive_track(&self, track: RemoteTrack) -> bool {
        self.emit(PeerEvent::Track(track))
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.state.lock().local.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.state.lock().remote.clone()
    }

    pub fn offers(&self) -> Vec<OfferOptions> {
        self.state.lock().offers.clone()
    }

    pub fn answer_count(&self) -> usize {
        self.state.lock().answers
    }

    pub fn rollback_count(&self) -> usize {
        self.state.lock().rollbacks
    }

    pub fn added_candidates(&self) -> Vec<IceCandidate> {
        self.state.lock().candidates.clone()
    }

    pub fn tracks(&self) -> Vec<LocalTrack> {
        self.state.lock().tracks.clone()
    }

    /// Local and announced channels, in creation order
    pub fn data_channels(&self) -> Vec<Arc<SimulatedDataChannel>> {
        self.state.lock().channels.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn next_sdp(&self, kind: &str) -> String {
        let mut state = self.state.lock();
        state.sdp_counter += 1;
        format!("v=0\r\no=sim-{} {} {kind}\r\n", self.peer, state.sdp_counter)
    }
}

#[async_trait]
impl PeerConnection for SimulatedPeerConnection {
    async fn create_offer(&self, options: OfferOptions) -> Result<SessionDescription, RtcError> {
        self.enter(SimulatedOp::CreateOffer).await?;
        self.state.lock().offers.push(options);
        Ok(SessionDescription::offer(self.next_sdp("offer")))
    }

    async fn create_answer(&self) -> Result<SessionDescription, RtcError> {
        self.enter(SimulatedOp::CreateAnswer).await?;
        let has_remote_offer = matches!(
            self.state.lock().remote.as_ref().map(|desc| desc.sdp_type),
            Some(SdpType::Offer)
        );
        if !has_remote_offer {
            return Err(RtcError::InvalidState(
                "cannot answer without a remote offer".into(),
            ));
        }

        self.state.lock().answers += 1;
        Ok(SessionDescription::answer(self.next_sdp("answer")))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), RtcError> {
        self.enter(SimulatedOp::SetLocalDescription).await?;
        let mut state = self.state.lock();
        if description.sdp_type == SdpType::Answer {
            state.stable_remote = state.remote.clone();
        }
        state.local = Some(description);
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), RtcError> {
        if description.sdp_type == SdpType::Rollback {
            let mut state = self.state.lock();
            if state.closed {
                return Err(RtcError::Closed);
            }

            state.remote = state.stable_remote.clone();
            state.rollbacks += 1;
            return Ok(());
        }

        self.enter(SimulatedOp::SetRemoteDescription).await?;
        let mut state = self.state.lock();
        if description.sdp_type == SdpType::Answer {
            state.stable_remote = Some(description.clone());
        }
        state.remote = Some(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), RtcError> {
        self.enter(SimulatedOp::AddIceCandidate).await?;
        let mut state = self.state.lock();
        if state.remote.is_none() {
            return Err(RtcError::InvalidState(
                "remote description not set".into(),
            ));
        }

        state.candidates.push(candidate);
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>, RtcError> {
        self.enter(SimulatedOp::CreateDataChannel).await?;
        let channel = SimulatedDataChannel::new(label);
        self.state.lock().channels.push(channel.clone());
        Ok(channel)
    }

    async fn add_track(&self, track: LocalTrack) -> Result<(), RtcError> {
        self.enter(SimulatedOp::AddTrack).await?;
        self.state.lock().tracks.push(track);
        Ok(())
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        let state = self.state.lock();
        if state.closed {
            IceConnectionState::Closed
        } else {
            state.ice.unwrap_or(IceConnectionState::New)
        }
    }

    fn take_events(&self) -> Option<UnboundedReceiver<PeerEvent>> {
        self.events_rx.lock().take()
    }

    async fn close(&self) -> Result<(), RtcError> {
        let channels = {
            let mut state = self.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.channels.clone()
        };

        for channel in channels {
            channel.close().await;
        }

        // ends the event stream
        let _ = self.events_tx.lock().take();
        Ok(())
    }
}

/// An in-memory data channel. Frames written by the local side are recorded, frames from the remote side are
/// pushed in with [`SimulatedDataChannel::deliver`]
pub struct SimulatedDataChannel {
    label: String,
    state: Mutex<DataChannelState>,
    sent: Mutex<Vec<String>>,
    events_tx: UnboundedSender<ChannelEvent>,
    events_rx: Mutex<Option<UnboundedReceiver<ChannelEvent>>>,
}

impl SimulatedDataChannel {
    pub fn new(label: &str) -> Arc<Self> {
        let (events_tx, rx) = unbounded_channel();
        Arc::new(Self {
            label: label.to_string(),
            state: Mutex::new(DataChannelState::Connecting),
            sent: Mutex::new(Vec::new()),
            events_tx,
            events_rx: Mutex::new(Some(rx)),
        })
    }

    pub fn open(&self) {
        *self.state.lock() = DataChannelState::Open;
        let _ = self.events_tx.send(ChannelEvent::Open);
    }

    /// Simulates a frame arriving from the remote peer
    pub fn deliver<T: Into<String>>(&self, text: T) {
        let _ = self.events_tx.send(ChannelEvent::Message(text.into()));
    }

    pub fn fail<T: Into<String>>(&self, reason: T) {
        let _ = self.events_tx.send(ChannelEvent::Error(reason.into()));
    }

    /// Every frame written through [`DataChannel::send_text`]
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl DataChannel for SimulatedDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn ready_state(&self) -> DataChannelState {
        *self.state.lock()
    }

    async fn send_text(&self, text: &str) -> Result<(), RtcError> {
        let state = self.ready_state();
        if state != DataChannelState::Open {
            return Err(RtcError::InvalidState(format!(
                "data channel {} is {state}",
                self.label
            )));
        }

        self.sent.lock().push(text.to_string());
        Ok(())
    }

    fn take_events(&self) -> Option<UnboundedReceiver<ChannelEvent>> {
        self.events_rx.lock().take()
    }

    async fn close(&self) {
        let mut state = self.state.lock();
        if *state != DataChannelState::Closed {
            *state = DataChannelState::Closed;
            let _ = self.events_tx.send(ChannelEvent::Close);
        }
    }
}

struct SimulatedSource {
    stops: Arc<AtomicUsize>,
}

impl TrackSource for SimulatedSource {
    fn stop(&self) {
        let _ = self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fake capture devices that count how often a device was released
#[derive(Default)]
pub struct SimulatedMediaDevices {
    denied: Mutex<Option<String>>,
    stops: Arc<AtomicUsize>,
    captured: Mutex<Vec<LocalTrack>>,
}

impl SimulatedMediaDevices {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes future capture requests fail as if the user refused them
    pub fn deny<T: Into<String>>(&self, reason: T) {
        *self.denied.lock() = Some(reason.into());
    }

    pub fn allow(&self) {
        *self.denied.lock() = None;
    }

    /// How many times any device was released
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Every track handed out so far
    pub fn captured(&self) -> Vec<LocalTrack> {
        self.captured.lock().clone()
    }
}

#[async_trait]
impl MediaDevices for SimulatedMediaDevices {
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<LocalStream, RtcError> {
        if let Some(reason) = self.denied.lock().clone() {
            return Err(RtcError::MediaAccess(reason));
        }

        let mut tracks = Vec::new();
        for (wanted, kind, label) in [
            (constraints.audio, TrackKind::Audio, "simulated microphone"),
            (constraints.video, TrackKind::Video, "simulated camera"),
        ] {
            if wanted {
                let source = Arc::new(SimulatedSource {
                    stops: self.stops.clone(),
                });
                tracks.push(LocalTrack::new(kind, label, source));
            }
        }

        self.captured.lock().extend(tracks.iter().cloned());
        Ok(LocalStream::new(tracks))
    }
}
