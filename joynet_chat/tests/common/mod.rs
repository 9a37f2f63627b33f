#![allow(dead_code)]

use async_trait::async_trait;
use joynet_chat::prelude::*;
use joynet_io::Mutex;
use joynet_rtc::simulator::{SimulatedConnector, SimulatedMediaDevices, SimulatedPeerConnection};
use joynet_signaling::SignalingClient;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Notify;

pub const GROUP: &str = "g1";

#[derive(Clone, Debug, PartialEq)]
pub enum SignalCall {
    FetchConfig,
    Offer(MemberId, SessionDescription),
    Answer(MemberId, SessionDescription),
    Candidate(MemberId, IceCandidate),
    Reconnect(MemberId),
}

/// Records every relay call. Calls addressed to a peer in `failing` fail with a send error
pub struct RecordingSignalingClient {
    config: Option<IceConfig>,
    calls: Mutex<Vec<SignalCall>>,
    failing: Mutex<HashSet<MemberId>>,
    fetch_gate: Mutex<Option<Arc<Notify>>>,
}

impl RecordingSignalingClient {
    pub fn new() -> Arc<Self> {
        Self::with_config(Some(IceConfig::public_stun()))
    }

    /// Every config fetch fails
    pub fn unreachable() -> Arc<Self> {
        Self::with_config(None)
    }

    fn with_config(config: Option<IceConfig>) -> Arc<Self> {
        Arc::new(Self {
            config,
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            fetch_gate: Mutex::new(None),
        })
    }

    /// Config fetches wait until [`Self::release_fetch`]
    pub fn hold_fetch(&self) {
        *self.fetch_gate.lock() = Some(Arc::new(Notify::new()));
    }

    pub fn release_fetch(&self) {
        if let Some(gate) = self.fetch_gate.lock().take() {
            gate.notify_waiters();
        }
    }

    pub fn fail_for(&self, peer: &str) {
        let _ = self.failing.lock().insert(MemberId::from(peer));
    }

    pub fn heal(&self, peer: &str) {
        let _ = self.failing.lock().remove(&MemberId::from(peer));
    }

    pub fn calls(&self) -> Vec<SignalCall> {
        self.calls.lock().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.count(|call| matches!(call, SignalCall::FetchConfig))
    }

    pub fn offers_to(&self, peer: &str) -> Vec<SessionDescription> {
        let peer = MemberId::from(peer);
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SignalCall::Offer(to, offer) if to == &peer => Some(offer.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn answers_to(&self, peer: &str) -> usize {
        let peer = MemberId::from(peer);
        self.count(|call| matches!(call, SignalCall::Answer(to, _) if to == &peer))
    }

    pub fn candidates_to(&self, peer: &str) -> usize {
        let peer = MemberId::from(peer);
        self.count(|call| matches!(call, SignalCall::Candidate(to, _) if to == &peer))
    }

    pub fn reconnects_to(&self, peer: &str) -> usize {
        let peer = MemberId::from(peer);
        self.count(|call| matches!(call, SignalCall::Reconnect(to) if to == &peer))
    }

    fn count(&self, f: impl Fn(&SignalCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| f(call)).count()
    }

    fn record(&self, peer: &MemberId, call: SignalCall) -> Result<(), ChatError> {
        self.calls.lock().push(call);
        if self.failing.lock().contains(peer) {
            Err(ChatError::signaling_send(peer, "HTTP 502"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SignalingClient for RecordingSignalingClient {
    async fn fetch_ice_config(&self) -> Result<IceConfig, ChatError> {
        self.calls.lock().push(SignalCall::FetchConfig);
        let gate = self.fetch_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.config
            .clone()
            .ok_or_else(|| ChatError::ConfigFetch("HTTP 503".into()))
    }

    async fn send_offer(
        &self,
        offer: &SessionDescription,
        peer: &MemberId,
        _group: &GroupId,
    ) -> Result<(), ChatError> {
        self.record(peer, SignalCall::Offer(peer.clone(), offer.clone()))
    }

    async fn send_answer(
        &self,
        answer: &SessionDescription,
        peer: &MemberId,
        _group: &GroupId,
    ) -> Result<(), ChatError> {
        self.record(peer, SignalCall::Answer(peer.clone(), answer.clone()))
    }

    async fn send_ice_candidate(
        &self,
        candidate: &IceCandidate,
        peer: &MemberId,
        _group: &GroupId,
    ) -> Result<(), ChatError> {
        self.record(peer, SignalCall::Candidate(peer.clone(), candidate.clone()))
    }

    async fn request_reconnect(&self, peer: &MemberId, _group: &GroupId) -> Result<(), ChatError> {
        self.record(peer, SignalCall::Reconnect(peer.clone()))
    }
}

pub fn member(id: &str) -> Member {
    Member::new(id, id.to_uppercase())
}

pub fn session(me: &str, others: &[&str]) -> GroupSession {
    GroupSession::new(GROUP, member(me), others.iter().map(|id| member(id)))
}

pub struct Harness {
    pub manager: PeerConnectionManager,
    pub signaling: Arc<RecordingSignalingClient>,
    pub connector: Arc<SimulatedConnector>,
    pub devices: Arc<SimulatedMediaDevices>,
}

impl Harness {
    pub fn new(me: &str, others: &[&str]) -> Self {
        Self::with_signaling(me, others, RecordingSignalingClient::new())
    }

    pub fn with_signaling(
        me: &str,
        others: &[&str],
        signaling: Arc<RecordingSignalingClient>,
    ) -> Self {
        let connector = SimulatedConnector::new();
        let devices = SimulatedMediaDevices::new();
        let manager = GroupChatBuilder::default()
            .with_signaling_client(signaling.clone())
            .with_connector(connector.clone())
            .with_media_devices(devices.clone())
            .build(session(me, others))
            .unwrap();

        Self {
            manager,
            signaling,
            connector,
            devices,
        }
    }

    pub async fn init(&self) {
        let members = self.manager.session().members().to_vec();
        self.manager.init_session(&members).await.unwrap();
    }

    /// The current simulated connection to `id`
    pub fn conn(&self, id: &str) -> Arc<SimulatedPeerConnection> {
        self.connector.connection(&MemberId::from(id)).unwrap()
    }
}

/// Lets spawned pumps and readers drain their queues
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Everything broadcast so far, without waiting
pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
