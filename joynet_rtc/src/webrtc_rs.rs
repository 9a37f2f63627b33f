//! A [`PeerConnector`] backed by webrtc-rs.
//!
//! webrtc-rs has no capture devices, so local media is fed by the application: after a [`LocalTrack`] is
//! attached, [`WebRtcPeerConnection::sample_sink`] returns the sink its encoded samples are written to.
//! Disabled or stopped tracks swallow samples, which is how muting works without renegotiation.

use crate::channel::{ChannelEvent, DataChannel, DataChannelState};
use crate::connection::{OfferOptions, PeerConnection, PeerConnector, PeerEvent};
use crate::error::RtcError;
use crate::media::{LocalTrack, RemoteTrack, TrackKind};
use async_trait::async_trait;
use bytes::Bytes;
use joynet_io::tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use joynet_io::Mutex;
use joynet_types::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTPCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

pub struct WebRtcConnector {
    api: API,
}

impl WebRtcConnector {
    /// Builds an API instance with the default codecs and interceptors
    pub fn new() -> Result<Self, RtcError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();
        Ok(Self { api })
    }
}

pub(crate) fn rtc_configuration(config: &IceConfig) -> RTCConfiguration {
    let ice_servers = config
        .ice_servers()
        .map(|server| RTCIceServer {
            urls: server.urls.clone(),
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect();

    RTCConfiguration {
        ice_servers,
        ice_transport_policy: match config.ice_transport_policy {
            IceTransportPolicy::All => RTCIceTransportPolicy::All,
            IceTransportPolicy::Relay => RTCIceTransportPolicy::Relay,
        },
        bundle_policy: match config.bundle_policy {
            BundlePolicy::Balanced => RTCBundlePolicy::Balanced,
            BundlePolicy::MaxCompat => RTCBundlePolicy::MaxCompat,
            BundlePolicy::MaxBundle => RTCBundlePolicy::MaxBundle,
        },
        rtcp_mux_policy: match config.rtcp_mux_policy {
            RtcpMuxPolicy::Negotiate => RTCRtcpMuxPolicy::Negotiate,
            RtcpMuxPolicy::Require => RTCRtcpMuxPolicy::Require,
        },
        ice_candidate_pool_size: config.ice_candidate_pool_size,
        ..Default::default()
    }
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    async fn connect(
        &self,
        config: &IceConfig,
        peer: &MemberId,
    ) -> Result<Arc<dyn PeerConnection>, RtcError> {
        let pc = Arc::new(self.api.new_peer_connection(rtc_configuration(config)).await?);
        log::debug!(target: "joynet", "Created webrtc peer connection for {peer}");
        Ok(Arc::new(WebRtcPeerConnection::new(pc)))
    }
}

/// Writes encoded media into an attached [`LocalTrack`]
#[derive(Clone)]
pub struct SampleSink {
    track: LocalTrack,
    sample_track: Arc<TrackLocalStaticSample>,
}

impl SampleSink {
    pub async fn write(&self, data: Bytes, duration: Duration) -> Result<(), RtcError> {
        if !self.track.is_enabled() || self.track.is_stopped() {
            return Ok(());
        }

        let sample = Sample {
            data,
            duration,
            ..Default::default()
        };
        Ok(self.sample_track.write_sample(&sample).await?)
    }
}

pub struct WebRtcPeerConnection {
    pc: Arc<RTCPeerConnection>,
    events_rx: Mutex<Option<UnboundedReceiver<PeerEvent>>>,
    sinks: Mutex<HashMap<String, SampleSink>>,
}

impl WebRtcPeerConnection {
    fn new(pc: Arc<RTCPeerConnection>) -> Self {
        let (tx, rx) = unbounded_channel();
        register_peer_handlers(&pc, tx);
        Self {
            pc,
            events_rx: Mutex::new(Some(rx)),
            sinks: Mutex::new(HashMap::new()),
        }
    }

    pub fn sample_sink(&self, track_id: &str) -> Option<SampleSink> {
        self.sinks.lock().get(track_id).cloned()
    }
}

fn register_peer_handlers(pc: &RTCPeerConnection, tx: UnboundedSender<PeerEvent>) {
    let candidate_tx = tx.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let tx = candidate_tx.clone();
        Box::pin(async move {
            // None marks the end of gathering
            if let Some(candidate) = candidate {
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = tx.send(PeerEvent::IceCandidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        }));
                    }
                    Err(err) => {
                        log::warn!(target: "joynet", "Unable to serialize local candidate: {err}")
                    }
                }
            }
        })
    }));

    let state_tx = tx.clone();
    pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
        let mapped = match state {
            RTCIceConnectionState::Checking => Some(IceConnectionState::Checking),
            RTCIceConnectionState::Connected => Some(IceConnectionState::Connected),
            RTCIceConnectionState::Completed => Some(IceConnectionState::Completed),
            RTCIceConnectionState::Disconnected => Some(IceConnectionState::Disconnected),
            RTCIceConnectionState::Failed => Some(IceConnectionState::Failed),
            RTCIceConnectionState::Closed => Some(IceConnectionState::Closed),
            RTCIceConnectionState::New => Some(IceConnectionState::New),
            _ => None,
        };

        if let Some(state) = mapped {
            let _ = state_tx.send(PeerEvent::IceConnectionStateChange(state));
        }
        Box::pin(async {})
    }));

    let channel_tx = tx.clone();
    pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
        let channel: Arc<dyn DataChannel> = Arc::new(WebRtcDataChannel::new(dc));
        let _ = channel_tx.send(PeerEvent::DataChannel(channel));
        Box::pin(async {})
    }));

    pc.on_track(Box::new(move |track, _receiver, _transceiver| {
        let kind = match track.kind() {
            RTPCodecType::Audio => Some(TrackKind::Audio),
            RTPCodecType::Video => Some(TrackKind::Video),
            _ => None,
        };

        if let Some(kind) = kind {
            let _ = tx.send(PeerEvent::Track(RemoteTrack {
                id: track.id(),
                stream_id: track.stream_id(),
                kind,
            }));
        }
        Box::pin(async {})
    }));
}

fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription, RtcError> {
    Ok(match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(description.sdp)?,
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp)?,
        SdpType::Rollback => {
            let mut rollback = RTCSessionDescription::default();
            rollback.sdp_type = RTCSdpType::Rollback;
            rollback
        }
    })
}

fn from_rtc_description(description: RTCSessionDescription) -> Result<SessionDescription, RtcError> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        other => return Err(RtcError::Negotiation(format!("unexpected sdp type {other}"))),
    };

    Ok(SessionDescription {
        sdp_type,
        sdp: description.sdp,
    })
}

#[async_trait]
impl PeerConnection for WebRtcPeerConnection {
    async fn create_offer(&self, options: OfferOptions) -> Result<SessionDescription, RtcError> {
        let options = RTCOfferOptions {
            ice_restart: options.ice_restart,
            ..Default::default()
        };
        from_rtc_description(self.pc.create_offer(Some(options)).await?)
    }

    async fn create_answer(&self) -> Result<SessionDescription, RtcError> {
        from_rtc_description(self.pc.create_answer(None).await?)
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), RtcError> {
        Ok(self
            .pc
            .set_local_description(to_rtc_description(description)?)
            .await?)
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), RtcError> {
        Ok(self
            .pc
            .set_remote_description(to_rtc_description(description)?)
            .await?)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), RtcError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        Ok(self.pc.add_ice_candidate(init).await?)
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>, RtcError> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };
        let dc = self.pc.create_data_channel(label, Some(init)).await?;
        Ok(Arc::new(WebRtcDataChannel::new(dc)))
    }

    async fn add_track(&self, track: LocalTrack) -> Result<(), RtcError> {
        let mime_type = match track.kind() {
            TrackKind::Audio => MIME_TYPE_OPUS,
            TrackKind::Video => MIME_TYPE_VP8,
        };

        let sample_track = Arc::new(TrackLocalStaticSample::new(
            RTPCodecCapability {
                mime_type: mime_type.to_owned(),
                ..Default::default()
            },
            track.id().to_string(),
            "joynet".to_owned(),
        ));

        let _sender = self
            .pc
            .add_track(sample_track.clone() as Arc<dyn TrackLocal + Send + Sync>)
            .await?;
        let _ = self.sinks.lock().insert(
            track.id().to_string(),
            SampleSink {
                track,
                sample_track,
            },
        );
        Ok(())
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        match self.pc.ice_connection_state() {
            RTCIceConnectionState::Checking => IceConnectionState::Checking,
            RTCIceConnectionState::Connected => IceConnectionState::Connected,
            RTCIceConnectionState::Completed => IceConnectionState::Completed,
            RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
            RTCIceConnectionState::Failed => IceConnectionState::Failed,
            RTCIceConnectionState::Closed => IceConnectionState::Closed,
            _ => IceConnectionState::New,
        }
    }

    fn take_events(&self) -> Option<UnboundedReceiver<PeerEvent>> {
        self.events_rx.lock().take()
    }

    async fn close(&self) -> Result<(), RtcError> {
        self.sinks.lock().clear();
        Ok(self.pc.close().await?)
    }
}

pub struct WebRtcDataChannel {
    dc: Arc<RTCDataChannel>,
    events_rx: Mutex<Option<UnboundedReceiver<ChannelEvent>>>,
}

impl WebRtcDataChannel {
    fn new(dc: Arc<RTCDataChannel>) -> Self {
        let (tx, rx) = unbounded_channel();

        let open_tx = tx.clone();
        dc.on_open(Box::new(move || {
            let _ = open_tx.send(ChannelEvent::Open);
            Box::pin(async {})
        }));

        let message_tx = tx.clone();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let event = match String::from_utf8(msg.data.to_vec()) {
                Ok(text) => ChannelEvent::Message(text),
                Err(err) => ChannelEvent::Error(format!("non-utf8 frame: {err}")),
            };
            let _ = message_tx.send(event);
            Box::pin(async {})
        }));

        let close_tx = tx.clone();
        dc.on_close(Box::new(move || {
            let _ = close_tx.send(ChannelEvent::Close);
            Box::pin(async {})
        }));

        dc.on_error(Box::new(move |err| {
            let _ = tx.send(ChannelEvent::Error(err.to_string()));
            Box::pin(async {})
        }));

        Self {
            dc,
            events_rx: Mutex::new(Some(rx)),
        }
    }
}

#[async_trait]
impl DataChannel for WebRtcDataChannel {
    fn label(&self) -> &str {
        self.dc.label()
    }

    fn ready_state(&self) -> DataChannelState {
        match self.dc.ready_state() {
            RTCDataChannelState::Open => DataChannelState::Open,
            RTCDataChannelState::Closing => DataChannelState::Closing,
            RTCDataChannelState::Closed => DataChannelState::Closed,
            _ => DataChannelState::Connecting,
        }
    }

    async fn send_text(&self, text: &str) -> Result<(), RtcError> {
        if !self.is_open() {
            return Err(RtcError::InvalidState(format!(
                "data channel {} is {}",
                self.label(),
                self.ready_state()
            )));
        }

        let _ = self.dc.send_text(text.to_string()).await?;
        Ok(())
    }

    fn take_events(&self) -> Option<UnboundedReceiver<ChannelEvent>> {
        self.events_rx.lock().take()
    }

    async fn close(&self) {
        if let Err(err) = self.dc.close().await {
            log::warn!(target: "joynet", "Error closing data channel {}: {err}", self.label());
        }
    }
}
