//! Negotiation values exchanged through the signaling server, and the frames the signaling socket delivers.

use crate::errors::ChatError;
use crate::user::{GroupId, MemberId};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(Serialize, Deserialize, Copy, Clone, Debug, Eq, PartialEq, Hash, AsRefStr, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

/// An SDP blob in the `{type, sdp}` shape browsers emit
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    #[serde(default)]
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer<T: Into<String>>(sdp: T) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer<T: Into<String>>(sdp: T) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// The description that reverts a half-applied offer
    pub fn rollback() -> Self {
        Self {
            sdp_type: SdpType::Rollback,
            sdp: String::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new<T: Into<String>>(candidate: T) -> Self {
        Self {
            candidate: candidate.into(),
            ..Default::default()
        }
    }
}

/// The raw ICE agent state reported by a transport
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Eq, PartialEq, Hash, AsRefStr, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// The state of a link to one remote member, derived from its ICE state
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Eq, PartialEq, Hash, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PeerLinkState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl From<IceConnectionState> for PeerLinkState {
    fn from(state: IceConnectionState) -> Self {
        match state {
            IceConnectionState::New => Self::New,
            IceConnectionState::Checking => Self::Connecting,
            IceConnectionState::Connected | IceConnectionState::Completed => Self::Connected,
            IceConnectionState::Disconnected => Self::Disconnected,
            IceConnectionState::Failed => Self::Failed,
            IceConnectionState::Closed => Self::Closed,
        }
    }
}

impl PeerLinkState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

pub const EVENT_JOIN_GROUP: &str = "join-group";
pub const EVENT_OFFER: &str = "offer";
pub const EVENT_ANSWER: &str = "answer";
pub const EVENT_ICE_CANDIDATE: &str = "ice-candidate";

/// A typed real-time event delivered by the signaling socket
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SignalEvent {
    JoinGroup {
        group_id: GroupId,
        peer_id: MemberId,
    },
    Offer {
        offer: SessionDescription,
        from_peer_id: MemberId,
        group_id: GroupId,
    },
    Answer {
        answer: SessionDescription,
        from_peer_id: MemberId,
        group_id: GroupId,
    },
    IceCandidate {
        candidate: IceCandidate,
        from_peer_id: MemberId,
        group_id: GroupId,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinFrame {
    group_id: GroupId,
    #[serde(alias = "fromPeerId")]
    peer_id: MemberId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfferFrame {
    offer: SessionDescription,
    from_peer_id: MemberId,
    group_id: GroupId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerFrame {
    answer: SessionDescription,
    from_peer_id: MemberId,
    group_id: GroupId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidateFrame {
    candidate: IceCandidate,
    from_peer_id: MemberId,
    group_id: GroupId,
}

fn parse_frame<'a, T: Deserialize<'a>>(event: &str, payload: &'a str) -> Result<T, ChatError> {
    serde_json::from_str(payload)
        .map_err(|err| ChatError::protocol(None, format!("malformed '{event}' frame: {err}")))
}

impl SignalEvent {
    /// Parses a socket frame given its event name and JSON payload
    pub fn from_frame(event: &str, payload: &str) -> Result<Self, ChatError> {
        match event {
            EVENT_JOIN_GROUP => {
                let frame: JoinFrame = parse_frame(event, payload)?;
                Ok(Self::JoinGroup {
                    group_id: frame.group_id,
                    peer_id: frame.peer_id,
                })
            }

            EVENT_OFFER => {
                let frame: OfferFrame = parse_frame(event, payload)?;
                if frame.offer.sdp_type != SdpType::Offer {
                    return Err(ChatError::protocol(
                        Some(&frame.from_peer_id),
                        format!("expected an offer, got {}", frame.offer.sdp_type),
                    ));
                }

                Ok(Self::Offer {
                    offer: frame.offer,
                    from_peer_id: frame.from_peer_id,
                    group_id: frame.group_id,
                })
            }

            EVENT_ANSWER => {
                let frame: AnswerFrame = parse_frame(event, payload)?;
                if !matches!(frame.answer.sdp_type, SdpType::Answer | SdpType::Pranswer) {
                    return Err(ChatError::protocol(
                        Some(&frame.from_peer_id),
                        format!("expected an answer, got {}", frame.answer.sdp_type),
                    ));
                }

                Ok(Self::Answer {
                    answer: frame.answer,
                    from_peer_id: frame.from_peer_id,
                    group_id: frame.group_id,
                })
            }

            EVENT_ICE_CANDIDATE => {
                let frame: CandidateFrame = parse_frame(event, payload)?;
                Ok(Self::IceCandidate {
                    candidate: frame.candidate,
                    from_peer_id: frame.from_peer_id,
                    group_id: frame.group_id,
                })
            }

            unknown => Err(ChatError::protocol(
                None,
                format!("unknown signaling event '{unknown}'"),
            )),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::JoinGroup { .. } => EVENT_JOIN_GROUP,
            Self::Offer { .. } => EVENT_OFFER,
            Self::Answer { .. } => EVENT_ANSWER,
            Self::IceCandidate { .. } => EVENT_ICE_CANDIDATE,
        }
    }

    pub fn group_id(&self) -> &GroupId {
        match self {
            Self::JoinGroup { group_id, .. }
            | Self::Offer { group_id, .. }
            | Self::Answer { group_id, .. }
            | Self::IceCandidate { group_id, .. } => group_id,
        }
    }

    /// The member that originated this event
    pub fn peer_id(&self) -> &MemberId {
        match self {
            Self::JoinGroup { peer_id, .. } => peer_id,
            Self::Offer { from_peer_id, .. }
            | Self::Answer { from_peer_id, .. }
            | Self::IceCandidate { from_peer_id, .. } => from_peer_id,
        }
    }
}
