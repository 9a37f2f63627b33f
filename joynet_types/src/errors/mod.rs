use crate::user::MemberId;
use std::fmt::{Debug, Display, Formatter};

/// The error taxonomy of the group chat subsystem.
///
/// Only [`ChatError::ConfigFetch`], [`ChatError::MediaAccess`] and [`ChatError::SessionClosed`] stop the
/// operation that produced them. Everything else is reported to the user as a notice while the session
/// carries on, relying on ICE restarts and the reconnect watchdog to recover.
#[derive(Clone, Eq, PartialEq)]
pub enum ChatError {
    /// The ICE server configuration could not be fetched or is unusable
    ConfigFetch(String),
    /// A relay call to the signaling server failed
    SignalingSend { peer: MemberId, reason: String },
    /// An offer/answer/candidate could not be applied, or arrived malformed
    SignalingProtocol {
        peer: Option<MemberId>,
        reason: String,
    },
    /// A data channel delivered something that is not a valid chat payload
    MessageParse(String),
    /// Camera or microphone capture was refused
    MediaAccess(String),
    /// The underlying peer transport failed
    Transport(String),
    /// The group session was already torn down
    SessionClosed,
}

impl ChatError {
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Transport(msg.into())
    }

    pub fn signaling_send<T: ToString>(peer: &MemberId, reason: T) -> Self {
        Self::SignalingSend {
            peer: peer.clone(),
            reason: reason.to_string(),
        }
    }

    pub fn protocol<T: ToString>(peer: Option<&MemberId>, reason: T) -> Self {
        Self::SignalingProtocol {
            peer: peer.cloned(),
            reason: reason.to_string(),
        }
    }

    /// Fatal errors block the operation outright instead of degrading it
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigFetch(..) | Self::MediaAccess(..) | Self::SessionClosed
        )
    }

    /// The peer this error concerns, if any
    pub fn peer(&self) -> Option<&MemberId> {
        match self {
            Self::SignalingSend { peer, .. } => Some(peer),
            Self::SignalingProtocol { peer, .. } => peer.as_ref(),
            _ => None,
        }
    }

    fn to_msg(&self) -> String {
        match self {
            Self::ConfigFetch(reason) => format!("Failed to fetch ICE configuration: {reason}"),
            Self::SignalingSend { peer, reason } => {
                format!("Failed to relay signaling message for {peer}: {reason}")
            }
            Self::SignalingProtocol {
                peer: Some(peer),
                reason,
            } => format!("Signaling protocol error with {peer}: {reason}"),
            Self::SignalingProtocol { peer: None, reason } => {
                format!("Signaling protocol error: {reason}")
            }
            Self::MessageParse(reason) => format!("Malformed chat payload: {reason}"),
            Self::MediaAccess(reason) => format!("Media access denied: {reason}"),
            Self::Transport(reason) => reason.clone(),
            Self::SessionClosed => "Group session is closed".to_string(),
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Self::Transport(reason) => reason,
            other => other.to_msg(),
        }
    }
}

impl Debug for ChatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_msg())
    }
}

impl Display for ChatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <Self as Debug>::fmt(self, f)
    }
}

impl std::error::Error for ChatError {}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::MessageParse(err.to_string())
    }
}
