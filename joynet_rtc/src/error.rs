use joynet_types::errors::ChatError;
use std::fmt::{Debug, Display, Formatter};

/// Failures reported by a transport backend
#[derive(Clone, Eq, PartialEq)]
pub enum RtcError {
    /// The operation is not valid in the current signaling or channel state
    InvalidState(String),
    /// SDP could not be created or applied
    Negotiation(String),
    /// The connection or channel was already closed
    Closed,
    /// Local capture failed or was refused
    MediaAccess(String),
    Other(String),
}

impl RtcError {
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Other(msg.into())
    }

    pub fn into_string(self) -> String {
        match self {
            Self::InvalidState(err) => format!("invalid state: {err}"),
            Self::Negotiation(err) => format!("negotiation failed: {err}"),
            Self::Closed => "connection closed".to_string(),
            Self::MediaAccess(err) => format!("media access failed: {err}"),
            Self::Other(err) => err,
        }
    }
}

impl Debug for RtcError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.clone().into_string())
    }
}

impl Display for RtcError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <Self as Debug>::fmt(self, f)
    }
}

impl std::error::Error for RtcError {}

impl From<RtcError> for ChatError {
    fn from(err: RtcError) -> Self {
        match err {
            RtcError::MediaAccess(reason) => ChatError::MediaAccess(reason),
            RtcError::Closed => ChatError::Transport("peer connection closed".into()),
            other => ChatError::Transport(other.into_string()),
        }
    }
}

#[cfg(feature = "webrtc")]
impl From<::webrtc::Error> for RtcError {
    fn from(err: ::webrtc::Error) -> Self {
        match err {
            ::webrtc::Error::ErrConnectionClosed => Self::Closed,
            other => Self::Negotiation(other.to_string()),
        }
    }
}
