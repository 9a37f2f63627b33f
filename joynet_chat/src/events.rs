use crate::media::RemoteStream;
use joynet_types::prelude::*;

/// A toast-style message for the user
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Notification {
    Success(String),
    Error(String),
}

/// Everything the presentation layer needs to react to
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    MessageReceived(ChatMessage),
    LinkStateChanged {
        member_id: MemberId,
        state: PeerLinkState,
    },
    /// Shown as a per-peer banner until the link reports `connected` again
    ConnectionLost(MemberId),
    /// A call offer to this member failed, or its link failed for good and was removed
    CallError { member_id: MemberId, reason: String },
    CallStarted {
        active: Vec<MemberId>,
        failed: Vec<MemberId>,
    },
    CallEnded,
    /// `None` once the member's stream is gone
    RemoteStreamUpdated {
        member_id: MemberId,
        stream: Option<RemoteStream>,
    },
    Notice(Notification),
}

impl ChatEvent {
    pub fn success<T: Into<String>>(text: T) -> Self {
        Self::Notice(Notification::Success(text.into()))
    }

    pub fn error<T: Into<String>>(text: T) -> Self {
        Self::Notice(Notification::Error(text.into()))
    }
}
