use crate::error::RtcError;
use async_trait::async_trait;
use auto_impl::auto_impl;
use joynet_io::tokio::sync::mpsc::UnboundedReceiver;
use strum::{AsRefStr, Display};

#[derive(Copy, Clone, Debug, Eq, PartialEq, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DataChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Lifecycle and payload notifications of a single data channel
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChannelEvent {
    Open,
    Message(String),
    Close,
    Error(String),
}

/// A reliable, ordered text channel to one remote peer
#[async_trait]
#[auto_impl(Arc, Box)]
pub trait DataChannel: Send + Sync {
    fn label(&self) -> &str;
    fn ready_state(&self) -> DataChannelState;
    /// Writes one frame. Fails with [`RtcError::InvalidState`] unless the channel is open
    async fn send_text(&self, text: &str) -> Result<(), RtcError>;
    /// Hands out the event stream. Only the first call returns `Some`
    fn take_events(&self) -> Option<UnboundedReceiver<ChannelEvent>>;
    async fn close(&self);

    fn is_open(&self) -> bool {
        self.ready_state() == DataChannelState::Open
    }
}
