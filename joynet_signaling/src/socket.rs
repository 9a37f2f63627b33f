//! The real-time signaling channel
use async_trait::async_trait;
use auto_impl::auto_impl;
use joynet_io::tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use joynet_io::Mutex;
use joynet_types::prelude::*;
use std::sync::Arc;

/// A push channel from the signaling server. It is injected into the chat view model, never global
#[async_trait]
#[auto_impl(Arc, Box)]
pub trait SignalingSocket: Send + Sync {
    /// Announces `member` to the other participants of `group`
    async fn join_group(&self, group: &GroupId, member: &MemberId) -> Result<(), ChatError>;
    /// Hands out the inbound event stream. Only the first call returns `Some`
    fn take_events(&self) -> Option<UnboundedReceiver<SignalEvent>>;
    /// Leaves the server. The event stream ends afterwards
    async fn disconnect(&self);
}

struct LocalSocketInner {
    tx: Mutex<Option<UnboundedSender<SignalEvent>>>,
    rx: Mutex<Option<UnboundedReceiver<SignalEvent>>>,
    joins: Mutex<Vec<(GroupId, MemberId)>>,
}

/// An in-process [`SignalingSocket`]. Whatever transport actually receives the server's frames feeds them in
/// through a [`SignalInjector`]
#[derive(Clone)]
pub struct LocalSignalingSocket {
    inner: Arc<LocalSocketInner>,
}

/// The feeding end of a [`LocalSignalingSocket`]
#[derive(Clone)]
pub struct SignalInjector {
    inner: Arc<LocalSocketInner>,
}

impl Default for LocalSignalingSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSignalingSocket {
    /// Creates a connected socket
    pub fn new() -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            inner: Arc::new(LocalSocketInner {
                tx: Mutex::new(Some(tx)),
                rx: Mutex::new(Some(rx)),
                joins: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns a handle that pushes frames into this socket
    pub fn injector(&self) -> SignalInjector {
        SignalInjector {
            inner: self.inner.clone(),
        }
    }

    /// Every `join-group` announcement made through this socket, in order
    pub fn joined(&self) -> Vec<(GroupId, MemberId)> {
        self.inner.joins.lock().clone()
    }

    /// False once [`SignalingSocket::disconnect`] ran
    pub fn is_connected(&self) -> bool {
        self.inner.tx.lock().is_some()
    }
}

impl SignalInjector {
    /// Delivers a typed event. Returns false if the socket is disconnected or nobody listens anymore
    pub fn push(&self, event: SignalEvent) -> bool {
        match self.inner.tx.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Parses a raw `(event, json)` frame and delivers it
    pub fn push_frame(&self, event: &str, payload: &str) -> Result<bool, ChatError> {
        let event = SignalEvent::from_frame(event, payload)?;
        log::trace!(target: "joynet", "Injecting {} frame from {}", event.event_name(), event.peer_id());
        Ok(self.push(event))
    }
}

#[async_trait]
impl SignalingSocket for LocalSignalingSocket {
    async fn join_group(&self, group: &GroupId, member: &MemberId) -> Result<(), ChatError> {
        if !self.is_connected() {
            return Err(ChatError::SessionClosed);
        }

        log::info!(target: "joynet", "{member} joining group {group}");
        self.inner.joins.lock().push((group.clone(), member.clone()));
        Ok(())
    }

    fn take_events(&self) -> Option<UnboundedReceiver<SignalEvent>> {
        self.inner.rx.lock().take()
    }

    async fn disconnect(&self) {
        if self.inner.tx.lock().take().is_some() {
            log::info!(target: "joynet", "Signaling socket disconnected");
        }
    }
}
