//! The facade a chat screen binds to.
//!
//! [`ChatViewModel::open`] joins the group on the signaling socket and routes every relayed event into the
//! [`PeerConnectionManager`]. Relayed events are handled one at a time in arrival order, which keeps
//! offer/answer exchanges with any single member sequential. Offers that arrive while the session is still
//! creating its links are held by the manager until the matching link exists.

use crate::constants::NOTICE_CONNECT_FAILED;
use crate::events::ChatEvent;
use crate::manager::{CallStartReport, PeerConnectionManager};
use crate::media::{MediaState, RemoteStream};
use joynet_io::tokio::sync::broadcast;
use joynet_io::tokio::sync::mpsc::UnboundedReceiver;
use joynet_io::spawn_cancellable;
use joynet_signaling::SignalingSocket;
use joynet_types::prelude::*;
use std::sync::Arc;

pub struct ChatViewModel {
    manager: PeerConnectionManager,
    socket: Arc<dyn SignalingSocket>,
}

impl ChatViewModel {
    pub fn new(manager: PeerConnectionManager, socket: Arc<dyn SignalingSocket>) -> Self {
        Self { manager, socket }
    }

    pub fn manager(&self) -> &PeerConnectionManager {
        &self.manager
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.manager.subscribe()
    }

    /// Loads `history` into the timeline, joins the group and connects to every listed member
    pub async fn open(&self, history: Vec<ChatMessage>) -> Result<(), ChatError> {
        self.load_history(history);

        let group = self.manager.group_id().clone();
        let me = self.manager.current_user().id.clone();
        if let Err(err) = self.socket.join_group(&group, &me).await {
            log::error!(target: "joynet", "Unable to join group {group}: {err}");
            self.manager.notify(ChatEvent::error(NOTICE_CONNECT_FAILED));
            return Err(err);
        }

        match self.socket.take_events() {
            Some(events) => self.spawn_signal_pump(events),
            None => log::warn!(target: "joynet", "Signaling events for group {group} were already taken"),
        }

        let members = self.manager.session().members().to_vec();
        self.manager.init_session(&members).await
    }

    /// Puts previously stored messages in front of the timeline
    pub fn load_history(&self, history: Vec<ChatMessage>) {
        if !history.is_empty() {
            log::trace!(target: "joynet", "Loading {} stored message(s)", history.len());
            self.manager.messages().prepend_history(history);
        }
    }

    fn spawn_signal_pump(&self, mut events: UnboundedReceiver<SignalEvent>) {
        let manager = self.manager.clone();
        let _pump = spawn_cancellable(manager.cancellation_token(), async move {
            while let Some(event) = events.recv().await {
                dispatch_signal(&manager, event).await;
            }
            log::debug!(target: "joynet", "Signaling stream for group {} ended", manager.group_id());
        });
    }

    /// Sends `text` to the group. Blank input is ignored and yields `None`
    pub async fn send_text(&self, text: &str) -> Result<Option<ChatMessage>, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let message = ChatMessage::new(self.manager.current_user(), text);
        let report = self.manager.send_message(message.clone()).await?;
        if !report.dropped.is_empty() {
            log::debug!(target: "joynet", "Message {} not delivered to {:?}", message.id(), report.dropped);
        }

        Ok(Some(message))
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.manager.timeline()
    }

    pub fn link_states(&self) -> Vec<(MemberId, PeerLinkState)> {
        self.manager
            .members()
            .into_iter()
            .filter_map(|member| {
                let state = self.manager.link_state(&member)?;
                Some((member, state))
            })
            .collect()
    }

    pub fn media_state(&self) -> Option<MediaState> {
        self.manager.media_state()
    }

    pub fn remote_streams(&self) -> Vec<RemoteStream> {
        self.manager.remote_streams()
    }

    pub async fn start_call(&self) -> Result<CallStartReport, ChatError> {
        self.manager.start_call().await
    }

    pub fn toggle_audio(&self) -> Option<bool> {
        self.manager.toggle_audio()
    }

    pub fn toggle_video(&self) -> Option<bool> {
        self.manager.toggle_video()
    }

    pub fn end_call(&self) {
        self.manager.end_call()
    }

    /// Tears the session down and leaves the signaling socket
    pub async fn close(&self) {
        self.manager.teardown().await;
        self.socket.disconnect().await;
    }
}

async fn dispatch_signal(manager: &PeerConnectionManager, event: SignalEvent) {
    if event.group_id() != manager.group_id() {
        log::trace!(target: "joynet", "Ignoring {} for group {}", event.event_name(), event.group_id());
        return;
    }

    let from = event.peer_id().clone();
    let name = event.event_name();
    let result = match event {
        SignalEvent::JoinGroup { peer_id, .. } => {
            if manager.current_user().id == peer_id || manager.has_link(&peer_id) {
                Ok(())
            } else {
                log::info!(target: "joynet", "Member {peer_id} joined group {}", manager.group_id());
                manager.add_member(&peer_id).await
            }
        }

        SignalEvent::Offer {
            offer,
            from_peer_id,
            ..
        } => manager.handle_incoming_offer(offer, &from_peer_id).await,

        SignalEvent::Answer {
            answer,
            from_peer_id,
            ..
        } => manager.handle_incoming_answer(answer, &from_peer_id).await,

        SignalEvent::IceCandidate {
            candidate,
            from_peer_id,
            ..
        } => {
            manager
                .handle_incoming_ice_candidate(candidate, &from_peer_id)
                .await;
            Ok(())
        }
    };

    if let Err(err) = result {
        log::warn!(target: "joynet", "Handling {name} from {from} failed: {err}");
    }
}
