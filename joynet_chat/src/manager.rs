//! # Peer Connection Manager
//!
//! Owns every [`PeerLink`] of one [`GroupSession`] and drives them through their lifecycle:
//!
//! - **Setup**: one link per remote member, each with an ordered data channel labelled after the group.
//!   The member with the lower id sends the first offer so that both sides never offer at once.
//! - **Negotiation**: inbound offers, answers and candidates are applied to the matching link. An offer or
//!   candidate from a listed member whose link is still being created is held and replayed once the link
//!   exists. Anything else addressed to a missing link is ignored.
//! - **Recovery**: a link that stays `disconnected` for the watchdog delay triggers one reconnect request.
//!   A `failed` link gets an ICE restart; failing again before reaching `connected` removes the link.
//! - **Calls**: local capture is attached to every link and offered to each peer independently, so one
//!   unreachable peer does not keep the others out of the call.
//!
//! All state lives behind `parking_lot` locks that are released before any await. Every handler that
//! awaits re-checks the link's [`LinkId`] before applying its result, because the link may have been removed
//! or replaced in the meantime.

use crate::constants::*;
use crate::events::ChatEvent;
use crate::media::{MediaSession, MediaState, RemoteStream};
use crate::message_channel::{MessageChannel, SendReport};
use crate::peer_link::{LinkId, PeerLink};
use crate::session::GroupSession;
use crate::settings::ChatSettings;
use futures::future::join_all;
use joynet_io::timer::DelayedTask;
use joynet_io::tokio::sync::broadcast;
use joynet_io::tokio::sync::mpsc::UnboundedReceiver;
use joynet_io::{spawn_cancellable, CancellationToken, Mutex, RwLock};
use joynet_rtc::prelude::*;
use joynet_signaling::SignalingClient;
use joynet_types::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// The outcome of [`PeerConnectionManager::start_call`]
#[derive(Debug, Default)]
pub struct CallStartReport {
    /// Members whose offer went out
    pub active: Vec<MemberId>,
    pub failures: Vec<(MemberId, ChatError)>,
}

impl CallStartReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Negotiation messages from a listed member that arrived before its link existed
#[derive(Default)]
struct HeldSignals {
    offer: Option<SessionDescription>,
    candidates: Vec<IceCandidate>,
}

enum IceAction {
    Nothing,
    Restart(Arc<dyn PeerConnection>),
    Terminal,
}

#[derive(Clone)]
pub struct PeerConnectionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    group_id: GroupId,
    current_user: Member,
    session: RwLock<GroupSession>,
    settings: ChatSettings,
    signaling: Arc<dyn SignalingClient>,
    connector: Arc<dyn PeerConnector>,
    media_devices: Option<Arc<dyn MediaDevices>>,
    ice_config: Mutex<Option<IceConfig>>,
    links: Mutex<Vec<PeerLink>>,
    held: Mutex<HashMap<MemberId, HeldSignals>>,
    next_link_id: AtomicU64,
    messages: MessageChannel,
    media: MediaSession,
    call_active: AtomicBool,
    events: broadcast::Sender<ChatEvent>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl PeerConnectionManager {
    pub(crate) fn new(
        session: GroupSession,
        settings: ChatSettings,
        signaling: Arc<dyn SignalingClient>,
        connector: Arc<dyn PeerConnector>,
        media_devices: Option<Arc<dyn MediaDevices>>,
        ice_config: Option<IceConfig>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let messages = MessageChannel::new(settings.data_channel_label(session.group_id()));
        let message_events = events.clone();
        messages.on_message(move |message| {
            let _ = message_events.send(ChatEvent::MessageReceived(message.clone()));
        });

        Self {
            inner: Arc::new(ManagerInner {
                group_id: session.group_id().clone(),
                current_user: session.current_user().clone(),
                session: RwLock::new(session),
                settings,
                signaling,
                connector,
                media_devices,
                ice_config: Mutex::new(ice_config),
                links: Mutex::new(Vec::new()),
                held: Mutex::new(HashMap::new()),
                next_link_id: AtomicU64::new(1),
                messages,
                media: MediaSession::default(),
                call_active: AtomicBool::new(false),
                events,
                cancel: CancellationToken::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// A snapshot of the session, including members that joined after it started
    pub fn session(&self) -> GroupSession {
        self.inner.session.read().clone()
    }

    pub fn group_id(&self) -> &GroupId {
        &self.inner.group_id
    }

    pub fn current_user(&self) -> &Member {
        &self.inner.current_user
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.inner.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn notify(&self, event: ChatEvent) {
        self.inner.emit(event)
    }

    /// Cancelled by [`Self::teardown`]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Members with a live link, in the order the links were created
    pub fn members(&self) -> Vec<MemberId> {
        self.inner
            .links
            .lock()
            .iter()
            .map(|link| link.member_id.clone())
            .collect()
    }

    pub fn has_link(&self, member: &MemberId) -> bool {
        self.inner.connection_for(member).is_some()
    }

    pub fn link_state(&self, member: &MemberId) -> Option<PeerLinkState> {
        self.inner
            .links
            .lock()
            .iter()
            .find(|link| &link.member_id == member)
            .map(|link| link.state)
    }

    /// True once this member was sent our call offer
    pub fn is_in_call(&self, member: &MemberId) -> bool {
        self.inner
            .links
            .lock()
            .iter()
            .any(|link| &link.member_id == member && link.call_active)
    }

    pub fn is_call_active(&self) -> bool {
        self.inner.call_active.load(Ordering::SeqCst)
    }

    pub fn media_state(&self) -> Option<MediaState> {
        self.inner.media.state()
    }

    pub fn local_tracks(&self) -> Vec<LocalTrack> {
        self.inner.media.local_tracks()
    }

    pub fn remote_streams(&self) -> Vec<RemoteStream> {
        self.inner.media.remote_streams()
    }

    pub fn messages(&self) -> &MessageChannel {
        &self.inner.messages
    }

    pub fn timeline(&self) -> Vec<ChatMessage> {
        self.inner.messages.timeline()
    }

    /// Creates a link to every member other than the local user. Fails if the ICE configuration is
    /// unavailable or no link could be created at all
    pub async fn init_session(&self, members: &[Member]) -> Result<(), ChatError> {
        self.inner.init_session(members).await
    }

    /// Lists a member that joined after the session started and creates its link. No-op for the local user
    /// and for members that already have a link
    pub async fn add_member(&self, member: &MemberId) -> Result<(), ChatError> {
        self.inner.add_member(member).await
    }

    pub async fn handle_incoming_offer(
        &self,
        offer: SessionDescription,
        from: &MemberId,
    ) -> Result<(), ChatError> {
        self.inner.handle_incoming_offer(offer, from).await
    }

    pub async fn handle_incoming_answer(
        &self,
        answer: SessionDescription,
        from: &MemberId,
    ) -> Result<(), ChatError> {
        self.inner.handle_incoming_answer(answer, from).await
    }

    /// Candidate failures are logged and swallowed
    pub async fn handle_incoming_ice_candidate(&self, candidate: IceCandidate, from: &MemberId) {
        self.inner.handle_incoming_ice_candidate(candidate, from).await
    }

    pub async fn send_message(&self, message: ChatMessage) -> Result<SendReport, ChatError> {
        self.inner.ensure_open()?;
        self.inner.messages.send(message).await
    }

    pub async fn start_call(&self) -> Result<CallStartReport, ChatError> {
        self.inner.start_call().await
    }

    pub fn toggle_audio(&self) -> Option<bool> {
        self.inner.media.toggle(TrackKind::Audio)
    }

    pub fn toggle_video(&self) -> Option<bool> {
        self.inner.media.toggle(TrackKind::Video)
    }

    /// Stops local capture and forgets remote streams. Safe to call without an active call
    pub fn end_call(&self) {
        self.inner.end_call()
    }

    /// Closes every link and stops every local track. Later calls do nothing
    pub async fn teardown(&self) {
        self.inner.teardown().await
    }
}

impl ManagerInner {
    fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }

    fn ensure_open(&self) -> Result<(), ChatError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(ChatError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn connection_for(&self, member: &MemberId) -> Option<(LinkId, Arc<dyn PeerConnection>)> {
        self.links
            .lock()
            .iter()
            .find(|link| &link.member_id == member)
            .map(|link| (link.link_id, link.connection.clone()))
    }

    fn is_self(&self, member: &MemberId) -> bool {
        &self.current_user.id == member
    }

    /// Returns the member's link. Without one, `hold` receives the member's held signals if the member is
    /// listed in the session, so they can be replayed once the link is created
    fn connection_or_hold(
        &self,
        member: &MemberId,
        what: &str,
        hold: impl FnOnce(&mut HeldSignals),
    ) -> Option<(LinkId, Arc<dyn PeerConnection>)> {
        let links = self.links.lock();
        if let Some(link) = links.iter().find(|link| &link.member_id == member) {
            return Some((link.link_id, link.connection.clone()));
        }

        let listed = self.session.read().member_ids().any(|id| id == member);
        if listed && !self.closed.load(Ordering::SeqCst) {
            log::debug!(target: "joynet", "Holding {what} from {member} until its link exists");
            hold(self.held.lock().entry(member.clone()).or_default());
        } else {
            log::debug!(target: "joynet", "Ignoring {what} from {member}: no link");
        }

        None
    }

    fn is_current(&self, member: &MemberId, link_id: LinkId) -> bool {
        self.links.lock().iter().any(|link| link.is(member, link_id))
    }

    fn link_cancel(&self, member: &MemberId, link_id: LinkId) -> Option<CancellationToken> {
        self.links
            .lock()
            .iter()
            .find(|link| link.is(member, link_id))
            .map(|link| link.cancel.clone())
    }

    async fn ice_config(&self) -> Result<IceConfig, ChatError> {
        let cached = self.ice_config.lock().clone();
        if let Some(config) = cached {
            return Ok(config);
        }

        let config = self
            .signaling
            .fetch_ice_config()
            .await
            .map_err(|err| match err {
                ChatError::ConfigFetch(..) => err,
                other => ChatError::ConfigFetch(other.into_string()),
            })?;
        config.validate()?;
        *self.ice_config.lock() = Some(config.clone());
        Ok(config)
    }

    async fn init_session(self: &Arc<Self>, members: &[Member]) -> Result<(), ChatError> {
        self.ensure_open()?;
        if let Err(err) = self.ice_config().await {
            log::error!(target: "joynet", "Failed to initialize group connection: {err}");
            self.emit(ChatEvent::error(NOTICE_CONNECT_FAILED));
            return Err(err);
        }

        let remote: Vec<&MemberId> = members
            .iter()
            .map(|member| &member.id)
            .filter(|id| !self.is_self(id))
            .collect();

        let mut failed = 0;
        for member in &remote {
            match self.add_member(member).await {
                Ok(()) => {}
                Err(ChatError::SessionClosed) => return Err(ChatError::SessionClosed),
                Err(err) => {
                    log::warn!(target: "joynet", "Unable to create peer link to {member}: {err}");
                    failed += 1;
                }
            }
        }

        if failed > 0 && failed == remote.len() {
            self.emit(ChatEvent::error(NOTICE_CONNECT_FAILED));
            return Err(ChatError::msg("unable to create a peer link to any member"));
        }

        log::info!(target: "joynet", "Group session {} initialized with {} link(s)", self.group_id, remote.len() - failed);
        self.emit(ChatEvent::success(NOTICE_CONNECTED));
        Ok(())
    }

    async fn add_member(self: &Arc<Self>, member: &MemberId) -> Result<(), ChatError> {
        self.ensure_open()?;
        if self.is_self(member) || self.connection_for(member).is_some() {
            return Ok(());
        }

        // listed before the first await so that its offers are held rather than dropped
        if self
            .session
            .write()
            .push_member(Member::new(member.clone(), member.as_str()))
        {
            log::debug!(target: "joynet", "Listed {member} in group session {}", self.group_id);
        }

        let result = self.create_link(member).await;
        if result.is_err() {
            let _ = self.held.lock().remove(member);
        }
        result
    }

    async fn create_link(self: &Arc<Self>, member: &MemberId) -> Result<(), ChatError> {
        let config = self.ice_config().await?;
        let connection = self.connector.connect(&config, member).await?;
        let channel = match connection.create_data_channel(self.messages.label()).await {
            Ok(channel) => channel,
            Err(err) => {
                close_quietly(member, &connection).await;
                return Err(err.into());
            }
        };
        let events = connection.take_events();

        let link_id = self.next_link_id.fetch_add(1, Ordering::SeqCst);
        let cancel = self.cancel.child_token();
        let inserted = {
            let mut links = self.links.lock();
            let taken = links.iter().any(|link| &link.member_id == member);
            if self.closed.load(Ordering::SeqCst) || taken {
                None
            } else {
                links.push(PeerLink::new(
                    member.clone(),
                    link_id,
                    connection.clone(),
                    cancel.clone(),
                ));
                // taken under the links lock so nothing is held after the link is visible
                Some(self.held.lock().remove(member))
            }
        };

        let Some(held) = inserted else {
            log::debug!(target: "joynet", "Discarding connection to {member}: session closed or link raced");
            close_quietly(member, &connection).await;
            return self.ensure_open();
        };

        log::info!(target: "joynet", "Created peer link #{link_id} to {member}");
        self.messages.attach(member, channel, cancel.clone());
        match events {
            Some(events) => self.spawn_event_pump(member.clone(), link_id, events, cancel),
            None => {
                log::warn!(target: "joynet", "Peer connection events for {member} were already taken")
            }
        }

        let answered = match held {
            Some(held) => self.replay_held(member, held).await,
            None => false,
        };

        if !answered && self.current_user.id < *member {
            if let Err(err) = self
                .send_offer(member, link_id, &connection, OfferOptions::default())
                .await
            {
                log::warn!(target: "joynet", "Initial offer to {member} failed: {err}");
            }
        }

        Ok(())
    }

    /// Applies signals that arrived while the link was being created. Returns true if a held offer was answered
    async fn replay_held(&self, member: &MemberId, held: HeldSignals) -> bool {
        let mut answered = false;
        if let Some(offer) = held.offer {
            log::debug!(target: "joynet", "Replaying held offer from {member}");
            match self.handle_incoming_offer(offer, member).await {
                Ok(()) => answered = true,
                Err(err) => log::warn!(target: "joynet", "Held offer from {member} failed: {err}"),
            }
        }

        for candidate in held.candidates {
            self.handle_incoming_ice_candidate(candidate, member).await;
        }

        answered
    }

    fn spawn_event_pump(
        self: &Arc<Self>,
        member: MemberId,
        link_id: LinkId,
        mut events: UnboundedReceiver<PeerEvent>,
        cancel: CancellationToken,
    ) {
        let this = Arc::downgrade(self);
        let _pump = spawn_cancellable(cancel, async move {
            while let Some(event) = events.recv().await {
                let Some(this) = this.upgrade() else {
                    break;
                };
                this.on_peer_event(&member, link_id, event).await;
            }
            log::trace!(target: "joynet", "Event pump for link #{link_id} to {member} finished");
        });
    }

    async fn on_peer_event(self: &Arc<Self>, member: &MemberId, link_id: LinkId, event: PeerEvent) {
        if !self.is_current(member, link_id) {
            log::debug!(target: "joynet", "Dropping {event:?} for stale link #{link_id} to {member}");
            return;
        }

        match event {
            PeerEvent::IceCandidate(candidate) => {
                log::trace!(target: "joynet", "Relaying local candidate to {member}: {}", candidate.candidate);
                if let Err(err) = self
                    .signaling
                    .send_ice_candidate(&candidate, member, &self.group_id)
                    .await
                {
                    log::warn!(target: "joynet", "Failed to send ICE candidate: {err}");
                }
            }

            PeerEvent::IceConnectionStateChange(state) => {
                self.on_ice_state(member, link_id, state).await
            }

            PeerEvent::DataChannel(channel) => {
                if let Some(cancel) = self.link_cancel(member, link_id) {
                    self.messages.attach(member, channel, cancel);
                }
            }

            PeerEvent::Track(track) => {
                log::info!(target: "joynet", "Received remote {} track from {member}", track.kind);
                let stream = self.media.add_remote_track(member, track);
                self.emit(ChatEvent::RemoteStreamUpdated {
                    member_id: member.clone(),
                    stream: Some(stream),
                });
            }
        }
    }

    async fn on_ice_state(
        self: &Arc<Self>,
        member: &MemberId,
        link_id: LinkId,
        ice_state: IceConnectionState,
    ) {
        let state = PeerLinkState::from(ice_state);
        let transition = {
            let mut links = self.links.lock();
            match links.iter_mut().find(|link| link.is(member, link_id)) {
                None => None,
                Some(link) => {
                    let previous = std::mem::replace(&mut link.state, state);
                    let action = match state {
                        PeerLinkState::Connected => {
                            link.ice_restarts = 0;
                            if let Some(watchdog) = link.watchdog.take() {
                                if watchdog.cancel() {
                                    log::debug!(target: "joynet", "Link to {member} recovered before the watchdog fired");
                                }
                            }
                            IceAction::Nothing
                        }

                        PeerLinkState::Disconnected => {
                            let armed = link
                                .watchdog
                                .as_ref()
                                .map(DelayedTask::is_pending)
                                .unwrap_or(false);
                            if previous != PeerLinkState::Disconnected && !armed {
                                link.watchdog = Some(self.schedule_watchdog(member, link_id));
                            }
                            IceAction::Nothing
                        }

                        PeerLinkState::Failed => {
                            if let Some(watchdog) = link.watchdog.take() {
                                let _ = watchdog.cancel();
                            }

                            if link.ice_restarts < self.settings.max_ice_restarts {
                                link.ice_restarts += 1;
                                IceAction::Restart(link.connection.clone())
                            } else {
                                IceAction::Terminal
                            }
                        }

                        _ => IceAction::Nothing,
                    };

                    Some((previous, action))
                }
            }
        };

        let Some((previous, action)) = transition else {
            return;
        };

        if previous != state {
            log::info!(target: "joynet", "ICE connection state with {member}: {ice_state}");
            self.emit(ChatEvent::LinkStateChanged {
                member_id: member.clone(),
                state,
            });

            if state == PeerLinkState::Disconnected {
                self.emit(ChatEvent::ConnectionLost(member.clone()));
            }
        }

        match action {
            IceAction::Nothing => {}
            IceAction::Restart(connection) => {
                log::warn!(target: "joynet", "ICE failed with {member}, restarting");
                if let Err(err) = self
                    .send_offer(member, link_id, &connection, OfferOptions::ice_restart())
                    .await
                {
                    log::warn!(target: "joynet", "ICE restart offer to {member} failed: {err}");
                }
            }
            IceAction::Terminal => {
                self.fail_link(
                    member,
                    link_id,
                    "ICE connection failed after restart".to_string(),
                )
                .await
            }
        }
    }

    fn schedule_watchdog(self: &Arc<Self>, member: &MemberId, link_id: LinkId) -> DelayedTask {
        let this = Arc::downgrade(self);
        let member = member.clone();
        let cancel = self.cancel.clone();
        DelayedTask::schedule(self.settings.reconnect_watchdog(), async move {
            let Some(this) = this.upgrade() else {
                return;
            };

            joynet_io::tokio::select! {
                _ = cancel.cancelled() => {}
                _ = this.on_watchdog(&member, link_id) => {}
            }
        })
    }

    async fn on_watchdog(&self, member: &MemberId, link_id: LinkId) {
        let still_disconnected = {
            let mut links = self.links.lock();
            match links.iter_mut().find(|link| link.is(member, link_id)) {
                Some(link) => {
                    // a newer watchdog may already be armed
                    let fired = link
                        .watchdog
                        .as_ref()
                        .map(|watchdog| !watchdog.is_pending())
                        .unwrap_or(false);
                    if fired {
                        link.watchdog = None;
                    }
                    link.state == PeerLinkState::Disconnected
                }
                None => false,
            }
        };

        if !still_disconnected {
            return;
        }

        log::info!(target: "joynet", "Link to {member} still disconnected after {:?}, requesting reconnect", self.settings.reconnect_watchdog());
        if let Err(err) = self
            .signaling
            .request_reconnect(member, &self.group_id)
            .await
        {
            log::warn!(target: "joynet", "Reconnect request for {member} failed: {err}");
        }
    }

    /// Creates an offer, applies it locally and relays it
    async fn send_offer(
        &self,
        member: &MemberId,
        link_id: LinkId,
        connection: &Arc<dyn PeerConnection>,
        options: OfferOptions,
    ) -> Result<(), ChatError> {
        let offer = connection
            .create_offer(options)
            .await
            .map_err(|err| ChatError::protocol(Some(member), err))?;
        if !self.is_current(member, link_id) {
            return Err(link_gone(member));
        }

        connection
            .set_local_description(offer.clone())
            .await
            .map_err(|err| ChatError::protocol(Some(member), err))?;
        if !self.is_current(member, link_id) {
            return Err(link_gone(member));
        }

        log::trace!(target: "joynet", "Sending offer to {member} (ice restart: {})", options.ice_restart);
        self.signaling
            .send_offer(&offer, member, &self.group_id)
            .await
    }

    async fn fail_link(&self, member: &MemberId, link_id: LinkId, reason: String) {
        log::error!(target: "joynet", "Link to {member} failed permanently: {reason}");
        self.emit(ChatEvent::CallError {
            member_id: member.clone(),
            reason,
        });
        let _ = self.remove_link(member, link_id).await;
    }

    async fn remove_link(&self, member: &MemberId, link_id: LinkId) -> bool {
        let removed = {
            let mut links = self.links.lock();
            links
                .iter()
                .position(|link| link.is(member, link_id))
                .map(|idx| links.remove(idx))
        };

        let Some(mut link) = removed else {
            return false;
        };

        let _ = self.messages.detach(member);
        let had_stream = self.media.remove_remote(member).is_some();
        close_quietly(member, &link.connection).await;
        // may cancel the task running this function, so nothing below awaits
        link.shutdown();

        if had_stream {
            self.emit(ChatEvent::RemoteStreamUpdated {
                member_id: member.clone(),
                stream: None,
            });
        }
        self.emit(ChatEvent::LinkStateChanged {
            member_id: member.clone(),
            state: PeerLinkState::Closed,
        });
        true
    }

    async fn handle_incoming_offer(
        &self,
        offer: SessionDescription,
        from: &MemberId,
    ) -> Result<(), ChatError> {
        let hold = offer.clone();
        let Some((link_id, connection)) = self.connection_or_hold(from, "offer", |held| {
            held.offer = Some(hold);
            held.candidates.clear();
        }) else {
            return Ok(());
        };

        if let Err(err) = connection.set_remote_description(offer).await {
            if !self.is_current(from, link_id) {
                log::debug!(target: "joynet", "Link to {from} went away while applying its offer");
                return Ok(());
            }
            return Err(self.incoming_call_failed(from, err));
        }

        if !self.is_current(from, link_id) {
            log::debug!(target: "joynet", "Link to {from} went away while applying its offer");
            return Ok(());
        }

        let answer = match create_and_apply_answer(&connection).await {
            Ok(answer) => answer,
            Err(err) => {
                if let Err(rollback_err) = connection
                    .set_remote_description(SessionDescription::rollback())
                    .await
                {
                    log::warn!(target: "joynet", "Rollback for {from} failed: {rollback_err}");
                }
                return Err(self.incoming_call_failed(from, err));
            }
        };

        if !self.is_current(from, link_id) {
            return Ok(());
        }

        self.signaling
            .send_answer(&answer, from, &self.group_id)
            .await
            .map_err(|err| {
                log::warn!(target: "joynet", "Failed to send answer to {from}: {err}");
                self.emit(ChatEvent::error(NOTICE_INCOMING_CALL_FAILED));
                err
            })
    }

    fn incoming_call_failed(&self, from: &MemberId, err: RtcError) -> ChatError {
        log::warn!(target: "joynet", "Error handling offer from {from}: {err}");
        self.emit(ChatEvent::error(NOTICE_INCOMING_CALL_FAILED));
        ChatError::protocol(Some(from), err)
    }

    async fn handle_incoming_answer(
        &self,
        answer: SessionDescription,
        from: &MemberId,
    ) -> Result<(), ChatError> {
        let Some((_, connection)) = self.connection_for(from) else {
            log::debug!(target: "joynet", "Ignoring answer from {from}: no link");
            return Ok(());
        };

        connection
            .set_remote_description(answer)
            .await
            .map_err(|err| {
                log::warn!(target: "joynet", "Error handling answer from {from}: {err}");
                self.emit(ChatEvent::error(NOTICE_ESTABLISH_FAILED));
                ChatError::protocol(Some(from), err)
            })
    }

    async fn handle_incoming_ice_candidate(&self, candidate: IceCandidate, from: &MemberId) {
        let hold = candidate.clone();
        let Some((_, connection)) = self.connection_or_hold(from, "ICE candidate", |held| {
            held.candidates.push(hold)
        }) else {
            return;
        };

        if let Err(err) = connection.add_ice_candidate(candidate).await {
            log::warn!(target: "joynet", "Error adding ICE candidate from {from}: {err}");
        }
    }

    fn call_failed(&self, err: ChatError) -> ChatError {
        log::error!(target: "joynet", "Failed to start video call: {err}");
        self.emit(ChatEvent::error(NOTICE_CALL_FAILED));
        err
    }

    async fn start_call(&self) -> Result<CallStartReport, ChatError> {
        self.ensure_open()?;
        if self.media.is_active() {
            return Err(ChatError::msg("a call is already active"));
        }

        let _config = self.ice_config().await.map_err(|err| self.call_failed(err))?;
        let devices = self
            .media_devices
            .clone()
            .ok_or_else(|| self.call_failed(ChatError::MediaAccess("no media devices".into())))?;
        let stream = devices
            .get_user_media(MediaConstraints::default())
            .await
            .map_err(|err| {
                let reason = match err {
                    RtcError::MediaAccess(reason) => reason,
                    other => other.into_string(),
                };
                self.call_failed(ChatError::MediaAccess(reason))
            })?;

        if self.closed.load(Ordering::SeqCst) {
            let _ = stream.stop_all();
            return Err(ChatError::SessionClosed);
        }

        if !self.media.begin(stream.clone()) {
            let _ = stream.stop_all();
            return Err(ChatError::msg("a call is already active"));
        }

        let targets: Vec<(MemberId, LinkId, Arc<dyn PeerConnection>)> = self
            .links
            .lock()
            .iter()
            .map(|link| (link.member_id.clone(), link.link_id, link.connection.clone()))
            .collect();

        let tracks = stream.tracks();
        let results = join_all(targets.into_iter().map(|(member, link_id, connection)| async move {
            let result = self
                .dispatch_call_offer(&member, link_id, &connection, tracks)
                .await;
            (member, link_id, result)
        }))
        .await;

        if self.closed.load(Ordering::SeqCst) {
            let _ = self.media.end();
            return Err(ChatError::SessionClosed);
        }

        let mut report = CallStartReport::default();
        {
            let mut links = self.links.lock();
            for (member, link_id, result) in results {
                match (result, links.iter_mut().find(|link| link.is(&member, link_id))) {
                    (Ok(()), Some(link)) => {
                        link.call_active = true;
                        report.active.push(member);
                    }
                    (Ok(()), None) => {
                        let err = link_gone(&member);
                        report.failures.push((member, err));
                    }
                    (Err(err), _) => report.failures.push((member, err)),
                }
            }
        }

        for (member, err) in &report.failures {
            log::warn!(target: "joynet", "Failed to create/send offer to peer {member}: {err}");
            self.emit(ChatEvent::CallError {
                member_id: member.clone(),
                reason: err.to_string(),
            });
        }

        if report.active.is_empty() && !report.failures.is_empty() {
            let _ = self.media.end();
            let _ = self.call_failed(ChatError::msg("no peer accepted the call offer"));
            return Ok(report);
        }

        self.call_active.store(true, Ordering::SeqCst);
        log::info!(target: "joynet", "Video call started with {} peer(s), {} failure(s)", report.active.len(), report.failures.len());
        self.emit(ChatEvent::CallStarted {
            active: report.active.clone(),
            failed: report.failures.iter().map(|(member, _)| member.clone()).collect(),
        });
        self.emit(ChatEvent::success(NOTICE_CALL_STARTED));
        Ok(report)
    }

    async fn dispatch_call_offer(
        &self,
        member: &MemberId,
        link_id: LinkId,
        connection: &Arc<dyn PeerConnection>,
        tracks: &[LocalTrack],
    ) -> Result<(), ChatError> {
        for track in tracks {
            connection.add_track(track.clone()).await?;
        }

        self.send_offer(member, link_id, connection, OfferOptions::default())
            .await
    }

    fn end_call(&self) {
        let was_active = self.call_active.swap(false, Ordering::SeqCst);
        let had_capture = self.media.end();
        for link in self.links.lock().iter_mut() {
            link.call_active = false;
        }

        if was_active || had_capture {
            self.emit(ChatEvent::CallEnded);
        }
    }

    async fn teardown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            log::debug!(target: "joynet", "Group session {} already torn down", self.group_id);
            return;
        }

        log::info!(target: "joynet", "Tearing down group session {}", self.group_id);
        let links = std::mem::take(&mut *self.links.lock());
        self.held.lock().clear();
        self.messages.clear();
        self.end_call();

        for mut link in links {
            close_quietly(&link.member_id, &link.connection).await;
            link.shutdown();
            self.emit(ChatEvent::LinkStateChanged {
                member_id: link.member_id.clone(),
                state: PeerLinkState::Closed,
            });
        }

        self.cancel.cancel();
    }
}

async fn create_and_apply_answer(
    connection: &Arc<dyn PeerConnection>,
) -> Result<SessionDescription, RtcError> {
    let answer = connection.create_answer().await?;
    connection.set_local_description(answer.clone()).await?;
    Ok(answer)
}

async fn close_quietly(member: &MemberId, connection: &Arc<dyn PeerConnection>) {
    if let Err(err) = connection.close().await {
        log::warn!(target: "joynet", "Error closing connection to {member}: {err}");
    }
}

fn link_gone(member: &MemberId) -> ChatError {
    ChatError::msg(format!("link to {member} was closed"))
}
