//! Chat text over per-peer data channels.
//!
//! Outgoing messages are appended to the local timeline first and then written once to every member that has
//! an open channel. Members whose channel is still connecting simply miss the message; nothing is queued.
//! Inbound frames from every member are folded into the same timeline in receipt order.

use joynet_io::{spawn_cancellable, CancellationToken, Mutex};
use joynet_rtc::channel::{ChannelEvent, DataChannel};
use joynet_types::prelude::*;
use std::sync::Arc;

type MessageHandler = Arc<dyn Fn(&ChatMessage) + Send + Sync>;

/// Who received a sent message
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SendReport {
    pub delivered: Vec<MemberId>,
    pub dropped: Vec<MemberId>,
}

struct MessageChannelInner {
    label: String,
    timeline: Mutex<Vec<ChatMessage>>,
    peers: Mutex<Vec<(MemberId, Vec<Arc<dyn DataChannel>>)>>,
    handlers: Mutex<Vec<MessageHandler>>,
}

#[derive(Clone)]
pub struct MessageChannel {
    inner: Arc<MessageChannelInner>,
}

impl MessageChannel {
    pub fn new<T: Into<String>>(label: T) -> Self {
        Self {
            inner: Arc::new(MessageChannelInner {
                label: label.into(),
                timeline: Mutex::new(Vec::new()),
                peers: Mutex::new(Vec::new()),
                handlers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The label every data channel of this group carries
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Registers `handler` for every successfully parsed inbound message
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.inner.handlers.lock().push(Arc::new(handler));
    }

    /// Adds `channel` to `member` and reads it until `cancel` fires or the channel's event stream ends
    pub fn attach(
        &self,
        member: &MemberId,
        channel: Arc<dyn DataChannel>,
        cancel: CancellationToken,
    ) {
        if channel.label() != self.inner.label {
            log::warn!(target: "joynet", "Ignoring data channel '{}' from {member}: expected '{}'", channel.label(), self.inner.label);
            return;
        }

        let events = channel.take_events();
        {
            let mut peers = self.inner.peers.lock();
            match peers.iter_mut().find(|(id, _)| id == member) {
                Some((_, channels)) => channels.push(channel),
                None => peers.push((member.clone(), vec![channel])),
            }
        }

        let Some(mut events) = events else {
            log::debug!(target: "joynet", "Data channel events for {member} already taken");
            return;
        };

        let inner = self.inner.clone();
        let member = member.clone();
        let _reader = spawn_cancellable(cancel, async move {
            while let Some(event) = events.recv().await {
                match event {
                    ChannelEvent::Open => {
                        log::info!(target: "joynet", "Data channel opened with member {member}")
                    }
                    ChannelEvent::Close => {
                        log::info!(target: "joynet", "Data channel closed with member {member}")
                    }
                    ChannelEvent::Error(err) => {
                        log::error!(target: "joynet", "Data channel error with member {member}: {err}")
                    }
                    ChannelEvent::Message(raw) => inner.receive(&member, &raw),
                }
            }
        });
    }

    /// Forgets every channel of `member`
    pub fn detach(&self, member: &MemberId) -> Vec<Arc<dyn DataChannel>> {
        let mut peers = self.inner.peers.lock();
        match peers.iter().position(|(id, _)| id == member) {
            Some(idx) => peers.remove(idx).1,
            None => Vec::new(),
        }
    }

    pub fn clear(&self) {
        self.inner.peers.lock().clear();
    }

    /// Members with at least one open channel
    pub fn open_peers(&self) -> Vec<MemberId> {
        self.inner
            .peers
            .lock()
            .iter()
            .filter(|(_, channels)| channels.iter().any(|channel| channel.is_open()))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Appends `message` to the timeline, then writes one copy to the first open channel of every member
    pub async fn send(&self, message: ChatMessage) -> Result<SendReport, ChatError> {
        let payload = ChannelPayload::Chat(message.clone()).encode()?;
        self.inner.timeline.lock().push(message);

        let targets: Vec<(MemberId, Option<Arc<dyn DataChannel>>)> = self
            .inner
            .peers
            .lock()
            .iter()
            .map(|(id, channels)| {
                let open = channels.iter().find(|channel| channel.is_open()).cloned();
                (id.clone(), open)
            })
            .collect();

        let mut report = SendReport::default();
        for (member, channel) in targets {
            match channel {
                Some(channel) => match channel.send_text(&payload).await {
                    Ok(()) => report.delivered.push(member),
                    Err(err) => {
                        log::warn!(target: "joynet", "Failed to send message to {member}: {err}");
                        report.dropped.push(member);
                    }
                },
                None => {
                    log::trace!(target: "joynet", "No open data channel to {member}, dropping message");
                    report.dropped.push(member);
                }
            }
        }

        Ok(report)
    }

    pub fn timeline(&self) -> Vec<ChatMessage> {
        self.inner.timeline.lock().clone()
    }

    /// Puts previously stored messages in front of everything already in the timeline
    pub fn prepend_history(&self, history: Vec<ChatMessage>) {
        let mut timeline = self.inner.timeline.lock();
        let current = std::mem::replace(&mut *timeline, history);
        timeline.extend(current);
    }
}

impl MessageChannelInner {
    fn receive(&self, member: &MemberId, raw: &str) {
        let message = match ChannelPayload::decode(raw) {
            Ok(ChannelPayload::Chat(message)) => message,
            Err(err) => {
                log::warn!(target: "joynet", "Dropping payload from {member}: {err}");
                return;
            }
        };

        log::trace!(target: "joynet", "Received message {} from {member}", message.id());
        self.timeline.lock().push(message.clone());
        let handlers = self.handlers.lock().clone();
        for handler in handlers {
            (handler)(&message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use joynet_rtc::simulator::SimulatedDataChannel;
    use std::time::Duration;

    const LABEL: &str = "groupchat-g";

    fn alice() -> Member {
        Member::new("a", "Ada")
    }

    #[tokio::test]
    async fn one_copy_per_member_with_an_open_channel() {
        joynet_logging::setup_log();
        let messages = MessageChannel::new(LABEL);
        let cancel = CancellationToken::new();
        let open = SimulatedDataChannel::new(LABEL);
        let also_open = SimulatedDataChannel::new(LABEL);
        let connecting = SimulatedDataChannel::new(LABEL);
        open.open();
        also_open.open();

        messages.attach(&MemberId::from("b"), open.clone(), cancel.clone());
        messages.attach(&MemberId::from("b"), also_open.clone(), cancel.clone());
        messages.attach(&MemberId::from("c"), connecting.clone(), cancel.clone());

        let report = messages
            .send(ChatMessage::new(&alice(), "hello"))
            .await
            .unwrap();
        assert_eq!(report.delivered, [MemberId::from("b")]);
        assert_eq!(report.dropped, [MemberId::from("c")]);
        assert_eq!(open.sent().len(), 1);
        assert!(also_open.sent().is_empty());
        assert!(connecting.sent().is_empty());
        assert_eq!(messages.timeline().len(), 1);
        assert_eq!(messages.open_peers(), [MemberId::from("b")]);
    }

    #[tokio::test]
    async fn inbound_frames_reach_timeline_and_handlers() {
        joynet_logging::setup_log();
        let messages = MessageChannel::new(LABEL);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_handler = seen.clone();
        messages.on_message(move |message| seen_handler.lock().push(message.text().to_string()));

        let channel = SimulatedDataChannel::new(LABEL);
        messages.attach(&MemberId::from("b"), channel.clone(), CancellationToken::new());

        let remote = ChatMessage::new(&Member::new("b", "Bo"), "hi there");
        channel.deliver("{not json");
        channel.deliver(r#"{"kind":"presence","who":"b"}"#);
        channel.deliver(ChannelPayload::Chat(remote.clone()).encode().unwrap());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(messages.timeline(), [remote]);
        assert_eq!(*seen.lock(), ["hi there".to_string()]);
    }

    #[tokio::test]
    async fn foreign_labels_are_ignored() {
        let messages = MessageChannel::new(LABEL);
        let channel = SimulatedDataChannel::new("groupchat-other");
        channel.open();
        messages.attach(&MemberId::from("b"), channel, CancellationToken::new());
        assert!(messages.open_peers().is_empty());
    }

    #[test]
    fn history_goes_first() {
        let messages = MessageChannel::new(LABEL);
        let old = ChatMessage::new(&alice(), "earlier");
        let new = ChatMessage::new(&alice(), "now");
        messages.inner.timeline.lock().push(new.clone());
        messages.prepend_history(vec![old.clone()]);
        assert_eq!(messages.timeline(), [old, new]);
    }
}
