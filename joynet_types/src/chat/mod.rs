//! Chat messages and the wire schema spoken over data channels.
//!
//! Every data channel payload is a JSON object tagged with a `kind` field. Only `chat` exists today.
//! Anything else, including well-formed JSON of an unknown kind, is rejected as
//! [`ChatError::MessageParse`](crate::errors::ChatError::MessageParse).

use crate::errors::ChatError;
use crate::user::{Member, MemberId};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// An immutable chat line. Fields are private so a message cannot be altered after creation
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    id: String,
    sender_id: MemberId,
    sender_name: String,
    text: String,
    #[serde(with = "iso8601")]
    timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Creates a new message authored by `sender`, stamped with a fresh v4 id and the current time
    pub fn new<T: Into<String>>(sender: &Member, text: T) -> Self {
        Self::from_parts(
            uuid::Uuid::new_v4().to_string(),
            sender.id.clone(),
            sender.name.clone(),
            text,
            Utc::now(),
        )
    }

    pub fn from_parts<I: Into<String>, N: Into<String>, T: Into<String>>(
        id: I,
        sender_id: MemberId,
        sender_name: N,
        text: T,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            sender_id,
            sender_name: sender_name.into(),
            text: text.into(),
            timestamp,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sender_id(&self) -> &MemberId {
        &self.sender_id
    }

    pub fn sender_name(&self) -> &str {
        &self.sender_name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timestamp(&self) -> &DateTime<Utc> {
        &self.timestamp
    }
}

mod iso8601 {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// The tagged payload carried by a data channel frame
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelPayload {
    Chat(ChatMessage),
}

impl ChannelPayload {
    pub fn encode(&self) -> Result<String, ChatError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, ChatError> {
        let payload: Self = serde_json::from_str(raw)?;
        payload.validate()?;
        Ok(payload)
    }

    fn validate(&self) -> Result<(), ChatError> {
        match self {
            Self::Chat(message) => {
                if message.id.is_empty() {
                    return Err(ChatError::MessageParse("message id is empty".into()));
                }

                if message.sender_id.as_str().is_empty() {
                    return Err(ChatError::MessageParse("sender id is empty".into()));
                }

                Ok(())
            }
        }
    }
}

impl From<ChatMessage> for ChannelPayload {
    fn from(message: ChatMessage) -> Self {
        Self::Chat(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn alice() -> Member {
        Member::new("alice", "Alice")
    }

    #[test]
    fn chat_message_round_trip() {
        let original = ChatMessage::new(&alice(), "hello");
        let encoded = ChannelPayload::from(original.clone()).encode().unwrap();
        let ChannelPayload::Chat(decoded) = ChannelPayload::decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn wire_shape_is_tagged_and_camel_cased() {
        let ts = DateTime::parse_from_rfc3339("2024-03-01T10:00:00.250Z")
            .unwrap()
            .with_timezone(&Utc);
        let message = ChatMessage::from_parts("m1", "alice".into(), "Alice", "hi", ts);
        let value: serde_json::Value =
            serde_json::from_str(&ChannelPayload::Chat(message).encode().unwrap()).unwrap();
        assert_eq!(value["kind"], "chat");
        assert_eq!(value["senderId"], "alice");
        assert_eq!(value["senderName"], "Alice");
        assert_eq!(value["timestamp"], "2024-03-01T10:00:00.250Z");
    }

    #[test]
    fn new_messages_get_distinct_ids() {
        let a = ChatMessage::new(&alice(), "one");
        let b = ChatMessage::new(&alice(), "one");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.sender_id(), &MemberId::from("alice"));
    }

    #[rstest]
    #[case("not json")]
    #[case(r#"{"kind":"typing","senderId":"a"}"#)]
    #[case(r#"{"id":"1","senderId":"a","senderName":"A","text":"x","timestamp":"2024-03-01T10:00:00Z"}"#)]
    #[case(r#"{"kind":"chat","id":"","senderId":"a","senderName":"A","text":"x","timestamp":"2024-03-01T10:00:00Z"}"#)]
    #[case(r#"{"kind":"chat","id":"1","senderId":"a","senderName":"A","text":"x","timestamp":"yesterday"}"#)]
    fn rejects_unknown_shapes(#[case] raw: &str) {
        assert!(matches!(
            ChannelPayload::decode(raw),
            Err(ChatError::MessageParse(_))
        ));
    }
}
