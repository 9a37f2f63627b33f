//! Defaults and user-facing strings of the group chat subsystem.

use std::time::Duration;

pub const DEFAULT_SIGNALING_BASE_URL: &str = "http://127.0.0.1:3000";
/// How long a link may stay `disconnected` before a reconnect is requested
pub const RECONNECT_WATCHDOG: Duration = Duration::from_millis(5000);
/// ICE restarts allowed between two `connected` states. One more failure is terminal
pub const MAX_ICE_RESTARTS: usize = 1;
/// Data channels are labelled `{prefix}{groupId}`
pub const DATA_CHANNEL_LABEL_PREFIX: &str = "groupchat-";
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Capacity of the [`ChatEvent`](crate::events::ChatEvent) broadcast. Slow subscribers lose the oldest events
pub const EVENT_BUFFER: usize = 256;

pub const NOTICE_CONNECTED: &str = "Connected to group chat";
pub const NOTICE_CONNECT_FAILED: &str = "Failed to connect to group chat";
pub const NOTICE_CALL_STARTED: &str = "Video call started";
pub const NOTICE_CALL_FAILED: &str = "Failed to start video call";
pub const NOTICE_INCOMING_CALL_FAILED: &str = "Failed to process incoming call";
pub const NOTICE_ESTABLISH_FAILED: &str = "Failed to establish connection";
