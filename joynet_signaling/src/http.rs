//! [`SignalingClient`] over the JoyNet signaling HTTP API
use crate::client::SignalingClient;
use async_trait::async_trait;
use joynet_types::prelude::*;
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `GET`, returns the [`IceConfig`] body
pub const WEBRTC_CONFIG_ENDPOINT: &str = "api/webrtc-config";
/// `POST {offer, peerId, groupId}`
pub const OFFER_ENDPOINT: &str = "api/signaling/offer";
/// `POST {answer, peerId, groupId}`
pub const ANSWER_ENDPOINT: &str = "api/signaling/answer";
/// `POST {candidate, peerId, groupId}`
pub const ICE_CANDIDATE_ENDPOINT: &str = "api/signaling/ice-candidate";
/// `POST {peerId, groupId}`
pub const RECONNECT_ENDPOINT: &str = "api/signaling/reconnect";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    offer: Option<&'a SessionDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<&'a SessionDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidate: Option<&'a IceCandidate>,
    peer_id: &'a MemberId,
    group_id: &'a GroupId,
}

impl<'a> RelayBody<'a> {
    fn new(peer_id: &'a MemberId, group_id: &'a GroupId) -> Self {
        Self {
            offer: None,
            answer: None,
            candidate: None,
            peer_id,
            group_id,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// The default [`SignalingClient`], speaking JSON over HTTP(S)
#[derive(Clone, Debug)]
pub struct HttpSignalingClient {
    client: Client,
    base: Url,
}

impl HttpSignalingClient {
    /// Creates a client rooted at `base_url` (e.g. `http://127.0.0.1:3000`)
    pub fn new<T: AsRef<str>>(base_url: T, timeout: Duration) -> Result<Self, ChatError> {
        let client = Client::builder()
            .tcp_nodelay(true)
            .timeout(timeout)
            .build()
            .map_err(|err| ChatError::msg(err.to_string()))?;
        Self::with_client(client, base_url)
    }

    /// Uses an existing reqwest client
    pub fn with_client<T: AsRef<str>>(client: Client, base_url: T) -> Result<Self, ChatError> {
        let mut raw = base_url.as_ref().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }

        let base = Url::parse(&raw)
            .map_err(|err| ChatError::msg(format!("invalid signaling url '{raw}': {err}")))?;
        Ok(Self { client, base })
    }

    /// The root every endpoint is resolved against
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, String> {
        self.base.join(path).map_err(|err| err.to_string())
    }

    async fn relay(&self, path: &str, body: RelayBody<'_>) -> Result<(), ChatError> {
        let peer = body.peer_id;
        let url = self
            .endpoint(path)
            .map_err(|err| ChatError::signaling_send(peer, err))?;

        log::trace!(target: "joynet", "POST {url} for {peer}");
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|err| ChatError::signaling_send(peer, err))?;

        check_status(response)
            .await
            .map(|_| ())
            .map_err(|reason| ChatError::signaling_send(peer, reason))
    }
}

/// Maps non-2xx responses onto the `{error}` message the server sends with them
async fn check_status(response: Response) -> Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = response
        .json::<ErrorBody>()
        .await
        .map(|body| body.error)
        .unwrap_or_else(|_| "no details".to_string());
    Err(format!("HTTP {status}: {detail}"))
}

#[async_trait]
impl SignalingClient for HttpSignalingClient {
    async fn fetch_ice_config(&self) -> Result<IceConfig, ChatError> {
        let url = self
            .endpoint(WEBRTC_CONFIG_ENDPOINT)
            .map_err(ChatError::ConfigFetch)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ChatError::ConfigFetch(err.to_string()))?;
        let config = check_status(response)
            .await
            .map_err(ChatError::ConfigFetch)?
            .json::<IceConfig>()
            .await
            .map_err(|err| ChatError::ConfigFetch(err.to_string()))?;

        config.validate()?;
        log::debug!(target: "joynet", "Fetched ICE config with {} server(s)", config.ice_servers().count());
        Ok(config)
    }

    async fn send_offer(
        &self,
        offer: &SessionDescription,
        peer: &MemberId,
        group: &GroupId,
    ) -> Result<(), ChatError> {
        let body = RelayBody {
            offer: Some(offer),
            ..RelayBody::new(peer, group)
        };
        self.relay(OFFER_ENDPOINT, body).await
    }

    async fn send_answer(
        &self,
        answer: &SessionDescription,
        peer: &MemberId,
        group: &GroupId,
    ) -> Result<(), ChatError> {
        let body = RelayBody {
            answer: Some(answer),
            ..RelayBody::new(peer, group)
        };
        self.relay(ANSWER_ENDPOINT, body).await
    }

    async fn send_ice_candidate(
        &self,
        candidate: &IceCandidate,
        peer: &MemberId,
        group: &GroupId,
    ) -> Result<(), ChatError> {
        let body = RelayBody {
            candidate: Some(candidate),
            ..RelayBody::new(peer, group)
        };
        self.relay(ICE_CANDIDATE_ENDPOINT, body).await
    }

    async fn request_reconnect(&self, peer: &MemberId, group: &GroupId) -> Result<(), ChatError> {
        self.relay(RECONNECT_ENDPOINT, RelayBody::new(peer, group))
            .await
    }
}
