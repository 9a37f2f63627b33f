//! ICE server configuration as served by `GET /api/webrtc-config`.

use crate::errors::ChatError;
use serde::{Deserialize, Deserializer, Serialize};
use strum::{AsRefStr, Display, EnumString};

const STUN_SCHEMES: &[&str] = &["stun:", "stuns:"];
const TURN_SCHEMES: &[&str] = &["turn:", "turns:"];

#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, Eq, PartialEq, AsRefStr, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum IceTransportPolicy {
    #[default]
    All,
    Relay,
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, Eq, PartialEq, AsRefStr, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum BundlePolicy {
    #[default]
    Balanced,
    MaxCompat,
    MaxBundle,
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, Eq, PartialEq, AsRefStr, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RtcpMuxPolicy {
    Negotiate,
    #[default]
    Require,
}

/// One STUN or TURN server entry
#[derive(Serialize, Clone, Debug, Default, Eq, PartialEq)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun<T: Into<String>>(url: T) -> Self {
        Self {
            urls: vec![url.into()],
            ..Default::default()
        }
    }

    pub fn turn<T: Into<String>, U: Into<String>, C: Into<String>>(
        url: T,
        username: U,
        credential: C,
    ) -> Self {
        Self {
            urls: vec![url.into()],
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }

    pub fn is_turn(&self) -> bool {
        self.urls
            .iter()
            .any(|url| TURN_SCHEMES.iter().any(|scheme| url.starts_with(scheme)))
    }

    fn validate(&self) -> Result<(), ChatError> {
        if self.urls.is_empty() {
            return Err(ChatError::ConfigFetch("ICE server entry has no urls".into()));
        }

        for url in &self.urls {
            let known = STUN_SCHEMES
                .iter()
                .chain(TURN_SCHEMES)
                .any(|scheme| url.starts_with(scheme));
            if !known {
                return Err(ChatError::ConfigFetch(format!(
                    "unsupported ICE server url '{url}'"
                )));
            }
        }

        if self.is_turn() && (self.username.is_none() || self.credential.is_none()) {
            return Err(ChatError::ConfigFetch(format!(
                "TURN server {:?} is missing credentials",
                self.urls
            )));
        }

        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawIceServer {
    Url(String),
    Full {
        urls: OneOrMany,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        credential: Option<String>,
    },
}

impl<'de> Deserialize<'de> for IceServer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawIceServer::deserialize(deserializer)? {
            RawIceServer::Url(url) => IceServer::stun(url),
            RawIceServer::Full {
                urls,
                username,
                credential,
            } => IceServer {
                urls: match urls {
                    OneOrMany::One(url) => vec![url],
                    OneOrMany::Many(urls) => urls,
                },
                username,
                credential,
            },
        })
    }
}

/// The ICE configuration a peer connection is created with
#[derive(Serialize, Deserialize, Clone, Debug, Default, Eq, PartialEq)]
#[serde(default)]
pub struct IceConfig {
    pub stun_servers: Vec<IceServer>,
    pub turn_servers: Vec<IceServer>,
    pub ice_transport_policy: IceTransportPolicy,
    pub bundle_policy: BundlePolicy,
    pub rtcp_mux_policy: RtcpMuxPolicy,
    pub ice_candidate_pool_size: u8,
}

impl IceConfig {
    /// The public Google STUN pair, for deployments without a config endpoint
    pub fn public_stun() -> Self {
        Self {
            stun_servers: vec![
                IceServer::stun("stun:stun.l.google.com:19302"),
                IceServer::stun("stun:stun1.l.google.com:19302"),
            ],
            ..Default::default()
        }
    }

    /// All servers, STUN entries first
    pub fn ice_servers(&self) -> impl Iterator<Item = &IceServer> {
        self.stun_servers.iter().chain(self.turn_servers.iter())
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        if self.ice_servers().next().is_none() {
            return Err(ChatError::ConfigFetch("no ICE servers configured".into()));
        }

        for server in self.ice_servers() {
            server.validate()?;
        }

        if self.ice_transport_policy == IceTransportPolicy::Relay
            && !self.ice_servers().any(IceServer::is_turn)
        {
            return Err(ChatError::ConfigFetch(
                "relay-only transport policy requires a TURN server".into(),
            ));
        }

        Ok(())
    }
}
