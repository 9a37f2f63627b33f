use crate::manager::PeerConnectionManager;
use crate::session::GroupSession;
use crate::settings::ChatSettings;
use crate::view_model::ChatViewModel;
use joynet_rtc::connection::PeerConnector;
use joynet_rtc::media::MediaDevices;
use joynet_signaling::{HttpSignalingClient, SignalingClient, SignalingSocket};
use joynet_types::ice::IceConfig;
use std::sync::Arc;

/// Used for constructing a [`PeerConnectionManager`] for one group session.
///
/// Anything left unset falls back to a default: the HTTP signaling client pointed at
/// [`ChatSettings::signaling_base_url`], and the webrtc-rs connector when the `webrtc` feature is enabled.
#[derive(Default)]
pub struct GroupChatBuilder {
    signaling: Option<Arc<dyn SignalingClient>>,
    connector: Option<Arc<dyn PeerConnector>>,
    media_devices: Option<Arc<dyn MediaDevices>>,
    settings: Option<ChatSettings>,
    ice_config: Option<IceConfig>,
}

impl GroupChatBuilder {
    pub fn with_signaling_client<T: SignalingClient + 'static>(&mut self, client: T) -> &mut Self {
        self.signaling = Some(Arc::new(client));
        self
    }

    pub fn with_connector<T: PeerConnector + 'static>(&mut self, connector: T) -> &mut Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Without media devices, [`PeerConnectionManager::start_call`] fails with a media access error
    pub fn with_media_devices<T: MediaDevices + 'static>(&mut self, devices: T) -> &mut Self {
        self.media_devices = Some(Arc::new(devices));
        self
    }

    pub fn with_settings(&mut self, settings: ChatSettings) -> &mut Self {
        self.settings = Some(settings);
        self
    }

    /// Skips the ICE configuration fetch and uses `config` instead
    pub fn with_ice_config(&mut self, config: IceConfig) -> &mut Self {
        self.ice_config = Some(config);
        self
    }

    fn check(&self) -> anyhow::Result<()> {
        if let Some(settings) = self.settings.as_ref() {
            settings.check()?;
        }

        if let Some(config) = self.ice_config.as_ref() {
            config
                .validate()
                .map_err(|err| anyhow::Error::msg(err.into_string()))?;
        }

        Ok(())
    }

    /// Returns the manager. Nothing connects until [`PeerConnectionManager::init_session`] is called
    pub fn build(&mut self, session: GroupSession) -> anyhow::Result<PeerConnectionManager> {
        self.check()?;
        let settings = self.settings.clone().unwrap_or_default();

        let signaling: Arc<dyn SignalingClient> = match self.signaling.clone() {
            Some(client) => client,
            None => Arc::new(HttpSignalingClient::new(
                &settings.signaling_base_url,
                settings.request_timeout(),
            )?),
        };

        let connector = match self.connector.clone() {
            Some(connector) => connector,
            None => default_connector()?,
        };

        log::trace!(target: "joynet", "Building group chat for {} with {} member(s)", session.group_id(), session.members().len());
        Ok(PeerConnectionManager::new(
            session,
            settings,
            signaling,
            connector,
            self.media_devices.clone(),
            self.ice_config.clone(),
        ))
    }

    pub fn build_view_model<T: SignalingSocket + 'static>(
        &mut self,
        session: GroupSession,
        socket: T,
    ) -> anyhow::Result<ChatViewModel> {
        let manager = self.build(session)?;
        Ok(ChatViewModel::new(manager, Arc::new(socket)))
    }
}

#[cfg(feature = "webrtc")]
fn default_connector() -> anyhow::Result<Arc<dyn PeerConnector>> {
    Ok(Arc::new(joynet_rtc::webrtc_rs::WebRtcConnector::new()?))
}

#[cfg(not(feature = "webrtc"))]
fn default_connector() -> anyhow::Result<Arc<dyn PeerConnector>> {
    Err(anyhow::Error::msg(
        "No peer connector set. Enable the `webrtc` feature or call with_connector",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use joynet_rtc::simulator::SimulatedConnector;
    use joynet_types::prelude::*;
    use rstest::rstest;

    fn session() -> GroupSession {
        GroupSession::new(
            "7",
            Member::new("a", "Ann"),
            vec![Member::new("b", "Ben")],
        )
    }

    #[test]
    fn builds_with_defaults_and_a_connector() {
        let manager = GroupChatBuilder::default()
            .with_connector(SimulatedConnector::new())
            .build(session())
            .unwrap();
        assert_eq!(manager.group_id(), &GroupId::from("7"));
        assert_eq!(manager.settings(), &ChatSettings::default());
        assert!(manager.members().is_empty());
    }

    #[cfg(not(feature = "webrtc"))]
    #[test]
    fn connector_is_required_without_webrtc() {
        assert!(GroupChatBuilder::default().build(session()).is_err());
    }

    #[rstest]
    #[case(ChatSettings { reconnect_watchdog_ms: 0, ..Default::default() })]
    #[case(ChatSettings { request_timeout_ms: 0, ..Default::default() })]
    #[case(ChatSettings { data_channel_label_prefix: String::new(), ..Default::default() })]
    #[case(ChatSettings { signaling_base_url: "not a url".into(), ..Default::default() })]
    fn invalid_settings_are_rejected(#[case] settings: ChatSettings) {
        let result = GroupChatBuilder::default()
            .with_connector(SimulatedConnector::new())
            .with_settings(settings)
            .build(session());
        assert!(result.is_err());
    }

    #[test]
    fn preset_ice_config_is_validated() {
        let result = GroupChatBuilder::default()
            .with_connector(SimulatedConnector::new())
            .with_ice_config(IceConfig {
                stun_servers: vec![],
                ..Default::default()
            })
            .build(session());
        assert!(result.is_err());
    }
}
