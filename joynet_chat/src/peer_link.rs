use joynet_io::timer::DelayedTask;
use joynet_io::CancellationToken;
use joynet_rtc::connection::PeerConnection;
use joynet_types::prelude::*;
use std::sync::Arc;

/// Identifies one incarnation of the link to a member. A member that is removed and added again gets a new id,
/// so results computed for the old link can be told apart after an await
pub type LinkId = u64;

/// The connection to one remote member. Owned by the manager's link table
pub(crate) struct PeerLink {
    pub member_id: MemberId,
    pub link_id: LinkId,
    pub connection: Arc<dyn PeerConnection>,
    pub state: PeerLinkState,
    /// Restarts attempted since the link was last `connected`
    pub ice_restarts: usize,
    pub watchdog: Option<DelayedTask>,
    pub call_active: bool,
    /// Child of the session token. Stops the link's event pump and data channel readers
    pub cancel: CancellationToken,
}

impl PeerLink {
    pub fn new(
        member_id: MemberId,
        link_id: LinkId,
        connection: Arc<dyn PeerConnection>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            member_id,
            link_id,
            connection,
            state: PeerLinkState::New,
            ice_restarts: 0,
            watchdog: None,
            call_active: false,
            cancel,
        }
    }

    pub fn is(&self, member: &MemberId, link_id: LinkId) -> bool {
        &self.member_id == member && self.link_id == link_id
    }

    /// Cancels background work tied to this link. The connection itself is closed by the caller
    pub fn shutdown(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            let _ = watchdog.cancel();
        }
        self.cancel.cancel();
        self.state = PeerLinkState::Closed;
    }
}

impl std::fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerLink")
            .field("member_id", &self.member_id)
            .field("link_id", &self.link_id)
            .field("state", &self.state)
            .field("ice_restarts", &self.ice_restarts)
            .field("watchdog", &self.watchdog)
            .field("call_active", &self.call_active)
            .finish()
    }
}
