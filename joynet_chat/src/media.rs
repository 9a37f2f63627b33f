//! Local capture state of an active call, plus the streams received from remote members.
//!
//! [`MediaSession::end`] is the only place local tracks are stopped. Peer connections hold clones of the same
//! tracks, so stopping them anywhere else would cut media for every link at once.

use joynet_io::Mutex;
use joynet_rtc::media::{LocalStream, LocalTrack, RemoteTrack, TrackKind};
use joynet_types::user::MemberId;
use std::collections::HashMap;

/// All tracks one remote member sent us
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteStream {
    pub member_id: MemberId,
    pub tracks: Vec<RemoteTrack>,
}

/// Mute flags of the local user
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MediaState {
    pub audio_enabled: bool,
    pub video_enabled: bool,
}

struct ActiveCall {
    state: MediaState,
    local: LocalStream,
}

#[derive(Default)]
pub struct MediaSession {
    call: Mutex<Option<ActiveCall>>,
    remote: Mutex<HashMap<MemberId, RemoteStream>>,
}

impl MediaSession {
    /// Installs `local` as the active capture. Returns false, leaving `local` untouched, if a call is active
    pub fn begin(&self, local: LocalStream) -> bool {
        let mut call = self.call.lock();
        if call.is_some() {
            return false;
        }

        *call = Some(ActiveCall {
            state: MediaState {
                audio_enabled: true,
                video_enabled: true,
            },
            local,
        });
        true
    }

    pub fn is_active(&self) -> bool {
        self.call.lock().is_some()
    }

    pub fn state(&self) -> Option<MediaState> {
        self.call.lock().as_ref().map(|call| call.state)
    }

    pub fn local_tracks(&self) -> Vec<LocalTrack> {
        self.call
            .lock()
            .as_ref()
            .map(|call| call.local.tracks().to_vec())
            .unwrap_or_default()
    }

    /// Flips the enabled flag of every local track of `kind`. Returns the new flag, or `None` without a call
    pub fn toggle(&self, kind: TrackKind) -> Option<bool> {
        let mut call = self.call.lock();
        let call = call.as_mut()?;
        let flag = match kind {
            TrackKind::Audio => &mut call.state.audio_enabled,
            TrackKind::Video => &mut call.state.video_enabled,
        };

        *flag = !*flag;
        for track in call.local.tracks_of(kind) {
            track.set_enabled(*flag);
        }

        log::info!(target: "joynet", "Local {kind} {}", if *flag { "enabled" } else { "disabled" });
        Some(*flag)
    }

    /// Stops every local track and forgets all remote streams. Returns false if no call was active
    pub fn end(&self) -> bool {
        self.remote.lock().clear();
        let call = self.call.lock().take();
        match call {
            Some(call) => {
                let stopped = call.local.stop_all();
                log::info!(target: "joynet", "Call ended, released {stopped} local track(s)");
                true
            }
            None => false,
        }
    }

    /// Files `track` under its member and returns the updated stream
    pub fn add_remote_track(&self, member: &MemberId, track: RemoteTrack) -> RemoteStream {
        let mut remote = self.remote.lock();
        let stream = remote
            .entry(member.clone())
            .or_insert_with(|| RemoteStream {
                member_id: member.clone(),
                tracks: Vec::new(),
            });

        if !stream.tracks.iter().any(|existing| existing.id == track.id) {
            stream.tracks.push(track);
        }

        stream.clone()
    }

    pub fn remove_remote(&self, member: &MemberId) -> Option<RemoteStream> {
        self.remote.lock().remove(member)
    }

    pub fn remote_streams(&self) -> Vec<RemoteStream> {
        self.remote.lock().values().cloned().collect()
    }
}
