//! Bookkeeping for remote participants reported by a relay room.
//!
//! Works on identities and plain values so it does not depend on the relay
//! client itself.

use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};

use crate::config::RelayConfig;
use crate::media::{MediaStream, MediaTrack, TrackKind};
use crate::meeting_state::MeetingState;
use crate::model::{Participant, ParticipantUpdate, LOCAL_PARTICIPANT_ID};

pub(crate) fn remote_display_name(identity: &str, name: &str) -> String {
    if name.trim().is_empty() {
        identity.to_string()
    } else {
        name.to_string()
    }
}

pub(crate) fn is_own_identity(identity: &str, config: &RelayConfig) -> bool {
    identity == config.participant_id || identity == LOCAL_PARTICIPANT_ID
}

/// Streams built for each remote this transport registered in the store.
#[derive(Default)]
pub(crate) struct RelayRemotes {
    streams: HashMap<String, MediaStream>,
}

impl RelayRemotes {
    pub(crate) fn len(&self) -> usize {
        self.streams.len()
    }

    pub(crate) fn contains(&self, identity: &str) -> bool {
        self.streams.contains_key(identity)
    }

    /// Adds `identity` to the store. Returns false for our own identity or a store rejection.
    pub(crate) fn register(
        &mut self,
        state: &MeetingState,
        config: &RelayConfig,
        identity: &str,
        name: &str,
    ) -> bool {
        if is_own_identity(identity, config) {
            debug!("Skipping remote entry for own identity {}", identity);
            return false;
        }

        // A reconnecting participant replaces its stale entry.
        self.release(state, identity);

        let stream = MediaStream::empty();
        let name = remote_display_name(identity, name);
        match state.add_participant(Participant::remote(identity, name, stream.clone())) {
            Ok(added) => {
                info!("Relay participant joined: {} ({})", added.id, added.name);
                self.streams.insert(identity.to_string(), stream);
                true
            }
            Err(e) => {
                warn!("Could not register relay participant {}: {}", identity, e);
                false
            }
        }
    }

    pub(crate) fn release(&mut self, state: &MeetingState, identity: &str) -> bool {
        let Some(stream) = self.streams.remove(identity) else {
            return false;
        };
        stream.stop_all();
        state.remove_participant(identity);
        true
    }

    pub(crate) fn release_all(&mut self, state: &MeetingState) -> usize {
        let released = std::mem::take(&mut self.streams);
        let count = released.len();
        for (identity, stream) in released {
            stream.stop_all();
            state.remove_participant(&identity);
        }
        count
    }

    /// Records a subscribed track, labelled with the relay's track sid.
    pub(crate) fn add_track(
        &mut self,
        state: &MeetingState,
        identity: &str,
        kind: TrackKind,
        sid: &str,
    ) {
        let Some(stream) = self.streams.get(identity).cloned() else {
            debug!("Track subscribed for unknown participant {}", identity);
            return;
        };
        info!("Track {} subscribed from {}", sid, identity);
        let stream = stream.with_track(MediaTrack::new(kind, sid));
        self.replace_stream(state, identity, stream);
    }

    pub(crate) fn remove_track(&mut self, state: &MeetingState, identity: &str, sid: &str) {
        let Some(stream) = self.streams.get(identity).cloned() else {
            return;
        };
        let Some(removed) = stream.tracks().iter().find(|t| t.label() == sid).cloned() else {
            return;
        };
        removed.stop();
        self.replace_stream(state, identity, stream.without_track(removed.id()));
    }

    pub(crate) fn rename(&self, state: &MeetingState, identity: &str, name: &str) {
        if !self.contains(identity) {
            return;
        }
        let name = remote_display_name(identity, name);
        match state.update_participant(identity, ParticipantUpdate::default().name(name)) {
            Ok(renamed) => info!("Relay participant {} is now {}", identity, renamed.name),
            Err(e) => warn!("Could not rename {}: {}", identity, e),
        }
    }

    /// Sets `speaking` on every tracked remote; only changed records are updated.
    pub(crate) fn set_active_speakers(&self, state: &MeetingState, active: &HashSet<String>) {
        for identity in self.streams.keys() {
            let speaking = active.contains(identity);
            let changed = state
                .participant(identity)
                .is_some_and(|p| p.speaking != speaking);
            if !changed {
                continue;
            }
            let update = ParticipantUpdate::default().speaking(speaking);
            if let Err(e) = state.update_participant(identity, update) {
                warn!("Could not update speaking state of {}: {}", identity, e);
            }
        }
    }

    fn replace_stream(&mut self, state: &MeetingState, identity: &str, stream: MediaStream) {
        let update = ParticipantUpdate::default().stream(stream.clone());
        match state.update_participant(identity, update) {
            Ok(_) => {
                self.streams.insert(identity.to_string(), stream);
            }
            Err(e) => warn!("Could not update stream of {}: {}", identity, e),
        }
    }
}
