//! User actions that mutate the meeting state.

use log::info;

use crate::errors::MeetingResult;
use crate::meeting_state::MeetingState;
use crate::model::{Participant, ParticipantUpdate};

/// Flips the local participant's mute flag and its audio tracks with it.
///
/// Returns `None` when there is no local participant.
pub fn toggle_local_mute(state: &MeetingState) -> MeetingResult<Option<Participant>> {
    let Some(local) = state.local_participant() else {
        return Ok(None);
    };

    let muted = !local.muted;
    local.stream.set_audio_enabled(!muted);
    let updated = state.update_participant(&local.id, ParticipantUpdate::default().muted(muted))?;

    info!("Local microphone {}", if muted { "muted" } else { "live" });
    Ok(Some(updated))
}

/// Flips `speaking` on the first remote participant, if there is one.
pub fn toggle_remote_speaking(state: &MeetingState) -> MeetingResult<Option<Participant>> {
    let Some(remote) = state.remote_participants().into_iter().next() else {
        return Ok(None);
    };

    let updated = state.update_participant(
        &remote.id,
        ParticipantUpdate::default().speaking(!remote.speaking),
    )?;
    Ok(Some(updated))
}
