//! Short human-readable status strings for the sandbox UI.

use crate::meeting_state::MeetingState;
use crate::model::{Participant, ParticipantKind};

pub const MEDIA_FAILURE_STATUS: &str =
    "Failed to acquire camera or microphone. See logs for details.";

/// Per-participant label: local participants report their mic, remotes their voice activity.
pub fn describe_participant(participant: &Participant) -> &'static str {
    match (participant.kind, participant.muted, participant.speaking) {
        (ParticipantKind::Local, true, _) => "Muted",
        (ParticipantKind::Local, false, _) => "Live",
        (ParticipantKind::Remote, _, true) => "Speaking",
        (ParticipantKind::Remote, _, false) => "Listening",
    }
}

pub fn room_status(state: &MeetingState) -> String {
    let total = state.len();

    let local_status = match state.local_participant() {
        Some(local) if local.muted => "Your mic is muted",
        Some(_) => "Your mic is live",
        None => "No local participant",
    };

    let remotes = state.remote_participants();
    let remote_status = if remotes.is_empty() {
        "No remote participants"
    } else if remotes.iter().any(|p| p.speaking) {
        "Remote participant is speaking"
    } else {
        "Remote participant is listening"
    };

    format!(
        "{} participants in room • {} • {}",
        total, local_status, remote_status
    )
}
