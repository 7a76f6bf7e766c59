use std::fmt;

use crate::media::MediaStream;

/// Reserved id of the session owner's own participant.
pub const LOCAL_PARTICIPANT_ID: &str = "local";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantKind {
    Local,
    Remote,
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub kind: ParticipantKind,
    pub stream: MediaStream,
    pub muted: bool,
    pub speaking: bool,
}

impl Participant {
    pub fn local(name: impl Into<String>, stream: MediaStream) -> Self {
        Participant {
            id: LOCAL_PARTICIPANT_ID.to_string(),
            name: name.into(),
            kind: ParticipantKind::Local,
            stream,
            muted: false,
            speaking: false,
        }
    }

    pub fn remote(id: impl Into<String>, name: impl Into<String>, stream: MediaStream) -> Self {
        Participant {
            id: id.into(),
            name: name.into(),
            kind: ParticipantKind::Remote,
            stream,
            muted: false,
            speaking: false,
        }
    }

    pub fn is_local(&self) -> bool {
        self.kind == ParticipantKind::Local
    }
}

/// Partial patch over every participant field except `id`.
#[derive(Debug, Clone, Default)]
pub struct ParticipantUpdate {
    pub name: Option<String>,
    pub kind: Option<ParticipantKind>,
    pub stream: Option<MediaStream>,
    pub muted: Option<bool>,
    pub speaking: Option<bool>,
}

impl ParticipantUpdate {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn kind(mut self, kind: ParticipantKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn stream(mut self, stream: MediaStream) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn muted(mut self, muted: bool) -> Self {
        self.muted = Some(muted);
        self
    }

    pub fn speaking(mut self, speaking: bool) -> Self {
        self.speaking = Some(speaking);
        self
    }

    pub(crate) fn apply_to(self, participant: &mut Participant) {
        if let Some(name) = self.name {
            participant.name = name;
        }
        if let Some(kind) = self.kind {
            participant.kind = kind;
        }
        if let Some(stream) = self.stream {
            participant.stream = stream;
        }
        if let Some(muted) = self.muted {
            participant.muted = muted;
        }
        if let Some(speaking) = self.speaking {
            participant.speaking = speaking;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeetingEventType {
    ParticipantAdded,
    ParticipantUpdated,
    ParticipantRemoved,
}

impl MeetingEventType {
    pub const ALL: [MeetingEventType; 3] = [
        MeetingEventType::ParticipantAdded,
        MeetingEventType::ParticipantUpdated,
        MeetingEventType::ParticipantRemoved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingEventType::ParticipantAdded => "participant-added",
            MeetingEventType::ParticipantUpdated => "participant-updated",
            MeetingEventType::ParticipantRemoved => "participant-removed",
        }
    }
}

impl fmt::Display for MeetingEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification carrying a snapshot of the affected participant at emission time.
#[derive(Debug, Clone)]
pub struct MeetingEvent {
    pub event_type: MeetingEventType,
    pub participant: Participant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_leaves_unset_fields() {
        let stream = MediaStream::empty();
        let mut participant = Participant::remote("r1", "Remote", stream.clone());

        ParticipantUpdate::default()
            .speaking(true)
            .apply_to(&mut participant);

        assert_eq!(participant.id, "r1");
        assert_eq!(participant.name, "Remote");
        assert_eq!(participant.kind, ParticipantKind::Remote);
        assert!(participant.stream.ptr_eq(&stream));
        assert!(!participant.muted);
        assert!(participant.speaking);
    }

    #[test]
    fn test_event_type_names() {
        let names: Vec<_> = MeetingEventType::ALL.iter().map(|t| t.to_string()).collect();
        assert_eq!(
            names,
            ["participant-added", "participant-updated", "participant-removed"]
        );
    }
}
