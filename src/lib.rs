//! Meeting sandbox core: a participant store with change notification, a
//! pluggable transport contract, and a synthetic transport that fabricates
//! remote participants from the local media stream.

pub mod config;
pub mod controls;
pub mod errors;
pub mod logging;
pub mod media;
pub mod meeting_state;
pub mod model;
pub mod repl;
pub mod roster;
pub mod sandbox;
pub mod status;
pub mod transport;

pub use errors::{MeetingError, MeetingResult};
pub use meeting_state::{MeetingState, Subscription};
pub use model::{MeetingEvent, MeetingEventType, Participant, ParticipantKind, ParticipantUpdate};
pub use transport::{
    create_transport, SyntheticRemoteControls, Transport, TransportHandle, TransportKind,
    TransportOptions,
};
