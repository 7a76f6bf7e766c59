//! Error types shared by the meeting store, the transports and the sandbox.

use thiserror::Error;

/// Meeting sandbox error type.
///
/// Store operations (`DuplicateParticipant`, `NotFound`) are returned to the
/// immediate caller. Removal never errors. Transport teardown never errors either:
/// failures there are logged and swallowed.
#[derive(Debug, Error)]
pub enum MeetingError {
    /// `add_participant` was called with an id the store already holds.
    #[error("participant with id \"{0}\" already exists")]
    DuplicateParticipant(String),

    /// `update_participant` was called with an unknown id.
    #[error("participant \"{0}\" not found")]
    NotFound(String),

    /// Synthetic remote controls used before `start` (or after `stop`).
    #[error("transport must be started before adding remote participants")]
    NotStarted,

    /// Local camera/microphone could not be acquired.
    #[error("failed to acquire local media: {0}")]
    MediaAcquisition(String),

    /// Invalid or unsupported configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Relay connection, token or publish failure.
    #[error("transport error: {0}")]
    Transport(String),
}

pub type MeetingResult<T> = Result<T, MeetingError>;
