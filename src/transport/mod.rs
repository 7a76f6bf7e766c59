//! Pluggable meeting transports.
//!
//! A transport publishes the local participant and reports remote participants
//! into a [`MeetingState`]. The store itself stays transport-agnostic.

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use crate::config::RelayConfig;
use crate::errors::{MeetingError, MeetingResult};
use crate::meeting_state::MeetingState;
use crate::model::Participant;

#[cfg(feature = "livekit-relay")]
pub mod livekit;
pub mod mock;
#[cfg_attr(not(feature = "livekit-relay"), allow(dead_code))]
mod relay_remotes;

pub use mock::MockTransport;

pub struct TransportOptions {
    pub state: MeetingState,
    pub local_participant: Participant,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Starts exchanging media. Dropping the returned future before it resolves
    /// cancels the start and releases whatever it had acquired so far.
    async fn start(&self, options: TransportOptions) -> MeetingResult<Box<dyn TransportHandle>>;

    /// Synthetic remote controls, for transports that can fabricate participants.
    fn synthetic_controls(&self) -> Option<&dyn SyntheticRemoteControls> {
        None
    }
}

#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Releases remote participants, tracks and connections acquired by `start`.
    ///
    /// Never fails and may be called repeatedly. Internal errors are logged.
    async fn stop(&self);
}

pub trait SyntheticRemoteControls: Send + Sync {
    fn add_remote_participant(&self) -> MeetingResult<Participant>;

    /// Removes `id`, or the most recently added synthetic remote when `id` is `None`.
    fn remove_remote_participant(&self, id: Option<&str>) -> Option<Participant>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Mock,
    Relay,
}

impl FromStr for TransportKind {
    type Err = MeetingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(TransportKind::Mock),
            "livekit" | "relay" => Ok(TransportKind::Relay),
            other => Err(MeetingError::Config(format!(
                "unknown transport \"{}\" (expected mock or livekit)",
                other
            ))),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Mock => f.write_str("mock"),
            TransportKind::Relay => f.write_str("livekit"),
        }
    }
}

/// Whether this build can create a relay transport.
pub fn relay_supported() -> bool {
    cfg!(feature = "livekit-relay")
}

pub fn create_transport(
    kind: TransportKind,
    relay_config: &RelayConfig,
) -> MeetingResult<Box<dyn Transport>> {
    match kind {
        TransportKind::Mock => Ok(Box::new(MockTransport::new())),
        #[cfg(feature = "livekit-relay")]
        TransportKind::Relay => Ok(Box::new(livekit::LivekitTransport::new(
            relay_config.clone(),
        ))),
        #[cfg(not(feature = "livekit-relay"))]
        TransportKind::Relay => {
            let _ = relay_config;
            Err(MeetingError::Config(
                "livekit transport requires the livekit-relay feature".to_string(),
            ))
        }
    }
}
