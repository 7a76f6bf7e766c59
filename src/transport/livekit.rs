//! Relay transport backed by a LiveKit room.
//!
//! Publishes the local microphone and mirrors the room's remote participants
//! into the meeting state. Media playback and rendering are left to the caller.

use async_trait::async_trait;
use livekit::options::TrackPublishOptions;
use livekit::prelude::LocalParticipant;
use livekit::track::{LocalAudioTrack, LocalTrack, RemoteTrack, TrackSource};
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::prelude::{AudioSourceOptions, RtcAudioSource};
use livekit::{Room, RoomEvent, RoomOptions};
use log::{debug, error, info, warn};
use reqwest::{Client, StatusCode};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::RelayConfig;
use crate::errors::{MeetingError, MeetingResult};
use crate::media::TrackKind;
use crate::meeting_state::{MeetingState, Subscription};
use crate::model::MeetingEventType;
use crate::transport::relay_remotes::RelayRemotes;
use crate::transport::{Transport, TransportHandle, TransportOptions};

const SAMPLE_RATE: u32 = 48000;
const NUM_CHANNELS: u32 = 2;

struct RelaySession {
    room: Arc<Room>,
    events_task: JoinHandle<()>,
    mute_subscription: Option<Subscription>,
}

#[derive(Default)]
struct RelayShared {
    // Bumped on every start; event tasks and handles of older starts become no-ops.
    generation: u64,
    session: Option<RelaySession>,
    state: Option<MeetingState>,
    remotes: RelayRemotes,
}

type SharedRelay = Arc<Mutex<RelayShared>>;

struct Released {
    session: Option<RelaySession>,
    state: Option<MeetingState>,
    remotes: RelayRemotes,
}

impl RelayShared {
    fn release(&mut self) -> Released {
        Released {
            session: self.session.take(),
            state: self.state.take(),
            remotes: std::mem::take(&mut self.remotes),
        }
    }
}

impl Released {
    async fn teardown(self) {
        if let Some(session) = self.session {
            session.events_task.abort();
            if let Some(subscription) = session.mute_subscription {
                subscription.unsubscribe();
            }
            if let Err(e) = session.room.close().await {
                error!("Failed to close relay room: {}", e);
            }
        }

        if let Some(state) = self.state {
            let mut remotes = self.remotes;
            let count = remotes.release_all(&state);
            info!("Released {} relay participant(s)", count);
        }
    }
}

// A connected room that is not yet owned by a session. Dropping it, for
// example when the start future is cancelled, closes the room in the background.
struct PendingRoom {
    room: Option<Arc<Room>>,
}

impl PendingRoom {
    fn new(room: Room) -> Self {
        PendingRoom {
            room: Some(Arc::new(room)),
        }
    }

    fn local_participant(&self) -> Option<LocalParticipant> {
        self.room.as_ref().map(|room| room.local_participant())
    }

    fn into_session_room(mut self) -> Option<Arc<Room>> {
        self.room.take()
    }

    async fn close(mut self, reason: &str) {
        if let Some(room) = self.room.take() {
            if let Err(e) = room.close().await {
                warn!("Failed to close relay room ({}): {}", reason, e);
            }
        }
    }
}

impl Drop for PendingRoom {
    fn drop(&mut self) {
        let Some(room) = self.room.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("Relay start abandoned, closing its room");
                runtime.spawn(async move {
                    if let Err(e) = room.close().await {
                        warn!("Failed to close abandoned relay room: {}", e);
                    }
                });
            }
            Err(_) => warn!("Relay start abandoned outside a runtime, room left to drop"),
        }
    }
}

pub struct LivekitTransport {
    config: RelayConfig,
    http_client: Client,
    shared: SharedRelay,
}

impl LivekitTransport {
    pub fn new(config: RelayConfig) -> Self {
        LivekitTransport {
            config,
            http_client: Client::new(),
            shared: SharedRelay::default(),
        }
    }

    async fn fetch_token(&self) -> MeetingResult<String> {
        info!(
            "Fetching join token for {} in room {}",
            self.config.participant_id, self.config.room
        );

        let url = reqwest::Url::parse_with_params(
            &self.config.token_endpoint,
            &[
                ("room", self.config.room.as_str()),
                ("identity", self.config.participant_id.as_str()),
                ("name", self.config.display_name.as_str()),
            ],
        )
        .map_err(|e| MeetingError::Config(format!("invalid token endpoint: {}", e)))?;

        let resp = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| MeetingError::Transport(format!("token request failed: {}", e)))?;

        if !matches!(resp.status(), StatusCode::OK) {
            error!(
                "Failed to get join token for room {}. HTTP Error: {}",
                self.config.room,
                resp.status()
            );
            return Err(MeetingError::Transport(format!(
                "token endpoint returned {}",
                resp.status()
            )));
        }

        resp.text()
            .await
            .map_err(|e| MeetingError::Transport(format!("failed to read join token: {}", e)))
    }
}

#[async_trait]
impl Transport for LivekitTransport {
    async fn start(&self, options: TransportOptions) -> MeetingResult<Box<dyn TransportHandle>> {
        let (generation, previous) = {
            let mut shared = self.shared.lock().await;
            shared.generation += 1;
            (shared.generation, shared.release())
        };
        previous.teardown().await;

        let token = self.fetch_token().await?;
        debug!("Received join token");

        let (room, room_events) =
            Room::connect(&self.config.relay_url, &token, RoomOptions::default())
                .await
                .map_err(|e| {
                    error!("Failed to connect to relay room {}: {}", self.config.room, e);
                    MeetingError::Transport(format!("failed to connect to relay: {}", e))
                })?;
        let pending = PendingRoom::new(room);
        info!("Connected to relay room {}", self.config.room);

        let has_audio = options
            .local_participant
            .stream
            .audio_tracks()
            .next()
            .is_some();
        let audio_track = match pending.local_participant() {
            Some(local) if has_audio => {
                match publish_microphone(local, self.config.auto_enable_audio).await {
                    Ok(track) => Some(track),
                    Err(err) => {
                        pending.close("publish error").await;
                        return Err(err);
                    }
                }
            }
            _ => {
                info!("Local participant has no audio track, publishing nothing");
                None
            }
        };

        let mut shared = self.shared.lock().await;
        if shared.generation != generation {
            drop(shared);
            warn!("Relay start superseded by a newer start, closing its connection");
            pending.close("superseded").await;
            return Err(MeetingError::Transport(
                "start superseded by a newer start".to_string(),
            ));
        }

        let Some(room) = pending.into_session_room() else {
            return Err(MeetingError::Transport("relay room already released".to_string()));
        };

        let state = options.state;
        shared.state = Some(state.clone());

        let mute_subscription = audio_track.map(|track| follow_local_mute(&state, track));

        for participant in room.remote_participants().into_values() {
            let identity = participant.identity().to_string();
            shared
                .remotes
                .register(&state, &self.config, &identity, &participant.name());
        }

        let events_task = tokio::spawn(handle_room_events(
            self.shared.clone(),
            generation,
            self.config.clone(),
            room_events,
        ));

        shared.session = Some(RelaySession {
            room,
            events_task,
            mute_subscription,
        });

        Ok(Box::new(LivekitTransportHandle {
            shared: self.shared.clone(),
            generation,
        }))
    }
}

struct LivekitTransportHandle {
    shared: SharedRelay,
    generation: u64,
}

#[async_trait]
impl TransportHandle for LivekitTransportHandle {
    async fn stop(&self) {
        let released = {
            let mut shared = self.shared.lock().await;
            if shared.generation != self.generation {
                debug!("Ignoring stop for stale relay session {}", self.generation);
                return;
            }
            shared.release()
        };

        released.teardown().await;
        info!("Relay transport stopped");
    }
}

async fn publish_microphone(
    local_participant: LocalParticipant,
    enabled: bool,
) -> MeetingResult<LocalAudioTrack> {
    let native_audio_source = NativeAudioSource::new(
        AudioSourceOptions {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        },
        SAMPLE_RATE,
        NUM_CHANNELS,
        None,
    );

    let audio_source = RtcAudioSource::Native(native_audio_source);
    let local_audio_track = LocalAudioTrack::create_audio_track("microphone", audio_source);

    let mut track_publish_options = TrackPublishOptions::default();
    track_publish_options.source = TrackSource::Microphone;

    local_participant
        .publish_track(
            LocalTrack::Audio(local_audio_track.clone()),
            track_publish_options,
        )
        .await
        .map_err(|e| MeetingError::Transport(format!("failed to publish microphone: {}", e)))?;

    if !enabled {
        local_audio_track.mute();
    }
    info!("Local audio track published (enabled: {})", enabled);

    Ok(local_audio_track)
}

// Mirrors the local participant's `muted` flag onto the published microphone track.
fn follow_local_mute(state: &MeetingState, track: LocalAudioTrack) -> Subscription {
    state.subscribe(MeetingEventType::ParticipantUpdated, move |event| {
        if !event.participant.is_local() {
            return;
        }
        if event.participant.muted {
            track.mute();
        } else {
            track.unmute();
        }
    })
}

async fn handle_room_events(
    shared: SharedRelay,
    generation: u64,
    config: RelayConfig,
    mut room_events: UnboundedReceiver<RoomEvent>,
) {
    while let Some(event) = room_events.recv().await {
        let mut guard = shared.lock().await;
        if guard.generation != generation {
            debug!("Dropping room events of stale relay session {}", generation);
            break;
        }
        let Some(state) = guard.state.clone() else {
            break;
        };

        match event {
            RoomEvent::ParticipantConnected(participant) => {
                let identity = participant.identity().to_string();
                guard
                    .remotes
                    .register(&state, &config, &identity, &participant.name());
            }

            RoomEvent::ParticipantDisconnected(participant) => {
                let identity = participant.identity().to_string();
                info!("Relay participant left: {}", identity);
                guard.remotes.release(&state, &identity);
            }

            RoomEvent::ParticipantNameChanged {
                participant, name, ..
            } => {
                let identity = participant.identity().to_string();
                guard.remotes.rename(&state, &identity, &name);
            }

            RoomEvent::TrackSubscribed {
                track,
                publication: _,
                participant,
            } => {
                let kind = match &track {
                    RemoteTrack::Audio(_) => TrackKind::Audio,
                    RemoteTrack::Video(_) => TrackKind::Video,
                };
                let identity = participant.identity().to_string();
                let sid = track.sid().as_str().to_string();
                guard.remotes.add_track(&state, &identity, kind, &sid);
            }

            RoomEvent::TrackUnsubscribed {
                track,
                publication: _,
                participant,
            } => {
                let identity = participant.identity().to_string();
                let sid = track.sid().as_str().to_string();
                guard.remotes.remove_track(&state, &identity, &sid);
            }

            RoomEvent::ActiveSpeakersChanged { speakers } => {
                let active: HashSet<String> = speakers
                    .iter()
                    .map(|participant| participant.identity().to_string())
                    .collect();
                guard.remotes.set_active_speakers(&state, &active);
            }

            RoomEvent::Disconnected { .. } => {
                warn!("Disconnected from relay room {}", config.room);
                let count = guard.remotes.release_all(&state);
                debug!("Dropped {} relay participant(s) after disconnect", count);
            }

            _ => {
                debug!("Unhandled room event: {:?}", event);
            }
        }
    }
}
