use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::errors::{MeetingError, MeetingResult};
use crate::media::{clone_media_stream, MediaStream};
use crate::meeting_state::MeetingState;
use crate::model::Participant;
use crate::transport::{SyntheticRemoteControls, Transport, TransportHandle, TransportOptions};

struct ActiveSession {
    state: MeetingState,
    local: Participant,
}

#[derive(Default)]
struct MockSession {
    // Bumped on every start so handles from an earlier start cannot tear down a later one.
    generation: u64,
    active: Option<ActiveSession>,
    // Insertion order; the last entry is the most recently added remote.
    remotes: Vec<Participant>,
    // Never reset, so ids stay unique for the life of the transport.
    next_index: u64,
}

impl MockSession {
    fn take_active(&mut self) -> Option<(MeetingState, Vec<Participant>)> {
        let active = self.active.take()?;
        Some((active.state, std::mem::take(&mut self.remotes)))
    }
}

/// Transport that fabricates remote participants by cloning the local stream.
#[derive(Clone, Default)]
pub struct MockTransport {
    session: Arc<Mutex<MockSession>>,
}

fn lock(session: &Mutex<MockSession>) -> MutexGuard<'_, MockSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

fn synthetic_remote(index: u64, local_stream: &MediaStream) -> Participant {
    let name = if index == 0 {
        "Remote (mock)".to_string()
    } else {
        format!("Remote (mock) #{}", index + 1)
    };

    Participant::remote(
        format!("remote-mock-{}", index),
        name,
        clone_media_stream(local_stream),
    )
}

fn release_remotes(state: &MeetingState, remotes: Vec<Participant>) {
    for remote in remotes {
        remote.stream.stop_all();
        state.remove_participant(&remote.id);
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        lock(&self.session).active.is_some()
    }

    /// Ids of the synthetic remotes currently tracked, oldest first.
    pub fn remote_ids(&self) -> Vec<String> {
        lock(&self.session)
            .remotes
            .iter()
            .map(|remote| remote.id.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn start(&self, options: TransportOptions) -> MeetingResult<Box<dyn TransportHandle>> {
        let (generation, previous) = {
            let mut session = lock(&self.session);
            let previous = session.take_active();
            session.generation += 1;
            session.active = Some(ActiveSession {
                state: options.state,
                local: options.local_participant,
            });
            (session.generation, previous)
        };

        if let Some((state, remotes)) = previous {
            warn!("Mock transport restarted without stop, releasing previous remotes");
            release_remotes(&state, remotes);
        }

        let handle = MockTransportHandle {
            session: self.session.clone(),
            generation,
        };

        // Seed one remote so there is always something to render.
        if let Err(err) = self.add_remote_participant() {
            handle.stop().await;
            return Err(err);
        }

        info!("Mock transport started (generation {})", generation);
        Ok(Box::new(handle))
    }

    fn synthetic_controls(&self) -> Option<&dyn SyntheticRemoteControls> {
        Some(self)
    }
}

impl SyntheticRemoteControls for MockTransport {
    fn add_remote_participant(&self) -> MeetingResult<Participant> {
        let (generation, state, remote) = {
            let mut session = lock(&self.session);
            let (state, local_stream) = match &session.active {
                Some(active) => (active.state.clone(), active.local.stream.clone()),
                None => return Err(MeetingError::NotStarted),
            };

            let index = session.next_index;
            session.next_index += 1;

            let remote = synthetic_remote(index, &local_stream);
            session.remotes.push(remote.clone());
            (session.generation, state, remote)
        };

        let added = match state.add_participant(remote.clone()) {
            Ok(added) => added,
            Err(err) => {
                warn!("Store rejected synthetic remote {}: {}", remote.id, err);
                lock(&self.session).remotes.retain(|p| p.id != remote.id);
                remote.stream.stop_all();
                return Err(err);
            }
        };

        // A stop or remove may have released the remote before it reached the store.
        let orphaned = {
            let session = lock(&self.session);
            if session.generation != generation || session.active.is_none() {
                Some(MeetingError::NotStarted)
            } else if !session.remotes.iter().any(|p| p.id == remote.id) {
                Some(MeetingError::NotFound(remote.id.clone()))
            } else {
                None
            }
        };
        if let Some(err) = orphaned {
            debug!("Synthetic remote {} released while being added", remote.id);
            remote.stream.stop_all();
            state.remove_participant(&remote.id);
            return Err(err);
        }

        info!("Added synthetic remote {} ({})", added.id, added.name);
        Ok(added)
    }

    fn remove_remote_participant(&self, id: Option<&str>) -> Option<Participant> {
        let (state, remote) = {
            let mut session = lock(&self.session);
            let state = session.active.as_ref()?.state.clone();
            let index = match id {
                Some(id) => session.remotes.iter().position(|p| p.id == id)?,
                None => session.remotes.len().checked_sub(1)?,
            };
            (state, session.remotes.remove(index))
        };

        remote.stream.stop_all();
        let removed = state.remove_participant(&remote.id).unwrap_or(remote);
        info!("Removed synthetic remote {}", removed.id);
        Some(removed)
    }
}

struct MockTransportHandle {
    session: Arc<Mutex<MockSession>>,
    generation: u64,
}

#[async_trait]
impl TransportHandle for MockTransportHandle {
    async fn stop(&self) {
        let released = {
            let mut session = lock(&self.session);
            if session.generation != self.generation {
                debug!(
                    "Ignoring stop for stale mock session {} (current {})",
                    self.generation, session.generation
                );
                return;
            }
            session.take_active()
        };

        match released {
            Some((state, remotes)) => {
                let count = remotes.len();
                release_remotes(&state, remotes);
                info!("Mock transport stopped, released {} remote(s)", count);
            }
            None => debug!("Mock transport already stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaTrack, TrackKind, TrackState};
    use crate::model::{MeetingEventType, ParticipantKind};
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_until(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn local_participant() -> Participant {
        Participant::local(
            "You",
            MediaStream::new(vec![
                MediaTrack::new(TrackKind::Video, "camera"),
                MediaTrack::new(TrackKind::Audio, "microphone"),
            ]),
        )
    }

    async fn started(
        transport: &MockTransport,
    ) -> (MeetingState, Participant, Box<dyn TransportHandle>) {
        let state = MeetingState::new();
        let local = state.add_participant(local_participant()).unwrap();
        let handle = transport
            .start(TransportOptions {
                state: state.clone(),
                local_participant: local.clone(),
            })
            .await
            .unwrap();
        (state, local, handle)
    }

    fn id_suffix(id: &str) -> u64 {
        id.trim_start_matches("remote-mock-").parse().unwrap()
    }

    #[tokio::test]
    async fn test_synthetic_remote_lifecycle() {
        let transport = MockTransport::new();
        let (state, local, handle) = started(&transport).await;

        let remotes = state.remote_participants();
        assert_eq!(remotes.len(), 1);
        assert_eq!(remotes[0].name, "Remote (mock)");

        let second = transport.add_remote_participant().unwrap();
        let third = transport.add_remote_participant().unwrap();
        assert_eq!(second.name, "Remote (mock) #2");
        assert_eq!(third.name, "Remote (mock) #3");
        assert!(id_suffix(&remotes[0].id) < id_suffix(&second.id));
        assert!(id_suffix(&second.id) < id_suffix(&third.id));

        let mut fabricated: Vec<MediaStream> = state
            .remote_participants()
            .into_iter()
            .map(|p| p.stream)
            .collect();

        let removed = transport.remove_remote_participant(None).unwrap();
        assert_eq!(removed.id, third.id);
        assert!(removed.stream.tracks().iter().all(|t| t.is_stopped()));
        assert_eq!(state.remote_participants().len(), 2);

        fabricated.push(transport.add_remote_participant().unwrap().stream);

        handle.stop().await;

        assert!(state.remote_participants().is_empty());
        for stream in &fabricated {
            assert_eq!(stream.tracks().len(), 2);
            assert!(stream
                .tracks()
                .iter()
                .all(|t| t.ready_state() == TrackState::Ended));
        }
        assert!(local.stream.tracks().iter().all(|t| !t.is_stopped()));
        assert!(state.local_participant().is_some());
    }

    #[tokio::test]
    async fn test_remote_stream_is_a_clone_not_a_share() {
        let transport = MockTransport::new();
        let (state, local, _handle) = started(&transport).await;

        let remote = state.remote_participants().remove(0);
        assert_eq!(remote.kind, ParticipantKind::Remote);
        assert!(!remote.stream.ptr_eq(&local.stream));

        remote.stream.set_audio_enabled(false);
        assert!(local.stream.audio_tracks().all(|t| t.is_enabled()));

        transport.remove_remote_participant(Some(&remote.id)).unwrap();
        assert!(local.stream.tracks().iter().all(|t| !t.is_stopped()));
    }

    #[tokio::test]
    async fn test_add_before_start_is_not_started() {
        let transport = MockTransport::new();
        assert!(matches!(
            transport.add_remote_participant(),
            Err(MeetingError::NotStarted)
        ));
        assert!(transport.remove_remote_participant(None).is_none());
    }

    #[tokio::test]
    async fn test_add_after_stop_is_not_started() {
        let transport = MockTransport::new();
        let (_state, _local, handle) = started(&transport).await;

        handle.stop().await;

        assert!(!transport.is_started());
        assert!(matches!(
            transport.add_remote_participant(),
            Err(MeetingError::NotStarted)
        ));
    }

    #[tokio::test]
    async fn test_remove_unknown_or_empty_returns_none() {
        let transport = MockTransport::new();
        let (state, _local, _handle) = started(&transport).await;

        assert!(transport.remove_remote_participant(Some("remote-mock-99")).is_none());
        assert!(transport.remove_remote_participant(Some("local")).is_none());
        assert!(transport.remove_remote_participant(None).is_some());
        assert!(transport.remove_remote_participant(None).is_none());
        assert!(state.local_participant().is_some());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let transport = MockTransport::new();
        let (state, _local, handle) = started(&transport).await;

        handle.stop().await;
        handle.stop().await;

        assert!(state.remote_participants().is_empty());
        assert_eq!(state.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_handle_does_not_stop_newer_session() {
        let transport = MockTransport::new();
        let (_old_state, _local, old_handle) = started(&transport).await;
        old_handle.stop().await;

        let (state, _local, _handle) = started(&transport).await;
        old_handle.stop().await;

        assert!(transport.is_started());
        assert_eq!(state.remote_participants().len(), 1);
    }

    #[tokio::test]
    async fn test_counter_survives_restart() {
        let transport = MockTransport::new();
        let (_state, _local, handle) = started(&transport).await;
        handle.stop().await;

        let (state, _local, _handle) = started(&transport).await;
        let remote = state.remote_participants().remove(0);
        assert_eq!(remote.id, "remote-mock-1");
        assert_eq!(remote.name, "Remote (mock) #2");
    }

    #[tokio::test]
    async fn test_instances_keep_their_own_counters() {
        let first = MockTransport::new();
        let second = MockTransport::new();
        let (state_a, _, _handle_a) = started(&first).await;
        let (state_b, _, _handle_b) = started(&second).await;

        assert_eq!(state_a.remote_participants()[0].id, "remote-mock-0");
        assert_eq!(state_b.remote_participants()[0].id, "remote-mock-0");
    }

    #[tokio::test]
    async fn test_store_rejection_rolls_back_tracking() {
        let transport = MockTransport::new();
        let (state, local, _handle) = started(&transport).await;
        state
            .add_participant(Participant::remote(
                "remote-mock-1",
                "Squatter",
                MediaStream::empty(),
            ))
            .unwrap();

        let err = transport.add_remote_participant().unwrap_err();

        assert!(matches!(err, MeetingError::DuplicateParticipant(_)));
        assert_eq!(transport.remote_ids(), ["remote-mock-0"]);
        assert_eq!(state.participant("remote-mock-1").unwrap().name, "Squatter");
        assert!(local.stream.tracks().iter().all(|t| !t.is_stopped()));

        let next = transport.add_remote_participant().unwrap();
        assert_eq!(next.id, "remote-mock-2");
    }

    #[tokio::test]
    async fn test_start_fails_when_seed_remote_is_rejected() {
        let transport = MockTransport::new();
        let state = MeetingState::new();
        let local = state.add_participant(local_participant()).unwrap();
        state
            .add_participant(Participant::remote(
                "remote-mock-0",
                "Squatter",
                MediaStream::empty(),
            ))
            .unwrap();

        let result = transport
            .start(TransportOptions {
                state: state.clone(),
                local_participant: local,
            })
            .await;

        assert!(matches!(result, Err(MeetingError::DuplicateParticipant(_))));
        assert!(!transport.is_started());
        assert_eq!(state.len(), 2);
    }

    #[tokio::test]
    async fn test_restart_without_stop_releases_previous_remotes() {
        let transport = MockTransport::new();
        let (old_state, _local, _old_handle) = started(&transport).await;
        let old_remote = old_state.remote_participants().remove(0);

        let (_state, _local, _handle) = started(&transport).await;

        assert!(old_state.remote_participants().is_empty());
        assert!(old_remote.stream.tracks().iter().all(|t| t.is_stopped()));
    }

    #[test]
    fn test_stop_during_add_leaves_nothing_behind() {
        let transport = MockTransport::new();
        let (state, _local, handle) = futures::executor::block_on(started(&transport));

        // Park the store so the next add is tracked but not yet inserted.
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let release_rx = Mutex::new(release_rx);
        let gate = state.subscribe(MeetingEventType::ParticipantAdded, move |event| {
            if event.participant.id == "blocker" {
                entered_tx.lock().unwrap().send(()).unwrap();
                release_rx
                    .lock()
                    .unwrap()
                    .recv_timeout(Duration::from_secs(5))
                    .unwrap();
            }
        });
        let blocker = {
            let state = state.clone();
            thread::spawn(move || {
                let blocker = Participant::remote("blocker", "Blocker", MediaStream::empty());
                state.add_participant(blocker).unwrap()
            })
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let adder = {
            let transport = transport.clone();
            thread::spawn(move || transport.add_remote_participant())
        };
        wait_until(|| transport.remote_ids().len() == 2);

        let stopper = thread::spawn(move || futures::executor::block_on(handle.stop()));
        wait_until(|| !transport.is_started());

        release_tx.send(()).unwrap();
        blocker.join().unwrap();
        stopper.join().unwrap();
        let result = adder.join().unwrap();
        gate.unsubscribe();

        assert!(matches!(result, Err(MeetingError::NotStarted)));
        assert!(state.participant("remote-mock-1").is_none());
        let ids: Vec<String> = state.participants().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, ["local", "blocker"]);
    }
}
