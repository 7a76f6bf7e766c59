use log::debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::meeting_state::{MeetingState, Subscription};
use crate::model::{MeetingEvent, MeetingEventType, Participant};

#[derive(Default)]
struct RosterView {
    participants: Vec<Participant>,
    revision: u64,
}

impl RosterView {
    fn apply(&mut self, event: MeetingEvent) {
        let id = &event.participant.id;
        let existing = self.participants.iter().position(|p| &p.id == id);
        match (event.event_type, existing) {
            (MeetingEventType::ParticipantRemoved, Some(index)) => {
                self.participants.remove(index);
            }
            (MeetingEventType::ParticipantRemoved, None) => {}
            (_, Some(index)) => self.participants[index] = event.participant,
            (_, None) => self.participants.push(event.participant),
        }
        self.revision += 1;
    }
}

/// Keeps an ordered copy of the store's participants, refreshed on every store event.
pub struct ParticipantRoster {
    view: Arc<Mutex<RosterView>>,
    subscriptions: Vec<Subscription>,
}

fn lock(view: &Mutex<RosterView>) -> MutexGuard<'_, RosterView> {
    view.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ParticipantRoster {
    /// Snapshots `state` and follows its events from that point on.
    pub fn attach(state: &MeetingState) -> Self {
        // No change may land between the snapshot and the subscriptions.
        state.exclusive(|state| {
            let view = Arc::new(Mutex::new(RosterView {
                participants: state.participants(),
                revision: 0,
            }));

            let subscriptions = MeetingEventType::ALL
                .iter()
                .map(|&event_type| {
                    let view = view.clone();
                    state.subscribe(event_type, move |event| {
                        debug!("Roster saw {} for {}", event.event_type, event.participant.id);
                        lock(&view).apply(event);
                    })
                })
                .collect();

            ParticipantRoster {
                view,
                subscriptions,
            }
        })
    }

    pub fn participants(&self) -> Vec<Participant> {
        lock(&self.view).participants.clone()
    }

    /// Number of store events observed since `attach`.
    pub fn revision(&self) -> u64 {
        lock(&self.view).revision
    }

    pub fn detach(&self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaStream;
    use crate::model::ParticipantUpdate;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_roster_follows_store() {
        let state = MeetingState::new();
        state
            .add_participant(Participant::local("You", MediaStream::empty()))
            .unwrap();

        let roster = ParticipantRoster::attach(&state);
        assert_eq!(roster.participants().len(), 1);
        assert_eq!(roster.revision(), 0);

        state
            .add_participant(Participant::remote("r1", "Remote", MediaStream::empty()))
            .unwrap();
        state
            .update_participant("r1", ParticipantUpdate::default().speaking(true))
            .unwrap();

        let participants = roster.participants();
        assert_eq!(participants.len(), 2);
        assert!(participants[1].speaking);
        assert_eq!(roster.revision(), 2);

        state.remove_participant("r1");
        assert_eq!(roster.participants().len(), 1);
        assert_eq!(roster.revision(), 3);
    }

    #[test]
    fn test_detach_stops_updates() {
        let state = MeetingState::new();
        let roster = ParticipantRoster::attach(&state);
        roster.detach();
        roster.detach();

        state
            .add_participant(Participant::remote("r1", "Remote", MediaStream::empty()))
            .unwrap();

        assert!(roster.participants().is_empty());
        assert_eq!(roster.revision(), 0);
    }

    #[test]
    fn test_roster_stays_consistent_across_threads() {
        let state = MeetingState::new();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let release_rx = Mutex::new(release_rx);
        let gate = state.subscribe(MeetingEventType::ParticipantAdded, move |_| {
            entered_tx.lock().unwrap().send(()).unwrap();
            release_rx
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5))
                .unwrap();
        });
        let roster = ParticipantRoster::attach(&state);

        let adder = {
            let state = state.clone();
            thread::spawn(move || {
                state
                    .add_participant(Participant::remote("x", "X", MediaStream::empty()))
                    .unwrap()
            })
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let remover = {
            let state = state.clone();
            thread::spawn(move || state.remove_participant("x"))
        };
        let late_attach = {
            let state = state.clone();
            thread::spawn(move || ParticipantRoster::attach(&state))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!remover.is_finished());
        assert!(!late_attach.is_finished());

        release_tx.send(()).unwrap();
        adder.join().unwrap();
        remover.join().unwrap();
        let late_roster = late_attach.join().unwrap();
        gate.unsubscribe();

        assert!(state.is_empty());
        assert!(roster.participants().is_empty());
        assert!(late_roster.participants().is_empty());
        assert_eq!(roster.revision(), 2);
    }
}
