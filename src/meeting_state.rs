//! In-memory participant registry with change notification.
//!
//! `MeetingState` is a cheap handle: clones refer to the same store. Records are
//! kept in insertion order and every read hands out an owned copy, so callers
//! never share mutable state with the store. Listeners run synchronously on the
//! mutating thread after the record lock is released, which lets them read from
//! (or write to) the store again. A change made from another thread waits until
//! the current change has been delivered to every listener.

use log::debug;
use parking_lot::ReentrantMutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::errors::{MeetingError, MeetingResult};
use crate::model::{MeetingEvent, MeetingEventType, Participant, ParticipantKind, ParticipantUpdate};

type Listener = Arc<dyn Fn(MeetingEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    participants: Vec<Participant>,
    local_participant_id: Option<String>,
}

impl Registry {
    fn position(&self, id: &str) -> Option<usize> {
        self.participants.iter().position(|p| p.id == id)
    }
}

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    by_type: HashMap<MeetingEventType, Vec<(u64, Listener)>>,
}

#[derive(Clone, Default)]
pub struct MeetingState {
    registry: Arc<Mutex<Registry>>,
    listeners: Arc<Mutex<ListenerRegistry>>,
    // Held from a mutation until its last listener returns. Re-entrant so
    // listeners on the same thread can write back.
    dispatch: Arc<ReentrantMutex<()>>,
}

// Store contents are plain values, so a panic in another holder cannot leave them torn.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MeetingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_participant(&self, participant: Participant) -> MeetingResult<Participant> {
        let _dispatch = self.dispatch.lock();
        {
            let mut registry = lock(&self.registry);
            if registry.position(&participant.id).is_some() {
                return Err(MeetingError::DuplicateParticipant(participant.id));
            }

            if participant.kind == ParticipantKind::Local {
                registry.local_participant_id = Some(participant.id.clone());
            }
            registry.participants.push(participant.clone());
        }

        debug!("Participant added: {}", participant.id);
        self.emit(MeetingEventType::ParticipantAdded, &participant);
        Ok(participant)
    }

    /// Merges `update` over the stored record. The id is never part of the patch.
    pub fn update_participant(
        &self,
        id: &str,
        update: ParticipantUpdate,
    ) -> MeetingResult<Participant> {
        let _dispatch = self.dispatch.lock();
        let updated = {
            let mut registry = lock(&self.registry);
            let index = registry
                .position(id)
                .ok_or_else(|| MeetingError::NotFound(id.to_string()))?;

            let current = &mut registry.participants[index];
            update.apply_to(current);
            let updated = current.clone();

            if updated.kind == ParticipantKind::Local {
                registry.local_participant_id = Some(updated.id.clone());
            }
            updated
        };

        self.emit(MeetingEventType::ParticipantUpdated, &updated);
        Ok(updated)
    }

    /// Deletes `id` and returns its last snapshot. Unknown ids are a silent no-op.
    ///
    /// The participant's tracks are left alone; releasing them is up to whoever
    /// created the stream.
    pub fn remove_participant(&self, id: &str) -> Option<Participant> {
        let _dispatch = self.dispatch.lock();
        let removed = {
            let mut registry = lock(&self.registry);
            let index = registry.position(id)?;
            let removed = registry.participants.remove(index);
            if registry.local_participant_id.as_deref() == Some(id) {
                registry.local_participant_id = None;
            }
            removed
        };

        debug!("Participant removed: {}", removed.id);
        self.emit(MeetingEventType::ParticipantRemoved, &removed);
        Some(removed)
    }

    pub fn participant(&self, id: &str) -> Option<Participant> {
        let registry = lock(&self.registry);
        registry.position(id).map(|i| registry.participants[i].clone())
    }

    pub fn participants(&self) -> Vec<Participant> {
        lock(&self.registry).participants.clone()
    }

    pub fn local_participant(&self) -> Option<Participant> {
        let registry = lock(&self.registry);
        let id = registry.local_participant_id.as_deref()?;
        registry.position(id).map(|i| registry.participants[i].clone())
    }

    pub fn remote_participants(&self) -> Vec<Participant> {
        self.participants()
            .into_iter()
            .filter(|p| p.kind == ParticipantKind::Remote)
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` while no other thread can change the store or deliver events.
    ///
    /// Lets an observer take a snapshot and subscribe without missing a change
    /// in between.
    pub fn exclusive<R>(&self, f: impl FnOnce(&MeetingState) -> R) -> R {
        let _dispatch = self.dispatch.lock();
        f(self)
    }

    pub fn subscribe<F>(&self, event_type: MeetingEventType, listener: F) -> Subscription
    where
        F: Fn(MeetingEvent) + Send + Sync + 'static,
    {
        let mut listeners = lock(&self.listeners);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners
            .by_type
            .entry(event_type)
            .or_default()
            .push((id, Arc::new(listener)));

        Subscription {
            id,
            event_type,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    fn emit(&self, event_type: MeetingEventType, participant: &Participant) {
        let targets: Vec<Listener> = match lock(&self.listeners).by_type.get(&event_type) {
            Some(registered) => registered.iter().map(|(_, l)| l.clone()).collect(),
            None => return,
        };

        for listener in targets {
            listener(MeetingEvent {
                event_type,
                participant: participant.clone(),
            });
        }
    }
}

impl fmt::Debug for MeetingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = lock(&self.registry);
        f.debug_struct("MeetingState")
            .field("participants", &registry.participants.len())
            .field("local_participant_id", &registry.local_participant_id)
            .finish()
    }
}

/// Registration returned by [`MeetingState::subscribe`].
///
/// The listener stays registered until [`Subscription::unsubscribe`] is called.
#[must_use = "dropping a Subscription keeps the listener registered forever"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    event_type: MeetingEventType,
    listeners: Weak<Mutex<ListenerRegistry>>,
}

impl Subscription {
    pub fn event_type(&self) -> MeetingEventType {
        self.event_type
    }

    /// Removes exactly this listener. Safe to call more than once.
    pub fn unsubscribe(&self) {
        let Some(listeners) = self.listeners.upgrade() else {
            return;
        };
        let mut listeners = lock(&listeners);
        if let Some(registered) = listeners.by_type.get_mut(&self.event_type) {
            registered.retain(|(id, _)| *id != self.id);
        }
    }
}
