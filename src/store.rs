//! Observable state store for the active session.
//!
//! The session controller is the only writer. Readers take snapshots with
//! [`StateStore::read`] or register listeners that run synchronously on
//! every mutation, in the order mutations are applied.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::model::ProgressUpdate;

/// Snapshot of a session as seen by the UI layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// A session is opening or streaming
    pub active: bool,

    /// Latest progress or text update of the running session
    pub last_event: Option<ProgressUpdate>,

    /// Message of the error that ended the last session
    pub last_error: Option<String>,
}

impl SessionState {
    pub(crate) fn started() -> Self {
        Self {
            active: true,
            ..Self::default()
        }
    }

    pub(crate) fn failed(error: String) -> Self {
        Self {
            last_error: Some(error),
            ..Self::default()
        }
    }
}

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&SessionState) + Send + Sync>;

#[derive(Default)]
struct Notifications {
    pending: VecDeque<SessionState>,
    draining: bool,
}

/// Latest state of a controller's sessions plus its listeners.
#[derive(Default)]
pub struct StateStore {
    state: RwLock<SessionState>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    // Snapshots committed but not yet delivered, in commit order.
    notifications: Mutex<Notifications>,
    next_listener: AtomicU64,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("state", &self.read())
            .field("listeners", &lock(&self.listeners).len())
            .finish()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state snapshot.
    pub fn read(&self) -> SessionState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Register a listener called after every mutation with the new state.
    ///
    /// Listeners never run concurrently with each other. They may call
    /// [`read`](Self::read) and [`unsubscribe`](Self::unsubscribe) from
    /// inside the callback, and may start a session: the state that session
    /// commits is delivered once the current notification returns.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub(crate) fn update(&self, event: ProgressUpdate) {
        self.commit(|state| state.last_event = Some(event));
        self.notify();
    }

    /// Swap in a new state without notifying. Pair with [`notify`](Self::notify).
    pub(crate) fn replace(&self, next: SessionState) {
        self.commit(|state| *state = next);
    }

    /// Deliver every committed snapshot to the listeners.
    ///
    /// Returns at once if another call is already delivering; that call
    /// picks up the snapshots committed meanwhile.
    pub(crate) fn notify(&self) {
        {
            let mut notifications = lock(&self.notifications);
            if notifications.draining {
                return;
            }
            notifications.draining = true;
        }

        loop {
            let snapshot = {
                let mut notifications = lock(&self.notifications);
                match notifications.pending.pop_front() {
                    Some(snapshot) => snapshot,
                    None => {
                        notifications.draining = false;
                        return;
                    }
                }
            };

            let listeners: Vec<Listener> = lock(&self.listeners)
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect();

            for listener in listeners {
                listener(&snapshot);
            }
        }
    }

    fn commit(&self, apply: impl FnOnce(&mut SessionState)) {
        let mut notifications = lock(&self.notifications);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut state);
        notifications.pending.push_back(state.clone());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
