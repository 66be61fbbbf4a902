//! The in-memory registry of active user lab records.  Everything the rest
//! of the controller knows about a user's lab flows through here, and the
//! atomic insert in [`UserMap::create_if_absent`] is the single choke point
//! enforcing at-most-one lab per user.

use std::collections::HashMap;
use std::sync::{
    Arc,
    Mutex,
};

use nb_api::v1::{
    Event,
    LabSpecification,
    LabStatus,
    PodState,
    UserData,
    UserInfo,
    UserResources,
};
use nb_core::errors::*;
use tokio::sync::Notify;

use crate::errors::SpawnerError;

/// Bound on the per-user event queue; on overflow the oldest non-terminal
/// event is dropped.
pub const MAX_EVENTS_PER_USER: usize = 100;

struct UserEntry {
    data: UserData,

    // Sequence number of the next event to be appended; subscribers keep
    // their own cursor against this, so dropped or cleared events are
    // simply skipped over.
    next_seq: u64,

    notify: Arc<Notify>,
}

impl UserEntry {
    // The sequence number of the oldest event still in the queue
    fn base_seq(&self) -> u64 {
        self.next_seq - self.data.events.len() as u64
    }
}

pub(crate) enum EventPoll {
    Ready(Event, u64),
    Pending,
    Closed,
}

#[derive(Clone)]
pub struct UserMap {
    inner: Arc<Mutex<HashMap<String, UserEntry>>>,
}

impl UserMap {
    pub fn new() -> UserMap {
        UserMap { inner: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn get(&self, username: &str) -> Option<UserData> {
        self.inner.lock().unwrap().get(username).map(|entry| entry.data.clone())
    }

    /// Usernames with labs in the running state, for the admin listing.
    pub fn running(&self) -> Vec<String> {
        let mut users: Vec<String> = self
            .inner
            .lock()
            .unwrap()
            .values()
            .filter(|entry| entry.data.status == LabStatus::Running)
            .map(|entry| entry.data.username.clone())
            .collect();
        users.sort();
        users
    }

    /// Atomically insert a starting record for the user; a second insert
    /// while any record exists always fails fast.
    pub fn create_if_absent(
        &self,
        user: &UserInfo,
        spec: &LabSpecification,
        resources: &UserResources,
    ) -> EmptyResult {
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(&user.username) {
            bail!(SpawnerError::already_exists(&user.username));
        }
        map.insert(user.username.clone(), UserEntry {
            data: UserData::new_from_user(user, spec, resources),
            next_seq: 0,
            notify: Arc::new(Notify::new()),
        });
        Ok(())
    }

    pub fn remove(&self, username: &str) -> Option<UserData> {
        let entry = self.inner.lock().unwrap().remove(username);
        entry.map(|e| {
            // Wake any subscribers so they can see the record is gone
            e.notify.notify_waiters();
            e.data
        })
    }

    pub fn set_status(&self, username: &str, status: LabStatus) {
        if let Some(entry) = self.inner.lock().unwrap().get_mut(username) {
            entry.data.status = status;
        }
    }

    pub fn set_pod_state(&self, username: &str, pod: PodState) {
        if let Some(entry) = self.inner.lock().unwrap().get_mut(username) {
            entry.data.pod = pod;
        }
    }

    pub fn clear_events(&self, username: &str) {
        if let Some(entry) = self.inner.lock().unwrap().get_mut(username) {
            entry.data.events.clear();
        }
    }

    pub fn append_event(&self, username: &str, event: Event) {
        let mut map = self.inner.lock().unwrap();
        let Some(entry) = map.get_mut(username) else {
            return;
        };

        if entry.data.events.len() >= MAX_EVENTS_PER_USER {
            if let Some(pos) = entry.data.events.iter().position(|e| !e.is_terminal()) {
                let _ = entry.data.events.remove(pos);
            }
        }
        entry.data.events.push_back(event);
        entry.next_seq += 1;
        entry.notify.notify_waiters();
    }

    pub(crate) fn notifier(&self, username: &str) -> Option<Arc<Notify>> {
        self.inner.lock().unwrap().get(username).map(|entry| entry.notify.clone())
    }

    /// Fetch the first event at or past the cursor, along with the cursor
    /// for the one after it.
    pub(crate) fn poll_event(&self, username: &str, cursor: u64) -> EventPoll {
        let map = self.inner.lock().unwrap();
        let Some(entry) = map.get(username) else {
            return EventPoll::Closed;
        };

        if cursor >= entry.next_seq {
            return EventPoll::Pending;
        }
        let index = (cursor.max(entry.base_seq()) - entry.base_seq()) as usize;
        match entry.data.events.get(index) {
            Some(event) => EventPoll::Ready(event.clone(), entry.base_seq() + index as u64 + 1),
            // Everything past the cursor was cleared; wait for more
            None => EventPoll::Pending,
        }
    }
}

impl Default for UserMap {
    fn default() -> Self {
        Self::new()
    }
}
