use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::orbit::connections::{ConnectionTier, Requests};
use crate::orbit::events::Event;
use crate::orbit::landmarks;
use crate::orbit::messages::Message;
use crate::orbit::stories::Story;
use crate::orbit::users::User;

/// A coordinate pair on the globe.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Fallback coordinates for profiles with no stored geography.
pub(crate) const DEFAULT_LOCATION: GeoPoint = GeoPoint::new(18.2208, -66.5901);

/// One in-memory snapshot of the session's social and spatial world.
///
/// This is the only mutable state in the crate. Every synchronous transition
/// is a plain method on this type (defined in the domain modules) that
/// completes without I/O, so the store invariants are testable without a
/// runtime. [`Orbit`](super::Orbit) serializes access behind a single
/// `RwLock` and layers the remote round-trips on top.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppState {
    pub current_user: Option<User>,
    /// Users visible on the globe. Offline ("ghost mode") users are removed
    /// as change notifications arrive, mirroring the fetch-time exclusion.
    pub nearby_users: Vec<User>,
    pub events: Vec<Event>,
    pub stories: Vec<Story>,
    /// Social-graph edges keyed by the other user's id.
    pub connections: HashMap<String, ConnectionTier>,
    pub requests: Requests,
    /// Conversations keyed by thread key (event id, or the sorted id pair
    /// for direct messages).
    pub messages: HashMap<String, Vec<Message>>,
    pub is_authenticated: bool,
}

impl AppState {
    /// Empty session state, pre-seeded with the permanent landmark events.
    pub fn new() -> Self {
        Self {
            current_user: None,
            nearby_users: Vec::new(),
            events: landmarks::landmark_events(),
            stories: Vec::new(),
            connections: HashMap::new(),
            requests: Requests::default(),
            messages: HashMap::new(),
            is_authenticated: false,
        }
    }

    /// Replaces the current-user record wholesale. No validation.
    pub fn set_current_user(&mut self, user: User) {
        self.current_user = Some(user);
    }

    /// Upsert-by-id merge used by the realtime loop and snapshot fetches.
    pub(crate) fn upsert_nearby_user(&mut self, user: User) {
        match self.nearby_users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user,
            None => self.nearby_users.push(user),
        }
    }

    pub(crate) fn remove_nearby_user(&mut self, user_id: &str) {
        self.nearby_users.retain(|u| u.id != user_id);
    }

    pub(crate) fn upsert_event(&mut self, event: Event) {
        match self.events.iter_mut().find(|e| e.id == event.id) {
            Some(existing) => *existing = event,
            None => self.events.push(event),
        }
    }

    pub(crate) fn remove_event(&mut self, event_id: &str) {
        self.events.retain(|e| e.id != event_id);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

// A poisoned lock only means another thread panicked mid-transition; the
// snapshot itself is still a consistent value, so recover it.
pub(crate) fn read_guard(lock: &RwLock<AppState>) -> RwLockReadGuard<'_, AppState> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_guard(lock: &RwLock<AppState>) -> RwLockWriteGuard<'_, AppState> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
