use serde::{Deserialize, Serialize};

use crate::orbit::Orbit;
use crate::orbit::error::Result;
use crate::orbit::messages::Message;
use crate::orbit::state::{AppState, GeoPoint};

/// Closed set of event categories. The last five double as landmark-group
/// categories for the permanent seeded events.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Chill,
    Party,
    Study,
    Food,
    Sport,
    Music,
    Landmark,
    Server,
    Nature,
    Historical,
    Shopping,
}

/// A place-bound group or activity pinned on the globe.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Event {
    pub id: String,
    /// Owning user id, or "system" for seeded landmark groups.
    pub host_id: String,
    pub title: String,
    pub description: String,
    pub location: GeoPoint,
    /// Display label, e.g. "6:00 PM" or "Always Open".
    pub time: String,
    pub kind: EventKind,
    pub is_private: bool,
    /// Ordered, duplicate-free; the host sits at index 0 on creation.
    pub attendees: Vec<String>,
    /// Users awaiting approval on a private event. Disjoint from attendees.
    pub pending_requests: Vec<String>,
    /// Unset means unlimited.
    pub max_attendees: Option<u32>,
    pub city: Option<String>,
}

impl Event {
    pub fn has_capacity(&self) -> bool {
        self.max_attendees
            .is_none_or(|max| (self.attendees.len() as u32) < max)
    }
}

/// Caller-supplied fields for a new event; the id and host come from the
/// store once the remote write is confirmed.
#[derive(Clone, Debug)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub location: GeoPoint,
    pub time: String,
    pub kind: EventKind,
    pub is_private: bool,
    pub max_attendees: Option<u32>,
    pub city: Option<String>,
}

impl AppState {
    /// Applies a confirmed event insert: a user hosts at most one
    /// self-created event, so any prior event with the same host is evicted
    /// before the new one is appended.
    pub(crate) fn apply_created_event(&mut self, event: Event) {
        self.events.retain(|e| e.host_id != event.host_id);
        self.events.push(event);
    }

    /// Removes the event unconditionally. Ownership is gated by the caller.
    pub fn delete_event(&mut self, event_id: &str) {
        self.events.retain(|e| e.id != event_id);
    }

    /// Joins the current user into an event. Private events collect the id
    /// into pending requests instead; public events enforce capacity and
    /// synthesize a system welcome message into the event thread.
    pub fn join_event(&mut self, event_id: &str) {
        let Some(current) = self.current_user.clone() else {
            return;
        };
        let Some(event) = self.events.iter_mut().find(|e| e.id == event_id) else {
            return;
        };

        if event.is_private {
            if !event.pending_requests.iter().any(|id| id == &current.id)
                && !event.attendees.iter().any(|id| id == &current.id)
            {
                event.pending_requests.push(current.id);
            }
            return;
        }

        if event.attendees.iter().any(|id| id == &current.id) {
            return;
        }
        if !event.has_capacity() {
            return;
        }

        event.attendees.push(current.id.clone());
        let welcome = Message::system_welcome(event_id, &current.name);
        self.messages
            .entry(event_id.to_string())
            .or_default()
            .push(welcome);
    }

    /// Removes the current user from the attendee list. Pending requests
    /// are left alone.
    pub fn leave_event(&mut self, event_id: &str) {
        let Some(current) = self.current_user.as_ref() else {
            return;
        };
        let current_id = current.id.clone();
        if let Some(event) = self.events.iter_mut().find(|e| e.id == event_id) {
            event.attendees.retain(|id| id != &current_id);
        }
    }

    /// Moves a user from an event's pending requests into its attendees.
    /// Already-attending users are not duplicated.
    pub fn approve_request(&mut self, event_id: &str, user_id: &str) {
        let Some(event) = self.events.iter_mut().find(|e| e.id == event_id) else {
            return;
        };
        event.pending_requests.retain(|id| id != user_id);
        if !event.attendees.iter().any(|id| id == user_id) {
            event.attendees.push(user_id.to_string());
        }
    }
}

impl Orbit {
    /// Creates an event hosted by the current user.
    ///
    /// This is the one action that waits for the remote store: local state
    /// is only mutated once the insert is confirmed, so a failed write
    /// leaves nothing to roll back. The returned error is the caller-facing
    /// alert surface. Returns `Ok(None)` when no current user is set.
    pub async fn create_event(&self, draft: EventDraft) -> Result<Option<Event>> {
        let Some(host) = self.read_state().current_user.clone() else {
            tracing::debug!(
                target: "orbit::events::create_event",
                "No current user; dropping event draft"
            );
            return Ok(None);
        };

        let row = self
            .remote
            .insert_event(&draft, &host.id)
            .await
            .map_err(|e| {
                tracing::error!(
                    target: "orbit::events::create_event",
                    "Remote insert failed for host {}: {}",
                    host.id,
                    e
                );
                e
            })?;

        let event = Event {
            id: row.id,
            host_id: host.id.clone(),
            title: draft.title,
            description: draft.description,
            location: draft.location,
            time: draft.time,
            kind: draft.kind,
            is_private: draft.is_private,
            attendees: vec![host.id],
            pending_requests: Vec::new(),
            max_attendees: draft.max_attendees,
            city: draft.city,
        };

        self.write_state().apply_created_event(event.clone());
        Ok(Some(event))
    }

    pub fn delete_event(&self, event_id: &str) {
        self.write_state().delete_event(event_id);
    }

    pub fn join_event(&self, event_id: &str) {
        self.write_state().join_event(event_id);
    }

    pub fn leave_event(&self, event_id: &str) {
        self.write_state().leave_event(event_id);
    }

    pub fn approve_request(&self, event_id: &str, user_id: &str) {
        self.write_state().approve_request(event_id, user_id);
    }
}
