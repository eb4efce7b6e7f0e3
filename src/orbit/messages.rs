use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::orbit::Orbit;
use crate::orbit::state::AppState;
use crate::orbit::utils::time_based_id;

/// Sender id used for store-synthesized messages such as join welcomes.
pub const SYSTEM_SENDER: &str = "system";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    /// Privileged ping between soulbound users.
    Summon,
}

/// Immutable once created; there is no edit or delete.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    /// The original addressee: a user id for DMs, an event id for group
    /// chats. Kept as sent even though storage is keyed by thread.
    pub receiver_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

impl Message {
    pub(crate) fn system_welcome(event_id: &str, user_name: &str) -> Self {
        Self {
            id: time_based_id(),
            sender_id: SYSTEM_SENDER.to_string(),
            receiver_id: event_id.to_string(),
            content: format!("Welcome {user_name}"),
            kind: MessageKind::Text,
            timestamp: Utc::now(),
            read: false,
        }
    }
}

/// Canonical conversation key for two participants: ids sorted
/// lexicographically and joined with a dash, so both sides derive the same
/// key regardless of who is sender. Group chats use the bare event id
/// instead.
pub fn thread_key(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}-{hi}")
}

impl AppState {
    /// Appends a message to the right thread. Event ids resolve to group
    /// threads, anything else is treated as a DM partner. No-op without a
    /// current user.
    pub fn send_message(&mut self, target_id: &str, content: &str, kind: MessageKind) {
        let Some(current) = self.current_user.as_ref() else {
            return;
        };

        let is_event = self.events.iter().any(|e| e.id == target_id);
        let key = if is_event {
            target_id.to_string()
        } else {
            thread_key(&current.id, target_id)
        };

        let message = Message {
            id: time_based_id(),
            sender_id: current.id.clone(),
            receiver_id: target_id.to_string(),
            content: content.to_string(),
            kind,
            timestamp: Utc::now(),
            read: false,
        };

        self.messages.entry(key).or_default().push(message);
    }

    /// Thread keys ordered by most recent activity, newest first.
    pub fn threads(&self) -> Vec<String> {
        let mut keyed: Vec<(&String, Option<DateTime<Utc>>)> = self
            .messages
            .iter()
            .map(|(key, msgs)| (key, msgs.last().map(|m| m.timestamp)))
            .collect();
        keyed.sort_by(|a, b| b.1.cmp(&a.1));
        keyed.into_iter().map(|(key, _)| key.clone()).collect()
    }

    /// Unread messages in a thread that were not authored by the current
    /// user.
    pub fn unread_count(&self, key: &str) -> usize {
        let own_id = self.current_user.as_ref().map(|u| u.id.as_str());
        self.messages
            .get(key)
            .map(|msgs| {
                msgs.iter()
                    .filter(|m| !m.read && Some(m.sender_id.as_str()) != own_id)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Marks everything in a thread the current user did not send as read.
    pub fn mark_thread_read(&mut self, key: &str) {
        let own_id = self.current_user.as_ref().map(|u| u.id.clone());
        let Some(msgs) = self.messages.get_mut(key) else {
            return;
        };
        for message in msgs.iter_mut() {
            if Some(&message.sender_id) != own_id.as_ref() {
                message.read = true;
            }
        }
    }
}

impl Orbit {
    pub fn send_message(&self, target_id: &str, content: &str, kind: MessageKind) {
        self.write_state().send_message(target_id, content, kind);
    }

    pub fn threads(&self) -> Vec<String> {
        self.read_state().threads()
    }

    pub fn unread_count(&self, key: &str) -> usize {
        self.read_state().unread_count(key)
    }

    pub fn mark_thread_read(&self, key: &str) {
        self.write_state().mark_thread_read(key);
    }
}
