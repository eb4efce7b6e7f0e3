use serde::{Deserialize, Serialize};

use crate::orbit::Orbit;
use crate::orbit::state::AppState;

/// Edge weight in the social graph. Soulbound is the upgraded tier that
/// unlocks the privileged summon message type between two users.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionTier {
    #[default]
    Normal,
    Soulbound,
}

/// Pending friend-request state, split by direction. Both lists carry user
/// ids and behave as ordered sets.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Requests {
    pub incoming: Vec<String>,
    pub outgoing: Vec<String>,
}

impl AppState {
    /// Records an outgoing connection request. Duplicate sends collapse.
    pub fn send_connection_request(&mut self, target_user_id: &str) {
        if !self.requests.outgoing.iter().any(|id| id == target_user_id) {
            self.requests.outgoing.push(target_user_id.to_string());
        }
    }

    /// Records an incoming request from another user, for embedders wiring
    /// several stores together. Same set semantics as the outgoing side.
    pub fn receive_connection_request(&mut self, from_user_id: &str) {
        if !self.requests.incoming.iter().any(|id| id == from_user_id) {
            self.requests.incoming.push(from_user_id.to_string());
        }
    }

    /// Unconditionally sets the connection tier for a user and drops any
    /// matching incoming request. Because it overwrites, this is also the
    /// path for upgrading or downgrading an existing connection.
    pub fn accept_connection_request(&mut self, user_id: &str, tier: ConnectionTier) {
        self.connections.insert(user_id.to_string(), tier);
        self.requests.incoming.retain(|id| id != user_id);
    }

    /// Removes an incoming request without creating a connection.
    pub fn decline_connection_request(&mut self, user_id: &str) {
        self.requests.incoming.retain(|id| id != user_id);
    }

    /// Whether the summon message type is unlocked towards a user.
    pub fn can_summon(&self, user_id: &str) -> bool {
        self.connections.get(user_id) == Some(&ConnectionTier::Soulbound)
    }
}

impl Orbit {
    pub fn send_connection_request(&self, target_user_id: &str) {
        self.write_state().send_connection_request(target_user_id);
    }

    pub fn receive_connection_request(&self, from_user_id: &str) {
        self.write_state().receive_connection_request(from_user_id);
    }

    pub fn accept_connection_request(&self, user_id: &str, tier: ConnectionTier) {
        self.write_state().accept_connection_request(user_id, tier);
    }

    pub fn decline_connection_request(&self, user_id: &str) {
        self.write_state().decline_connection_request(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_request_deduplicates() {
        let mut state = AppState::new();
        state.send_connection_request("u2");
        state.send_connection_request("u2");
        assert_eq!(state.requests.outgoing, vec!["u2".to_string()]);
    }

    #[test]
    fn test_request_then_accept_scenario() {
        // U1 asks, U2's store sees the incoming request and accepts.
        let mut u1 = AppState::new();
        u1.send_connection_request("u2");
        assert_eq!(u1.requests.outgoing, vec!["u2".to_string()]);

        let mut u2 = AppState::new();
        u2.receive_connection_request("u1");
        assert_eq!(u2.requests.incoming, vec!["u1".to_string()]);

        u2.accept_connection_request("u1", ConnectionTier::Normal);
        assert_eq!(u2.connections.get("u1"), Some(&ConnectionTier::Normal));
        assert!(u2.requests.incoming.is_empty());
    }

    #[test]
    fn test_accept_absent_request_still_connects() {
        let mut state = AppState::new();
        state.accept_connection_request("u9", ConnectionTier::Normal);
        assert_eq!(state.connections.get("u9"), Some(&ConnectionTier::Normal));
    }

    #[test]
    fn test_accept_overwrites_tier() {
        let mut state = AppState::new();
        state.accept_connection_request("u2", ConnectionTier::Normal);
        state.accept_connection_request("u2", ConnectionTier::Soulbound);
        assert_eq!(state.connections.get("u2"), Some(&ConnectionTier::Soulbound));
        assert!(state.can_summon("u2"));
    }

    #[test]
    fn test_decline_removes_without_connecting() {
        let mut state = AppState::new();
        state.receive_connection_request("u3");
        state.decline_connection_request("u3");
        assert!(state.requests.incoming.is_empty());
        assert!(state.connections.get("u3").is_none());
        assert!(!state.can_summon("u3"));
    }
}
