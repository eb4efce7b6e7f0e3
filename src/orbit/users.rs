use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::orbit::Orbit;
use crate::orbit::connections::ConnectionTier;
use crate::orbit::state::{AppState, GeoPoint};

/// Presence values. `Offline` doubles as "ghost mode": the user disappears
/// from everyone else's globe while still seeing theirs.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    Offline,
    Busy,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    /// Globally unique, immutable after creation.
    pub id: String,
    pub email: String,
    pub name: String,
    pub username: String,
    pub bio: String,
    /// Color token or image URL.
    pub avatar: String,
    pub location: GeoPoint,
    /// User-facing display location, e.g. "San Juan, PR".
    pub city: Option<String>,
    pub status: UserStatus,
    pub last_active: DateTime<Utc>,
    pub interests: Vec<String>,
    pub relationship_tier: Option<ConnectionTier>,
    /// Ids of users this user has blocked.
    pub blocked_users: Vec<String>,
    /// True once the user accepted the community guidelines.
    pub is_verified: bool,
}

impl AppState {
    /// Flips the current user between online and offline. Busy counts as
    /// visible, so toggling from it lands on online. No-op without a
    /// current user.
    pub fn toggle_visibility(&mut self) {
        let Some(user) = self.current_user.as_mut() else {
            return;
        };
        user.status = match user.status {
            UserStatus::Online => UserStatus::Offline,
            UserStatus::Offline | UserStatus::Busy => UserStatus::Online,
        };
    }

    /// Blocks a user: records the id (idempotently) and severs any existing
    /// connection. Unblocking later does not restore the connection.
    pub fn block_user(&mut self, user_id: &str) {
        let Some(user) = self.current_user.as_mut() else {
            return;
        };
        if !user.blocked_users.iter().any(|id| id == user_id) {
            user.blocked_users.push(user_id.to_string());
        }
        self.connections.remove(user_id);
    }

    pub fn unblock_user(&mut self, user_id: &str) {
        let Some(user) = self.current_user.as_mut() else {
            return;
        };
        user.blocked_users.retain(|id| id != user_id);
    }
}

impl Orbit {
    /// Replaces the current-user record wholesale.
    pub fn set_current_user(&self, user: User) {
        self.write_state().set_current_user(user);
    }

    /// Toggles ghost mode for the current user.
    pub fn toggle_visibility(&self) {
        self.write_state().toggle_visibility();
    }

    pub fn block_user(&self, user_id: &str) {
        self.write_state().block_user(user_id);
    }

    pub fn unblock_user(&self, user_id: &str) {
        self.write_state().unblock_user(user_id);
    }

    /// Optimistically replaces the current user, then persists the profile
    /// to the remote store. Persist failures are logged and swallowed: the
    /// UI should never block on a profile save.
    pub async fn update_profile(&self, user: User) {
        self.write_state().set_current_user(user.clone());

        if let Err(e) = self.remote.upsert_user(&user).await {
            tracing::error!(
                target: "orbit::users::update_profile",
                "Failed to persist profile for {}: {}",
                user.id,
                e
            );
        }
    }

    /// Optimistic local move plus a best-effort remote write.
    // TODO: throttle location writes; as wired, every GPS tick becomes a
    // remote PATCH.
    pub async fn update_location(&self, lat: f64, lng: f64) {
        let point = GeoPoint::new(lat, lng);
        let user_id = {
            let mut state = self.write_state();
            let Some(user) = state.current_user.as_mut() else {
                return;
            };
            user.location = point;
            user.id.clone()
        };

        if let Err(e) = self.remote.update_user_location(&user_id, &point).await {
            tracing::warn!(
                target: "orbit::users::update_location",
                "Failed to persist location for {}: {}",
                user_id,
                e
            );
        }
    }

    /// Fire-and-forget notification to the moderation channel. Never blocks
    /// or fails the caller; no local state changes. Spawns onto the handle
    /// captured at initialization, so UI callback threads outside the
    /// runtime can call it too.
    pub fn report_user(&self, user_id: &str, reason: &str) {
        let reporter_id = self
            .read_state()
            .current_user
            .as_ref()
            .map(|u| u.id.clone());
        let remote = self.remote.clone();
        let user_id = user_id.to_string();
        let reason = reason.to_string();

        self.runtime.spawn(async move {
            if let Err(e) = remote
                .report_user(reporter_id.as_deref(), &user_id, &reason)
                .await
            {
                tracing::warn!(
                    target: "orbit::users::report_user",
                    "Failed to deliver report for {}: {}",
                    user_id,
                    e
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orbit::test_utils::{create_mock_orbit, test_user};

    #[test]
    fn test_toggle_visibility_cycles_online_offline() {
        let mut state = AppState::new();
        state.set_current_user(test_user("me"));

        state.toggle_visibility();
        assert_eq!(
            state.current_user.as_ref().map(|u| u.status),
            Some(UserStatus::Offline)
        );

        state.toggle_visibility();
        assert_eq!(
            state.current_user.as_ref().map(|u| u.status),
            Some(UserStatus::Online)
        );
    }

    #[test]
    fn test_toggle_visibility_from_busy_goes_online() {
        let mut state = AppState::new();
        let mut user = test_user("me");
        user.status = UserStatus::Busy;
        state.set_current_user(user);

        state.toggle_visibility();
        assert_eq!(
            state.current_user.as_ref().map(|u| u.status),
            Some(UserStatus::Online)
        );
    }

    #[test]
    fn test_toggle_visibility_without_user_is_noop() {
        let mut state = AppState::new();
        state.toggle_visibility();
        assert!(state.current_user.is_none());
    }

    #[test]
    fn test_block_user_severs_connection_and_is_idempotent() {
        let mut state = AppState::new();
        state.set_current_user(test_user("me"));
        state
            .connections
            .insert("u2".to_string(), ConnectionTier::Soulbound);

        state.block_user("u2");
        state.block_user("u2");

        let blocked = &state.current_user.as_ref().unwrap().blocked_users;
        assert_eq!(blocked, &vec!["u2".to_string()]);
        assert!(state.connections.get("u2").is_none());
    }

    #[test]
    fn test_unblock_does_not_restore_connection() {
        let mut state = AppState::new();
        state.set_current_user(test_user("me"));
        state
            .connections
            .insert("u2".to_string(), ConnectionTier::Normal);

        state.block_user("u2");
        state.unblock_user("u2");

        assert!(
            state
                .current_user
                .as_ref()
                .unwrap()
                .blocked_users
                .is_empty()
        );
        assert!(state.connections.get("u2").is_none());
    }

    #[tokio::test]
    async fn test_update_profile_is_optimistic_on_remote_failure() {
        let (orbit, mut server, _logs) = create_mock_orbit().await;
        let mock = server
            .mock("POST", "/rest/v1/users")
            .with_status(500)
            .create_async()
            .await;

        let mut user = test_user("me");
        user.bio = "new bio".to_string();
        orbit.update_profile(user).await;

        mock.assert_async().await;
        assert_eq!(
            orbit.snapshot().current_user.map(|u| u.bio),
            Some("new bio".to_string())
        );
    }

    #[tokio::test]
    async fn test_update_location_moves_locally_and_patches_remote() {
        let (orbit, mut server, _logs) = create_mock_orbit().await;
        let mock = server
            .mock("PATCH", "/rest/v1/users")
            .match_query(mockito::Matcher::UrlEncoded("id".into(), "eq.me".into()))
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"location": "POINT(2.2945 48.8584)"}"#.to_string(),
            ))
            .with_status(204)
            .create_async()
            .await;

        orbit.set_current_user(test_user("me"));
        orbit.update_location(48.8584, 2.2945).await;

        mock.assert_async().await;
        let location = orbit.snapshot().current_user.map(|u| u.location);
        assert_eq!(location, Some(GeoPoint::new(48.8584, 2.2945)));
    }

    #[tokio::test]
    async fn test_report_user_from_non_runtime_thread_still_delivers() {
        let (orbit, mut server, _logs) = create_mock_orbit().await;
        let mock = server
            .mock("POST", "/rest/v1/moderation_reports")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"reported_id": "u2", "reason": "spam"}"#.to_string(),
            ))
            .with_status(201)
            .create_async()
            .await;

        let orbit = std::sync::Arc::new(orbit);
        let caller = {
            let orbit = std::sync::Arc::clone(&orbit);
            std::thread::spawn(move || orbit.report_user("u2", "spam"))
        };
        caller.join().expect("caller thread must not panic");

        for _ in 0..100 {
            if mock.matched_async().await {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_location_without_user_skips_remote() {
        let (orbit, mut server, _logs) = create_mock_orbit().await;
        let mock = server
            .mock("PATCH", "/rest/v1/users")
            .expect(0)
            .create_async()
            .await;

        orbit.update_location(1.0, 2.0).await;
        mock.assert_async().await;
    }
}
