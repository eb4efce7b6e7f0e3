use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::Context;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::init_tracing;
use crate::orbit::error::Result;
use crate::orbit::state::{AppState, DEFAULT_LOCATION, read_guard, write_guard};
use crate::orbit::users::UserStatus;
use crate::remote::rows::{EventRow, UserRow};
use crate::remote::subscriptions::{ChangeType, Table, TableChange};
use crate::remote::{RemoteConfig, RemoteManager};

pub mod connections;
pub mod error;
pub mod events;
pub mod landmarks;
pub mod messages;
pub mod session;
pub mod state;
pub mod stories;
pub mod users;
mod utils;

#[derive(Debug, Clone)]
pub struct OrbitConfig {
    pub logs_dir: PathBuf,
    pub remote: RemoteConfig,
}

impl OrbitConfig {
    pub fn new(logs_dir: PathBuf, remote: RemoteConfig) -> Self {
        let env_suffix = if cfg!(debug_assertions) { "dev" } else { "release" };
        Self {
            logs_dir: logs_dir.join(env_suffix),
            remote,
        }
    }
}

/// Receivers for the realtime pipeline, parked here between `initialize`
/// and `initialize_realtime`. Taking them exactly once is what makes
/// `initialize_realtime` idempotent.
struct RealtimeReceivers {
    changes: Receiver<TableChange>,
    shutdown: Receiver<()>,
}

/// Client core for the proximity network. Owns the in-memory state, the
/// remote connection, and the background loops that keep the two in sync.
pub struct Orbit {
    pub config: OrbitConfig,
    pub(crate) state: Arc<RwLock<AppState>>,
    pub(crate) remote: RemoteManager,
    /// Handle captured at initialization, so fire-and-forget work can be
    /// spawned from callers running outside the runtime's threads.
    pub(crate) runtime: tokio::runtime::Handle,
    change_sender: Sender<TableChange>,
    shutdown_sender: Sender<()>,
    realtime: Mutex<Option<RealtimeReceivers>>,
}

impl std::fmt::Debug for Orbit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orbit")
            .field("config", &self.config)
            .field("state", &"<RwLock<AppState>>")
            .field("remote", &self.remote)
            .finish()
    }
}

impl Orbit {
    /// Builds the client core: sets up logging, connects the remote
    /// manager, and starts the session loop. Realtime table streams are
    /// not started here; call [`Orbit::initialize_realtime`] once the UI
    /// is ready to receive presence data.
    pub async fn initialize(config: OrbitConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.logs_dir)
            .context("Failed to create logs directory")?;
        init_tracing(&config.logs_dir);

        tracing::debug!(target: "orbit::initialize", "Initializing Orbit...");

        let (change_sender, change_receiver) = tokio::sync::mpsc::channel(500);
        let (shutdown_sender, shutdown_receiver) = tokio::sync::mpsc::channel(1);

        let (remote, session_receiver) = RemoteManager::new(config.remote.clone())?;

        let state = Arc::new(RwLock::new(AppState::new()));

        tokio::spawn(session::run_session_loop(
            remote.clone(),
            Arc::clone(&state),
            session_receiver,
        ));

        Ok(Self {
            config,
            state,
            remote,
            runtime: tokio::runtime::Handle::current(),
            change_sender,
            shutdown_sender,
            realtime: Mutex::new(Some(RealtimeReceivers {
                changes: change_receiver,
                shutdown: shutdown_receiver,
            })),
        })
    }

    pub(crate) fn read_state(&self) -> std::sync::RwLockReadGuard<'_, AppState> {
        read_guard(&self.state)
    }

    pub(crate) fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, AppState> {
        write_guard(&self.state)
    }

    /// Owned copy of the full state, for render passes.
    pub fn snapshot(&self) -> AppState {
        self.read_state().clone()
    }

    /// Loads the initial user and event sets and starts the realtime
    /// streams feeding the merge loop. Safe to call more than once; only
    /// the first call does anything.
    pub async fn initialize_realtime(&self) -> Result<()> {
        let receivers = {
            let mut slot = self
                .realtime
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            slot.take()
        };
        let Some(receivers) = receivers else {
            tracing::debug!(
                target: "orbit::initialize_realtime",
                "Realtime already running, skipping"
            );
            return Ok(());
        };

        // Initial snapshots are best-effort. The streams below deliver
        // anything we miss here.
        match self.remote.fetch_users().await {
            Ok(users) => {
                let own_id = self.read_state().current_user.as_ref().map(|u| u.id.clone());
                let mut state = self.write_state();
                for row in users {
                    if Some(&row.id) == own_id.as_ref() {
                        continue;
                    }
                    state.upsert_nearby_user(row.into_user(DEFAULT_LOCATION));
                }
            }
            Err(e) => {
                tracing::warn!(
                    target: "orbit::initialize_realtime",
                    "Initial user fetch failed: {}",
                    e
                );
            }
        }
        match self.remote.fetch_events().await {
            Ok(events) => {
                let mut state = self.write_state();
                for row in events {
                    state.upsert_event(row.into_event());
                }
            }
            Err(e) => {
                tracing::warn!(
                    target: "orbit::initialize_realtime",
                    "Initial event fetch failed: {}",
                    e
                );
            }
        }

        self.remote
            .spawn_subscription(Table::Users, self.change_sender.clone());
        self.remote
            .spawn_subscription(Table::Events, self.change_sender.clone());

        tokio::spawn(process_changes(
            Arc::clone(&self.state),
            receivers.changes,
            receivers.shutdown,
        ));

        Ok(())
    }

    /// Stops the merge loop. Subscription tasks exit on their own once
    /// the change channel closes.
    pub async fn shutdown(&self) {
        if let Err(e) = self.shutdown_sender.send(()).await {
            tracing::debug!(
                target: "orbit::shutdown",
                "Merge loop already stopped: {}",
                e
            );
        }
    }
}

/// Merge loop: applies table change frames to the store until shutdown.
async fn process_changes(
    state: Arc<RwLock<AppState>>,
    mut changes: Receiver<TableChange>,
    mut shutdown: Receiver<()>,
) {
    tracing::debug!(target: "orbit::process_changes", "Starting merge loop");
    loop {
        tokio::select! {
            Some(change) = changes.recv() => {
                let mut guard = write_guard(&state);
                match change.table {
                    Table::Users => apply_user_change(&mut guard, &change),
                    Table::Events => apply_event_change(&mut guard, &change),
                }
            }
            _ = shutdown.recv() => {
                tracing::debug!(target: "orbit::process_changes", "Shutting down merge loop");
                break;
            }
            else => break,
        }
    }
}

/// Applies one `users` change. Realtime payloads carry the raw geometry
/// column, which may not decode; in that case the user keeps their last
/// known coordinates rather than jumping to a default.
pub(crate) fn apply_user_change(state: &mut AppState, change: &TableChange) {
    match change.change {
        ChangeType::Insert | ChangeType::Update => {
            let Some(row) = change
                .new_row
                .as_ref()
                .and_then(|v| serde_json::from_value::<UserRow>(v.clone()).ok())
            else {
                tracing::debug!(
                    target: "orbit::process_changes",
                    "Dropping malformed user change frame"
                );
                return;
            };
            if state.current_user.as_ref().is_some_and(|u| u.id == row.id) {
                return;
            }

            let prior = state
                .nearby_users
                .iter()
                .find(|u| u.id == row.id)
                .map(|u| u.location)
                .unwrap_or(DEFAULT_LOCATION);
            let user = row.into_user(prior);

            if user.status == UserStatus::Offline {
                state.remove_nearby_user(&user.id);
            } else {
                state.upsert_nearby_user(user);
            }
        }
        ChangeType::Delete => {
            if let Some(id) = change
                .old_row
                .as_ref()
                .and_then(|v| v.get("id"))
                .and_then(|v| v.as_str())
            {
                state.remove_nearby_user(id);
            }
        }
    }
}

/// Applies one `events` change. Attendance is client-side state, so an
/// update keeps whatever attendee and request lists the store already
/// holds for that event.
pub(crate) fn apply_event_change(state: &mut AppState, change: &TableChange) {
    match change.change {
        ChangeType::Insert | ChangeType::Update => {
            let Some(row) = change
                .new_row
                .as_ref()
                .and_then(|v| serde_json::from_value::<EventRow>(v.clone()).ok())
            else {
                tracing::debug!(
                    target: "orbit::process_changes",
                    "Dropping malformed event change frame"
                );
                return;
            };
            let mut event = row.into_event();
            if let Some(existing) = state.events.iter().find(|e| e.id == event.id) {
                event.attendees = existing.attendees.clone();
                event.pending_requests = existing.pending_requests.clone();
            }
            state.upsert_event(event);
        }
        ChangeType::Delete => {
            if let Some(id) = change
                .old_row
                .as_ref()
                .and_then(|v| v.get("id"))
                .and_then(|v| v.as_str())
            {
                state.remove_event(id);
            }
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    use chrono::Utc;
    use tempfile::TempDir;

    use super::*;
    use crate::orbit::events::{Event, EventKind};
    use crate::orbit::state::GeoPoint;
    use crate::orbit::users::User;

    pub async fn create_mock_orbit() -> (Orbit, mockito::ServerGuard, TempDir) {
        let server = mockito::Server::new_async().await;
        let temp = TempDir::new().expect("temp dir");
        let config = OrbitConfig::new(
            temp.path().join("logs"),
            RemoteConfig::new(server.url(), "test-anon-key".to_string()),
        );
        let orbit = Orbit::initialize(config)
            .await
            .expect("Failed to initialize Orbit");
        (orbit, server, temp)
    }

    pub fn test_user(id: &str) -> User {
        User {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            name: id.to_string(),
            username: id.to_string(),
            bio: String::new(),
            avatar: format!("https://example.com/{id}.png"),
            location: GeoPoint::new(18.22, -66.59),
            city: None,
            status: UserStatus::Online,
            last_active: Utc::now(),
            interests: Vec::new(),
            relationship_tier: None,
            blocked_users: Vec::new(),
            is_verified: false,
        }
    }

    pub fn test_event(id: &str, host: &str) -> Event {
        Event {
            id: id.to_string(),
            host_id: host.to_string(),
            title: format!("Event {id}"),
            description: String::new(),
            location: GeoPoint::new(40.7128, -74.006),
            time: "Tonight 8pm".to_string(),
            kind: EventKind::Chill,
            is_private: false,
            attendees: vec![host.to_string()],
            pending_requests: Vec::new(),
            max_attendees: None,
            city: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::test_utils::{create_mock_orbit, test_user};
    use super::*;
    use crate::orbit::state::GeoPoint;

    fn user_frame(change: ChangeType, new_row: serde_json::Value) -> TableChange {
        TableChange {
            table: Table::Users,
            change,
            new_row: Some(new_row),
            old_row: None,
        }
    }

    #[test]
    fn test_user_insert_adds_nearby_user() {
        let mut state = AppState::new();
        state.set_current_user(test_user("me"));

        apply_user_change(
            &mut state,
            &user_frame(
                ChangeType::Insert,
                json!({"id": "u2", "name": "Ana", "status": "online",
                       "lat": 40.7, "lng": -74.0}),
            ),
        );

        assert_eq!(state.nearby_users.len(), 1);
        assert_eq!(state.nearby_users[0].name, "Ana");
        assert_eq!(state.nearby_users[0].location.lat, 40.7);
    }

    #[test]
    fn test_user_change_for_current_user_is_ignored() {
        let mut state = AppState::new();
        state.set_current_user(test_user("me"));

        apply_user_change(
            &mut state,
            &user_frame(ChangeType::Update, json!({"id": "me", "status": "online"})),
        );

        assert!(state.nearby_users.is_empty());
    }

    #[test]
    fn test_offline_update_removes_user() {
        let mut state = AppState::new();
        state.upsert_nearby_user(test_user("u2"));

        apply_user_change(
            &mut state,
            &user_frame(ChangeType::Update, json!({"id": "u2", "status": "offline"})),
        );

        assert!(state.nearby_users.is_empty());
    }

    #[test]
    fn test_undecodable_location_keeps_last_known_coordinates() {
        let mut state = AppState::new();
        let mut known = test_user("u2");
        known.location = GeoPoint::new(40.7138, -74.005);
        state.upsert_nearby_user(known);

        // Realtime frames carry the raw geometry column, not projected
        // scalars. Garbage hex must not move the pin.
        apply_user_change(
            &mut state,
            &user_frame(
                ChangeType::Update,
                json!({"id": "u2", "name": "Ana", "status": "busy",
                       "location": "nothexatall"}),
            ),
        );

        assert_eq!(state.nearby_users[0].name, "Ana");
        assert_eq!(state.nearby_users[0].status, UserStatus::Busy);
        assert_eq!(state.nearby_users[0].location, GeoPoint::new(40.7138, -74.005));
    }

    #[test]
    fn test_user_delete_removes_by_old_row_id() {
        let mut state = AppState::new();
        state.upsert_nearby_user(test_user("u2"));

        apply_user_change(
            &mut state,
            &TableChange {
                table: Table::Users,
                change: ChangeType::Delete,
                new_row: None,
                old_row: Some(json!({"id": "u2"})),
            },
        );

        assert!(state.nearby_users.is_empty());
    }

    #[test]
    fn test_event_update_preserves_local_attendance() {
        let mut state = AppState::new();
        let mut event = test_utils::test_event("e1", "host");
        event.attendees.push("me".to_string());
        event.pending_requests.push("u3".to_string());
        state.upsert_event(event);

        apply_event_change(
            &mut state,
            &TableChange {
                table: Table::Events,
                change: ChangeType::Update,
                new_row: Some(json!({"id": "e1", "host_id": "host",
                                     "title": "New title", "type": "party"})),
                old_row: None,
            },
        );

        let updated = state.events.iter().find(|e| e.id == "e1").expect("event kept");
        assert_eq!(updated.title, "New title");
        assert!(updated.attendees.contains(&"me".to_string()));
        assert_eq!(updated.pending_requests, vec!["u3".to_string()]);
    }

    #[test]
    fn test_event_delete_removes_event() {
        let mut state = AppState::new();
        state.upsert_event(test_utils::test_event("e1", "host"));
        let before = state.events.len();

        apply_event_change(
            &mut state,
            &TableChange {
                table: Table::Events,
                change: ChangeType::Delete,
                new_row: None,
                old_row: Some(json!({"id": "e1"})),
            },
        );

        assert_eq!(state.events.len(), before - 1);
    }

    #[tokio::test]
    async fn test_initialize_realtime_bootstraps_exactly_once() {
        let (orbit, mut server, _logs) = create_mock_orbit().await;
        let users_mock = server
            .mock("GET", "/rest/v1/users")
            .match_query(mockito::Matcher::Any)
            .expect(1)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id": "u2", "name": "Ana", "status": "online", "lat": 1.0, "lng": 2.0}]"#)
            .create_async()
            .await;
        let events_mock = server
            .mock("GET", "/rest/v1/events")
            .match_query(mockito::Matcher::Any)
            .expect(1)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id": "e1", "host_id": "u2", "title": "Rooftop", "type": "party"}]"#)
            .create_async()
            .await;

        orbit.initialize_realtime().await.expect("first call succeeds");
        orbit
            .initialize_realtime()
            .await
            .expect("second call is a no-op");

        // One snapshot fetch per table, not two.
        users_mock.assert_async().await;
        events_mock.assert_async().await;

        let state = orbit.snapshot();
        assert!(state.nearby_users.iter().any(|u| u.id == "u2"));
        assert!(state.events.iter().any(|e| e.id == "e1"));
    }

    #[tokio::test]
    async fn test_initialize_realtime_snapshot_failure_leaves_prior_state() {
        let (orbit, mut server, _logs) = create_mock_orbit().await;
        server
            .mock("GET", "/rest/v1/users")
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/events")
            .with_status(500)
            .create_async()
            .await;
        let before = orbit.snapshot();

        orbit
            .initialize_realtime()
            .await
            .expect("snapshot failures are not fatal");

        let state = orbit.snapshot();
        assert!(state.nearby_users.is_empty());
        assert_eq!(state.events.len(), before.events.len());
    }

    #[test]
    fn test_malformed_frame_is_dropped() {
        let mut state = AppState::new();
        apply_user_change(
            &mut state,
            &user_frame(ChangeType::Insert, json!("not an object")),
        );
        assert!(state.nearby_users.is_empty());
    }
}
