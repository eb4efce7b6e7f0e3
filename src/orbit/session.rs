use std::sync::{Arc, RwLock};

use chrono::Utc;

use crate::orbit::Orbit;
use crate::orbit::connections::ConnectionTier;
use crate::orbit::state::{AppState, DEFAULT_LOCATION, write_guard};
use crate::orbit::users::{User, UserStatus};
use crate::remote::RemoteManager;
use crate::remote::auth::SessionEvent;

/// Render gate for protected screens. Starts out checking; settles once the
/// session flag comes up. While unauthenticated the screen stays unrendered
/// and the caller is told to redirect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthGate {
    #[default]
    Checking,
    Settled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    RedirectToLogin,
    Render,
}

impl AuthGate {
    pub fn evaluate(&mut self, is_authenticated: bool) -> GateDecision {
        if is_authenticated {
            *self = AuthGate::Settled;
            GateDecision::Render
        } else {
            GateDecision::RedirectToLogin
        }
    }
}

impl AppState {
    pub fn login(&mut self) {
        self.is_authenticated = true;
    }

    /// Lowers the session flag without touching the loaded profile. Used by
    /// the session stream so internal updates do not loop through logout.
    pub fn clean_session(&mut self) {
        self.is_authenticated = false;
    }
}

impl Orbit {
    pub fn login(&self) {
        self.write_state().login();
    }

    pub fn clean_session(&self) {
        self.write_state().clean_session();
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_state().is_authenticated
    }

    /// Clears the local session and invalidates the remote one. Remote
    /// failures are logged; local state is cleared regardless.
    pub async fn logout(&self) {
        {
            let mut state = self.write_state();
            state.is_authenticated = false;
            state.current_user = None;
        }

        if let Err(e) = self.remote.sign_out().await {
            tracing::warn!(
                target: "orbit::session::logout",
                "Remote sign-out failed: {}",
                e
            );
        }
    }

    /// Applies one session-stream event to the store. Normally driven by
    /// the spawned session loop; exposed for embedders running their own
    /// auth plumbing.
    pub async fn process_session_event(&self, event: SessionEvent) {
        handle_session_event(&self.remote, &self.state, event).await;
    }
}

/// Session-present events load the matching profile row, creating it first
/// if this is the account's first login (upsert-if-absent), then raise the
/// session flag. Session-absent events only lower the flag.
pub(crate) async fn handle_session_event(
    remote: &RemoteManager,
    state: &Arc<RwLock<AppState>>,
    event: SessionEvent,
) {
    match event {
        SessionEvent::SignedIn { user_id, email } => {
            let profile = match remote.fetch_user_by_id(&user_id).await {
                Ok(Some(row)) => {
                    let mut user = row.into_user(DEFAULT_LOCATION);
                    user.relationship_tier = Some(ConnectionTier::Normal);
                    user
                }
                Ok(None) => {
                    let user = synthesize_profile(&user_id, &email);
                    if let Err(e) = remote.upsert_user(&user).await {
                        tracing::error!(
                            target: "orbit::session",
                            "Failed to create profile for {}: {}",
                            user_id,
                            e
                        );
                        return;
                    }
                    user
                }
                Err(e) => {
                    tracing::error!(
                        target: "orbit::session",
                        "Failed to load profile for {}: {}",
                        user_id,
                        e
                    );
                    return;
                }
            };

            let mut guard = write_guard(state);
            guard.set_current_user(profile);
            guard.login();
        }
        SessionEvent::SignedOut => {
            write_guard(state).clean_session();
        }
    }
}

/// Long-lived consumer of the auth session stream.
pub(crate) async fn run_session_loop(
    remote: RemoteManager,
    state: Arc<RwLock<AppState>>,
    mut events: tokio::sync::mpsc::Receiver<SessionEvent>,
) {
    tracing::debug!(target: "orbit::session", "Session loop started");
    while let Some(event) = events.recv().await {
        handle_session_event(&remote, &state, event).await;
    }
    tracing::debug!(target: "orbit::session", "Session stream closed, exiting loop");
}

/// First-login profile: handle derived from the email local part, a
/// deterministic placeholder avatar, and the default coordinates until the
/// first location update lands.
fn synthesize_profile(user_id: &str, email: &str) -> User {
    let handle = email
        .split('@')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            let tail: String = user_id.chars().take(4).collect();
            format!("ghost_{tail}")
        });

    User {
        id: user_id.to_string(),
        email: email.to_string(),
        name: handle.clone(),
        username: handle,
        bio: String::new(),
        avatar: placeholder_avatar(user_id),
        location: DEFAULT_LOCATION,
        city: None,
        status: UserStatus::Online,
        last_active: Utc::now(),
        interests: Vec::new(),
        relationship_tier: Some(ConnectionTier::Normal),
        blocked_users: Vec::new(),
        is_verified: false,
    }
}

pub(crate) fn placeholder_avatar(user_id: &str) -> String {
    format!("https://api.dicebear.com/7.x/bottts/svg?seed={user_id}")
}
