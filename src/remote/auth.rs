//! Password auth endpoints. Outcomes are returned to the caller and also
//! emitted on the session stream so the store loads or drops the profile
//! without the UI having to wire that up.

use serde::Deserialize;
use serde_json::json;

use crate::remote::{RemoteManager, RemoteManagerError, Result};

/// Emitted whenever the remote session changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { user_id: String, email: String },
    SignedOut,
}

#[derive(Clone, Debug)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: TokenUser,
}

#[derive(Deserialize)]
struct TokenUser {
    id: String,
    email: Option<String>,
}

impl RemoteManager {
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let response = self
            .client
            .post(format!("{}?grant_type=password", self.auth_url("token")))
            .header("apikey", &self.config.anon_key)
            .json(&json!({"email": email, "password": password}))
            .send()
            .await?;
        self.emit_session(response, email).await
    }

    /// Registers a new account. Emits a signed-in event right away; the
    /// store synthesizes the profile row on first login.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Session> {
        let response = self
            .client
            .post(self.auth_url("signup"))
            .header("apikey", &self.config.anon_key)
            .json(&json!({"email": email, "password": password}))
            .send()
            .await?;
        self.emit_session(response, email).await
    }

    pub async fn sign_out(&self) -> Result<()> {
        let response = self
            .client
            .post(self.auth_url("logout"))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&self.config.anon_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RemoteManagerError::Auth(format!(
                "Sign-out failed with status {}",
                response.status()
            )));
        }

        if self.session_sender.send(SessionEvent::SignedOut).await.is_err() {
            tracing::debug!(
                target: "orbit::remote::auth",
                "Session stream closed, sign-out not delivered"
            );
        }
        Ok(())
    }

    async fn emit_session(&self, response: reqwest::Response, email: &str) -> Result<Session> {
        if !response.status().is_success() {
            let status = response.status();
            let detail = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| {
                    v.get("error_description")
                        .or_else(|| v.get("msg"))
                        .and_then(|d| d.as_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| format!("status {status}"));
            return Err(RemoteManagerError::Auth(detail));
        }

        let token: TokenResponse = response.json().await?;
        let session = Session {
            user_id: token.user.id,
            email: token.user.email.unwrap_or_else(|| email.to_string()),
            access_token: token.access_token,
        };

        let event = SessionEvent::SignedIn {
            user_id: session.user_id.clone(),
            email: session.email.clone(),
        };
        if self.session_sender.send(event).await.is_err() {
            tracing::debug!(
                target: "orbit::remote::auth",
                "Session stream closed, sign-in not delivered"
            );
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::tests::mock_manager;

    #[tokio::test]
    async fn test_sign_in_emits_session_event() {
        let (manager, mut receiver, mut server) = mock_manager().await;
        server
            .mock("POST", "/auth/v1/token?grant_type=password")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"email": "sam@example.com", "password": "hunter2"}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token": "jwt-abc",
                    "user": {"id": "u1", "email": "sam@example.com"}}"#,
            )
            .create_async()
            .await;

        let session = manager
            .sign_in("sam@example.com", "hunter2")
            .await
            .expect("sign-in succeeds");
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.access_token, "jwt-abc");

        let event = receiver.recv().await.expect("event emitted");
        assert_eq!(
            event,
            SessionEvent::SignedIn {
                user_id: "u1".to_string(),
                email: "sam@example.com".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_bad_credentials_surface_server_detail() {
        let (manager, mut receiver, mut server) = mock_manager().await;
        server
            .mock("POST", "/auth/v1/token?grant_type=password")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error_description": "Invalid login credentials"}"#)
            .create_async()
            .await;

        let result = manager.sign_in("sam@example.com", "wrong").await;
        match result {
            Err(RemoteManagerError::Auth(detail)) => {
                assert_eq!(detail, "Invalid login credentials");
            }
            other => panic!("expected auth error, got {other:?}"),
        }
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sign_up_emits_signed_in() {
        let (manager, mut receiver, mut server) = mock_manager().await;
        server
            .mock("POST", "/auth/v1/signup")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "jwt-new", "user": {"id": "u9", "email": null}}"#)
            .create_async()
            .await;

        let session = manager
            .sign_up("new@example.com", "hunter2")
            .await
            .expect("sign-up succeeds");
        assert_eq!(session.email, "new@example.com");
        assert!(matches!(
            receiver.recv().await,
            Some(SessionEvent::SignedIn { .. })
        ));
    }

    #[tokio::test]
    async fn test_sign_out_emits_signed_out() {
        let (manager, mut receiver, mut server) = mock_manager().await;
        server
            .mock("POST", "/auth/v1/logout")
            .with_status(204)
            .create_async()
            .await;

        manager.sign_out().await.expect("sign-out succeeds");
        assert_eq!(receiver.recv().await, Some(SessionEvent::SignedOut));
    }
}
