//! Remote adapter. Talks to the backing store over three surfaces: REST
//! reads and writes against `/rest/v1`, password auth against `/auth/v1`,
//! and websocket change streams for the live tables.

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::orbit::events::EventDraft;
use crate::orbit::state::GeoPoint;
use crate::orbit::users::User;
use crate::remote::auth::SessionEvent;
use crate::remote::geometry::wkt_point;
use crate::remote::rows::{EventRow, EventWrite, UserRow, UserWrite};

pub mod auth;
pub(crate) mod geometry;
pub(crate) mod rows;
pub mod subscriptions;

#[derive(thiserror::Error, Debug)]
pub enum RemoteManagerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Websocket error: {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Insert returned no rows")]
    EmptyInsert,
}

pub type Result<T> = std::result::Result<T, RemoteManagerError>;

/// REST projection for user reads. The geometry column is split into
/// scalars server-side so reads never have to decode EWKB.
const USER_COLUMNS: &str = "id,email,name,username,bio,avatar_url,status,city,\
                            location_updated_at,lat:st_y(location),lng:st_x(location)";

const EVENT_COLUMNS: &str = "id,host_id,title,description,type,start_time,is_private,\
                             max_attendees,city,lat:st_y(location),lng:st_x(location)";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct RemoteConfig {
    pub url: String,
    pub anon_key: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RemoteConfig {
    pub fn new(url: String, anon_key: String) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Reads `ORBIT_REMOTE_URL` and `ORBIT_REMOTE_ANON_KEY` from the
    /// environment, loading a `.env` file first if one exists.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let url = std::env::var("ORBIT_REMOTE_URL").map_err(|_| {
            RemoteManagerError::Configuration("ORBIT_REMOTE_URL is not set".to_string())
        })?;
        let anon_key = std::env::var("ORBIT_REMOTE_ANON_KEY").map_err(|_| {
            RemoteManagerError::Configuration("ORBIT_REMOTE_ANON_KEY is not set".to_string())
        })?;
        Ok(Self::new(url, anon_key))
    }
}

#[derive(Clone, Debug)]
pub struct RemoteManager {
    client: reqwest::Client,
    config: RemoteConfig,
    pub(crate) session_sender: Sender<SessionEvent>,
}

impl RemoteManager {
    /// Returns the manager and the receiving end of its session stream.
    pub fn new(config: RemoteConfig) -> Result<(Self, Receiver<SessionEvent>)> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        let (session_sender, session_receiver) = tokio::sync::mpsc::channel(100);
        Ok((
            Self {
                client,
                config,
                session_sender,
            },
            session_receiver,
        ))
    }

    pub(crate) fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url, table)
    }

    pub(crate) fn auth_url(&self, endpoint: &str) -> String {
        format!("{}/auth/v1/{}", self.config.url, endpoint)
    }

    pub(crate) fn websocket_url(&self) -> String {
        let ws_base = self
            .config
            .url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            ws_base, self.config.anon_key
        )
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&self.config.anon_key)
    }

    /// All users currently sharing their presence.
    pub(crate) async fn fetch_users(&self) -> Result<Vec<UserRow>> {
        let response = self
            .request(reqwest::Method::GET, self.rest_url("users"))
            .query(&[("select", USER_COLUMNS), ("status", "neq.offline")])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    pub(crate) async fn fetch_user_by_id(&self, user_id: &str) -> Result<Option<UserRow>> {
        let filter = format!("eq.{user_id}");
        let response = self
            .request(reqwest::Method::GET, self.rest_url("users"))
            .query(&[("select", USER_COLUMNS), ("id", filter.as_str())])
            .send()
            .await?
            .error_for_status()?;
        let mut rows: Vec<UserRow> = response.json().await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    pub(crate) async fn fetch_events(&self) -> Result<Vec<EventRow>> {
        let response = self
            .request(reqwest::Method::GET, self.rest_url("events"))
            .query(&[("select", EVENT_COLUMNS)])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Creates or replaces the caller's profile row.
    pub async fn upsert_user(&self, user: &User) -> Result<()> {
        self.request(reqwest::Method::POST, self.rest_url("users"))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&UserWrite::from_user(user))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Writes only the geometry column and its timestamp.
    pub async fn update_user_location(&self, user_id: &str, point: &GeoPoint) -> Result<()> {
        self.request(reqwest::Method::PATCH, self.rest_url("users"))
            .query(&[("id", &format!("eq.{user_id}"))])
            .json(&json!({
                "location": wkt_point(point),
                "location_updated_at": Utc::now(),
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Inserts an event and returns the stored row, so the caller gets the
    /// server-assigned id.
    pub(crate) async fn insert_event(&self, draft: &EventDraft, host_id: &str) -> Result<EventRow> {
        let response = self
            .request(reqwest::Method::POST, self.rest_url("events"))
            .header("Prefer", "return=representation")
            .json(&EventWrite::from_draft(draft, host_id))
            .send()
            .await?
            .error_for_status()?;
        let mut rows: Vec<EventRow> = response.json().await?;
        if rows.is_empty() {
            return Err(RemoteManagerError::EmptyInsert);
        }
        Ok(rows.swap_remove(0))
    }

    /// Files a moderation report. The reporter may be anonymous.
    pub async fn report_user(
        &self,
        reporter_id: Option<&str>,
        reported_id: &str,
        reason: &str,
    ) -> Result<()> {
        self.request(reqwest::Method::POST, self.rest_url("moderation_reports"))
            .json(&json!({
                "reporter_id": reporter_id,
                "reported_id": reported_id,
                "reason": reason,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
