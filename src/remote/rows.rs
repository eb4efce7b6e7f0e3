//! Wire rows for the REST tables. Reads are lenient: everything beyond the
//! primary key is optional, and conversion into domain types fills sensible
//! fallbacks so one sparse row never sinks a whole fetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::orbit::events::{Event, EventDraft, EventKind};
use crate::orbit::session::placeholder_avatar;
use crate::orbit::state::{DEFAULT_LOCATION, GeoPoint};
use crate::orbit::users::{User, UserStatus};
use crate::remote::geometry::{decode_ewkb_point, wkt_point};

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct UserRow {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub username: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub status: Option<String>,
    pub city: Option<String>,
    /// Projected scalars, present on REST reads only.
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Raw geometry column, present on realtime frames only.
    pub location: Option<serde_json::Value>,
    pub location_updated_at: Option<DateTime<Utc>>,
}

impl UserRow {
    /// Coordinates from whichever representation the row carries:
    /// projected scalars first, then the raw EWKB column.
    pub fn coordinates(&self) -> Option<GeoPoint> {
        if let (Some(lat), Some(lng)) = (self.lat, self.lng) {
            return Some(GeoPoint { lat, lng });
        }
        let raw = self.location.as_ref()?.as_str()?;
        let decoded = decode_ewkb_point(raw);
        if decoded.is_none() {
            tracing::debug!(
                target: "orbit::remote::rows",
                "Undecodable location payload for user {}",
                self.id
            );
        }
        decoded
    }

    pub fn into_user(self, fallback: GeoPoint) -> User {
        let location = self.coordinates().unwrap_or(fallback);
        let username = self.username.unwrap_or_else(|| self.id.clone());
        User {
            avatar: self
                .avatar_url
                .unwrap_or_else(|| placeholder_avatar(&self.id)),
            email: self.email.unwrap_or_default(),
            name: self.name.unwrap_or_else(|| username.clone()),
            username,
            bio: self.bio.unwrap_or_default(),
            status: parse_enum(self.status.as_deref()).unwrap_or(UserStatus::Offline),
            city: self.city,
            location,
            last_active: self.location_updated_at.unwrap_or_else(Utc::now),
            interests: Vec::new(),
            relationship_tier: None,
            blocked_users: Vec::new(),
            is_verified: false,
            id: self.id,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct EventRow {
    pub id: String,
    pub host_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub start_time: Option<String>,
    pub is_private: Option<bool>,
    pub max_attendees: Option<u32>,
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub location: Option<serde_json::Value>,
}

impl EventRow {
    fn coordinates(&self) -> Option<GeoPoint> {
        if let (Some(lat), Some(lng)) = (self.lat, self.lng) {
            return Some(GeoPoint { lat, lng });
        }
        self.location
            .as_ref()
            .and_then(|v| v.as_str())
            .and_then(decode_ewkb_point)
    }

    /// Attendance lists start empty; they are client-side state merged in
    /// by the caller where known.
    pub fn into_event(self) -> Event {
        let location = self.coordinates().unwrap_or(DEFAULT_LOCATION);
        Event {
            host_id: self.host_id.unwrap_or_default(),
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            location,
            time: self.start_time.unwrap_or_else(|| "TBD".to_string()),
            kind: parse_enum(self.kind.as_deref()).unwrap_or(EventKind::Chill),
            is_private: self.is_private.unwrap_or(false),
            attendees: Vec::new(),
            pending_requests: Vec::new(),
            max_attendees: self.max_attendees,
            city: self.city,
            id: self.id,
        }
    }
}

/// Parses a bare string into any lowercase-tagged enum.
fn parse_enum<T: serde::de::DeserializeOwned>(s: Option<&str>) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(s?.to_string())).ok()
}

#[derive(Serialize, Debug)]
pub(crate) struct UserWrite<'a> {
    pub id: &'a str,
    pub email: &'a str,
    pub name: &'a str,
    pub username: &'a str,
    pub bio: &'a str,
    pub avatar_url: &'a str,
    pub status: UserStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<&'a str>,
    pub location: String,
}

impl<'a> UserWrite<'a> {
    pub fn from_user(user: &'a User) -> Self {
        Self {
            id: &user.id,
            email: &user.email,
            name: &user.name,
            username: &user.username,
            bio: &user.bio,
            avatar_url: &user.avatar,
            status: user.status,
            city: user.city.as_deref(),
            location: wkt_point(&user.location),
        }
    }
}

#[derive(Serialize, Debug)]
pub(crate) struct EventWrite<'a> {
    pub host_id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub start_time: &'a str,
    pub is_private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attendees: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<&'a str>,
    pub location: String,
}

impl<'a> EventWrite<'a> {
    pub fn from_draft(draft: &'a EventDraft, host_id: &'a str) -> Self {
        Self {
            host_id,
            title: &draft.title,
            description: &draft.description,
            kind: draft.kind,
            start_time: &draft.time,
            is_private: draft.is_private,
            max_attendees: draft.max_attendees,
            city: draft.city.as_deref(),
            location: wkt_point(&draft.location),
        }
    }
}
