use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::orbit::Orbit;
use crate::orbit::state::AppState;
use crate::orbit::utils::time_based_id;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoryKind {
    Image,
    Text,
}

/// Ephemeral broadcast. Stories age out of view 24 hours after posting;
/// expiry is computed when reading, nothing is ever deleted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Story {
    pub id: String,
    pub user_id: String,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub kind: StoryKind,
    pub timestamp: DateTime<Utc>,
    /// Background color for text stories.
    pub color: Option<String>,
}

pub const STORY_TTL_HOURS: i64 = 24;

impl Story {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now - self.timestamp < Duration::hours(STORY_TTL_HOURS)
    }
}

/// Caller-supplied fields for a new story.
#[derive(Clone, Debug)]
pub struct StoryDraft {
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub kind: StoryKind,
    pub color: Option<String>,
}

impl AppState {
    /// Prepends a story owned by the current user, stamped now. No-op
    /// without a current user.
    pub fn add_story(&mut self, draft: StoryDraft) {
        let Some(current) = self.current_user.as_ref() else {
            return;
        };
        let story = Story {
            id: time_based_id(),
            user_id: current.id.clone(),
            text: draft.text,
            image_url: draft.image_url,
            kind: draft.kind,
            timestamp: Utc::now(),
            color: draft.color,
        };
        self.stories.insert(0, story);
    }

    /// Stories still inside their 24h window, newest first (insertion
    /// order already is newest-first).
    pub fn active_stories(&self, now: DateTime<Utc>) -> Vec<&Story> {
        self.stories.iter().filter(|s| s.is_active(now)).collect()
    }
}

impl Orbit {
    pub fn add_story(&self, draft: StoryDraft) {
        self.write_state().add_story(draft);
    }

    pub fn active_stories(&self) -> Vec<Story> {
        self.read_state()
            .active_stories(Utc::now())
            .into_iter()
            .cloned()
            .collect()
    }
}
