//! Playlist models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::{random_id, PUBLIC_ID_LEN};

/// Public identifier of a playlist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PlaylistId(pub String);

impl PlaylistId {
    pub fn new() -> Self {
        Self(random_id(PUBLIC_ID_LEN))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PlaylistId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PlaylistId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Named, owner-scoped collection of videos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Playlist {
    pub public_id: PlaylistId,
    pub name: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

impl Playlist {
    pub fn new(name: impl Into<String>, owner_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            public_id: PlaylistId::new(),
            name: name.into(),
            owner_id: owner_id.into(),
            created_at: now,
        }
    }

    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }
}
