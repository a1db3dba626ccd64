//! Video models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::{random_id, LONG_ID_LEN, PUBLIC_ID_LEN};

/// Public identifier of a video.
///
/// The same id is shared by the upload grant that authorised the upload
/// and by the video record created once the upload is detected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(random_id(PUBLIC_ID_LEN))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A video record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Video {
    /// Public video id (immutable)
    pub public_id: VideoId,

    /// Video title (the original filename for uploaded videos)
    pub title: String,

    /// Location of the source file on the storage, when the video was not
    /// uploaded through an upload url.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,

    /// Owner (user ID)
    pub owner_id: String,

    /// Public thumbnail id
    pub thumbnail_id: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Data required to create a video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVideo {
    pub public_id: VideoId,
    pub title: String,
    pub storage_path: Option<String>,
    pub owner_id: String,
}

impl NewVideo {
    pub fn new(public_id: VideoId, owner_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            public_id,
            title: title.into(),
            storage_path: None,
            owner_id: owner_id.into(),
        }
    }

    /// Set the source storage path.
    pub fn with_storage_path(mut self, path: impl Into<String>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Materialise the record, generating the thumbnail id.
    pub fn into_video(self, now: DateTime<Utc>) -> Video {
        Video {
            public_id: self.public_id,
            title: self.title,
            storage_path: self.storage_path,
            owner_id: self.owner_id,
            thumbnail_id: random_id(LONG_ID_LEN),
            created_at: now,
        }
    }
}
