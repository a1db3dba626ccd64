//! Subtitle models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::{Validate, ValidationError};

use crate::utils::{random_id, PUBLIC_ID_LEN};
use crate::video::VideoId;

/// Public identifier of a subtitle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SubtitleId(pub String);

impl SubtitleId {
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

impl Default for SubtitleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubtitleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subtitle attached to a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Subtitle {
    pub public_id: SubtitleId,
    pub video_id: VideoId,
    /// Language code, e.g. "fr" or "pt-br"
    pub language: String,
    pub created_at: DateTime<Utc>,
}

/// Request to attach a subtitle to a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NewSubtitle {
    #[validate(length(min = 2, max = 7), custom(function = "validate_language_code"))]
    pub language: String,
}

impl NewSubtitle {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    /// Materialise the subtitle record with a fresh public id.
    pub fn into_subtitle(self, video_id: VideoId, now: DateTime<Utc>) -> Subtitle {
        Subtitle {
            public_id: SubtitleId::new(),
            video_id,
            language: self.language,
            created_at: now,
        }
    }
}

fn validate_language_code(language: &str) -> Result<(), ValidationError> {
    let valid = language
        .chars()
        .all(|c| c.is_ascii_alphabetic() || c == '-')
        && !language.starts_with('-')
        && !language.ends_with('-');
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("language_code"))
    }
}
