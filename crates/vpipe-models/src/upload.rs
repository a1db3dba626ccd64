//! Upload grants.
//!
//! A `VideoUploadUrl` authorises one future upload under a public video
//! id. Uploads that started just before the expiry date should still be
//! detected, which is why checks continue during a grace period.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;
use crate::playlist::PlaylistId;
use crate::video::VideoId;

/// HTTP method the client must use on the upload url.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadMethod {
    Get,
    Post,
    Put,
}

impl UploadMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadMethod::Get => "GET",
            UploadMethod::Post => "POST",
            UploadMethod::Put => "PUT",
        }
    }
}

impl fmt::Display for UploadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UploadMethod {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(UploadMethod::Get),
            "POST" => Ok(UploadMethod::Post),
            "PUT" => Ok(UploadMethod::Put),
            _ => Err(ModelError::UnknownUploadMethod(s.to_string())),
        }
    }
}

/// Upload url issued by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UploadGrant {
    /// Public video id reserved for the upload
    pub id: VideoId,
    /// Url on which the video file can be sent
    pub url: String,
    /// HTTP method to use
    pub method: UploadMethod,
    /// Expiry of the url
    pub expires_at: DateTime<Utc>,
}

/// Persisted upload grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoUploadUrl {
    /// Public id of the video that will be created from the upload
    pub public_video_id: VideoId,
    /// Original filename, used as the video title
    pub filename: String,
    /// Expiry of the url
    pub expires_at: DateTime<Utc>,
    /// Whether an upload was detected. Never reset once true.
    #[serde(default)]
    pub was_used: bool,
    /// Last time the backend was asked about this upload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    /// Owner (user ID)
    pub owner_id: String,
    /// Playlist to which the video will be added after upload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_id: Option<PlaylistId>,
    /// Access-Control-Allow-Origin value for upload responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl VideoUploadUrl {
    /// Create a record for a freshly issued grant.
    pub fn from_grant(
        grant: &UploadGrant,
        filename: impl Into<String>,
        owner_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            public_video_id: grant.id.clone(),
            filename: filename.into(),
            expires_at: grant.expires_at,
            was_used: false,
            last_checked: None,
            owner_id: owner_id.into(),
            playlist_id: None,
            origin: None,
            created_at: now,
        }
    }

    /// Set the target playlist.
    pub fn with_playlist(mut self, playlist_id: Option<PlaylistId>) -> Self {
        self.playlist_id = playlist_id;
        self
    }

    /// Set the CORS origin.
    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Unused and not expired: the url may still receive an upload.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        !self.was_used && !self.is_expired(now)
    }

    /// Record a backend check. `last_checked` never moves backwards.
    pub fn record_check(&mut self, now: DateTime<Utc>) {
        self.last_checked = Some(match self.last_checked {
            Some(previous) => previous.max(now),
            None => now,
        });
    }

    /// Record a detected upload.
    pub fn mark_used(&mut self, now: DateTime<Utc>) {
        self.was_used = true;
        self.record_check(now);
    }
}

/// Policy selecting the upload urls the periodic sweep should check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadCheckPolicy {
    /// How long after expiry a url is still checked
    pub grace_period: Duration,
    /// Minimum delay between two checks of the same url
    pub min_check_interval: Duration,
}

impl Default for UploadCheckPolicy {
    fn default() -> Self {
        Self {
            grace_period: Duration::hours(1),
            min_check_interval: Duration::seconds(10),
        }
    }
}

impl UploadCheckPolicy {
    /// Whether the url is due for a check at `now`.
    pub fn should_check(&self, url: &VideoUploadUrl, now: DateTime<Utc>) -> bool {
        if url.was_used || url.expires_at <= now - self.grace_period {
            return false;
        }
        match url.last_checked {
            Some(checked) => checked < now - self.min_check_interval,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(expires_in: Duration) -> UploadGrant {
        UploadGrant {
            id: VideoId::from("abc123"),
            url: "https://uploads.example.com/abc123".to_string(),
            method: UploadMethod::Put,
            expires_at: Utc::now() + expires_in,
        }
    }

    #[test]
    fn test_upload_method_parsing() {
        assert_eq!("put".parse::<UploadMethod>().unwrap(), UploadMethod::Put);
        assert_eq!("POST".parse::<UploadMethod>().unwrap(), UploadMethod::Post);
        assert!("PATCH".parse::<UploadMethod>().is_err());
    }

    #[test]
    fn test_availability() {
        let now = Utc::now();
        let mut url = VideoUploadUrl::from_grant(&grant(Duration::minutes(5)), "a.mp4", "u1", now);
        assert!(url.is_available(now));
        assert!(!url.is_available(now + Duration::minutes(6)));

        url.mark_used(now);
        assert!(!url.is_available(now));
        assert_eq!(url.last_checked, Some(now));
    }

    #[test]
    fn test_record_check_never_goes_backwards() {
        let now = Utc::now();
        let mut url = VideoUploadUrl::from_grant(&grant(Duration::minutes(5)), "a.mp4", "u1", now);
        url.record_check(now);
        url.record_check(now - Duration::seconds(30));
        assert_eq!(url.last_checked, Some(now));
    }

    #[test]
    fn test_should_check_policy() {
        let policy = UploadCheckPolicy::default();
        let now = Utc::now();
        let mut url = VideoUploadUrl::from_grant(&grant(Duration::minutes(5)), "a.mp4", "u1", now);

        assert!(policy.should_check(&url, now));

        url.record_check(now);
        assert!(!policy.should_check(&url, now + Duration::seconds(5)));
        assert!(policy.should_check(&url, now + Duration::seconds(11)));

        // Expired but within the grace period
        assert!(policy.should_check(&url, now + Duration::minutes(30)));
        // Past the grace period
        assert!(!policy.should_check(&url, now + Duration::hours(2)));

        url.mark_used(now);
        assert!(!policy.should_check(&url, now + Duration::minutes(1)));
    }
}
