//! Identifier helpers.

use uuid::Uuid;

/// Length of public ids for videos, subtitles and playlists.
pub const PUBLIC_ID_LEN: usize = 12;

/// Length of public thumbnail ids. These are longer so thumbnail urls
/// cannot be guessed from the video id.
pub const LONG_ID_LEN: usize = 20;

/// Generate a random lowercase hex identifier of the given length.
pub fn random_id(len: usize) -> String {
    let mut id = String::with_capacity(len + 32);
    while id.len() < len {
        id.push_str(&Uuid::new_v4().simple().to_string());
    }
    id.truncate(len);
    id
}
