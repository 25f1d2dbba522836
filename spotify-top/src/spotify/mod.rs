//! Spotify Web API capability
//!
//! Handlers only ever see [`ClientHandle`], an `Arc<dyn SpotifyApi>` bound
//! to one user's access token. The real implementation lives in
//! [`http`]; tests substitute their own.

use crate::error::UpstreamError;
use crate::settings::TimeRange;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

pub mod http;

pub use http::{SpotifyHttpClient, DEFAULT_API_BASE_URL};

/// Largest page the top-items endpoints accept
pub const MAX_PAGE_SIZE: u32 = 50;

/// Authenticated handle to the Spotify API for one user.
pub type ClientHandle = Arc<dyn SpotifyApi>;

/// The slice of the Spotify Web API this application uses.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpotifyApi: Send + Sync {
    /// `GET /me`
    async fn current_user(&self) -> Result<User, UpstreamError>;

    /// `GET /me/top/artists`
    async fn top_artists(&self, limit: u32, time_range: TimeRange) -> Result<Vec<Artist>, UpstreamError>;

    /// `GET /me/top/tracks`
    async fn top_tracks(&self, limit: u32, time_range: TimeRange) -> Result<Vec<Track>, UpstreamError>;

    /// `POST /users/{user_id}/playlists`, always private and not collaborative
    async fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
    ) -> Result<Playlist, UpstreamError>;

    /// `POST /playlists/{playlist_id}/tracks`
    async fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<(), UpstreamError>;
}

/// The logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Spotify user ID
    pub id: String,
    /// Display name, falls back to the ID when the profile has none
    pub display_name: String,
}

/// One of the user's top artists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artist {
    /// Spotify artist ID
    pub id: String,
    /// Artist name
    pub name: String,
    /// Genres as reported by Spotify
    pub genres: Vec<String>,
    /// Largest artist image, if any
    pub image_url: Option<String>,
    /// Link to the artist on open.spotify.com
    pub url: Option<String>,
    /// Popularity score 0-100
    pub popularity: u32,
}

impl Artist {
    /// Genres joined for display
    #[must_use]
    pub fn genre_list(&self) -> String {
        self.genres.join(", ")
    }
}

/// One of the user's top tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    /// Spotify track ID
    pub id: String,
    /// Track name
    pub name: String,
    /// `spotify:track:<id>` URI
    pub uri: String,
    /// Names of the performing artists
    pub artists: Vec<String>,
    /// Album name
    pub album: String,
    /// Album cover, if any
    pub image_url: Option<String>,
    /// Link to the track on open.spotify.com
    pub url: Option<String>,
}

impl Track {
    /// Artist names joined for display
    #[must_use]
    pub fn artist_list(&self) -> String {
        self.artists.join(", ")
    }
}

/// A playlist created on the user's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Playlist {
    /// Spotify playlist ID
    pub id: String,
    /// Link to the playlist on open.spotify.com
    pub url: Option<String>,
}

/// IDs of `tracks` in order.
#[must_use]
pub fn track_ids(tracks: &[Track]) -> Vec<String> {
    tracks.iter().map(|track| track.id.clone()).collect()
}
