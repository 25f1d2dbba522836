//! `reqwest` implementation of [`SpotifyApi`].

use super::{Artist, Playlist, SpotifyApi, Track, User, MAX_PAGE_SIZE};
use crate::error::UpstreamError;
use crate::settings::TimeRange;
use async_trait::async_trait;
use serde::{
    de::{DeserializeOwned, IgnoredAny},
    Deserialize,
};
use serde_json::json;
use std::fmt;

/// Production API root
pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";

/// Spotify API client bound to one access token.
#[derive(Clone)]
pub struct SpotifyHttpClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl SpotifyHttpClient {
    /// Create a client. `http` carries the timeout policy and is shared
    /// between users.
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, UpstreamError> {
        let response = request.bearer_auth(&self.access_token).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            return Err(UpstreamError::Status { status, message });
        }

        response
            .json::<T>()
            .await
            .map_err(|err| UpstreamError::Decode(err.to_string()))
    }

    fn top_query(limit: u32, time_range: TimeRange) -> [(&'static str, String); 2] {
        [
            ("limit", limit.clamp(1, MAX_PAGE_SIZE).to_string()),
            ("time_range", time_range.as_str().to_string()),
        ]
    }
}

impl fmt::Debug for SpotifyHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyHttpClient")
            .field("base_url", &self.base_url)
            .field("access_token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SpotifyApi for SpotifyHttpClient {
    async fn current_user(&self) -> Result<User, UpstreamError> {
        let me: UserObject = self.send(self.http.get(self.url("/me"))).await?;
        Ok(me.into())
    }

    async fn top_artists(&self, limit: u32, time_range: TimeRange) -> Result<Vec<Artist>, UpstreamError> {
        let request = self
            .http
            .get(self.url("/me/top/artists"))
            .query(&Self::top_query(limit, time_range));
        let page: Paging<ArtistObject> = self.send(request).await?;
        Ok(page.items.into_iter().map(Into::into).collect())
    }

    async fn top_tracks(&self, limit: u32, time_range: TimeRange) -> Result<Vec<Track>, UpstreamError> {
        let request = self
            .http
            .get(self.url("/me/top/tracks"))
            .query(&Self::top_query(limit, time_range));
        let page: Paging<TrackObject> = self.send(request).await?;
        Ok(page.items.into_iter().map(Into::into).collect())
    }

    async fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
    ) -> Result<Playlist, UpstreamError> {
        let request = self
            .http
            .post(self.url(&format!("/users/{user_id}/playlists")))
            .json(&json!({
                "name": name,
                "description": description,
                "public": false,
                "collaborative": false,
            }));
        let playlist: PlaylistObject = self.send(request).await?;
        Ok(Playlist {
            id: playlist.id,
            url: playlist.external_urls.and_then(|urls| urls.spotify),
        })
    }

    async fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<(), UpstreamError> {
        if track_ids.is_empty() {
            return Ok(());
        }

        let uris: Vec<String> = track_ids
            .iter()
            .map(|id| format!("spotify:track:{id}"))
            .collect();
        let request = self
            .http
            .post(self.url(&format!("/playlists/{playlist_id}/tracks")))
            .json(&json!({ "uris": uris }));
        let _: IgnoredAny = self.send(request).await?;
        Ok(())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ImageObject {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserObject {
    id: String,
    display_name: Option<String>,
}

impl From<UserObject> for User {
    fn from(user: UserObject) -> Self {
        let display_name = user
            .display_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| user.id.clone());
        Self {
            id: user.id,
            display_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    id: String,
    name: String,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    images: Vec<ImageObject>,
    external_urls: Option<ExternalUrls>,
    #[serde(default)]
    popularity: u32,
}

impl From<ArtistObject> for Artist {
    fn from(artist: ArtistObject) -> Self {
        Self {
            id: artist.id,
            name: artist.name,
            genres: artist.genres,
            image_url: artist.images.into_iter().next().map(|image| image.url),
            url: artist.external_urls.and_then(|urls| urls.spotify),
            popularity: artist.popularity,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SimpleArtistObject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumObject {
    name: String,
    #[serde(default)]
    images: Vec<ImageObject>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    id: String,
    name: String,
    uri: String,
    #[serde(default)]
    artists: Vec<SimpleArtistObject>,
    album: AlbumObject,
    external_urls: Option<ExternalUrls>,
}

impl From<TrackObject> for Track {
    fn from(track: TrackObject) -> Self {
        Self {
            id: track.id,
            name: track.name,
            uri: track.uri,
            artists: track.artists.into_iter().map(|artist| artist.name).collect(),
            album: track.album.name,
            image_url: track.album.images.into_iter().next().map(|image| image.url),
            url: track.external_urls.and_then(|urls| urls.spotify),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlaylistObject {
    id: String,
    external_urls: Option<ExternalUrls>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> SpotifyHttpClient {
        SpotifyHttpClient::new(reqwest::Client::new(), server.uri(), "token-123")
    }

    #[tokio::test]
    async fn test_current_user_falls_back_to_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("authorization", "Bearer token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "wizzler",
                "display_name": null
            })))
            .mount(&server)
            .await;

        let user = client(&server).current_user().await.unwrap();
        assert_eq!(user.id, "wizzler");
        assert_eq!(user.display_name, "wizzler");
    }

    #[tokio::test]
    async fn test_top_tracks_sends_range_and_clamped_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/top/tracks"))
            .and(query_param("limit", "50"))
            .and(query_param("time_range", "long_term"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "t1",
                    "name": "Song",
                    "uri": "spotify:track:t1",
                    "artists": [{"name": "A"}, {"name": "B"}],
                    "album": {"name": "Album", "images": [{"url": "https://img/1"}]},
                    "external_urls": {"spotify": "https://open.spotify.com/track/t1"}
                }]
            })))
            .mount(&server)
            .await;

        let tracks = client(&server).top_tracks(500, TimeRange::Long).await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].artist_list(), "A, B");
        assert_eq!(tracks[0].image_url.as_deref(), Some("https://img/1"));
    }

    #[tokio::test]
    async fn test_error_status_carries_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/top/artists"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"status": 401, "message": "The access token expired"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .top_artists(10, TimeRange::Short)
            .await
            .unwrap_err();
        match err {
            UpstreamError::Status { status, message } => {
                assert_eq!(status.as_u16(), 401);
                assert_eq!(message, "The access token expired");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_add_tracks_sends_uris() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/playlists/p1/tracks"))
            .and(body_json(json!({"uris": ["spotify:track:a", "spotify:track:b"]})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"snapshot_id": "s1"})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .add_tracks("p1", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client(&server).current_user().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Decode(_)));
    }
}
