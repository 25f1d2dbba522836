//! Playlist creation

use super::{auth_failure_message, back_to, before_deadline, fail, resolve_client, UPSTREAM_FAILED};
use crate::error::UpstreamError;
use crate::flash::{FlashJar, FlashMessage};
use crate::oauth::CallbackParams;
use crate::settings::Settings;
use crate::spotify::{track_ids, ClientHandle, Playlist, MAX_PAGE_SIZE};
use crate::state::AppState;
use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use chrono::{Local, NaiveDate};
use tokio::time::Instant;

/// Flash shown after a playlist was created
pub const PLAYLIST_CREATED: &str = "Succesfully created playlist";

/// Name and description of the playlist for `display_name` on `date`.
///
/// The count is the number of tracks Spotify returns at most, which may be
/// lower than the stored setting.
#[must_use]
pub fn playlist_details(display_name: &str, settings: Settings, date: NaiveDate) -> (String, String) {
    let count = settings.result_limit.min(MAX_PAGE_SIZE);
    let name = format!("{display_name} Top {count} tracks");
    let description = format!(
        "{name} - {} | Created {}",
        settings.time_range.label(),
        date.format("%Y %B %-d")
    );
    (name, description)
}

async fn create_from_top_tracks(client: &ClientHandle, settings: Settings) -> Result<Playlist, UpstreamError> {
    let user = client.current_user().await?;
    let (name, description) = playlist_details(&user.display_name, settings, Local::now().date_naive());

    let playlist = client.create_playlist(&user.id, &name, &description).await?;
    let tracks = client.top_tracks(settings.result_limit, settings.time_range).await?;
    client.add_tracks(&playlist.id, &track_ids(&tracks)).await?;

    tracing::info!(
        user = %user.id,
        playlist = %playlist.id,
        tracks = tracks.len(),
        "Created playlist"
    );
    Ok(playlist)
}

/// `POST /createplaylist`
pub async fn create_playlist(State(state): State<AppState>, headers: HeaderMap, flash: FlashJar) -> Response {
    let deadline = Instant::now() + state.upstream_deadline;
    let (settings, cookies) = Settings::resolve(&headers, state.cookie_policy, state.cookie_max_age);
    let back = back_to(&headers, "/createplaylist");

    let client = match resolve_client(&state, &headers, &CallbackParams::default()).await {
        Ok(client) => client,
        Err(err) => return fail(flash, cookies, auth_failure_message(&err), &back),
    };

    match before_deadline(deadline, create_from_top_tracks(&client, settings)).await {
        Ok(_) => (flash.with(FlashMessage::success(PLAYLIST_CREATED)), cookies, Redirect::to(&back)).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Could not create playlist");
            fail(flash, cookies, UPSTREAM_FAILED, &back)
        }
    }
}
