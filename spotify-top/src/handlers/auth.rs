//! Login entry points
//!
//! `/topartistsauth` and `/toptracksauth` start the OAuth handshake and
//! send the browser to Spotify, which redirects back to `/topartists` or
//! `/toptracks` respectively.

use super::{back_to, fail, UPSTREAM_FAILED};
use crate::cookies::{Cookies, SetCookie};
use crate::flash::FlashJar;
use crate::oauth::STATE_COOKIE_NAME;
use crate::state::AppState;
use axum::{
    extract::State,
    http::{header::LOCATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

/// `GET /topartistsauth`
pub async fn top_artists_auth(State(state): State<AppState>, headers: HeaderMap, flash: FlashJar) -> Response {
    begin(&state, &headers, flash, "/topartistsauth", "/topartists").await
}

/// `GET /toptracksauth`
pub async fn top_tracks_auth(State(state): State<AppState>, headers: HeaderMap, flash: FlashJar) -> Response {
    begin(&state, &headers, flash, "/toptracksauth", "/toptracks").await
}

async fn begin(state: &AppState, headers: &HeaderMap, flash: FlashJar, current_path: &str, callback_path: &str) -> Response {
    match state.oauth.begin_login(callback_path).await {
        Ok((token, authorize_url)) => {
            let cookie = SetCookie::new(STATE_COOKIE_NAME, token.as_str(), state.cookie_policy)
                .with_max_age(state.cookie_max_age)
                .http_only();
            (
                StatusCode::FOUND,
                Cookies::new().with(cookie),
                [(LOCATION, authorize_url)],
            )
                .into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, callback = callback_path, "Could not start login");
            fail(flash, Cookies::new(), UPSTREAM_FAILED, &back_to(headers, current_path))
        }
    }
}
