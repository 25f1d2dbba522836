//! Top artists and top tracks pages
//!
//! These routes double as OAuth callbacks: when Spotify redirects back
//! with `code` and `state`, the exchange is completed before rendering.

use super::{auth_failure_message, back_to, before_deadline, fail, resolve_client, UPSTREAM_FAILED};
use crate::flash::FlashJar;
use crate::oauth::CallbackParams;
use crate::settings::Settings;
use crate::state::AppState;
use crate::template::PageData;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use tokio::time::Instant;

/// `GET /topartists`
pub async fn top_artists(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut flash: FlashJar,
    Query(callback): Query<CallbackParams>,
) -> Response {
    let deadline = Instant::now() + state.upstream_deadline;
    let (settings, cookies) = Settings::resolve(&headers, state.cookie_policy, state.cookie_max_age);
    let back = back_to(&headers, "/topartists");

    let client = match resolve_client(&state, &headers, &callback).await {
        Ok(client) => client,
        Err(err) => {
            tracing::info!(error = %err, "No usable login for top artists");
            return fail(flash, cookies, auth_failure_message(&err), &back);
        }
    };

    let fetched = before_deadline(deadline, async {
        tokio::try_join!(
            client.current_user(),
            client.top_artists(settings.result_limit, settings.time_range),
        )
    })
    .await;
    let (user, artists) = match fetched {
        Ok(fetched) => fetched,
        Err(err) => {
            tracing::error!(error = %err, "Could not get top artists");
            return fail(flash, cookies, UPSTREAM_FAILED, &back);
        }
    };

    tracing::debug!(user = %user.id, count = artists.len(), "Fetched top artists");

    let page = PageData {
        logged_in: true,
        user: Some(user),
        artists,
        ..PageData::new(settings, flash.drain_all())
    };
    let body = state.templates.render("topartists", &page);
    (flash, cookies, body).into_response()
}

/// `GET /toptracks`
pub async fn top_tracks(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut flash: FlashJar,
    Query(callback): Query<CallbackParams>,
) -> Response {
    let deadline = Instant::now() + state.upstream_deadline;
    let (settings, cookies) = Settings::resolve(&headers, state.cookie_policy, state.cookie_max_age);
    let back = back_to(&headers, "/toptracks");

    let client = match resolve_client(&state, &headers, &callback).await {
        Ok(client) => client,
        Err(err) => {
            tracing::info!(error = %err, "No usable login for top tracks");
            return fail(flash, cookies, auth_failure_message(&err), &back);
        }
    };

    let fetched = before_deadline(deadline, async {
        tokio::try_join!(
            client.current_user(),
            client.top_tracks(settings.result_limit, settings.time_range),
        )
    })
    .await;
    let (user, tracks) = match fetched {
        Ok(fetched) => fetched,
        Err(err) => {
            tracing::error!(error = %err, "Could not get top tracks");
            return fail(flash, cookies, UPSTREAM_FAILED, &back);
        }
    };

    tracing::debug!(user = %user.id, count = tracks.len(), "Fetched top tracks");

    let page = PageData {
        logged_in: true,
        user: Some(user),
        tracks,
        ..PageData::new(settings, flash.drain_all())
    };
    let body = state.templates.render("toptracks", &page);
    (flash, cookies, body).into_response()
}
