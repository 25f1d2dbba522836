//! HTTP handlers
//!
//! Every handler ends in one of two ways: a rendered page, or a flash
//! message plus a redirect back to where the user came from.

use crate::cookies::{read_cookie, Cookies};
use crate::error::{AuthError, UpstreamError};
use crate::flash::{FlashJar, FlashMessage};
use crate::oauth::{CallbackParams, StateToken, STATE_COOKIE_NAME};
use crate::spotify::ClientHandle;
use crate::state::AppState;
use axum::http::{header::REFERER, HeaderMap};
use axum::response::{IntoResponse, Redirect, Response};
use std::future::Future;
use tokio::time::Instant;

pub mod auth;
pub mod pages;
pub mod playlist;
pub mod top;

/// Shown when a page needs a login the browser does not have
pub const LOGIN_REQUIRED: &str = "You have to log in first";

/// Shown when the Spotify API or accounts service failed
pub const UPSTREAM_FAILED: &str = "Could not communicate with Spotify - Try clearing cache and trying again";

/// Local path to send the browser back to.
///
/// Uses the path and query of the `Referer` header, never another origin,
/// and never `current_path` itself. Falls back to `/`.
#[must_use]
pub fn back_to(headers: &HeaderMap, current_path: &str) -> String {
    let target = headers
        .get(REFERER)
        .and_then(|value| value.to_str().ok())
        .and_then(|referer| {
            if referer.starts_with('/') && !referer.starts_with("//") {
                return Some(referer.to_string());
            }
            let url = reqwest::Url::parse(referer).ok()?;
            let mut path = url.path().to_string();
            if let Some(query) = url.query() {
                path.push('?');
                path.push_str(query);
            }
            Some(path)
        });

    match target {
        Some(path) if path.split('?').next() != Some(current_path) => path,
        _ => "/".to_string(),
    }
}

/// Flash `message` as danger and redirect to `target`.
pub fn fail(flash: FlashJar, cookies: Cookies, message: &str, target: &str) -> Response {
    (flash.with(FlashMessage::danger(message)), cookies, Redirect::to(target)).into_response()
}

/// Run upstream `work`, giving up once `deadline` has passed.
///
/// # Errors
///
/// Whatever `work` returns, or [`UpstreamError::DeadlineExceeded`].
pub async fn before_deadline<T>(
    deadline: Instant,
    work: impl Future<Output = Result<T, UpstreamError>>,
) -> Result<T, UpstreamError> {
    tokio::time::timeout_at(deadline, work)
        .await
        .unwrap_or(Err(UpstreamError::DeadlineExceeded))
}

/// User-facing text for a failed login lookup.
#[must_use]
pub const fn auth_failure_message(err: &AuthError) -> &'static str {
    match err {
        AuthError::ExchangeFailed(_) | AuthError::InvalidRedirect(_) => UPSTREAM_FAILED,
        AuthError::NoAuthenticator | AuthError::UnknownState | AuthError::StateMismatch => LOGIN_REQUIRED,
    }
}

/// The `state` cookie, if present
#[must_use]
pub fn state_token(headers: &HeaderMap) -> Option<StateToken> {
    read_cookie(headers, STATE_COOKIE_NAME)
        .filter(|value| !value.is_empty())
        .map(StateToken::from_cookie)
}

/// API client for this browser.
///
/// Completes the OAuth exchange when the request is the provider's
/// callback, otherwise looks up an existing login.
///
/// # Errors
///
/// [`AuthError::UnknownState`] without a usable `state` cookie, or
/// whatever the login completion returns.
pub async fn resolve_client(
    state: &AppState,
    headers: &HeaderMap,
    callback: &CallbackParams,
) -> Result<ClientHandle, AuthError> {
    let token = state_token(headers).ok_or(AuthError::UnknownState)?;

    if callback.is_callback() || callback.state.is_some() {
        return state.oauth.complete_login(&token, callback).await;
    }

    state.oauth.client(&token).ok_or(AuthError::UnknownState)
}
