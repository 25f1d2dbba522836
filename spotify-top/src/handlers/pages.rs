//! Front page, settings form and the 404 fallback

use super::{back_to, state_token};
use crate::cookies::Cookies;
use crate::flash::FlashJar;
use crate::settings::Settings;
use crate::state::AppState;
use crate::template::{PageData, NOT_FOUND_TEMPLATE};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;

/// Raw fields of the settings form.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsForm {
    /// Time range wire name
    pub timecheck: Option<String>,
    /// Number of results
    pub limit: Option<String>,
}

/// `GET /`
pub async fn frontpage(State(state): State<AppState>, headers: HeaderMap, mut flash: FlashJar) -> Response {
    let (settings, cookies) = Settings::resolve(&headers, state.cookie_policy, state.cookie_max_age);
    let logged_in = state_token(&headers).is_some_and(|token| state.oauth.client(&token).is_some());

    let page = PageData {
        logged_in,
        ..PageData::new(settings, flash.drain_all())
    };
    let body = state.templates.render("frontpage", &page);

    (flash, cookies, body).into_response()
}

/// `POST /form`
pub async fn update_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut flash: FlashJar,
    Form(form): Form<SettingsForm>,
) -> Response {
    let (settings, warnings) = Settings::from_form(form.timecheck.as_deref(), form.limit.as_deref());
    for warning in warnings {
        flash.push_message(warning);
    }

    tracing::debug!(
        time_range = %settings.time_range,
        result_limit = settings.result_limit,
        "Updated settings"
    );

    let cookies = Cookies::new().with(settings.to_cookie(state.cookie_policy, state.cookie_max_age));
    (flash, cookies, Redirect::to(&back_to(&headers, "/form"))).into_response()
}

/// Fallback for unknown routes
pub async fn not_found(State(state): State<AppState>, headers: HeaderMap, mut flash: FlashJar) -> Response {
    let (settings, cookies) = Settings::resolve(&headers, state.cookie_policy, state.cookie_max_age);
    let page = PageData::new(settings, flash.drain_all());

    let mut body = state.templates.render(NOT_FOUND_TEMPLATE, &page);
    if body.status() == StatusCode::OK {
        *body.status_mut() = StatusCode::NOT_FOUND;
    }
    (flash, cookies, body).into_response()
}
