//! Router assembly

use crate::handlers::{auth, pages, playlist, top};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::path::Path;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer};

/// Build the application router.
///
/// `assets_dir` is served under `/css`. Requests taking longer than
/// `request_timeout` are cancelled with a bare 408; keep it above
/// [`AppState::upstream_deadline`] so handlers answer with a flash first.
pub fn router(state: AppState, assets_dir: &Path, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(pages::frontpage))
        .route("/form", post(pages::update_settings))
        .route("/topartistsauth", get(auth::top_artists_auth))
        .route("/toptracksauth", get(auth::top_tracks_auth))
        .route("/topartists", get(top::top_artists))
        .route("/toptracks", get(top::top_tracks))
        .route("/createplaylist", post(playlist::create_playlist))
        .nest_service("/css", ServeDir::new(assets_dir))
        .fallback(pages::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}
