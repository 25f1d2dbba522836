//! Shared application state

use crate::cookies::CookiePolicy;
use crate::flash::FlashKey;
use crate::oauth::OAuthCoordinator;
use crate::template::TemplateRegistry;
use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Duration;

/// State handed to every handler.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Login handshake and client lookup
    pub oauth: OAuthCoordinator,
    /// Page renderers
    pub templates: Arc<TemplateRegistry>,
    /// Flash cookie signing key
    pub flash_key: FlashKey,
    /// Attributes for every cookie we set
    pub cookie_policy: CookiePolicy,
    /// Lifetime of the `settings` and `state` cookies in seconds
    pub cookie_max_age: u64,
    /// Time a handler may spend on upstream calls
    pub upstream_deadline: Duration,
}

impl AppState {
    /// Assemble the state.
    #[must_use]
    pub fn new(
        oauth: OAuthCoordinator,
        templates: TemplateRegistry,
        flash_key: FlashKey,
        cookie_policy: CookiePolicy,
        cookie_max_age: u64,
        upstream_deadline: Duration,
    ) -> Self {
        Self {
            oauth,
            templates: Arc::new(templates),
            flash_key,
            cookie_policy,
            cookie_max_age,
            upstream_deadline,
        }
    }
}

impl FromRef<AppState> for FlashKey {
    fn from_ref(state: &AppState) -> Self {
        state.flash_key.clone()
    }
}

impl FromRef<AppState> for CookiePolicy {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_policy
    }
}
