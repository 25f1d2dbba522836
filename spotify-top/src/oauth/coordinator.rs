//! Login handshake coordination
//!
//! Ties the login state agent (which tokens did we issue) to the session
//! store (which tokens are logged in). A login moves from unauthenticated,
//! to pending callback once [`OAuthCoordinator::begin_login`] issued a
//! token, to authenticated once [`OAuthCoordinator::complete_login`] bound
//! a client to it.

use super::types::{CallbackParams, StateToken};
use crate::agents::{IssueState, RemoveState, ValidateState};
use crate::error::AuthError;
use crate::session_store::SessionStore;
use crate::spotify::ClientHandle;
use acton_reactive::prelude::*;
use std::sync::Arc;
use std::time::Duration;

/// Default wait for a reply from the login state agent
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives the OAuth authorization-code handshake.
#[derive(Clone)]
pub struct OAuthCoordinator {
    store: Arc<SessionStore>,
    login_states: ActorHandle,
    redirect_base: String,
    agent_timeout: Duration,
}

impl std::fmt::Debug for OAuthCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCoordinator")
            .field("store", &self.store)
            .field("login_states", &"ActorHandle")
            .field("redirect_base", &self.redirect_base)
            .field("agent_timeout", &self.agent_timeout)
            .finish()
    }
}

impl OAuthCoordinator {
    /// `redirect_base` is the externally visible origin the provider
    /// redirects back to, e.g. `http://localhost:8080`.
    #[must_use]
    pub fn new(store: Arc<SessionStore>, login_states: ActorHandle, redirect_base: impl Into<String>) -> Self {
        Self {
            store,
            login_states,
            redirect_base: redirect_base.into().trim_end_matches('/').to_string(),
            agent_timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }

    /// Absolute redirect URI for a callback route.
    #[must_use]
    pub fn redirect_uri(&self, callback_path: &str) -> String {
        format!("{}{callback_path}", self.redirect_base)
    }

    /// Start a login that returns to `callback_path`.
    ///
    /// # Errors
    ///
    /// * [`AuthError::NoAuthenticator`] when no authenticator is configured
    /// * [`AuthError::UnknownState`] when the login state agent did not
    ///   confirm the token in time
    /// * [`AuthError::InvalidRedirect`] when the redirect URI is malformed
    pub async fn begin_login(&self, callback_path: &str) -> Result<(StateToken, String), AuthError> {
        let authenticator = self.store.authenticator().ok_or(AuthError::NoAuthenticator)?;
        let token = self.store.begin_login();

        let (issue, rx) = IssueState::new(token.clone(), callback_path);
        self.login_states.send(issue).await;
        if !matches!(tokio::time::timeout(self.agent_timeout, rx).await, Ok(Ok(_))) {
            tracing::error!("Login state agent did not confirm issued state");
            return Err(AuthError::UnknownState);
        }

        let url = authenticator.authorize_url(&token, &self.redirect_uri(callback_path))?;
        tracing::debug!(callback = %callback_path, "Started login");
        Ok((token, url))
    }

    /// Finish the login identified by `token` using the provider callback.
    ///
    /// Tokens that are already logged in return their client right away.
    ///
    /// # Errors
    ///
    /// * [`AuthError::UnknownState`] when the token was not issued here or
    ///   has expired
    /// * anything [`SessionStore::exchange`] returns
    pub async fn complete_login(
        &self,
        token: &StateToken,
        callback: &CallbackParams,
    ) -> Result<ClientHandle, AuthError> {
        if let Some(client) = self.store.lookup(token) {
            return Ok(client);
        }

        let (validate, rx) = ValidateState::new(token.clone());
        self.login_states.send(validate).await;
        let login = match tokio::time::timeout(self.agent_timeout, rx).await {
            Ok(Ok(Some(login))) => login,
            Ok(Ok(None)) => return Err(AuthError::UnknownState),
            Ok(Err(_)) | Err(_) => {
                tracing::error!("Login state agent did not answer validation");
                return Err(AuthError::UnknownState);
            }
        };

        let redirect_uri = self.redirect_uri(&login.callback_path);
        let client = self.store.exchange(token, callback, &redirect_uri).await?;

        self.login_states.send(RemoveState { token: token.clone() }).await;
        Ok(client)
    }

    /// Client for an authenticated token.
    #[must_use]
    pub fn client(&self, token: &StateToken) -> Option<ClientHandle> {
        self.store.lookup(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::LoginStateAgent;
    use crate::error::UpstreamError;
    use crate::oauth::Authenticator;
    use crate::session_store::DEFAULT_SESSION_TTL;
    use crate::settings::TimeRange;
    use crate::spotify::{Artist, Playlist, SpotifyApi, Track, User};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct NullApi;

    #[async_trait]
    impl SpotifyApi for NullApi {
        async fn current_user(&self) -> Result<User, UpstreamError> {
            Err(UpstreamError::Decode("unused".to_string()))
        }
        async fn top_artists(&self, _: u32, _: TimeRange) -> Result<Vec<Artist>, UpstreamError> {
            Ok(Vec::new())
        }
        async fn top_tracks(&self, _: u32, _: TimeRange) -> Result<Vec<Track>, UpstreamError> {
            Ok(Vec::new())
        }
        async fn create_playlist(&self, _: &str, _: &str, _: &str) -> Result<Playlist, UpstreamError> {
            Err(UpstreamError::Decode("unused".to_string()))
        }
        async fn add_tracks(&self, _: &str, _: &[String]) -> Result<(), UpstreamError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingAuthenticator {
        redirects: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Authenticator for RecordingAuthenticator {
        fn authorize_url(&self, state: &StateToken, redirect_uri: &str) -> Result<String, AuthError> {
            self.redirects.lock().push(redirect_uri.to_string());
            Ok(format!("https://auth.test/authorize?state={state}"))
        }

        async fn exchange(&self, _code: &str, redirect_uri: &str) -> Result<ClientHandle, AuthError> {
            self.redirects.lock().push(redirect_uri.to_string());
            Ok(Arc::new(NullApi))
        }
    }

    async fn coordinator(auth: Arc<RecordingAuthenticator>) -> (ActorRuntime, OAuthCoordinator) {
        let mut runtime = ActonApp::launch_async().await;
        let handle = LoginStateAgent::spawn(&mut runtime).await.unwrap();
        let store = Arc::new(SessionStore::new(Some(auth), DEFAULT_SESSION_TTL));
        (runtime, OAuthCoordinator::new(store, handle, "http://localhost:8080/"))
    }

    fn callback_for(token: &StateToken) -> CallbackParams {
        CallbackParams {
            code: Some("code".to_string()),
            state: Some(token.as_str().to_string()),
            error: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_full_login_uses_same_redirect() {
        let auth = Arc::new(RecordingAuthenticator::default());
        let (mut runtime, coordinator) = coordinator(auth.clone()).await;

        let (token, url) = coordinator.begin_login("/toptracks").await.unwrap();
        assert!(url.contains(token.as_str()));
        assert!(coordinator.client(&token).is_none());

        let client = coordinator
            .complete_login(&token, &callback_for(&token))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&client, &coordinator.client(&token).unwrap()));

        let redirects = auth.redirects.lock().clone();
        assert_eq!(
            redirects,
            vec![
                "http://localhost:8080/toptracks".to_string(),
                "http://localhost:8080/toptracks".to_string()
            ]
        );

        runtime.shutdown_all().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unissued_token_rejected() {
        let (mut runtime, coordinator) = coordinator(Arc::new(RecordingAuthenticator::default())).await;
        let token = StateToken::generate();

        let result = coordinator.complete_login(&token, &callback_for(&token)).await;
        assert!(matches!(result, Err(AuthError::UnknownState)));

        runtime.shutdown_all().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mismatched_callback_rejected() {
        let (mut runtime, coordinator) = coordinator(Arc::new(RecordingAuthenticator::default())).await;
        let (token, _) = coordinator.begin_login("/topartists").await.unwrap();
        let forged = StateToken::generate();

        let result = coordinator.complete_login(&token, &callback_for(&forged)).await;
        assert!(matches!(result, Err(AuthError::StateMismatch)));
        assert!(coordinator.client(&token).is_none());

        runtime.shutdown_all().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_completed_login_survives_retry() {
        let (mut runtime, coordinator) = coordinator(Arc::new(RecordingAuthenticator::default())).await;
        let (token, _) = coordinator.begin_login("/topartists").await.unwrap();

        let first = coordinator.complete_login(&token, &callback_for(&token)).await.unwrap();
        let again = coordinator.complete_login(&token, &callback_for(&token)).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        runtime.shutdown_all().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_begin_without_authenticator() {
        let mut runtime = ActonApp::launch_async().await;
        let handle = LoginStateAgent::spawn(&mut runtime).await.unwrap();
        let store = Arc::new(SessionStore::new(None, DEFAULT_SESSION_TTL));
        let coordinator = OAuthCoordinator::new(store, handle, "http://localhost:8080");

        let result = coordinator.begin_login("/topartists").await;
        assert!(matches!(result, Err(AuthError::NoAuthenticator)));

        runtime.shutdown_all().await.unwrap();
    }
}
