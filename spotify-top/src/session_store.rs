//! Session state store
//!
//! Maps a login's [`StateToken`] to the API client obtained for it. Each
//! token owns a slot whose [`OnceCell`] holds the outcome of a single
//! upstream token exchange, no matter how many requests race on the same
//! callback. A failed outcome is shared by every caller that was waiting on
//! it, then the slot is dropped.

use crate::error::AuthError;
use crate::oauth::{Authenticator, CallbackParams, StateToken};
use crate::spotify::ClientHandle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

/// Default lifetime of a bound client (matches the `state` cookie)
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

struct Slot {
    created_at: Instant,
    outcome: OnceCell<Result<ClientHandle, AuthError>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            created_at: Instant::now(),
            outcome: OnceCell::new(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }

    fn client(&self) -> Option<ClientHandle> {
        self.outcome.get()?.as_ref().ok().cloned()
    }

    fn failed(&self) -> bool {
        matches!(self.outcome.get(), Some(Err(_)))
    }
}

/// Token to client map shared by every handler.
pub struct SessionStore {
    authenticator: Option<Arc<dyn Authenticator>>,
    slots: Mutex<HashMap<StateToken, Arc<Slot>>>,
    ttl: Duration,
}

impl SessionStore {
    /// Create an empty store. Without an authenticator every exchange fails
    /// with [`AuthError::NoAuthenticator`].
    #[must_use]
    pub fn new(authenticator: Option<Arc<dyn Authenticator>>, ttl: Duration) -> Self {
        Self {
            authenticator,
            slots: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// The configured authenticator, if any
    #[must_use]
    pub fn authenticator(&self) -> Option<Arc<dyn Authenticator>> {
        self.authenticator.clone()
    }

    /// Fresh token for a new login. Nothing is registered until the exchange
    /// succeeds.
    #[must_use]
    pub fn begin_login(&self) -> StateToken {
        StateToken::generate()
    }

    /// Client bound to `token`, if the login completed and has not expired.
    #[must_use]
    pub fn lookup(&self, token: &StateToken) -> Option<ClientHandle> {
        let slots = self.slots.lock();
        let slot = slots.get(token)?;
        if slot.is_expired(self.ttl) {
            return None;
        }
        slot.client()
    }

    /// Complete the login identified by `token` with the provider callback.
    ///
    /// Idempotent: once a client is bound, later calls return it without
    /// contacting the provider. Concurrent first calls share one exchange.
    ///
    /// # Errors
    ///
    /// * [`AuthError::NoAuthenticator`] when the store has no authenticator
    /// * [`AuthError::StateMismatch`] when `callback.state` is not `token`
    /// * [`AuthError::ExchangeFailed`] when the user denied access, the
    ///   callback has no code, or the provider rejected the code
    pub async fn exchange(
        &self,
        token: &StateToken,
        callback: &CallbackParams,
        redirect_uri: &str,
    ) -> Result<ClientHandle, AuthError> {
        if let Some(client) = self.lookup(token) {
            return Ok(client);
        }

        let authenticator = self.authenticator.clone().ok_or(AuthError::NoAuthenticator)?;

        if callback.state.as_deref() != Some(token.as_str()) {
            tracing::warn!(token = ?token, "Callback state does not match the state cookie");
            return Err(AuthError::StateMismatch);
        }

        if let Some(error) = &callback.error {
            tracing::info!(error = %error, "User did not authorize the application");
            return Err(AuthError::ExchangeFailed(format!("authorization denied: {error}")));
        }

        let code = callback
            .code
            .clone()
            .ok_or_else(|| AuthError::ExchangeFailed("callback carried no code".to_string()))?;

        let slot = self.slot_for(token);
        let result = slot
            .outcome
            .get_or_init(|| async move {
                let outcome = authenticator.exchange(&code, redirect_uri).await;
                match &outcome {
                    Ok(_) => tracing::info!(token = ?token, "Login completed"),
                    Err(e) => tracing::warn!(token = ?token, error = %e, "Login failed"),
                }
                outcome
            })
            .await
            .clone();

        if result.is_err() {
            self.discard_failed(token, &slot);
        }

        result
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| !slot.is_expired(self.ttl));
        before - slots.len()
    }

    /// Number of entries, bound or in flight
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether the store holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Run [`Self::sweep_expired`] every `interval` until the task is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.sweep_expired();
                if removed > 0 {
                    tracing::debug!(removed = removed, remaining = self.len(), "Swept expired sessions");
                }
            }
        })
    }

    fn slot_for(&self, token: &StateToken) -> Arc<Slot> {
        let mut slots = self.slots.lock();
        let slot = slots
            .entry(token.clone())
            .or_insert_with(|| Arc::new(Slot::new()));
        if slot.is_expired(self.ttl) || slot.failed() {
            *slot = Arc::new(Slot::new());
        }
        Arc::clone(slot)
    }

    fn discard_failed(&self, token: &StateToken, slot: &Arc<Slot>) {
        let mut slots = self.slots.lock();
        if slots.get(token).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(token);
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("has_authenticator", &self.authenticator.is_some())
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::settings::TimeRange;
    use crate::spotify::{Artist, Playlist, SpotifyApi, Track, User};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullApi;

    #[async_trait]
    impl SpotifyApi for NullApi {
        async fn current_user(&self) -> Result<User, UpstreamError> {
            Ok(User {
                id: "u".to_string(),
                display_name: "u".to_string(),
            })
        }
        async fn top_artists(&self, _: u32, _: TimeRange) -> Result<Vec<Artist>, UpstreamError> {
            Ok(Vec::new())
        }
        async fn top_tracks(&self, _: u32, _: TimeRange) -> Result<Vec<Track>, UpstreamError> {
            Ok(Vec::new())
        }
        async fn create_playlist(&self, _: &str, _: &str, _: &str) -> Result<Playlist, UpstreamError> {
            Ok(Playlist {
                id: "p".to_string(),
                url: None,
            })
        }
        async fn add_tracks(&self, _: &str, _: &[String]) -> Result<(), UpstreamError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingAuthenticator {
        exchanges: AtomicUsize,
        reject: bool,
        reject_first: bool,
    }

    #[async_trait]
    impl Authenticator for CountingAuthenticator {
        fn authorize_url(&self, state: &StateToken, redirect_uri: &str) -> Result<String, AuthError> {
            Ok(format!("https://auth.test/?state={state}&redirect_uri={redirect_uri}"))
        }

        async fn exchange(&self, _code: &str, _redirect_uri: &str) -> Result<ClientHandle, AuthError> {
            let call = self.exchanges.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.reject || (self.reject_first && call == 0) {
                return Err(AuthError::ExchangeFailed("invalid_grant".to_string()));
            }
            Ok(Arc::new(NullApi))
        }
    }

    fn store_with(auth: Arc<CountingAuthenticator>) -> SessionStore {
        SessionStore::new(Some(auth), DEFAULT_SESSION_TTL)
    }

    fn callback_for(token: &StateToken) -> CallbackParams {
        CallbackParams {
            code: Some("code-1".to_string()),
            state: Some(token.as_str().to_string()),
            error: None,
        }
    }

    #[test]
    fn test_begin_login_tokens_distinct() {
        let store = SessionStore::new(None, DEFAULT_SESSION_TTL);
        assert_ne!(store.begin_login(), store.begin_login());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_exchange_without_authenticator() {
        let store = SessionStore::new(None, DEFAULT_SESSION_TTL);
        let token = store.begin_login();
        let result = store.exchange(&token, &callback_for(&token), "http://x/cb").await;
        assert!(matches!(result, Err(AuthError::NoAuthenticator)));
    }

    #[tokio::test]
    async fn test_exchange_binds_and_is_idempotent() {
        let auth = Arc::new(CountingAuthenticator::default());
        let store = store_with(auth.clone());
        let token = store.begin_login();

        let first = store.exchange(&token, &callback_for(&token), "http://x/cb").await.unwrap();
        let second = store.exchange(&token, &callback_for(&token), "http://x/cb").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(auth.exchanges.load(Ordering::SeqCst), 1);
        assert!(store.lookup(&token).is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_exchange_runs_once() {
        let auth = Arc::new(CountingAuthenticator::default());
        let store = Arc::new(store_with(auth.clone()));
        let token = store.begin_login();
        let callback = callback_for(&token);

        let (a, b) = tokio::join!(
            store.exchange(&token, &callback, "http://x/cb"),
            store.exchange(&token, &callback, "http://x/cb"),
        );

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(auth.exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_failed_exchange_runs_once() {
        let auth = Arc::new(CountingAuthenticator {
            reject: true,
            ..CountingAuthenticator::default()
        });
        let store = Arc::new(store_with(auth.clone()));
        let token = store.begin_login();
        let callback = callback_for(&token);

        let (a, b) = tokio::join!(
            store.exchange(&token, &callback, "http://x/cb"),
            store.exchange(&token, &callback, "http://x/cb"),
        );

        assert!(matches!(a, Err(AuthError::ExchangeFailed(_))));
        assert!(matches!(b, Err(AuthError::ExchangeFailed(_))));
        assert_eq!(auth.exchanges.load(Ordering::SeqCst), 1);
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failure_is_shared_and_retry_binds_in_store() {
        let auth = Arc::new(CountingAuthenticator {
            reject_first: true,
            ..CountingAuthenticator::default()
        });
        let store = Arc::new(store_with(auth.clone()));
        let token = store.begin_login();
        let callback = callback_for(&token);

        let (a, b) = tokio::join!(
            store.exchange(&token, &callback, "http://x/cb"),
            store.exchange(&token, &callback, "http://x/cb"),
        );
        assert!(a.is_err());
        assert!(b.is_err());
        assert_eq!(auth.exchanges.load(Ordering::SeqCst), 1);

        let client = store.exchange(&token, &callback, "http://x/cb").await.unwrap();
        assert_eq!(auth.exchanges.load(Ordering::SeqCst), 2);
        assert!(Arc::ptr_eq(&client, &store.lookup(&token).unwrap()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_state_mismatch_registers_nothing() {
        let auth = Arc::new(CountingAuthenticator::default());
        let store = store_with(auth.clone());
        let token = store.begin_login();
        let other = store.begin_login();

        let result = store.exchange(&token, &callback_for(&other), "http://x/cb").await;

        assert!(matches!(result, Err(AuthError::StateMismatch)));
        assert!(store.lookup(&token).is_none());
        assert!(store.is_empty());
        assert_eq!(auth.exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_denied_callback_fails() {
        let store = store_with(Arc::new(CountingAuthenticator::default()));
        let token = store.begin_login();
        let callback = CallbackParams {
            code: None,
            state: Some(token.as_str().to_string()),
            error: Some("access_denied".to_string()),
        };

        let result = store.exchange(&token, &callback, "http://x/cb").await;
        assert!(matches!(result, Err(AuthError::ExchangeFailed(_))));
    }

    #[tokio::test]
    async fn test_failed_exchange_leaves_no_entry() {
        let auth = Arc::new(CountingAuthenticator {
            reject: true,
            ..CountingAuthenticator::default()
        });
        let store = store_with(auth);
        let token = store.begin_login();

        let result = store.exchange(&token, &callback_for(&token), "http://x/cb").await;

        assert!(matches!(result, Err(AuthError::ExchangeFailed(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_tokens_get_distinct_clients() {
        let auth = Arc::new(CountingAuthenticator::default());
        let store = store_with(auth.clone());
        let first = store.begin_login();
        let second = store.begin_login();

        let a = store.exchange(&first, &callback_for(&first), "http://x/cb").await.unwrap();
        let b = store.exchange(&second, &callback_for(&second), "http://x/cb").await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(auth.exchanges.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_entries_hidden_and_swept() {
        let auth = Arc::new(CountingAuthenticator::default());
        let store = SessionStore::new(Some(auth), Duration::ZERO);
        let token = store.begin_login();

        store.exchange(&token, &callback_for(&token), "http://x/cb").await.unwrap();

        assert!(store.lookup(&token).is_none());
        assert_eq!(store.sweep_expired(), 1);
        assert!(store.is_empty());
    }
}
