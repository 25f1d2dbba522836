//! Login state registry agent
//!
//! Remembers every state token handed out by `/topartistsauth` and
//! `/toptracksauth` so the callback can prove it belongs to a login this
//! process started. Tokens expire together with the `state` cookie.

use super::default_actor_config;
use super::request_reply::{create_request_reply, send_response, ResponseChannel};
use crate::oauth::StateToken;
use acton_reactive::prelude::*;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Default lifetime of an issued state (matches the cookie)
const DEFAULT_STATE_TTL: Duration = Duration::from_secs(3600);

/// Default interval between cleanup sweeps
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Configuration for the login state agent
#[derive(Debug, Clone)]
pub struct LoginStateConfig {
    /// How long an issued state stays valid
    pub state_ttl: Duration,
    /// How often expired states are swept
    pub cleanup_interval: Duration,
}

impl Default for LoginStateConfig {
    fn default() -> Self {
        Self {
            state_ttl: DEFAULT_STATE_TTL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

/// A login that was started but may not have completed yet.
#[derive(Debug, Clone)]
pub struct PendingLogin {
    /// Route the provider redirects back to
    pub callback_path: String,
    /// When the state stops being accepted
    pub expires_at: Instant,
}

impl PendingLogin {
    /// Whether the state is past its lifetime
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

type LoginStateActorBuilder = ManagedActor<Idle, LoginStateAgent>;

/// Login state agent model
#[derive(Debug, Default, Clone)]
pub struct LoginStateAgent {
    config: LoginStateConfig,
    pending: HashMap<StateToken, PendingLogin>,
}

impl LoginStateAgent {
    fn cleanup_expired(&mut self) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, login| !login.is_expired());
        before - self.pending.len()
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Record a freshly generated state token.
#[derive(Debug, Clone)]
pub struct IssueState {
    /// The token
    pub token: StateToken,
    /// Route the provider redirects back to
    pub callback_path: String,
    /// Confirms the token is registered
    pub response_tx: Option<ResponseChannel<PendingLogin>>,
}

impl IssueState {
    /// Create an issue request with response channel
    #[must_use]
    pub fn new(
        token: StateToken,
        callback_path: impl Into<String>,
    ) -> (Self, oneshot::Receiver<PendingLogin>) {
        let (response_tx, rx) = create_request_reply();
        (
            Self {
                token,
                callback_path: callback_path.into(),
                response_tx: Some(response_tx),
            },
            rx,
        )
    }
}

/// Look up a state token. Replies `None` for unknown or expired tokens.
#[derive(Debug, Clone)]
pub struct ValidateState {
    /// Token presented by the callback
    pub token: StateToken,
    /// Response channel
    pub response_tx: ResponseChannel<Option<PendingLogin>>,
}

impl ValidateState {
    /// Create a validate request with response channel
    #[must_use]
    pub fn new(token: StateToken) -> (Self, oneshot::Receiver<Option<PendingLogin>>) {
        let (response_tx, rx) = create_request_reply();
        (Self { token, response_tx }, rx)
    }
}

/// Forget a state token.
#[derive(Debug, Clone)]
pub struct RemoveState {
    /// Token to drop
    pub token: StateToken,
}

/// Sweep expired state tokens.
#[derive(Debug, Clone, Default)]
pub struct CleanupExpired;

impl LoginStateAgent {
    /// Spawn the agent with default configuration.
    ///
    /// # Errors
    ///
    /// Returns error if actor configuration or spawning fails
    pub async fn spawn(runtime: &mut ActorRuntime) -> anyhow::Result<ActorHandle> {
        Self::spawn_with_config(runtime, LoginStateConfig::default()).await
    }

    /// Spawn the agent and its periodic cleanup task.
    ///
    /// # Errors
    ///
    /// Returns error if actor configuration or spawning fails
    pub async fn spawn_with_config(
        runtime: &mut ActorRuntime,
        config: LoginStateConfig,
    ) -> anyhow::Result<ActorHandle> {
        let actor_config = default_actor_config("login_state")?;
        let mut builder = runtime.new_actor_with_config::<Self>(actor_config);
        let cleanup_interval = config.cleanup_interval;
        builder.model.config = config;

        Self::configure_handlers(&mut builder);

        let handle = builder.start().await;
        Self::spawn_cleanup_task(handle.clone(), cleanup_interval);
        Ok(handle)
    }

    fn configure_handlers(builder: &mut LoginStateActorBuilder) {
        builder
            .mutate_on::<IssueState>(|actor, context| {
                let msg = context.message();
                let login = PendingLogin {
                    callback_path: msg.callback_path.clone(),
                    expires_at: Instant::now() + actor.model.config.state_ttl,
                };
                actor.model.pending.insert(msg.token.clone(), login.clone());

                tracing::debug!(
                    callback = %login.callback_path,
                    pending = actor.model.pending.len(),
                    "Issued login state"
                );

                let Some(tx) = msg.response_tx.clone() else {
                    return Reply::ready();
                };
                Reply::pending(async move {
                    let _ = send_response(tx, login).await;
                })
            })
            .mutate_on::<ValidateState>(|actor, context| {
                let msg = context.message();
                let response_tx = msg.response_tx.clone();

                let login = actor.model.pending.get(&msg.token).and_then(|login| {
                    if login.is_expired() {
                        tracing::warn!("Login state expired");
                        None
                    } else {
                        Some(login.clone())
                    }
                });

                if login.is_none() {
                    tracing::debug!("Rejected unknown login state");
                }

                Reply::pending(async move {
                    let _ = send_response(response_tx, login).await;
                })
            })
            .mutate_on::<RemoveState>(|actor, context| {
                if actor.model.pending.remove(&context.message().token).is_some() {
                    tracing::debug!("Removed login state");
                }
                Reply::ready()
            })
            .mutate_on::<CleanupExpired>(|actor, _context| {
                let removed = actor.model.cleanup_expired();
                if removed > 0 {
                    tracing::debug!(
                        removed = removed,
                        remaining = actor.model.pending.len(),
                        "Cleaned up expired login states"
                    );
                }
                Reply::ready()
            })
            .after_start(|_actor| async {
                tracing::info!("Login state agent started");
            })
            .after_stop(|actor| {
                let pending = actor.model.pending.len();
                async move {
                    tracing::info!(pending = pending, "Login state agent stopped");
                }
            });
    }

    fn spawn_cleanup_task(handle: ActorHandle, interval: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval);
            loop {
                interval.tick().await;
                handle.send(CleanupExpired).await;
            }
        });
    }
}
