//! acton-reactive agents
//!
//! Actor-based components shared by every request handler.

use acton_reactive::prelude::{ActorConfig, Ern};

pub mod login_state;
pub mod request_reply;

pub use login_state::{
    CleanupExpired, IssueState, LoginStateAgent, LoginStateConfig, PendingLogin, RemoveState,
    ValidateState,
};
pub use request_reply::{create_request_reply, send_response, ResponseChannel};

/// Create a default actor configuration rooted at `name`.
///
/// # Errors
///
/// Returns an error if the ERN cannot be created (invalid name format)
pub fn default_actor_config(name: &str) -> anyhow::Result<ActorConfig> {
    Ok(ActorConfig::new(Ern::with_root(name)?, None, None)?)
}
