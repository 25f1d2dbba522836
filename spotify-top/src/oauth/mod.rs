//! OAuth2 authorization-code login against the Spotify accounts service

pub mod authenticator;
pub mod coordinator;
mod types;

pub use authenticator::{Authenticator, SpotifyAuthenticator};
pub use coordinator::{OAuthCoordinator, DEFAULT_AGENT_TIMEOUT};
pub use types::{CallbackParams, StateToken, SCOPES, STATE_COOKIE_NAME};
