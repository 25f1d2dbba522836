//! Spotify Top
//!
//! A small web application that logs in to Spotify with the OAuth
//! authorization-code flow, shows the user's top artists and tracks, and
//! saves the top tracks as a private playlist.
//!
//! Display settings live in a cookie, one-shot notifications travel in a
//! signed flash cookie, and each login's state token doubles as the key of
//! a server-side map from token to API client.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agents;
pub mod config;
pub mod cookies;
pub mod error;
pub mod flash;
pub mod handlers;
pub mod oauth;
pub mod routes;
pub mod session_store;
pub mod settings;
pub mod spotify;
pub mod state;
pub mod template;

// Re-export key types for convenience
pub use config::AppConfig;
pub use error::{AuthError, ConfigError, TemplateError, UpstreamError};
pub use routes::router;
pub use session_store::SessionStore;
pub use settings::{Settings, TimeRange};
pub use state::AppState;
