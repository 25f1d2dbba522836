//! Error types
//!
//! Each concern gets its own enum. Handlers never surface these to the
//! browser directly: everything except [`TemplateError::Render`] is turned
//! into a flash message plus a redirect.

use reqwest::StatusCode;
use thiserror::Error;

/// Configuration could not be loaded or is incomplete.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A provider failed to load or the merged data did not deserialize.
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// One or more required values are absent.
    #[error("missing required configuration: {}", fields.join(", "))]
    Missing {
        /// Dotted paths of every missing field.
        fields: Vec<&'static str>,
    },

    /// A value is present but unusable.
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Failures of the OAuth login handshake.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No authenticator has been configured for this process.
    #[error("no authenticator configured")]
    NoAuthenticator,

    /// The state token was never issued here or has expired.
    #[error("unknown or expired login state")]
    UnknownState,

    /// The callback carried a different state than the one we issued.
    #[error("login state mismatch")]
    StateMismatch,

    /// The authorization code could not be traded for a token.
    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),

    /// The redirect URI built from configuration is not a URL.
    #[error("invalid redirect uri: {0}")]
    InvalidRedirect(String),
}

/// Failures talking to the Spotify Web API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transport-level failure, including timeouts.
    #[error("request to spotify failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Spotify answered with a non-success status.
    #[error("spotify returned {status}: {message}")]
    Status {
        /// HTTP status returned upstream.
        status: StatusCode,
        /// Error message from the response body, if any.
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("unexpected response from spotify: {0}")]
    Decode(String),

    /// The request deadline passed before Spotify answered.
    #[error("spotify did not answer before the request deadline")]
    DeadlineExceeded,
}

/// Template registration and rendering failures.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// A template with this name was already registered.
    #[error("template already registered: {0}")]
    Duplicate(String),

    /// Askama failed to render.
    #[error("failed to render template: {0}")]
    Render(#[from] askama::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_lists_every_field() {
        let err = ConfigError::Missing {
            fields: vec!["spotify.client_id", "cookies.key"],
        };
        assert_eq!(
            err.to_string(),
            "missing required configuration: spotify.client_id, cookies.key"
        );
    }

    #[test]
    fn test_upstream_status_display() {
        let err = UpstreamError::Status {
            status: StatusCode::UNAUTHORIZED,
            message: "The access token expired".to_string(),
        };
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("The access token expired"));
    }
}
