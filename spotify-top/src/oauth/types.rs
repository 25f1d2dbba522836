//! OAuth value types

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use serde::Deserialize;
use std::fmt;

/// State cookie name
pub const STATE_COOKIE_NAME: &str = "state";

/// Scopes requested from Spotify
pub const SCOPES: [&str; 3] = ["user-top-read", "user-read-private", "playlist-modify-private"];

/// Random bytes in a state token
const STATE_TOKEN_BYTES: usize = 32;

/// Opaque per-login correlation value.
///
/// Sent upstream as the OAuth `state` parameter, stored in the `state`
/// cookie, and used as the key of the session store.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StateToken(String);

impl StateToken {
    /// Fresh unguessable token: 32 random bytes, URL-safe base64.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; STATE_TOKEN_BYTES];
        rand::rng().fill(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Wrap a token that came back from the browser.
    #[must_use]
    pub fn from_cookie(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Token text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Tokens are credentials once bound to a client; keep them out of logs.
impl fmt::Debug for StateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "StateToken({prefix}..)")
    }
}

/// Query parameters Spotify appends when redirecting back.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code on success
    pub code: Option<String>,
    /// Echo of the state we sent
    pub state: Option<String>,
    /// Error code when the user denied access
    pub error: Option<String>,
}

impl CallbackParams {
    /// Whether this request is a return from the authorize page
    #[must_use]
    pub const fn is_callback(&self) -> bool {
        self.code.is_some() || self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_differ() {
        let first = StateToken::generate();
        let second = StateToken::generate();
        assert_ne!(first, second);
        assert_eq!(first.as_str().len(), 43);
    }

    #[test]
    fn test_token_is_url_safe() {
        let token = StateToken::generate();
        assert!(token
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_debug_hides_token() {
        let token = StateToken::from_cookie("abcdefghijklmnop");
        assert_eq!(format!("{token:?}"), "StateToken(abcdef..)");
    }

    #[test]
    fn test_callback_detection() {
        assert!(!CallbackParams::default().is_callback());
        let params = CallbackParams {
            code: Some("c".to_string()),
            state: Some("s".to_string()),
            error: None,
        };
        assert!(params.is_callback());
    }
}
