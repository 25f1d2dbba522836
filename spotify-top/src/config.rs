//! Configuration
//!
//! Values are layered with figment, later sources winning:
//!
//! 1. `<user config dir>/spotifytop/config.toml`
//! 2. `spotifytop.toml` in the working directory
//! 3. the file given with `--config`
//! 4. `SPOTIFY_ID` / `SPOTIFY_SECRET`
//! 5. `SPOTIFYTOP_*` variables, `__` separating sections
//!    (`SPOTIFYTOP_COOKIES__KEY`)

use crate::cookies::{CookiePolicy, SameSite};
use crate::error::ConfigError;
use crate::oauth::DEFAULT_AGENT_TIMEOUT;
use crate::spotify::DEFAULT_API_BASE_URL;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Listener configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Cookie configuration.
    #[serde(default)]
    pub cookies: CookieConfig,
    /// Spotify application credentials and endpoints.
    #[serde(default)]
    pub spotify: SpotifyConfig,
    /// Login session configuration.
    #[serde(default)]
    pub session: SessionConfig,
    /// Inbound request handling.
    #[serde(default)]
    pub http: HttpConfig,
    /// Log output.
    #[serde(default)]
    pub log: LogConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served under `/css`.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,
}

/// Cookie configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    /// Secret used to sign the flash cookie. Required.
    #[serde(default)]
    pub key: Option<String>,
    /// Lifetime of the `settings` and `state` cookies in seconds.
    #[serde(default = "default_cookie_max_age")]
    pub max_age_seconds: u64,
    /// Mark cookies `Secure`.
    #[serde(default)]
    pub secure: bool,
    /// `SameSite` attribute.
    #[serde(default)]
    pub same_site: SameSite,
}

/// Spotify configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyConfig {
    /// Application client ID. Required.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Application client secret. Required.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Origin Spotify redirects back to; the callback route is appended.
    #[serde(default = "default_redirect_base")]
    pub redirect_base: String,
    /// Authorize endpoint.
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    /// Token endpoint.
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Web API root.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Timeout for each outbound request in seconds.
    #[serde(default = "default_upstream_timeout")]
    pub timeout_seconds: u64,
}

/// Login session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// How long a login stays valid in seconds.
    #[serde(default = "default_session_ttl")]
    pub ttl_seconds: u64,
    /// Interval between expiry sweeps in seconds.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

/// Inbound request handling.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Whole-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

/// Log output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

/// Required secrets, present and non-empty.
#[derive(Clone)]
pub struct Credentials {
    /// Spotify client ID
    pub client_id: String,
    /// Spotify client secret
    pub client_secret: String,
    /// Flash cookie signing key
    pub cookie_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("cookie_key", &"<redacted>")
            .finish()
    }
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8080
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/css"))
}

const fn default_cookie_max_age() -> u64 {
    3600 // 1 hour
}

fn default_redirect_base() -> String {
    "http://localhost:8080".to_string()
}

fn default_auth_url() -> String {
    "https://accounts.spotify.com/authorize".to_string()
}

fn default_token_url() -> String {
    "https://accounts.spotify.com/api/token".to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

const fn default_upstream_timeout() -> u64 {
    10
}

const fn default_session_ttl() -> u64 {
    3600 // 1 hour
}

const fn default_cleanup_interval() -> u64 {
    300 // 5 minutes
}

const fn default_request_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            assets_dir: default_assets_dir(),
        }
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            key: None,
            max_age_seconds: default_cookie_max_age(),
            secure: false,
            same_site: SameSite::default(),
        }
    }
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_base: default_redirect_base(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            api_base_url: default_api_base_url(),
            timeout_seconds: default_upstream_timeout(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_session_ttl(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl SpotifyConfig {
    /// Outbound request timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl SessionConfig {
    /// Login lifetime
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Sweep interval, at least one second
    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds.max(1))
    }
}

impl HttpConfig {
    /// Whole-request timeout
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl CookieConfig {
    /// Attributes shared by every cookie we set
    #[must_use]
    pub const fn policy(&self) -> CookiePolicy {
        CookiePolicy {
            secure: self.secure,
            same_site: self.same_site,
        }
    }
}

impl AppConfig {
    /// Timeout for the whole request.
    ///
    /// Handlers stop upstream work after `http.request_timeout_seconds`.
    /// On top of that a callback may spend one token exchange and two
    /// login state lookups before its deadline starts to matter.
    #[must_use]
    pub fn router_timeout(&self) -> Duration {
        self.http.request_timeout() + self.spotify.timeout() + DEFAULT_AGENT_TIMEOUT * 2
    }

    /// Load configuration from files and environment.
    ///
    /// `config_file` is merged after the default locations.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if a source is malformed.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment(config_file))
    }

    /// The layered sources, before extraction.
    #[must_use]
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(dir) = dirs::config_dir() {
            figment = figment.merge(Toml::file(dir.join("spotifytop").join("config.toml")));
        }
        figment = figment.merge(Toml::file("spotifytop.toml"));
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(
                Env::raw()
                    .only(&["SPOTIFY_ID", "SPOTIFY_SECRET"])
                    .map(|key| {
                        if key.as_str().eq_ignore_ascii_case("SPOTIFY_ID") {
                            "spotify.client_id".into()
                        } else {
                            "spotify.client_secret".into()
                        }
                    }),
            )
            .merge(Env::prefixed("SPOTIFYTOP_").split("__"))
    }

    /// Extract from an arbitrary figment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the data does not deserialize.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        figment.extract().map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Check required values, reporting every missing one at once.
    ///
    /// # Errors
    ///
    /// * [`ConfigError::Missing`] listing each absent or empty secret
    /// * [`ConfigError::Invalid`] for unusable values
    pub fn validate(&self) -> Result<Credentials, ConfigError> {
        fn present(value: Option<&String>) -> Option<String> {
            value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
        }

        let client_id = present(self.spotify.client_id.as_ref());
        let client_secret = present(self.spotify.client_secret.as_ref());
        let cookie_key = present(self.cookies.key.as_ref());

        let mut missing = Vec::new();
        if client_id.is_none() {
            missing.push("spotify.client_id");
        }
        if client_secret.is_none() {
            missing.push("spotify.client_secret");
        }
        if cookie_key.is_none() {
            missing.push("cookies.key");
        }

        let (Some(client_id), Some(client_secret), Some(cookie_key)) = (client_id, client_secret, cookie_key) else {
            return Err(ConfigError::Missing { fields: missing });
        };

        if !self.spotify.redirect_base.starts_with("http://") && !self.spotify.redirect_base.starts_with("https://") {
            return Err(ConfigError::Invalid {
                field: "spotify.redirect_base",
                reason: "must be an http(s) URL".to_string(),
            });
        }
        if self.http.request_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "http.request_timeout_seconds",
                reason: "must be positive".to_string(),
            });
        }

        Ok(Credentials {
            client_id,
            client_secret,
            cookie_key,
        })
    }

    /// `host:port` to bind
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
