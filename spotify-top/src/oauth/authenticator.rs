//! OAuth authorization-code capability
//!
//! [`Authenticator`] is what the session store and coordinator depend on.
//! [`SpotifyAuthenticator`] implements it with the `oauth2` crate against
//! the Spotify accounts service.

use super::types::{StateToken, SCOPES};
use crate::config::SpotifyConfig;
use crate::error::{AuthError, ConfigError};
use crate::spotify::{ClientHandle, SpotifyHttpClient};
use async_trait::async_trait;
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use std::sync::Arc;

// Avoid oauth2 type madness
type OAuth2Client = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Builds authorize URLs and trades authorization codes for API clients.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// URL of the upstream consent page for this login attempt.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidRedirect`] if `redirect_uri` is not a URL.
    fn authorize_url(&self, state: &StateToken, redirect_uri: &str) -> Result<String, AuthError>;

    /// Exchange `code` for an access token and wrap it in a client.
    ///
    /// `redirect_uri` must be the one used for the authorize request.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ExchangeFailed`] if the token endpoint rejects
    /// the code or cannot be reached.
    async fn exchange(&self, code: &str, redirect_uri: &str) -> Result<ClientHandle, AuthError>;
}

/// Spotify accounts service authenticator.
#[derive(Debug, Clone)]
pub struct SpotifyAuthenticator {
    client: OAuth2Client,
    http: reqwest::Client,
    api_base_url: String,
}

impl SpotifyAuthenticator {
    /// Build from validated configuration. `http` is shared with the API
    /// clients handed out after login.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if an endpoint URL does not parse.
    pub fn new(config: &SpotifyConfig, client_id: &str, client_secret: &str, http: reqwest::Client) -> Result<Self, ConfigError> {
        let auth_url = AuthUrl::new(config.auth_url.clone()).map_err(|e| ConfigError::Invalid {
            field: "spotify.auth_url",
            reason: e.to_string(),
        })?;
        let token_url = TokenUrl::new(config.token_url.clone()).map_err(|e| ConfigError::Invalid {
            field: "spotify.token_url",
            reason: e.to_string(),
        })?;

        let client = BasicClient::new(ClientId::new(client_id.to_string()))
            .set_client_secret(ClientSecret::new(client_secret.to_string()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url);

        Ok(Self {
            client,
            http,
            api_base_url: config.api_base_url.clone(),
        })
    }

    fn client_for(&self, redirect_uri: &str) -> Result<OAuth2Client, AuthError> {
        let redirect_url = RedirectUrl::new(redirect_uri.to_string())
            .map_err(|e| AuthError::InvalidRedirect(e.to_string()))?;
        Ok(self.client.clone().set_redirect_uri(redirect_url))
    }
}

#[async_trait]
impl Authenticator for SpotifyAuthenticator {
    fn authorize_url(&self, state: &StateToken, redirect_uri: &str) -> Result<String, AuthError> {
        let state = state.as_str().to_string();
        let (authorization_url, _csrf_token) = self
            .client_for(redirect_uri)?
            .authorize_url(|| CsrfToken::new(state))
            .add_scopes(SCOPES.iter().map(|scope| Scope::new((*scope).to_string())))
            .url();

        Ok(authorization_url.to_string())
    }

    async fn exchange(&self, code: &str, redirect_uri: &str) -> Result<ClientHandle, AuthError> {
        let token = self
            .client_for(redirect_uri)?
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Token exchange with spotify failed");
                AuthError::ExchangeFailed(e.to_string())
            })?;

        tracing::debug!(
            expires_in = ?token.expires_in(),
            has_refresh_token = token.refresh_token().is_some(),
            "Exchanged authorization code"
        );

        Ok(Arc::new(SpotifyHttpClient::new(
            self.http.clone(),
            self.api_base_url.clone(),
            token.access_token().secret().clone(),
        )))
    }
}
