//! Flash messages carried across redirects
//!
//! The queue lives in a signed cookie. A handler pulls it in with the
//! [`FlashJar`] extractor, pushes or drains messages, and returns the jar
//! as part of its response so the cookie is rewritten (or cleared) in the
//! same round trip.
//!
//! Reading is fail-open: a cookie that is tampered with, truncated, or from
//! an older key is logged and treated as an empty queue. A broken cookie
//! never blocks a page from rendering.

use crate::cookies::{read_cookie, CookiePolicy, SetCookie};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
    response::{IntoResponseParts, ResponseParts},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::convert::Infallible;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Flash cookie name
pub const FLASH_COOKIE_NAME: &str = "flash-session";

/// Severity of a flash message. Doubles as the CSS class in templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    /// Neutral information
    Info,
    /// Something was corrected on the user's behalf
    Warning,
    /// An action failed
    Danger,
    /// An action succeeded
    Success,
}

impl FlashLevel {
    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Danger => "danger",
            Self::Success => "success",
        }
    }
}

impl fmt::Display for FlashLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-shot user notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    /// Severity
    pub level: FlashLevel,
    /// Text shown to the user
    pub text: String,
}

impl FlashMessage {
    /// Build a message
    #[must_use]
    pub fn new(level: FlashLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }

    /// Info-level message
    #[must_use]
    pub fn info(text: impl Into<String>) -> Self {
        Self::new(FlashLevel::Info, text)
    }

    /// Warning-level message
    #[must_use]
    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(FlashLevel::Warning, text)
    }

    /// Danger-level message
    #[must_use]
    pub fn danger(text: impl Into<String>) -> Self {
        Self::new(FlashLevel::Danger, text)
    }

    /// Success-level message
    #[must_use]
    pub fn success(text: impl Into<String>) -> Self {
        Self::new(FlashLevel::Success, text)
    }
}

/// Why a flash cookie was rejected.
#[derive(Debug, thiserror::Error)]
pub enum FlashCookieError {
    /// No `.` separating payload and signature
    #[error("malformed flash cookie")]
    Malformed,
    /// Signature does not match the payload
    #[error("flash cookie signature mismatch")]
    BadSignature,
    /// Payload is not valid base64
    #[error("flash cookie payload is not base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Payload is not a message list
    #[error("flash cookie payload is not a message list: {0}")]
    Json(#[from] serde_json::Error),
}

/// HMAC key used to sign the flash cookie.
#[derive(Clone)]
pub struct FlashKey {
    mac: HmacSha256,
}

impl FlashKey {
    /// Derive a signing key from the configured cookie secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the HMAC rejects the key length.
    pub fn new(secret: &[u8]) -> Result<Self, hmac::digest::InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret)?,
        })
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn verify(&self, payload: &str, signature_hex: &str) -> bool {
        let Ok(signature) = hex::decode(signature_hex) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).is_ok()
    }

    /// Serialize and sign a queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the messages cannot be serialized.
    pub fn encode(&self, messages: &[FlashMessage]) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(messages)?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = self.sign(&payload);
        Ok(format!("{payload}.{signature}"))
    }

    /// Verify and deserialize a queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the cookie is malformed, the signature does not
    /// match, or the payload does not decode.
    pub fn decode(&self, value: &str) -> Result<Vec<FlashMessage>, FlashCookieError> {
        let (payload, signature) = value.rsplit_once('.').ok_or(FlashCookieError::Malformed)?;
        if !self.verify(payload, signature) {
            return Err(FlashCookieError::BadSignature);
        }
        let json = URL_SAFE_NO_PAD.decode(payload)?;
        Ok(serde_json::from_slice(&json)?)
    }
}

impl fmt::Debug for FlashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FlashKey(..)")
    }
}

/// Per-request view of the flash queue.
#[derive(Debug, Clone)]
pub struct FlashJar {
    key: FlashKey,
    policy: CookiePolicy,
    messages: Vec<FlashMessage>,
    had_cookie: bool,
    dirty: bool,
}

impl FlashJar {
    /// Load the queue from request headers. Never fails.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, key: FlashKey, policy: CookiePolicy) -> Self {
        let raw = read_cookie(headers, FLASH_COOKIE_NAME);
        let had_cookie = raw.is_some();
        let mut rejected = false;
        let messages = raw.map_or_else(Vec::new, |value| {
            key.decode(&value).unwrap_or_else(|err| {
                tracing::error!(error = %err, "Could not read flash messages, discarding them");
                rejected = true;
                Vec::new()
            })
        });

        Self {
            key,
            policy,
            messages,
            had_cookie,
            // A rejected cookie is cleared on the way out
            dirty: rejected,
        }
    }

    /// Queue a message for the next render.
    pub fn push(&mut self, level: FlashLevel, text: impl Into<String>) {
        self.push_message(FlashMessage::new(level, text));
    }

    /// Queue an already built message.
    pub fn push_message(&mut self, message: FlashMessage) {
        tracing::debug!(level = %message.level, text = %message.text, "Queued flash message");
        self.messages.push(message);
        self.dirty = true;
    }

    /// Builder form of [`FlashJar::push_message`].
    #[must_use]
    pub fn with(mut self, message: FlashMessage) -> Self {
        self.push_message(message);
        self
    }

    /// Take every queued message in insertion order. The cookie is
    /// cleared when this jar is turned into the response.
    pub fn drain_all(&mut self) -> Vec<FlashMessage> {
        if !self.messages.is_empty() {
            self.dirty = true;
        }
        std::mem::take(&mut self.messages)
    }

    /// Messages currently queued
    #[must_use]
    pub fn messages(&self) -> &[FlashMessage] {
        &self.messages
    }

    /// Whether nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn into_cookie(self) -> Option<SetCookie> {
        if !self.dirty {
            return None;
        }

        if self.messages.is_empty() {
            return self
                .had_cookie
                .then(|| SetCookie::removal(FLASH_COOKIE_NAME, self.policy));
        }

        match self.key.encode(&self.messages) {
            Ok(value) => Some(SetCookie::new(FLASH_COOKIE_NAME, value, self.policy).http_only()),
            Err(err) => {
                tracing::error!(error = %err, "Could not save flash messages");
                None
            }
        }
    }
}

impl<S> FromRequestParts<S> for FlashJar
where
    S: Send + Sync,
    FlashKey: FromRef<S>,
    CookiePolicy: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(
            &parts.headers,
            FlashKey::from_ref(state),
            CookiePolicy::from_ref(state),
        ))
    }
}

impl IntoResponseParts for FlashJar {
    type Error = Infallible;

    fn into_response_parts(self, res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        let mut cookies = crate::cookies::Cookies::new();
        if let Some(cookie) = self.into_cookie() {
            cookies.add(cookie);
        }
        cookies.into_response_parts(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header::COOKIE, HeaderValue};

    fn key() -> FlashKey {
        FlashKey::new(b"test-cookie-key").unwrap()
    }

    fn headers_with_flash(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("{FLASH_COOKIE_NAME}={value}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_level_serializes_lowercase() {
        let json = serde_json::to_string(&FlashMessage::danger("nope")).unwrap();
        assert_eq!(json, r#"{"level":"danger","text":"nope"}"#);
    }

    #[test]
    fn test_encode_decode_keeps_order() {
        let messages = vec![
            FlashMessage::warning("first"),
            FlashMessage::success("second"),
            FlashMessage::info("third"),
        ];
        let encoded = key().encode(&messages).unwrap();
        assert_eq!(key().decode(&encoded).unwrap(), messages);
    }

    #[test]
    fn test_tampered_cookie_is_rejected() {
        let encoded = key().encode(&[FlashMessage::info("hello")]).unwrap();
        let (payload, signature) = encoded.rsplit_once('.').unwrap();
        let forged_payload = URL_SAFE_NO_PAD.encode(br#"[{"level":"success","text":"forged"}]"#);
        let forged = format!("{forged_payload}.{signature}");
        assert!(matches!(key().decode(&forged), Err(FlashCookieError::BadSignature)));
        assert!(key().decode(payload).is_err());
    }

    #[test]
    fn test_other_key_is_rejected() {
        let encoded = key().encode(&[FlashMessage::info("hello")]).unwrap();
        let other = FlashKey::new(b"another-key").unwrap();
        assert!(matches!(other.decode(&encoded), Err(FlashCookieError::BadSignature)));
    }

    #[test]
    fn test_jar_fails_open_on_garbage() {
        let jar = FlashJar::from_headers(&headers_with_flash("garbage"), key(), CookiePolicy::default());
        assert!(jar.is_empty());
        // The bad cookie gets cleared
        let cookie = jar.into_cookie().unwrap();
        assert!(cookie.to_header_value().contains("Max-Age=0"));
    }

    #[test]
    fn test_drain_all_clears_queue() {
        let encoded = key()
            .encode(&[FlashMessage::danger("a"), FlashMessage::info("b")])
            .unwrap();
        let mut jar = FlashJar::from_headers(&headers_with_flash(&encoded), key(), CookiePolicy::default());

        let drained = jar.drain_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].text, "a");
        assert_eq!(drained[1].text, "b");
        assert!(jar.drain_all().is_empty());

        let cookie = jar.into_cookie().unwrap();
        assert_eq!(cookie.value(), "");
    }

    #[test]
    fn test_push_writes_signed_cookie() {
        let mut jar = FlashJar::from_headers(&HeaderMap::new(), key(), CookiePolicy::default());
        jar.push(FlashLevel::Danger, "You have to log in first");

        let cookie = jar.into_cookie().unwrap();
        let messages = key().decode(cookie.value()).unwrap();
        assert_eq!(messages, vec![FlashMessage::danger("You have to log in first")]);
    }

    #[test]
    fn test_untouched_jar_writes_nothing() {
        let jar = FlashJar::from_headers(&HeaderMap::new(), key(), CookiePolicy::default());
        assert!(jar.into_cookie().is_none());
    }
}
