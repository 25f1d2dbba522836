//! Cookie helpers
//!
//! Reading is done straight from the `Cookie` request headers and writing
//! goes through [`Cookies`], which plugs into axum responses as a
//! response part so handlers can return `(cookies, Redirect::to(..))`.

use axum::http::{
    header::{COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use axum::response::{IntoResponseParts, ResponseParts};
use serde::Deserialize;
use std::convert::Infallible;

/// SameSite cookie policy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    /// Strict same-site policy
    Strict,
    /// Lax same-site policy. Required for the OAuth callback, which
    /// arrives as a top-level cross-site navigation.
    #[default]
    Lax,
    /// No same-site restriction (requires Secure)
    None,
}

impl SameSite {
    /// Convert to cookie attribute string
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

/// Attributes shared by every cookie this application writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CookiePolicy {
    /// Only send over HTTPS
    pub secure: bool,
    /// SameSite attribute
    pub same_site: SameSite,
}

/// A single `Set-Cookie` header under construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetCookie {
    name: &'static str,
    value: String,
    max_age_secs: Option<u64>,
    http_only: bool,
    policy: CookiePolicy,
}

impl SetCookie {
    /// Session-scoped cookie with `Path=/`.
    #[must_use]
    pub fn new(name: &'static str, value: impl Into<String>, policy: CookiePolicy) -> Self {
        Self {
            name,
            value: value.into(),
            max_age_secs: None,
            http_only: false,
            policy,
        }
    }

    /// Cookie that tells the browser to drop `name` immediately.
    #[must_use]
    pub fn removal(name: &'static str, policy: CookiePolicy) -> Self {
        Self::new(name, "", policy).with_max_age(0)
    }

    /// Expire after `secs` seconds.
    #[must_use]
    pub const fn with_max_age(mut self, secs: u64) -> Self {
        self.max_age_secs = Some(secs);
        self
    }

    /// Hide from scripts.
    #[must_use]
    pub const fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    /// Cookie name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Cookie value
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Render the `Set-Cookie` header value.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        let mut cookie_value = format!(
            "{}={}; Path=/; SameSite={}",
            self.name,
            self.value,
            self.policy.same_site.as_str()
        );

        if let Some(max_age) = self.max_age_secs {
            cookie_value.push_str(&format!("; Max-Age={max_age}"));
        }

        if self.http_only {
            cookie_value.push_str("; HttpOnly");
        }

        if self.policy.secure {
            cookie_value.push_str("; Secure");
        }

        cookie_value
    }
}

/// Cookies to set on the outgoing response.
#[derive(Clone, Debug, Default)]
pub struct Cookies(Vec<SetCookie>);

impl Cookies {
    /// No cookies
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Queue a cookie. A later cookie with the same name replaces an
    /// earlier one.
    pub fn add(&mut self, cookie: SetCookie) {
        self.0.retain(|existing| existing.name != cookie.name);
        self.0.push(cookie);
    }

    /// Builder form of [`Cookies::add`].
    #[must_use]
    pub fn with(mut self, cookie: SetCookie) -> Self {
        self.add(cookie);
        self
    }

    /// Move every cookie from `other` into `self`.
    pub fn extend(&mut self, other: Self) {
        for cookie in other.0 {
            self.add(cookie);
        }
    }

    /// Look up a queued cookie by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SetCookie> {
        self.0.iter().find(|cookie| cookie.name == name)
    }

    /// Whether nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoResponseParts for Cookies {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        for cookie in self.0 {
            match HeaderValue::from_str(&cookie.to_header_value()) {
                Ok(header_value) => {
                    res.headers_mut().append(SET_COOKIE, header_value);
                }
                Err(err) => {
                    tracing::error!(cookie = cookie.name, error = %err, "Cookie value is not a valid header");
                }
            }
        }
        Ok(res)
    }
}

/// Extract a cookie value from the request headers.
///
/// Values wrapped in double quotes are unwrapped, since some clients quote
/// values containing commas.
#[must_use]
pub fn read_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(cookie_str) = header.to_str() else {
            continue;
        };

        for cookie in cookie_str.split(';') {
            let cookie = cookie.trim();
            if let Some((name, value)) = cookie.split_once('=') {
                if name.trim() == cookie_name {
                    let value = value.trim();
                    let value = value
                        .strip_prefix('"')
                        .and_then(|v| v.strip_suffix('"'))
                        .unwrap_or(value);
                    return Some(value.to_string());
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_read_cookie_among_many() {
        let headers = headers_with("a=1; settings=long_term,5; state=abc");
        assert_eq!(read_cookie(&headers, "settings").as_deref(), Some("long_term,5"));
        assert_eq!(read_cookie(&headers, "state").as_deref(), Some("abc"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_read_cookie_unquotes() {
        let headers = headers_with("settings=\"short_term,10\"");
        assert_eq!(read_cookie(&headers, "settings").as_deref(), Some("short_term,10"));
    }

    #[test]
    fn test_set_cookie_header_value() {
        let policy = CookiePolicy {
            secure: true,
            same_site: SameSite::Lax,
        };
        let value = SetCookie::new("state", "abc", policy)
            .with_max_age(3600)
            .http_only()
            .to_header_value();
        assert_eq!(value, "state=abc; Path=/; SameSite=Lax; Max-Age=3600; HttpOnly; Secure");
    }

    #[test]
    fn test_removal_cookie_expires_immediately() {
        let value = SetCookie::removal("flash-session", CookiePolicy::default()).to_header_value();
        assert!(value.starts_with("flash-session=;"));
        assert!(value.contains("Max-Age=0"));
    }

    #[test]
    fn test_cookies_replace_same_name() {
        let policy = CookiePolicy::default();
        let cookies = Cookies::new()
            .with(SetCookie::new("settings", "short_term,5", policy))
            .with(SetCookie::new("settings", "long_term,7", policy));
        assert_eq!(cookies.get("settings").map(SetCookie::value), Some("long_term,7"));
    }

    #[test]
    fn test_same_site_as_str() {
        assert_eq!(SameSite::Strict.as_str(), "Strict");
        assert_eq!(SameSite::Lax.as_str(), "Lax");
        assert_eq!(SameSite::None.as_str(), "None");
    }
}
