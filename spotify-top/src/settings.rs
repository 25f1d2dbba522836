//! Display settings stored in the `settings` cookie
//!
//! The cookie value is `"<time_range>,<result_limit>"`, e.g.
//! `medium_term,20`. Decoding never fails: anything unusable is replaced by
//! the defaults and logged.

use crate::cookies::{read_cookie, CookiePolicy, Cookies, SetCookie};
use crate::flash::FlashMessage;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settings cookie name
pub const SETTINGS_COOKIE_NAME: &str = "settings";

/// Result count used when none (or garbage) is given
pub const DEFAULT_RESULT_LIMIT: u32 = 20;

/// How far back Spotify aggregates top items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange {
    /// Roughly the last four weeks
    #[serde(rename = "short_term")]
    Short,
    /// Roughly the last six months
    #[default]
    #[serde(rename = "medium_term")]
    Medium,
    /// Several years of history
    #[serde(rename = "long_term")]
    Long,
}

impl TimeRange {
    /// Every range, shortest first
    pub const ALL: [Self; 3] = [Self::Short, Self::Medium, Self::Long];

    /// Wire name used by the Spotify API, the form and the cookie
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short_term",
            Self::Medium => "medium_term",
            Self::Long => "long_term",
        }
    }

    /// Human readable label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Short => "Last 4 weeks",
            Self::Medium => "Last 6 months",
            Self::Long => "All time",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a string is not one of the three wire names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported time range: {0:?}")]
pub struct UnknownTimeRange(pub String);

impl FromStr for TimeRange {
    type Err = UnknownTimeRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|range| range.as_str() == s)
            .ok_or_else(|| UnknownTimeRange(s.to_string()))
    }
}

/// A user's display preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Aggregation window
    pub time_range: TimeRange,
    /// Number of results to fetch, always positive
    pub result_limit: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            time_range: TimeRange::default(),
            result_limit: DEFAULT_RESULT_LIMIT,
        }
    }
}

impl Settings {
    /// Serialize for the cookie.
    #[must_use]
    pub fn encode(&self) -> String {
        format!("{},{}", self.time_range, self.result_limit)
    }

    /// Parse a cookie value, substituting defaults for anything unusable.
    #[must_use]
    pub fn decode(cookie_value: &str) -> Self {
        let mut settings = Self::default();
        let fields: Vec<&str> = cookie_value.split(',').collect();

        let [time_range, result_limit] = fields.as_slice() else {
            tracing::error!(
                value = cookie_value,
                "Malformed settings cookie, using defaults"
            );
            return settings;
        };

        match time_range.parse() {
            Ok(range) => settings.time_range = range,
            Err(err) => {
                tracing::error!(error = %err, "Unsupported time range, using default");
            }
        }

        match parse_limit(result_limit) {
            Some(limit) => settings.result_limit = limit,
            None => {
                tracing::error!(
                    value = *result_limit,
                    "Could not convert result limit, using default"
                );
            }
        }

        settings
    }

    /// Build settings from the raw `timecheck` and `limit` form fields.
    ///
    /// Returns a warning for each field that had to be replaced by its
    /// default.
    #[must_use]
    pub fn from_form(timecheck: Option<&str>, limit: Option<&str>) -> (Self, Vec<FlashMessage>) {
        let mut settings = Self::default();
        let mut warnings = Vec::new();

        match timecheck.unwrap_or_default().parse() {
            Ok(range) => settings.time_range = range,
            Err(err) => {
                tracing::warn!(error = %err, "Settings form sent an unsupported time range");
                warnings.push(FlashMessage::warning(
                    "Unsupported time range, using the last 6 months",
                ));
            }
        }

        match limit.and_then(parse_limit) {
            Some(limit) => settings.result_limit = limit,
            None => {
                warnings.push(FlashMessage::warning(
                    "You have to select a valid number of results",
                ));
            }
        }

        (settings, warnings)
    }

    /// Cookie carrying these settings.
    #[must_use]
    pub fn to_cookie(&self, policy: CookiePolicy, max_age_secs: u64) -> SetCookie {
        SetCookie::new(SETTINGS_COOKIE_NAME, self.encode(), policy).with_max_age(max_age_secs)
    }

    /// Read settings from the request.
    ///
    /// On a first visit (no cookie at all) the defaults are returned along
    /// with the cookie that stores them.
    #[must_use]
    pub fn resolve(headers: &HeaderMap, policy: CookiePolicy, max_age_secs: u64) -> (Self, Cookies) {
        read_cookie(headers, SETTINGS_COOKIE_NAME).map_or_else(
            || {
                let settings = Self::default();
                let cookies = Cookies::new().with(settings.to_cookie(policy, max_age_secs));
                (settings, cookies)
            },
            |value| (Self::decode(&value), Cookies::new()),
        )
    }
}

fn parse_limit(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|limit| *limit > 0)
}
