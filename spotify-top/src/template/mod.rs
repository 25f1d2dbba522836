//! Askama page rendering
//!
//! Pages are looked up by name in a [`TemplateRegistry`]. Every page gets
//! the same [`PageData`]; which parts it shows is up to the template.

use crate::error::TemplateError;
use crate::flash::FlashMessage;
use crate::settings::{Settings, TimeRange};
use crate::spotify::{Artist, Track, User};
use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use std::collections::HashMap;

/// Name of the page rendered for unknown template names
pub const NOT_FOUND_TEMPLATE: &str = "404";

/// Everything a page may display.
#[derive(Debug, Clone, Default)]
pub struct PageData {
    /// Current display settings
    pub settings: Settings,
    /// Flash messages drained for this render
    pub flashes: Vec<FlashMessage>,
    /// Whether the browser holds an authenticated state token
    pub logged_in: bool,
    /// Logged-in user, on the top pages
    pub user: Option<User>,
    /// Top artists, on `topartists`
    pub artists: Vec<Artist>,
    /// Top tracks, on `toptracks`
    pub tracks: Vec<Track>,
}

/// An entry of the time range picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeOption {
    /// Form value
    pub value: &'static str,
    /// Human label
    pub label: &'static str,
    /// Whether this is the current setting
    pub selected: bool,
}

impl PageData {
    /// Data for a page with settings and flashes only.
    #[must_use]
    pub fn new(settings: Settings, flashes: Vec<FlashMessage>) -> Self {
        Self {
            settings,
            flashes,
            ..Self::default()
        }
    }

    /// Picker entries with the current range selected.
    #[must_use]
    pub fn range_options(&self) -> Vec<RangeOption> {
        TimeRange::ALL
            .into_iter()
            .map(|range| RangeOption {
                value: range.as_str(),
                label: range.label(),
                selected: range == self.settings.time_range,
            })
            .collect()
    }

    /// Name to greet the user with
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.user.as_ref().map_or("", |user| user.display_name.as_str())
    }
}

#[derive(Template)]
#[template(path = "frontpage.html")]
struct FrontPage<'a> {
    page: &'a PageData,
}

#[derive(Template)]
#[template(path = "topartists.html")]
struct TopArtistsPage<'a> {
    page: &'a PageData,
}

#[derive(Template)]
#[template(path = "toptracks.html")]
struct TopTracksPage<'a> {
    page: &'a PageData,
}

#[derive(Template)]
#[template(path = "404.html")]
struct NotFoundPage<'a> {
    page: &'a PageData,
}

/// Renders one page.
pub type Renderer = fn(&PageData) -> askama::Result<String>;

fn frontpage(page: &PageData) -> askama::Result<String> {
    FrontPage { page }.render()
}

fn topartists(page: &PageData) -> askama::Result<String> {
    TopArtistsPage { page }.render()
}

fn toptracks(page: &PageData) -> askama::Result<String> {
    TopTracksPage { page }.render()
}

fn not_found(page: &PageData) -> askama::Result<String> {
    NotFoundPage { page }.render()
}

/// Named page renderers.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    renderers: HashMap<String, Renderer>,
}

impl TemplateRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the application's pages.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Duplicate`] if a page name repeats.
    pub fn with_pages() -> Result<Self, TemplateError> {
        let mut registry = Self::new();
        registry.register("frontpage", frontpage)?;
        registry.register("topartists", topartists)?;
        registry.register("toptracks", toptracks)?;
        registry.register(NOT_FOUND_TEMPLATE, not_found)?;
        Ok(registry)
    }

    /// Add a page.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Duplicate`] if `name` is taken.
    pub fn register(&mut self, name: impl Into<String>, renderer: Renderer) -> Result<(), TemplateError> {
        let name = name.into();
        if self.renderers.contains_key(&name) {
            return Err(TemplateError::Duplicate(name));
        }
        self.renderers.insert(name, renderer);
        Ok(())
    }

    /// Render `name` to a string.
    ///
    /// Returns `Ok(None)` for unknown names.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Render`] if askama fails.
    pub fn render_to_string(&self, name: &str, page: &PageData) -> Result<Option<String>, TemplateError> {
        let Some(renderer) = self.renderers.get(name) else {
            return Ok(None);
        };
        Ok(Some(renderer(page)?))
    }

    /// Render `name` as an HTML response.
    ///
    /// Unknown names render the 404 page with status 404. Render failures
    /// are logged and answered with 500.
    pub fn render(&self, name: &str, page: &PageData) -> Response {
        let (status, rendered) = match self.render_to_string(name, page) {
            Ok(Some(html)) => (StatusCode::OK, Ok(Some(html))),
            Ok(None) => {
                tracing::warn!(template = name, "Unknown template, rendering 404 page");
                (StatusCode::NOT_FOUND, self.render_to_string(NOT_FOUND_TEMPLATE, page))
            }
            Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Err(err)),
        };

        match rendered {
            Ok(Some(html)) => (status, Html(html)).into_response(),
            Ok(None) => (StatusCode::NOT_FOUND, "Not Found").into_response(),
            Err(err) => {
                tracing::error!(template = name, error = %err, "Template rendering error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Template rendering failed").into_response()
            }
        }
    }
}
