//! Image View Module
//!
//! What an image slot on the page shows while the cache works: a placeholder
//! while pending, the resolved source once ready, and an initials glyph when
//! there is nothing to show.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cache::ImageCache;

/// Render state of one image slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ImageView {
    Placeholder,
    /// `cached` is false when `src` is the untouched remote URL
    Ready { src: String, cached: bool },
    Fallback { glyph: String },
}

/// An image slot bound to a remote URL.
#[derive(Debug, Clone)]
pub struct CachedImage {
    url: Option<String>,
    alt: String,
    view: ImageView,
}

impl CachedImage {
    /// Starts pending, or straight in fallback when there is no URL.
    pub fn new(url: Option<&str>, alt: &str) -> Self {
        let url = url.map(str::trim).filter(|u| !u.is_empty()).map(String::from);
        let view = match url {
            Some(_) => ImageView::Placeholder,
            None => ImageView::Fallback {
                glyph: initials_glyph(alt),
            },
        };
        Self {
            url,
            alt: alt.to_string(),
            view,
        }
    }

    pub fn view(&self) -> &ImageView {
        &self.view
    }

    /// Resolves the slot through the cache. A cancelled token leaves the slot
    /// pending; the fetch behind it still completes.
    pub async fn load(&mut self, cache: &ImageCache, token: &CancellationToken) -> &ImageView {
        let Some(url) = self.url.as_deref() else {
            return &self.view;
        };
        if self.view != ImageView::Placeholder {
            return &self.view;
        }

        let src = cache.ensure_with_cancel(url, token).await;
        if !token.is_cancelled() {
            self.view = ImageView::Ready {
                cached: src != url,
                src,
            };
        }
        &self.view
    }

    /// The renderer could not display `src` either.
    pub fn mark_failed(&mut self) -> &ImageView {
        self.view = ImageView::Fallback {
            glyph: initials_glyph(&self.alt),
        };
        &self.view
    }
}

/// Up to two uppercase initials from `alt`, `?` when it has no letters.
pub fn initials_glyph(alt: &str) -> String {
    let glyph: String = alt
        .split_whitespace()
        .filter_map(|word| word.chars().find(|c| c.is_alphanumeric()))
        .take(2)
        .flat_map(char::to_uppercase)
        .collect();
    if glyph.is_empty() {
        "?".to_string()
    } else {
        glyph
    }
}
