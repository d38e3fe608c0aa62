//! The feed header model.
//!
//! A `FeedHeader` is re-derived on every parse; only its title and metadata
//! are folded back into the subscription afterwards. The items parsed
//! alongside it travel separately through the merge engine.

use crate::metadata::MetadataList;

/// Channel-level data produced by a feed parse.
#[derive(Debug, Clone, Default)]
pub struct FeedHeader {
    /// Plain-text feed title.
    pub title: Option<String>,
    /// Homepage URL of the feed's site.
    pub html_url: Option<String>,
    /// Channel image/logo URL.
    pub image_url: Option<String>,
    /// Channel description HTML.
    pub description: Option<String>,
    /// Generator software string.
    pub generator: Option<String>,
    /// Last-build timestamp of the feed; items without a date inherit it.
    pub time: i64,
    pub metadata: MetadataList,
}

impl FeedHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the homepage URL, resolving it against the subscription source
    /// when relative.
    pub fn set_html_url(&mut self, source: &str, url: &str) {
        let url = url.trim();
        if url.is_empty() {
            return;
        }
        if crate::uri::has_scheme(url) {
            self.html_url = Some(crate::uri::sanitize(url));
        } else {
            self.html_url = Some(crate::uri::build_url(url, Some(source)));
        }
    }
}
