//! The subscription record: a fetchable source with update state.
//!
//! A subscription belongs to exactly one node of the feed list; the node
//! tree references subscriptions by their node id, never by pointer, so
//! there are no ownership cycles. The record carries everything a refresh
//! needs (source, filter, credentials, conditional-GET state) plus what the
//! last parses produced (title, metadata, parse errors, availability).

use quick_xml::Writer;
use quick_xml::events::BytesStart;

use crate::error::Result;
use crate::metadata::MetadataList;
use crate::update::{RequestOptions, UpdateState};
use crate::xml::Element;

/// Update interval value meaning "never auto-update".
pub const UPDATE_INTERVAL_NEVER: i32 = -1;
/// Update interval value meaning "use the default".
pub const UPDATE_INTERVAL_DEFAULT: i32 = 0;

/// Caller-supplied settings for a new subscription.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionOptions {
    /// Minutes between refreshes; -1 never, 0 default.
    pub update_interval: i32,
    pub filter_cmd: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub cookies: Option<String>,
    pub no_proxy: bool,
}

/// A persistent fetchable source (feed URL, local file, or `|command`).
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Stable node id referencing this subscription in the feed list.
    pub node_id: String,
    /// Feed URL, `file://` path, or pipe command.
    pub source: String,
    /// Homepage URL from the last successful parse.
    pub html_url: Option<String>,
    /// Feed title from the last successful parse.
    pub title: Option<String>,
    /// Configured refresh interval in minutes; -1 never, 0 default.
    pub update_interval: i32,
    /// Interval the feed itself requested (`ttl`, `syn:updatePeriod`);
    /// 0 when the feed never said anything.
    pub default_update_interval: u32,
    pub update_state: UpdateState,
    pub filter_cmd: Option<String>,
    pub options: RequestOptions,
    /// Cleared on permanent fetch or parse failure.
    pub available: bool,
    /// Set on HTTP auth failure; scheduled refreshes pause until the
    /// credentials change.
    pub auth_failed: bool,
    /// Free-text accumulated parse problems of the last refresh.
    pub parse_errors: String,
    pub metadata: MetadataList,
    /// At most one refresh is in flight per node.
    pub updating: bool,
}

impl Subscription {
    pub fn new(node_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            source: source.into(),
            html_url: None,
            title: None,
            update_interval: UPDATE_INTERVAL_DEFAULT,
            default_update_interval: 0,
            update_state: UpdateState::default(),
            filter_cmd: None,
            options: RequestOptions::default(),
            available: true,
            auth_failed: false,
            parse_errors: String::new(),
            metadata: MetadataList::new(),
            updating: false,
        }
    }

    pub fn with_options(mut self, options: &SubscriptionOptions) -> Self {
        self.update_interval = options.update_interval;
        self.filter_cmd = options.filter_cmd.clone();
        self.options.username = options.username.clone();
        self.options.password = options.password.clone();
        self.options.no_proxy = options.no_proxy;
        self.update_state.cookies = options.cookies.clone();
        self
    }

    /// The effective refresh interval in minutes: the configured value, the
    /// feed's own wish, or the global default. `None` means never.
    pub fn effective_interval(&self, config_default: u32) -> Option<u32> {
        match self.update_interval {
            UPDATE_INTERVAL_NEVER => None,
            UPDATE_INTERVAL_DEFAULT => {
                if self.default_update_interval > 0 {
                    Some(self.default_update_interval)
                } else {
                    Some(config_default)
                }
            }
            minutes => Some(minutes as u32),
        }
    }

    /// Whether a scheduled refresh is due at `now` (UNIX seconds).
    pub fn poll_due(&self, now: i64, config_default: u32) -> bool {
        if self.updating || self.auth_failed {
            return false;
        }
        let Some(minutes) = self.effective_interval(config_default) else {
            return false;
        };
        self.update_state.last_poll + i64::from(minutes) * 60 <= now
    }

    /// Reads a subscription back from an OPML outline element.
    pub fn from_outline(el: &Element) -> Option<Self> {
        let source = el.attr("xmlUrl")?.to_string();
        let node_id = el
            .attr("id")
            .map(str::to_string)
            .unwrap_or_else(crate::core::generate_node_id);

        let mut subscription = Subscription::new(node_id, source);
        subscription.title = el.attr("title").or_else(|| el.attr("text")).map(str::to_string);
        subscription.html_url = el.attr("htmlUrl").map(str::to_string);
        subscription.update_interval = el
            .attr("updateInterval")
            .and_then(|v| v.parse().ok())
            .unwrap_or(UPDATE_INTERVAL_DEFAULT);
        subscription.filter_cmd = el.attr("filtercmd").map(str::to_string);
        subscription.update_state = UpdateState::import(el);
        Some(subscription)
    }

    /// Writes this subscription as an OPML outline element, including the
    /// conditional-GET state attributes.
    pub fn write_outline<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut outline = BytesStart::new("outline");
        let title = self.title.as_deref().unwrap_or(&self.source);
        outline.push_attribute(("text", title));
        outline.push_attribute(("title", title));
        outline.push_attribute(("type", "rss"));
        outline.push_attribute(("id", self.node_id.as_str()));
        outline.push_attribute(("xmlUrl", self.source.as_str()));
        if let Some(html_url) = &self.html_url {
            outline.push_attribute(("htmlUrl", html_url.as_str()));
        }
        if self.update_interval != UPDATE_INTERVAL_DEFAULT {
            outline.push_attribute(("updateInterval", self.update_interval.to_string().as_str()));
        }
        if let Some(filter) = &self.filter_cmd {
            outline.push_attribute(("filtercmd", filter.as_str()));
        }
        for (name, value) in self.update_state.export() {
            outline.push_attribute((name, value.as_str()));
        }
        writer
            .write_event(quick_xml::events::Event::Empty(outline))
            .map_err(|e| crate::error::SyndError::InvalidResponse(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_interval() {
        let mut sub = Subscription::new("n1", "https://example.com/feed");
        assert_eq!(sub.effective_interval(60), Some(60));
        sub.default_update_interval = 120;
        assert_eq!(sub.effective_interval(60), Some(120));
        sub.update_interval = 15;
        assert_eq!(sub.effective_interval(60), Some(15));
        sub.update_interval = UPDATE_INTERVAL_NEVER;
        assert_eq!(sub.effective_interval(60), None);
    }

    #[test]
    fn test_poll_due() {
        let mut sub = Subscription::new("n1", "https://example.com/feed");
        // Never polled: due immediately.
        assert!(sub.poll_due(1000, 60));
        sub.update_state.last_poll = 1000;
        assert!(!sub.poll_due(1000 + 60 * 59, 60));
        assert!(sub.poll_due(1000 + 60 * 60, 60));
        sub.updating = true;
        assert!(!sub.poll_due(1000 + 60 * 60, 60));
    }

    #[test]
    fn test_outline_round_trip() {
        let mut sub = Subscription::new("abc123", "https://example.com/feed");
        sub.title = Some("Example".into());
        sub.html_url = Some("https://example.com/".into());
        sub.update_interval = 30;
        sub.update_state.etag = Some("\"tag\"".into());
        sub.update_state.last_poll = 99;

        let mut buffer = Vec::new();
        let mut writer = Writer::new(&mut buffer);
        sub.write_outline(&mut writer).unwrap();

        let xml = String::from_utf8(buffer).unwrap();
        let el = crate::xml::parse_document(xml.as_bytes()).root.unwrap();
        let restored = Subscription::from_outline(&el).unwrap();
        assert_eq!(restored.node_id, "abc123");
        assert_eq!(restored.source, "https://example.com/feed");
        assert_eq!(restored.title.as_deref(), Some("Example"));
        assert_eq!(restored.update_interval, 30);
        assert_eq!(restored.update_state.etag.as_deref(), Some("\"tag\""));
        assert_eq!(restored.update_state.last_poll, 99);
    }
}
