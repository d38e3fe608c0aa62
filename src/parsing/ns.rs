//! Namespace handler registry for feed extension modules.
//!
//! Formats delegate any namespaced tag to the handler claiming that
//! namespace before falling back to their native tag handling. Handlers are
//! looked up by namespace URI first and by prefix second, so documents that
//! bind a well-known prefix to the wrong URI still resolve somewhere
//! sensible. The registries are built once and read-only afterwards.

use std::collections::HashMap;
use std::sync::OnceLock;

use super::{DESC_ENCODED, ItemScratch, ParserContext, PendingFetch};
use crate::date::{format_iso8601, parse_iso8601, parse_rfc822};
use crate::item::Item;
use crate::uri;
use crate::xml::{Element, escape_text, unhtmlize, xhtml_extract};

/// One namespace extension module. Handlers are stateless; they mutate the
/// parse context, the current item, or the per-item scratch dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NsHandler {
    DublinCore,
    Content,
    Slash,
    Syn,
    Admin,
    Aggregation,
    CreativeCommons,
    BlogChannel,
    Freshmeat,
    Media,
    Photo,
    CommentApi,
    Trackback,
    GeoRss,
}

impl NsHandler {
    /// Prefixes this handler claims when the URI is unknown.
    fn prefixes(self) -> &'static [&'static str] {
        match self {
            Self::DublinCore => &["dc"],
            Self::Content => &["content"],
            Self::Slash => &["slash"],
            Self::Syn => &["syn"],
            Self::Admin => &["admin"],
            Self::Aggregation => &["ag"],
            Self::CreativeCommons => &["cc", "creativeCommons"],
            Self::BlogChannel => &["blogChannel"],
            Self::Freshmeat => &["fm"],
            Self::Media => &["media"],
            Self::Photo => &["photo", "pb"],
            Self::CommentApi => &["wfw"],
            Self::Trackback => &["trackback"],
            Self::GeoRss => &["georss"],
        }
    }

    /// Namespace URIs this handler claims.
    fn uris(self) -> &'static [&'static str] {
        match self {
            Self::DublinCore => &[
                "http://purl.org/dc/elements/1.1/",
                "http://purl.org/dc/elements/1.0/",
            ],
            Self::Content => &["http://purl.org/rss/1.0/modules/content/"],
            Self::Slash => &["http://purl.org/rss/1.0/modules/slash/"],
            Self::Syn => &["http://purl.org/rss/1.0/modules/syndication/"],
            Self::Admin => &["http://webns.net/mvcb/"],
            Self::Aggregation => &["http://purl.org/rss/1.0/modules/aggregation/"],
            Self::CreativeCommons => &[
                "http://web.resource.org/cc/",
                "http://backend.userland.com/creativeCommonsRssModule",
            ],
            Self::BlogChannel => &["http://backend.userland.com/blogChannelModule"],
            Self::Freshmeat => &["http://freshmeat.net/rss/fm/"],
            Self::Media => &["http://search.yahoo.com/mrss", "http://search.yahoo.com/mrss/"],
            Self::Photo => &[
                "http://www.pheed.com/pheed/",
                "http://snaplog.com/backend/PhotoBlog.html",
            ],
            Self::CommentApi => &[
                "http://wellformedweb.org/CommentAPI",
                "http://wellformedweb.org/CommentAPI/",
            ],
            Self::Trackback => &["http://madskills.com/public/xml/rss/module/trackback/"],
            Self::GeoRss => &["http://www.georss.org/georss"],
        }
    }

    /// Handles a channel-level tag. Tags the handler does not recognize are
    /// silently ignored; a claimed namespace never falls through to the
    /// format's native handling.
    pub fn parse_channel_tag(self, ctx: &mut ParserContext<'_>, el: &Element) {
        match self {
            Self::DublinCore => dc_parse_channel(ctx, el),
            Self::Syn => syn_parse_channel(ctx, el),
            Self::Admin => admin_parse_channel(ctx, el),
            Self::CreativeCommons => {
                if let Some(license) = cc_license(el) {
                    ctx.feed.metadata.set("license", license);
                }
            }
            Self::BlogChannel => blog_channel_parse(ctx, el),
            _ => {}
        }
    }

    /// Handles an item-level tag.
    pub fn parse_item_tag(
        self,
        ctx: &mut ParserContext<'_>,
        item: &mut Item,
        scratch: &mut ItemScratch,
        el: &Element,
    ) {
        match self {
            Self::DublinCore => dc_parse_item(item, el),
            Self::Content => content_parse_item(item, scratch, el),
            Self::Slash => slash_parse_item(item, scratch, el),
            Self::Aggregation => ag_parse_item(item, scratch, el),
            Self::CreativeCommons => {
                if let Some(license) = cc_license(el) {
                    item.metadata.set("license", license);
                }
            }
            Self::Freshmeat => {
                if el.name == "screenshot_url" {
                    if let Some(url) = el.nonempty_text() {
                        item.metadata.set("fmScreenshot", url);
                    }
                }
            }
            Self::Media => media_parse_item(ctx, item, el),
            Self::Photo => photo_parse_item(item, scratch, el),
            Self::CommentApi => {
                if el.name == "commentRss" || el.name == "commentRSS" {
                    if let Some(url) = el.nonempty_text() {
                        item.metadata.set("commentFeedUri", url);
                    }
                }
            }
            Self::Trackback => {
                if el.name == "about" {
                    if let Some(url) = el.attr("resource").map(str::to_string).or_else(|| el.nonempty_text()) {
                        item.metadata.append("related", url);
                    }
                }
            }
            Self::GeoRss => {
                if el.name == "point" {
                    if let Some(point) = el.nonempty_text() {
                        item.metadata.set("point", point);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Registry mapping namespace URIs and prefixes to handlers.
pub struct NsRegistry {
    by_uri: HashMap<&'static str, NsHandler>,
    by_prefix: HashMap<&'static str, NsHandler>,
}

impl NsRegistry {
    fn with_handlers(handlers: &[NsHandler]) -> Self {
        let mut by_uri = HashMap::new();
        let mut by_prefix = HashMap::new();
        for &handler in handlers {
            for uri in handler.uris() {
                by_uri.insert(*uri, handler);
            }
            for prefix in handler.prefixes() {
                by_prefix.insert(*prefix, handler);
            }
        }
        Self { by_uri, by_prefix }
    }

    /// Resolves a handler for an element; the URI binding wins over the
    /// prefix.
    pub fn resolve(&self, el: &Element) -> Option<NsHandler> {
        if let Some(uri) = el.ns_uri.as_deref() {
            if let Some(handler) = self.by_uri.get(uri) {
                return Some(*handler);
            }
        }
        if let Some(prefix) = el.prefix.as_deref() {
            if let Some(handler) = self.by_prefix.get(prefix) {
                return Some(*handler);
            }
        }
        None
    }
}

/// The registry RSS parsing uses: everything.
pub fn rss_registry() -> &'static NsRegistry {
    static REGISTRY: OnceLock<NsRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        NsRegistry::with_handlers(&[
            NsHandler::BlogChannel,
            NsHandler::DublinCore,
            NsHandler::Slash,
            NsHandler::Content,
            NsHandler::Syn,
            NsHandler::Admin,
            NsHandler::Aggregation,
            NsHandler::CreativeCommons,
            NsHandler::Freshmeat,
            NsHandler::Media,
            NsHandler::Photo,
            NsHandler::CommentApi,
            NsHandler::Trackback,
            NsHandler::GeoRss,
        ])
    })
}

/// The registry the Atom drivers use. Atom has native equivalents for most
/// extension modules, so only the ones commonly seen in the wild are wired.
pub fn atom_registry() -> &'static NsRegistry {
    static REGISTRY: OnceLock<NsRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        NsRegistry::with_handlers(&[
            NsHandler::DublinCore,
            NsHandler::Content,
            NsHandler::Media,
            NsHandler::GeoRss,
            NsHandler::Trackback,
            NsHandler::CommentApi,
        ])
    })
}

/* Dublin Core */

const DC_TAGS: &[&str] = &[
    "title",
    "creator",
    "subject",
    "description",
    "publisher",
    "contributor",
    "date",
    "type",
    "format",
    "identifier",
    "source",
    "language",
    "coverage",
    "rights",
];

/// Mapping of DC tags to feed metadata keys; `None` means the tag has no
/// channel-level mapping.
const DC_FEED_MAP: &[Option<&str>] = &[
    None,                // title
    Some("creator"),
    Some("category"),    // subject
    Some("description"),
    Some("publisher"),
    Some("contributor"),
    None,                // date
    None,                // type
    None,                // format
    None,                // identifier
    None,                // source
    Some("language"),
    None,                // coverage
    Some("copyright"),   // rights
];

const DC_ITEM_MAP: &[Option<&str>] = &[
    None,                // title (handled specially)
    Some("creator"),
    Some("category"),    // subject
    Some("description"),
    Some("publisher"),
    Some("contributor"),
    None,                // date (handled specially)
    None,
    None,
    None,
    None,
    Some("language"),
    None,
    Some("copyright"),
];

fn dc_parse_channel(ctx: &mut ParserContext<'_>, el: &Element) {
    if let Some(i) = DC_TAGS.iter().position(|t| *t == el.name) {
        if let (Some(key), Some(value)) = (DC_FEED_MAP[i], el.nonempty_text()) {
            ctx.feed.metadata.append(key, value);
        }
    }
}

fn dc_parse_item(item: &mut Item, el: &Element) {
    // The date tag adjusts the item time, which matters for correct update
    // handling; the title overrides the simpler native one.
    if el.name == "date" {
        if let Some(date) = el.nonempty_text() {
            item.time = parse_iso8601(&date);
        }
        return;
    }
    if el.name == "title" {
        if let Some(title) = el.nonempty_text() {
            item.title = Some(unhtmlize(&title));
        }
        return;
    }

    if let Some(i) = DC_TAGS.iter().position(|t| *t == el.name) {
        if let (Some(key), Some(value)) = (DC_ITEM_MAP[i], el.nonempty_text()) {
            item.metadata.append(key, value);
        }
    }
}

/* content module */

fn content_parse_item(item: &mut Item, scratch: &mut ItemScratch, el: &Element) {
    if el.name == "encoded" {
        let html = xhtml_extract(el, false, None);
        scratch.set_description(item, DESC_ENCODED, html);
    }
}

/* slash module */

fn slash_parse_item(item: &mut Item, scratch: &mut ItemScratch, el: &Element) {
    let updated = match el.name.as_str() {
        "section" | "department" => match el.nonempty_text() {
            Some(value) => {
                let key = if el.name == "section" { "slash:section" } else { "slash:department" };
                scratch.data.insert(key, value);
                true
            }
            None => false,
        },
        _ => false,
    };

    if updated {
        let section = scratch.data.get("slash:section").map(String::as_str).unwrap_or("");
        let department = scratch.data.get("slash:department").map(String::as_str).unwrap_or("");
        item.metadata.set("slash", format!("{section},{department}"));
    }
}

/* syndication module */

fn syn_parse_channel(ctx: &mut ParserContext<'_>, el: &Element) {
    let mut period = ctx.default_update_interval.unwrap_or(0);
    let mut frequency: u32 = 1;

    match el.name.as_str() {
        "updatePeriod" => {
            if let Some(value) = el.nonempty_text() {
                period = match value.as_str() {
                    "hourly" => 60,
                    "daily" => 60 * 24,
                    "weekly" => 7 * 24 * 60,
                    "monthly" => 31 * 24 * 60,
                    "yearly" => 365 * 24 * 60,
                    _ => period,
                };
            }
        }
        "updateFrequency" => {
            if let Some(value) = el.nonempty_text() {
                frequency = value.parse().unwrap_or(1);
            }
        }
        _ => return,
    }

    if frequency != 0 {
        period /= frequency;
    }
    ctx.default_update_interval = Some(period);
}

/* admin module */

fn admin_parse_channel(ctx: &mut ParserContext<'_>, el: &Element) {
    let value = el
        .attr("resource")
        .map(str::to_string)
        .or_else(|| el.nonempty_text());
    let Some(value) = value else { return };

    match el.name.as_str() {
        "errorReportsTo" => ctx.feed.metadata.set("errorReportsTo", value),
        "generatorAgent" => ctx.feed.metadata.set("feedgeneratorUri", value),
        _ => {}
    }
}

/* aggregation module */

fn ag_parse_item(item: &mut Item, scratch: &mut ItemScratch, el: &Element) {
    match el.name.as_str() {
        "source" | "sourceURL" => {
            if let Some(value) = el.nonempty_text() {
                let key = if el.name == "source" { "ag:source" } else { "ag:sourceURL" };
                scratch.data.insert(key, value);
            }
            let source = scratch.data.get("ag:source");
            let source_url = scratch.data.get("ag:sourceURL");
            let rendered = match (source, source_url) {
                (Some(s), Some(u)) => {
                    format!("<a href=\"{}\">{}</a>", uri::sanitize(u), escape_text(s))
                }
                (Some(s), None) => escape_text(s),
                (None, Some(u)) => format!("<a href=\"{0}\">{0}</a>", uri::sanitize(u)),
                (None, None) => return,
            };
            item.metadata.set("agSource", rendered);
        }
        "timestamp" => {
            if let Some(value) = el.nonempty_text() {
                let t = match parse_iso8601(&value) {
                    0 => parse_rfc822(&value),
                    t => t,
                };
                if t != 0 {
                    item.metadata.set("agTimestamp", format_iso8601(t));
                }
            }
        }
        _ => {}
    }
}

/* creative commons */

fn cc_license(el: &Element) -> Option<String> {
    if el.name != "license" {
        return None;
    }
    let url = el
        .attr("resource")
        .map(str::to_string)
        .or_else(|| el.nonempty_text())?;
    let url = uri::sanitize(&url);
    Some(format!("<a href=\"{0}\">{0}</a>", url))
}

/* blogChannel module */

fn blog_channel_parse(ctx: &mut ParserContext<'_>, el: &Element) {
    match el.name.as_str() {
        "blogRoll" | "mySubscriptions" => {
            if let Some(url) = el.nonempty_text() {
                ctx.pending_fetches.push(PendingFetch {
                    url: uri::sanitize(&url),
                    label: el.name.clone(),
                });
            }
        }
        "blink" => {
            if let Some(url) = el.nonempty_text() {
                let url = uri::sanitize(&url);
                let html = format!("<p>BLink: <a href=\"{0}\">{0}</a></p>", url);
                ctx.feed.metadata.set("blogChannel", html);
            }
        }
        _ => {}
    }
}

/* Yahoo media */

fn media_parse_item(ctx: &mut ParserContext<'_>, item: &mut Item, el: &Element) {
    if el.name != "content" {
        return;
    }
    let Some(url) = el.attr("url") else { return };
    let url = if uri::has_scheme(url) {
        uri::sanitize(url)
    } else {
        uri::build_url(url, ctx.base_url())
    };
    item.metadata.append("enclosure", url);
    item.has_enclosure = true;
}

/* photo blogs */

fn photo_parse_item(item: &mut Item, scratch: &mut ItemScratch, el: &Element) {
    match el.name.as_str() {
        "thumbnail" | "thumb" => {
            if let Some(value) = el.nonempty_text() {
                scratch.data.insert("photo:thumbnail", value);
            }
        }
        "imgsrc" => {
            if let Some(value) = el.nonempty_text() {
                scratch.data.insert("photo:imgsrc", value);
            }
        }
        _ => return,
    }

    if let Some(thumbnail) = scratch.data.get("photo:thumbnail") {
        let imgsrc = scratch.data.get("photo:imgsrc").map(String::as_str).unwrap_or("");
        item.metadata.set("photo", format!("{thumbnail},{imgsrc}"));
    }
}
