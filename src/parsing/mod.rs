//! Feed format parsers and their dispatch.
//!
//! Each format module exposes `check(root)` and `parse(ctx, root)`; dispatch
//! walks the registered formats in order and hands the document to the first
//! whose check accepts the root element. Parsers never abort on a bad child:
//! they accumulate human-readable error lines in the context and produce a
//! best-effort feed.

pub mod atom;
pub mod cdf;
pub mod ns;
pub mod opml;
pub mod pie;
pub mod rss;

use std::collections::HashMap;

use crate::feed::FeedHeader;
use crate::item::Item;
use crate::xml::{Element, parse_document};

/// Description precedence ranks (§ item normalization): a description set at
/// a higher rank is not replaced by a lower one within the same parse.
pub(crate) const DESC_PLAIN: u8 = 1;
pub(crate) const DESC_CONTENT: u8 = 2;
pub(crate) const DESC_ENCODED: u8 = 3;

/// A follow-up download requested by a namespace handler (blogChannel OPML
/// inlining). The subscription lifecycle runs these through the normal
/// update queue after the parse completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFetch {
    pub url: String,
    /// Which channel element asked for it (`blogRoll`, `mySubscriptions`).
    pub label: String,
}

/// Per-parse context shared between the format driver and the namespace
/// handlers. Discarded after the parse; the caller keeps the fields it needs.
pub struct ParserContext<'a> {
    /// Owning node of the subscription being parsed.
    pub node_id: &'a str,
    /// Subscription source URL, used to resolve relative links.
    pub source: &'a str,
    pub feed: FeedHeader,
    pub items: Vec<Item>,
    /// Human-readable parse problems, appended to the subscription's
    /// parse-error buffer by the caller.
    pub errors: Vec<String>,
    /// Default update interval in minutes derived from `ttl` or
    /// `syn:updatePeriod`.
    pub default_update_interval: Option<u32>,
    pub pending_fetches: Vec<PendingFetch>,
}

impl<'a> ParserContext<'a> {
    pub fn new(node_id: &'a str, source: &'a str) -> Self {
        Self {
            node_id,
            source,
            feed: FeedHeader::new(),
            items: Vec::new(),
            errors: Vec::new(),
            default_update_interval: None,
            pending_fetches: Vec::new(),
        }
    }

    /// Base URL for resolving relative references in item content.
    pub fn base_url(&self) -> Option<&str> {
        self.feed.html_url.as_deref()
    }
}

/// Per-item scratch dictionary, discarded after each item parse. Also tracks
/// the description precedence rank reached so far.
#[derive(Default)]
pub struct ItemScratch {
    pub data: HashMap<&'static str, String>,
    desc_rank: u8,
}

impl ItemScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the item description respecting precedence:
    /// `content:encoded` > `<content>` > `<description>`/`<summary>`.
    /// Within the plain rank the first occurrence wins; the higher ranks
    /// may replace themselves.
    pub fn set_description(&mut self, item: &mut Item, rank: u8, html: String) {
        if html.is_empty() {
            return;
        }
        if rank > self.desc_rank || (rank == self.desc_rank && rank > DESC_PLAIN) {
            item.description = Some(html);
            self.desc_rank = rank;
        }
    }
}

/// Outcome of a feed parse. `format` is `None` when no registered parser
/// recognized the document; `errors` then explains why.
#[derive(Debug, Default)]
pub struct FeedParseResult {
    pub format: Option<&'static str>,
    pub feed: FeedHeader,
    pub items: Vec<Item>,
    pub errors: Vec<String>,
    pub default_update_interval: Option<u32>,
    pub pending_fetches: Vec<PendingFetch>,
}

type CheckFn = fn(&Element) -> bool;
type ParseFn = fn(&mut ParserContext<'_>, &Element);

/// Registered formats, tried in order. Atom 1.0 must precede the Atom 0.3
/// driver (both roots are named `feed`), and RSS must precede CDF (RSS 1.1
/// uses a namespaced `Channel` root).
const FORMATS: &[(&str, CheckFn, ParseFn)] = &[
    ("rss", rss::check, rss::parse),
    ("atom", atom::check, atom::parse),
    ("pie", pie::check, pie::parse),
    ("cdf", cdf::check, cdf::parse),
    ("opml", opml::check, opml::parse),
];

/// Parses raw bytes into a feed header plus items, auto-detecting the format.
pub fn parse_feed(node_id: &str, source: &str, data: &[u8]) -> FeedParseResult {
    let doc = parse_document(data);
    let mut result = FeedParseResult {
        errors: doc.errors,
        ..FeedParseResult::default()
    };

    let Some(root) = doc.root else {
        result
            .errors
            .push("<p>Could not determine feed format!</p>".to_string());
        return result;
    };

    let Some((name, _, parse)) = FORMATS.iter().find(|(_, check, _)| check(&root)).copied()
    else {
        result.errors.push(format!(
            "<p>Could not determine feed format (unknown root element <{}>)!</p>",
            root.name
        ));
        return result;
    };

    let mut ctx = ParserContext::new(node_id, source);
    parse(&mut ctx, &root);
    finalize_items(&mut ctx);

    result.format = Some(name);
    result.feed = ctx.feed;
    result.items = ctx.items;
    result.errors.append(&mut ctx.errors);
    result.default_update_interval = ctx.default_update_interval;
    result.pending_fetches = ctx.pending_fetches;
    result
}

/// Post-parse normalization applied uniformly to every item: synthetic
/// identity for items with neither GUID nor source, and feed-time
/// inheritance.
fn finalize_items(ctx: &mut ParserContext<'_>) {
    let feed_time = ctx.feed.time;
    let node_id = ctx.node_id;
    for item in &mut ctx.items {
        item.node_id = node_id.to_string();
        item.inherit_time(feed_time);
        item.ensure_identity();
    }
}
