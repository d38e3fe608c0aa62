//! Atom 1.0 (RFC 4287) parsing.
//!
//! Handles text constructs (`type` of text/html/xhtml), external content via
//! `<content src>`, person constructs rendered to a display string, and link
//! relations. Tags outside the Atom namespace go through the namespace
//! handler registry; unclaimed foreign tags are ignored rather than treated
//! as errors.

use chrono::Utc;

use super::ns::atom_registry;
use super::{DESC_CONTENT, DESC_PLAIN, ItemScratch, ParserContext};
use crate::date::parse_iso8601;
use crate::item::Item;
use crate::uri;
use crate::xml::{Element, escape_text, unhtmlize, xhtml_extract};

pub const ATOM10_NS: &str = "http://www.w3.org/2005/Atom";

pub fn check(root: &Element) -> bool {
    root.name == "feed" && root.ns_uri.as_deref() == Some(ATOM10_NS)
}

pub fn parse(ctx: &mut ParserContext<'_>, root: &Element) {
    ctx.feed.time = Utc::now().timestamp();
    let registry = atom_registry();

    for el in root.elements() {
        if el.ns_uri.as_deref() != Some(ATOM10_NS) {
            if let Some(handler) = registry.resolve(el) {
                handler.parse_channel_tag(ctx, el);
            }
            continue;
        }

        match el.name.as_str() {
            "title" => {
                if let Some(title) = text_construct(el, false, ctx.base_url()) {
                    ctx.feed.title = Some(unhtmlize(&title));
                }
            }
            "subtitle" => {
                if let Some(subtitle) = text_construct(el, true, ctx.base_url()) {
                    ctx.feed.description = Some(subtitle.clone());
                    ctx.feed.metadata.set("description", subtitle);
                }
            }
            "link" => {
                let Some(href) = el.attr("href") else { continue };
                match el.attr("rel") {
                    None | Some("alternate") => {
                        ctx.feed.set_html_url(ctx.source, href);
                    }
                    // self/hub/search and friends carry no display value.
                    _ => {}
                }
            }
            "author" => {
                if let Some(author) = person_construct(el) {
                    ctx.feed.metadata.append("author", author);
                }
            }
            "contributor" => {
                if let Some(contributor) = person_construct(el) {
                    ctx.feed.metadata.append("contributor", contributor);
                }
            }
            "category" => {
                if let Some(term) = el.attr("term") {
                    ctx.feed.metadata.append("category", term.to_string());
                }
            }
            "generator" => {
                if let Some(mut generator) = el.nonempty_text().map(|t| unhtmlize(&t)) {
                    if let Some(version) = el.attr("version") {
                        generator = format!("{generator} {version}");
                    }
                    ctx.feed.generator = Some(generator.clone());
                    if let Some(generator_uri) = el.attr("uri") {
                        generator = format!(
                            "<a href=\"{}\">{}</a>",
                            uri::sanitize(generator_uri),
                            escape_text(&generator)
                        );
                    }
                    ctx.feed.metadata.append("feedgenerator", generator);
                }
            }
            "logo" | "icon" => {
                // Prefer the logo but accept an icon when nothing better
                // came along.
                if let Some(url) = el.nonempty_text() {
                    if el.name == "logo" || ctx.feed.image_url.is_none() {
                        ctx.feed.image_url = Some(uri::sanitize(&url));
                    }
                }
            }
            "rights" => {
                if let Some(rights) = text_construct(el, true, ctx.base_url()) {
                    ctx.feed.metadata.append("copyright", rights);
                }
            }
            "updated" => {
                if let Some(value) = el.nonempty_text() {
                    ctx.feed.metadata.append("pubDate", value.clone());
                    let t = parse_iso8601(&value);
                    if t > 0 {
                        ctx.feed.time = t;
                    }
                }
            }
            "entry" => {
                let item = parse_entry(ctx, el);
                ctx.items.push(item);
            }
            _ => {}
        }
    }
}

fn parse_entry(ctx: &mut ParserContext<'_>, entry: &Element) -> Item {
    let registry = atom_registry();
    let mut item = Item::new(ctx.node_id);
    let mut scratch = ItemScratch::new();

    for el in entry.elements() {
        if el.ns_uri.as_deref() != Some(ATOM10_NS) {
            if let Some(handler) = registry.resolve(el) {
                handler.parse_item_tag(ctx, &mut item, &mut scratch, el);
            }
            continue;
        }

        match el.name.as_str() {
            "title" => {
                if let Some(title) = text_construct(el, false, ctx.base_url()) {
                    item.title = Some(unhtmlize(&title));
                }
            }
            "link" => {
                let Some(href) = el.attr("href") else { continue };
                match el.attr("rel") {
                    None | Some("alternate") => {
                        if item.source.is_none() {
                            item.source = Some(uri::sanitize(href));
                        }
                    }
                    Some("enclosure") => {
                        let url = if uri::has_scheme(href) {
                            uri::sanitize(href)
                        } else {
                            uri::build_url(href, ctx.base_url())
                        };
                        item.metadata.append("enclosure", url);
                        item.has_enclosure = true;
                    }
                    // related/via and unknown relations must not error.
                    _ => {}
                }
            }
            "id" => {
                if let Some(id) = el.nonempty_text() {
                    item.source_id = Some(id);
                    item.valid_guid = true;
                }
            }
            "author" => {
                if let Some(author) = person_construct(el) {
                    item.metadata.append("author", author);
                }
            }
            "contributor" => {
                if let Some(contributor) = person_construct(el) {
                    item.metadata.append("contributor", contributor);
                }
            }
            "category" => {
                if let Some(term) = el.attr("term") {
                    item.metadata.append("category", term.to_string());
                }
            }
            "content" => {
                if let Some(content) = content_construct(el, ctx.base_url()) {
                    scratch.set_description(&mut item, DESC_CONTENT, content);
                }
            }
            "summary" => {
                if let Some(summary) = text_construct(el, true, ctx.base_url()) {
                    scratch.set_description(&mut item, DESC_PLAIN, summary);
                }
            }
            "published" => {
                if let Some(value) = el.nonempty_text() {
                    item.time = parse_iso8601(&value);
                }
            }
            "updated" => {
                if let Some(value) = el.nonempty_text() {
                    item.metadata.append("contentUpdateDate", value.clone());
                    if item.time == 0 {
                        item.time = parse_iso8601(&value);
                    }
                }
            }
            _ => {}
        }
    }

    item.read = false;
    item
}

/// Parses an Atom text construct. With `htmlified` the result is HTML;
/// otherwise it is plain text for the caller to post-process.
fn text_construct(el: &Element, htmlified: bool, base_url: Option<&str>) -> Option<String> {
    match el.attr("type").unwrap_or("text") {
        "html" => {
            let html = xhtml_extract(el, false, base_url);
            (!html.is_empty()).then_some(html)
        }
        "xhtml" => {
            // The spec says to only show the contents of the div tag that
            // MUST be present.
            let div = el.find("div")?;
            Some(xhtml_extract(div, htmlified, base_url))
        }
        _ => {
            let text = el.nonempty_text()?;
            if htmlified {
                Some(escape_text(&text))
            } else {
                Some(text)
            }
        }
    }
}

/// Parses an Atom content construct into description HTML.
fn content_construct(el: &Element, base_url: Option<&str>) -> Option<String> {
    if let Some(src) = el.attr("src") {
        // Out-of-line content is not inlined, just linked.
        return Some(format!(
            "<p><a href=\"{}\">View this item's contents.</a></p>",
            uri::sanitize(src)
        ));
    }

    match el.attr("type").unwrap_or("text") {
        "text" | "text/plain" => {
            let text = el.nonempty_text()?;
            Some(format!(
                "<div xmlns=\"http://www.w3.org/1999/xhtml\"><pre>{}</pre></div>",
                escape_text(&text)
            ))
        }
        "html" | "text/html" => {
            let html = xhtml_extract(el, false, base_url);
            (!html.is_empty()).then_some(html)
        }
        "xhtml" | "application/xhtml+xml" => {
            let div = el.find("div")?;
            Some(xhtml_extract(div, true, base_url))
        }
        other if other.starts_with("text/") => {
            let text = el.nonempty_text()?;
            Some(format!("<pre>{}</pre>", escape_text(&text)))
        }
        _ => {
            // base64 media and friends cannot be rendered.
            tracing::debug!("unsupported atom content type \"{}\"", el.attr("type").unwrap_or(""));
            None
        }
    }
}

/// Renders a person construct to `Name[ - <mailto link>][ (Website)]`.
fn person_construct(el: &Element) -> Option<String> {
    let name = el
        .elements()
        .find(|c| c.name == "name" && c.ns_uri.as_deref() == Some(ATOM10_NS))
        .and_then(Element::nonempty_text)?;

    let mut out = escape_text(&name);
    if let Some(email) = el
        .elements()
        .find(|c| c.name == "email" && c.ns_uri.as_deref() == Some(ATOM10_NS))
        .and_then(Element::nonempty_text)
    {
        out.push_str(&format!(" - <a href=\"mailto:{0}\">{0}</a>", email));
    }
    if let Some(website) = el
        .elements()
        .find(|c| (c.name == "uri" || c.name == "url") && c.ns_uri.as_deref() == Some(ATOM10_NS))
        .and_then(Element::nonempty_text)
    {
        out.push_str(&format!(" (<a href=\"{}\">Website</a>)", uri::sanitize(&website)));
    }
    Some(out)
}
