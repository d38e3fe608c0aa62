//! OPML documents rendered as a readable feed.
//!
//! Subscribing to an OPML outline (a blogroll, a directory) turns each
//! top-level outline into an item whose description renders the outline's
//! attributes as links and any nested outlines as nested lists.

use chrono::Utc;

use super::ParserContext;
use crate::date::parse_rfc822;
use crate::item::Item;
use crate::uri;
use crate::xml::{Element, escape_text, unhtmlize};

pub fn check(root: &Element) -> bool {
    matches!(root.name.as_str(), "opml" | "oml" | "outlineDocument")
}

pub fn parse(ctx: &mut ParserContext<'_>, root: &Element) {
    ctx.feed.time = Utc::now().timestamp();

    if let Some(head) = root.find("head") {
        if let Some(title) = head.find("title").and_then(Element::nonempty_text) {
            ctx.feed.title = Some(unhtmlize(&title));
        }
        if let Some(value) = head
            .find("dateModified")
            .or_else(|| head.find("dateCreated"))
            .and_then(Element::nonempty_text)
        {
            let t = parse_rfc822(&value);
            if t > 0 {
                ctx.feed.time = t;
            }
        }
    }

    let Some(body) = root.find("body") else {
        ctx.errors
            .push("<p>Could not find OPML body!</p>".to_string());
        return;
    };

    for outline in body.elements().filter(|el| el.name == "outline") {
        let item = parse_outline(ctx, outline);
        ctx.items.push(item);
    }
}

fn parse_outline(ctx: &mut ParserContext<'_>, outline: &Element) -> Item {
    let mut item = Item::new(ctx.node_id);

    let title = outline
        .attr("title")
        .or_else(|| outline.attr("text"))
        .unwrap_or("");
    if !title.is_empty() {
        item.title = Some(unhtmlize(title));
    }

    item.source = outline
        .attr("htmlUrl")
        .or_else(|| outline.attr("url"))
        .or_else(|| outline.attr("xmlUrl"))
        .map(uri::sanitize);

    let mut html = String::new();
    render_outline_attributes(outline, &mut html);
    let children = render_outline_list(outline);
    if !children.is_empty() {
        html.push_str(&children);
    }
    if !html.is_empty() {
        item.description = Some(html);
    }

    item.read = false;
    item
}

/// Renders the interesting outline attributes as an HTML fragment.
fn render_outline_attributes(outline: &Element, out: &mut String) {
    if let Some(text) = outline.attr("text").or_else(|| outline.attr("title")) {
        out.push_str("<p>");
        out.push_str(&escape_text(text));
        out.push_str("</p>");
    }
    for (attr, label) in [
        ("url", "Link"),
        ("xmlUrl", "Feed"),
        ("htmlUrl", "Website"),
    ] {
        if let Some(value) = outline.attr(attr) {
            let value = uri::sanitize(value);
            out.push_str(&format!("<p>{label}: <a href=\"{0}\">{0}</a></p>", value));
        }
    }
}

/// Renders nested outlines as a (recursively nested) bullet list. Used both
/// for OPML-as-feed items and for inlining blogChannel blogrolls.
pub fn render_outline_list(parent: &Element) -> String {
    let nested: Vec<&Element> = parent
        .elements()
        .filter(|el| el.name == "outline")
        .collect();
    if nested.is_empty() {
        return String::new();
    }

    let mut out = String::from("<ul>");
    for outline in nested {
        out.push_str("<li>");
        let text = outline
            .attr("text")
            .or_else(|| outline.attr("title"))
            .unwrap_or("");
        match outline
            .attr("htmlUrl")
            .or_else(|| outline.attr("url"))
            .or_else(|| outline.attr("xmlUrl"))
        {
            Some(url) => {
                out.push_str(&format!(
                    "<a href=\"{}\">{}</a>",
                    uri::sanitize(url),
                    escape_text(text)
                ));
            }
            None => out.push_str(&escape_text(text)),
        }
        out.push_str(&render_outline_list(outline));
        out.push_str("</li>");
    }
    out.push_str("</ul>");
    out
}

/// Renders a whole fetched OPML document to a bullet list, for the
/// blogChannel handler's staged fetches. Returns `None` when the bytes are
/// not an OPML document.
pub fn render_opml_bytes(data: &[u8]) -> Option<String> {
    let doc = crate::xml::parse_document(data);
    let root = doc.root?;
    if !check(&root) {
        return None;
    }
    let body = root.find("body")?;
    let html = render_outline_list(body);
    (!html.is_empty()).then_some(html)
}
