//! Atom 0.3 / Echo / PIE parsing.
//!
//! The pre-standard Atom drafts encoded content with a `mode` attribute
//! (escaped, xml, base64, multipart/alternative) instead of the 1.0 `type`
//! system, used `tagline` for the description and both `modified` and
//! `updated` for the feed time. The 1.0 driver claims its namespace first,
//! so this one accepts any remaining `feed` root.

use chrono::Utc;

use super::ns::atom_registry;
use super::{DESC_CONTENT, DESC_PLAIN, ItemScratch, ParserContext};
use crate::date::parse_iso8601;
use crate::item::Item;
use crate::uri;
use crate::xml::{Element, escape_text, unhtmlize, xhtml_extract};

pub fn check(root: &Element) -> bool {
    root.name == "feed"
}

pub fn parse(ctx: &mut ParserContext<'_>, root: &Element) {
    if root.name != "feed" {
        ctx.errors
            .push("<p>Could not find Atom/Echo/PIE header!</p>".to_string());
        return;
    }

    ctx.feed.time = Utc::now().timestamp();
    let registry = atom_registry();

    for el in root.elements() {
        if let Some(handler) = registry.resolve(el) {
            handler.parse_channel_tag(ctx, el);
            continue;
        }

        match el.name.as_str() {
            "title" => {
                if let Some(title) = content_construct(el) {
                    ctx.feed.title = Some(unhtmlize(&title));
                }
            }
            "link" => {
                if let Some(href) = el.attr("href") {
                    // 0.3 link: rel, type and href attribute.
                    if el.attr("rel").is_none_or(|rel| rel == "alternate") {
                        ctx.feed.set_html_url(ctx.source, href);
                    }
                } else if let Some(link) = el.nonempty_text() {
                    // 0.2 link: the element content is the link.
                    ctx.feed.set_html_url(ctx.source, &link);
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
            "tagline" => {
                if let Some(tagline) = content_construct(el) {
                    ctx.feed.description = Some(tagline.clone());
                    ctx.feed.metadata.set("description", tagline);
                }
            }
            "generator" => {
                if let Some(mut generator) = el.nonempty_text().map(|t| unhtmlize(&t)) {
                    if let Some(version) = el.attr("version") {
                        generator = format!("{generator} {version}");
                    }
                    ctx.feed.generator = Some(generator.clone());
                    if let Some(url) = el.attr("url") {
                        generator = format!(
                            "<a href=\"{}\">{}</a>",
                            uri::sanitize(url),
                            escape_text(&generator)
                        );
                    }
                    ctx.feed.metadata.append("feedgenerator", generator);
                }
            }
            "copyright" => {
                if let Some(copyright) = content_construct(el) {
                    ctx.feed.metadata.append("copyright", copyright);
                }
            }
            "modified" | "updated" => {
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
        if let Some(handler) = registry.resolve(el) {
            handler.parse_item_tag(ctx, &mut item, &mut scratch, el);
            continue;
        }

        match el.name.as_str() {
            "title" => {
                if let Some(title) = content_construct(el) {
                    item.title = Some(unhtmlize(&title));
                }
            }
            "link" => {
                if let Some(href) = el.attr("href") {
                    if el.attr("rel").is_none_or(|rel| rel == "alternate") {
                        item.source = Some(uri::sanitize(href));
                    }
                } else if let Some(link) = el.nonempty_text() {
                    item.source = Some(uri::sanitize(&link));
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
            "id" => {
                if let Some(id) = el.nonempty_text() {
                    item.source_id = Some(id);
                    item.valid_guid = true;
                }
            }
            "issued" | "modified" | "created" => {
                if let Some(value) = el.nonempty_text() {
                    // issued is the publication date and wins over the
                    // others when several appear.
                    let t = parse_iso8601(&value);
                    if t > 0 && (el.name == "issued" || item.time == 0) {
                        item.time = t;
                    }
                }
            }
            "content" => {
                if let Some(content) = content_construct(el) {
                    scratch.set_description(&mut item, DESC_CONTENT, content);
                }
            }
            "summary" => {
                // Only shown when no content description came along.
                if let Some(summary) = content_construct(el) {
                    scratch.set_description(&mut item, DESC_PLAIN, summary);
                }
            }
            "copyright" => {
                if let Some(copyright) = content_construct(el) {
                    item.metadata.append("copyright", copyright);
                }
            }
            _ => {}
        }
    }

    item.read = false;
    item
}

/// Parses an Atom 0.3 content construct.
///
/// Modes are used in the older drafts; newer documents carry a MIME type in
/// the `type` attribute instead. Base64 content is not supported.
fn content_construct(el: &Element) -> Option<String> {
    if let Some(mode) = el.attr("mode") {
        return match mode {
            "escaped" => {
                let html = xhtml_extract(el, false, None);
                (!html.is_empty()).then_some(html)
            }
            "xml" => Some(xhtml_extract(el, true, None)),
            "multipart/alternative" => el.elements().next().and_then(content_construct),
            _ => {
                tracing::warn!("unsupported atom 0.3 content mode \"{}\"", mode);
                None
            }
        };
    }

    match el.attr("type") {
        None | Some("TEXT") | Some("text") | Some("text/plain") => {
            let text = el.nonempty_text()?;
            Some(format!(
                "<div xmlns=\"http://www.w3.org/1999/xhtml\"><pre>{}</pre></div>",
                escape_text(&text)
            ))
        }
        Some("HTML") | Some("html") | Some("text/html") => {
            let html = xhtml_extract(el, false, None);
            (!html.is_empty()).then_some(html)
        }
        Some("xhtml") | Some("application/xhtml+xml") => Some(xhtml_extract(el, true, None)),
        Some(other) => {
            tracing::debug!("unknown atom 0.3 content type \"{}\"", other);
            None
        }
    }
}

/// Renders a 0.3 person construct (`name`/`email`/`url` children).
fn person_construct(el: &Element) -> Option<String> {
    let name = el.find("name").and_then(Element::nonempty_text)?;
    let mut out = escape_text(&name);
    if let Some(email) = el.find("email").and_then(Element::nonempty_text) {
        out.push_str(&format!(" - <a href=\"mailto:{0}\">{0}</a>", email));
    }
    if let Some(website) = el.find("url").and_then(Element::nonempty_text) {
        out.push_str(&format!(" (<a href=\"{}\">Website</a>)", uri::sanitize(&website)));
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse_feed;

    const PIE: &str = r#"<?xml version="1.0"?>
<feed version="0.3" xmlns="http://purl.org/atom/ns#">
  <title>Old Atom</title>
  <tagline mode="escaped">&lt;p&gt;about&lt;/p&gt;</tagline>
  <link rel="alternate" type="text/html" href="https://example.com/"/>
  <modified>2014-11-05T18:00:00Z</modified>
  <entry>
    <title>One</title>
    <link rel="alternate" href="https://example.com/1"/>
    <id>tag:example.com,2014:1</id>
    <issued>2014-11-05T12:00:00Z</issued>
    <content mode="escaped" type="text/html">&lt;p&gt;body&lt;/p&gt;</content>
  </entry>
</feed>"#;

    #[test]
    fn test_pie_feed() {
        let result = parse_feed("n1", "https://example.com/feed", PIE.as_bytes());
        assert_eq!(result.format, Some("pie"));
        assert_eq!(result.feed.title.as_deref(), Some("Old Atom"));
        assert_eq!(result.feed.description.as_deref(), Some("<p>about</p>"));
        assert_eq!(result.feed.time, 1415210400);

        let item = &result.items[0];
        assert_eq!(item.title.as_deref(), Some("One"));
        assert_eq!(item.source.as_deref(), Some("https://example.com/1"));
        assert!(item.valid_guid);
        assert_eq!(item.description.as_deref(), Some("<p>body</p>"));
        assert_eq!(item.time, 1415188800);
    }

    #[test]
    fn test_updated_also_sets_feed_time() {
        let pie = r#"<feed version="0.3"><title>t</title>
<updated>2014-11-05T18:00:00Z</updated></feed>"#;
        let result = parse_feed("n1", "https://example.com/feed", pie.as_bytes());
        assert_eq!(result.feed.time, 1415210400);
    }

    #[test]
    fn test_multipart_alternative() {
        let el = crate::xml::parse_document(
            br#"<content mode="multipart/alternative">
                  <content mode="escaped">&lt;p&gt;x&lt;/p&gt;</content>
                </content>"#,
        )
        .root
        .unwrap();
        assert_eq!(content_construct(&el).as_deref(), Some("<p>x</p>"));
    }
}
