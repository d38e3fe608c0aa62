//! Tolerant, generic RSS/RDF channel parsing.
//!
//! Covers the whole RSS family: flat RSS 0.9x/2.0 (`<rss>` root), RDF-based
//! RSS 0.9/1.0 (`<rdf:RDF>` root with items as channel siblings), and
//! RSS 1.1 (namespaced `<Channel>` root with items inside `<items>`).
//! Namespaced tags are delegated to the handler registry before any native
//! handling; plain channel/item tags map through a fixed metadata table.

use chrono::Utc;

use super::ns::{NsRegistry, rss_registry};
use super::{DESC_PLAIN, ItemScratch, ParserContext};
use crate::date::parse_rfc822;
use crate::item::Item;
use crate::uri;
use crate::xml::{Element, escape_attr_text, unhtmlize, xhtml_extract};

const RSS11_NS: &str = "http://purl.org/net/rss1.1#";

/// Plain RSS tags that map straight into metadata, shared between channel
/// and item parsing.
const RSS_TO_METADATA: &[(&str, &str)] = &[
    ("copyright", "copyright"),
    ("category", "category"),
    ("webMaster", "webmaster"),
    ("language", "language"),
    ("managingEditor", "managingEditor"),
    ("lastBuildDate", "contentUpdateDate"),
    ("generator", "feedgenerator"),
    ("publisher", "webmaster"),
    ("author", "author"),
    ("comments", "commentsUri"),
];

fn metadata_mapping(name: &str) -> Option<&'static str> {
    RSS_TO_METADATA
        .iter()
        .find(|(tag, _)| *tag == name)
        .map(|(_, key)| *key)
}

pub fn check(root: &Element) -> bool {
    if root.name == "rss" || root.name == "rdf" || root.name == "RDF" {
        return true;
    }
    // RSS 1.1
    root.name == "Channel" && root.ns_uri.as_deref() == Some(RSS11_NS)
}

pub fn parse(ctx: &mut ParserContext<'_>, root: &Element) {
    // Items without dates inherit this; a channel pubDate overrides it.
    ctx.feed.time = Utc::now().timestamp();

    let registry = rss_registry();

    // Where the channel metadata and the items live depends on the flavor.
    let (channel, item_parents): (Option<&Element>, Vec<&Element>) = match root.name.as_str() {
        "rss" => {
            let channel = root.find("channel").or_else(|| root.find("Channel"));
            (channel, channel.into_iter().collect())
        }
        "rdf" | "RDF" => {
            let channel = root.find("channel").or_else(|| root.find("Channel"));
            // RSS 1.0 keeps items (and image/textinput) as channel siblings.
            (channel, vec![root])
        }
        _ => {
            // RSS 1.1: the root is the channel; items sit inside <items>.
            (Some(root), vec![root])
        }
    };

    let Some(channel) = channel else {
        ctx.errors
            .push("<p>Could not find RDF/RSS header!</p>".to_string());
        return;
    };

    parse_channel(ctx, registry, channel);

    for parent in item_parents {
        for el in parent.elements() {
            match el.name.as_str() {
                "image" => {
                    if ctx.feed.image_url.is_none() {
                        if let Some(url) = el.find("url").and_then(Element::nonempty_text) {
                            ctx.feed.image_url = Some(uri::sanitize(&url));
                        }
                    }
                }
                "textinput" | "textInput" => {
                    // There should be only one text input per channel, no
                    // matter whether we parse Userland or Netscape flavor.
                    if let Some(form) = parse_text_input(el) {
                        ctx.feed.metadata.append("textInput", form);
                    }
                }
                "items" => {
                    // RSS 1.1 item container.
                    for item_el in el.elements().filter(|e| e.name == "item") {
                        let item = parse_rss_item(ctx, registry, item_el);
                        ctx.items.push(item);
                    }
                }
                "item" => {
                    let item = parse_rss_item(ctx, registry, el);
                    ctx.items.push(item);
                }
                _ => {}
            }
        }
    }
}

/// Parses the channel metadata; items are collected elsewhere.
fn parse_channel(ctx: &mut ParserContext<'_>, registry: &NsRegistry, channel: &Element) {
    for el in channel.elements() {
        if let Some(handler) = registry.resolve(el) {
            handler.parse_channel_tag(ctx, el);
            continue;
        }
        // A namespaced tag nobody claims falls through to the native
        // handling below, deliberately.

        if let Some(key) = metadata_mapping(&el.name) {
            if let Some(value) = el.nonempty_text() {
                if el.name == "generator" {
                    ctx.feed.generator = Some(unhtmlize(&value));
                }
                ctx.feed.metadata.append(key, value);
            }
            continue;
        }

        match el.name.as_str() {
            "pubDate" => {
                if let Some(value) = el.nonempty_text() {
                    ctx.feed.metadata.append("pubDate", value.clone());
                    let t = parse_rfc822(&value);
                    if t > 0 {
                        ctx.feed.time = t;
                    }
                }
            }
            "ttl" => {
                if let Some(value) = el.nonempty_text() {
                    if let Ok(minutes) = value.parse::<u32>() {
                        ctx.default_update_interval = Some(minutes);
                    }
                }
            }
            "title" => {
                if let Some(value) = el.nonempty_text() {
                    ctx.feed.title = Some(unhtmlize(&value));
                }
            }
            "link" => {
                if let Some(value) = el.nonempty_text() {
                    let url = unhtmlize(&value);
                    ctx.feed.set_html_url(ctx.source, &url);
                }
            }
            "description" => {
                let html = xhtml_extract(el, false, None);
                if !html.is_empty() {
                    ctx.feed.description = Some(html.clone());
                    ctx.feed.metadata.set("description", html);
                }
            }
            _ => {}
        }
    }
}

/// Parses one `<item>` element into a fresh [`Item`].
pub(super) fn parse_rss_item(
    ctx: &mut ParserContext<'_>,
    registry: &NsRegistry,
    el: &Element,
) -> Item {
    let mut item = Item::new(ctx.node_id);
    let mut scratch = ItemScratch::new();

    // RDF items carry an rdf:about identity.
    if let Some(about) = el.attr("about") {
        item.source_id = Some(about.to_string());
        item.source = Some(uri::sanitize(about));
    }

    for child in el.elements() {
        if let Some(handler) = registry.resolve(child) {
            handler.parse_item_tag(ctx, &mut item, &mut scratch, child);
            continue;
        }

        if let Some(key) = metadata_mapping(&child.name) {
            if let Some(value) = child.nonempty_text() {
                item.metadata.append(key, value);
            }
            continue;
        }

        match child.name.as_str() {
            "pubDate" => {
                if let Some(value) = child.nonempty_text() {
                    item.time = parse_rfc822(&value);
                }
            }
            "enclosure" => {
                // RSS 0.93 allows multiple enclosures.
                if let Some(url) = child.attr("url") {
                    let url = if uri::has_scheme(url) {
                        uri::sanitize(url)
                    } else {
                        uri::build_url(url, ctx.base_url())
                    };
                    item.metadata.append("enclosure", url);
                    item.has_enclosure = true;
                }
            }
            "guid" => {
                if item.source_id.is_none() {
                    if let Some(guid) = child.nonempty_text() {
                        item.source_id = Some(guid.clone());
                        item.valid_guid = true;
                        // Per the RSS 2.0 spec a permalink guid doubles as
                        // the item link.
                        let permalink = child
                            .attr("isPermaLink")
                            .map(|v| v == "true")
                            .unwrap_or(true);
                        if item.source.is_none() && permalink {
                            item.source = Some(uri::sanitize(&guid));
                        }
                    }
                }
            }
            "title" => {
                if item.title.is_none() {
                    if let Some(value) = child.nonempty_text() {
                        item.title = Some(unhtmlize(&value));
                    }
                }
            }
            "link" => {
                if let Some(value) = child.nonempty_text() {
                    item.source = Some(uri::sanitize(&unhtmlize(&value)));
                }
            }
            "description" => {
                let html = xhtml_extract(child, false, None);
                scratch.set_description(&mut item, DESC_PLAIN, html);
            }
            "source" => {
                if let Some(url) = child.attr("url") {
                    item.real_source_url = Some(uri::sanitize(url));
                }
                if let Some(title) = child.nonempty_text() {
                    item.real_source_title = Some(unhtmlize(&title));
                }
            }
            _ => {}
        }
    }

    item.read = false;
    item
}

/// Renders an RSS `<textinput>` to an HTML form. All four children must be
/// present, otherwise nothing is rendered.
fn parse_text_input(el: &Element) -> Option<String> {
    let title = el.find("title").and_then(Element::nonempty_text)?;
    let description = el.find("description").and_then(Element::nonempty_text)?;
    let name = el.find("name").and_then(Element::nonempty_text)?;
    let link = el.find("link").and_then(Element::nonempty_text)?;

    let title = unhtmlize(&title);
    let description = unhtmlize(&description);

    Some(format!(
        "<p>{}<form class=\"rssform\" method=\"GET\" action=\"{}\">\
         <input class=\"rssformtext\" type=\"text\" value=\"\" name=\"{}\" />\
         <input class=\"rssformsubmit\" type=\"submit\" value=\"{}\" /></form></p>",
        description,
        escape_attr_text(&uri::sanitize(&link)),
        escape_attr_text(&name),
        escape_attr_text(&title),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse_feed;

    const FLAT_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Example &amp; Friends</title>
    <link>https://example.com/</link>
    <description>Testing feed</description>
    <language>en</language>
    <ttl>120</ttl>
    <pubDate>Wed, 05 Nov 2014 18:04:00 GMT</pubDate>
    <item>
      <title>First</title>
      <link>https://example.com/1</link>
      <guid isPermaLink="false">guid-1</guid>
      <description>&lt;p&gt;one&lt;/p&gt;</description>
      <dc:creator>Alice</dc:creator>
    </item>
    <item>
      <title>Second</title>
      <enclosure url="https://example.com/file.mp3" length="1" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_flat_rss() {
        let result = parse_feed("n1", "https://example.com/feed", FLAT_RSS.as_bytes());
        assert_eq!(result.format, Some("rss"));
        assert_eq!(result.feed.title.as_deref(), Some("Example & Friends"));
        assert_eq!(result.feed.html_url.as_deref(), Some("https://example.com/"));
        assert_eq!(result.feed.time, 1415210640);
        assert_eq!(result.default_update_interval, Some(120));
        assert_eq!(result.feed.metadata.get("language"), Some("en"));
        assert_eq!(result.items.len(), 2);

        let first = &result.items[0];
        assert_eq!(first.title.as_deref(), Some("First"));
        assert_eq!(first.source.as_deref(), Some("https://example.com/1"));
        assert_eq!(first.source_id.as_deref(), Some("guid-1"));
        assert!(first.valid_guid);
        assert_eq!(first.description.as_deref(), Some("<p>one</p>"));
        assert_eq!(first.metadata.get("creator"), Some("Alice"));
        // No own date: inherited from the channel.
        assert_eq!(first.time, 1415210640);

        let second = &result.items[1];
        assert!(second.has_enclosure);
        assert!(!second.valid_guid);
    }

    #[test]
    fn test_rdf_rss10() {
        let rdf = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns="http://purl.org/rss/1.0/">
  <channel rdf:about="https://example.com/feed">
    <title>RDF Feed</title>
    <link>https://example.com/</link>
    <description>d</description>
  </channel>
  <item rdf:about="https://example.com/a1">
    <title>Article</title>
    <link>https://example.com/a1</link>
  </item>
</rdf:RDF>"#;
        let result = parse_feed("n1", "https://example.com/feed", rdf.as_bytes());
        assert_eq!(result.format, Some("rss"));
        assert_eq!(result.feed.title.as_deref(), Some("RDF Feed"));
        assert_eq!(result.items.len(), 1);
        assert_eq!(
            result.items[0].source_id.as_deref(),
            Some("https://example.com/a1")
        );
    }

    #[test]
    fn test_permalink_guid_becomes_source() {
        let rss = r#"<rss version="2.0"><channel><title>t</title>
<item><guid>https://example.com/p/1</guid><title>x</title></item>
</channel></rss>"#;
        let result = parse_feed("n1", "https://example.com/feed", rss.as_bytes());
        assert_eq!(
            result.items[0].source.as_deref(),
            Some("https://example.com/p/1")
        );
        assert!(result.items[0].valid_guid);
    }

    #[test]
    fn test_content_encoded_overrides_description() {
        let rss = r#"<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
<channel><title>t</title>
<item>
  <description>short</description>
  <content:encoded>&lt;p&gt;full&lt;/p&gt;</content:encoded>
</item>
</channel></rss>"#;
        let result = parse_feed("n1", "https://example.com/feed", rss.as_bytes());
        assert_eq!(result.items[0].description.as_deref(), Some("<p>full</p>"));
    }

    #[test]
    fn test_bad_child_does_not_abort() {
        let rss = r#"<rss version="2.0"><channel><title>t</title>
<item><title>ok</title></item>
<item><pubDate>not a date</pubDate><title>still ok</title></item>
</channel></rss>"#;
        let result = parse_feed("n1", "https://example.com/feed", rss.as_bytes());
        assert_eq!(result.items.len(), 2);
    }

    #[test]
    fn test_text_input_form() {
        let el = crate::xml::parse_document(
            br#"<textinput><title>Go</title><description>Search</description>
                <name>q</name><link>https://example.com/s</link></textinput>"#,
        )
        .root
        .unwrap();
        let form = parse_text_input(&el).unwrap();
        assert!(form.contains("action=\"https://example.com/s\""));
        assert!(form.contains("name=\"q\""));
        assert!(form.contains("value=\"Go\""));
    }
}
