//! CDF (Channel Definition Format) channel parsing.
//!
//! CDF is the old Microsoft push format. Documents mix upper- and lower-case
//! tag names freely, so every lookup here is case-insensitive. Only one
//! flavor is supported: the first channel of the document.

use chrono::Utc;

use super::{DESC_PLAIN, ItemScratch, ParserContext};
use crate::date::parse_rfc822;
use crate::item::Item;
use crate::uri;
use crate::xml::{Element, unhtmlize, xhtml_extract};

pub fn check(root: &Element) -> bool {
    // RSS 1.1 also uses a `Channel` root but is namespaced and claimed by
    // the RSS driver first.
    root.name.eq_ignore_ascii_case("channel")
}

pub fn parse(ctx: &mut ParserContext<'_>, root: &Element) {
    ctx.feed.time = Utc::now().timestamp();

    // Some CDF files wrap the real channel in an outer one.
    let channel = root
        .elements()
        .find(|el| el.name.eq_ignore_ascii_case("channel"))
        .unwrap_or(root);

    if let Some(href) = channel.attr_ci("href") {
        ctx.feed.set_html_url(ctx.source, href);
    }

    for el in channel.elements() {
        match el.name.to_ascii_lowercase().as_str() {
            "title" => {
                if let Some(title) = el.nonempty_text() {
                    ctx.feed.title = Some(unhtmlize(&title));
                }
            }
            "abstract" => {
                let html = xhtml_extract(el, false, None);
                if !html.is_empty() {
                    ctx.feed.description = Some(html.clone());
                    ctx.feed.metadata.set("description", html);
                }
            }
            "logo" => {
                // Save the first link to a channel image.
                if ctx.feed.image_url.is_none() {
                    if let Some(href) = el.attr_ci("href") {
                        ctx.feed.image_url = Some(uri::sanitize(href));
                    }
                }
            }
            "a" => {
                if ctx.feed.html_url.is_none() {
                    if let Some(href) = el.attr_ci("href") {
                        ctx.feed.set_html_url(ctx.source, href);
                    }
                }
            }
            "pubdate" | "lastmod" => {
                if let Some(value) = el.nonempty_text() {
                    let t = parse_rfc822(&value);
                    if t > 0 {
                        ctx.feed.time = t;
                    }
                }
            }
            "item" => {
                let item = parse_cdf_item(ctx, el);
                ctx.items.push(item);
            }
            _ => {}
        }
    }
}

fn parse_cdf_item(ctx: &mut ParserContext<'_>, el: &Element) -> Item {
    let mut item = Item::new(ctx.node_id);
    let mut scratch = ItemScratch::new();

    // The item link lives in an HREF attribute on the item itself.
    if let Some(href) = el.attr_ci("href") {
        item.source = Some(uri::sanitize(href));
    }

    for child in el.elements() {
        match child.name.to_ascii_lowercase().as_str() {
            "title" => {
                if let Some(title) = child.nonempty_text() {
                    item.title = Some(unhtmlize(&title));
                }
            }
            "abstract" => {
                let html = xhtml_extract(child, false, None);
                scratch.set_description(&mut item, DESC_PLAIN, html);
            }
            "a" => {
                if item.source.is_none() {
                    if let Some(href) = child.attr_ci("href") {
                        item.source = Some(uri::sanitize(href));
                    }
                }
            }
            "author" => {
                if let Some(author) = child.nonempty_text() {
                    item.metadata.append("author", author);
                }
            }
            "pubdate" | "lastmod" => {
                if let Some(value) = child.nonempty_text() {
                    let t = parse_rfc822(&value);
                    if t > 0 {
                        item.time = t;
                    }
                }
            }
            _ => {}
        }
    }

    item.read = false;
    item
}

#[cfg(test)]
mod tests {
    use crate::parsing::parse_feed;

    const CDF: &str = r#"<?XML version="1.0"?>
<CHANNEL HREF="https://example.com/">
  <TITLE>CDF Example</TITLE>
  <ABSTRACT>About the channel</ABSTRACT>
  <LOGO HREF="https://example.com/logo.gif" STYLE="IMAGE"/>
  <ITEM HREF="https://example.com/1">
    <TITLE>First</TITLE>
    <ABSTRACT>Body one</ABSTRACT>
  </ITEM>
  <item href="https://example.com/2">
    <title>second</title>
  </item>
</CHANNEL>"#;

    #[test]
    fn test_cdf_channel() {
        let result = parse_feed("n1", "https://example.com/feed.cdf", CDF.as_bytes());
        assert_eq!(result.format, Some("cdf"));
        assert_eq!(result.feed.title.as_deref(), Some("CDF Example"));
        assert_eq!(result.feed.html_url.as_deref(), Some("https://example.com/"));
        assert_eq!(
            result.feed.image_url.as_deref(),
            Some("https://example.com/logo.gif")
        );
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[0].title.as_deref(), Some("First"));
        assert_eq!(result.items[0].source.as_deref(), Some("https://example.com/1"));
        assert_eq!(result.items[0].description.as_deref(), Some("Body one"));
        assert_eq!(result.items[1].title.as_deref(), Some("second"));
    }
}
