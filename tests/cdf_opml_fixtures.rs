mod common;

use common::parse_fixture;

const CDF_FIXTURE: &str = "cdf/sample.cdf";
const OPML_FIXTURE: &str = "opml/sample.opml";

#[test]
fn test_cdf_channel_case_insensitive() {
    let result = parse_fixture(CDF_FIXTURE);
    assert_eq!(result.format, Some("cdf"));
    assert_eq!(result.feed.title.as_deref(), Some("Example CDF Channel"));
    assert_eq!(result.feed.html_url.as_deref(), Some("https://channel.example.com/"));
    assert_eq!(
        result.feed.image_url.as_deref(),
        Some("https://channel.example.com/logo.gif")
    );
    assert_eq!(result.feed.description.as_deref(), Some("A push channel of the old web"));

    // Upper- and lower-case items both parse.
    assert_eq!(result.items.len(), 2);
    assert_eq!(result.items[0].title.as_deref(), Some("Story One"));
    assert_eq!(
        result.items[0].source.as_deref(),
        Some("https://channel.example.com/story1.html")
    );
    assert_eq!(result.items[0].description.as_deref(), Some("The first story"));
    assert_eq!(result.items[1].title.as_deref(), Some("Story Two"));
}

#[test]
fn test_opml_as_feed() {
    let result = parse_fixture(OPML_FIXTURE);
    assert_eq!(result.format, Some("opml"));
    assert_eq!(result.feed.title.as_deref(), Some("Planet Blogroll"));
    assert_eq!(result.feed.time, 1415210640);

    assert_eq!(result.items.len(), 2);
    let folder = &result.items[0];
    assert_eq!(folder.title.as_deref(), Some("Rust"));
    let html = folder.description.as_deref().unwrap();
    assert!(html.contains("<ul>"), "{html}");
    assert!(
        html.contains("<a href=\"https://blog.example.com/\">Example Blog</a>"),
        "{html}"
    );
    assert!(
        html.contains("<a href=\"https://another.example.com/rss\">Another Blog</a>"),
        "{html}"
    );

    let lone = &result.items[1];
    assert_eq!(lone.source.as_deref(), Some("https://lone.example.net/"));
    assert!(lone.description.as_deref().unwrap().contains("https://lone.example.net/"));
}

#[test]
fn test_opml_items_have_identity() {
    let first = parse_fixture(OPML_FIXTURE);
    let second = parse_fixture(OPML_FIXTURE);
    for (a, b) in first.items.iter().zip(second.items.iter()) {
        // Every item is identifiable by a source URL or a synthetic id, and
        // identity is stable across parses.
        assert!(a.source_id.is_some() || a.source.is_some());
        assert_eq!(a.source_id, b.source_id);
    }
}
