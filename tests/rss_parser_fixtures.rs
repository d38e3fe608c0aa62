mod common;

use common::parse_fixture;

const SAMPLE_FIXTURE: &str = "rss/sample.rss";
const RDF_FIXTURE: &str = "rss/rdf.rss";

#[test]
fn test_channel_header() {
    let result = parse_fixture(SAMPLE_FIXTURE);
    assert_eq!(result.format, Some("rss"));
    let feed = &result.feed;

    assert_eq!(feed.title.as_deref(), Some("Planet Example & Co"));
    assert_eq!(feed.html_url.as_deref(), Some("https://planet.example.com/"));
    assert_eq!(feed.image_url.as_deref(), Some("https://planet.example.com/logo.png"));
    assert_eq!(feed.generator.as_deref(), Some("ExamplePress 2.1"));
    // Channel pubDate wins as the feed time.
    assert_eq!(feed.time, 1415210640);

    assert_eq!(feed.metadata.get("language"), Some("en-us"));
    assert_eq!(feed.metadata.get("copyright"), Some("Copyright 2014 Example"));
    assert_eq!(feed.metadata.get("managingEditor"), Some("editor@example.com"));
    assert_eq!(feed.metadata.get("webmaster"), Some("webmaster@example.com"));
    assert_eq!(feed.metadata.get("feedgenerator"), Some("ExamplePress 2.1"));
    assert_eq!(
        feed.metadata.get("contentUpdateDate"),
        Some("Wed, 05 Nov 2014 18:30:00 GMT")
    );
    assert_eq!(
        feed.metadata.all("category").collect::<Vec<_>>(),
        vec!["news", "tech"]
    );
    assert_eq!(
        feed.metadata.get("license"),
        Some(
            "<a href=\"https://creativecommons.org/licenses/by/4.0/\">\
             https://creativecommons.org/licenses/by/4.0/</a>"
        )
    );
}

#[test]
fn test_update_interval_from_syn_not_ttl() {
    let result = parse_fixture(SAMPLE_FIXTURE);
    // syn:updatePeriod hourly / updateFrequency 2 comes after ttl and wins.
    assert_eq!(result.default_update_interval, Some(30));
}

#[test]
fn test_text_input_rendered() {
    let result = parse_fixture(SAMPLE_FIXTURE);
    let form = result.feed.metadata.get("textInput").unwrap();
    assert!(form.contains("action=\"https://planet.example.com/search\""), "{form}");
    assert!(form.contains("name=\"q\""));
}

#[test]
fn test_first_item_namespaces() {
    let result = parse_fixture(SAMPLE_FIXTURE);
    assert_eq!(result.items.len(), 3);
    let item = &result.items[0];

    assert_eq!(item.title.as_deref(), Some("Rust 2.0 released"));
    assert_eq!(
        item.source.as_deref(),
        Some("https://planet.example.com/articles/rust-2")
    );
    assert_eq!(item.source_id.as_deref(), Some("planet-example-4711"));
    assert!(item.valid_guid);
    assert_eq!(item.time, 1415188800);

    // content:encoded wins over the plain description.
    assert_eq!(item.description.as_deref(), Some("<p>The <em>full</em> story</p>"));

    assert_eq!(item.metadata.get("creator"), Some("Alice Author"));
    assert_eq!(
        item.metadata.all("category").collect::<Vec<_>>(),
        vec!["releases", "rust", "release"]
    );
    assert_eq!(item.metadata.get("slash"), Some("frontpage,compilers"));
    assert_eq!(
        item.metadata.get("commentFeedUri"),
        Some("https://planet.example.com/articles/rust-2/comments.rss")
    );
    assert_eq!(
        item.metadata.get("commentsUri"),
        Some("https://planet.example.com/articles/rust-2#comments")
    );
    assert_eq!(item.metadata.get("point"), Some("48.2 16.37"));

    // Relative enclosure URL resolved against the channel link.
    assert!(item.has_enclosure);
    assert_eq!(
        item.metadata.get("enclosure"),
        Some("https://planet.example.com/podcast/episode1.mp3")
    );
}

#[test]
fn test_real_source_and_media() {
    let result = parse_fixture(SAMPLE_FIXTURE);
    let item = &result.items[1];
    assert_eq!(
        item.real_source_url.as_deref(),
        Some("https://other.example.org/feed")
    );
    assert_eq!(item.real_source_title.as_deref(), Some("Other Planet"));
    assert!(item.has_enclosure);
    assert_eq!(
        item.metadata.get("enclosure"),
        Some("https://cdn.example.com/clip.mp4")
    );
    // +0100 notation parses to the same instant as GMT would.
    assert_eq!(item.time, 1415089800);
}

#[test]
fn test_item_without_identity_gets_synthetic_guid() {
    let result = parse_fixture(SAMPLE_FIXTURE);
    let item = &result.items[2];
    assert!(item.source.is_none());
    let guid = item.source_id.as_deref().unwrap();
    assert_eq!(guid.len(), 64);
    assert!(!item.valid_guid);
    // No own date: inherits the channel time.
    assert_eq!(item.time, 1415210640);

    // The synthetic id is stable across parses.
    let again = parse_fixture(SAMPLE_FIXTURE);
    assert_eq!(again.items[2].source_id.as_deref(), Some(guid));
}

#[test]
fn test_rdf_flavor() {
    let result = parse_fixture(RDF_FIXTURE);
    assert_eq!(result.format, Some("rss"));
    assert_eq!(result.feed.title.as_deref(), Some("RDF Example"));
    assert_eq!(result.feed.metadata.get("language"), Some("de"));
    assert_eq!(result.feed.metadata.get("copyright"), Some("CC-BY"));
    assert_eq!(result.default_update_interval, Some(1440));

    assert_eq!(result.items.len(), 2);
    let item = &result.items[0];
    assert_eq!(item.title.as_deref(), Some("Eins"));
    assert_eq!(item.source_id.as_deref(), Some("https://rdf.example.net/one"));
    assert_eq!(item.metadata.get("creator"), Some("Bob"));
    // dc:date is ISO 8601.
    assert_eq!(item.time, 1415181600);
}

#[test]
fn test_parse_same_bytes_twice_is_deterministic() {
    let first = parse_fixture(SAMPLE_FIXTURE);
    let second = parse_fixture(SAMPLE_FIXTURE);
    assert_eq!(first.items.len(), second.items.len());
    for (a, b) in first.items.iter().zip(second.items.iter()) {
        assert_eq!(a.source_id, b.source_id);
        assert_eq!(a.title, b.title);
        assert_eq!(a.description, b.description);
    }
}
