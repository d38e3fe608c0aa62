use std::{
    fs,
    path::{Path, PathBuf},
};

pub fn fixture_path(relative: impl AsRef<Path>) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

#[allow(dead_code)]
pub fn read_fixture(relative: impl AsRef<Path>) -> Vec<u8> {
    fs::read(fixture_path(relative)).expect("fixture file should be readable")
}

#[allow(dead_code)]
pub fn parse_fixture(relative: impl AsRef<Path>) -> syndikit::parsing::FeedParseResult {
    let data = read_fixture(relative);
    syndikit::parsing::parse_feed("test-node", "https://example.com/feed", &data)
}
