//! Metadata lists for feeds and items.
//!
//! A metadata list is an ordered sequence of (key, value) pairs. Keys come
//! from a closed registry; multi-valued keys (author, category, enclosure)
//! accumulate via [`MetadataList::append`], single-valued keys are replaced
//! wholesale via [`MetadataList::set`]. Order is preserved because render
//! order matters downstream.

/// The registry of known metadata keys. Appending a key outside this set is
/// tolerated but logged, mirroring how unregistered attribute types were
/// historically handled.
pub const KNOWN_KEYS: &[&str] = &[
    "agSource",
    "agTimestamp",
    "author",
    "blogChannel",
    "category",
    "commentFeedUri",
    "commentsUri",
    "contentUpdateDate",
    "contributor",
    "copyright",
    "creator",
    "description",
    "enclosure",
    "errorReportsTo",
    "feedgenerator",
    "feedgeneratorUri",
    "fmScreenshot",
    "language",
    "license",
    "managingEditor",
    "photo",
    "point",
    "pubDate",
    "publisher",
    "related",
    "slash",
    "textInput",
    "webmaster",
];

/// One metadata entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataItem {
    pub key: String,
    pub value: String,
}

/// Ordered key/value metadata attached to a feed or item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataList {
    items: Vec<MetadataItem>,
}

impl MetadataList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Duplicate keys are allowed; that is how multi-valued
    /// keys like `category` and `enclosure` accumulate.
    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        if !KNOWN_KEYS.contains(&key) {
            tracing::debug!("unknown metadata key \"{}\"", key);
        }
        self.items.push(MetadataItem {
            key: key.to_string(),
            value: value.into(),
        });
    }

    /// Replaces all entries with the given key by a single entry.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.items.retain(|item| item.key != key);
        self.append(key, value);
    }

    /// First value for a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.key == key)
            .map(|item| item.value.as_str())
    }

    /// All values for a key, in insertion order.
    pub fn all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> {
        self.items
            .iter()
            .filter(move |item| item.key == key)
            .map(|item| item.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetadataItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
