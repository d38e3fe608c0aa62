//! The item model: a single article with status flags and metadata.

use sha2::{Digest, Sha256};

use crate::metadata::MetadataList;

/// A single article belonging to one subscription node.
///
/// The numeric `id` is assigned by the item store on first insert and never
/// changes afterwards. `source_id` carries the feed-supplied GUID;
/// `valid_guid` is only true when the feed supplied it explicitly — a
/// synthetic hash id does not count as a valid GUID for matching purposes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Item {
    /// Store-assigned numeric id; 0 until first insert.
    pub id: i64,
    /// Owning node.
    pub node_id: String,
    /// Plain-text, entity-decoded title.
    pub title: Option<String>,
    /// Source URL of the article.
    pub source: Option<String>,
    /// GUID from the feed, or a synthetic hash when the feed provided none.
    pub source_id: Option<String>,
    /// True iff the feed supplied the GUID explicitly.
    pub valid_guid: bool,
    /// Description HTML, decoded to canonical form.
    pub description: Option<String>,
    /// UNIX timestamp; 0 means unknown and inherits the feed time.
    pub time: i64,
    pub read: bool,
    pub new: bool,
    pub updated: bool,
    pub popup: bool,
    pub flagged: bool,
    /// URL/title of the feed an item was quoted from.
    pub real_source_url: Option<String>,
    pub real_source_title: Option<String>,
    pub has_enclosure: bool,
    pub metadata: MetadataList,
}

impl Item {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            new: true,
            ..Self::default()
        }
    }

    /// Post-parse identity fixup: an item with neither GUID nor source URL
    /// gets a synthetic id hashed from title, time and a description prefix,
    /// so repeated parses of the same document produce a stable identity.
    pub fn ensure_identity(&mut self) {
        if self.source_id.is_some() || self.source.is_some() {
            return;
        }

        let mut hasher = Sha256::new();
        hasher.update(self.title.as_deref().unwrap_or("").as_bytes());
        hasher.update(self.time.to_be_bytes());
        let description = self.description.as_deref().unwrap_or("");
        let prefix_end = description
            .char_indices()
            .nth(128)
            .map(|(i, _)| i)
            .unwrap_or(description.len());
        hasher.update(description[..prefix_end].as_bytes());

        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.source_id = Some(hex);
        // A synthetic id is not a feed-supplied GUID.
        self.valid_guid = false;
    }

    /// Items without their own timestamp inherit the feed's.
    pub fn inherit_time(&mut self, feed_time: i64) {
        if self.time == 0 && feed_time > 0 {
            self.time = feed_time;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_id_is_stable() {
        let mut a = Item::new("n1");
        a.title = Some("Hello".into());
        a.time = 42;
        a.description = Some("body".into());
        let mut b = a.clone();

        a.ensure_identity();
        b.ensure_identity();
        assert_eq!(a.source_id, b.source_id);
        assert!(a.source_id.is_some());
        assert!(!a.valid_guid);
    }

    #[test]
    fn test_identity_untouched_when_guid_present() {
        let mut item = Item::new("n1");
        item.source_id = Some("guid-1".into());
        item.valid_guid = true;
        item.ensure_identity();
        assert_eq!(item.source_id.as_deref(), Some("guid-1"));
        assert!(item.valid_guid);
    }

    #[test]
    fn test_time_inheritance() {
        let mut item = Item::new("n1");
        item.inherit_time(100);
        assert_eq!(item.time, 100);
        item.inherit_time(200);
        assert_eq!(item.time, 100);
    }
}
