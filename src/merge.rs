//! Reconciling a freshly parsed item list against the stored itemset.
//!
//! Matching prefers explicit GUIDs, falls back to any GUID equality, and as
//! a last resort pairs items by source URL plus either an equal title or a
//! timestamp within an hour (feeds love to jitter their dates). Matched
//! items keep their numeric id and user state; unmatched existing items are
//! never deleted by a fetch, only by the separate max-items policy.

use crate::item::Item;

/// Two timestamps within this window still count as "the same time" for the
/// URL+time matching rule.
const TIME_MATCH_WINDOW: i64 = 3600;

/// Result of merging a parse against the stored itemset.
#[derive(Debug, Default)]
pub struct MergeResult {
    /// The merged itemset in source order, retained existing items last.
    pub items: Vec<Item>,
    /// How many incoming items had no stored counterpart.
    pub new_count: usize,
    /// How many matched items changed materially.
    pub updated_count: usize,
    /// Ids of matched items whose stored row needs rewriting.
    pub changed_ids: Vec<i64>,
}

/// Merges `incoming` (parse order) against `existing` (store order).
pub fn merge_itemset(existing: &[Item], incoming: Vec<Item>) -> MergeResult {
    let mut result = MergeResult::default();
    let mut matched: Vec<bool> = vec![false; existing.len()];

    for mut item in incoming {
        let matched_idx = existing
            .iter()
            .enumerate()
            .filter(|(i, _)| !matched[*i])
            .find(|(_, old)| items_match(old, &item))
            .map(|(i, _)| i);

        match matched_idx {
            Some(i) => {
                matched[i] = true;
                let old = &existing[i];

                // User state survives the refresh.
                item.id = old.id;
                item.read = old.read;
                item.flagged = old.flagged;
                item.popup = old.popup;
                item.new = false;

                let changed = materially_differs(old.title.as_deref(), item.title.as_deref())
                    || materially_differs(old.description.as_deref(), item.description.as_deref());
                item.updated = old.updated || changed;
                if changed {
                    result.updated_count += 1;
                    if old.id != 0 {
                        result.changed_ids.push(old.id);
                    }
                }
            }
            None => {
                item.new = true;
                item.read = false;
                result.new_count += 1;
            }
        }
        result.items.push(item);
    }

    // Items that vanished from the feed are retained; pruning is a separate
    // policy decision.
    for (i, old) in existing.iter().enumerate() {
        if !matched[i] {
            result.items.push(old.clone());
        }
    }

    // Source order is the primary order; ids keep it stable across
    // refreshes when positions tie.
    result
}

/// The matching rules, in order, until one applies.
fn items_match(old: &Item, new: &Item) -> bool {
    // Explicitly supplied GUIDs are authoritative.
    if old.valid_guid && new.valid_guid {
        return old.source_id == new.source_id && old.source_id.is_some();
    }

    if let (Some(old_id), Some(new_id)) = (old.source_id.as_deref(), new.source_id.as_deref()) {
        if old_id == new_id {
            return true;
        }
    }

    match (old.source.as_deref(), new.source.as_deref()) {
        (Some(old_url), Some(new_url)) if old_url == new_url => {
            old.title == new.title || (old.time - new.time).abs() <= TIME_MATCH_WINDOW
        }
        _ => false,
    }
}

/// True when the two strings differ beyond whitespace.
fn materially_differs(old: Option<&str>, new: Option<&str>) -> bool {
    fn squash(s: Option<&str>) -> String {
        s.unwrap_or("").chars().filter(|c| !c.is_whitespace()).collect()
    }
    squash(old) != squash(new)
}

/// Applies the max-items cache policy: keeps at most `max_items` items,
/// dropping the oldest unread-state-irrelevant ones first. Flagged items are
/// exempt and never counted against the limit. Returns the dropped items so
/// the caller can delete them from the store.
pub fn apply_max_items(items: &mut Vec<Item>, max_items: usize) -> Vec<Item> {
    if max_items == 0 {
        return Vec::new();
    }

    let kept_count = items.iter().filter(|i| !i.flagged).count();
    if kept_count <= max_items {
        return Vec::new();
    }

    // Oldest first, ids as tiebreaker.
    let mut candidates: Vec<(i64, i64)> = items
        .iter()
        .filter(|i| !i.flagged)
        .map(|i| (i.time, i.id))
        .collect();
    candidates.sort_unstable();
    let drop_count = kept_count - max_items;
    let drop_ids: std::collections::HashSet<i64> = candidates
        .iter()
        .take(drop_count)
        .map(|(_, id)| *id)
        .collect();

    let mut removed = Vec::new();
    items.retain(|item| {
        if !item.flagged && drop_ids.contains(&item.id) {
            removed.push(item.clone());
            false
        } else {
            true
        }
    });
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(guid: Option<&str>, valid: bool, source: Option<&str>, title: &str, time: i64) -> Item {
        let mut item = Item::new("n1");
        item.source_id = guid.map(String::from);
        item.valid_guid = valid;
        item.source = source.map(String::from);
        item.title = Some(title.to_string());
        item.time = time;
        item
    }

    #[test]
    fn test_guid_match_preserves_state() {
        let mut old = item(Some("g1"), true, None, "t", 10);
        old.id = 7;
        old.read = true;
        old.flagged = true;

        let result = merge_itemset(&[old], vec![item(Some("g1"), true, None, "t", 10)]);
        assert_eq!(result.new_count, 0);
        let merged = &result.items[0];
        assert_eq!(merged.id, 7);
        assert!(merged.read);
        assert!(merged.flagged);
        assert!(!merged.new);
    }

    #[test]
    fn test_merge_twice_inserts_nothing() {
        let parsed = vec![
            item(Some("g1"), true, None, "a", 10),
            item(Some("g2"), true, None, "b", 20),
        ];
        let first = merge_itemset(&[], parsed.clone());
        assert_eq!(first.new_count, 2);
        let second = merge_itemset(&first.items, parsed);
        assert_eq!(second.new_count, 0);
        assert_eq!(second.items.len(), 2);
    }

    #[test]
    fn test_url_and_time_window_match() {
        let old = item(None, false, Some("http://e.com/1"), "old title", 1000);
        // Title differs, but the timestamps are within an hour.
        let result = merge_itemset(
            &[old],
            vec![item(None, false, Some("http://e.com/1"), "new title", 2000)],
        );
        assert_eq!(result.new_count, 0);
        assert_eq!(result.updated_count, 1);
        assert!(result.items[0].updated);
    }

    #[test]
    fn test_url_match_outside_window_is_new() {
        let old = item(None, false, Some("http://e.com/1"), "old", 1000);
        let result = merge_itemset(
            &[old],
            vec![item(None, false, Some("http://e.com/1"), "new", 100000)],
        );
        assert_eq!(result.new_count, 1);
        // The unmatched existing item is retained.
        assert_eq!(result.items.len(), 2);
    }

    #[test]
    fn test_whitespace_only_change_is_not_material() {
        let old = item(Some("g"), true, None, "a  title", 1);
        let result = merge_itemset(&[old], vec![item(Some("g"), true, None, "a title", 1)]);
        assert_eq!(result.updated_count, 0);
        assert!(!result.items[0].updated);
    }

    #[test]
    fn test_vanished_items_are_retained() {
        let mut old = item(Some("gone"), true, None, "x", 1);
        old.id = 3;
        let result = merge_itemset(&[old], vec![item(Some("new"), true, None, "y", 2)]);
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[1].id, 3);
    }

    #[test]
    fn test_max_items_keeps_flagged() {
        let mut items = Vec::new();
        for i in 0..5 {
            let mut it = item(Some(&format!("g{i}")), true, None, "t", i);
            it.id = i;
            it.flagged = i == 0;
            items.push(it);
        }
        let removed = apply_max_items(&mut items, 2);
        assert_eq!(removed.len(), 2);
        // The flagged oldest item survives.
        assert!(items.iter().any(|i| i.id == 0));
        assert_eq!(items.len(), 3);
    }
}
