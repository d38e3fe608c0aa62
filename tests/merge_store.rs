mod common;

use common::parse_fixture;
use syndikit::{ItemStore, apply_max_items, merge_itemset};

const SAMPLE_FIXTURE: &str = "rss/sample.rss";

/// Parses the fixture, merges against the store's itemset, and commits.
/// Returns the number of new items.
fn refresh_into_store(store: &ItemStore, node_id: &str) -> usize {
    let mut result = parse_fixture(SAMPLE_FIXTURE);
    for item in &mut result.items {
        item.node_id = node_id.to_string();
    }
    let existing = store.load_itemset(node_id).unwrap();
    let mut merged = merge_itemset(&existing, result.items);
    for item in &mut merged.items {
        if item.id == 0 || merged.changed_ids.contains(&item.id) {
            store.update_item(item).unwrap();
        }
    }
    merged.new_count
}

#[test]
fn test_parse_twice_merges_to_zero_new_items() {
    let store = ItemStore::open_in_memory().unwrap();

    assert_eq!(refresh_into_store(&store, "n1"), 3);
    assert_eq!(store.load_itemset("n1").unwrap().len(), 3);

    // The second pass over identical bytes must insert nothing.
    assert_eq!(refresh_into_store(&store, "n1"), 0);
    assert_eq!(store.load_itemset("n1").unwrap().len(), 3);
}

#[test]
fn test_read_bits_survive_refresh() {
    let store = ItemStore::open_in_memory().unwrap();
    refresh_into_store(&store, "n1");

    let mut items = store.load_itemset("n1").unwrap();
    items[0].read = true;
    items[0].flagged = true;
    store.update_item(&mut items[0]).unwrap();
    let marked_id = items[0].id;

    refresh_into_store(&store, "n1");

    let reloaded = store.load_item(marked_id).unwrap().unwrap();
    assert!(reloaded.read);
    assert!(reloaded.flagged);
    assert_eq!(store.unread_count("n1").unwrap(), 2);
}

#[test]
fn test_unread_count_matches_itemset() {
    let store = ItemStore::open_in_memory().unwrap();
    refresh_into_store(&store, "n1");
    refresh_into_store(&store, "n2");

    for node in ["n1", "n2"] {
        let manual = store
            .load_itemset(node)
            .unwrap()
            .iter()
            .filter(|i| !i.read)
            .count() as u32;
        assert_eq!(store.unread_count(node).unwrap(), manual);
    }

    store.mark_all_read("n1").unwrap();
    assert_eq!(store.unread_count("n1").unwrap(), 0);
    assert_eq!(store.unread_count("n2").unwrap(), 3);
}

#[test]
fn test_items_belong_to_one_node() {
    let store = ItemStore::open_in_memory().unwrap();
    refresh_into_store(&store, "n1");
    refresh_into_store(&store, "n2");

    let n1_ids: Vec<i64> = store.load_itemset("n1").unwrap().iter().map(|i| i.id).collect();
    let n2_ids: Vec<i64> = store.load_itemset("n2").unwrap().iter().map(|i| i.id).collect();
    assert!(n1_ids.iter().all(|id| !n2_ids.contains(id)));

    // Removing one node leaves the other untouched.
    store.remove_itemset("n1").unwrap();
    assert!(store.load_itemset("n1").unwrap().is_empty());
    for id in n1_ids {
        assert!(store.load_item(id).unwrap().is_none());
    }
    assert_eq!(store.load_itemset("n2").unwrap().len(), 3);
}

#[test]
fn test_ids_are_immutable_across_refreshes() {
    let store = ItemStore::open_in_memory().unwrap();
    refresh_into_store(&store, "n1");
    let before: Vec<(i64, Option<String>)> = store
        .load_itemset("n1")
        .unwrap()
        .into_iter()
        .map(|i| (i.id, i.source_id))
        .collect();

    refresh_into_store(&store, "n1");
    let after: Vec<(i64, Option<String>)> = store
        .load_itemset("n1")
        .unwrap()
        .into_iter()
        .map(|i| (i.id, i.source_id))
        .collect();
    assert_eq!(before, after);
}

#[test]
fn test_max_items_pruning_against_store() {
    let store = ItemStore::open_in_memory().unwrap();
    refresh_into_store(&store, "n1");

    let mut items = store.load_itemset("n1").unwrap();
    let removed = apply_max_items(&mut items, 1);
    assert_eq!(removed.len(), 2);
    for item in &removed {
        store.remove_item(item.id).unwrap();
    }
    assert_eq!(store.load_itemset("n1").unwrap().len(), 1);
}

#[test]
fn test_persistent_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("items.db");
    {
        let store = ItemStore::open(&path).unwrap();
        refresh_into_store(&store, "n1");
    }
    // Reopen and find everything still there.
    let store = ItemStore::open(&path).unwrap();
    assert_eq!(store.load_itemset("n1").unwrap().len(), 3);
    assert_eq!(store.unread_count("n1").unwrap(), 3);
}
