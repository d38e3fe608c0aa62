//! SQLite backend for item storage.
//!
//! Two tables: `items` holds the article rows (the rowid is the item's
//! numeric id), `itemsets` maps item ids to their owning node. All accessors
//! go through the connection's prepared-statement cache; multi-statement
//! operations run inside a transaction so an item row can never exist
//! without its itemsets row.
//!
//! Access is serialized through a mutex; the result-drain task is the only
//! writer during normal operation, so contention is not a concern.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::Result;
use crate::item::Item;

const SCHEMA_ITEMS: &str = "CREATE TABLE IF NOT EXISTS items (
    title             TEXT,
    read              INTEGER,
    new               INTEGER,
    updated           INTEGER,
    popup             INTEGER,
    marked            INTEGER,
    source            TEXT,
    source_id         TEXT,
    valid_guid        INTEGER,
    real_source_url   TEXT,
    real_source_title TEXT,
    description       TEXT,
    date              INTEGER
)";

const SCHEMA_ITEMSETS: &str = "CREATE TABLE IF NOT EXISTS itemsets (
    item_id  INTEGER,
    node_id  TEXT
)";

const SCHEMA_ITEMSET_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS itemset_idx ON itemsets (node_id)";

const ITEM_COLUMNS: &str = "items.title, items.read, items.new, items.updated, items.popup, \
     items.marked, items.source, items.source_id, items.valid_guid, \
     items.real_source_url, items.real_source_title, items.description, \
     items.date, itemsets.item_id, itemsets.node_id";

/// The SQLite-backed item store.
pub struct ItemStore {
    conn: Mutex<Connection>,
}

impl ItemStore {
    /// Opens (or creates) the database file and sets up the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::setup(Connection::open(path)?)
    }

    /// An in-memory store, for tests and throw-away sessions.
    pub fn open_in_memory() -> Result<Self> {
        Self::setup(Connection::open_in_memory()?)
    }

    fn setup(conn: Connection) -> Result<Self> {
        // journal_mode answers with a row, so this goes through query_row.
        conn.query_row("PRAGMA journal_mode=WAL", [], |_row| Ok(()))?;
        conn.execute(SCHEMA_ITEMS, [])?;
        conn.execute(SCHEMA_ITEMSETS, [])?;
        conn.execute(SCHEMA_ITEMSET_INDEX, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Loads the itemset of a node, in rowid order.
    pub fn load_itemset(&self, node_id: &str) -> Result<Vec<Item>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ITEM_COLUMNS} FROM items INNER JOIN itemsets \
             ON items.ROWID = itemsets.item_id \
             WHERE itemsets.node_id = ? ORDER BY items.ROWID"
        ))?;
        let items = stmt
            .query_map([node_id], item_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Loads a single item by numeric id.
    pub fn load_item(&self, id: i64) -> Result<Option<Item>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ITEM_COLUMNS} FROM items INNER JOIN itemsets \
             ON items.ROWID = itemsets.item_id \
             WHERE items.ROWID = ?"
        ))?;
        Ok(stmt.query_row([id], item_from_row).optional()?)
    }

    /// Writes an item: updates in place when it has an id, otherwise assigns
    /// the next free id and inserts the item plus its itemsets row
    /// atomically.
    pub fn update_item(&self, item: &mut Item) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();

        if item.id != 0 {
            let mut stmt = conn.prepare_cached(
                "UPDATE items SET title=?, read=?, new=?, updated=?, popup=?, marked=?, \
                 source=?, source_id=?, valid_guid=?, real_source_url=?, \
                 real_source_title=?, description=?, date=? WHERE ROWID=?",
            )?;
            stmt.execute(params![
                item.title,
                item.read,
                item.new,
                item.updated,
                item.popup,
                item.flagged,
                item.source,
                item.source_id,
                item.valid_guid,
                item.real_source_url,
                item.real_source_title,
                item.description,
                item.time,
                item.id,
            ])?;
            return Ok(());
        }

        let tx = conn.transaction()?;
        {
            // MAX(ROWID)+1 gives a unique new id; an empty table yields NULL.
            let max: Option<i64> =
                tx.query_row("SELECT MAX(ROWID) FROM items", [], |row| row.get(0))?;
            item.id = max.unwrap_or(0) + 1;
            tracing::debug!("new item id={} for {:?}", item.id, item.title);

            let mut insert_itemset = tx.prepare_cached(
                "INSERT INTO itemsets (item_id, node_id) VALUES (?, ?)",
            )?;
            insert_itemset.execute(params![item.id, item.node_id])?;

            let mut insert_item = tx.prepare_cached(
                "INSERT INTO items (title, read, new, updated, popup, marked, source, \
                 source_id, valid_guid, real_source_url, real_source_title, description, \
                 date, ROWID) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
            )?;
            insert_item.execute(params![
                item.title,
                item.read,
                item.new,
                item.updated,
                item.popup,
                item.flagged,
                item.source,
                item.source_id,
                item.valid_guid,
                item.real_source_url,
                item.real_source_title,
                item.description,
                item.time,
                item.id,
            ])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Removes a single item and its itemsets row.
    pub fn remove_item(&self, id: i64) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut delete_item = tx.prepare_cached("DELETE FROM items WHERE ROWID = ?")?;
            delete_item.execute([id])?;
            let mut delete_itemset =
                tx.prepare_cached("DELETE FROM itemsets WHERE item_id = ?")?;
            delete_itemset.execute([id])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Removes all items belonging to a node. Used when a subscription is
    /// deleted.
    pub fn remove_itemset(&self, node_id: &str) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut delete_items = tx.prepare_cached(
                "DELETE FROM items WHERE ROWID IN \
                 (SELECT item_id FROM itemsets WHERE node_id = ?)",
            )?;
            delete_items.execute([node_id])?;
            let mut delete_itemsets =
                tx.prepare_cached("DELETE FROM itemsets WHERE node_id = ?")?;
            delete_itemsets.execute([node_id])?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn mark_all_read(&self, node_id: &str) -> Result<()> {
        self.bulk_update("UPDATE items SET read = 1 WHERE ROWID IN \
                          (SELECT item_id FROM itemsets WHERE node_id = ?)", node_id)
    }

    pub fn mark_all_updated(&self, node_id: &str) -> Result<()> {
        self.bulk_update("UPDATE items SET updated = 0 WHERE ROWID IN \
                          (SELECT item_id FROM itemsets WHERE node_id = ?)", node_id)
    }

    /// Clears the "new" flag of everything in the node; the next refresh
    /// starts from a clean slate.
    pub fn mark_all_old(&self, node_id: &str) -> Result<()> {
        self.bulk_update("UPDATE items SET new = 0 WHERE ROWID IN \
                          (SELECT item_id FROM itemsets WHERE node_id = ?)", node_id)
    }

    pub fn mark_all_popup(&self, node_id: &str) -> Result<()> {
        self.bulk_update("UPDATE items SET popup = 0 WHERE ROWID IN \
                          (SELECT item_id FROM itemsets WHERE node_id = ?)", node_id)
    }

    fn bulk_update(&self, sql: &str, node_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(sql)?;
        stmt.execute([node_id])?;
        Ok(())
    }

    /// Number of unread items in a node.
    pub fn unread_count(&self, node_id: &str) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT COUNT(*) FROM items INNER JOIN itemsets \
             ON items.ROWID = itemsets.item_id \
             WHERE items.read = 0 AND node_id = ?",
        )?;
        Ok(stmt.query_row([node_id], |row| row.get(0))?)
    }
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        title: row.get(0)?,
        read: row.get(1)?,
        new: row.get(2)?,
        updated: row.get(3)?,
        popup: row.get(4)?,
        flagged: row.get(5)?,
        source: row.get(6)?,
        source_id: row.get(7)?,
        valid_guid: row.get(8)?,
        real_source_url: row.get(9)?,
        real_source_title: row.get(10)?,
        description: row.get(11)?,
        time: row.get(12)?,
        id: row.get(13)?,
        node_id: row.get(14)?,
        has_enclosure: false,
        metadata: Default::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item(node_id: &str, title: &str) -> Item {
        let mut item = Item::new(node_id);
        item.title = Some(title.to_string());
        item.source_id = Some(format!("guid-{title}"));
        item.valid_guid = true;
        item.time = 1000;
        item
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let store = ItemStore::open_in_memory().unwrap();
        let mut a = sample_item("n1", "a");
        let mut b = sample_item("n1", "b");
        store.update_item(&mut a).unwrap();
        store.update_item(&mut b).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[test]
    fn test_load_round_trip() {
        let store = ItemStore::open_in_memory().unwrap();
        let mut item = sample_item("n1", "a");
        item.read = true;
        item.description = Some("<p>x</p>".into());
        store.update_item(&mut item).unwrap();

        let loaded = store.load_item(item.id).unwrap().unwrap();
        assert_eq!(loaded.title.as_deref(), Some("a"));
        assert_eq!(loaded.node_id, "n1");
        assert!(loaded.read);
        assert!(loaded.valid_guid);
        assert_eq!(loaded.description.as_deref(), Some("<p>x</p>"));
        assert_eq!(loaded.time, 1000);
    }

    #[test]
    fn test_update_in_place() {
        let store = ItemStore::open_in_memory().unwrap();
        let mut item = sample_item("n1", "a");
        store.update_item(&mut item).unwrap();
        let id = item.id;

        item.read = true;
        item.title = Some("changed".into());
        store.update_item(&mut item).unwrap();
        assert_eq!(item.id, id);

        let loaded = store.load_item(id).unwrap().unwrap();
        assert!(loaded.read);
        assert_eq!(loaded.title.as_deref(), Some("changed"));
    }

    #[test]
    fn test_itemset_and_unread_count() {
        let store = ItemStore::open_in_memory().unwrap();
        for title in ["a", "b", "c"] {
            store.update_item(&mut sample_item("n1", title)).unwrap();
        }
        store.update_item(&mut sample_item("n2", "other")).unwrap();

        assert_eq!(store.load_itemset("n1").unwrap().len(), 3);
        assert_eq!(store.unread_count("n1").unwrap(), 3);

        store.mark_all_read("n1").unwrap();
        assert_eq!(store.unread_count("n1").unwrap(), 0);
        assert_eq!(store.unread_count("n2").unwrap(), 1);
    }

    #[test]
    fn test_remove_itemset() {
        let store = ItemStore::open_in_memory().unwrap();
        let mut item = sample_item("n1", "a");
        store.update_item(&mut item).unwrap();
        store.remove_itemset("n1").unwrap();
        assert!(store.load_itemset("n1").unwrap().is_empty());
        assert!(store.load_item(item.id).unwrap().is_none());
    }

    #[test]
    fn test_remove_item() {
        let store = ItemStore::open_in_memory().unwrap();
        let mut item = sample_item("n1", "a");
        store.update_item(&mut item).unwrap();
        store.remove_item(item.id).unwrap();
        assert!(store.load_item(item.id).unwrap().is_none());
        assert_eq!(store.load_itemset("n1").unwrap().len(), 0);
    }

    #[test]
    fn test_mark_all_old() {
        let store = ItemStore::open_in_memory().unwrap();
        let mut item = sample_item("n1", "a");
        store.update_item(&mut item).unwrap();
        store.mark_all_old("n1").unwrap();
        let loaded = store.load_item(item.id).unwrap().unwrap();
        assert!(!loaded.new);
    }
}
