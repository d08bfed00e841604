//! SQLite link cache backend

use super::traits::{CacheError, CacheResult, LinkCache, LinkCacheEntry, OpenCache};
use super::Link;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed link cache
///
/// One row per term with the links stored as JSON. Every `put` is committed
/// before it returns, so a crash loses at most the term in flight.
/// Thread-safe via internal mutex on the connection.
pub struct SqliteLinkCache {
    conn: Mutex<Connection>,
}

impl SqliteLinkCache {
    fn init_schema(conn: &Connection) -> CacheResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS link_cache (
                term TEXT PRIMARY KEY,
                links_json TEXT NOT NULL,
                computed_at TEXT NOT NULL
            );

            -- Readers can proceed while a run is writing
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn row_to_entry(term: String, links_json: &str) -> CacheResult<LinkCacheEntry> {
        let links: Vec<Link> =
            serde_json::from_str(links_json).map_err(|e| CacheError::Corrupt {
                term: term.clone(),
                reason: e.to_string(),
            })?;
        let entry = LinkCacheEntry { term, links };
        entry.validate()?;
        Ok(entry)
    }

    /// When a term was last computed, as stored (RFC 3339).
    pub fn computed_at(&self, term: &str) -> CacheResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let at = conn
            .query_row(
                "SELECT computed_at FROM link_cache WHERE term = ?1",
                params![term],
                |row| row.get(0),
            )
            .optional()?;
        Ok(at)
    }

    /// Store raw JSON for a term without validation.
    #[cfg(test)]
    pub(crate) fn put_raw(&self, term: &str, links_json: &str) -> CacheResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO link_cache (term, links_json, computed_at) VALUES (?1, ?2, ?3)",
            params![term, links_json, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

impl OpenCache for SqliteLinkCache {
    fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl LinkCache for SqliteLinkCache {
    fn get(&self, term: &str) -> CacheResult<Option<LinkCacheEntry>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<String> = conn
            .query_row(
                "SELECT links_json FROM link_cache WHERE term = ?1",
                params![term],
                |row| row.get(0),
            )
            .optional()?;
        drop(conn);

        match row {
            Some(json) => Ok(Some(Self::row_to_entry(term.to_string(), &json)?)),
            None => Ok(None),
        }
    }

    fn put(&self, entry: &LinkCacheEntry) -> CacheResult<()> {
        let links_json = serde_json::to_string(&entry.links)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO link_cache (term, links_json, computed_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(term) DO UPDATE SET
                links_json = excluded.links_json,
                computed_at = excluded.computed_at
            "#,
            params![entry.term, links_json, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn invalidate(&self, term: &str) -> CacheResult<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM link_cache WHERE term = ?1", params![term])?;
        Ok(rows > 0)
    }

    fn clear(&self) -> CacheResult<usize> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM link_cache", [])?;
        Ok(rows)
    }

    fn terms(&self) -> CacheResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT term FROM link_cache ORDER BY term")?;
        let terms = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(terms)
    }

    fn len(&self) -> CacheResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM link_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn contains(&self, term: &str) -> CacheResult<bool> {
        let conn = self.conn.lock().unwrap();
        let found: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM link_cache WHERE term = ?1",
            params![term],
            |row| row.get(0),
        )?;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_cache() -> SqliteLinkCache {
        SqliteLinkCache::open_in_memory().unwrap()
    }

    fn sample_entry() -> LinkCacheEntry {
        LinkCacheEntry::new(
            "deep_learning",
            vec![
                Link::new("deep learning", 1.0).with_via("deep_learning", 1.0),
                Link::new("machine learning", 0.92).with_via("machine_learning", 0.81),
            ],
        )
    }

    #[test]
    fn test_put_and_get() {
        let cache = create_test_cache();
        cache.put(&sample_entry()).unwrap();
        assert_eq!(cache.get("deep_learning").unwrap(), Some(sample_entry()));
        assert_eq!(cache.get("missing").unwrap(), None);
        assert!(cache.computed_at("deep_learning").unwrap().is_some());
    }

    #[test]
    fn test_empty_entry_is_cached() {
        let cache = create_test_cache();
        cache.put(&LinkCacheEntry::empty("zzz")).unwrap();
        let entry = cache.get("zzz").unwrap().unwrap();
        assert!(entry.is_empty());
        assert!(cache.contains("zzz").unwrap());
    }

    #[test]
    fn test_put_replaces_existing_row() {
        let cache = create_test_cache();
        cache.put(&sample_entry()).unwrap();
        cache.put(&LinkCacheEntry::empty("deep_learning")).unwrap();
        assert_eq!(cache.len().unwrap(), 1);
        assert!(cache.get("deep_learning").unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_row_is_isolated() {
        let cache = create_test_cache();
        cache.put(&sample_entry()).unwrap();
        cache.put_raw("broken", "{not json").unwrap();
        cache.put_raw("bad_score", r#"[{"concept":"x","score":7.5}]"#).unwrap();

        match cache.get("broken") {
            Err(CacheError::Corrupt { term, .. }) => assert_eq!(term, "broken"),
            other => panic!("expected corrupt entry, got {:?}", other),
        }
        assert!(matches!(
            cache.get("bad_score"),
            Err(CacheError::Corrupt { .. })
        ));
        // Unrelated rows untouched
        assert_eq!(cache.get("deep_learning").unwrap(), Some(sample_entry()));
        assert_eq!(cache.len().unwrap(), 3);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = create_test_cache();
        cache.put(&sample_entry()).unwrap();
        cache.put(&LinkCacheEntry::empty("other")).unwrap();

        assert!(cache.invalidate("deep_learning").unwrap());
        assert!(!cache.invalidate("deep_learning").unwrap());
        assert_eq!(cache.terms().unwrap(), vec!["other"]);

        assert_eq!(cache.clear().unwrap(), 1);
        assert_eq!(cache.len().unwrap(), 0);
    }

    #[test]
    fn test_reopen_persists_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("links.db");
        {
            let cache = SqliteLinkCache::open(&path).unwrap();
            cache.put(&sample_entry()).unwrap();
        }
        let cache = SqliteLinkCache::open(&path).unwrap();
        assert_eq!(cache.get("deep_learning").unwrap(), Some(sample_entry()));
    }
}
