use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{helpers::parse_datetime, models::CacheEntry, Database};

fn row_to_entry(row: &Row) -> Result<CacheEntry> {
    let updated_at: String = row.get("updated_at")?;
    Ok(CacheEntry {
        key: row.get("key")?,
        value: row.get("value")?,
        writer: row.get("writer")?,
        revision: row.get("revision")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

fn select_entry(conn: &Connection, key: &str) -> Result<Option<CacheEntry>> {
    let mut stmt = conn.prepare(
        "SELECT key, value, writer, revision, updated_at
         FROM cache_entries
         WHERE key = ?1",
    )?;
    let raw = stmt
        .query_row(params![key], |row| Ok(row_to_entry(row)))
        .optional()?;
    raw.transpose()
}

fn upsert_entry(
    conn: &Connection,
    key: &str,
    value: Option<&str>,
    writer: &str,
    updated_at: DateTime<Utc>,
) -> Result<CacheEntry> {
    conn.execute(
        "INSERT INTO cache_entries (key, value, writer, revision, updated_at)
         VALUES (?1, ?2, ?3, 1, ?4)
         ON CONFLICT(key) DO UPDATE SET
             value = excluded.value,
             writer = excluded.writer,
             revision = cache_entries.revision + 1,
             updated_at = excluded.updated_at",
        params![key, value, writer, updated_at.to_rfc3339()],
    )?;
    select_entry(conn, key)?
        .ok_or_else(|| anyhow::anyhow!("cache entry {key} vanished after write"))
}

impl Database {
    pub async fn get_cache_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let key = key.to_string();
        self.execute(move |conn| select_entry(conn, &key)).await
    }

    pub async fn put_cache_entry(
        &self,
        key: &str,
        value: String,
        writer: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<CacheEntry> {
        let key = key.to_string();
        let writer = writer.to_string();
        self.execute(move |conn| upsert_entry(conn, &key, Some(&value), &writer, updated_at))
            .await
    }

    /// Clears the value but keeps the row so the revision still moves forward.
    pub async fn clear_cache_entry(
        &self,
        key: &str,
        writer: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<CacheEntry> {
        let key = key.to_string();
        let writer = writer.to_string();
        self.execute(move |conn| upsert_entry(conn, &key, None, &writer, updated_at))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn revisions_increase_across_writes_and_clears() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("cache.sqlite3")).unwrap();
        let now = Utc::now();

        assert!(db.get_cache_entry("active_session").await.unwrap().is_none());

        let first = db
            .put_cache_entry("active_session", "{}".into(), "ctx-a", now)
            .await
            .unwrap();
        assert_eq!(first.revision, 1);
        assert_eq!(first.value.as_deref(), Some("{}"));

        let cleared = db
            .clear_cache_entry("active_session", "ctx-b", now)
            .await
            .unwrap();
        assert_eq!(cleared.revision, 2);
        assert_eq!(cleared.value, None);
        assert_eq!(cleared.writer, "ctx-b");

        let stored = db.get_cache_entry("active_session").await.unwrap().unwrap();
        assert_eq!(stored, cleared);
    }
}
