//! Persistent layer of the blob index: one table per record type, schema
//! `(id INTEGER PRIMARY KEY NOT NULL, blob BLOB)` keyed by `major_id`, plus a
//! small attribute table.
//!
//! The connection is owned exclusively by the index and guarded by its own
//! mutex; a caller holds it for the duration of a single statement, never
//! across the concurrency protocol's condition variable.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension};

use crate::error::{IndexError, IndexResult};
use crate::record::{RecordType, TYPE_COUNT};
use crate::BATCH_SIZE;

pub struct Db {
    inner: Mutex<DbInner>,
}

struct DbInner {
    conn: Connection,
    writable: bool,
    in_tx: bool,
    batch: u32,
}

fn session_pragmas(conn: &Connection) -> IndexResult<()> {
    // The store is rebuilt, never repaired: journalling off, exclusive lock.
    conn.execute_batch(
        "PRAGMA journal_mode=OFF;\n\
         PRAGMA locking_mode=EXCLUSIVE;\n\
         PRAGMA temp_store_directory='.';",
    )?;
    Ok(())
}

fn create_schema(conn: &Connection) -> IndexResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tbl_attr (\n\
         \x20 key TEXT UNIQUE,\n\
         \x20 val TEXT\n\
         );",
    )?;
    for t in RecordType::ALL {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (\n\
             \x20 id INTEGER PRIMARY KEY NOT NULL,\n\
             \x20 blob BLOB\n\
             );",
            t.table_name()
        ))?;
    }
    Ok(())
}

impl Db {
    /// Fresh store: any existing file is replaced.
    pub fn create<P: AsRef<Path>>(path: P) -> IndexResult<Db> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(5000))?;
        session_pragmas(&conn)?;
        create_schema(&conn)?;
        Ok(Db::wrap(conn, true, 1))
    }

    /// Reopen an existing store for additional writes.
    pub fn append<P: AsRef<Path>>(path: P) -> IndexResult<Db> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(IndexError::NotFound(path.display().to_string()));
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(5000))?;
        session_pragmas(&conn)?;
        create_schema(&conn)?;
        Ok(Db::wrap(conn, true, 1))
    }

    /// Multi-threaded reads; `nth` sizes the prepared-statement cache.
    pub fn open_readonly<P: AsRef<Path>>(path: P, nth: usize) -> IndexResult<Db> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(IndexError::NotFound(path.display().to_string()));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        conn.busy_timeout(Duration::from_millis(5000))?;
        Ok(Db::wrap(conn, false, nth))
    }

    fn wrap(conn: Connection, writable: bool, nth: usize) -> Db {
        conn.set_prepared_statement_cache_capacity(TYPE_COUNT * nth.max(1) + 8);
        Db {
            inner: Mutex::new(DbInner {
                conn,
                writable,
                in_tx: false,
                batch: 0,
            }),
        }
    }

    pub fn load(&self, rtype: RecordType, major_id: i64) -> IndexResult<Option<Vec<u8>>> {
        let inner = self.inner.lock();
        let mut stmt = inner.conn.prepare_cached(&format!(
            "SELECT blob FROM {} WHERE id=?1",
            rtype.table_name()
        ))?;
        let blob: Option<Vec<u8>> = stmt
            .query_row([major_id], |row| row.get(0))
            .optional()?;
        Ok(blob)
    }

    /// Writes one chunk inside the running batch transaction, opening it
    /// lazily and committing every `BATCH_SIZE` operations.
    pub fn save(&self, rtype: RecordType, major_id: i64, blob: &[u8]) -> IndexResult<()> {
        let mut inner = self.inner.lock();
        if !inner.writable {
            return Err(IndexError::ReadOnly);
        }
        if !inner.in_tx {
            inner.conn.execute_batch("BEGIN")?;
            inner.in_tx = true;
            inner.batch = 0;
        }
        {
            let mut stmt = inner.conn.prepare_cached(&format!(
                "REPLACE INTO {} (id, blob) VALUES (?1, ?2)",
                rtype.table_name()
            ))?;
            stmt.execute(rusqlite::params![major_id, blob])?;
        }
        inner.batch += 1;
        if inner.batch >= BATCH_SIZE {
            inner.conn.execute_batch("COMMIT")?;
            inner.in_tx = false;
        }
        Ok(())
    }

    /// Forces the running transaction closed; a no-op when none is open.
    pub fn end_batch(&self) -> IndexResult<()> {
        let mut inner = self.inner.lock();
        if inner.in_tx {
            inner.conn.execute_batch("COMMIT")?;
            inner.in_tx = false;
        }
        Ok(())
    }

    pub fn attr(&self, key: &str) -> IndexResult<Option<String>> {
        let inner = self.inner.lock();
        let mut stmt = inner
            .conn
            .prepare_cached("SELECT val FROM tbl_attr WHERE key=?1")?;
        let val: Option<String> = stmt.query_row([key], |row| row.get(0)).optional()?;
        Ok(val)
    }

    pub fn set_attr(&self, key: &str, val: &str) -> IndexResult<()> {
        let inner = self.inner.lock();
        if !inner.writable {
            return Err(IndexError::ReadOnly);
        }
        let mut stmt = inner.conn.prepare_cached(
            "INSERT INTO tbl_attr (key, val) VALUES (?1, ?2)\n\
             ON CONFLICT(key) DO UPDATE SET val=excluded.val",
        )?;
        stmt.execute([key, val])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn create_load_save_round_trip() -> IndexResult<()> {
        let f = NamedTempFile::new().unwrap();
        let db = Db::create(f.path())?;
        assert_eq!(db.load(RecordType::NodeCoord, 5)?, None);
        db.save(RecordType::NodeCoord, 5, b"hello")?;
        db.end_batch()?;
        assert_eq!(db.load(RecordType::NodeCoord, 5)?.as_deref(), Some(&b"hello"[..]));
        // REPLACE overwrites the whole chunk blob.
        db.save(RecordType::NodeCoord, 5, b"world!")?;
        db.end_batch()?;
        assert_eq!(db.load(RecordType::NodeCoord, 5)?.as_deref(), Some(&b"world!"[..]));
        Ok(())
    }

    #[test]
    fn attrs_upsert() -> IndexResult<()> {
        let f = NamedTempFile::new().unwrap();
        let db = Db::create(f.path())?;
        assert_eq!(db.attr("changeset")?, None);
        db.set_attr("changeset", "41")?;
        db.set_attr("changeset", "42")?;
        assert_eq!(db.attr("changeset")?.as_deref(), Some("42"));
        Ok(())
    }

    #[test]
    fn readonly_rejects_writes() -> IndexResult<()> {
        let f = NamedTempFile::new().unwrap();
        {
            let db = Db::create(f.path())?;
            db.save(RecordType::WayInfo, 1, b"w")?;
            db.end_batch()?;
        }
        let db = Db::open_readonly(f.path(), 2)?;
        assert!(db.load(RecordType::WayInfo, 1)?.is_some());
        assert!(matches!(
            db.save(RecordType::WayInfo, 2, b"x"),
            Err(IndexError::ReadOnly)
        ));
        Ok(())
    }
}
