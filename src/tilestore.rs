//! Flat-file store for prefetched tiles: one SQLite file holding named,
//! gzip-compressed tile blobs plus the attributes a tile server needs to
//! describe the set (`name=osmdbv6`, `pattern=zoom/x/y`, bounds, zoom range,
//! changeset).

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use rusqlite::{Connection, OptionalExtension};

pub const STORE_NAME: &str = "osmdbv6";
pub const STORE_PATTERN: &str = "zoom/x/y";
pub const STORE_EXT: &str = "osmdb";

pub struct TileStore {
    conn: Connection,
}

impl TileStore {
    /// Fresh store; an existing file is replaced.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<TileStore> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("replace {}", path.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("create tile store {}", path.display()))?;
        conn.busy_timeout(Duration::from_millis(5000))?;
        conn.execute_batch(
            "PRAGMA journal_mode=OFF;\n\
             PRAGMA locking_mode=EXCLUSIVE;\n\
             CREATE TABLE IF NOT EXISTS tbl_attr (\n\
             \x20 key TEXT UNIQUE,\n\
             \x20 val TEXT\n\
             );\n\
             CREATE TABLE IF NOT EXISTS tbl_blob (\n\
             \x20 name TEXT UNIQUE NOT NULL,\n\
             \x20 blob BLOB\n\
             );",
        )?;
        Ok(TileStore { conn })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<TileStore> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )
        .with_context(|| format!("open tile store {}", path.as_ref().display()))?;
        Ok(TileStore { conn })
    }

    pub fn set_attr(&self, key: &str, val: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO tbl_attr (key, val) VALUES (?1, ?2)\n\
             ON CONFLICT(key) DO UPDATE SET val=excluded.val",
            [key, val],
        )?;
        Ok(())
    }

    pub fn attr(&self, key: &str) -> Result<Option<String>> {
        let val = self
            .conn
            .query_row("SELECT val FROM tbl_attr WHERE key=?1", [key], |r| r.get(0))
            .optional()?;
        Ok(val)
    }

    pub fn tile_name(zoom: u8, x: u32, y: u32) -> String {
        format!("{zoom}/{x}/{y}")
    }

    /// Stores one tile blob gzip-compressed under its `zoom/x/y` name.
    pub fn put_tile(&self, zoom: u8, x: u32, y: u32, blob: &[u8]) -> Result<()> {
        let mut enc = GzEncoder::new(Vec::with_capacity(blob.len() / 2), Compression::default());
        enc.write_all(blob)?;
        let packed = enc.finish()?;
        self.conn.execute(
            "REPLACE INTO tbl_blob (name, blob) VALUES (?1, ?2)",
            rusqlite::params![Self::tile_name(zoom, x, y), packed],
        )?;
        Ok(())
    }

    pub fn tile_count(&self) -> Result<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM tbl_blob", [], |r| r.get(0))?;
        Ok(n)
    }

    pub fn begin(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::NamedTempFile;

    #[test]
    fn attrs_and_tiles_round_trip() -> Result<()> {
        let f = NamedTempFile::new().unwrap();
        let store = TileStore::create(f.path())?;
        store.set_attr("name", STORE_NAME)?;
        store.set_attr("zmin", "3")?;
        store.begin()?;
        store.put_tile(9, 100, 197, b"tile bytes go here")?;
        store.commit()?;
        assert_eq!(store.attr("name")?.as_deref(), Some(STORE_NAME));
        assert_eq!(store.tile_count()?, 1);

        // Payload is gzip of the original blob under zoom/x/y.
        let packed: Vec<u8> = store.conn.query_row(
            "SELECT blob FROM tbl_blob WHERE name='9/100/197'",
            [],
            |r| r.get(0),
        )?;
        let mut raw = Vec::new();
        GzDecoder::new(&packed[..]).read_to_end(&mut raw)?;
        assert_eq!(raw, b"tile bytes go here");
        Ok(())
    }
}
