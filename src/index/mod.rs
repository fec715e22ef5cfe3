//! The blob index: a persistent, chunk-grouped record store fronted by an
//! in-memory LRU cache.
//!
//! CREATE and APPEND are exclusive single-writer modes used by the importer;
//! READONLY serves `nth` concurrent tile-builder threads through the
//! reader / loader / editor protocol in [`sync`].

pub mod cache;
pub mod sql;
pub mod sync;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{error, warn};
use parking_lot::MutexGuard;

use crate::entry::{Entry, Handle};
use crate::error::{IndexError, IndexResult};
use crate::record::{self, RecordType};

use self::cache::Key;
use self::sql::Db;
use self::sync::{Monitor, Shared};

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Eviction stops once memory falls below this fraction of the target, so a
/// single overflow does not thrash one entry at a time.
const EVICT_HYSTERESIS: f64 = 0.95;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Mode {
    Create,
    Append,
    ReadOnly,
}

#[derive(Clone, Debug, Default)]
pub struct IndexStats {
    pub hits: u64,
    pub misses: u64,
    pub sql_loads: u64,
    pub evictions: u64,
}

pub struct Index {
    mode: Mode,
    cache_target: usize,
    db: Db,
    mon: Monitor,
    hits: AtomicU64,
    misses: AtomicU64,
    sql_loads: AtomicU64,
    evictions: AtomicU64,
}

impl Index {
    /// Fresh store for import. `smem` is the cache target in GB.
    pub fn create<P: AsRef<Path>>(path: P, smem: f64) -> IndexResult<Index> {
        Ok(Self::wrap(Mode::Create, Db::create(path)?, smem, 1))
    }

    /// Reopen an existing store for additional import writes.
    pub fn append<P: AsRef<Path>>(path: P, smem: f64) -> IndexResult<Index> {
        Ok(Self::wrap(Mode::Append, Db::append(path)?, smem, 1))
    }

    /// Shared read-only access for `nth` builder threads.
    pub fn open_readonly<P: AsRef<Path>>(path: P, smem: f64, nth: usize) -> IndexResult<Index> {
        Ok(Self::wrap(
            Mode::ReadOnly,
            Db::open_readonly(path, nth)?,
            smem,
            nth,
        ))
    }

    fn wrap(mode: Mode, db: Db, smem: f64, nth: usize) -> Index {
        Index {
            mode,
            cache_target: (smem.max(0.0) * GB) as usize,
            db,
            mon: Monitor::new(nth),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sql_loads: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Cache memory estimate in bytes.
    pub fn mem(&self) -> usize {
        self.mon.lock().cache.mem()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sql_loads: self.sql_loads.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Highest OSM changeset recorded by the import, 0 for an empty store.
    pub fn changeset(&self) -> IndexResult<i64> {
        Ok(self
            .db
            .attr("changeset")?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    pub fn set_changeset(&self, changeset: i64) -> IndexResult<()> {
        self.db.set_attr("changeset", &changeset.to_string())
    }

    /// Enters the shared-read barrier. Every READONLY `get` batch must be
    /// bracketed by `lock`/`unlock`; no editor runs in between, so the batch
    /// observes one snapshot of the cache.
    pub fn lock(&self) {
        let mut s = self.mon.lock();
        while s.editor {
            self.mon.wait(&mut s);
        }
        s.readers += 1;
    }

    pub fn unlock(&self) {
        let mut s = self.mon.lock();
        debug_assert!(s.readers > 0, "unlock without matching lock");
        s.readers -= 1;
        if s.readers == 0 {
            self.mon.notify_all();
        }
    }

    fn reader_reenter(&self, s: &mut MutexGuard<'_, Shared>) {
        if self.mode == Mode::ReadOnly {
            while s.editor {
                self.mon.wait(s);
            }
            s.readers += 1;
        }
    }

    /// Borrowed view of one record; `None` means the record does not exist.
    ///
    /// READONLY callers hold `lock()` around the call and pass their worker
    /// thread id; writer modes pass `tid = 0`.
    pub fn get(&self, tid: usize, rtype: RecordType, id: i64) -> IndexResult<Option<Handle>> {
        let (major_id, minor_id) = record::split_id(rtype, id);
        let key: Key = (rtype, major_id);

        {
            let mut s = self.mon.lock();
            debug_assert!(self.mode != Mode::ReadOnly || s.readers > 0);
            if let Some(entry) = s.cache.get(&key) {
                s.cache.promote(&key);
                drop(s);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.get(minor_id));
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // Miss: give up the reader role and take the load slot for this key.
        {
            let mut s = self.mon.lock();
            if self.mode == Mode::ReadOnly {
                s.readers -= 1;
                if s.readers == 0 {
                    self.mon.notify_all();
                }
            }
            while s.editor || s.loading_key(&key) {
                self.mon.wait(&mut s);
            }
            s.loading[tid] = Some(key);
            s.loaders += 1;

            // Another thread may have finished loading it while we waited.
            if let Some(entry) = s.cache.get(&key) {
                s.cache.promote(&key);
                s.loading[tid] = None;
                s.loaders -= 1;
                self.mon.notify_all();
                self.reader_reenter(&mut s);
                drop(s);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.get(minor_id));
            }
        }

        // Database fetch outside the monitor; the load slot keeps every other
        // thread asking for this key parked.
        let loaded = self.db.load(rtype, major_id);
        self.sql_loads.fetch_add(1, Ordering::Relaxed);

        match loaded {
            Err(e) => {
                let mut s = self.mon.lock();
                s.loading[tid] = None;
                s.loaders -= 1;
                self.mon.notify_all();
                self.reader_reenter(&mut s);
                Err(e)
            }
            Ok(None) => {
                let mut s = self.mon.lock();
                s.loading[tid] = None;
                s.loaders -= 1;
                self.mon.notify_all();
                self.reader_reenter(&mut s);
                Ok(None)
            }
            Ok(Some(blob)) => {
                let entry = Arc::new(Entry::from_blob(rtype, major_id, blob));
                let mut s = self.mon.lock();
                // Leave the loading slot set: it dedups this key until the
                // entry is actually visible in the cache.
                s.loaders -= 1;
                while s.editor {
                    self.mon.wait(&mut s);
                }
                s.editor = true;
                while s.readers > 0 || s.loaders > 0 {
                    self.mon.wait(&mut s);
                }
                let evicted = self.evict_locked(&mut s);
                s.cache.insert(key, Arc::clone(&entry));
                s.loading[tid] = None;
                s.editor = false;
                self.mon.notify_all();
                self.reader_reenter(&mut s);
                drop(s);
                evicted?;
                Ok(entry.get(minor_id))
            }
        }
    }

    /// Resolves the entry for `key`, loading it from the store or creating it
    /// fresh. Writer modes only; runs under the monitor.
    fn writer_entry(
        &self,
        s: &mut MutexGuard<'_, Shared>,
        key: Key,
    ) -> IndexResult<Arc<Entry>> {
        if let Some(entry) = s.cache.get(&key) {
            s.cache.promote(&key);
            return Ok(entry);
        }
        let entry = match self.db.load(key.0, key.1)? {
            Some(blob) => {
                self.sql_loads.fetch_add(1, Ordering::Relaxed);
                Arc::new(Entry::from_blob(key.0, key.1, blob))
            }
            None => Arc::new(Entry::new(key.0, key.1)),
        };
        s.cache.insert(key, Arc::clone(&entry));
        Ok(entry)
    }

    /// Importer path: appends one packed record to its chunk. A record whose
    /// packed id maps to a different chunk is rejected by the entry.
    pub fn add(&self, rtype: RecordType, id: i64, bytes: &[u8]) -> IndexResult<()> {
        if self.mode == Mode::ReadOnly {
            return Err(IndexError::ReadOnly);
        }
        let key: Key = (rtype, record::split_id(rtype, id).0);
        let mut s = self.mon.lock();
        let entry = self.writer_entry(&mut s, key)?;
        entry.append(bytes, false)?;
        s.cache.refresh_mem(&key);
        self.evict_locked(&mut s)
    }

    /// Appends one ref to a TileRefs chunk, materialising its header on first
    /// use.
    pub fn add_tile(&self, rtype: RecordType, major_id: i64, r: i64) -> IndexResult<()> {
        if self.mode == Mode::ReadOnly {
            return Err(IndexError::ReadOnly);
        }
        debug_assert!(rtype.is_tile());
        let key: Key = (rtype, major_id);
        let mut s = self.mon.lock();
        let entry = self.writer_entry(&mut s, key)?;
        if entry.size() == 0 {
            entry.append(&record::pack_tile_refs_header(major_id), false)?;
        }
        entry.append_tile_ref(r)?;
        s.cache.refresh_mem(&key);
        self.evict_locked(&mut s)
    }

    /// One eviction pass: drop LRU entries with no pins until memory falls
    /// below the hysteresis floor, writing dirty chunks back first. The
    /// write-back transaction is closed when the pass completes.
    fn evict_locked(&self, s: &mut MutexGuard<'_, Shared>) -> IndexResult<()> {
        if self.cache_target == 0 || s.cache.mem() <= self.cache_target {
            return Ok(());
        }
        let floor = (self.cache_target as f64 * EVICT_HYSTERESIS) as usize;
        let mut wrote = false;
        while s.cache.mem() > floor {
            let Some(key) = s.cache.tail_unpinned() else {
                warn!(
                    "cache over target ({} B) but every entry is pinned",
                    s.cache.mem()
                );
                break;
            };
            let entry = s
                .cache
                .remove(&key)
                .expect("tail candidate vanished from cache");
            if entry.dirty() {
                self.db.save(key.0, key.1, &entry.blob())?;
                entry.clear_dirty();
                wrote = true;
            }
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        if wrote {
            self.db.end_batch()?;
        }
        Ok(())
    }

    /// Writes every dirty chunk back and closes the running transaction.
    pub fn flush(&self) -> IndexResult<()> {
        if self.mode == Mode::ReadOnly {
            return Ok(());
        }
        let s = self.mon.lock();
        for (key, entry) in s.cache.entries() {
            if entry.dirty() {
                self.db.save(key.0, key.1, &entry.blob())?;
                entry.clear_dirty();
            }
        }
        drop(s);
        self.db.end_batch()
    }

    /// Flush and verify that every handle has been put back. A live handle at
    /// shutdown is a logic error in the caller.
    pub fn close(self) -> IndexResult<()> {
        self.flush()?;
        let s = self.mon.lock();
        for (key, entry) in s.cache.entries() {
            if entry.pins() != 0 {
                panic!(
                    "index closed with {} live handle(s) on {:?}/{}",
                    entry.pins(),
                    key.0,
                    key.1
                );
            }
        }
        Ok(())
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        // Best-effort flush for the error-exit path; close() is the clean one.
        if self.mode != Mode::ReadOnly {
            if let Err(e) = self.flush() {
                error!("index flush on drop failed: {e}");
            }
        }
    }
}
