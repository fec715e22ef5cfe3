//! One cached chunk: the raw bytes for a `(type, major_id)` pair plus a lazy
//! `minor_id -> record` map.
//!
//! Handles are offset-plus-length borrows that materialise a byte view on
//! demand, so record offsets stay valid across buffer reallocation. The pin
//! count only gates eviction and capacity growth.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use crate::error::{IndexError, IndexResult};
use crate::record::{self, RecordType};

/// Appended chunks start at this capacity and double until the record fits.
const BASE_CAPACITY: usize = 32;

/// Fixed accounting overhead per cached entry (list node, map slot, locks).
pub const ENTRY_OVERHEAD: usize = 160;

struct Body {
    data: Vec<u8>,
    dirty: bool,
    map: Option<HashMap<i64, (u32, u32)>>,
}

pub struct Entry {
    pub rtype: RecordType,
    pub major_id: i64,
    body: RwLock<Body>,
    pins: AtomicI32,
}

impl Entry {
    pub fn new(rtype: RecordType, major_id: i64) -> Self {
        Self {
            rtype,
            major_id,
            body: RwLock::new(Body {
                data: Vec::new(),
                dirty: false,
                map: None,
            }),
            pins: AtomicI32::new(0),
        }
    }

    /// Rehydrates a chunk from its persisted blob; the result is clean.
    pub fn from_blob(rtype: RecordType, major_id: i64, blob: Vec<u8>) -> Self {
        Self {
            rtype,
            major_id,
            body: RwLock::new(Body {
                data: blob,
                dirty: false,
                map: None,
            }),
            pins: AtomicI32::new(0),
        }
    }

    pub fn size(&self) -> usize {
        self.body.read().data.len()
    }

    /// Bytes attributed to this entry by the cache memory estimator.
    pub fn mem(&self) -> usize {
        self.body.read().data.capacity() + ENTRY_OVERHEAD
    }

    pub fn dirty(&self) -> bool {
        self.body.read().dirty
    }

    pub fn clear_dirty(&self) {
        self.body.write().dirty = false;
    }

    pub fn pins(&self) -> i32 {
        self.pins.load(Ordering::Acquire)
    }

    /// Snapshot of the whole chunk, used for write-back on eviction.
    pub fn blob(&self) -> Vec<u8> {
        self.body.read().data.clone()
    }

    fn reserve(&self, body: &mut Body, additional: usize) -> IndexResult<()> {
        let need = body.data.len() + additional;
        if need <= body.data.capacity() {
            return Ok(());
        }
        // Growth moves the buffer; outstanding handles must have been put
        // back first. Offsets survive the move, so the map is kept.
        if self.pins() != 0 {
            return Err(IndexError::Pinned {
                rtype: self.rtype,
                major_id: self.major_id,
            });
        }
        let mut cap = body.data.capacity().max(BASE_CAPACITY);
        while cap < need {
            cap *= 2;
        }
        body.data.reserve_exact(cap - body.data.len());
        Ok(())
    }

    /// Appends one packed record. `loaded` marks bytes rehydrated from the
    /// store, which do not dirty the entry. The record's id must map to this
    /// chunk.
    pub fn append(&self, bytes: &[u8], loaded: bool) -> IndexResult<()> {
        let id = record::id_at(bytes, 0);
        let (major_id, minor_id) = record::split_id(self.rtype, id);
        if major_id != self.major_id {
            return Err(IndexError::WrongChunk {
                rtype: self.rtype,
                id,
                major_id: self.major_id,
            });
        }
        let mut body = self.body.write();
        self.reserve(&mut body, bytes.len())?;
        let off = body.data.len();
        body.data.extend_from_slice(bytes);
        if !loaded {
            body.dirty = true;
        }
        // Map only the new suffix; earlier offsets are untouched.
        if body.map.is_some() {
            let len = record::size_at(self.rtype, &body.data, off);
            if let Some(map) = body.map.as_mut() {
                map.insert(minor_id, (off as u32, len as u32));
            }
        }
        Ok(())
    }

    /// Extends the single TileRefs record with one ref and bumps its count
    /// field in place. The chunk header must already exist.
    pub fn append_tile_ref(&self, r: i64) -> IndexResult<()> {
        debug_assert!(self.rtype.is_tile());
        let mut body = self.body.write();
        debug_assert!(body.data.len() >= record::TILE_REFS_BASE);
        self.reserve(&mut body, 8)?;
        body.data.extend_from_slice(&r.to_le_bytes());
        let count = LittleEndian::read_i32(&body.data[8..]) + 1;
        LittleEndian::write_i32(&mut body.data[8..12], count);
        body.dirty = true;
        let total = body.data.len() as u32;
        if let Some(map) = body.map.as_mut() {
            map.insert(0, (0, total));
        }
        Ok(())
    }

    fn build_map(&self, body: &mut Body) {
        let mut map = HashMap::new();
        let mut off = 0usize;
        while off < body.data.len() {
            let id = record::id_at(&body.data, off);
            let minor = record::split_id(self.rtype, id).1;
            let len = record::size_at(self.rtype, &body.data, off);
            map.insert(minor, (off as u32, len as u32));
            // One logical record per tile chunk.
            if self.rtype.is_tile() {
                break;
            }
            off += len;
        }
        body.map = Some(map);
    }

    /// Looks up a record by its position within the chunk, pinning the entry
    /// for the lifetime of the returned handle.
    pub fn get(self: &Arc<Self>, minor_id: i64) -> Option<Handle> {
        let span = {
            let body = self.body.read();
            match body.map.as_ref() {
                Some(map) => map.get(&minor_id).copied(),
                None => {
                    drop(body);
                    let mut body = self.body.write();
                    if body.map.is_none() {
                        self.build_map(&mut body);
                    }
                    body.map.as_ref().and_then(|m| m.get(&minor_id).copied())
                }
            }
        };
        span.map(|(off, len)| {
            self.pins.fetch_add(1, Ordering::AcqRel);
            Handle {
                entry: Arc::clone(self),
                off,
                len,
            }
        })
    }
}

/// A pinned borrow of one record inside a cached chunk. Dropping the handle
/// releases the pin (the `put` operation).
pub struct Handle {
    entry: Arc<Entry>,
    off: u32,
    len: u32,
}

impl Handle {
    pub fn rtype(&self) -> RecordType {
        self.entry.rtype
    }

    pub fn bytes(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.entry.body.read(), |b| {
            &b.data[self.off as usize..(self.off + self.len) as usize]
        })
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let old = self.entry.pins.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(old > 0, "handle put with no matching pin");
    }
}
