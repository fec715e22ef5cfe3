use std::collections::HashMap;
use std::thread;

use osmdb::index::Index;
use osmdb::record::{self, RecordType};
use tempfile::NamedTempFile;

/// Eviction under a tiny cache target must never lose or corrupt a record:
/// every add is readable afterwards, byte for byte.
#[test]
fn eviction_round_trip_is_byte_identical() {
    let f = NamedTempFile::new().unwrap();
    let mut expected: HashMap<i64, Vec<u8>> = HashMap::new();
    {
        // ~2 KB target: every few adds force an eviction pass.
        let index = Index::create(f.path(), 2e-6).unwrap();
        for i in 0..1000i64 {
            // Spread ids over many chunks, with names of varying length.
            let id = (i * 37) % 10_000;
            let name = "x".repeat((i % 23) as usize);
            let blob = record::pack_node_info(id, (i % 90) as i32, 0, i as i32, &name);
            if expected.contains_key(&id) {
                continue;
            }
            index.add(RecordType::NodeInfo, id, &blob).unwrap();
            expected.insert(id, blob);
        }
        assert!(index.stats().evictions > 0, "target too large to exercise eviction");
        // Re-read everything while still in CREATE mode.
        for (id, blob) in &expected {
            let h = index
                .get(0, RecordType::NodeInfo, *id)
                .unwrap()
                .unwrap_or_else(|| panic!("record {id} lost"));
            assert_eq!(&*h.bytes(), &blob[..], "record {id} bytes changed");
        }
        index.close().unwrap();
    }

    // And again from a cold read-only open.
    let index = Index::open_readonly(f.path(), 1.0, 1).unwrap();
    index.lock();
    for (id, blob) in &expected {
        let h = index
            .get(0, RecordType::NodeInfo, *id)
            .unwrap()
            .unwrap_or_else(|| panic!("record {id} not persisted"));
        assert_eq!(&*h.bytes(), &blob[..]);
    }
    index.unlock();
}

/// Four reader threads hammering the same key set: the no-duplicate-loaders
/// rule means each chunk is fetched from SQL at most once.
#[test]
fn concurrent_readers_load_each_chunk_once() {
    let f = NamedTempFile::new().unwrap();
    let chunks = 5i64;
    {
        let index = Index::create(f.path(), 1.0).unwrap();
        for id in 0..chunks * 100 {
            index
                .add(
                    RecordType::NodeCoord,
                    id,
                    &record::pack_node_coord(id, id as f64 * 1e-4, -105.0),
                )
                .unwrap();
        }
        index.close().unwrap();
    }

    let nth = 4;
    let index = Index::open_readonly(f.path(), 1.0, nth).unwrap();
    thread::scope(|s| {
        for tid in 0..nth {
            let index = &index;
            s.spawn(move || {
                index.lock();
                for id in 0..chunks * 100 {
                    let h = index
                        .get(tid, RecordType::NodeCoord, id)
                        .unwrap()
                        .expect("seeded record");
                    let b = h.bytes();
                    assert_eq!(record::NodeCoordView::new(&b).nid(), id);
                }
                index.unlock();
            });
        }
    });

    let stats = index.stats();
    assert!(
        stats.sql_loads <= chunks as u64,
        "chunk loaded more than once: {} loads for {} chunks",
        stats.sql_loads,
        chunks
    );
    assert!(stats.hits > 0);
}

/// A record that was never added reads as None through every mode, and the
/// miss does not poison the cache for later hits.
#[test]
fn absent_records_are_null_not_error() {
    let f = NamedTempFile::new().unwrap();
    {
        let index = Index::create(f.path(), 1.0).unwrap();
        index
            .add(
                RecordType::NodeCoord,
                42,
                &record::pack_node_coord(42, 1.0, 2.0),
            )
            .unwrap();
        index.close().unwrap();
    }
    let index = Index::open_readonly(f.path(), 1.0, 2).unwrap();
    index.lock();
    // Chunk exists, record absent.
    assert!(index.get(0, RecordType::NodeCoord, 43).unwrap().is_none());
    // Chunk absent entirely.
    assert!(index.get(0, RecordType::NodeCoord, 4300).unwrap().is_none());
    // The earlier misses left the present record reachable.
    assert!(index.get(0, RecordType::NodeCoord, 42).unwrap().is_some());
    index.unlock();
}

/// APPEND reopens an existing store and later readers see both generations.
#[test]
fn append_mode_extends_an_existing_store() {
    let f = NamedTempFile::new().unwrap();
    {
        let index = Index::create(f.path(), 1.0).unwrap();
        index
            .add(RecordType::NodeCoord, 1, &record::pack_node_coord(1, 1.0, 1.0))
            .unwrap();
        index.set_changeset(10).unwrap();
        index.close().unwrap();
    }
    {
        let index = Index::append(f.path(), 1.0).unwrap();
        assert_eq!(index.changeset().unwrap(), 10);
        index
            .add(RecordType::NodeCoord, 2, &record::pack_node_coord(2, 2.0, 2.0))
            .unwrap();
        index.set_changeset(11).unwrap();
        index.close().unwrap();
    }
    let index = Index::open_readonly(f.path(), 1.0, 1).unwrap();
    assert_eq!(index.changeset().unwrap(), 11);
    index.lock();
    assert!(index.get(0, RecordType::NodeCoord, 1).unwrap().is_some());
    assert!(index.get(0, RecordType::NodeCoord, 2).unwrap().is_some());
    index.unlock();
}
