use std::path::Path;
use std::sync::mpsc;
use std::thread;

use anyhow::{bail, Result};
use log::{info, warn};
use rayon::prelude::*;

use crate::geom::{self, Rect};
use crate::index::Index;
use crate::tile::blob::TILE_HEADER_SIZE;
use crate::tile::TileBuilder;
use crate::tilestore::{TileStore, STORE_EXT, STORE_NAME, STORE_PATTERN};

/// Zoom levels materialised into the flat store.
const PREFETCH_ZOOMS: [u8; 7] = [3, 5, 7, 9, 11, 13, 15];

/// Store writes per transaction.
const WRITE_BATCH: usize = 256;

/// Named prefetch regions.
fn region_bounds(pf: &str) -> Option<Rect> {
    let rect = match pf {
        "CO" => Rect {
            lat_t: 41.0,
            lon_l: -109.05,
            lat_b: 37.0,
            lon_r: -102.05,
        },
        "US" => Rect {
            lat_t: 49.4,
            lon_l: -124.9,
            lat_b: 24.4,
            lon_r: -66.9,
        },
        "WW" => Rect {
            lat_t: 85.05,
            lon_l: -180.0,
            lat_b: -85.05,
            lon_r: 180.0,
        },
        _ => return None,
    };
    Some(rect)
}

/// Builds every tile of the region at the prefetch zooms with `nth` worker
/// threads sharing one read-only index, and stores the non-empty ones.
pub fn cmd_prefetch(
    pf: &str,
    smem: f64,
    cache_path: &Path,
    db_path: &Path,
    threads: Option<usize>,
) -> Result<()> {
    let Some(bounds) = region_bounds(pf) else {
        bail!("unknown prefetch region {pf} (expected CO, US or WW)");
    };
    let nth = threads
        .or_else(|| thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(1)
        .max(1);

    let index = Index::open_readonly(db_path, smem, nth)?;
    let changeset = index.changeset()?;
    let store = TileStore::create(cache_path)?;

    // One job per tile row; a per-tile list would not scale to WW at the
    // deepest zoom.
    let mut rows: Vec<(u8, u32, u32, u32)> = Vec::new();
    let mut total: u64 = 0;
    for zoom in PREFETCH_ZOOMS {
        let (x0, x1, y0, y1) = geom::tile_range(zoom, &bounds, 0.0);
        for y in y0..=y1 {
            rows.push((zoom, y, x0, x1));
            total += (x1 - x0 + 1) as u64;
        }
    }
    info!(
        "prefetch {pf}: {total} tiles at zooms {:?} with {nth} threads",
        PREFETCH_ZOOMS
    );

    let pool = rayon::ThreadPoolBuilder::new().num_threads(nth).build()?;
    let (tx, rx) = mpsc::channel::<(u8, u32, u32, Vec<u8>)>();

    let index_ref = &index;
    thread::scope(|s| -> Result<()> {
        s.spawn(move || {
            pool.install(|| {
                // The channel sender is cloned per split; builder state is
                // lazily created with the worker's own loading-slot id.
                rows.par_iter().for_each_with(
                    (tx, None::<TileBuilder<'_>>),
                    |(tx, builder), &(zoom, y, x0, x1)| {
                        let tid = rayon::current_thread_index().unwrap_or(0);
                        let b = builder.get_or_insert_with(|| TileBuilder::new(index_ref, tid));
                        b.set_tid(tid);
                        for x in x0..=x1 {
                            match b.build(zoom, x, y) {
                                Ok(blob) => {
                                    // Header-only tiles carry nothing worth storing.
                                    if blob.len() > TILE_HEADER_SIZE {
                                        let _ = tx.send((zoom, x, y, blob));
                                    }
                                }
                                Err(e) => warn!("tile {zoom}/{x}/{y} aborted: {e}"),
                            }
                        }
                    },
                );
            });
            // Workers' channel clones are dropped here, closing the stream.
        });

        let mut stored = 0usize;
        let mut in_batch = 0usize;
        for (zoom, x, y, blob) in rx {
            if in_batch == 0 {
                store.begin()?;
            }
            store.put_tile(zoom, x, y, &blob)?;
            stored += 1;
            in_batch += 1;
            if in_batch >= WRITE_BATCH {
                store.commit()?;
                in_batch = 0;
            }
        }
        if in_batch > 0 {
            store.commit()?;
        }
        info!("prefetch stored {stored} tiles");
        Ok(())
    })?;

    store.set_attr("name", STORE_NAME)?;
    store.set_attr("pattern", STORE_PATTERN)?;
    store.set_attr("ext", STORE_EXT)?;
    store.set_attr(
        "bounds",
        &format!(
            "{} {} {} {}",
            bounds.lat_t, bounds.lon_l, bounds.lat_b, bounds.lon_r
        ),
    )?;
    store.set_attr("zmin", &PREFETCH_ZOOMS[0].to_string())?;
    store.set_attr(
        "zmax",
        &PREFETCH_ZOOMS[PREFETCH_ZOOMS.len() - 1].to_string(),
    )?;
    store.set_attr("changeset", &changeset.to_string())?;
    Ok(())
}
