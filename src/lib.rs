pub mod ascii;
pub mod commands;
pub mod entry;
pub mod error;
pub mod geom;
pub mod import;
pub mod index;
pub mod logging;
pub mod record;
pub mod style;
pub mod tile;
pub mod tilestore;

/// Ids are bucketed into chunks of this many consecutive ids; a chunk is the
/// unit of storage, caching and eviction.
pub const CHUNK_SIZE: i64 = 100;

/// Precomputed reverse-index zoom levels. Every selected entity is indexed at
/// both; the tile builder picks whichever is closest from below.
pub const ZOOM_LO: u8 = 11;
pub const ZOOM_HI: u8 = 14;

/// Write operations per transaction during import.
pub const BATCH_SIZE: u32 = 10_000;

/// Tiles are enlarged by this fraction of their span on each side when
/// reverse-indexing and clipping, so geometry near an edge lands in both
/// neighbouring tiles.
pub const TILE_BORDER: f64 = 1.0 / 16.0;
