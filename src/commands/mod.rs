pub mod import_osm;
pub mod prefetch;
pub mod select;
