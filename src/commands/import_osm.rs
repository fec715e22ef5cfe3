use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use crate::import::{xml, Importer};
use crate::index::Index;
use crate::style::Style;

/// Imports one OSM XML extract into a fresh (or, with `append`, existing)
/// index database.
pub fn cmd_import_osm(
    style_path: &Path,
    osm_path: &Path,
    db_path: &Path,
    smem: f64,
    append: bool,
) -> Result<()> {
    info!("importing {} into {}", osm_path.display(), db_path.display());
    let style = Style::load(style_path)?;

    let file = File::open(osm_path).with_context(|| format!("open {}", osm_path.display()))?;
    let total = file.metadata().ok().map(|m| m.len());

    let index = if append {
        Index::append(db_path, smem)?
    } else {
        Index::create(db_path, smem)?
    };

    let stats = {
        let mut importer = Importer::new(&index, &style);
        xml::run(BufReader::new(file), total, &mut importer)?;
        importer.stats().clone()
    };
    index.close()?;

    info!(
        "import done: changeset={} nodes={} ({} selected) ways={} ({} selected) rels={} ({} selected) discarded={}",
        stats.changeset,
        stats.nodes,
        stats.selected_nodes,
        stats.ways,
        stats.selected_ways,
        stats.rels,
        stats.selected_rels,
        stats.discarded
    );
    Ok(())
}
