use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::info;

use crate::index::Index;
use crate::tile::{blob, TileBuilder};
use crate::tilestore::STORE_EXT;

/// Parses a `/osmdbv*/zoom/x/y` tile path.
fn parse_tile_path(path: &str) -> Option<(u8, u32, u32)> {
    let mut parts = path.trim_start_matches('/').split('/');
    let name = parts.next()?;
    if !name.starts_with("osmdbv") {
        return None;
    }
    let zoom: u8 = parts.next()?.parse().ok()?;
    let x: u32 = parts.next()?.parse().ok()?;
    let y: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || zoom > 15 {
        return None;
    }
    (x < (1u32 << zoom) && y < (1u32 << zoom)).then_some((zoom, x, y))
}

/// Builds one tile from the index, writes its blob next to the caller and
/// pretty-prints the decoded content.
pub fn cmd_select(db_path: &Path, tile_path: &str, out: Option<&Path>, smem: f64) -> Result<()> {
    let Some((zoom, x, y)) = parse_tile_path(tile_path) else {
        bail!("bad tile path {tile_path} (expected /osmdbv6/zoom/x/y)");
    };

    let index = Index::open_readonly(db_path, smem, 1)?;
    let mut builder = TileBuilder::new(&index, 0);
    let bytes = builder.build(zoom, x, y)?;

    let out_path = out
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("{zoom}-{x}-{y}.{STORE_EXT}")));
    std::fs::write(&out_path, &bytes)
        .with_context(|| format!("write {}", out_path.display()))?;
    info!("wrote {} ({} bytes)", out_path.display(), bytes.len());

    let tile = blob::parse(&bytes).context("decode built tile")?;
    print!("{tile}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_paths() {
        assert_eq!(parse_tile_path("/osmdbv6/14/3411/6208"), Some((14, 3411, 6208)));
        assert_eq!(parse_tile_path("osmdbv5/3/1/2"), Some((3, 1, 2)));
        assert_eq!(parse_tile_path("/osmdbv6/14/3411"), None);
        assert_eq!(parse_tile_path("/tiles/14/3411/6208"), None);
        assert_eq!(parse_tile_path("/osmdbv6/14/3411/6208/9"), None);
        // Out of range for the zoom.
        assert_eq!(parse_tile_path("/osmdbv6/3/9/0"), None);
    }
}
