//! The self-describing tile blob: writer with back-patched counts, parser,
//! and the pretty printer behind `select`.
//!
//! Little-endian throughout; every variable-length name is NUL-terminated and
//! padded to four bytes so the following record stays aligned.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::TileError;

pub const TILE_MAGIC: u32 = 0xB00D_90DB;
pub const TILE_VERSION: u32 = 2021_0125;
pub const TILE_HEADER_SIZE: usize = 44;

/// Signed 16-bit tile-local rectangle, `(t, l)` is the corner nearest the
/// tile's top-left.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TileRect {
    pub t: i16,
    pub l: i16,
    pub b: i16,
    pub r: i16,
}

#[derive(Debug, Default, PartialEq)]
pub struct TileHeader {
    pub zoom: i32,
    pub x: i32,
    pub y: i32,
    pub changeset: i64,
    pub count_rels: i32,
    pub count_ways: i32,
    pub count_nodes: i32,
}

#[derive(Debug, Default, PartialEq)]
pub struct WayRec {
    pub class: i32,
    pub layer: i32,
    pub flags: i32,
    pub center: (i16, i16),
    pub range: TileRect,
    pub name: String,
    pub points: Vec<(i16, i16)>,
}

#[derive(Debug, Default, PartialEq)]
pub struct RelRec {
    pub rel_type: i32,
    pub class: i32,
    pub center: (i16, i16),
    pub range: TileRect,
    pub name: String,
    pub ways: Vec<WayRec>,
}

#[derive(Debug, Default, PartialEq)]
pub struct NodeRec {
    pub class: i32,
    pub ele: i32,
    pub pt: (i16, i16),
    pub name: String,
}

#[derive(Debug, Default, PartialEq)]
pub struct Tile {
    pub header: TileHeader,
    pub rels: Vec<RelRec>,
    pub ways: Vec<WayRec>,
    pub nodes: Vec<NodeRec>,
}

fn name_size(name: &str) -> i32 {
    if name.is_empty() {
        0
    } else {
        ((name.len() + 1 + 3) & !3) as i32
    }
}

pub struct TileWriter {
    buf: Vec<u8>,
    count_rels: i32,
    count_ways: i32,
    count_nodes: i32,
    rel_count_off: Option<usize>,
    rel_members: i32,
}

impl TileWriter {
    pub fn begin(zoom: u8, x: u32, y: u32, changeset: i64) -> TileWriter {
        let mut buf = Vec::with_capacity(4096);
        buf.extend_from_slice(&TILE_MAGIC.to_le_bytes());
        buf.extend_from_slice(&TILE_VERSION.to_le_bytes());
        buf.extend_from_slice(&(zoom as i32).to_le_bytes());
        buf.extend_from_slice(&(x as i32).to_le_bytes());
        buf.extend_from_slice(&(y as i32).to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&changeset.to_le_bytes());
        buf.extend_from_slice(&0i32.to_le_bytes());
        buf.extend_from_slice(&0i32.to_le_bytes());
        buf.extend_from_slice(&0i32.to_le_bytes());
        debug_assert_eq!(buf.len(), TILE_HEADER_SIZE);
        TileWriter {
            buf,
            count_rels: 0,
            count_ways: 0,
            count_nodes: 0,
            rel_count_off: None,
            rel_members: 0,
        }
    }

    fn push_name(&mut self, name: &str) {
        if name.is_empty() {
            return;
        }
        let padded = (name.len() + 1 + 3) & !3;
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.resize(self.buf.len() + (padded - name.len()), 0);
    }

    pub fn begin_rel(
        &mut self,
        rel_type: i32,
        class: i32,
        center: (i16, i16),
        range: TileRect,
        name: &str,
    ) {
        debug_assert!(self.rel_count_off.is_none(), "nested relation record");
        self.buf.extend_from_slice(&rel_type.to_le_bytes());
        self.buf.extend_from_slice(&class.to_le_bytes());
        self.buf.extend_from_slice(&center.0.to_le_bytes());
        self.buf.extend_from_slice(&center.1.to_le_bytes());
        self.buf.extend_from_slice(&range.t.to_le_bytes());
        self.buf.extend_from_slice(&range.l.to_le_bytes());
        self.buf.extend_from_slice(&range.b.to_le_bytes());
        self.buf.extend_from_slice(&range.r.to_le_bytes());
        self.buf.extend_from_slice(&name_size(name).to_le_bytes());
        self.rel_count_off = Some(self.buf.len());
        self.buf.extend_from_slice(&0i32.to_le_bytes());
        self.push_name(name);
        self.rel_members = 0;
    }

    pub fn end_rel(&mut self) {
        let off = self.rel_count_off.take().expect("end_rel without begin_rel");
        LittleEndian::write_i32(&mut self.buf[off..off + 4], self.rel_members);
        self.count_rels += 1;
    }

    /// Emits one way record. Inside a `begin_rel`/`end_rel` bracket it counts
    /// as a member of that relation, otherwise as a standalone way.
    pub fn way(
        &mut self,
        class: i32,
        layer: i32,
        flags: i32,
        center: (i16, i16),
        range: TileRect,
        name: &str,
        points: &[(i16, i16)],
    ) {
        self.buf.extend_from_slice(&class.to_le_bytes());
        self.buf.extend_from_slice(&layer.to_le_bytes());
        self.buf.extend_from_slice(&flags.to_le_bytes());
        self.buf.extend_from_slice(&center.0.to_le_bytes());
        self.buf.extend_from_slice(&center.1.to_le_bytes());
        self.buf.extend_from_slice(&range.t.to_le_bytes());
        self.buf.extend_from_slice(&range.l.to_le_bytes());
        self.buf.extend_from_slice(&range.b.to_le_bytes());
        self.buf.extend_from_slice(&range.r.to_le_bytes());
        self.buf.extend_from_slice(&name_size(name).to_le_bytes());
        self.buf.extend_from_slice(&(points.len() as i32).to_le_bytes());
        self.push_name(name);
        for (px, py) in points {
            self.buf.extend_from_slice(&px.to_le_bytes());
            self.buf.extend_from_slice(&py.to_le_bytes());
        }
        if self.rel_count_off.is_some() {
            self.rel_members += 1;
        } else {
            self.count_ways += 1;
        }
    }

    pub fn node(&mut self, class: i32, ele: i32, pt: (i16, i16), name: &str) {
        self.buf.extend_from_slice(&class.to_le_bytes());
        self.buf.extend_from_slice(&ele.to_le_bytes());
        self.buf.extend_from_slice(&pt.0.to_le_bytes());
        self.buf.extend_from_slice(&pt.1.to_le_bytes());
        self.buf.extend_from_slice(&name_size(name).to_le_bytes());
        self.push_name(name);
        self.count_nodes += 1;
    }

    /// Back-patches the three header counts and returns the finished blob.
    pub fn end(mut self) -> Vec<u8> {
        debug_assert!(self.rel_count_off.is_none(), "unfinished relation record");
        LittleEndian::write_i32(&mut self.buf[32..36], self.count_rels);
        LittleEndian::write_i32(&mut self.buf[36..40], self.count_ways);
        LittleEndian::write_i32(&mut self.buf[40..44], self.count_nodes);
        self.buf
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    off: usize,
}

impl<'a> Cursor<'a> {
    fn need(&self, n: usize) -> Result<(), TileError> {
        if self.off + n > self.buf.len() {
            return Err(TileError::Truncated(self.off));
        }
        Ok(())
    }

    fn u32(&mut self) -> Result<u32, TileError> {
        self.need(4)?;
        let v = LittleEndian::read_u32(&self.buf[self.off..]);
        self.off += 4;
        Ok(v)
    }

    fn i32(&mut self) -> Result<i32, TileError> {
        self.need(4)?;
        let v = LittleEndian::read_i32(&self.buf[self.off..]);
        self.off += 4;
        Ok(v)
    }

    fn i64(&mut self) -> Result<i64, TileError> {
        self.need(8)?;
        let v = LittleEndian::read_i64(&self.buf[self.off..]);
        self.off += 8;
        Ok(v)
    }

    fn i16(&mut self) -> Result<i16, TileError> {
        self.need(2)?;
        let v = LittleEndian::read_i16(&self.buf[self.off..]);
        self.off += 2;
        Ok(v)
    }

    fn pt(&mut self) -> Result<(i16, i16), TileError> {
        Ok((self.i16()?, self.i16()?))
    }

    fn rect(&mut self) -> Result<TileRect, TileError> {
        Ok(TileRect {
            t: self.i16()?,
            l: self.i16()?,
            b: self.i16()?,
            r: self.i16()?,
        })
    }

    fn name(&mut self, size_name: i32) -> Result<String, TileError> {
        if size_name < 0 {
            return Err(TileError::BadName);
        }
        let size = size_name as usize;
        if size == 0 {
            return Ok(String::new());
        }
        self.need(size)?;
        let raw = &self.buf[self.off..self.off + size];
        self.off += size;
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        let s = std::str::from_utf8(&raw[..end]).map_err(|_| TileError::BadName)?;
        if !s.is_ascii() {
            return Err(TileError::BadName);
        }
        Ok(s.to_string())
    }

    fn way(&mut self) -> Result<WayRec, TileError> {
        let class = self.i32()?;
        let layer = self.i32()?;
        let flags = self.i32()?;
        let center = self.pt()?;
        let range = self.rect()?;
        let size_name = self.i32()?;
        let count = self.i32()?;
        let name = self.name(size_name)?;
        let mut points = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            points.push(self.pt()?);
        }
        Ok(WayRec {
            class,
            layer,
            flags,
            center,
            range,
            name,
            points,
        })
    }
}

/// Decodes a tile blob produced by [`TileWriter`].
pub fn parse(buf: &[u8]) -> Result<Tile, TileError> {
    let mut c = Cursor { buf, off: 0 };
    let magic = c.u32()?;
    if magic != TILE_MAGIC {
        return Err(TileError::BadMagic(magic));
    }
    let version = c.u32()?;
    if version != TILE_VERSION {
        return Err(TileError::BadVersion(version));
    }
    let zoom = c.i32()?;
    let x = c.i32()?;
    let y = c.i32()?;
    let _pad = c.u32()?;
    let changeset = c.i64()?;
    let count_rels = c.i32()?;
    let count_ways = c.i32()?;
    let count_nodes = c.i32()?;

    let mut tile = Tile {
        header: TileHeader {
            zoom,
            x,
            y,
            changeset,
            count_rels,
            count_ways,
            count_nodes,
        },
        ..Default::default()
    };

    for _ in 0..count_rels {
        let rel_type = c.i32()?;
        let class = c.i32()?;
        let center = c.pt()?;
        let range = c.rect()?;
        let size_name = c.i32()?;
        let count = c.i32()?;
        let name = c.name(size_name)?;
        let mut ways = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            ways.push(c.way()?);
        }
        tile.rels.push(RelRec {
            rel_type,
            class,
            center,
            range,
            name,
            ways,
        });
    }
    for _ in 0..count_ways {
        tile.ways.push(c.way()?);
    }
    for _ in 0..count_nodes {
        let class = c.i32()?;
        let ele = c.i32()?;
        let pt = c.pt()?;
        let size_name = c.i32()?;
        let name = c.name(size_name)?;
        tile.nodes.push(NodeRec {
            class,
            ele,
            pt,
            name,
        });
    }
    if c.off != buf.len() {
        return Err(TileError::Truncated(c.off));
    }
    Ok(tile)
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = &self.header;
        writeln!(
            f,
            "tile {}/{}/{} changeset={} rels={} ways={} nodes={}",
            h.zoom, h.x, h.y, h.changeset, h.count_rels, h.count_ways, h.count_nodes
        )?;
        for rel in &self.rels {
            writeln!(
                f,
                "  rel type={} class={} name={:?} center=({},{}) members={}",
                rel.rel_type,
                rel.class,
                rel.name,
                rel.center.0,
                rel.center.1,
                rel.ways.len()
            )?;
            for way in &rel.ways {
                writeln!(
                    f,
                    "    way class={} layer={} flags={:#x} name={:?} points={}",
                    way.class,
                    way.layer,
                    way.flags,
                    way.name,
                    way.points.len()
                )?;
            }
        }
        for way in &self.ways {
            writeln!(
                f,
                "  way class={} layer={} flags={:#x} name={:?} points={}",
                way.class,
                way.layer,
                way.flags,
                way.name,
                way.points.len()
            )?;
        }
        for node in &self.nodes {
            writeln!(
                f,
                "  node class={} ele={} pt=({},{}) name={:?}",
                node.class, node.ele, node.pt.0, node.pt.1, node.name
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_tile_is_exactly_one_header() {
        let blob = TileWriter::begin(3, 0, 0, 0).end();
        assert_eq!(blob.len(), TILE_HEADER_SIZE);
        let tile = parse(&blob).unwrap();
        assert_eq!(tile.header.count_rels, 0);
        assert_eq!(tile.header.count_ways, 0);
        assert_eq!(tile.header.count_nodes, 0);
        assert_eq!(tile.header.changeset, 0);
    }

    #[test]
    fn round_trip_all_record_kinds() {
        let mut w = TileWriter::begin(14, 3411, 6208, 123_456_789);
        w.begin_rel(
            1,
            30,
            (12, -80),
            TileRect {
                t: -100,
                l: 200,
                b: 300,
                r: -400,
            },
            "Test Park",
        );
        w.way(
            30,
            0,
            0x80,
            (0, 0),
            TileRect::default(),
            "",
            &[(0, 0), (100, 150), (-30, 99)],
        );
        w.end_rel();
        w.way(
            10,
            -1,
            0x04,
            (5, 6),
            TileRect {
                t: 1,
                l: 2,
                b: 3,
                r: 4,
            },
            "I-70",
            &[(1, 2), (3, 4)],
        );
        w.node(50, 14439, (-12000, 11000), "Mount Elbert");
        let blob = w.end();

        let tile = parse(&blob).unwrap();
        assert_eq!(tile.header.count_rels, 1);
        assert_eq!(tile.header.count_ways, 1);
        assert_eq!(tile.header.count_nodes, 1);
        assert_eq!(tile.rels[0].name, "Test Park");
        assert_eq!(tile.rels[0].ways.len(), 1);
        assert_eq!(tile.rels[0].ways[0].flags, 0x80);
        assert_eq!(tile.rels[0].ways[0].points.len(), 3);
        assert_eq!(tile.ways[0].name, "I-70");
        assert_eq!(tile.ways[0].points, vec![(1, 2), (3, 4)]);
        assert_eq!(tile.nodes[0].name, "Mount Elbert");
        assert_eq!(tile.nodes[0].ele, 14439);

        // Serialising the parsed tile again yields identical bytes.
        let mut w2 = TileWriter::begin(
            tile.header.zoom as u8,
            tile.header.x as u32,
            tile.header.y as u32,
            tile.header.changeset,
        );
        for rel in &tile.rels {
            w2.begin_rel(rel.rel_type, rel.class, rel.center, rel.range, &rel.name);
            for way in &rel.ways {
                w2.way(
                    way.class, way.layer, way.flags, way.center, way.range, &way.name,
                    &way.points,
                );
            }
            w2.end_rel();
        }
        for way in &tile.ways {
            w2.way(
                way.class, way.layer, way.flags, way.center, way.range, &way.name, &way.points,
            );
        }
        for node in &tile.nodes {
            w2.node(node.class, node.ele, node.pt, &node.name);
        }
        assert_eq!(w2.end(), blob);
    }

    #[test]
    fn rejects_foreign_blobs() {
        assert_eq!(parse(&[0u8; 8]).err(), Some(TileError::BadMagic(0)));
        let mut blob = TileWriter::begin(3, 0, 0, 0).end();
        blob.truncate(20);
        assert_eq!(parse(&blob).err(), Some(TileError::Truncated(20)));
        let mut bad = TileWriter::begin(3, 0, 0, 0).end();
        LittleEndian::write_u32(&mut bad[4..8], 1999);
        assert_eq!(parse(&bad).err(), Some(TileError::BadVersion(1999)));
    }

    #[test]
    fn records_stay_four_byte_aligned() {
        let mut w = TileWriter::begin(14, 0, 0, 0);
        w.node(1, 0, (0, 0), "abc"); // 3 chars -> 4-byte name payload
        w.node(2, 0, (0, 0), "abcd"); // 4 chars -> 8-byte name payload
        let blob = w.end();
        assert_eq!(blob.len() % 4, 0);
        assert_eq!(blob.len(), TILE_HEADER_SIZE + (16 + 4) + (16 + 8));
        parse(&blob).unwrap();
    }
}
