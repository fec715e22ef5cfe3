//! The tile builder: gathers relations, ways and nodes for one requested
//! tile from the reverse indices, runs join / sample / clip over the working
//! segments, and serialises the result as a tile blob.

pub mod blob;
pub mod segment;

use std::collections::{HashMap, HashSet};

use crate::error::IndexResult;
use crate::geom::{self, Rect};
use crate::index::Index;
use crate::record::{self, RecordType};
use crate::{TILE_BORDER, ZOOM_HI, ZOOM_LO};

use self::blob::{TileRect, TileWriter};
use self::segment::{ClipFrame, SegNode, Segment};

const KIND_NODE: u8 = b'N';
const KIND_WAY: u8 = b'W';
const KIND_REL: u8 = b'R';

/// Per-thread builder state, reusable across tiles.
#[derive(Clone)]
pub struct TileBuilder<'a> {
    index: &'a Index,
    tid: usize,
    map_export: HashSet<(u8, i64)>,
    map_segs: HashMap<i64, Segment>,
    mm_nds_join: HashMap<i64, Vec<i64>>,
}

struct Frame {
    zoom: u8,
    x: u32,
    y: u32,
}

impl<'a> TileBuilder<'a> {
    pub fn new(index: &'a Index, tid: usize) -> TileBuilder<'a> {
        TileBuilder {
            index,
            tid,
            map_export: HashSet::new(),
            map_segs: HashMap::new(),
            mm_nds_join: HashMap::new(),
        }
    }

    /// Worker thread id used for the index's loading slots; must be unique
    /// among threads sharing the index.
    pub fn set_tid(&mut self, tid: usize) {
        self.tid = tid;
    }

    /// Builds the blob for one tile. A store error aborts this tile only;
    /// the builder state is reusable afterwards.
    pub fn build(&mut self, zoom: u8, x: u32, y: u32) -> IndexResult<Vec<u8>> {
        self.map_export.clear();
        self.map_segs.clear();
        self.mm_nds_join.clear();

        let changeset = self.index.changeset()?;
        let mut w = TileWriter::begin(zoom, x, y, changeset);
        let frame = Frame { zoom, x, y };

        self.index.lock();
        let built = self.build_inner(&mut w, &frame);
        self.index.unlock();
        built?;
        Ok(w.end())
    }

    fn build_inner(&mut self, w: &mut TileWriter, frame: &Frame) -> IndexResult<()> {
        // Nearest precomputed zoom covering this tile.
        let rz = if frame.zoom >= ZOOM_HI { ZOOM_HI } else { ZOOM_LO };
        let (rel_t, way_t, node_t) = if rz == ZOOM_HI {
            (
                RecordType::RelTileHi,
                RecordType::WayTileHi,
                RecordType::NodeTileHi,
            )
        } else {
            (
                RecordType::RelTileLo,
                RecordType::WayTileLo,
                RecordType::NodeTileLo,
            )
        };

        let rect = geom::tile_bounds(frame.zoom, frame.x, frame.y, TILE_BORDER);
        let (x0, x1, y0, y1) = geom::tile_range(rz, &rect, TILE_BORDER);

        // Relations first; their member ways suppress standalone emission.
        for rid in self.gather_refs(rel_t, rz, x0, x1, y0, y1)? {
            self.process_rel(w, frame, rid)?;
        }

        // Standalone ways.
        for wid in self.gather_refs(way_t, rz, x0, x1, y0, y1)? {
            if self.map_export.contains(&(KIND_WAY, wid)) || self.map_segs.contains_key(&wid) {
                continue;
            }
            if let Some(seg) = self.fetch_segment(wid, false, false, None)? {
                self.map_export.insert((KIND_WAY, wid));
                self.push_segment(seg);
            }
        }
        self.run_passes(frame);
        self.emit_segments(w, frame);

        // Nodes last, skipping everything already on the tile.
        for nid in self.gather_refs(node_t, rz, x0, x1, y0, y1)? {
            if !self.map_export.insert((KIND_NODE, nid)) {
                continue;
            }
            self.emit_node(w, frame, nid)?;
        }
        Ok(())
    }

    /// Ids listed by one TileRefs kind over the covering ref-tile range, in
    /// encounter order.
    fn gather_refs(
        &mut self,
        rtype: RecordType,
        rz: u8,
        x0: u32,
        x1: u32,
        y0: u32,
        y1: u32,
    ) -> IndexResult<Vec<i64>> {
        let mut out = Vec::new();
        for ty in y0..=y1 {
            for tx in x0..=x1 {
                let major = geom::tile_major_id(rz, tx, ty);
                if let Some(h) = self.index.get(self.tid, rtype, major)? {
                    let b = h.bytes();
                    out.extend(record::TileRefsView::new(&b).refs());
                }
            }
        }
        Ok(out)
    }

    fn node_coord(&self, nid: i64) -> IndexResult<Option<(f64, f64)>> {
        Ok(self
            .index
            .get(self.tid, RecordType::NodeCoord, nid)?
            .map(|h| {
                let b = h.bytes();
                let v = record::NodeCoordView::new(&b);
                (v.lat(), v.lon())
            }))
    }

    /// Builds a working segment for a way: info fields plus nds with their
    /// coords copied in. Absent coords are skipped; a segment with fewer than
    /// two resolvable nds is not worth gathering.
    ///
    /// `class_override` carries the owning relation's class for member ways.
    fn fetch_segment(
        &self,
        wid: i64,
        member: bool,
        inner: bool,
        class_override: Option<i32>,
    ) -> IndexResult<Option<Segment>> {
        let (mut class, mut flags, layer, name) =
            match self.index.get(self.tid, RecordType::WayInfo, wid)? {
                Some(h) => {
                    let b = h.bytes();
                    let v = record::WayInfoView::new(&b);
                    (
                        v.class(),
                        v.flags(),
                        v.layer(),
                        v.name().unwrap_or("").to_string(),
                    )
                }
                None => (0, 0, 0, String::new()),
            };
        if let Some(c) = class_override {
            class = c;
        }
        if inner {
            flags |= record::FLAG_INNER;
        }
        let nds: Vec<i64> = match self.index.get(self.tid, RecordType::WayNds, wid)? {
            Some(h) => {
                let b = h.bytes();
                record::WayNdsView::new(&b).nds().collect()
            }
            None => return Ok(None),
        };
        let mut seg_nds = Vec::with_capacity(nds.len());
        for nid in nds {
            if let Some((lat, lon)) = self.node_coord(nid)? {
                seg_nds.push(SegNode { nid, lat, lon });
            }
        }
        if seg_nds.len() < 2 {
            return Ok(None);
        }
        Ok(Some(Segment {
            wid,
            class,
            flags,
            layer,
            name: if member { String::new() } else { name },
            member,
            inner,
            nds: seg_nds,
        }))
    }

    fn push_segment(&mut self, seg: Segment) {
        self.mm_nds_join
            .entry(seg.first_nid())
            .or_default()
            .push(seg.wid);
        self.mm_nds_join
            .entry(seg.last_nid())
            .or_default()
            .push(seg.wid);
        self.map_segs.insert(seg.wid, seg);
    }

    fn run_passes(&mut self, frame: &Frame) {
        segment::join_ways(&mut self.map_segs, &mut self.mm_nds_join);
        segment::sample_ways(
            &mut self.map_segs,
            geom::sample_min_dist(frame.zoom, frame.x, frame.y),
        );
        segment::clip_ways(
            &mut self.map_segs,
            &ClipFrame::new(frame.zoom, frame.x, frame.y, TILE_BORDER),
        );
    }

    fn tile_rect(&self, frame: &Frame, rect: &Rect) -> TileRect {
        let (l, t) = geom::tile_local(frame.zoom, frame.x, frame.y, rect.lat_t, rect.lon_l);
        let (r, b) = geom::tile_local(frame.zoom, frame.x, frame.y, rect.lat_b, rect.lon_r);
        TileRect { t, l, b, r }
    }

    /// Emits all surviving segments as way records, in wid order so a tile's
    /// bytes are deterministic.
    fn emit_segments(&mut self, w: &mut TileWriter, frame: &Frame) {
        let mut wids: Vec<i64> = self.map_segs.keys().copied().collect();
        wids.sort_unstable();
        for wid in wids {
            let seg = &self.map_segs[&wid];
            let Some(range) = seg.range() else { continue };
            let (clat, clon) = range.center();
            let center = geom::tile_local(frame.zoom, frame.x, frame.y, clat, clon);
            let rect = self.tile_rect(frame, &range);
            let points: Vec<(i16, i16)> = seg
                .nds
                .iter()
                .map(|n| geom::tile_local(frame.zoom, frame.x, frame.y, n.lat, n.lon))
                .collect();
            w.way(
                seg.class, seg.layer, seg.flags, center, rect, &seg.name, &points,
            );
        }
        self.map_segs.clear();
        self.mm_nds_join.clear();
    }

    fn emit_node(&mut self, w: &mut TileWriter, frame: &Frame, nid: i64) -> IndexResult<()> {
        let Some(h) = self.index.get(self.tid, RecordType::NodeInfo, nid)? else {
            return Ok(());
        };
        let (class, ele, name) = {
            let b = h.bytes();
            let v = record::NodeInfoView::new(&b);
            (v.class(), v.ele(), v.name().unwrap_or("").to_string())
        };
        drop(h);
        let Some((lat, lon)) = self.node_coord(nid)? else {
            return Ok(());
        };
        let pt = geom::tile_local(frame.zoom, frame.x, frame.y, lat, lon);
        w.node(class, ele, pt, &name);
        Ok(())
    }

    fn process_rel(&mut self, w: &mut TileWriter, frame: &Frame, rid: i64) -> IndexResult<()> {
        if !self.map_export.insert((KIND_REL, rid)) {
            return Ok(());
        }
        let Some(h) = self.index.get(self.tid, RecordType::RelInfo, rid)? else {
            return Ok(());
        };
        let (label_nid, class, rel_type, name) = {
            let b = h.bytes();
            let v = record::RelInfoView::new(&b);
            (
                v.nid(),
                v.class(),
                v.rel_type(),
                v.name().unwrap_or("").to_string(),
            )
        };
        drop(h);
        let Some(h) = self.index.get(self.tid, RecordType::RelRange, rid)? else {
            return Ok(());
        };
        let range = {
            let b = h.bytes();
            let v = record::RelRangeView::new(&b);
            Rect {
                lat_t: v.lat_t(),
                lon_l: v.lon_l(),
                lat_b: v.lat_b(),
                lon_r: v.lon_r(),
            }
        };
        drop(h);

        // The label node anchors the relation; its own point record would be
        // a duplicate.
        let label_coord = if label_nid != 0 {
            self.node_coord(label_nid)?
        } else {
            None
        };
        let center_ll = label_coord.unwrap_or_else(|| range.center());
        let center = geom::tile_local(frame.zoom, frame.x, frame.y, center_ll.0, center_ll.1);
        w.begin_rel(rel_type, class, center, self.tile_rect(frame, &range), &name);

        let members: Vec<record::Member> =
            match self.index.get(self.tid, RecordType::RelMembers, rid)? {
                Some(h) => {
                    let b = h.bytes();
                    record::RelMembersView::new(&b).members().collect()
                }
                None => Vec::new(),
            };
        for m in members {
            if self.map_segs.contains_key(&m.wid) {
                continue;
            }
            let own_name = self
                .index
                .get(self.tid, RecordType::WayInfo, m.wid)?
                .and_then(|h| {
                    let b = h.bytes();
                    record::WayInfoView::new(&b).name().map(str::to_string)
                })
                .unwrap_or_default();
            if let Some(seg) = self.fetch_segment(m.wid, true, m.inner, Some(class))? {
                // A member with its own distinct name still appears as a
                // standalone way later.
                if own_name.is_empty() || own_name == name {
                    self.map_export.insert((KIND_WAY, m.wid));
                }
                self.push_segment(seg);
            }
        }
        self.run_passes(frame);
        self.emit_segments(w, frame);
        w.end_rel();

        if label_nid != 0 {
            self.map_export.insert((KIND_NODE, label_nid));
        }
        Ok(())
    }
}
