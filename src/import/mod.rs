//! The import pipeline: a streaming consumer of OSM XML events that
//! classifies nodes, ways and relations, normalises names, computes
//! geometric ranges and writes packed records plus reverse tile indices
//! into the blob index.

pub mod name;
pub mod xml;

use anyhow::Result;

use crate::ascii;
use crate::geom::{self, Rect};
use crate::index::Index;
use crate::record::{self, Member, RecordType};
use crate::style::Style;
use crate::{TILE_BORDER, ZOOM_HI, ZOOM_LO};

/// Values longer than this are discarded as malformed.
const MAX_TAG_LEN: usize = 255;

/// Relations covering more than this many square degrees keep their tile
/// index but not their member list.
const REL_AREA_MAX_DEG2: f64 = 0.002;

#[derive(Debug, Clone, Default)]
pub struct ImportStats {
    pub nodes: u64,
    pub ways: u64,
    pub rels: u64,
    pub selected_nodes: u64,
    pub selected_ways: u64,
    pub selected_rels: u64,
    pub discarded: u64,
    pub changeset: i64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Scope {
    Top,
    Node,
    Way,
    Rel,
    /// Element with unusable attributes; children are ignored.
    Skip,
}

/// Tag state accumulated for the current element.
#[derive(Debug, Clone, Default)]
struct Tags {
    class: i32,
    flags: i32,
    layer: i32,
    name: Option<String>,
    name_en: bool,
    highway_name: bool,
    reference: Option<String>,
    junction_ref: Option<String>,
    ele_ft: Option<i32>,
    ele_m: Option<i32>,
    capital: bool,
    state_capital: bool,
    protect_class: Option<String>,
    ownership: Option<String>,
    rel_type: i32,
}

pub struct Importer<'a> {
    index: &'a Index,
    style: &'a Style,
    scope: Scope,
    id: i64,
    lat: f64,
    lon: f64,
    tags: Tags,
    nds: Vec<i64>,
    members: Vec<Member>,
    label_nid: i64,
    stats: ImportStats,
}

fn attr<'v>(attrs: &'v [(String, String)], key: &str) -> Option<&'v str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn attr_i64(attrs: &[(String, String)], key: &str) -> Option<i64> {
    attr(attrs, key).and_then(|v| v.parse().ok())
}

fn attr_f64(attrs: &[(String, String)], key: &str) -> Option<f64> {
    attr(attrs, key).and_then(|v| v.parse().ok())
}

impl<'a> Importer<'a> {
    pub fn new(index: &'a Index, style: &'a Style) -> Importer<'a> {
        Importer {
            index,
            style,
            scope: Scope::Top,
            id: 0,
            lat: 0.0,
            lon: 0.0,
            tags: Tags::default(),
            nds: Vec::new(),
            members: Vec::new(),
            label_nid: 0,
            stats: ImportStats::default(),
        }
    }

    pub fn stats(&self) -> &ImportStats {
        &self.stats
    }

    pub fn note_discard(&mut self) {
        self.stats.discarded += 1;
    }

    /// Cache memory estimate of the backing index, for progress logs.
    pub fn index_mem(&self) -> usize {
        self.index.mem()
    }

    fn reset_element(&mut self) {
        self.tags = Tags::default();
        self.nds.clear();
        self.members.clear();
        self.label_nid = 0;
    }

    fn track_changeset(&mut self, attrs: &[(String, String)]) {
        if let Some(cs) = attr_i64(attrs, "changeset") {
            self.stats.changeset = self.stats.changeset.max(cs);
        }
    }

    pub fn start(&mut self, elem: &str, attrs: &[(String, String)]) -> Result<()> {
        match (self.scope, elem) {
            (Scope::Top, "node") => {
                self.reset_element();
                self.track_changeset(attrs);
                match (
                    attr_i64(attrs, "id"),
                    attr_f64(attrs, "lat"),
                    attr_f64(attrs, "lon"),
                ) {
                    (Some(id), Some(lat), Some(lon)) => {
                        self.id = id;
                        self.lat = lat;
                        self.lon = lon;
                        self.scope = Scope::Node;
                    }
                    _ => {
                        self.stats.discarded += 1;
                        self.scope = Scope::Skip;
                    }
                }
            }
            (Scope::Top, "way") => {
                self.reset_element();
                self.track_changeset(attrs);
                match attr_i64(attrs, "id") {
                    Some(id) => {
                        self.id = id;
                        self.scope = Scope::Way;
                    }
                    None => {
                        self.stats.discarded += 1;
                        self.scope = Scope::Skip;
                    }
                }
            }
            (Scope::Top, "relation") => {
                self.reset_element();
                self.track_changeset(attrs);
                match attr_i64(attrs, "id") {
                    Some(id) => {
                        self.id = id;
                        self.scope = Scope::Rel;
                    }
                    None => {
                        self.stats.discarded += 1;
                        self.scope = Scope::Skip;
                    }
                }
            }
            (Scope::Node | Scope::Way | Scope::Rel, "tag") => {
                match (attr(attrs, "k"), attr(attrs, "v")) {
                    (Some(k), Some(v)) => {
                        let k = k.to_string();
                        let v = v.to_string();
                        self.handle_tag(&k, &v);
                    }
                    _ => self.stats.discarded += 1,
                }
            }
            (Scope::Way, "nd") => match attr_i64(attrs, "ref") {
                Some(nd) => self.nds.push(nd),
                None => self.stats.discarded += 1,
            },
            (Scope::Rel, "member") => {
                let mtype = attr(attrs, "type").unwrap_or("");
                let role = attr(attrs, "role").unwrap_or("");
                match (mtype, attr_i64(attrs, "ref")) {
                    ("node", Some(r)) if role == "admin_centre" || role == "label" => {
                        self.label_nid = r;
                    }
                    ("way", Some(wid)) => self.members.push(Member {
                        wid,
                        inner: role == "inner",
                    }),
                    ("node" | "relation", Some(_)) => {}
                    _ => self.stats.discarded += 1,
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn end(&mut self, elem: &str) -> Result<()> {
        match (self.scope, elem) {
            (Scope::Node, "node") => {
                let r = self.end_node();
                self.scope = Scope::Top;
                r?;
            }
            (Scope::Way, "way") => {
                let r = self.end_way();
                self.scope = Scope::Top;
                r?;
            }
            (Scope::Rel, "relation") => {
                let r = self.end_rel();
                self.scope = Scope::Top;
                r?;
            }
            (Scope::Skip, "node" | "way" | "relation") => self.scope = Scope::Top,
            _ => {}
        }
        Ok(())
    }

    /// Persists the highest changeset seen; called once at end of stream.
    pub fn finish(&mut self) -> Result<()> {
        let cs = self.index.changeset()?.max(self.stats.changeset);
        self.index.set_changeset(cs)?;
        Ok(())
    }

    fn handle_tag(&mut self, k: &str, v: &str) {
        if v.len() > MAX_TAG_LEN {
            self.stats.discarded += 1;
            return;
        }
        let Some(v) = ascii::transliterate(v) else {
            self.stats.discarded += 1;
            return;
        };

        if k == "building" && v != "no" {
            self.tags.flags |= record::FLAG_BUILDING;
        }
        let candidate = self.style.code_of(k, &v);
        self.tags.class = self.style.resolve_class(self.tags.class, candidate);

        match k {
            "name" => {
                if !self.tags.name_en {
                    let n = name::normalize(&v);
                    self.tags.name = Some(n.name);
                    self.tags.highway_name = n.highway;
                }
            }
            "name:en" => {
                let n = name::normalize(&v);
                self.tags.name = Some(n.name);
                self.tags.highway_name = n.highway;
                self.tags.name_en = true;
            }
            "ref" => self.tags.reference = Some(v),
            "junction:ref" => self.tags.junction_ref = Some(v),
            "capital" => self.tags.capital = v == "yes",
            "state_capital" => self.tags.state_capital = v == "yes",
            "ele" => self.tags.ele_m = name::parse_elevation(&v, false),
            "ele:ft" => self.tags.ele_ft = name::parse_elevation(&v, true),
            "protect_id" | "protect_class" => self.tags.protect_class = Some(v),
            "ownership" => self.tags.ownership = Some(v),
            "oneway" => match v.as_str() {
                "yes" | "1" | "true" => self.tags.flags |= record::FLAG_FORWARD,
                "-1" | "reverse" => self.tags.flags |= record::FLAG_REVERSE,
                _ => {}
            },
            "bridge" if v != "no" => self.tags.flags |= record::FLAG_BRIDGE,
            "tunnel" if v != "no" => self.tags.flags |= record::FLAG_TUNNEL,
            "cutting" if v != "no" => self.tags.flags |= record::FLAG_CUTTING,
            "layer" => self.tags.layer = v.trim().parse().unwrap_or(0),
            "type" if self.scope == Scope::Rel => {
                self.tags.rel_type = match v.as_str() {
                    "boundary" => record::REL_TYPE_BOUNDARY,
                    "multipolygon" => record::REL_TYPE_MULTIPOLYGON,
                    _ => record::REL_TYPE_NONE,
                };
            }
            _ => {}
        }
    }

    /// The final class after post-tag remaps shared by all element kinds.
    fn final_class(&self) -> i32 {
        let mut class = self.tags.class;
        if class != 0 {
            if self.tags.state_capital && self.style.capital_code(true) != 0 {
                class = self.style.capital_code(true);
            } else if self.tags.capital && self.style.capital_code(false) != 0 {
                class = self.style.capital_code(false);
            }
        }
        // A park not owned nationally is demoted by its protect_class.
        let national = self.tags.ownership.as_deref() == Some("national");
        if !national && self.style.is_park(class) {
            if let Some(pc) = self.tags.protect_class.as_deref() {
                if let Some(remapped) = self.style.park_remap(pc) {
                    class = remapped;
                }
            }
        }
        class
    }

    /// Name and NAMEREF flag for the current element: motorway and rewritten
    /// highway names prefer the ref, abbreviation applies when the class opts
    /// in and actually shortens.
    fn select_name(&self, class: i32) -> (String, bool) {
        let reference = self
            .tags
            .reference
            .as_deref()
            .or(self.tags.junction_ref.as_deref());
        if self.style.is_motorway(class) || self.tags.highway_name {
            if let Some(r) = reference {
                return (r.to_string(), true);
            }
        }
        let name = self.tags.name.clone().unwrap_or_default();
        if self.style.wants_abrev(class) {
            let short = name::abbreviate(&name);
            if !short.is_empty() && short != name {
                return (short, false);
            }
        }
        (name, false)
    }

    /// Reverse-indexes `id` into the TileRefs of both precomputed zooms.
    fn add_tile_refs(
        &mut self,
        lo: RecordType,
        hi: RecordType,
        rect: &Rect,
        border: f64,
        id: i64,
    ) -> Result<()> {
        for (zoom, rtype) in [(ZOOM_LO, lo), (ZOOM_HI, hi)] {
            let (x0, x1, y0, y1) = geom::tile_range(zoom, rect, border);
            for y in y0..=y1 {
                for x in x0..=x1 {
                    self.index
                        .add_tile(rtype, geom::tile_major_id(zoom, x, y), id)?;
                }
            }
        }
        Ok(())
    }

    fn end_node(&mut self) -> Result<()> {
        self.stats.nodes += 1;
        let class = self.final_class();
        if self.style.selected_point(class) {
            let (nm, nameref) = self.select_name(class);
            let mut flags = self.tags.flags;
            if nameref {
                flags |= record::FLAG_NAMEREF;
            }
            let ele = self.tags.ele_ft.or(self.tags.ele_m).unwrap_or(0);
            self.index.add(
                RecordType::NodeInfo,
                self.id,
                &record::pack_node_info(self.id, class, flags, ele, &nm),
            )?;
            let rect = Rect::point(self.lat, self.lon);
            self.add_tile_refs(
                RecordType::NodeTileLo,
                RecordType::NodeTileHi,
                &rect,
                TILE_BORDER,
                self.id,
            )?;
            self.stats.selected_nodes += 1;
        }
        // Coords are stored for every node; ways reference them by id.
        self.index.add(
            RecordType::NodeCoord,
            self.id,
            &record::pack_node_coord(self.id, self.lat, self.lon),
        )?;
        Ok(())
    }

    /// Bounding box over the coords already in the store; absent coords are
    /// tolerated (truncated extracts).
    fn range_of_nds(&self, nds: &[i64]) -> Result<Option<Rect>> {
        let mut rect: Option<Rect> = None;
        for &nd in nds {
            if let Some(h) = self.index.get(0, RecordType::NodeCoord, nd)? {
                let b = h.bytes();
                let v = record::NodeCoordView::new(&b);
                let (lat, lon) = (v.lat(), v.lon());
                drop(b);
                match rect.as_mut() {
                    Some(r) => r.union_point(lat, lon),
                    None => rect = Some(Rect::point(lat, lon)),
                }
            }
        }
        Ok(rect)
    }

    fn end_way(&mut self) -> Result<()> {
        self.stats.ways += 1;
        let class = self.final_class();
        let range = self.range_of_nds(&self.nds)?;
        let selected = self.style.selected(class);

        let (nm, nameref) = self.select_name(class);
        let mut flags = self.tags.flags;
        if nameref {
            flags |= record::FLAG_NAMEREF;
        }

        if selected {
            if let Some(range) = &range {
                // A centered way collapses to its midpoint with no border.
                let (rect, border) = if self.style.center(class) {
                    let (lat, lon) = range.center();
                    (Rect::point(lat, lon), 0.0)
                } else {
                    (*range, TILE_BORDER)
                };
                self.add_tile_refs(
                    RecordType::WayTileLo,
                    RecordType::WayTileHi,
                    &rect,
                    border,
                    self.id,
                )?;
                self.index.add(
                    RecordType::WayRange,
                    self.id,
                    &record::pack_way_range(
                        self.id,
                        range.lat_t,
                        range.lon_l,
                        range.lat_b,
                        range.lon_r,
                    ),
                )?;
                self.stats.selected_ways += 1;
            }
        }
        self.index.add(
            RecordType::WayInfo,
            self.id,
            &record::pack_way_info(self.id, class, flags, self.tags.layer, &nm),
        )?;
        self.index.add(
            RecordType::WayNds,
            self.id,
            &record::pack_way_nds(self.id, &self.nds),
        )?;
        Ok(())
    }

    /// Member way range, recomputed from WayNds and memoised when the import
    /// did not select the way on its own.
    fn member_range(&self, wid: i64) -> Result<Option<Rect>> {
        if let Some(h) = self.index.get(0, RecordType::WayRange, wid)? {
            let b = h.bytes();
            let v = record::WayRangeView::new(&b);
            return Ok(Some(Rect {
                lat_t: v.lat_t(),
                lon_l: v.lon_l(),
                lat_b: v.lat_b(),
                lon_r: v.lon_r(),
            }));
        }
        let nds: Option<Vec<i64>> = self
            .index
            .get(0, RecordType::WayNds, wid)?
            .map(|h| record::WayNdsView::new(&h.bytes()).nds().collect());
        let Some(nds) = nds else { return Ok(None) };
        let Some(rect) = self.range_of_nds(&nds)? else {
            return Ok(None);
        };
        self.index.add(
            RecordType::WayRange,
            wid,
            &record::pack_way_range(wid, rect.lat_t, rect.lon_l, rect.lat_b, rect.lon_r),
        )?;
        Ok(Some(rect))
    }

    fn end_rel(&mut self) -> Result<()> {
        self.stats.rels += 1;
        let class = self.final_class();
        if self.tags.rel_type == record::REL_TYPE_NONE || !self.style.selected(class) {
            return Ok(());
        }

        let mut range: Option<Rect> = None;
        for i in 0..self.members.len() {
            let wid = self.members[i].wid;
            if let Some(r) = self.member_range(wid)? {
                match range.as_mut() {
                    Some(acc) => acc.union(&r),
                    None => range = Some(r),
                }
            }
        }
        let Some(range) = range else {
            // No member has resolvable geometry; nothing to place on a tile.
            return Ok(());
        };

        let centered = self.style.center(class);
        let large = range.area_deg2() > REL_AREA_MAX_DEG2;

        let (nm, nameref) = self.select_name(class);
        let mut flags = self.tags.flags;
        if nameref {
            flags |= record::FLAG_NAMEREF;
        }

        self.index.add(
            RecordType::RelInfo,
            self.id,
            &record::pack_rel_info(
                self.id,
                self.label_nid,
                class,
                flags,
                self.tags.rel_type,
                &nm,
            ),
        )?;
        self.index.add(
            RecordType::RelRange,
            self.id,
            &record::pack_rel_range(self.id, range.lat_t, range.lon_l, range.lat_b, range.lon_r),
        )?;
        // Member lists of large or centered relations cost more than they are
        // worth; their ways are reachable through the per-way index.
        if !large && !centered {
            let members = std::mem::take(&mut self.members);
            self.index.add(
                RecordType::RelMembers,
                self.id,
                &record::pack_rel_members(self.id, &members),
            )?;
        }

        let (rect, border) = if centered {
            let (lat, lon) = range.center();
            (Rect::point(lat, lon), 0.0)
        } else {
            (range, TILE_BORDER)
        };
        self.add_tile_refs(
            RecordType::RelTileLo,
            RecordType::RelTileHi,
            &rect,
            border,
            self.id,
        )?;
        self.stats.selected_rels += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Index;
    use crate::style;
    use tempfile::NamedTempFile;

    fn import_xml(osm: &str) -> (NamedTempFile, ImportStats) {
        let f = NamedTempFile::new().unwrap();
        let index = Index::create(f.path(), 1.0).unwrap();
        let style = style::test_style();
        let mut imp = Importer::new(&index, &style);
        xml::run(osm.as_bytes(), None, &mut imp).unwrap();
        let stats = imp.stats().clone();
        index.close().unwrap();
        (f, stats)
    }

    #[test]
    fn node_way_relation_counts_and_changeset() {
        let (f, stats) = import_xml(
            r#"<?xml version="1.0"?>
<osm>
  <node id="1" lat="39.0" lon="-105.0" changeset="7"/>
  <node id="2" lat="39.001" lon="-105.0" changeset="9"/>
  <way id="10" changeset="8">
    <nd ref="1"/>
    <nd ref="2"/>
    <tag k="highway" v="motorway"/>
    <tag k="name" v="Test"/>
  </way>
</osm>"#,
        );
        assert_eq!(stats.nodes, 2);
        assert_eq!(stats.ways, 1);
        assert_eq!(stats.changeset, 9);
        assert_eq!(stats.selected_ways, 1);

        let index = Index::open_readonly(f.path(), 1.0, 1).unwrap();
        assert_eq!(index.changeset().unwrap(), 9);
        index.lock();
        let h = index.get(0, RecordType::WayInfo, 10).unwrap().unwrap();
        let b = h.bytes();
        let v = record::WayInfoView::new(&b);
        assert_eq!(v.class(), 10);
        assert_eq!(v.name(), Some("Test"));
        assert_eq!(v.flags() & record::FLAG_NAMEREF, 0);
        drop(b);
        drop(h);
        index.unlock();
    }

    #[test]
    fn motorway_prefers_ref_over_name() {
        let (f, _) = import_xml(
            r#"<osm>
  <node id="1" lat="39.0" lon="-105.0"/>
  <node id="2" lat="39.0" lon="-105.001"/>
  <way id="20">
    <nd ref="1"/>
    <nd ref="2"/>
    <tag k="highway" v="motorway"/>
    <tag k="ref" v="I-70"/>
    <tag k="name" v="Dwight D. Eisenhower Highway"/>
  </way>
</osm>"#,
        );
        let index = Index::open_readonly(f.path(), 1.0, 1).unwrap();
        index.lock();
        let h = index.get(0, RecordType::WayInfo, 20).unwrap().unwrap();
        let b = h.bytes();
        let v = record::WayInfoView::new(&b);
        assert_eq!(v.name(), Some("I-70"));
        assert_ne!(v.flags() & record::FLAG_NAMEREF, 0);
        drop(b);
        drop(h);
        index.unlock();
    }

    #[test]
    fn rewritten_state_highway_prefers_ref() {
        let (f, _) = import_xml(
            r#"<osm>
  <node id="1" lat="40.0" lon="-105.5"/>
  <node id="2" lat="40.0" lon="-105.501"/>
  <way id="30">
    <nd ref="1"/>
    <nd ref="2"/>
    <tag k="highway" v="trunk"/>
    <tag k="name" v="State Highway 72"/>
    <tag k="ref" v="CO 72"/>
  </way>
</osm>"#,
        );
        let index = Index::open_readonly(f.path(), 1.0, 1).unwrap();
        index.lock();
        let h = index.get(0, RecordType::WayInfo, 30).unwrap().unwrap();
        let b = h.bytes();
        assert_eq!(record::WayInfoView::new(&b).name(), Some("CO 72"));
        drop(b);
        drop(h);
        index.unlock();
    }

    #[test]
    fn way_range_bounds_all_nds() {
        let (f, _) = import_xml(
            r#"<osm>
  <node id="1" lat="39.0" lon="-105.0"/>
  <node id="2" lat="39.01" lon="-105.02"/>
  <node id="3" lat="38.99" lon="-104.98"/>
  <way id="40">
    <nd ref="1"/>
    <nd ref="2"/>
    <nd ref="3"/>
    <tag k="waterway" v="river"/>
  </way>
</osm>"#,
        );
        let index = Index::open_readonly(f.path(), 1.0, 1).unwrap();
        index.lock();
        let h = index.get(0, RecordType::WayRange, 40).unwrap().unwrap();
        let b = h.bytes();
        let v = record::WayRangeView::new(&b);
        assert_eq!(v.lat_t(), 39.01);
        assert_eq!(v.lat_b(), 38.99);
        assert_eq!(v.lon_l(), -105.02);
        assert_eq!(v.lon_r(), -104.98);
        drop(b);
        drop(h);
        index.unlock();
    }

    #[test]
    fn missing_coords_are_tolerated() {
        let (f, stats) = import_xml(
            r#"<osm>
  <node id="1" lat="39.5" lon="-106.0"/>
  <way id="50">
    <nd ref="1"/>
    <nd ref="999"/>
    <tag k="waterway" v="river"/>
  </way>
</osm>"#,
        );
        assert_eq!(stats.selected_ways, 1);
        let index = Index::open_readonly(f.path(), 1.0, 1).unwrap();
        index.lock();
        let h = index.get(0, RecordType::WayRange, 50).unwrap().unwrap();
        let b = h.bytes();
        let v = record::WayRangeView::new(&b);
        assert_eq!((v.lat_t(), v.lon_l()), (39.5, -106.0));
        drop(b);
        drop(h);
        index.unlock();
    }

    #[test]
    fn unselected_relation_is_discarded() {
        let (f, stats) = import_xml(
            r#"<osm>
  <node id="1" lat="39.0" lon="-105.0"/>
  <node id="2" lat="39.0" lon="-105.001"/>
  <way id="60">
    <nd ref="1"/>
    <nd ref="2"/>
  </way>
  <relation id="70">
    <tag k="type" v="route"/>
    <member type="way" ref="60" role=""/>
  </relation>
</osm>"#,
        );
        assert_eq!(stats.rels, 1);
        assert_eq!(stats.selected_rels, 0);
        let index = Index::open_readonly(f.path(), 1.0, 1).unwrap();
        index.lock();
        assert!(index.get(0, RecordType::RelInfo, 70).unwrap().is_none());
        index.unlock();
    }

    #[test]
    fn boundary_relation_persists_members_and_memoises_range() {
        let (f, stats) = import_xml(
            r#"<osm>
  <node id="1" lat="39.0" lon="-105.0"/>
  <node id="2" lat="39.002" lon="-105.002"/>
  <way id="80">
    <nd ref="1"/>
    <nd ref="2"/>
  </way>
  <relation id="90">
    <tag k="type" v="boundary"/>
    <tag k="boundary" v="national_park"/>
    <tag k="name" v="Test Park"/>
    <member type="node" ref="1" role="label"/>
    <member type="way" ref="80" role="outer"/>
  </relation>
</osm>"#,
        );
        assert_eq!(stats.selected_rels, 1);
        let index = Index::open_readonly(f.path(), 1.0, 1).unwrap();
        index.lock();
        let h = index.get(0, RecordType::RelInfo, 90).unwrap().unwrap();
        let b = h.bytes();
        let v = record::RelInfoView::new(&b);
        assert_eq!(v.class(), 30);
        assert_eq!(v.nid(), 1);
        assert_eq!(v.rel_type(), record::REL_TYPE_BOUNDARY);
        assert_eq!(v.name(), Some("Test Park"));
        drop(b);
        drop(h);
        let m = index.get(0, RecordType::RelMembers, 90).unwrap().unwrap();
        let mb = m.bytes();
        let mv = record::RelMembersView::new(&mb);
        assert_eq!(mv.count(), 1);
        assert!(!mv.member(0).inner);
        drop(mb);
        drop(m);
        // Way 80 was not selected on its own; the relation memoised its range.
        assert!(index.get(0, RecordType::WayRange, 80).unwrap().is_some());
        index.unlock();
    }

    #[test]
    fn park_ownership_remap() {
        let (f, _) = import_xml(
            r#"<osm>
  <node id="1" lat="39.0" lon="-105.0">
    <tag k="boundary" v="national_park"/>
    <tag k="protect_class" v="2"/>
    <tag k="ownership" v="state"/>
    <tag k="name" v="Some Park"/>
  </node>
  <node id="2" lat="39.1" lon="-105.1">
    <tag k="boundary" v="national_park"/>
    <tag k="protect_class" v="2"/>
    <tag k="ownership" v="national"/>
    <tag k="name" v="Real Park"/>
  </node>
</osm>"#,
        );
        let index = Index::open_readonly(f.path(), 1.0, 1).unwrap();
        index.lock();
        let h = index.get(0, RecordType::NodeInfo, 1).unwrap().unwrap();
        assert_eq!(record::NodeInfoView::new(&h.bytes()).class(), 32);
        drop(h);
        let h = index.get(0, RecordType::NodeInfo, 2).unwrap().unwrap();
        assert_eq!(record::NodeInfoView::new(&h.bytes()).class(), 30);
        drop(h);
        index.unlock();
    }

    #[test]
    fn malformed_tags_are_counted_not_fatal() {
        let (_, stats) = import_xml(
            r#"<osm>
  <node id="1" lat="39.0" lon="-105.0">
    <tag k="name" v="Москва"/>
  </node>
  <node id="bad" lat="x" lon="y"/>
</osm>"#,
        );
        assert_eq!(stats.nodes, 1);
        assert_eq!(stats.discarded, 2);
    }
}
