//! Packed record layouts and read accessors.
//!
//! Records are stored and exchanged as contiguous little-endian byte blobs so
//! that a chunk eviction is a single write. Views never transmute the blob;
//! every multi-byte field is read on demand at a fixed offset.

use byteorder::{ByteOrder, LittleEndian};

use crate::CHUNK_SIZE;

/// The fourteen record kinds held by the store. Tile kinds are reverse
/// indices; the rest are entity payloads.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RecordType {
    NodeTileLo,
    NodeTileHi,
    WayTileLo,
    WayTileHi,
    RelTileLo,
    RelTileHi,
    NodeCoord,
    NodeInfo,
    WayInfo,
    WayRange,
    WayNds,
    RelInfo,
    RelMembers,
    RelRange,
}

pub const TYPE_COUNT: usize = 14;

impl RecordType {
    pub const ALL: [RecordType; TYPE_COUNT] = [
        RecordType::NodeTileLo,
        RecordType::NodeTileHi,
        RecordType::WayTileLo,
        RecordType::WayTileHi,
        RecordType::RelTileLo,
        RecordType::RelTileHi,
        RecordType::NodeCoord,
        RecordType::NodeInfo,
        RecordType::WayInfo,
        RecordType::WayRange,
        RecordType::WayNds,
        RecordType::RelInfo,
        RecordType::RelMembers,
        RecordType::RelRange,
    ];

    pub fn table_name(self) -> &'static str {
        match self {
            RecordType::NodeTileLo => "tbl_node_tile_lo",
            RecordType::NodeTileHi => "tbl_node_tile_hi",
            RecordType::WayTileLo => "tbl_way_tile_lo",
            RecordType::WayTileHi => "tbl_way_tile_hi",
            RecordType::RelTileLo => "tbl_rel_tile_lo",
            RecordType::RelTileHi => "tbl_rel_tile_hi",
            RecordType::NodeCoord => "tbl_node_coord",
            RecordType::NodeInfo => "tbl_node_info",
            RecordType::WayInfo => "tbl_way_info",
            RecordType::WayRange => "tbl_way_range",
            RecordType::WayNds => "tbl_way_nds",
            RecordType::RelInfo => "tbl_rel_info",
            RecordType::RelMembers => "tbl_rel_members",
            RecordType::RelRange => "tbl_rel_range",
        }
    }

    /// Slot used for statement pools and the per-thread loading table.
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    /// Tile kinds hold one logical record per chunk at offset 0.
    pub fn is_tile(self) -> bool {
        matches!(
            self,
            RecordType::NodeTileLo
                | RecordType::NodeTileHi
                | RecordType::WayTileLo
                | RecordType::WayTileHi
                | RecordType::RelTileLo
                | RecordType::RelTileHi
        )
    }
}

/// Splits an entity id into its chunk id and position within the chunk.
/// Tile kinds use `major_id = id`, `minor_id = 0`.
pub fn split_id(rtype: RecordType, id: i64) -> (i64, i64) {
    if rtype.is_tile() {
        (id, 0)
    } else {
        (id.div_euclid(CHUNK_SIZE), id.rem_euclid(CHUNK_SIZE))
    }
}

// Way and node flags.
pub const FLAG_FORWARD: i32 = 0x01;
pub const FLAG_REVERSE: i32 = 0x02;
pub const FLAG_BRIDGE: i32 = 0x04;
pub const FLAG_TUNNEL: i32 = 0x08;
pub const FLAG_CUTTING: i32 = 0x10;
pub const FLAG_BUILDING: i32 = 0x20;
pub const FLAG_NAMEREF: i32 = 0x40;
pub const FLAG_INNER: i32 = 0x80;

// Relation types.
pub const REL_TYPE_NONE: i32 = 0;
pub const REL_TYPE_BOUNDARY: i32 = 1;
pub const REL_TYPE_MULTIPOLYGON: i32 = 2;

pub const NODE_COORD_SIZE: usize = 24;
pub const NODE_INFO_BASE: usize = 24;
pub const WAY_INFO_BASE: usize = 24;
pub const WAY_RANGE_SIZE: usize = 40;
pub const WAY_NDS_BASE: usize = 16;
pub const REL_INFO_BASE: usize = 32;
pub const REL_MEMBERS_BASE: usize = 16;
pub const REL_MEMBER_SIZE: usize = 16;
pub const REL_RANGE_SIZE: usize = 40;
pub const TILE_REFS_BASE: usize = 16;

/// Size of the record that starts at `off`. Panics on a malformed blob; a
/// record that cannot be sized is a logic error, not a recoverable condition.
pub fn size_at(rtype: RecordType, buf: &[u8], off: usize) -> usize {
    let need = |n: usize| {
        if off + n > buf.len() {
            panic!(
                "truncated {:?} record at offset {} (blob len {})",
                rtype,
                off,
                buf.len()
            );
        }
    };
    let size = match rtype {
        RecordType::NodeCoord => NODE_COORD_SIZE,
        RecordType::WayRange => WAY_RANGE_SIZE,
        RecordType::RelRange => REL_RANGE_SIZE,
        RecordType::NodeInfo => {
            need(NODE_INFO_BASE);
            NODE_INFO_BASE + LittleEndian::read_i32(&buf[off + 20..]) as usize
        }
        RecordType::WayInfo => {
            need(WAY_INFO_BASE);
            WAY_INFO_BASE + LittleEndian::read_i32(&buf[off + 20..]) as usize
        }
        RecordType::RelInfo => {
            need(REL_INFO_BASE);
            REL_INFO_BASE + LittleEndian::read_i32(&buf[off + 28..]) as usize
        }
        RecordType::WayNds => {
            need(WAY_NDS_BASE);
            WAY_NDS_BASE + 8 * LittleEndian::read_i32(&buf[off + 8..]) as usize
        }
        RecordType::RelMembers => {
            need(REL_MEMBERS_BASE);
            REL_MEMBERS_BASE + REL_MEMBER_SIZE * LittleEndian::read_i32(&buf[off + 8..]) as usize
        }
        RecordType::NodeTileLo
        | RecordType::NodeTileHi
        | RecordType::WayTileLo
        | RecordType::WayTileHi
        | RecordType::RelTileLo
        | RecordType::RelTileHi => {
            need(TILE_REFS_BASE);
            TILE_REFS_BASE + 8 * LittleEndian::read_i32(&buf[off + 8..]) as usize
        }
    };
    need(size);
    size
}

/// Every record leads with its 64-bit id.
pub fn id_at(buf: &[u8], off: usize) -> i64 {
    LittleEndian::read_i64(&buf[off..])
}

fn read_name(buf: &[u8], base: usize) -> Option<&str> {
    let size_name = LittleEndian::read_i32(&buf[base - 4..]) as usize;
    if size_name == 0 {
        return None;
    }
    let raw = &buf[base..base + size_name];
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    std::str::from_utf8(&raw[..end]).ok()
}

/// Name payload: 0-terminated, padded to a multiple of four bytes; empty
/// names occupy no bytes at all.
fn push_name(out: &mut Vec<u8>, name: &str) {
    if name.is_empty() {
        return;
    }
    let padded = (name.len() + 1 + 3) & !3;
    out.extend_from_slice(name.as_bytes());
    out.resize(out.len() + (padded - name.len()), 0);
}

fn name_size(name: &str) -> i32 {
    if name.is_empty() {
        0
    } else {
        ((name.len() + 1 + 3) & !3) as i32
    }
}

// ---- views ----

macro_rules! view {
    ($name:ident) => {
        #[derive(Copy, Clone)]
        pub struct $name<'a> {
            buf: &'a [u8],
        }

        impl<'a> $name<'a> {
            pub fn new(buf: &'a [u8]) -> Self {
                Self { buf }
            }
        }
    };
}

view!(NodeCoordView);

impl<'a> NodeCoordView<'a> {
    pub fn nid(&self) -> i64 {
        LittleEndian::read_i64(self.buf)
    }
    pub fn lat(&self) -> f64 {
        LittleEndian::read_f64(&self.buf[8..])
    }
    pub fn lon(&self) -> f64 {
        LittleEndian::read_f64(&self.buf[16..])
    }
}

view!(NodeInfoView);

impl<'a> NodeInfoView<'a> {
    pub fn nid(&self) -> i64 {
        LittleEndian::read_i64(self.buf)
    }
    pub fn class(&self) -> i32 {
        LittleEndian::read_i32(&self.buf[8..])
    }
    pub fn flags(&self) -> i32 {
        LittleEndian::read_i32(&self.buf[12..])
    }
    /// Elevation in feet.
    pub fn ele(&self) -> i32 {
        LittleEndian::read_i32(&self.buf[16..])
    }
    pub fn name(&self) -> Option<&'a str> {
        read_name(self.buf, NODE_INFO_BASE)
    }
}

view!(WayInfoView);

impl<'a> WayInfoView<'a> {
    pub fn wid(&self) -> i64 {
        LittleEndian::read_i64(self.buf)
    }
    pub fn class(&self) -> i32 {
        LittleEndian::read_i32(&self.buf[8..])
    }
    pub fn flags(&self) -> i32 {
        LittleEndian::read_i32(&self.buf[12..])
    }
    pub fn layer(&self) -> i32 {
        LittleEndian::read_i32(&self.buf[16..])
    }
    pub fn name(&self) -> Option<&'a str> {
        read_name(self.buf, WAY_INFO_BASE)
    }
}

view!(WayRangeView);

impl<'a> WayRangeView<'a> {
    pub fn wid(&self) -> i64 {
        LittleEndian::read_i64(self.buf)
    }
    pub fn lat_t(&self) -> f64 {
        LittleEndian::read_f64(&self.buf[8..])
    }
    pub fn lon_l(&self) -> f64 {
        LittleEndian::read_f64(&self.buf[16..])
    }
    pub fn lat_b(&self) -> f64 {
        LittleEndian::read_f64(&self.buf[24..])
    }
    pub fn lon_r(&self) -> f64 {
        LittleEndian::read_f64(&self.buf[32..])
    }
}

view!(WayNdsView);

impl<'a> WayNdsView<'a> {
    pub fn wid(&self) -> i64 {
        LittleEndian::read_i64(self.buf)
    }
    pub fn count(&self) -> usize {
        LittleEndian::read_i32(&self.buf[8..]) as usize
    }
    pub fn nd(&self, i: usize) -> i64 {
        LittleEndian::read_i64(&self.buf[WAY_NDS_BASE + 8 * i..])
    }
    pub fn nds(&self) -> impl Iterator<Item = i64> + 'a {
        let buf = self.buf;
        (0..self.count()).map(move |i| LittleEndian::read_i64(&buf[WAY_NDS_BASE + 8 * i..]))
    }
}

view!(RelInfoView);

impl<'a> RelInfoView<'a> {
    pub fn rid(&self) -> i64 {
        LittleEndian::read_i64(self.buf)
    }
    /// Label or admin-centre node, 0 when absent.
    pub fn nid(&self) -> i64 {
        LittleEndian::read_i64(&self.buf[8..])
    }
    pub fn class(&self) -> i32 {
        LittleEndian::read_i32(&self.buf[16..])
    }
    pub fn flags(&self) -> i32 {
        LittleEndian::read_i32(&self.buf[20..])
    }
    pub fn rel_type(&self) -> i32 {
        LittleEndian::read_i32(&self.buf[24..])
    }
    pub fn name(&self) -> Option<&'a str> {
        read_name(self.buf, REL_INFO_BASE)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub wid: i64,
    pub inner: bool,
}

view!(RelMembersView);

impl<'a> RelMembersView<'a> {
    pub fn rid(&self) -> i64 {
        LittleEndian::read_i64(self.buf)
    }
    pub fn count(&self) -> usize {
        LittleEndian::read_i32(&self.buf[8..]) as usize
    }
    pub fn member(&self, i: usize) -> Member {
        let off = REL_MEMBERS_BASE + REL_MEMBER_SIZE * i;
        Member {
            wid: LittleEndian::read_i64(&self.buf[off..]),
            inner: LittleEndian::read_u32(&self.buf[off + 8..]) != 0,
        }
    }
    pub fn members(&self) -> impl Iterator<Item = Member> + '_ {
        (0..self.count()).map(move |i| self.member(i))
    }
}

view!(RelRangeView);

impl<'a> RelRangeView<'a> {
    pub fn rid(&self) -> i64 {
        LittleEndian::read_i64(self.buf)
    }
    pub fn lat_t(&self) -> f64 {
        LittleEndian::read_f64(&self.buf[8..])
    }
    pub fn lon_l(&self) -> f64 {
        LittleEndian::read_f64(&self.buf[16..])
    }
    pub fn lat_b(&self) -> f64 {
        LittleEndian::read_f64(&self.buf[24..])
    }
    pub fn lon_r(&self) -> f64 {
        LittleEndian::read_f64(&self.buf[32..])
    }
}

view!(TileRefsView);

impl<'a> TileRefsView<'a> {
    pub fn major_id(&self) -> i64 {
        LittleEndian::read_i64(self.buf)
    }
    pub fn count(&self) -> usize {
        LittleEndian::read_i32(&self.buf[8..]) as usize
    }
    pub fn refs(&self) -> impl Iterator<Item = i64> + 'a {
        let buf = self.buf;
        (0..self.count()).map(move |i| LittleEndian::read_i64(&buf[TILE_REFS_BASE + 8 * i..]))
    }
}

// ---- packers ----

pub fn pack_node_coord(nid: i64, lat: f64, lon: f64) -> Vec<u8> {
    let mut out = Vec::with_capacity(NODE_COORD_SIZE);
    out.extend_from_slice(&nid.to_le_bytes());
    out.extend_from_slice(&lat.to_le_bytes());
    out.extend_from_slice(&lon.to_le_bytes());
    out
}

pub fn pack_node_info(nid: i64, class: i32, flags: i32, ele: i32, name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(NODE_INFO_BASE + name.len() + 4);
    out.extend_from_slice(&nid.to_le_bytes());
    out.extend_from_slice(&class.to_le_bytes());
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&ele.to_le_bytes());
    out.extend_from_slice(&name_size(name).to_le_bytes());
    push_name(&mut out, name);
    out
}

pub fn pack_way_info(wid: i64, class: i32, flags: i32, layer: i32, name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(WAY_INFO_BASE + name.len() + 4);
    out.extend_from_slice(&wid.to_le_bytes());
    out.extend_from_slice(&class.to_le_bytes());
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&layer.to_le_bytes());
    out.extend_from_slice(&name_size(name).to_le_bytes());
    push_name(&mut out, name);
    out
}

pub fn pack_way_range(wid: i64, lat_t: f64, lon_l: f64, lat_b: f64, lon_r: f64) -> Vec<u8> {
    let mut out = Vec::with_capacity(WAY_RANGE_SIZE);
    out.extend_from_slice(&wid.to_le_bytes());
    out.extend_from_slice(&lat_t.to_le_bytes());
    out.extend_from_slice(&lon_l.to_le_bytes());
    out.extend_from_slice(&lat_b.to_le_bytes());
    out.extend_from_slice(&lon_r.to_le_bytes());
    out
}

pub fn pack_way_nds(wid: i64, nds: &[i64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(WAY_NDS_BASE + 8 * nds.len());
    out.extend_from_slice(&wid.to_le_bytes());
    out.extend_from_slice(&(nds.len() as i32).to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    for nd in nds {
        out.extend_from_slice(&nd.to_le_bytes());
    }
    out
}

pub fn pack_rel_info(
    rid: i64,
    nid: i64,
    class: i32,
    flags: i32,
    rel_type: i32,
    name: &str,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(REL_INFO_BASE + name.len() + 4);
    out.extend_from_slice(&rid.to_le_bytes());
    out.extend_from_slice(&nid.to_le_bytes());
    out.extend_from_slice(&class.to_le_bytes());
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&rel_type.to_le_bytes());
    out.extend_from_slice(&name_size(name).to_le_bytes());
    push_name(&mut out, name);
    out
}

pub fn pack_rel_members(rid: i64, members: &[Member]) -> Vec<u8> {
    let mut out = Vec::with_capacity(REL_MEMBERS_BASE + REL_MEMBER_SIZE * members.len());
    out.extend_from_slice(&rid.to_le_bytes());
    out.extend_from_slice(&(members.len() as i32).to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    for m in members {
        out.extend_from_slice(&m.wid.to_le_bytes());
        out.extend_from_slice(&(m.inner as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
    }
    out
}

pub fn pack_rel_range(rid: i64, lat_t: f64, lon_l: f64, lat_b: f64, lon_r: f64) -> Vec<u8> {
    let mut out = Vec::with_capacity(REL_RANGE_SIZE);
    out.extend_from_slice(&rid.to_le_bytes());
    out.extend_from_slice(&lat_t.to_le_bytes());
    out.extend_from_slice(&lon_l.to_le_bytes());
    out.extend_from_slice(&lat_b.to_le_bytes());
    out.extend_from_slice(&lon_r.to_le_bytes());
    out
}

/// An empty TileRefs record; refs are appended in place afterwards.
pub fn pack_tile_refs_header(major_id: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(TILE_REFS_BASE);
    out.extend_from_slice(&major_id.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_info_round_trip() {
        let blob = pack_node_info(42, 7, FLAG_BUILDING, 5280, "Denver");
        assert_eq!(blob.len(), size_at(RecordType::NodeInfo, &blob, 0));
        assert_eq!(blob.len() % 4, 0);
        let v = NodeInfoView::new(&blob);
        assert_eq!(v.nid(), 42);
        assert_eq!(v.class(), 7);
        assert_eq!(v.flags(), FLAG_BUILDING);
        assert_eq!(v.ele(), 5280);
        assert_eq!(v.name(), Some("Denver"));
    }

    #[test]
    fn empty_name_has_no_payload() {
        let blob = pack_way_info(1, 2, 0, 0, "");
        assert_eq!(blob.len(), WAY_INFO_BASE);
        assert_eq!(WayInfoView::new(&blob).name(), None);
    }

    #[test]
    fn name_is_nul_terminated_and_padded() {
        // 4 chars + NUL pads to 8.
        let blob = pack_node_info(1, 0, 0, 0, "Vail");
        assert_eq!(blob.len(), NODE_INFO_BASE + 8);
        assert_eq!(blob[NODE_INFO_BASE + 4], 0);
        assert_eq!(NodeInfoView::new(&blob).name(), Some("Vail"));
    }

    #[test]
    fn way_nds_accessors() {
        let blob = pack_way_nds(10, &[1, 2, 3]);
        let v = WayNdsView::new(&blob);
        assert_eq!(v.wid(), 10);
        assert_eq!(v.count(), 3);
        assert_eq!(v.nds().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(size_at(RecordType::WayNds, &blob, 0), blob.len());
    }

    #[test]
    fn rel_members_accessors() {
        let ms = [
            Member { wid: 5, inner: false },
            Member { wid: -9, inner: true },
        ];
        let blob = pack_rel_members(77, &ms);
        let v = RelMembersView::new(&blob);
        assert_eq!(v.count(), 2);
        assert_eq!(v.members().collect::<Vec<_>>(), ms.to_vec());
    }

    #[test]
    fn split_id_negative_ids() {
        assert_eq!(split_id(RecordType::NodeCoord, 250), (2, 50));
        assert_eq!(split_id(RecordType::NodeCoord, -1), (-1, 99));
        assert_eq!(split_id(RecordType::NodeTileLo, 12345), (12345, 0));
    }

    #[test]
    fn scan_two_records() {
        let mut blob = pack_node_info(100, 1, 0, 0, "A");
        let first = blob.len();
        blob.extend_from_slice(&pack_node_info(101, 2, 0, 0, ""));
        assert_eq!(size_at(RecordType::NodeInfo, &blob, 0), first);
        assert_eq!(id_at(&blob, first), 101);
        assert_eq!(size_at(RecordType::NodeInfo, &blob, first), NODE_INFO_BASE);
    }
}
