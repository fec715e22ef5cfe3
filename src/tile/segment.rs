//! Working segments of the tile builder and the three passes run over them:
//! greedy joining at shared endpoints, minimum-distance sampling, and
//! quadrant clipping against the enlarged tile rectangle.

use std::collections::HashMap;

use crate::geom::{self, Rect};

/// cos 30°: the largest turning angle two segments may meet at and still be
/// joined into one polyline.
pub const JOIN_COS_MIN: f64 = 0.866_025_403_784_438_6;

#[derive(Clone, Debug, PartialEq)]
pub struct SegNode {
    pub nid: i64,
    pub lat: f64,
    pub lon: f64,
}

/// One way being assembled for a tile, with its nds copied into a mutable
/// list.
#[derive(Clone, Debug)]
pub struct Segment {
    pub wid: i64,
    pub class: i32,
    pub flags: i32,
    pub layer: i32,
    pub name: String,
    pub member: bool,
    pub inner: bool,
    pub nds: Vec<SegNode>,
}

impl Segment {
    pub fn first_nid(&self) -> i64 {
        self.nds.first().map(|n| n.nid).unwrap_or(0)
    }

    pub fn last_nid(&self) -> i64 {
        self.nds.last().map(|n| n.nid).unwrap_or(0)
    }

    pub fn is_loop(&self) -> bool {
        self.nds.len() >= 2 && self.first_nid() == self.last_nid()
    }

    pub fn range(&self) -> Option<Rect> {
        let mut it = self.nds.iter();
        let first = it.next()?;
        let mut rect = Rect::point(first.lat, first.lon);
        for nd in it {
            rect.union_point(nd.lat, nd.lon);
        }
        Some(rect)
    }
}

fn compatible(a: &Segment, b: &Segment) -> bool {
    if a.member != b.member {
        return false;
    }
    if a.member {
        // Members of one relation already share the relation's class; only
        // the ring side has to agree.
        return a.inner == b.inner;
    }
    a.class == b.class && a.flags == b.flags && a.layer == b.layer && a.name == b.name
}

/// Turning angle at the shared endpoint, measured between the last leg of the
/// arriving segment and the first leg of the departing one in 3-D
/// Earth-surface space.
fn angle_ok(a: &Segment, b: &Segment, nid: i64) -> bool {
    let p0 = if a.last_nid() == nid {
        &a.nds[a.nds.len() - 2]
    } else {
        &a.nds[1]
    };
    let p1 = if a.last_nid() == nid {
        &a.nds[a.nds.len() - 1]
    } else {
        &a.nds[0]
    };
    let p2 = if b.first_nid() == nid {
        &b.nds[1]
    } else {
        &b.nds[b.nds.len() - 2]
    };
    let cos = geom::turn_cos(
        geom::surface_xyz(p0.lat, p0.lon),
        geom::surface_xyz(p1.lat, p1.lon),
        geom::surface_xyz(p2.lat, p2.lon),
    );
    cos.map(|c| c >= JOIN_COS_MIN).unwrap_or(false)
}

fn joinable(a: &Segment, b: &Segment, nid: i64) -> bool {
    a.wid != b.wid
        && a.nds.len() >= 2
        && b.nds.len() >= 2
        && !a.is_loop()
        && !b.is_loop()
        && compatible(a, b)
        && angle_ok(a, b, nid)
}

fn endpoint_of(seg: &Segment, nid: i64) -> bool {
    seg.first_nid() == nid || seg.last_nid() == nid
}

/// Splices `b` onto `a` at their shared endpoint and returns the survivor,
/// which keeps the longer side's id.
fn splice(mut a: Segment, mut b: Segment, nid: i64) -> Segment {
    if a.first_nid() == nid {
        a.nds.reverse();
    }
    if b.last_nid() == nid {
        b.nds.reverse();
    }
    debug_assert_eq!(a.last_nid(), nid);
    debug_assert_eq!(b.first_nid(), nid);
    let survivor = if a.nds.len() >= b.nds.len() {
        a.wid
    } else {
        b.wid
    };
    a.nds.extend(b.nds.into_iter().skip(1));
    a.wid = survivor;
    a
}

/// Joins segments greedily at shared endpoints until a fixed point. `joins`
/// maps an endpoint node id to the segment ids starting or ending there;
/// stale entries are tolerated and skipped.
pub fn join_ways(segs: &mut HashMap<i64, Segment>, joins: &mut HashMap<i64, Vec<i64>>) {
    loop {
        let mut joined = false;
        let nids: Vec<i64> = joins.keys().copied().collect();
        for nid in nids {
            loop {
                let candidates: Vec<i64> = joins
                    .get(&nid)
                    .map(|wids| {
                        wids.iter()
                            .copied()
                            .filter(|wid| {
                                segs.get(wid).map(|s| endpoint_of(s, nid)).unwrap_or(false)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let mut pair = None;
                'outer: for (i, &wa) in candidates.iter().enumerate() {
                    for &wb in &candidates[i + 1..] {
                        if joinable(&segs[&wa], &segs[&wb], nid) {
                            pair = Some((wa, wb));
                            break 'outer;
                        }
                    }
                }
                let Some((wa, wb)) = pair else { break };
                let a = segs.remove(&wa).expect("join candidate present");
                let b = segs.remove(&wb).expect("join candidate present");
                let merged = splice(a, b, nid);
                for end in [merged.first_nid(), merged.last_nid()] {
                    let list = joins.entry(end).or_default();
                    if !list.contains(&merged.wid) {
                        list.push(merged.wid);
                    }
                }
                segs.insert(merged.wid, merged);
                joined = true;
            }
        }
        if !joined {
            break;
        }
    }
}

/// Minimum-distance decimation: a node is kept when it is the last one or at
/// least `min_dist` metres from the previously kept node.
pub fn sample_ways(segs: &mut HashMap<i64, Segment>, min_dist: f64) {
    for seg in segs.values_mut() {
        if seg.nds.len() <= 2 {
            continue;
        }
        let n = seg.nds.len();
        let mut kept = Vec::with_capacity(n);
        kept.push(seg.nds[0].clone());
        let mut last = geom::surface_xyz(seg.nds[0].lat, seg.nds[0].lon);
        for (i, nd) in seg.nds.iter().enumerate().skip(1) {
            let xyz = geom::surface_xyz(nd.lat, nd.lon);
            if i == n - 1 || geom::chord_dist(last, xyz) >= min_dist {
                kept.push(nd.clone());
                last = xyz;
            }
        }
        seg.nds = kept;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Quad {
    Top,
    Left,
    Bottom,
    Right,
}

/// The enlarged tile rectangle in fractional tile coordinates, with the
/// diagonal quadrant classifier used by the clipper.
pub struct ClipFrame {
    zoom: u8,
    x: u32,
    y: u32,
    border: f64,
}

impl ClipFrame {
    pub fn new(zoom: u8, x: u32, y: u32, border: f64) -> ClipFrame {
        ClipFrame { zoom, x, y, border }
    }

    /// None inside the enlarged rect; otherwise the quadrant the point's
    /// offset from the tile centre falls in, split by the two diagonals.
    pub fn quad(&self, lat: f64, lon: f64) -> Option<Quad> {
        let u = geom::tile_x(lon, self.zoom) - self.x as f64;
        let v = geom::tile_y(lat, self.zoom) - self.y as f64;
        let lo = -self.border;
        let hi = 1.0 + self.border;
        if (lo..=hi).contains(&u) && (lo..=hi).contains(&v) {
            return None;
        }
        let du = u - 0.5;
        let dv = v - 0.5;
        // Dot against the diagonal directions (1,1) and (1,-1); v grows down.
        let s1 = du + dv;
        let s2 = du - dv;
        Some(match (s1 > 0.0, s2 > 0.0) {
            (true, true) => Quad::Right,
            (true, false) => Quad::Bottom,
            (false, false) => Quad::Left,
            (false, true) => Quad::Top,
        })
    }
}

fn clip_segment(seg: &mut Segment, frame: &ClipFrame) {
    let drop_ends = !seg.member && !seg.is_loop();
    loop {
        let quads: Vec<Option<Quad>> = seg
            .nds
            .iter()
            .map(|n| frame.quad(n.lat, n.lon))
            .collect();
        let n = quads.len();
        if n == 0 {
            return;
        }
        let mut remove = vec![false; n];
        for i in 1..n.saturating_sub(1) {
            if let Some(q) = quads[i] {
                if quads[i - 1] == Some(q) && quads[i + 1] == Some(q) {
                    remove[i] = true;
                }
            }
        }
        if drop_ends && n >= 2 {
            if let Some(q) = quads[0] {
                if quads[1] == Some(q) {
                    remove[0] = true;
                }
            }
            if let Some(q) = quads[n - 1] {
                if quads[n - 2] == Some(q) {
                    remove[n - 1] = true;
                }
            }
        }
        if !remove.contains(&true) {
            return;
        }
        let mut i = 0;
        seg.nds.retain(|_| {
            let keep = !remove[i];
            i += 1;
            keep
        });
    }
}

/// Clips every segment against the enlarged tile rect; segments left with
/// fewer than two nds emit nothing and are dropped.
pub fn clip_ways(segs: &mut HashMap<i64, Segment>, frame: &ClipFrame) {
    segs.retain(|_, seg| {
        clip_segment(seg, frame);
        seg.nds.len() >= 2
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(wid: i64, nds: &[(i64, f64, f64)]) -> Segment {
        Segment {
            wid,
            class: 10,
            flags: 0,
            layer: 0,
            name: "Test".into(),
            member: false,
            inner: false,
            nds: nds
                .iter()
                .map(|&(nid, lat, lon)| SegNode { nid, lat, lon })
                .collect(),
        }
    }

    fn setup(segs: Vec<Segment>) -> (HashMap<i64, Segment>, HashMap<i64, Vec<i64>>) {
        let mut map = HashMap::new();
        let mut joins: HashMap<i64, Vec<i64>> = HashMap::new();
        for s in segs {
            joins.entry(s.first_nid()).or_default().push(s.wid);
            joins.entry(s.last_nid()).or_default().push(s.wid);
            map.insert(s.wid, s);
        }
        (map, joins)
    }

    #[test]
    fn straight_ways_join_head_to_tail() {
        let a = seg(1, &[(1, 40.0, -105.000), (2, 40.0, -105.001), (3, 40.0, -105.002)]);
        let b = seg(2, &[(3, 40.0, -105.002), (4, 40.0, -105.003), (5, 40.0, -105.004)]);
        let (mut segs, mut joins) = setup(vec![a, b]);
        join_ways(&mut segs, &mut joins);
        assert_eq!(segs.len(), 1);
        let s = segs.values().next().unwrap();
        assert_eq!(
            s.nds.iter().map(|n| n.nid).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
    }

    #[test]
    fn reversed_ways_join_in_orientation() {
        // Both ways end at node 3: tail-to-tail junction.
        let a = seg(1, &[(1, 40.0, -105.000), (2, 40.0, -105.001), (3, 40.0, -105.002)]);
        let b = seg(2, &[(5, 40.0, -105.004), (4, 40.0, -105.003), (3, 40.0, -105.002)]);
        let (mut segs, mut joins) = setup(vec![a, b]);
        join_ways(&mut segs, &mut joins);
        assert_eq!(segs.len(), 1);
        let nids: Vec<i64> = segs.values().next().unwrap().nds.iter().map(|n| n.nid).collect();
        assert!(nids == vec![1, 2, 3, 4, 5] || nids == vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn sharp_angle_is_rejected() {
        // b doubles back: the turn at node 3 is far beyond 30 degrees.
        let a = seg(1, &[(1, 40.0, -105.000), (2, 40.0, -105.001), (3, 40.0, -105.002)]);
        let b = seg(2, &[(3, 40.0, -105.002), (4, 40.001, -105.0015), (5, 40.002, -105.001)]);
        let (mut segs, mut joins) = setup(vec![a, b]);
        join_ways(&mut segs, &mut joins);
        assert_eq!(segs.len(), 2);
    }

    #[test]
    fn incompatible_attributes_do_not_join() {
        let a = seg(1, &[(1, 40.0, -105.000), (2, 40.0, -105.001)]);
        let mut b = seg(2, &[(2, 40.0, -105.001), (3, 40.0, -105.002)]);
        b.name = "Other".into();
        let (mut segs, mut joins) = setup(vec![a, b]);
        join_ways(&mut segs, &mut joins);
        assert_eq!(segs.len(), 2);

        let a = seg(1, &[(1, 40.0, -105.000), (2, 40.0, -105.001)]);
        let mut b = seg(2, &[(2, 40.0, -105.001), (3, 40.0, -105.002)]);
        b.layer = 1;
        let (mut segs, mut joins) = setup(vec![a, b]);
        join_ways(&mut segs, &mut joins);
        assert_eq!(segs.len(), 2);
    }

    #[test]
    fn loops_do_not_join() {
        let a = seg(1, &[(1, 40.0, -105.0), (2, 40.0, -105.001), (1, 40.0, -105.0)]);
        let b = seg(2, &[(1, 40.0, -105.0), (3, 40.0, -104.999)]);
        let (mut segs, mut joins) = setup(vec![a, b]);
        join_ways(&mut segs, &mut joins);
        assert_eq!(segs.len(), 2);
    }

    #[test]
    fn chains_join_to_fixed_point() {
        let mut input = Vec::new();
        for i in 0..4i64 {
            input.push(seg(
                i + 1,
                &[
                    (i * 10, 40.0, -105.0 - 0.001 * i as f64),
                    (i * 10 + 10, 40.0, -105.0 - 0.001 * (i + 1) as f64),
                ],
            ));
        }
        let (mut segs, mut joins) = setup(input);
        join_ways(&mut segs, &mut joins);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs.values().next().unwrap().nds.len(), 5);
    }

    #[test]
    fn sampling_keeps_first_and_last() {
        let mut segs = HashMap::new();
        segs.insert(
            1,
            seg(
                1,
                &[
                    (1, 40.0, -105.0000),
                    (2, 40.0, -105.00001),
                    (3, 40.0, -105.00002),
                    (4, 40.0, -105.00003),
                ],
            ),
        );
        // ~0.85m between consecutive nodes; force decimation.
        sample_ways(&mut segs, 2.0);
        let nids: Vec<i64> = segs[&1].nds.iter().map(|n| n.nid).collect();
        assert_eq!(nids.first(), Some(&1));
        assert_eq!(nids.last(), Some(&4));
        assert!(nids.len() < 4);
        // All gaps except the final one respect min_dist.
        for w in segs[&1].nds.windows(2).rev().skip(1) {
            let d = geom::chord_dist(
                geom::surface_xyz(w[0].lat, w[0].lon),
                geom::surface_xyz(w[1].lat, w[1].lon),
            );
            assert!(d >= 2.0);
        }
    }

    #[test]
    fn quadrants_partition_the_outside() {
        let f = ClipFrame::new(14, 3000, 6000, 1.0 / 16.0);
        let b = geom::tile_bounds(14, 3000, 6000, 0.0);
        let (clat, clon) = b.center();
        assert_eq!(f.quad(clat, clon), None);
        let w = b.lon_r - b.lon_l;
        let h = b.lat_t - b.lat_b;
        assert_eq!(f.quad(clat, clon + 3.0 * w), Some(Quad::Right));
        assert_eq!(f.quad(clat, clon - 3.0 * w), Some(Quad::Left));
        assert_eq!(f.quad(clat + 3.0 * h, clon), Some(Quad::Top));
        assert_eq!(f.quad(clat - 3.0 * h, clon), Some(Quad::Bottom));
    }

    #[test]
    fn clip_drops_collinear_outside_runs() {
        let zoom = 14;
        let (x, y) = (3000u32, 6000u32);
        let b = geom::tile_bounds(zoom, x, y, 0.0);
        let (clat, _) = b.center();
        let w = b.lon_r - b.lon_l;
        // Five nodes marching right, the last three far outside.
        let nds: Vec<(i64, f64, f64)> = (0..5)
            .map(|i| (i as i64 + 1, clat, b.lon_l + w * (0.2 + 0.8 * i as f64)))
            .collect();
        let mut segs = HashMap::new();
        segs.insert(1, seg(1, &nds));
        let frame = ClipFrame::new(zoom, x, y, 1.0 / 16.0);
        clip_ways(&mut segs, &frame);
        let kept = &segs[&1].nds;
        // No three consecutive survivors outside in the same quadrant.
        for win in kept.windows(3) {
            let qs: Vec<_> = win.iter().map(|n| frame.quad(n.lat, n.lon)).collect();
            assert!(!(qs[0].is_some() && qs[0] == qs[1] && qs[1] == qs[2]));
        }
        assert!(kept.len() < 5);
    }

    #[test]
    fn clip_drops_fully_outside_segments() {
        let zoom = 14;
        let b = geom::tile_bounds(zoom, 3000, 6000, 0.0);
        let w = b.lon_r - b.lon_l;
        let (clat, clon) = b.center();
        let nds: Vec<(i64, f64, f64)> = (0..3)
            .map(|i| (i as i64 + 1, clat, clon + w * (4.0 + i as f64)))
            .collect();
        let mut segs = HashMap::new();
        segs.insert(1, seg(1, &nds));
        clip_ways(&mut segs, &ClipFrame::new(zoom, 3000, 6000, 1.0 / 16.0));
        assert!(segs.is_empty());
    }
}
