//! Terrain and tile geometry: WGS-84 coordinates on the Earth sphere, slippy
//! tile maths, and the signed 16-bit tile-local coordinate frame.

/// Earth radius in metres (spherical Web Mercator datum).
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Tile-local coordinates span this closed range on both axes.
pub const TILE_COORD_MIN: i16 = -16384;
pub const TILE_COORD_MAX: i16 = 16383;

const TILE_COORD_SPAN: f64 = 32767.0;

/// Point on the Earth surface in a 3-D cartesian frame, metres.
pub fn surface_xyz(lat: f64, lon: f64) -> [f64; 3] {
    let lat = lat.to_radians();
    let lon = lon.to_radians();
    [
        EARTH_RADIUS * lat.cos() * lon.cos(),
        EARTH_RADIUS * lat.cos() * lon.sin(),
        EARTH_RADIUS * lat.sin(),
    ]
}

/// Straight-line (chord) distance between two surface points in metres.
pub fn chord_dist(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

fn normalize(v: [f64; 3]) -> Option<[f64; 3]> {
    let n = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if n == 0.0 {
        return None;
    }
    Some([v[0] / n, v[1] / n, v[2] / n])
}

/// Cosine of the turning angle at `p1` coming from `p0` and continuing to
/// `p2`; 1.0 is dead straight. None when two points coincide.
pub fn turn_cos(p0: [f64; 3], p1: [f64; 3], p2: [f64; 3]) -> Option<f64> {
    let a = normalize([p1[0] - p0[0], p1[1] - p0[1], p1[2] - p0[2]])?;
    let b = normalize([p2[0] - p1[0], p2[1] - p1[1], p2[2] - p1[2]])?;
    Some(a[0] * b[0] + a[1] * b[1] + a[2] * b[2])
}

/// Fractional slippy tile x for a longitude.
pub fn tile_x(lon: f64, zoom: u8) -> f64 {
    let n = (1u32 << zoom) as f64;
    (lon + 180.0) / 360.0 * n
}

/// Fractional slippy tile y for a latitude (Web Mercator).
pub fn tile_y(lat: f64, zoom: u8) -> f64 {
    let n = (1u32 << zoom) as f64;
    let lat = lat.to_radians().clamp(-1.4844, 1.4844);
    (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / std::f64::consts::PI) / 2.0 * n
}

pub fn tile_to_lon(x: f64, zoom: u8) -> f64 {
    let n = (1u32 << zoom) as f64;
    x / n * 360.0 - 180.0
}

pub fn tile_to_lat(y: f64, zoom: u8) -> f64 {
    let n = (1u32 << zoom) as f64;
    (std::f64::consts::PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees()
}

/// Geographic rectangle; top latitude is the larger value.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Rect {
    pub lat_t: f64,
    pub lon_l: f64,
    pub lat_b: f64,
    pub lon_r: f64,
}

impl Rect {
    pub fn point(lat: f64, lon: f64) -> Rect {
        Rect {
            lat_t: lat,
            lon_l: lon,
            lat_b: lat,
            lon_r: lon,
        }
    }

    pub fn union_point(&mut self, lat: f64, lon: f64) {
        self.lat_t = self.lat_t.max(lat);
        self.lat_b = self.lat_b.min(lat);
        self.lon_l = self.lon_l.min(lon);
        self.lon_r = self.lon_r.max(lon);
    }

    pub fn union(&mut self, other: &Rect) {
        self.lat_t = self.lat_t.max(other.lat_t);
        self.lat_b = self.lat_b.min(other.lat_b);
        self.lon_l = self.lon_l.min(other.lon_l);
        self.lon_r = self.lon_r.max(other.lon_r);
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.lat_t + self.lat_b) / 2.0, (self.lon_l + self.lon_r) / 2.0)
    }

    /// Area in square degrees.
    pub fn area_deg2(&self) -> f64 {
        (self.lat_t - self.lat_b) * (self.lon_r - self.lon_l)
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.lat_b <= other.lat_t
            && other.lat_b <= self.lat_t
            && self.lon_l <= other.lon_r
            && other.lon_l <= self.lon_r
    }
}

/// Bounds of one slippy tile, enlarged by `border` tile fractions per side.
pub fn tile_bounds(zoom: u8, x: u32, y: u32, border: f64) -> Rect {
    Rect {
        lat_t: tile_to_lat(y as f64 - border, zoom),
        lon_l: tile_to_lon(x as f64 - border, zoom),
        lat_b: tile_to_lat(y as f64 + 1.0 + border, zoom),
        lon_r: tile_to_lon(x as f64 + 1.0 + border, zoom),
    }
}

/// Inclusive tile coordinate range covering `rect` at `zoom`, after enlarging
/// every tile by `border`; the pair is (x0..=x1, y0..=y1).
pub fn tile_range(zoom: u8, rect: &Rect, border: f64) -> (u32, u32, u32, u32) {
    let n = (1u32 << zoom) - 1;
    let clamp = |v: f64| (v.floor().max(0.0) as u32).min(n);
    let x0 = clamp(tile_x(rect.lon_l, zoom) - border);
    let x1 = clamp(tile_x(rect.lon_r, zoom) + border);
    let y0 = clamp(tile_y(rect.lat_t, zoom) - border);
    let y1 = clamp(tile_y(rect.lat_b, zoom) + border);
    (x0, x1, y0, y1)
}

/// Chunk id of a TileRefs record: tiles of one zoom level are numbered
/// row-major.
pub fn tile_major_id(zoom: u8, x: u32, y: u32) -> i64 {
    ((y as i64) << zoom) | x as i64
}

/// Diagonal of a tile in metres, used to derive the sampling distance.
pub fn tile_diag_m(zoom: u8, x: u32, y: u32) -> f64 {
    let b = tile_bounds(zoom, x, y, 0.0);
    chord_dist(surface_xyz(b.lat_t, b.lon_l), surface_xyz(b.lat_b, b.lon_r))
}

/// Minimum sampling distance for a tile: one eighth of the diagonal spread
/// over a 256x256 raster, so three zoom levels share one sampled tile.
pub fn sample_min_dist(zoom: u8, x: u32, y: u32) -> f64 {
    tile_diag_m(zoom, x, y) / 8.0 / (2.0 * 256.0 * 256.0f64).sqrt()
}

/// Projects a coordinate into the signed 16-bit tile-local frame. The tile's
/// top-left corner maps to `(16383, -16384)` and its bottom-right corner to
/// `(-16384, 16383)`; points outside saturate.
pub fn tile_local(zoom: u8, x: u32, y: u32, lat: f64, lon: f64) -> (i16, i16) {
    let u = tile_x(lon, zoom) - x as f64;
    let v = tile_y(lat, zoom) - y as f64;
    let px = (TILE_COORD_MAX as f64 - u * TILE_COORD_SPAN).round();
    let py = (TILE_COORD_MIN as f64 + v * TILE_COORD_SPAN).round();
    (
        px.clamp(TILE_COORD_MIN as f64, TILE_COORD_MAX as f64) as i16,
        py.clamp(TILE_COORD_MIN as f64, TILE_COORD_MAX as f64) as i16,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_math_round_trips() {
        let lon = -105.27;
        let lat = 39.99;
        assert!((tile_to_lon(tile_x(lon, 14), 14) - lon).abs() < 1e-9);
        assert!((tile_to_lat(tile_y(lat, 14), 14) - lat).abs() < 1e-9);
    }

    #[test]
    fn tile_bounds_ordering() {
        let b = tile_bounds(11, 425, 776, 0.0);
        assert!(b.lat_t > b.lat_b);
        assert!(b.lon_l < b.lon_r);
        let enlarged = tile_bounds(11, 425, 776, 1.0 / 16.0);
        assert!(enlarged.lat_t > b.lat_t);
        assert!(enlarged.lon_l < b.lon_l);
    }

    #[test]
    fn tile_range_covers_point() {
        let rect = Rect::point(39.99, -105.27);
        let (x0, x1, y0, y1) = tile_range(14, &rect, 0.0);
        assert_eq!((x0, y0), (x1, y1));
        let b = tile_bounds(14, x0, y0, 0.0);
        assert!(b.lat_b <= 39.99 && 39.99 <= b.lat_t);
        assert!(b.lon_l <= -105.27 && -105.27 <= b.lon_r);
    }

    #[test]
    fn border_widens_range_near_edges() {
        // A point on a tile boundary lands in both neighbours when enlarged.
        let lon = tile_to_lon(1024.0, 11);
        let rect = Rect::point(40.0, lon + 1e-9);
        let (x0, x1, _, _) = tile_range(11, &rect, 1.0 / 16.0);
        assert_eq!(x1 - x0, 1);
        assert_eq!(x0, 1023);
    }

    #[test]
    fn turn_cos_straight_and_right_angle() {
        let a = surface_xyz(40.0, -105.0);
        let b = surface_xyz(40.0, -105.001);
        let c = surface_xyz(40.0, -105.002);
        assert!(turn_cos(a, b, c).unwrap() > 0.9999);
        let d = surface_xyz(40.001, -105.001);
        assert!(turn_cos(a, b, d).unwrap() < 0.1);
    }

    #[test]
    fn tile_local_corners_saturate() {
        // Top-left of the tile.
        let b = tile_bounds(14, 3000, 6000, 0.0);
        let (px, py) = tile_local(14, 3000, 6000, b.lat_t, b.lon_l);
        assert_eq!((px, py), (TILE_COORD_MAX, TILE_COORD_MIN));
        // Far outside saturates.
        let (px, py) = tile_local(14, 3000, 6000, b.lat_b - 10.0, b.lon_r + 10.0);
        assert_eq!((px, py), (TILE_COORD_MIN, TILE_COORD_MAX));
    }

    #[test]
    fn sample_dist_scales_with_zoom() {
        let d11 = sample_min_dist(11, 425, 776);
        let d14 = sample_min_dist(14, 3400, 6200);
        assert!(d11 > 7.0 * d14);
    }
}
