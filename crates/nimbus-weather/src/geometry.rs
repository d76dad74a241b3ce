//! Distances from a point to alert-zone geometry.
//!
//! Polygon distances are measured in a local equirectangular projection centred on the
//! origin, which is accurate enough at the scale of a forecast zone (tens of miles).

use serde_json::Value;

use crate::api::RawGeometry;

pub const EARTH_RADIUS_MILES: f64 = 3959.0;

const MILES_PER_DEGREE: f64 = EARTH_RADIUS_MILES * std::f64::consts::PI / 180.0;

/// Great-circle distance in statute miles.
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    EARTH_RADIUS_MILES * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// `(lon, lat)`, GeoJSON axis order
pub type Position = (f64, f64);
pub type Ring = Vec<Position>;

/// Zone geometry after GeoJSON interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Position),
    /// Outer ring first, then holes
    Polygon(Vec<Ring>),
    MultiPolygon(Vec<Vec<Ring>>),
}

impl Geometry {
    /// Interpret a raw GeoJSON geometry. Unsupported or malformed shapes yield `None`.
    pub fn from_raw(raw: &RawGeometry) -> Option<Self> {
        match raw.kind.as_str() {
            "Point" => position(&raw.coordinates).map(Geometry::Point),
            "Polygon" => polygon(&raw.coordinates).map(Geometry::Polygon),
            "MultiPolygon" => {
                let polygons = raw
                    .coordinates
                    .as_array()?
                    .iter()
                    .filter_map(polygon)
                    .collect::<Vec<_>>();
                (!polygons.is_empty()).then_some(Geometry::MultiPolygon(polygons))
            }
            other => {
                tracing::debug!("Unsupported zone geometry type {}", other);
                None
            }
        }
    }

    /// Minimum distance in miles from `(lat, lon)`; zero when the point is inside.
    pub fn distance_miles(&self, lat: f64, lon: f64) -> Option<f64> {
        match self {
            Geometry::Point((plon, plat)) => Some(haversine_miles(lat, lon, *plat, *plon)),
            Geometry::Polygon(rings) => {
                let projection = LocalProjection::new(lat, lon);
                polygon_distance(&projection, rings)
            }
            Geometry::MultiPolygon(polygons) => {
                let projection = LocalProjection::new(lat, lon);
                polygons
                    .iter()
                    .filter_map(|rings| polygon_distance(&projection, rings))
                    .min_by(f64::total_cmp)
            }
        }
    }
}

/// Equirectangular projection in miles, origin at `(0, 0)`.
#[derive(Debug, Clone, Copy)]
struct LocalProjection {
    lat0: f64,
    lon0: f64,
    cos_lat0: f64,
}

impl LocalProjection {
    fn new(lat0: f64, lon0: f64) -> Self {
        Self {
            lat0,
            lon0,
            cos_lat0: lat0.to_radians().cos(),
        }
    }

    fn project(&self, (lon, lat): Position) -> (f64, f64) {
        let mut dlon = lon - self.lon0;
        if dlon > 180.0 {
            dlon -= 360.0;
        } else if dlon < -180.0 {
            dlon += 360.0;
        }
        (
            dlon * MILES_PER_DEGREE * self.cos_lat0,
            (lat - self.lat0) * MILES_PER_DEGREE,
        )
    }
}

fn polygon_distance(projection: &LocalProjection, rings: &[Ring]) -> Option<f64> {
    let projected: Vec<Vec<(f64, f64)>> = rings
        .iter()
        .map(|ring| ring.iter().map(|p| projection.project(*p)).collect())
        .collect();
    let (outer, holes) = projected.split_first()?;
    if outer.len() < 3 {
        return None;
    }

    if contains_origin(outer) && !holes.iter().any(|hole| contains_origin(hole)) {
        return Some(0.0);
    }

    projected
        .iter()
        .flat_map(|ring| ring_segments(ring))
        .map(|(a, b)| origin_segment_distance(a, b))
        .min_by(f64::total_cmp)
}

/// Ring edges, closing the ring when the last position does not repeat the first.
fn ring_segments(ring: &[(f64, f64)]) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + '_ {
    let closing = match (ring.first(), ring.last()) {
        (Some(first), Some(last)) if ring.len() > 2 && first != last => Some((*last, *first)),
        _ => None,
    };
    ring.windows(2).map(|w| (w[0], w[1])).chain(closing)
}

/// Ray cast from the origin along +x.
fn contains_origin(ring: &[(f64, f64)]) -> bool {
    let mut inside = false;
    for ((x1, y1), (x2, y2)) in ring_segments(ring) {
        if (y1 > 0.0) != (y2 > 0.0) {
            let x_cross = x1 + (0.0 - y1) * (x2 - x1) / (y2 - y1);
            if x_cross > 0.0 {
                inside = !inside;
            }
        }
    }
    inside
}

fn origin_segment_distance((ax, ay): (f64, f64), (bx, by): (f64, f64)) -> f64 {
    let (dx, dy) = (bx - ax, by - ay);
    let length_sq = dx * dx + dy * dy;
    let t = if length_sq == 0.0 {
        0.0
    } else {
        (-(ax * dx + ay * dy) / length_sq).clamp(0.0, 1.0)
    };
    let (px, py) = (ax + t * dx, ay + t * dy);
    (px * px + py * py).sqrt()
}

fn position(value: &Value) -> Option<Position> {
    let coords = value.as_array()?;
    let lon = coords.first()?.as_f64()?;
    let lat = coords.get(1)?.as_f64()?;
    Some((lon, lat))
}

fn ring(value: &Value) -> Option<Ring> {
    let ring = value
        .as_array()?
        .iter()
        .map(position)
        .collect::<Option<Vec<_>>>()?;
    (ring.len() >= 3).then_some(ring)
}

fn polygon(value: &Value) -> Option<Vec<Ring>> {
    let rings = value
        .as_array()?
        .iter()
        .map(ring)
        .collect::<Option<Vec<_>>>()?;
    (!rings.is_empty()).then_some(rings)
}
