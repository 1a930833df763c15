//! Geometry kernel (C1): point/linestring primitives, endpoint extraction,
//! buffered-bbox and true-distance queries against a metric CRS.
//!
//! Every distance computed in this module is Euclidean in whatever CRS the
//! caller supplies the geometry in. The kernel never does geodesic math and
//! never knows which CRS is "the" metric one — callers project first.

mod projection;

pub use projection::{project_to_metric, MetricCrs};

use geo::{BoundingRect, Coord, Distance, Euclidean, LineString, Point, Rect};

/// A feature's geometry, restricted to the two shapes this system understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Geom {
    Point(Point<f64>),
    LineString(LineString<f64>),
}

impl Geom {
    /// Number of distinct coordinates. Used to reject degenerate linestrings at ingest.
    pub fn coord_count(&self) -> usize {
        match self {
            Geom::Point(_) => 1,
            Geom::LineString(ls) => ls.0.len(),
        }
    }

    /// The representative "probe point" used to search for candidate connections:
    /// the point itself for Point geometry, the centroid for anything else that
    /// isn't handled by `endpoints`.
    pub fn probe_point(&self) -> Point<f64> {
        match self {
            Geom::Point(p) => *p,
            Geom::LineString(ls) => {
                use geo::Centroid;
                ls.centroid().unwrap_or_else(|| Point::new(ls.0[0].x, ls.0[0].y))
            }
        }
    }

    /// Bounding rectangle of this geometry, for spatial indexing.
    pub fn bounding_rect(&self) -> Rect<f64> {
        match self {
            Geom::Point(p) => Rect::new(p.0, p.0),
            Geom::LineString(ls) => ls
                .bounding_rect()
                .unwrap_or_else(|| Rect::new(ls.0[0], ls.0[0])),
        }
    }
}

/// Extracts the first/last coordinates of a linestring as points.
///
/// Fails (returns `None`) for a linestring with fewer than two coordinates;
/// callers drop the offending feature at ingest per the malformed-input policy.
pub fn endpoints(line: &LineString<f64>) -> Option<(Point<f64>, Point<f64>)> {
    if line.0.len() < 2 {
        return None;
    }
    let start = *line.0.first()?;
    let end = *line.0.last()?;
    Some((Point::from(start), Point::from(end)))
}

/// True Euclidean distance between two geometries in the metric CRS they're expressed in.
pub fn distance_metric(a: &Geom, b: &Geom) -> f64 {
    match (a, b) {
        (Geom::Point(p1), Geom::Point(p2)) => Euclidean.distance(*p1, *p2),
        (Geom::Point(p), Geom::LineString(ls)) | (Geom::LineString(ls), Geom::Point(p)) => {
            Euclidean.distance(p, ls)
        }
        (Geom::LineString(a), Geom::LineString(b)) => Euclidean.distance(a, b),
    }
}

/// Distance from a probe point to a geometry.
pub fn distance_from_point(point: Point<f64>, geom: &Geom) -> f64 {
    match geom {
        Geom::Point(p) => Euclidean.distance(point, *p),
        Geom::LineString(ls) => Euclidean.distance(&point, ls),
    }
}

/// Axis-aligned bounding rectangle of the `r`-radius disk around `point`.
pub fn buffer_bbox(point: Point<f64>, r: f64) -> Rect<f64> {
    Rect::new(
        Coord { x: point.x() - r, y: point.y() - r },
        Coord { x: point.x() + r, y: point.y() + r },
    )
}

/// Exact geometric test: is any part of `geom` within `r` of `point`?
pub fn intersects_disk(geom: &Geom, point: Point<f64>, r: f64) -> bool {
    distance_from_point(point, geom) <= r
}
