//! WGS84 -> metric CRS reprojection, following a UTM-zone-from-centroid strategy.

use anyhow::{anyhow, Context, Result};
use geo::{Coord, LineString, Point, Rect};
use proj4rs::{proj::Proj, transform::transform};

use super::Geom;

const SOURCE_PROJ4: &str = "+proj=longlat +datum=WGS84 +no_defs +type=crs";

/// A metric coordinate reference system, chosen once for a whole feature store
/// from the overall bounds of the ingested WGS84 geometries.
///
/// All distances compared against each other (radii, bridge caps, BFS costs)
/// assume a single shared `MetricCrs` — reprojecting a subset of features into
/// a different zone and mixing distances would silently corrupt every radius
/// comparison in the connection engine.
#[derive(Debug)]
pub struct MetricCrs {
    from: Proj,
    to: Proj,
    zone: u32,
}

impl MetricCrs {
    /// Pick a UTM zone from the centroid of `bounds` and build the forward transform.
    pub fn from_bounds(bounds: Rect<f64>) -> Result<Self> {
        let center = bounds.center();
        let zone = (((center.x + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60) as u32;
        let north = center.y >= 0.0;
        let south = if north { "" } else { " +south" };
        let target_proj4 =
            format!("+proj=utm +zone={zone}{south} +datum=WGS84 +units=m +no_defs +type=crs");

        let from = Proj::from_proj_string(SOURCE_PROJ4)
            .map_err(|e| anyhow!("failed to build source PROJ.4: {e:?}"))
            .with_context(|| SOURCE_PROJ4.to_string())?;
        let to = Proj::from_proj_string(&target_proj4)
            .map_err(|e| anyhow!("failed to build target PROJ.4: {e:?}"))
            .with_context(|| target_proj4.clone())?;

        Ok(Self { from, to, zone })
    }

    /// UTM zone number this CRS projects into (1-60), for diagnostics.
    pub fn zone(&self) -> u32 {
        self.zone
    }

    fn project_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let mut point = (coord.x.to_radians(), coord.y.to_radians(), 0.0);
        transform(&self.from, &self.to, &mut point)
            .map_err(|e| anyhow!("CRS transform failed for ({}, {}): {e:?}", coord.x, coord.y))?;
        Ok(Coord { x: point.0, y: point.1 })
    }
}

/// Project a WGS84 geometry into `crs`. Returns an error if the transform
/// diverges for any coordinate (e.g. a point with no valid UTM image), which
/// callers treat as a recoverable per-feature failure — the metric projection
/// is simply absent for that feature.
pub fn project_to_metric(geom: &Geom, crs: &MetricCrs) -> Result<Geom> {
    match geom {
        Geom::Point(p) => Ok(Geom::Point(Point::from(crs.project_coord(p.0)?))),
        Geom::LineString(ls) => {
            let coords = ls
                .0
                .iter()
                .map(|&c| crs.project_coord(c))
                .collect::<Result<Vec<_>>>()?;
            Ok(Geom::LineString(LineString::new(coords)))
        }
    }
}
