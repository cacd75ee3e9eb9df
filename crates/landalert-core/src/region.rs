//! Region of interest: the national boundary constraining layers and queries.
//!
//! Boundaries are stored as closed or open rings of `[lon, lat]` vertices.
//! Containment uses the even-odd rule over every ring, so holes and
//! multi-part boundaries both work without extra bookkeeping.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coords::QueryPoint;
use crate::error::{Result, ScoringError};
use crate::raster::Raster;

/// Simplified Nigeria outline (≈ 0.2° fidelity), `[lon, lat]`.
/// Good enough for rejecting out-of-country queries; calibrations that need
/// the exact boundary load a GeoJSON file instead.
const NIGERIA_OUTLINE: &[[f64; 2]] = &[
    [2.69, 6.37],
    [2.72, 9.00],
    [3.10, 9.90],
    [3.60, 10.30],
    [3.60, 11.70],
    [3.65, 12.55],
    [4.10, 13.48],
    [5.50, 13.90],
    [6.80, 13.10],
    [7.80, 13.30],
    [9.00, 12.85],
    [10.70, 13.35],
    [12.30, 13.10],
    [13.60, 13.70],
    [14.20, 12.40],
    [14.60, 11.60],
    [13.70, 10.70],
    [13.20, 9.60],
    [12.60, 8.40],
    [11.80, 7.10],
    [11.00, 6.50],
    [9.80, 6.00],
    [8.90, 4.60],
    [8.50, 4.50],
    [7.00, 4.40],
    [6.00, 4.30],
    [5.20, 5.60],
    [4.50, 6.30],
    [3.40, 6.40],
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    /// Rings of `[lon, lat]` vertices.
    pub rings: Vec<Vec<[f64; 2]>>,
}

impl Region {
    pub fn new(name: impl Into<String>, rings: Vec<Vec<[f64; 2]>>) -> Result<Self> {
        let rings: Vec<_> = rings.into_iter().filter(|r| r.len() >= 3).collect();
        if rings.is_empty() {
            return Err(ScoringError::configuration("region has no ring with 3+ vertices"));
        }
        Ok(Self { name: name.into(), rings })
    }

    /// Built-in simplified national boundary.
    pub fn nigeria() -> Self {
        Self {
            name: "Nigeria".to_string(),
            rings: vec![NIGERIA_OUTLINE.to_vec()],
        }
    }

    /// Parse a GeoJSON `Polygon`, `MultiPolygon`, `Feature` or
    /// `FeatureCollection`. All polygon rings of all features are kept.
    pub fn from_geojson(name: impl Into<String>, json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| ScoringError::configuration(format!("invalid GeoJSON: {e}")))?;
        let mut rings = Vec::new();
        collect_rings(&value, &mut rings)?;
        Self::new(name, rings)
    }

    /// `(min_lon, min_lat, max_lon, max_lat)` over all rings.
    pub fn bbox(&self) -> (f64, f64, f64, f64) {
        let mut b = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for &[lon, lat] in self.rings.iter().flatten() {
            b.0 = b.0.min(lon);
            b.1 = b.1.min(lat);
            b.2 = b.2.max(lon);
            b.3 = b.3.max(lat);
        }
        b
    }

    pub fn contains(&self, point: QueryPoint) -> bool {
        self.contains_lon_lat(point.lon, point.lat)
    }

    /// Even-odd ray cast across every ring.
    pub fn contains_lon_lat(&self, lon: f64, lat: f64) -> bool {
        let (min_lon, min_lat, max_lon, max_lat) = self.bbox();
        if lon < min_lon || lon > max_lon || lat < min_lat || lat > max_lat {
            return false;
        }
        let mut inside = false;
        for ring in &self.rings {
            let n = ring.len();
            let mut j = n - 1;
            for i in 0..n {
                let [xi, yi] = ring[i];
                let [xj, yj] = ring[j];
                if (yi > lat) != (yj > lat) && lon < (xj - xi) * (lat - yi) / (yj - yi) + xi {
                    inside = !inside;
                }
                j = i;
            }
        }
        inside
    }

    /// Mask (set NaN) every pixel whose centre falls outside the region.
    pub fn clip(&self, raster: &Raster) -> Raster {
        let mut out = raster.clone();
        for r in 0..out.height {
            for c in 0..out.width {
                let (lon, lat) = out.cell_center(r, c);
                if !self.contains_lon_lat(lon, lat) {
                    out.set(r, c, f32::NAN);
                }
            }
        }
        out
    }
}

fn collect_rings(value: &Value, rings: &mut Vec<Vec<[f64; 2]>>) -> Result<()> {
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "FeatureCollection" => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| ScoringError::configuration("FeatureCollection without features"))?;
            for f in features {
                collect_rings(f, rings)?;
            }
        }
        "Feature" => {
            let geometry = value
                .get("geometry")
                .ok_or_else(|| ScoringError::configuration("Feature without geometry"))?;
            collect_rings(geometry, rings)?;
        }
        "Polygon" => {
            for ring in coordinate_array(value)? {
                rings.push(parse_ring(ring)?);
            }
        }
        "MultiPolygon" => {
            for polygon in coordinate_array(value)? {
                let polygon = polygon
                    .as_array()
                    .ok_or_else(|| ScoringError::configuration("MultiPolygon part is not an array"))?;
                for ring in polygon {
                    rings.push(parse_ring(ring)?);
                }
            }
        }
        other => {
            return Err(ScoringError::configuration(format!(
                "unsupported GeoJSON type {other:?}"
            )))
        }
    }
    Ok(())
}

fn coordinate_array(value: &Value) -> Result<&Vec<Value>> {
    value
        .get("coordinates")
        .and_then(Value::as_array)
        .ok_or_else(|| ScoringError::configuration("geometry without coordinates"))
}

fn parse_ring(ring: &Value) -> Result<Vec<[f64; 2]>> {
    let vertices = ring
        .as_array()
        .ok_or_else(|| ScoringError::configuration("ring is not an array"))?;
    vertices
        .iter()
        .map(|v| {
            let lon = v.get(0).and_then(Value::as_f64);
            let lat = v.get(1).and_then(Value::as_f64);
            match (lon, lat) {
                (Some(lon), Some(lat)) => Ok([lon, lat]),
                _ => Err(ScoringError::configuration("vertex is not [lon, lat]")),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64) -> QueryPoint {
        QueryPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn nigerian_cities_are_inside() {
        let ng = Region::nigeria();
        for (name, lat, lon) in [
            ("Lokoja", 7.80, 6.74),
            ("Kano", 12.00, 8.52),
            ("Maiduguri", 11.85, 13.16),
            ("Lagos", 6.52, 3.38),
            ("Enugu", 6.45, 7.50),
            ("Abuja", 9.07, 7.40),
        ] {
            assert!(ng.contains(pt(lat, lon)), "{name} should be inside");
        }
    }

    #[test]
    fn points_beyond_the_border_are_outside() {
        let ng = Region::nigeria();
        // ~55 km west of the Benin border.
        assert!(!ng.contains(pt(9.0, 2.2)));
        // Gulf of Guinea, Niamey, Douala.
        assert!(!ng.contains(pt(3.5, 6.0)));
        assert!(!ng.contains(pt(13.51, 2.11)));
        assert!(!ng.contains(pt(4.05, 9.70)));
    }

    #[test]
    fn geojson_polygon_with_hole() {
        let json = r#"{
            "type": "Feature",
            "properties": {},
            "geometry": {
                "type": "Polygon",
                "coordinates": [
                    [[0,0],[10,0],[10,10],[0,10],[0,0]],
                    [[4,4],[6,4],[6,6],[4,6],[4,4]]
                ]
            }
        }"#;
        let region = Region::from_geojson("square", json).unwrap();
        assert!(region.contains_lon_lat(2.0, 2.0));
        assert!(!region.contains_lon_lat(5.0, 5.0));
        assert!(!region.contains_lon_lat(11.0, 5.0));
    }

    #[test]
    fn geojson_rejects_points() {
        let json = r#"{"type":"Point","coordinates":[1,2]}"#;
        assert!(matches!(
            Region::from_geojson("p", json),
            Err(ScoringError::Configuration(_))
        ));
    }

    #[test]
    fn clip_masks_outside_pixels() {
        let region = Region::new("tri", vec![vec![[0.0, 0.0], [4.0, 0.0], [0.0, 4.0]]]).unwrap();
        let r = Raster::new(4, 4, 0.0, 4.0, 0.0, 4.0, 1.0);
        let clipped = region.clip(&r);
        assert_eq!(clipped.get(0, 0), 1.0);
        assert!(clipped.get(3, 3).is_nan());
    }
}
