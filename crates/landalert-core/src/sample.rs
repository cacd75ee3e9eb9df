//! Point extraction from a classified surface.
//!
//! A query is snapped to the centre of its cell on a fixed sampling grid
//! (default 500 m, anchored at the raster's south-west corner); the native
//! pixel under that centre is read. Nearby queries inside one sampling cell
//! therefore always agree.

use serde::{Deserialize, Serialize};

use crate::classify::{ClassLayer, RiskClass};
use crate::coords::QueryPoint;
use crate::error::{Result, ScoringError};
use crate::raster::{Raster, METRES_PER_DEG};
use crate::region::Region;

/// Class and index value at one query point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampledResult {
    pub class: RiskClass,
    pub index_value: f32,
    pub point: QueryPoint,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointSampler {
    scale_m: f64,
}

impl PointSampler {
    pub fn new(scale_m: f64) -> Result<Self> {
        if !(scale_m.is_finite() && scale_m > 0.0) {
            return Err(ScoringError::calibration(format!("sampling scale {scale_m} m")));
        }
        Ok(Self { scale_m })
    }

    pub fn scale_m(&self) -> f64 {
        self.scale_m
    }

    /// Centre `(lon, lat)` of the sampling cell containing `point`.
    ///
    /// The longitude step uses the raster's mid latitude so the grid is
    /// regular across the whole raster.
    pub fn snap(&self, grid: &Raster, point: QueryPoint) -> (f64, f64) {
        let mid_lat = (grid.min_lat + grid.max_lat) / 2.0;
        let step_lat = self.scale_m / METRES_PER_DEG;
        let step_lon = self.scale_m / (METRES_PER_DEG * mid_lat.to_radians().cos().max(1e-6));
        let col = ((point.lon - grid.min_lon) / step_lon).floor();
        let row = ((point.lat - grid.min_lat) / step_lat).floor();
        (
            grid.min_lon + (col + 0.5) * step_lon,
            grid.min_lat + (row + 0.5) * step_lat,
        )
    }

    /// None when the point is outside `region`, outside the raster, or the
    /// pixel is masked or unclassified.
    pub fn sample(
        &self,
        classes: &ClassLayer,
        index: &Raster,
        region: &Region,
        point: QueryPoint,
    ) -> Option<SampledResult> {
        if !region.contains(point) {
            return None;
        }
        let (lon, lat) = self.snap(index, point);
        let (row, col) = index.pixel_at(lon, lat)?;
        let index_value = index.get(row, col);
        if !index_value.is_finite() {
            return None;
        }
        let class = classes.get(row, col)?;
        Some(SampledResult {
            class,
            index_value,
            point,
        })
    }

    /// Like [`sample`](Self::sample), but a miss is [`ScoringError::NoData`].
    pub fn require(
        &self,
        classes: &ClassLayer,
        index: &Raster,
        region: &Region,
        point: QueryPoint,
    ) -> Result<SampledResult> {
        self.sample(classes, index, region, point).ok_or(ScoringError::NoData {
            lat: point.lat,
            lon: point.lon,
        })
    }
}

impl Default for PointSampler {
    fn default() -> Self {
        Self { scale_m: 500.0 }
    }
}
