use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, ScoringError};

/// Metres per degree of latitude (and of longitude at the equator).
pub const METRES_PER_DEG: f64 = 111_320.0;

/// A georeferenced 2D scalar grid, f32 values, row-major.
///
/// Row 0 is the southernmost row (S→N). Each pixel covers an area cell of
/// `(max_lon − min_lon) / width` by `(max_lat − min_lat) / height` degrees.
/// NaN marks no-data; it is written as `null` in JSON.
#[derive(Debug, Clone, Serialize)]
pub struct Raster {
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

fn null_as_nan_vec<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<f32>, D::Error> {
    let v: Vec<Option<f32>> = Vec::deserialize(d)?;
    Ok(v.into_iter().map(|x| x.unwrap_or(f32::NAN)).collect())
}

impl<'de> Deserialize<'de> for Raster {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(deserialize_with = "null_as_nan_vec")]
            data: Vec<f32>,
            width: usize,
            height: usize,
            min_lon: f64,
            max_lon: f64,
            min_lat: f64,
            max_lat: f64,
        }
        let raw = Raw::deserialize(d)?;
        let raster = Raster {
            data: raw.data,
            width: raw.width,
            height: raw.height,
            min_lon: raw.min_lon,
            max_lon: raw.max_lon,
            min_lat: raw.min_lat,
            max_lat: raw.max_lat,
        };
        raster.validate().map_err(serde::de::Error::custom)?;
        Ok(raster)
    }
}

impl Raster {
    /// Create a new Raster filled with the given value.
    pub fn new(
        width: usize,
        height: usize,
        min_lon: f64,
        max_lon: f64,
        min_lat: f64,
        max_lat: f64,
        fill: f32,
    ) -> Self {
        Self {
            data: vec![fill; width * height],
            width,
            height,
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        }
    }

    /// A raster on the same grid as `self`, filled with `fill`.
    pub fn filled_like(&self, fill: f32) -> Self {
        Self::new(
            self.width,
            self.height,
            self.min_lon,
            self.max_lon,
            self.min_lat,
            self.max_lat,
            fill,
        )
    }

    /// Same grid as `self`, replacing the values. `data` must be `width × height` long.
    pub fn with_data(&self, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), self.width * self.height);
        Self {
            data,
            width: self.width,
            height: self.height,
            min_lon: self.min_lon,
            max_lon: self.max_lon,
            min_lat: self.min_lat,
            max_lat: self.max_lat,
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        self.data[row * self.width + col] = val;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Pixel size in degrees, `(lon, lat)`.
    pub fn pixel_deg(&self) -> (f64, f64) {
        (
            (self.max_lon - self.min_lon) / self.width.max(1) as f64,
            (self.max_lat - self.min_lat) / self.height.max(1) as f64,
        )
    }

    /// Geographic centre `(lon, lat)` of pixel `(row, col)`.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let (dx, dy) = self.pixel_deg();
        (
            self.min_lon + (col as f64 + 0.5) * dx,
            self.min_lat + (row as f64 + 0.5) * dy,
        )
    }

    /// Pixel `(row, col)` containing `(lon, lat)`, or None outside the bounds.
    /// The max edges belong to the last row/column.
    pub fn pixel_at(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        if !(self.min_lon..=self.max_lon).contains(&lon) || !(self.min_lat..=self.max_lat).contains(&lat) {
            return None;
        }
        let (dx, dy) = self.pixel_deg();
        let col = (((lon - self.min_lon) / dx).floor() as usize).min(self.width - 1);
        let row = (((lat - self.min_lat) / dy).floor() as usize).min(self.height - 1);
        Some((row, col))
    }

    /// Value of the pixel containing `(lon, lat)`; None outside or on no-data.
    pub fn value_at(&self, lon: f64, lat: f64) -> Option<f32> {
        let (r, c) = self.pixel_at(lon, lat)?;
        let v = self.get(r, c);
        v.is_finite().then_some(v)
    }

    /// True if both rasters share dimensions and bounds.
    pub fn same_grid(&self, other: &Raster) -> bool {
        const EPS: f64 = 1e-9;
        self.width == other.width
            && self.height == other.height
            && (self.min_lon - other.min_lon).abs() < EPS
            && (self.max_lon - other.max_lon).abs() < EPS
            && (self.min_lat - other.min_lat).abs() < EPS
            && (self.max_lat - other.max_lat).abs() < EPS
    }

    /// `data` holds exactly `width × height` values and the bounds span a
    /// non-empty box.
    pub fn validate(&self) -> Result<()> {
        let expected = self.width.checked_mul(self.height);
        if expected != Some(self.data.len()) {
            return Err(ScoringError::configuration(format!(
                "raster {}×{} carries {} values",
                self.width,
                self.height,
                self.data.len()
            )));
        }
        if !(self.min_lon < self.max_lon && self.min_lat < self.max_lat) {
            return Err(ScoringError::configuration(format!(
                "raster bounds lon {}..{} lat {}..{} are empty",
                self.min_lon, self.max_lon, self.min_lat, self.max_lat
            )));
        }
        Ok(())
    }

    pub(crate) fn ensure_same_grid(&self, other: &Raster, what: &str) -> Result<()> {
        if self.same_grid(other) {
            Ok(())
        } else {
            Err(ScoringError::configuration(format!(
                "{what}: grid {}×{} does not match {}×{}",
                other.width, other.height, self.width, self.height
            )))
        }
    }

    /// Apply `f` to every pixel (NaN handling is up to `f`).
    pub fn map<F>(&self, f: F) -> Raster
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        #[cfg(feature = "threading")]
        let data: Vec<f32> = {
            use rayon::prelude::*;
            self.data.par_iter().map(|&v| f(v)).collect()
        };
        #[cfg(not(feature = "threading"))]
        let data: Vec<f32> = self.data.iter().map(|&v| f(v)).collect();
        self.with_data(data)
    }

    /// Combine two rasters pixel by pixel. Fails if the grids differ.
    pub fn zip_map<F>(&self, other: &Raster, f: F) -> Result<Raster>
    where
        F: Fn(f32, f32) -> f32 + Sync + Send,
    {
        self.ensure_same_grid(other, "zip_map")?;
        #[cfg(feature = "threading")]
        let data: Vec<f32> = {
            use rayon::prelude::*;
            self.data.par_iter().zip(other.data.par_iter()).map(|(&a, &b)| f(a, b)).collect()
        };
        #[cfg(not(feature = "threading"))]
        let data: Vec<f32> = self.data.iter().zip(&other.data).map(|(&a, &b)| f(a, b)).collect();
        Ok(self.with_data(data))
    }

    /// Iterator over finite (valid) pixel values.
    pub fn valid_values(&self) -> impl Iterator<Item = f32> + '_ {
        self.data.iter().copied().filter(|v| v.is_finite())
    }

    pub fn valid_count(&self) -> usize {
        self.valid_values().count()
    }

    pub fn min_valid(&self) -> Option<f32> {
        self.valid_values().reduce(f32::min)
    }

    pub fn max_valid(&self) -> Option<f32> {
        self.valid_values().reduce(f32::max)
    }

    /// Cell size in metres `(x, y)` at the raster's mid latitude.
    pub fn cellsize_m(&self) -> (f64, f64) {
        let (dx, dy) = self.pixel_deg();
        let mid_lat = (self.min_lat + self.max_lat) / 2.0;
        (
            dx.abs() * METRES_PER_DEG * mid_lat.to_radians().cos(),
            dy.abs() * METRES_PER_DEG,
        )
    }

    /// Isotropic nominal pixel scale in metres. Falls back to 30 m for
    /// degenerate bounds.
    pub fn nominal_scale_m(&self) -> f64 {
        let (cx, cy) = self.cellsize_m();
        let avg = (cx + cy) / 2.0;
        if avg < 1e-3 { 30.0 } else { avg }
    }
}
