//! Layer normalization: min/max unit scaling with polarity, and categorical
//! reclassification.
//!
//!   t = clamp((v − min) / (max − min), 0, 1)
//!   direct   → t
//!   inverted → 1 − t
//!
//! NaN (no-data) passes through unchanged.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoringError};
use crate::raster::Raster;

/// Whether higher raw values mean higher risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Higher raw → higher risk.
    Direct,
    /// Higher raw → lower risk (elevation, slope, distance to river, NDVI).
    Inverted,
}

/// Validated normalization bounds. `max > min` is enforced on construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Calibration {
    min: f32,
    max: f32,
}

impl Calibration {
    pub fn new(min: f32, max: f32) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(ScoringError::calibration(format!(
                "non-finite bounds [{min}, {max}]"
            )));
        }
        if max <= min {
            return Err(ScoringError::calibration(format!(
                "max {max} must exceed min {min}"
            )));
        }
        Ok(Self { min, max })
    }

    /// Compile-time defaults only; caller guarantees `max > min`.
    pub(crate) const fn fixed(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Bounds taken from the valid extent of `raster` (e.g. the regional
    /// maximum of log flow accumulation).
    pub fn from_extent(raster: &Raster) -> Result<Self> {
        match (raster.min_valid(), raster.max_valid()) {
            (Some(min), Some(max)) => Self::new(min, max),
            _ => Err(ScoringError::calibration("raster has no valid pixels")),
        }
    }

    /// `[min, observed max]`, used where the lower bound is fixed by physics
    /// (zero flow) and only the top is data-driven.
    pub fn from_fixed_min(min: f32, raster: &Raster) -> Result<Self> {
        let max = raster
            .max_valid()
            .ok_or_else(|| ScoringError::calibration("raster has no valid pixels"))?;
        Self::new(min, max)
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    /// Unit-scale one value with clamping.
    #[inline]
    pub fn unit_scale(&self, v: f32) -> f32 {
        if v.is_nan() {
            return f32::NAN;
        }
        ((v - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }

    /// Unit-scale and apply polarity.
    #[inline]
    pub fn normalize_value(&self, v: f32, polarity: Polarity) -> f32 {
        let t = self.unit_scale(v);
        match polarity {
            Polarity::Direct => t,
            Polarity::Inverted => 1.0 - t,
        }
    }
}

impl<'de> Deserialize<'de> for Calibration {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            min: f32,
            max: f32,
        }
        let raw = Raw::deserialize(d)?;
        Calibration::new(raw.min, raw.max).map_err(serde::de::Error::custom)
    }
}

/// A layer mapped into [0, 1], tagged with the name it is weighted under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedLayer {
    pub name: String,
    pub polarity: Polarity,
    pub raster: Raster,
}

impl NormalizedLayer {
    /// Wrap a raster already in [0, 1]; values outside are clamped.
    pub fn from_unit(name: impl Into<String>, polarity: Polarity, raster: &Raster) -> Self {
        Self {
            name: name.into(),
            polarity,
            raster: raster.map(|v| if v.is_nan() { v } else { v.clamp(0.0, 1.0) }),
        }
    }
}

/// Normalize `layer` into [0, 1] under `calibration` and `polarity`.
pub fn normalize(
    name: impl Into<String>,
    layer: &Raster,
    calibration: Calibration,
    polarity: Polarity,
) -> NormalizedLayer {
    NormalizedLayer {
        name: name.into(),
        polarity,
        raster: layer.map(|v| calibration.normalize_value(v, polarity)),
    }
}

/// `ln(1 + v)`; negative inputs are treated as no-data.
pub fn log1p_layer(layer: &Raster) -> Raster {
    layer.map(|v| if v.is_nan() || v < 0.0 { f32::NAN } else { v.ln_1p() })
}

/// Categorical code → risk score lookup.
///
/// Codes missing from the table map to NaN (masked), never an error;
/// aggregation then masks the pixel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReclassTable {
    pub entries: Vec<(u16, f32)>,
}

impl ReclassTable {
    pub fn new(entries: Vec<(u16, f32)>) -> Result<Self> {
        for &(code, score) in &entries {
            if !(0.0..=1.0).contains(&score) {
                return Err(ScoringError::calibration(format!(
                    "reclass score {score} for code {code} outside [0, 1]"
                )));
            }
        }
        Ok(Self { entries })
    }

    /// ESA WorldCover v200 classes → flood risk score.
    pub fn worldcover_flood() -> Self {
        Self {
            entries: vec![
                (10, 0.2),
                (20, 0.4),
                (30, 0.6),
                (40, 0.8),
                (50, 0.9),
                (60, 0.7),
                (70, 0.3),
                (80, 0.1),
                (90, 0.5),
                (95, 0.5),
                (100, 0.6),
            ],
        }
    }

    pub fn lookup(&self, code: f32) -> f32 {
        if !code.is_finite() || code < 0.0 || code.fract() != 0.0 {
            return f32::NAN;
        }
        let code = code as u16;
        self.entries
            .iter()
            .find(|(c, _)| *c == code)
            .map_or(f32::NAN, |&(_, s)| s)
    }
}

/// Reclassify a categorical layer to risk scores.
pub fn reclassify(name: impl Into<String>, layer: &Raster, table: &ReclassTable) -> NormalizedLayer {
    NormalizedLayer {
        name: name.into(),
        polarity: Polarity::Direct,
        raster: layer.map(|code| table.lookup(code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn degenerate_bounds_are_a_calibration_error() {
        assert!(matches!(Calibration::new(5.0, 5.0), Err(ScoringError::Calibration(_))));
        assert!(matches!(Calibration::new(5.0, 1.0), Err(ScoringError::Calibration(_))));
        assert!(matches!(Calibration::new(f32::NAN, 1.0), Err(ScoringError::Calibration(_))));
    }

    #[test]
    fn values_in_range_land_in_unit_interval_and_outside_are_clamped() {
        let cal = Calibration::new(0.0, 1000.0).unwrap();
        for v in [0.0f32, 1.0, 250.0, 999.0, 1000.0] {
            let t = cal.normalize_value(v, Polarity::Direct);
            assert!((0.0..=1.0).contains(&t));
        }
        assert_eq!(cal.normalize_value(-50.0, Polarity::Direct), 0.0);
        assert_eq!(cal.normalize_value(4000.0, Polarity::Direct), 1.0);
        assert_eq!(cal.normalize_value(4000.0, Polarity::Inverted), 0.0);
    }

    #[test]
    fn inverted_is_one_minus_direct() {
        let cal = Calibration::new(500.0, 3000.0).unwrap();
        for v in [-10.0f32, 500.0, 812.5, 1750.0, 2999.0, 3500.0] {
            let d = cal.normalize_value(v, Polarity::Direct);
            let i = cal.normalize_value(v, Polarity::Inverted);
            assert_abs_diff_eq!(i, 1.0 - d, epsilon = 1e-6);
        }
    }

    #[test]
    fn nodata_passes_through() {
        let cal = Calibration::new(0.0, 1.0).unwrap();
        assert!(cal.normalize_value(f32::NAN, Polarity::Inverted).is_nan());
    }

    #[test]
    fn from_extent_fails_on_constant_layer() {
        let r = Raster::new(3, 3, 0.0, 1.0, 0.0, 1.0, 7.0);
        assert!(matches!(Calibration::from_extent(&r), Err(ScoringError::Calibration(_))));
    }

    #[test]
    fn calibration_deserialize_validates() {
        assert!(serde_json::from_str::<Calibration>(r#"{"min":0,"max":30}"#).is_ok());
        assert!(serde_json::from_str::<Calibration>(r#"{"min":30,"max":30}"#).is_err());
    }

    #[test]
    fn worldcover_reclass_masks_unknown_codes() {
        let table = ReclassTable::worldcover_flood();
        assert_abs_diff_eq!(table.lookup(80.0), 0.1);
        assert_abs_diff_eq!(table.lookup(50.0), 0.9);
        assert!(table.lookup(0.0).is_nan());
        assert!(table.lookup(42.0).is_nan());
        assert!(table.lookup(f32::NAN).is_nan());
        assert_eq!(table.entries.len(), 11);
    }

    #[test]
    fn log1p_masks_negative_flow() {
        let mut r = Raster::new(2, 1, 0.0, 1.0, 0.0, 1.0, 0.0);
        r.set(0, 1, -3.0);
        let l = log1p_layer(&r);
        assert_eq!(l.get(0, 0), 0.0);
        assert!(l.get(0, 1).is_nan());
    }
}
