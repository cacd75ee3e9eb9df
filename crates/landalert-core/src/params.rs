use serde::{Deserialize, Serialize};

use crate::aggregate::WeightVector;
use crate::error::{Result, ScoringError};
use crate::normalize::{Calibration, ReclassTable};

/// Normalization bounds and weights for the flood susceptibility index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloodParams {
    /// Elevation in metres, inverted.
    pub dem: Calibration,
    /// Slope in degrees, inverted.
    pub slope: Calibration,
    /// Mean annual rainfall in mm/yr, direct.
    pub rainfall: Calibration,
    /// NDVI, inverted.
    pub ndvi: Calibration,
    /// Soil moisture (m³/m³), direct.
    pub soil_moisture: Calibration,
    /// Distance to the nearest river in metres, inverted.
    pub river_distance: Calibration,
    /// Flow accumulation (cells) above which a pixel counts as river.
    pub river_threshold: f32,
    pub land_cover: ReclassTable,
    pub weights: WeightVector,
}

impl Default for FloodParams {
    fn default() -> Self {
        Self {
            dem: Calibration::fixed(0.0, 1000.0),
            slope: Calibration::fixed(0.0, 30.0),
            rainfall: Calibration::fixed(500.0, 3000.0),
            ndvi: Calibration::fixed(0.0, 1.0),
            soil_moisture: Calibration::fixed(-0.06, 0.63),
            river_distance: Calibration::fixed(0.0, 5000.0),
            river_threshold: 1000.0,
            land_cover: ReclassTable::worldcover_flood(),
            weights: WeightVector::flood_ahp(),
        }
    }
}

/// MODIS scaling and VHI blending for the drought pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DroughtParams {
    /// MOD13A2 NDVI digital number → NDVI.
    pub ndvi_scale: f32,
    /// MOD11A2 LST digital number → Kelvin.
    pub lst_scale: f32,
    /// VHI = w·VCI + (1 − w)·TCI.
    pub vci_weight: f32,
}

impl Default for DroughtParams {
    fn default() -> Self {
        Self {
            ndvi_scale: 0.0001,
            lst_scale: 0.02,
            vci_weight: 0.5,
        }
    }
}

/// Landsat 8/9 Collection 2 Level 2 scaling and the single-channel LST
/// retrieval constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatParams {
    pub optical_scale: f32,
    pub optical_offset: f32,
    pub thermal_scale: f32,
    pub thermal_offset: f32,
    /// Effective wavelength of band 10 in metres.
    pub wavelength_m: f64,
    /// h·c/σ in m·K.
    pub rho: f64,
    /// ε = slope·PV + base.
    pub emissivity_slope: f64,
    pub emissivity_base: f64,
    /// Added to the reported LST (°C). Heat classes use the retrieved value.
    pub offset_c: f32,
}

impl Default for HeatParams {
    fn default() -> Self {
        Self {
            optical_scale: 0.0000275,
            optical_offset: -0.2,
            thermal_scale: 0.00341802,
            thermal_offset: 149.0,
            wavelength_m: 10.895e-6,
            rho: 1.438e-2,
            emissivity_slope: 0.004,
            emissivity_base: 0.986,
            offset_c: -4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Edge of the point-sampling grid cell in metres.
    pub scale_m: f64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self { scale_m: 500.0 }
    }
}

/// Every tunable of the three pipelines. Missing JSON fields fall back to
/// the defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringParams {
    pub flood: FloodParams,
    pub drought: DroughtParams,
    pub heat: HeatParams,
    pub sampling: SamplingParams,
}

impl ScoringParams {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(json)
            .map_err(|e| ScoringError::configuration(format!("invalid params: {e}")))?;
        params.validate()?;
        Ok(params)
    }

    /// Checks the fields serde cannot: scalar ranges and the reclass table.
    pub fn validate(&self) -> Result<()> {
        ReclassTable::new(self.flood.land_cover.entries.clone())?;
        if !(self.flood.river_threshold.is_finite() && self.flood.river_threshold >= 0.0) {
            return Err(ScoringError::calibration(format!(
                "river threshold {} must be non-negative",
                self.flood.river_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.drought.vci_weight) {
            return Err(ScoringError::calibration(format!(
                "vci weight {} outside [0, 1]",
                self.drought.vci_weight
            )));
        }
        if self.drought.ndvi_scale <= 0.0 || self.drought.lst_scale <= 0.0 {
            return Err(ScoringError::calibration("MODIS scale factors must be positive"));
        }
        if self.heat.emissivity_base <= 0.0 || self.heat.rho <= 0.0 || self.heat.wavelength_m <= 0.0 {
            return Err(ScoringError::calibration("LST retrieval constants must be positive"));
        }
        if !(self.sampling.scale_m.is_finite() && self.sampling.scale_m > 0.0) {
            return Err(ScoringError::calibration(format!(
                "sampling scale {} must be positive",
                self.sampling.scale_m
            )));
        }
        Ok(())
    }
}
