//! Land surface temperature from Landsat 8/9 Collection 2 Level 2 scenes.
//!
//! Single-channel retrieval with NDVI-derived emissivity:
//!
//!   PV  = ((ndvi − ndvi_min) / (ndvi_max − ndvi_min))²
//!   ε   = 0.004·PV + 0.986
//!   LST = BT / (1 + (λ·BT / ρ)·ln ε) − 273.15

use tracing::debug;

use crate::classify::ClassScheme;
use crate::composite::{normalized_difference, reduce, Reducer};
use crate::error::{Result, ScoringError};
use crate::model::HazardSurface;
use crate::normalize::Calibration;
use crate::params::HeatParams;
use crate::raster::Raster;
use crate::region::Region;

const KELVIN_OFFSET: f64 = 273.15;

/// Digital numbers of the bands the retrieval needs.
#[derive(Debug, Clone)]
pub struct LandsatScene {
    /// SR_B4.
    pub red: Raster,
    /// SR_B5.
    pub nir: Raster,
    /// ST_B10.
    pub thermal: Raster,
}

#[derive(Debug, Clone)]
pub struct HeatInputs {
    pub scenes: Vec<LandsatScene>,
}

/// Median composite of one band after Collection 2 scaling.
fn composite(
    scenes: &[LandsatScene],
    band: fn(&LandsatScene) -> &Raster,
    scale: f32,
    offset: f32,
) -> Result<Raster> {
    let scaled: Vec<Raster> = scenes.iter().map(|s| band(s).map(|v| v * scale + offset)).collect();
    reduce(&scaled, Reducer::Median)
}

/// Brightness temperature (K) and emissivity → LST (°C).
pub fn retrieve_lst(bt: f64, emissivity: f64, params: &HeatParams) -> f64 {
    bt / (1.0 + (params.wavelength_m * bt / params.rho) * emissivity.ln()) - KELVIN_OFFSET
}

/// Per-pixel retrieved LST in °C. The calibration offset is not applied
/// here; see [`heat_surface`].
///
/// NDVI extremes for the vegetation proportion come from the pixels inside
/// `region`.
pub fn lst_celsius(inputs: &HeatInputs, params: &HeatParams, region: &Region) -> Result<Raster> {
    if inputs.scenes.is_empty() {
        return Err(ScoringError::configuration("no Landsat scenes"));
    }
    let red = composite(&inputs.scenes, |s| &s.red, params.optical_scale, params.optical_offset)?;
    let nir = composite(&inputs.scenes, |s| &s.nir, params.optical_scale, params.optical_offset)?;
    let bt = composite(&inputs.scenes, |s| &s.thermal, params.thermal_scale, params.thermal_offset)?;

    let ndvi = normalized_difference(&nir, &red)?;
    let ndvi_range = Calibration::from_extent(&region.clip(&ndvi))
        .map_err(|e| ScoringError::calibration(format!("NDVI range over {}: {e}", region.name)))?;
    debug!(min = ndvi_range.min(), max = ndvi_range.max(), "NDVI extremes");

    let emissivity = ndvi.map(|v| {
        let pv = ndvi_range.unit_scale(v);
        (params.emissivity_slope * f64::from(pv * pv) + params.emissivity_base) as f32
    });
    bt.zip_map(&emissivity, |t, e| {
        if t.is_nan() || e.is_nan() {
            return f32::NAN;
        }
        retrieve_lst(f64::from(t), f64::from(e), params) as f32
    })
}

/// Classes come from the retrieved LST. `offset_c` only shifts the
/// temperature shown in reports.
pub fn heat_surface(lst: Raster, params: &HeatParams) -> HazardSurface {
    HazardSurface::new(lst, ClassScheme::heat()).with_report_offset(params.offset_c)
}
