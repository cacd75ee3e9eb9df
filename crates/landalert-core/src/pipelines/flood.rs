//! Flood susceptibility index from eight geophysical layers.

use tracing::debug;

use crate::aggregate::aggregate;
use crate::classify::{ClassBreakpoints, ClassScheme};
use crate::error::Result;
use crate::model::HazardSurface;
use crate::normalize::{log1p_layer, normalize, reclassify, Calibration, NormalizedLayer, Polarity};
use crate::params::FloodParams;
use crate::raster::Raster;
use crate::terrain::{distance_to_river, river_mask, slope_degrees};

/// Raw flood inputs on one shared grid.
///
/// `slope` and `river_distance` are derived from `dem` and
/// `flow_accumulation` when not supplied.
#[derive(Debug, Clone)]
pub struct FloodInputs {
    /// Elevation in metres.
    pub dem: Raster,
    /// Slope in degrees.
    pub slope: Option<Raster>,
    /// Mean annual rainfall in mm/yr.
    pub rainfall: Raster,
    /// Upstream cell count.
    pub flow_accumulation: Raster,
    pub ndvi: Raster,
    /// ESA WorldCover class codes.
    pub land_cover: Raster,
    /// Volumetric soil moisture.
    pub soil_moisture: Raster,
    /// Metres to the nearest river cell.
    pub river_distance: Option<Raster>,
}

/// The eight normalized layers, named after the AHP weight keys.
pub fn flood_layers(inputs: &FloodInputs, params: &FloodParams) -> Result<Vec<NormalizedLayer>> {
    let slope = match &inputs.slope {
        Some(s) => s.clone(),
        None => {
            debug!("deriving slope from DEM");
            slope_degrees(&inputs.dem)
        }
    };
    let river_distance = match &inputs.river_distance {
        Some(d) => d.clone(),
        None => {
            debug!(threshold = params.river_threshold, "deriving river distance from flow accumulation");
            let rivers = river_mask(&inputs.flow_accumulation, params.river_threshold);
            distance_to_river(&inputs.flow_accumulation, &rivers)
        }
    };
    let log_flow = log1p_layer(&inputs.flow_accumulation);
    let flow_cal = Calibration::from_fixed_min(0.0, &log_flow)?;

    Ok(vec![
        normalize("dem_inv", &inputs.dem, params.dem, Polarity::Inverted),
        normalize("slope_inv", &slope, params.slope, Polarity::Inverted),
        normalize("rain_norm", &inputs.rainfall, params.rainfall, Polarity::Direct),
        normalize("flow_norm", &log_flow, flow_cal, Polarity::Direct),
        normalize("ndvi_inv", &inputs.ndvi, params.ndvi, Polarity::Inverted),
        reclassify("lulc", &inputs.land_cover, &params.land_cover),
        normalize("soil_norm", &inputs.soil_moisture, params.soil_moisture, Polarity::Direct),
        normalize("river_dist_inv", &river_distance, params.river_distance, Polarity::Inverted),
    ])
}

/// Weighted flood susceptibility index (FSI).
pub fn flood_index(inputs: &FloodInputs, params: &FloodParams) -> Result<Raster> {
    let layers = flood_layers(inputs, params)?;
    aggregate(&layers, &params.weights)
}

/// Classify `index` at its own p20/p40/p60/p80.
///
/// `index` should already be clipped to the region so the percentiles are
/// regional.
pub fn flood_surface(index: Raster) -> Result<HazardSurface> {
    let breakpoints = ClassBreakpoints::from_percentiles(&index)?;
    debug!(breakpoints = ?breakpoints.values(), "flood breakpoints");
    Ok(HazardSurface::new(index, ClassScheme::flood(breakpoints)))
}
