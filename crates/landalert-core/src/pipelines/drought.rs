//! Vegetation Health Index from MODIS NDVI and daytime LST.
//!
//!   VCI = (ndvi − ndvi_min) / (ndvi_max − ndvi_min)
//!   TCI = (lst_max − lst) / (lst_max − lst_min)
//!   VHI = 0.5·VCI + 0.5·TCI
//!
//! Extremes are per pixel over every scene of the record; a pixel whose
//! NDVI or LST never varies is masked.

use std::ops::Range;

use tracing::debug;

use crate::classify::ClassScheme;
use crate::composite::{reduce, Reducer};
use crate::error::{Result, ScoringError};
use crate::model::HazardSurface;
use crate::params::DroughtParams;
use crate::raster::Raster;

/// Raw MODIS scenes falling in one calendar month.
#[derive(Debug, Clone, Default)]
pub struct MonthScenes {
    /// MOD13A2 NDVI digital numbers.
    pub ndvi: Vec<Raster>,
    /// MOD11A2 LST_Day_1km digital numbers.
    pub lst: Vec<Raster>,
}

#[derive(Debug, Clone)]
pub struct DroughtInputs {
    /// The full monthly record, oldest first.
    pub months: Vec<MonthScenes>,
    /// Months of `months` averaged into the reported VHI.
    pub target: Range<usize>,
}

/// Per-pixel `(v − min) / (max − min)`, NaN where the range is degenerate.
fn condition(v: &Raster, min: &Raster, max: &Raster, inverted: bool) -> Result<Raster> {
    let range = max.zip_map(min, |hi, lo| hi - lo)?;
    let num = if inverted {
        max.zip_map(v, |hi, x| hi - x)?
    } else {
        v.zip_map(min, |x, lo| x - lo)?
    };
    num.zip_map(&range, |n, r| if r > f32::EPSILON { n / r } else { f32::NAN })
}

/// Mean VHI over the target months.
pub fn vhi_index(inputs: &DroughtInputs, params: &DroughtParams) -> Result<Raster> {
    let target = inputs.target.clone();
    if target.is_empty() || target.end > inputs.months.len() {
        return Err(ScoringError::configuration(format!(
            "target months {target:?} outside a record of {} months",
            inputs.months.len()
        )));
    }
    if let Some(i) = inputs.months.iter().position(|m| m.ndvi.is_empty() || m.lst.is_empty()) {
        return Err(ScoringError::configuration(format!("month {i} has no NDVI or LST scenes")));
    }

    let scale = |stack: &[Raster], k: f32| -> Vec<Raster> {
        stack.iter().map(|r| r.map(|v| v * k)).collect()
    };
    let ndvi: Vec<Vec<Raster>> = inputs.months.iter().map(|m| scale(&m.ndvi, params.ndvi_scale)).collect();
    let lst: Vec<Vec<Raster>> = inputs.months.iter().map(|m| scale(&m.lst, params.lst_scale)).collect();

    let all_ndvi: Vec<Raster> = ndvi.iter().flatten().cloned().collect();
    let all_lst: Vec<Raster> = lst.iter().flatten().cloned().collect();
    let (ndvi_min, ndvi_max) = (reduce(&all_ndvi, Reducer::Min)?, reduce(&all_ndvi, Reducer::Max)?);
    let (lst_min, lst_max) = (reduce(&all_lst, Reducer::Min)?, reduce(&all_lst, Reducer::Max)?);

    let w = params.vci_weight;
    let mut monthly = Vec::with_capacity(target.len());
    for m in target {
        let ndvi_med = reduce(&ndvi[m], Reducer::Median)?;
        let lst_med = reduce(&lst[m], Reducer::Median)?;
        let vci = condition(&ndvi_med, &ndvi_min, &ndvi_max, false)?;
        let tci = condition(&lst_med, &lst_min, &lst_max, true)?;
        monthly.push(vci.zip_map(&tci, |v, t| w * v + (1.0 - w) * t)?);
    }
    debug!(months = monthly.len(), "VHI target period");
    // NaN months must mask the pixel, so the mean is taken without skipping.
    let n = monthly.len() as f32;
    let mut sum = monthly[0].clone();
    for month in &monthly[1..] {
        sum = sum.zip_map(month, |a, b| a + b)?;
    }
    Ok(sum.map(|v| v / n))
}

pub fn drought_surface(vhi: Raster) -> HazardSurface {
    HazardSurface::new(vhi, ClassScheme::drought())
}
