//! Per-pixel reductions over a stack of rasters on one grid.
//!
//! No-data (NaN) values are skipped; a pixel with no valid value in any
//! layer of the stack stays NaN.

use crate::error::{Result, ScoringError};
use crate::raster::Raster;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Median,
    Mean,
    Min,
    Max,
    Sum,
}

impl Reducer {
    fn apply(self, values: &mut [f32]) -> f32 {
        if values.is_empty() {
            return f32::NAN;
        }
        match self {
            Reducer::Median => {
                values.sort_by(f32::total_cmp);
                let n = values.len();
                if n % 2 == 1 {
                    values[n / 2]
                } else {
                    (values[n / 2 - 1] + values[n / 2]) / 2.0
                }
            }
            Reducer::Mean => values.iter().sum::<f32>() / values.len() as f32,
            Reducer::Min => values.iter().copied().fold(f32::INFINITY, f32::min),
            Reducer::Max => values.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            Reducer::Sum => values.iter().sum(),
        }
    }
}

/// Reduce a stack pixel by pixel.
pub fn reduce(stack: &[Raster], reducer: Reducer) -> Result<Raster> {
    let first = stack
        .first()
        .ok_or_else(|| ScoringError::configuration("cannot reduce an empty stack"))?;
    for (i, r) in stack.iter().enumerate().skip(1) {
        first.ensure_same_grid(r, &format!("stack layer {i}"))?;
    }
    let reduce_pixel = |i: usize| {
        let mut values: Vec<f32> = stack.iter().map(|r| r.data[i]).filter(|v| v.is_finite()).collect();
        reducer.apply(&mut values)
    };

    #[cfg(feature = "threading")]
    let data: Vec<f32> = {
        use rayon::prelude::*;
        (0..first.len()).into_par_iter().map(reduce_pixel).collect()
    };
    #[cfg(not(feature = "threading"))]
    let data: Vec<f32> = (0..first.len()).map(reduce_pixel).collect();

    Ok(first.with_data(data))
}

/// Mean annual total from per-year stacks of daily (or monthly) rasters:
/// each year is summed, then the yearly totals are averaged.
pub fn mean_annual_total(years: &[Vec<Raster>]) -> Result<Raster> {
    let totals = years
        .iter()
        .map(|year| reduce(year, Reducer::Sum))
        .collect::<Result<Vec<_>>>()?;
    reduce(&totals, Reducer::Mean)
}

/// `(a − b) / (a + b)`, NaN where the denominator vanishes.
pub fn normalized_difference(a: &Raster, b: &Raster) -> Result<Raster> {
    a.zip_map(b, |x, y| {
        let s = x + y;
        if s.abs() < f32::EPSILON { f32::NAN } else { (x - y) / s }
    })
}
