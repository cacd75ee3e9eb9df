//! Weighted linear aggregation of normalized layers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoringError};
use crate::normalize::NormalizedLayer;
use crate::raster::Raster;

/// Tolerance on Σw = 1.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-4;

/// Layer name → non-negative weight, summing to 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightVector {
    weights: BTreeMap<String, f64>,
}

impl WeightVector {
    pub fn new<I, S>(weights: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (name, w) in weights {
            let name = name.into();
            if !w.is_finite() || w < 0.0 {
                return Err(ScoringError::calibration(format!("weight for {name} is {w}")));
            }
            if map.insert(name.clone(), w).is_some() {
                return Err(ScoringError::calibration(format!("duplicate weight for {name}")));
            }
        }
        if map.is_empty() {
            return Err(ScoringError::calibration("empty weight vector"));
        }
        let sum: f64 = map.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ScoringError::calibration(format!("weights sum to {sum}, expected 1")));
        }
        Ok(Self { weights: map })
    }

    /// AHP weights for the eight flood layers (pairwise comparison, derived offline).
    pub fn flood_ahp() -> Self {
        Self {
            weights: [
                ("flow_norm", 0.30999795),
                ("river_dist_inv", 0.20715768),
                ("rain_norm", 0.12015950),
                ("slope_inv", 0.07692779),
                ("dem_inv", 0.15348581),
                ("soil_norm", 0.04972386),
                ("lulc", 0.04972386),
                ("ndvi_inv", 0.03282355),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.weights.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

impl<'de> Deserialize<'de> for WeightVector {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            weights: BTreeMap<String, f64>,
        }
        let raw = Raw::deserialize(d)?;
        WeightVector::new(raw.weights).map_err(serde::de::Error::custom)
    }
}

/// `index = Σ w_i · layer_i`.
///
/// Every weighted name needs exactly one layer and every layer needs a
/// weight; all layers must share one grid. A pixel masked in any input is
/// masked in the output.
pub fn aggregate(layers: &[NormalizedLayer], weights: &WeightVector) -> Result<Raster> {
    for layer in layers {
        if weights.get(&layer.name).is_none() {
            return Err(ScoringError::configuration(format!(
                "layer {} has no weight",
                layer.name
            )));
        }
    }
    let mut ordered = Vec::with_capacity(weights.len());
    for (name, w) in weights.iter() {
        let mut matching = layers.iter().filter(|l| l.name == name);
        let layer = matching
            .next()
            .ok_or_else(|| ScoringError::configuration(format!("no layer for weight {name}")))?;
        if matching.next().is_some() {
            return Err(ScoringError::configuration(format!("duplicate layer {name}")));
        }
        ordered.push((layer, w as f32));
    }

    let (first, _) = ordered[0];
    for (layer, _) in &ordered[1..] {
        first.raster.ensure_same_grid(&layer.raster, &layer.name)?;
    }

    // NaN propagates through the sum.
    let pixel = |i: usize| {
        ordered
            .iter()
            .fold(0.0f32, |acc, (layer, w)| acc + w * layer.raster.data[i])
    };
    let n = first.raster.len();
    #[cfg(feature = "threading")]
    let data: Vec<f32> = {
        use rayon::prelude::*;
        (0..n).into_par_iter().map(pixel).collect()
    };
    #[cfg(not(feature = "threading"))]
    let data: Vec<f32> = (0..n).map(pixel).collect();
    Ok(first.raster.with_data(data))
}
