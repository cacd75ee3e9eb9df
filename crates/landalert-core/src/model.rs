//! The compiled risk bundle: three classified national surfaces plus the
//! region, built once offline and loaded read-only at service startup.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::{ClassBreakpoints, ClassLayer, ClassScheme};
use crate::coords::QueryPoint;
use crate::error::{Result, ScoringError};
use crate::params::ScoringParams;
use crate::raster::Raster;
use crate::region::Region;
use crate::report::{describe, RiskReport};
use crate::sample::{PointSampler, SampledResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hazard {
    Flood,
    Drought,
    Heat,
}

impl Hazard {
    pub const ALL: [Hazard; 3] = [Hazard::Flood, Hazard::Drought, Hazard::Heat];

    pub fn as_str(self) -> &'static str {
        match self {
            Hazard::Flood => "flood",
            Hazard::Drought => "drought",
            Hazard::Heat => "heat",
        }
    }
}

impl fmt::Display for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Continuous index, its classes and the scheme that produced them, on one grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HazardSurface {
    pub index: Raster,
    pub classes: ClassLayer,
    pub scheme: ClassScheme,
    /// Added to the sampled index value in reports only; classes are
    /// computed on the unshifted index.
    #[serde(default)]
    pub report_offset: f32,
}

impl HazardSurface {
    pub fn new(index: Raster, scheme: ClassScheme) -> Self {
        let classes = scheme.classify(&index);
        Self {
            index,
            classes,
            scheme,
            report_offset: 0.0,
        }
    }

    pub fn with_report_offset(mut self, offset: f32) -> Self {
        self.report_offset = offset;
        self
    }

    pub fn report(&self, hazard: Hazard, hit: &SampledResult) -> RiskReport {
        let mut report = describe(hazard, hit, &self.scheme);
        report.index_value += self.report_offset;
        report
    }

    fn validate(&self, hazard: Hazard) -> Result<()> {
        let ok = self.classes.width == self.index.width
            && self.classes.height == self.index.height
            && self.classes.data.len() == self.index.len()
            && self.index.data.len() == self.index.width * self.index.height;
        if ok {
            Ok(())
        } else {
            Err(ScoringError::configuration(format!(
                "{hazard} surface: class layer does not match its index grid"
            )))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub created_at: DateTime<Utc>,
    pub params: ScoringParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskModel {
    pub region: Region,
    pub flood: HazardSurface,
    pub drought: HazardSurface,
    pub heat: HazardSurface,
    pub provenance: Provenance,
    #[serde(skip)]
    sampler: PointSampler,
}

impl RiskModel {
    pub fn new(
        region: Region,
        flood: HazardSurface,
        drought: HazardSurface,
        heat: HazardSurface,
        params: ScoringParams,
    ) -> Result<Self> {
        let sampler = PointSampler::new(params.sampling.scale_m)?;
        let model = Self {
            region,
            flood,
            drought,
            heat,
            provenance: Provenance {
                created_at: Utc::now(),
                params,
            },
            sampler,
        };
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        for hazard in Hazard::ALL {
            self.surface(hazard).validate(hazard)?;
        }
        Ok(())
    }

    pub fn surface(&self, hazard: Hazard) -> &HazardSurface {
        match hazard {
            Hazard::Flood => &self.flood,
            Hazard::Drought => &self.drought,
            Hazard::Heat => &self.heat,
        }
    }

    /// The regional p20/p40/p60/p80 the flood surface was classified with.
    pub fn flood_breakpoints(&self) -> ClassBreakpoints {
        self.flood.scheme.breakpoints
    }

    pub fn sampling_scale_m(&self) -> f64 {
        self.sampler.scale_m()
    }

    pub fn sample(&self, hazard: Hazard, point: QueryPoint) -> Option<SampledResult> {
        let s = self.surface(hazard);
        let hit = self.sampler.sample(&s.classes, &s.index, &self.region, point);
        if hit.is_none() {
            debug!(%hazard, lat = point.lat, lon = point.lon, "no data at point");
        }
        hit
    }

    /// Sampled and labelled report, or None for "insufficient data".
    pub fn evaluate(&self, hazard: Hazard, point: QueryPoint) -> Option<RiskReport> {
        let hit = self.sample(hazard, point)?;
        Some(self.surface(hazard).report(hazard, &hit))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut model: Self = serde_json::from_str(json)
            .map_err(|e| ScoringError::configuration(format!("invalid risk model: {e}")))?;
        model.provenance.params.validate()?;
        model.sampler = PointSampler::new(model.provenance.params.sampling.scale_m)?;
        model.validate()?;
        Ok(model)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ScoringError::configuration(format!("cannot serialize risk model: {e}")))
    }
}
