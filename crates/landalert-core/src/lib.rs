//! Land risk scoring for point queries over Nigeria.
//!
//! Pipeline (per hazard):
//!   raw layers → normalize → aggregate → classify → (precomputed `RiskModel`)
//!   → sample at a query point → describe.
//!
//! Flood uses AHP-weighted layers and percentile breakpoints; drought (VHI)
//! and heat (LST) reuse the same stages with fixed absolute thresholds.

pub mod aggregate;
pub mod classify;
pub mod composite;
pub mod coords;
pub mod error;
pub mod model;
pub mod normalize;
pub mod params;
pub mod pipelines;
pub mod raster;
pub mod region;
pub mod report;
pub mod sample;
pub mod terrain;

pub use classify::{flood_label, ClassBreakpoints, ClassLayer, ClassScheme, RiskClass};
pub use coords::QueryPoint;
pub use error::{Result, ScoringError};
pub use model::{Hazard, HazardSurface, RiskModel};
pub use normalize::{Calibration, NormalizedLayer, Polarity};
pub use raster::Raster;
pub use region::Region;
pub use report::RiskReport;
pub use sample::SampledResult;
