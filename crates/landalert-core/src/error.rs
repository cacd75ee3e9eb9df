use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScoringError>;

/// Failures of the scoring pipelines.
///
/// `Calibration` and `Configuration` are build-time faults and must stop
/// model construction. `NoData` and `Validation` are query-time outcomes the
/// caller turns into user guidance.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoringError {
    /// Malformed normalization bounds, weights or breakpoints.
    #[error("calibration error: {0}")]
    Calibration(String),

    /// Weight vector and layer stack disagree, or grids do not line up.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Point outside the region of interest or on a masked pixel.
    #[error("no data at ({lat:.4}, {lon:.4})")]
    NoData { lat: f64, lon: f64 },

    /// Coordinate outside the valid latitude/longitude range.
    #[error("invalid coordinate: {0}")]
    Validation(String),
}

impl ScoringError {
    pub(crate) fn calibration(msg: impl Into<String>) -> Self {
        Self::Calibration(msg.into())
    }

    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
