//! Per-location hazard analysis: three concurrent evaluations, each under a
//! timeout with a single retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use landalert_core::{Hazard, QueryPoint, RiskModel, RiskReport};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Result, ServiceError};

/// Source of per-hazard reports. `Ok(None)` means "insufficient data".
#[async_trait]
pub trait HazardBackend: Send + Sync {
    async fn evaluate(&self, hazard: Hazard, point: QueryPoint) -> Result<Option<RiskReport>>;
}

/// Samples the precomputed [`RiskModel`] on the blocking pool.
#[derive(Clone)]
pub struct LocalBackend {
    model: Arc<RiskModel>,
}

impl LocalBackend {
    pub fn new(model: Arc<RiskModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl HazardBackend for LocalBackend {
    async fn evaluate(&self, hazard: Hazard, point: QueryPoint) -> Result<Option<RiskReport>> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || model.evaluate(hazard, point))
            .await
            .map_err(|e| ServiceError::Backend {
                hazard,
                message: e.to_string(),
            })
    }
}

/// The three reports for one location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationAnalysis {
    pub point: QueryPoint,
    pub flood: Option<RiskReport>,
    pub drought: Option<RiskReport>,
    pub heat: Option<RiskReport>,
}

impl LocationAnalysis {
    pub fn has_any(&self) -> bool {
        self.flood.is_some() || self.drought.is_some() || self.heat.is_some()
    }
}

#[derive(Clone)]
pub struct Analyzer {
    backend: Arc<dyn HazardBackend>,
    timeout: Duration,
}

impl Analyzer {
    pub fn new(backend: Arc<dyn HazardBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Evaluate flood, drought and heat concurrently. Any hazard still
    /// failing after its retry fails the whole analysis.
    pub async fn analyze(&self, point: QueryPoint) -> Result<LocationAnalysis> {
        let (flood, drought, heat) = tokio::join!(
            self.evaluate_with_retry(Hazard::Flood, point),
            self.evaluate_with_retry(Hazard::Drought, point),
            self.evaluate_with_retry(Hazard::Heat, point),
        );
        Ok(LocationAnalysis {
            point,
            flood: flood?,
            drought: drought?,
            heat: heat?,
        })
    }

    async fn evaluate_with_retry(&self, hazard: Hazard, point: QueryPoint) -> Result<Option<RiskReport>> {
        let mut last_err = None;
        for attempt in 1..=2u32 {
            match tokio::time::timeout(self.timeout, self.backend.evaluate(hazard, point)).await {
                Ok(Ok(report)) => {
                    debug!(%hazard, attempt, found = report.is_some(), "hazard evaluated");
                    return Ok(report);
                }
                Ok(Err(e)) => {
                    warn!(%hazard, attempt, error = %e, "hazard evaluation failed");
                    last_err = Some(e);
                }
                Err(_) => {
                    warn!(%hazard, attempt, timeout_secs = self.timeout.as_secs_f32(), "hazard evaluation timed out");
                    last_err = Some(ServiceError::Timeout {
                        hazard,
                        secs: self.timeout.as_secs(),
                    });
                }
            }
        }
        Err(last_err.unwrap_or(ServiceError::Timeout {
            hazard,
            secs: self.timeout.as_secs(),
        }))
    }
}
