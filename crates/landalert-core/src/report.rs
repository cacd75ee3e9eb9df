use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classify::{ClassScheme, RiskClass};
use crate::model::Hazard;
use crate::sample::SampledResult;

/// The pointwise answer for one hazard: class, label and index value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub hazard: Hazard,
    pub class: RiskClass,
    pub label: String,
    pub index_value: f32,
}

/// Package a sampled result with the label from `scheme`.
pub fn describe(hazard: Hazard, result: &SampledResult, scheme: &ClassScheme) -> RiskReport {
    RiskReport {
        hazard,
        class: result.class,
        label: scheme.label(result.class).to_string(),
        index_value: result.index_value,
    }
}

impl fmt::Display for RiskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (class {}, index {:.2})",
            self.hazard,
            self.label,
            self.class.get(),
            self.index_value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::QueryPoint;

    fn result(class: u8, v: f32) -> SampledResult {
        SampledResult {
            class: RiskClass::new(class).unwrap(),
            index_value: v,
            point: QueryPoint::new(9.0, 7.5).unwrap(),
        }
    }

    #[test]
    fn one_assembler_for_every_scheme() {
        let heat = describe(Hazard::Heat, &result(3, 35.0), &ClassScheme::heat());
        assert_eq!(heat.label, "High (or Warm)");
        let drought = describe(Hazard::Drought, &result(5, 0.05), &ClassScheme::drought());
        assert_eq!(drought.label, "Extreme Drought");
        let flood_scheme =
            ClassScheme::flood(crate::ClassBreakpoints::new([0.2, 0.3, 0.4, 0.5]).unwrap());
        let flood = describe(Hazard::Flood, &result(4, 0.45), &flood_scheme);
        assert_eq!(flood.label, "Substantial");
        assert_eq!(flood.to_string(), "flood: Substantial (class 4, index 0.45)");
    }
}
