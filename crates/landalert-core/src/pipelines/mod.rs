//! The three hazard pipelines and the bundle builder that runs them.

pub mod drought;
pub mod flood;
pub mod heat;

use tracing::info;

use crate::error::Result;
use crate::model::RiskModel;
use crate::params::ScoringParams;
use crate::region::Region;

pub use drought::{drought_surface, vhi_index, DroughtInputs, MonthScenes};
pub use flood::{flood_index, flood_layers, flood_surface, FloodInputs};
pub use heat::{heat_surface, lst_celsius, HeatInputs, LandsatScene};

/// Everything needed to compile a [`RiskModel`].
#[derive(Debug, Clone)]
pub struct ModelInputs {
    pub region: Region,
    pub flood: FloodInputs,
    pub drought: DroughtInputs,
    pub heat: HeatInputs,
}

/// Run all three pipelines, clip each index to the region and classify.
///
/// Flood breakpoints are the percentiles of the clipped index, so they are
/// computed once over the whole region here and stored in the bundle.
pub fn build_model(inputs: &ModelInputs, params: &ScoringParams) -> Result<RiskModel> {
    params.validate()?;
    let region = &inputs.region;

    let fsi = region.clip(&flood_index(&inputs.flood, &params.flood)?);
    let flood = flood_surface(fsi)?;
    info!(
        breakpoints = ?flood.scheme.breakpoints.values(),
        histogram = ?flood.classes.histogram(),
        "flood surface"
    );

    let vhi = region.clip(&vhi_index(&inputs.drought, &params.drought)?);
    let drought = drought_surface(vhi);
    info!(histogram = ?drought.classes.histogram(), "drought surface");

    let lst = region.clip(&lst_celsius(&inputs.heat, &params.heat, region)?);
    let heat = heat_surface(lst, &params.heat);
    info!(histogram = ?heat.classes.histogram(), "heat surface");

    RiskModel::new(region.clone(), flood, drought, heat, params.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::QueryPoint;
    use crate::model::Hazard;
    use crate::raster::Raster;

    fn grid(f: impl Fn(usize, usize) -> f32) -> Raster {
        let mut r = Raster::new(20, 20, 7.0, 7.2, 9.0, 9.2, 0.0);
        for row in 0..20 {
            for col in 0..20 {
                r.set(row, col, f(row, col));
            }
        }
        r
    }

    fn inputs() -> ModelInputs {
        let t = |c: usize| c as f32 / 19.0;
        let flood = FloodInputs {
            dem: grid(|_, c| 600.0 - 400.0 * t(c)),
            slope: None,
            rainfall: grid(|_, c| 1000.0 + 800.0 * t(c)),
            flow_accumulation: grid(|r, c| if c == 15 { 5000.0 } else { (r + c) as f32 }),
            ndvi: grid(|_, c| 0.7 - 0.4 * t(c)),
            land_cover: grid(|_, _| 40.0),
            soil_moisture: grid(|_, c| 0.1 + 0.3 * t(c)),
            river_distance: None,
        };
        let scene = |kelvin: f32| LandsatScene {
            red: grid(|_, c| (0.05 + 0.2 * t(c) + 0.2) / 0.0000275),
            nir: grid(|_, _| (0.4 + 0.2) / 0.0000275),
            thermal: grid(|_, _| (kelvin - 149.0) / 0.00341802),
        };
        let month = |ndvi: f32, lst: f32| MonthScenes {
            ndvi: vec![grid(|_, _| ndvi)],
            lst: vec![grid(|_, _| lst)],
        };
        ModelInputs {
            // Covers only the western half of the grid.
            region: Region::new("west", vec![vec![[6.9, 8.9], [7.1, 8.9], [7.1, 9.3], [6.9, 9.3]]]).unwrap(),
            flood,
            drought: DroughtInputs {
                months: vec![month(3000.0, 15500.0), month(7000.0, 14800.0), month(3200.0, 15400.0)],
                target: 2..3,
            },
            heat: HeatInputs {
                scenes: vec![scene(305.0), scene(306.0), scene(307.0)],
            },
        }
    }

    #[test]
    fn builds_a_bundle_clipped_to_the_region() {
        let model = build_model(&inputs(), &ScoringParams::default()).unwrap();
        // East half is outside the region polygon and masked by the clip.
        assert!(model.flood.index.get(10, 15).is_nan());
        assert_eq!(model.flood.classes.get(10, 15), None);

        let inside = QueryPoint::new(9.1, 7.05).unwrap();
        for hazard in Hazard::ALL {
            assert!(model.evaluate(hazard, inside).is_some(), "{hazard}");
        }
        let outside = QueryPoint::new(9.1, 7.15).unwrap();
        assert!(model.evaluate(Hazard::Flood, outside).is_none());

        let drought = model.evaluate(Hazard::Drought, inside).unwrap();
        // VCI = 0.05, TCI ≈ 0.14 → VHI < 0.1.
        assert_eq!(drought.label, "Extreme Drought");
        let heat = model.evaluate(Hazard::Heat, inside).unwrap();
        assert!(heat.index_value > 23.0 && heat.index_value < 48.0);
    }

    #[test]
    fn invalid_params_stop_the_build() {
        let mut params = ScoringParams::default();
        params.sampling.scale_m = -1.0;
        assert!(build_model(&inputs(), &params).is_err());
    }
}
