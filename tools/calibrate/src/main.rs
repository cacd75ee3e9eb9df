/// Calibration tool: reads exported hazard layers (GeoTIFF or Raster JSON)
/// listed in a manifest, runs the flood, drought and heat pipelines and
/// writes the precomputed risk model bundle the bot serves from.
///
/// All GeoTIFF layers of one manifest must share the grid given by its
/// `grid` bounds (the export step reprojects them to a common scale).
/// Raster JSON layers carry their own bounds.
use std::fs;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use landalert_core::composite::mean_annual_total;
use landalert_core::params::ScoringParams;
use landalert_core::pipelines::{
    build_model, DroughtInputs, FloodInputs, HeatInputs, LandsatScene, ModelInputs, MonthScenes,
};
use landalert_core::{Raster, Region};
use serde::Deserialize;
use tiff::decoder::{Decoder, DecodingResult};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "calibrate",
    about = "Build the flood/drought/heat risk model bundle from exported layers"
)]
struct Args {
    /// Layer manifest (JSON)
    #[arg(long, default_value = "data/layers/manifest.json")]
    manifest: PathBuf,

    /// Scoring parameters (JSON); built-in defaults when omitted
    #[arg(long)]
    params: Option<PathBuf>,

    /// Output bundle path
    #[arg(short, long, default_value = "data/risk_model.json")]
    output: PathBuf,
}

// ── Manifest schema ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
struct GridBounds {
    min_lon: f64,
    max_lon: f64,
    min_lat: f64,
    max_lat: f64,
}

#[derive(Debug, Deserialize)]
struct RegionSource {
    name: String,
    geojson: PathBuf,
}

/// Either one precomputed layer or per-year stacks of monthly scenes.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
enum RainfallSource {
    Layer(PathBuf),
    Years(Vec<Vec<PathBuf>>),
}

#[derive(Debug, Deserialize)]
struct FloodManifest {
    dem: PathBuf,
    #[serde(default)]
    slope: Option<PathBuf>,
    rainfall: RainfallSource,
    flow_accumulation: PathBuf,
    ndvi: PathBuf,
    land_cover: PathBuf,
    soil_moisture: PathBuf,
    #[serde(default)]
    river_distance: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct MonthManifest {
    ndvi: Vec<PathBuf>,
    lst: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct DroughtManifest {
    months: Vec<MonthManifest>,
    /// Month indices `[start, end)` of the scored period.
    target: [usize; 2],
}

#[derive(Debug, Deserialize)]
struct SceneManifest {
    red: PathBuf,
    nir: PathBuf,
    thermal: PathBuf,
}

#[derive(Debug, Deserialize)]
struct HeatManifest {
    scenes: Vec<SceneManifest>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    /// Area of interest; the built-in Nigeria outline when omitted.
    #[serde(default)]
    region: Option<RegionSource>,
    #[serde(default)]
    grid: Option<GridBounds>,
    /// Sentinel value of the GeoTIFF exports.
    #[serde(default = "default_nodata")]
    nodata: f64,
    flood: FloodManifest,
    drought: DroughtManifest,
    heat: HeatManifest,
}

fn default_nodata() -> f64 {
    -9999.0
}

// ── GeoTIFF decoding ─────────────────────────────────────────────────────────

/// Decoded samples as f32, with `nodata` (and NaN) mapped to NaN.
fn samples_to_f32(img: DecodingResult, nodata: f64) -> Result<Vec<f32>> {
    fn conv<T: Copy + Into<f64>>(v: Vec<T>, nodata: f64) -> Vec<f32> {
        v.into_iter()
            .map(|x| {
                let x: f64 = x.into();
                if x == nodata || x.is_nan() {
                    f32::NAN
                } else {
                    x as f32
                }
            })
            .collect()
    }
    Ok(match img {
        DecodingResult::F32(v) => conv(v, nodata),
        DecodingResult::F64(v) => conv(v, nodata),
        DecodingResult::U8(v) => conv(v, nodata),
        DecodingResult::U16(v) => conv(v, nodata),
        DecodingResult::I16(v) => conv(v, nodata),
        DecodingResult::U32(v) => conv(v, nodata),
        DecodingResult::I32(v) => conv(v, nodata),
        _ => bail!("unsupported GeoTIFF sample type"),
    })
}

/// TIFF storage order is N→S; Raster rows run S→N.
fn flip_rows(data: &[f32], width: usize) -> Vec<f32> {
    data.chunks(width).rev().flatten().copied().collect()
}

fn decode_tiff<R: Read + Seek>(reader: R, grid: GridBounds, nodata: f64) -> Result<Raster> {
    let mut decoder = Decoder::new(reader).context("not a valid TIFF")?;
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);
    if width == 0 || height == 0 {
        bail!("zero-sized TIFF");
    }
    let data = samples_to_f32(decoder.read_image()?, nodata)?;
    if data.len() != width * height {
        bail!(
            "expected a single-band {width}×{height} image, got {} samples",
            data.len()
        );
    }
    Ok(Raster {
        data: flip_rows(&data, width),
        width,
        height,
        min_lon: grid.min_lon,
        max_lon: grid.max_lon,
        min_lat: grid.min_lat,
        max_lat: grid.max_lat,
    })
}

// ── Layer loading ────────────────────────────────────────────────────────────

struct Loader {
    base: PathBuf,
    grid: Option<GridBounds>,
    nodata: f64,
}

impl Loader {
    fn load(&self, path: &Path) -> Result<Raster> {
        let path = self.base.join(path);
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let raster = match ext.as_str() {
            "json" => {
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("Cannot read {}", path.display()))?;
                serde_json::from_str::<Raster>(&text)
                    .with_context(|| format!("Invalid raster JSON: {}", path.display()))?
            }
            "tif" | "tiff" => {
                let Some(grid) = self.grid else {
                    bail!("{}: GeoTIFF layers need `grid` bounds in the manifest", path.display());
                };
                let file = fs::File::open(&path)
                    .with_context(|| format!("Cannot open {}", path.display()))?;
                decode_tiff(BufReader::new(file), grid, self.nodata)
                    .with_context(|| format!("Decode failed: {}", path.display()))?
            }
            _ => bail!("{}: unsupported layer format", path.display()),
        };
        raster
            .validate()
            .with_context(|| format!("Invalid layer: {}", path.display()))?;
        debug!(
            path = %path.display(),
            width = raster.width,
            height = raster.height,
            valid = raster.valid_count(),
            "layer loaded"
        );
        Ok(raster)
    }

    fn load_opt(&self, path: &Option<PathBuf>) -> Result<Option<Raster>> {
        path.as_deref().map(|p| self.load(p)).transpose()
    }

    fn load_all(&self, paths: &[PathBuf]) -> Result<Vec<Raster>> {
        paths.iter().map(|p| self.load(p)).collect()
    }

    fn rainfall(&self, source: &RainfallSource) -> Result<Raster> {
        match source {
            RainfallSource::Layer(p) => self.load(p),
            RainfallSource::Years(years) => {
                let stacks = years
                    .iter()
                    .map(|months| self.load_all(months))
                    .collect::<Result<Vec<_>>>()?;
                info!(years = stacks.len(), "composing mean annual rainfall");
                Ok(mean_annual_total(&stacks)?)
            }
        }
    }

    fn inputs(&self, manifest: &Manifest, region: Region) -> Result<ModelInputs> {
        let f = &manifest.flood;
        let flood = FloodInputs {
            dem: self.load(&f.dem)?,
            slope: self.load_opt(&f.slope)?,
            rainfall: self.rainfall(&f.rainfall)?,
            flow_accumulation: self.load(&f.flow_accumulation)?,
            ndvi: self.load(&f.ndvi)?,
            land_cover: self.load(&f.land_cover)?,
            soil_moisture: self.load(&f.soil_moisture)?,
            river_distance: self.load_opt(&f.river_distance)?,
        };

        let d = &manifest.drought;
        let months = d
            .months
            .iter()
            .map(|m| {
                Ok(MonthScenes {
                    ndvi: self.load_all(&m.ndvi)?,
                    lst: self.load_all(&m.lst)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let drought = DroughtInputs {
            months,
            target: d.target[0]..d.target[1],
        };

        let scenes = manifest
            .heat
            .scenes
            .iter()
            .map(|s| {
                Ok(LandsatScene {
                    red: self.load(&s.red)?,
                    nir: self.load(&s.nir)?,
                    thermal: self.load(&s.thermal)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ModelInputs {
            region,
            flood,
            drought,
            heat: HeatInputs { scenes },
        })
    }
}

fn load_region(manifest: &Manifest, base: &Path) -> Result<Region> {
    match &manifest.region {
        Some(src) => {
            let path = base.join(&src.geojson);
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Cannot read {}", path.display()))?;
            Ok(Region::from_geojson(src.name.clone(), &text)
                .with_context(|| format!("Invalid region GeoJSON: {}", path.display()))?)
        }
        None => Ok(Region::nigeria()),
    }
}

// ── Entry point ──────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,landalert_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let params = match &args.params {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Cannot read {}", path.display()))?;
            ScoringParams::from_json_str(&text)
                .with_context(|| format!("Invalid params: {}", path.display()))?
        }
        None => ScoringParams::default(),
    };

    let text = fs::read_to_string(&args.manifest)
        .with_context(|| format!("Cannot read {}", args.manifest.display()))?;
    let manifest: Manifest = serde_json::from_str(&text)
        .with_context(|| format!("Invalid manifest: {}", args.manifest.display()))?;
    let base = args
        .manifest
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let region = load_region(&manifest, &base)?;
    info!(region = %region.name, bbox = ?region.bbox(), "region loaded");

    let loader = Loader {
        base,
        grid: manifest.grid,
        nodata: manifest.nodata,
    };
    let inputs = loader.inputs(&manifest, region)?;
    let model = build_model(&inputs, &params).context("Model build failed")?;

    if let Some(dir) = args.output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    }
    fs::write(&args.output, model.to_json_string()?)
        .with_context(|| format!("Write failed: {}", args.output.display()))?;

    info!(
        output = %args.output.display(),
        flood_breakpoints = ?model.flood_breakpoints().values(),
        "risk model written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tiff::encoder::{colortype, TiffEncoder};

    use super::*;

    const GRID: GridBounds = GridBounds {
        min_lon: 3.0,
        max_lon: 3.3,
        min_lat: 6.0,
        max_lat: 6.2,
    };

    #[test]
    fn flip_rows_reverses_row_order() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(flip_rows(&data, 3), vec![4.0, 5.0, 6.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn nodata_and_nan_become_nan() {
        let v = samples_to_f32(DecodingResult::I16(vec![-9999, 0, 42]), -9999.0).unwrap();
        assert!(v[0].is_nan());
        assert_eq!(&v[1..], &[0.0, 42.0]);

        let v = samples_to_f32(DecodingResult::F32(vec![f32::NAN, 1.5]), -9999.0).unwrap();
        assert!(v[0].is_nan());
        assert_eq!(v[1], 1.5);

        let v = samples_to_f32(DecodingResult::U8(vec![0, 80]), 0.0).unwrap();
        assert!(v[0].is_nan());
        assert_eq!(v[1], 80.0);
    }

    #[test]
    fn geotiff_rows_land_south_first() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut enc = TiffEncoder::new(&mut buf).unwrap();
            // North row first, as exported.
            let data = [10.0f32, 11.0, 12.0, -9999.0, 21.0, 22.0];
            enc.write_image::<colortype::Gray32Float>(3, 2, &data).unwrap();
        }
        buf.set_position(0);
        let r = decode_tiff(buf, GRID, -9999.0).unwrap();
        assert_eq!((r.width, r.height), (3, 2));
        assert!(r.get(0, 0).is_nan());
        assert_eq!(r.get(0, 2), 22.0);
        assert_eq!(r.get(1, 0), 10.0);
        assert_eq!(r.min_lat, 6.0);
        assert_eq!(r.max_lon, 3.3);
    }

    #[test]
    fn manifest_accepts_both_rainfall_forms() {
        let json = r#"{
            "grid": { "min_lon": 2.6, "max_lon": 14.7, "min_lat": 4.2, "max_lat": 13.9 },
            "flood": {
                "dem": "dem.tif",
                "rainfall": [["2020_01.tif", "2020_02.tif"], ["2021_01.tif"]],
                "flow_accumulation": "flow.tif",
                "ndvi": "ndvi.tif",
                "land_cover": "lulc.tif",
                "soil_moisture": "soil.tif"
            },
            "drought": { "months": [{ "ndvi": ["n1.tif"], "lst": ["l1.tif"] }], "target": [0, 1] },
            "heat": { "scenes": [{ "red": "b4.tif", "nir": "b5.tif", "thermal": "b10.tif" }] }
        }"#;
        let m: Manifest = serde_json::from_str(json).unwrap();
        assert_eq!(m.nodata, -9999.0);
        assert!(m.region.is_none());
        assert!(m.flood.slope.is_none());
        assert!(matches!(&m.flood.rainfall, RainfallSource::Years(y) if y.len() == 2));

        let single: RainfallSource = serde_json::from_str(r#""rain.tif""#).unwrap();
        assert_eq!(single, RainfallSource::Layer(PathBuf::from("rain.tif")));
    }

    #[test]
    fn tiff_layers_require_grid_bounds() {
        let loader = Loader {
            base: PathBuf::new(),
            grid: None,
            nodata: -9999.0,
        };
        let err = loader.load(Path::new("missing.tif")).unwrap_err();
        assert!(err.to_string().contains("grid"));
    }

    #[test]
    fn short_json_layer_is_an_error() {
        let base = std::env::temp_dir().join(format!("landalert-calibrate-{}", std::process::id()));
        fs::create_dir_all(&base).unwrap();
        fs::write(
            base.join("short.json"),
            r#"{"data":[1,2,3,4],"width":3,"height":3,"min_lon":0,"max_lon":3,"min_lat":0,"max_lat":3}"#,
        )
        .unwrap();
        let loader = Loader {
            base: base.clone(),
            grid: None,
            nodata: -9999.0,
        };
        let err = loader.load(Path::new("short.json")).unwrap_err();
        assert!(format!("{err:#}").contains("carries 4 values"), "{err:#}");
        fs::remove_dir_all(&base).unwrap();
    }
}
