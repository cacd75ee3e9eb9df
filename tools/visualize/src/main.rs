//! Diagnostic renderer: writes class and index PNGs for each hazard surface
//! of a risk model bundle. Not part of the serving path.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use image::{Rgba, RgbaImage};
use landalert_core::{ClassLayer, Hazard, Raster, RiskModel};

#[derive(Parser, Debug)]
#[command(name = "visualize", about = "Render risk model surfaces to PNG")]
struct Args {
    /// Risk model bundle
    #[arg(long, default_value = "data/risk_model.json")]
    model: PathBuf,

    /// Output directory (created if absent)
    #[arg(short, long, default_value = "data/debug")]
    output: PathBuf,
}

// ── Colour helpers ────────────────────────────────────────────────────────────

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Class 1..=5 colours per hazard.
fn palette(hazard: Hazard) -> [[u8; 3]; 5] {
    match hazard {
        // red, orange, yellow, cyan, blue
        Hazard::Flood => [
            [255, 0, 0],
            [255, 165, 0],
            [255, 255, 0],
            [0, 255, 255],
            [0, 0, 255],
        ],
        // green, yellow, orange, red, purple
        Hazard::Drought => [
            [0, 128, 0],
            [255, 255, 0],
            [255, 165, 0],
            [255, 0, 0],
            [128, 0, 128],
        ],
        Hazard::Heat => [
            [0x2c, 0x7b, 0xb6],
            [0xab, 0xd9, 0xe9],
            [0xff, 0xff, 0xbf],
            [0xfd, 0xae, 0x61],
            [0xd7, 0x19, 0x1c],
        ],
    }
}

/// Raster row 0 is the south edge; image row 0 is the top.
fn image_row(height: usize, row: usize) -> u32 {
    (height - 1 - row) as u32
}

fn render_classes(layer: &ClassLayer, hazard: Hazard) -> RgbaImage {
    let colours = palette(hazard);
    let mut img = RgbaImage::new(layer.width as u32, layer.height as u32);
    for row in 0..layer.height {
        for col in 0..layer.width {
            let px = match layer.get(row, col) {
                Some(class) => {
                    let [r, g, b] = colours[usize::from(class.get() - 1)];
                    Rgba([r, g, b, 255])
                }
                None => TRANSPARENT,
            };
            img.put_pixel(col as u32, image_row(layer.height, row), px);
        }
    }
    img
}

/// Continuous index stretched min→max to black→white; no-data transparent.
fn render_index(index: &Raster) -> RgbaImage {
    let lo = index.min_valid().unwrap_or(0.0);
    let span = (index.max_valid().unwrap_or(1.0) - lo).max(f32::EPSILON);
    let mut img = RgbaImage::new(index.width as u32, index.height as u32);
    for row in 0..index.height {
        for col in 0..index.width {
            let v = index.get(row, col);
            let px = if v.is_nan() {
                TRANSPARENT
            } else {
                let c = (((v - lo) / span).clamp(0.0, 1.0) * 255.0) as u8;
                Rgba([c, c, c, 255])
            };
            img.put_pixel(col as u32, image_row(index.height, row), px);
        }
    }
    img
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = Args::parse();

    let json = fs::read_to_string(&args.model)
        .with_context(|| format!("Cannot read {}", args.model.display()))?;
    let model = RiskModel::from_json_str(&json)
        .with_context(|| format!("Invalid risk model {}", args.model.display()))?;
    fs::create_dir_all(&args.output)
        .with_context(|| format!("Cannot create {}", args.output.display()))?;

    for hazard in Hazard::ALL {
        let surface = model.surface(hazard);

        let path = args.output.join(format!("{hazard}_classes.png"));
        render_classes(&surface.classes, hazard)
            .save(&path)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        println!("Wrote {}", path.display());

        let path = args.output.join(format!("{hazard}_index.png"));
        render_index(&surface.index)
            .save(&path)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        println!("Wrote {}", path.display());

        let hist = surface.classes.histogram();
        println!(
            "  {hazard}: {} unclassified, classes 1-5 = {:?}",
            hist[0],
            &hist[1..]
        );
    }

    println!("Done.");
    Ok(())
}
