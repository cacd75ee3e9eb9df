//! Terrain-derived flood inputs: slope from a DEM and distance to the
//! nearest river cell.

use crate::raster::Raster;

/// Horn (1981) weighted 3×3 gradient at interior cell `(r, c)`.
///
/// Returns `(dz_dx, dz_dy)`, dimensionless rise/run. `cx`/`cy` are the
/// cell sizes in metres. Caller must ensure `1 ≤ r ≤ height−2` and
/// `1 ≤ c ≤ width−2`.
///
/// ```text
///   NW  N  NE
///   W   *  E
///   SW  S  SE
/// ```
fn horn_gradient(dem: &Raster, r: usize, c: usize, cx: f64, cy: f64) -> (f64, f64) {
    // Row 0 is south, so "north" is r + 1.
    let nw = dem.get(r + 1, c - 1) as f64;
    let n = dem.get(r + 1, c) as f64;
    let ne = dem.get(r + 1, c + 1) as f64;
    let w = dem.get(r, c - 1) as f64;
    let e = dem.get(r, c + 1) as f64;
    let sw = dem.get(r - 1, c - 1) as f64;
    let s = dem.get(r - 1, c) as f64;
    let se = dem.get(r - 1, c + 1) as f64;

    let dz_dx = ((ne + 2.0 * e + se) - (nw + 2.0 * w + sw)) / (8.0 * cx);
    let dz_dy = ((nw + 2.0 * n + ne) - (sw + 2.0 * s + se)) / (8.0 * cy);
    (dz_dx, dz_dy)
}

/// Slope in degrees at every cell.
///
/// Border cells and cells with a no-data neighbour are NaN.
pub fn slope_degrees(dem: &Raster) -> Raster {
    let mut out = dem.filled_like(f32::NAN);
    if dem.width < 3 || dem.height < 3 {
        return out;
    }
    let (cx, cy) = dem.cellsize_m();
    if cx <= 0.0 || cy <= 0.0 {
        return out;
    }
    for r in 1..dem.height - 1 {
        for c in 1..dem.width - 1 {
            let window_ok = (r - 1..=r + 1)
                .all(|rr| (c - 1..=c + 1).all(|cc| dem.get(rr, cc).is_finite()));
            if !window_ok {
                continue;
            }
            let (dz_dx, dz_dy) = horn_gradient(dem, r, c, cx, cy);
            let slope = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan().to_degrees();
            out.set(r, c, slope as f32);
        }
    }
    out
}

/// River cells: flow accumulation strictly above `threshold` (upstream cells).
pub fn river_mask(flow_accumulation: &Raster, threshold: f32) -> Vec<bool> {
    flow_accumulation
        .data
        .iter()
        .map(|&v| v.is_finite() && v > threshold)
        .collect()
}

/// Euclidean distance in metres from every cell to the nearest river cell.
///
/// Exact squared EDT (Felzenszwalb & Huttenlocher), separable: columns then
/// rows, using the raster's anisotropic cell size. Cells are NaN when there
/// is no river anywhere on the grid; no-data cells of `template` stay NaN.
pub fn distance_to_river(template: &Raster, rivers: &[bool]) -> Raster {
    let (w, h) = (template.width, template.height);
    debug_assert_eq!(rivers.len(), w * h);
    let mut out = template.filled_like(f32::NAN);
    if !rivers.iter().any(|&b| b) {
        return out;
    }
    let (cx, cy) = template.cellsize_m();

    // Pass 1: along each column (y), in metres².
    let mut g = vec![f64::INFINITY; w * h];
    let mut col_in = vec![0.0f64; h];
    let mut col_out = vec![0.0f64; h];
    for c in 0..w {
        for r in 0..h {
            col_in[r] = if rivers[r * w + c] { 0.0 } else { f64::INFINITY };
        }
        edt_1d(&col_in, cy, &mut col_out);
        for r in 0..h {
            g[r * w + c] = col_out[r];
        }
    }

    // Pass 2: along each row (x).
    let mut row_out = vec![0.0f64; w];
    for r in 0..h {
        edt_1d(&g[r * w..(r + 1) * w], cx, &mut row_out);
        for c in 0..w {
            if template.get(r, c).is_finite() {
                out.set(r, c, row_out[c].sqrt() as f32);
            }
        }
    }
    out
}

/// 1D squared distance transform of sampled function `f` with spacing `step`:
/// `d[q] = min_p ((q − p)·step)² + f[p]`.
fn edt_1d(f: &[f64], step: f64, d: &mut [f64]) {
    let n = f.len();
    let s2 = step * step;
    // Lower envelope of parabolas: vertices `v`, boundaries `z`.
    let mut v = vec![0usize; n];
    let mut z = vec![0.0f64; n + 1];
    let mut k = 0usize;
    let first = match f.iter().position(|x| x.is_finite()) {
        Some(p) => p,
        None => {
            d.fill(f64::INFINITY);
            return;
        }
    };
    v[0] = first;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;
    for q in first + 1..n {
        if !f[q].is_finite() {
            continue;
        }
        loop {
            let p = v[k];
            let s = ((f[q] + s2 * (q * q) as f64) - (f[p] + s2 * (p * p) as f64))
                / (2.0 * s2 * (q as f64 - p as f64));
            if s <= z[k] && k > 0 {
                k -= 1;
                continue;
            }
            if s <= z[k] {
                // k == 0 and the new parabola dominates everywhere.
                v[0] = q;
                z[1] = f64::INFINITY;
                break;
            }
            k += 1;
            v[k] = q;
            z[k] = s;
            z[k + 1] = f64::INFINITY;
            break;
        }
    }
    let mut k = 0usize;
    for (q, dq) in d.iter_mut().enumerate() {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let p = v[k];
        let dx = (q as f64 - p as f64) * step;
        *dq = dx * dx + f[p];
    }
}
