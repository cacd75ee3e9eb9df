//! Five-bucket classification shared by the flood, drought and heat pipelines.
//!
//! A [`ClassScheme`] is data: four ascending thresholds, which side of each
//! threshold is closed, the polarity of the input, an optional valid domain
//! and five labels. Class 1 is always the lowest risk, class 5 the highest.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoringError};
use crate::normalize::Polarity;
use crate::raster::Raster;

/// Sentinel stored in a [`ClassLayer`] for unclassified pixels.
pub const UNCLASSIFIED: u8 = 0;

/// Flood susceptibility labels for classes 1..=5.
pub const FLOOD_LABELS: [&str; 5] = ["Negligible", "Minor", "Moderate", "Substantial", "Critical"];

/// Label of a flood class. Stored records keep only the level, so callers
/// outside a loaded model read the label from here.
pub fn flood_label(class: RiskClass) -> &'static str {
    FLOOD_LABELS[usize::from(class.0 - 1)]
}

/// Ordinal risk class 1 (lowest) ..= 5 (highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RiskClass(u8);

impl RiskClass {
    pub const LOWEST: RiskClass = RiskClass(1);
    pub const HIGHEST: RiskClass = RiskClass(5);

    pub fn new(value: u8) -> Option<Self> {
        (1..=5).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for RiskClass {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        RiskClass::new(value).ok_or_else(|| format!("risk class {value} outside 1..=5"))
    }
}

impl From<RiskClass> for u8 {
    fn from(c: RiskClass) -> u8 {
        c.0
    }
}

/// Which end of each interval the threshold belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Closure {
    /// `(a, b]`: a value equal to a threshold stays in the lower bucket.
    Upper,
    /// `[a, b)`: a value equal to a threshold moves to the upper bucket.
    Lower,
}

/// Four non-decreasing thresholds partitioning a value range into 5 buckets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassBreakpoints([f32; 4]);

impl ClassBreakpoints {
    pub fn new(breaks: [f32; 4]) -> Result<Self> {
        if breaks.iter().any(|b| !b.is_finite()) {
            return Err(ScoringError::calibration(format!("non-finite breakpoints {breaks:?}")));
        }
        if breaks.windows(2).any(|w| w[1] < w[0]) {
            return Err(ScoringError::calibration(format!(
                "breakpoints must be non-decreasing, got {breaks:?}"
            )));
        }
        Ok(Self(breaks))
    }

    /// 20th/40th/60th/80th percentiles of the valid pixels of `index`.
    ///
    /// Computed once over the whole region at calibration time.
    pub fn from_percentiles(index: &Raster) -> Result<Self> {
        let mut values: Vec<f32> = index.valid_values().collect();
        if values.is_empty() {
            return Err(ScoringError::calibration("index has no valid pixels"));
        }
        values.sort_by(f32::total_cmp);
        Self::new([
            percentile_sorted(&values, 20.0),
            percentile_sorted(&values, 40.0),
            percentile_sorted(&values, 60.0),
            percentile_sorted(&values, 80.0),
        ])
    }

    pub fn values(&self) -> [f32; 4] {
        self.0
    }
}

impl<'de> Deserialize<'de> for ClassBreakpoints {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = <[f32; 4]>::deserialize(d)?;
        ClassBreakpoints::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Percentile `p` (0–100) of an ascending slice, linear interpolation
/// between closest ranks. `sorted` must be non-empty.
pub fn percentile_sorted(sorted: &[f32], p: f64) -> f32 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = (rank - lo as f64) as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// A parameterized 5-bucket classifier with its label table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScheme {
    pub breakpoints: ClassBreakpoints,
    pub closure: Closure,
    /// Direct: higher values → higher class. Inverted: higher values → lower class.
    pub polarity: Polarity,
    /// Inclusive valid range; values outside are unclassified.
    pub domain: Option<(f32, f32)>,
    /// Labels for classes 1..=5.
    pub labels: [String; 5],
}

impl ClassScheme {
    /// Flood susceptibility: `≤p20 → 1 … >p80 → 5`.
    pub fn flood(breakpoints: ClassBreakpoints) -> Self {
        Self {
            breakpoints,
            closure: Closure::Upper,
            polarity: Polarity::Direct,
            domain: None,
            labels: labels(FLOOD_LABELS),
        }
    }

    /// Drought from VHI: `<0.1` extreme … `≥0.6` none.
    pub fn drought() -> Self {
        Self {
            breakpoints: ClassBreakpoints([0.1, 0.2, 0.4, 0.6]),
            closure: Closure::Lower,
            polarity: Polarity::Inverted,
            domain: None,
            labels: labels([
                "No Drought",
                "Mild Drought",
                "Moderate Drought",
                "Severe Drought",
                "Extreme Drought",
            ]),
        }
    }

    /// Heat from LST in °C: `[23,30) → 1 … [42,48] → 5`, other values unclassified.
    pub fn heat() -> Self {
        Self {
            breakpoints: ClassBreakpoints([30.0, 34.0, 38.0, 42.0]),
            closure: Closure::Lower,
            polarity: Polarity::Direct,
            domain: Some((23.0, 48.0)),
            labels: labels([
                "Comfortable Warmth",
                "Mildly Elevated",
                "High (or Warm)",
                "Very High (or Hot)",
                "Extreme Heat",
            ]),
        }
    }

    /// Class for one value. None for no-data or values outside the domain.
    pub fn classify_value(&self, v: f32) -> Option<RiskClass> {
        if !v.is_finite() {
            return None;
        }
        if let Some((lo, hi)) = self.domain {
            if v < lo || v > hi {
                return None;
            }
        }
        let above = self
            .breakpoints
            .0
            .iter()
            .filter(|&&b| match self.closure {
                Closure::Upper => b < v,
                Closure::Lower => b <= v,
            })
            .count() as u8;
        let class = match self.polarity {
            Polarity::Direct => 1 + above,
            Polarity::Inverted => 5 - above,
        };
        Some(RiskClass(class))
    }

    pub fn label(&self, class: RiskClass) -> &str {
        &self.labels[usize::from(class.0 - 1)]
    }

    /// Classify every pixel; no-data becomes [`UNCLASSIFIED`].
    pub fn classify(&self, index: &Raster) -> ClassLayer {
        let data = index
            .data
            .iter()
            .map(|&v| self.classify_value(v).map_or(UNCLASSIFIED, RiskClass::get))
            .collect();
        ClassLayer {
            data,
            width: index.width,
            height: index.height,
        }
    }
}

fn labels(l: [&str; 5]) -> [String; 5] {
    l.map(str::to_string)
}

/// Per-pixel class codes on the grid of the index they were derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassLayer {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl ClassLayer {
    pub fn get(&self, row: usize, col: usize) -> Option<RiskClass> {
        RiskClass::new(self.data[row * self.width + col])
    }

    /// Pixel count per class 1..=5 and unclassified (index 0).
    pub fn histogram(&self) -> [usize; 6] {
        let mut counts = [0usize; 6];
        for &c in &self.data {
            counts[usize::from(c.min(5))] += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(s: &ClassScheme, v: f32) -> Option<u8> {
        s.classify_value(v).map(RiskClass::get)
    }

    #[test]
    fn flood_rule_is_upper_closed() {
        let s = ClassScheme::flood(ClassBreakpoints::new([0.2, 0.4, 0.6, 0.8]).unwrap());
        assert_eq!(class(&s, 0.0), Some(1));
        assert_eq!(class(&s, 0.2), Some(1));
        assert_eq!(class(&s, 0.21), Some(2));
        assert_eq!(class(&s, 0.6), Some(3));
        assert_eq!(class(&s, 0.8), Some(4));
        assert_eq!(class(&s, 0.81), Some(5));
        assert_eq!(class(&s, f32::NAN), None);
    }

    #[test]
    fn flood_labels_have_one_source() {
        let s = ClassScheme::flood(ClassBreakpoints::new([0.2, 0.4, 0.6, 0.8]).unwrap());
        for c in 1..=5 {
            let class = RiskClass::new(c).unwrap();
            assert_eq!(s.label(class), flood_label(class));
        }
        assert_eq!(flood_label(RiskClass::HIGHEST), "Critical");
        assert_eq!(RiskClass::new(0), None);
        assert_eq!(RiskClass::new(9), None);
    }

    #[test]
    fn heat_bands() {
        let s = ClassScheme::heat();
        let c = s.classify_value(35.0).unwrap();
        assert_eq!(c.get(), 3);
        assert_eq!(s.label(c), "High (or Warm)");
        let c = s.classify_value(44.0).unwrap();
        assert_eq!(c.get(), 5);
        assert_eq!(s.label(c), "Extreme Heat");
        assert_eq!(class(&s, 23.0), Some(1));
        assert_eq!(class(&s, 30.0), Some(2));
        assert_eq!(class(&s, 48.0), Some(5));
        // Below the lowest band is unclassified, never class 1.
        assert_eq!(class(&s, 22.0), None);
        assert_eq!(class(&s, 48.5), None);
    }

    #[test]
    fn drought_from_vhi() {
        let s = ClassScheme::drought();
        let extreme = s.classify_value(0.05).unwrap();
        assert_eq!(s.label(extreme), "Extreme Drought");
        assert_eq!(extreme, RiskClass::HIGHEST);
        let none = s.classify_value(0.65).unwrap();
        assert_eq!(s.label(none), "No Drought");
        assert_eq!(none, RiskClass::LOWEST);
        assert_eq!(s.label(s.classify_value(0.1).unwrap()), "Severe Drought");
        assert_eq!(s.label(s.classify_value(0.3).unwrap()), "Moderate Drought");
        assert_eq!(s.label(s.classify_value(0.5).unwrap()), "Mild Drought");
        assert_eq!(s.label(s.classify_value(0.6).unwrap()), "No Drought");
    }

    #[test]
    fn classification_is_monotonic_and_total() {
        let flood = ClassScheme::flood(ClassBreakpoints::new([0.1, 0.3, 0.3, 0.7]).unwrap());
        let schemes = [flood, ClassScheme::drought(), ClassScheme::heat()];
        for s in &schemes {
            let (lo, hi) = s.domain.unwrap_or((-1.0, 2.0));
            let steps = 2000;
            let mut prev: Option<u8> = None;
            for i in 0..=steps {
                let v = lo + (hi - lo) * i as f32 / steps as f32;
                // Total inside the domain: exactly one class per value.
                let c = class(s, v).expect("every in-domain value gets a class");
                if let Some(p) = prev {
                    match s.polarity {
                        Polarity::Direct => assert!(c >= p, "{v}: {c} < {p}"),
                        Polarity::Inverted => assert!(c <= p, "{v}: {c} > {p}"),
                    }
                }
                prev = Some(c);
            }
        }
    }

    #[test]
    fn breakpoints_must_be_non_decreasing() {
        assert!(ClassBreakpoints::new([0.1, 0.1, 0.2, 0.3]).is_ok());
        assert!(matches!(
            ClassBreakpoints::new([0.1, 0.3, 0.2, 0.4]),
            Err(ScoringError::Calibration(_))
        ));
        assert!(serde_json::from_str::<ClassBreakpoints>("[0.4,0.3,0.2,0.1]").is_err());
    }

    #[test]
    fn percentiles_over_valid_pixels() {
        let mut r = Raster::new(11, 1, 0.0, 1.0, 0.0, 1.0, 0.0);
        for c in 0..11 {
            r.set(0, c, c as f32);
        }
        let mut with_gap = r.clone();
        with_gap.data.push(f32::NAN);
        with_gap.width = 12;
        let b = ClassBreakpoints::from_percentiles(&r).unwrap().values();
        assert_eq!(b, [2.0, 4.0, 6.0, 8.0]);
        let b = ClassBreakpoints::from_percentiles(&with_gap).unwrap().values();
        assert_eq!(b, [2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn percentile_interpolates() {
        let v = [0.0f32, 10.0];
        assert_eq!(percentile_sorted(&v, 25.0), 2.5);
        assert_eq!(percentile_sorted(&[3.0], 80.0), 3.0);
    }

    #[test]
    fn class_layer_marks_nodata_unclassified() {
        let s = ClassScheme::heat();
        let mut r = Raster::new(3, 1, 0.0, 1.0, 0.0, 1.0, 35.0);
        r.set(0, 1, f32::NAN);
        r.set(0, 2, 10.0);
        let layer = s.classify(&r);
        assert_eq!(layer.get(0, 0).map(RiskClass::get), Some(3));
        assert_eq!(layer.get(0, 1), None);
        assert_eq!(layer.get(0, 2), None);
        assert_eq!(layer.histogram(), [2, 0, 0, 1, 0, 0]);
    }

    #[test]
    fn risk_class_serde_rejects_out_of_range() {
        assert!(serde_json::from_str::<RiskClass>("0").is_err());
        assert_eq!(serde_json::from_str::<RiskClass>("4").unwrap().get(), 4);
    }
}
