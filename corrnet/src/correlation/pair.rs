//! Pairwise correlation of two feature-table rows.
//!
//! Two measures are computed per row pair:
//! - the height profile: feature heights of both rows across all shared raw files
//! - the peak shape: per raw file, intensities of both traces over their shared scans
//!
//! A missing correlation is not an error. A shared scan index that points at two
//! different scans is, and aborts the run.

use std::collections::BTreeMap;

use mscorr::algorithm::correlation::CorrelationData;
use mscorr::data::feature::{FeatureRow, FeatureTrace};
use serde::Serialize;

use crate::config::CorrelationParams;
use crate::error::{CorrNetError, Result};

/// Slack when comparing r against a threshold, so that r = 1 computed as 0.999.. passes 1.0.
const R_EPSILON: f64 = 1e-9;

/// Height-profile correlation plus per-raw-file shape correlations of one row pair.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PairCorrelation {
    pub height: Option<CorrelationData>,
    pub shapes: BTreeMap<String, CorrelationData>,
    /// all shape points pooled
    pub total: Option<CorrelationData>,
}

impl PairCorrelation {
    pub fn new(height: Option<CorrelationData>, shapes: BTreeMap<String, CorrelationData>) -> Self {
        let total = CorrelationData::pooled(shapes.values());
        PairCorrelation { height, shapes, total }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.has_height() || self.has_shape()
    }

    #[inline]
    pub fn has_height(&self) -> bool {
        self.height.is_some()
    }

    #[inline]
    pub fn has_shape(&self) -> bool {
        !self.shapes.is_empty()
    }

    pub fn height_r(&self) -> Option<f64> {
        self.height.as_ref().map(|h| h.pearson_r)
    }

    pub fn min_shape_r(&self) -> Option<f64> {
        self.shapes.values().map(|s| s.pearson_r).reduce(f64::min)
    }

    pub fn max_shape_r(&self) -> Option<f64> {
        self.shapes.values().map(|s| s.pearson_r).reduce(f64::max)
    }

    pub fn avg_shape_r(&self) -> Option<f64> {
        mean(self.shapes.values().map(|s| s.pearson_r))
    }

    pub fn avg_shape_points(&self) -> Option<f64> {
        mean(self.shapes.values().map(|s| s.len() as f64))
    }

    pub fn total_r(&self) -> Option<f64> {
        self.total.as_ref().map(|t| t.pearson_r)
    }

    /// Drops sub-results below their threshold. Never restores a dropped result.
    pub fn validate(&mut self, min_height_r: f64, min_shape_r: f64) {
        if self.height_r().is_some_and(|r| r + R_EPSILON < min_height_r) {
            self.height = None;
        }
        if self.avg_shape_r().is_some_and(|r| r + R_EPSILON < min_shape_r) {
            self.shapes.clear();
            self.total = None;
        }
    }
}

fn mean<I: Iterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { None } else { Some(sum / n as f64) }
}

/// Correlates feature heights across raw files in which both rows were detected.
pub fn correlate_heights(a: &FeatureRow, b: &FeatureRow, params: &CorrelationParams) -> Option<CorrelationData> {
    let mut x = Vec::new();
    let mut y = Vec::new();
    for (raw, fa) in &a.features {
        let Some(fb) = b.features.get(raw) else { continue };
        if fa.height >= params.min_height && fb.height >= params.min_height {
            x.push(fa.height);
            y.push(fb.height);
        }
    }
    if x.len() < params.min_data_points {
        return None;
    }
    let data = CorrelationData::new(x, y)?;
    if params.require_positive_slope && data.is_negative_regression() {
        return None;
    }
    Some(data)
}

/// First and last scan index shared by both traces.
pub fn shape_overlap(a: &FeatureTrace, b: &FeatureTrace) -> Option<(u32, u32)> {
    let first = first_shared(a.scan_indices.iter(), b.scan_indices.iter(), |x, y| x.cmp(y))?;
    let last = first_shared(a.scan_indices.iter().rev(), b.scan_indices.iter().rev(), |x, y| y.cmp(x))?;
    Some((first, last))
}

/// Walks two sorted sequences until they meet.
fn first_shared<'a, I, F>(mut a: I, mut b: I, cmp: F) -> Option<u32>
where
    I: Iterator<Item = &'a u32>,
    F: Fn(&u32, &u32) -> std::cmp::Ordering,
{
    let mut x = a.next()?;
    let mut y = b.next()?;
    loop {
        match cmp(x, y) {
            std::cmp::Ordering::Equal => return Some(*x),
            std::cmp::Ordering::Less => x = a.next()?,
            std::cmp::Ordering::Greater => y = b.next()?,
        }
    }
}

/// Correlates the peak shapes of two traces of the same raw file.
///
/// Only scans inside the shared index window are used. Both traces must hold more than
/// `min_data_points` scans inside that window, and a scan pair counts only if both
/// intensities exceed the noise level.
pub fn correlate_shape(
    raw_file: &str,
    row_a: u32,
    a: &FeatureTrace,
    row_b: u32,
    b: &FeatureTrace,
    params: &CorrelationParams,
) -> Result<Option<CorrelationData>> {
    let Some((lo, hi)) = shape_overlap(a, b) else { return Ok(None) };

    // ---- 1) WINDOW ----
    let a_start = a.scan_indices.partition_point(|&s| s < lo);
    let a_end = a.scan_indices.partition_point(|&s| s <= hi);
    let b_start = b.scan_indices.partition_point(|&s| s < lo);
    let b_end = b.scan_indices.partition_point(|&s| s <= hi);
    if a_end - a_start <= params.min_data_points || b_end - b_start <= params.min_data_points {
        return Ok(None);
    }

    // ---- 2) ALIGNED WALK ----
    let mut x = Vec::new();
    let mut y = Vec::new();
    let (mut i, mut j) = (a_start, b_start);
    while i < a_end && j < b_end {
        let (si, sj) = (a.scan_indices[i], b.scan_indices[j]);
        if si == sj {
            if a.scan_numbers[i] != b.scan_numbers[j] {
                return Err(CorrNetError::ScanIdentityMismatch {
                    raw_file: raw_file.to_string(),
                    scan_index: si,
                    row_a,
                    row_b,
                    scan_a: a.scan_numbers[i],
                    scan_b: b.scan_numbers[j],
                });
            }
            let (ia, ib) = (a.intensities[i], b.intensities[j]);
            if ia > params.noise_level && ib > params.noise_level {
                x.push(ia);
                y.push(ib);
            }
            i += 1;
            j += 1;
        } else if si < sj {
            i += 1;
        } else {
            j += 1;
        }
    }

    if x.len() < params.min_data_points {
        return Ok(None);
    }

    // ---- 3) APEX EDGES ----
    if params.min_edge_points > 0 {
        let apex = x
            .iter()
            .enumerate()
            .max_by(|p, q| p.1.total_cmp(q.1))
            .map(|(k, _)| k)
            .unwrap_or(0);
        let left = apex;
        let right = x.len() - apex - 1;
        if left < params.min_edge_points || right < params.min_edge_points {
            return Ok(None);
        }
    }

    let Some(data) = CorrelationData::new(x, y) else { return Ok(None) };
    if params.require_positive_slope && data.is_negative_regression() {
        return Ok(None);
    }
    Ok(Some(data))
}

/// Correlates two rows. Returns `Ok(None)` if nothing survives validation.
pub fn correlate_rows(a: &FeatureRow, b: &FeatureRow, params: &CorrelationParams) -> Result<Option<PairCorrelation>> {
    let height = correlate_heights(a, b, params);

    let mut shapes = BTreeMap::new();
    for (raw, fa) in &a.features {
        let Some(fb) = b.features.get(raw) else { continue };
        if fa.trace.is_empty() || fb.trace.is_empty() {
            continue;
        }
        if let Some(s) = correlate_shape(raw, a.id, &fa.trace, b.id, &fb.trace, params)? {
            shapes.insert(raw.clone(), s);
        }
    }

    let mut pair = PairCorrelation::new(height, shapes);
    pair.validate(params.min_height_r, params.min_shape_r);
    Ok(pair.is_valid().then_some(pair))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mscorr::data::feature::Feature;

    fn row_with_heights(id: u32, heights: &[f64]) -> FeatureRow {
        let mz = 300.0 + id as f64;
        let mut row = FeatureRow::new(id, mz, 5.0, 1);
        for (k, h) in heights.iter().enumerate() {
            let raw = format!("sample{k}.mzML");
            row = row.with_feature(&raw, Feature { mz, rt: 5.0, height: *h, trace: FeatureTrace::default() });
        }
        row
    }

    fn gaussian(first: u32, last: u32, apex: f64, width: f64, height: f64) -> FeatureTrace {
        let ints = (first..=last)
            .map(|s| height * (-((s as f64 - apex).powi(2)) / (2.0 * width * width)).exp())
            .collect();
        FeatureTrace::from_scans(first, ints).unwrap()
    }

    #[test]
    fn test_height_profile_linear_scaling() {
        let a = row_with_heights(1, &[100.0, 200.0, 150.0, 300.0, 250.0]);
        let b = row_with_heights(2, &[50.0, 100.0, 75.0, 150.0, 125.0]);
        let params = CorrelationParams { noise_level: 0.0, ..CorrelationParams::default() };

        let h = correlate_heights(&a, &b, &params).unwrap();
        assert_eq!(h.len(), 5);
        assert!((h.pearson_r - 1.0).abs() < 1e-9);
        assert!((h.cosine - 1.0).abs() < 1e-9);

        let pair = correlate_rows(&a, &b, &CorrelationParams { min_height_r: 1.0, ..params }).unwrap().unwrap();
        assert!(pair.has_height());
        assert!(!pair.has_shape());
        assert!(pair.is_valid());
    }

    #[test]
    fn test_height_profile_needs_min_points() {
        let a = row_with_heights(1, &[100.0, 200.0]);
        let b = row_with_heights(2, &[50.0, 100.0]);
        assert!(correlate_heights(&a, &b, &CorrelationParams::default()).is_none());
    }

    #[test]
    fn test_overlap_window() {
        let a = FeatureTrace::from_scans(10, vec![1.0; 41]).unwrap(); // 10..=50
        let b = FeatureTrace::from_scans(30, vec![1.0; 41]).unwrap(); // 30..=70
        assert_eq!(shape_overlap(&a, &b), Some((30, 50)));

        let c = FeatureTrace::from_scans(60, vec![1.0; 5]).unwrap();
        assert_eq!(shape_overlap(&a, &c), None);
    }

    #[test]
    fn test_shape_uses_only_shared_scans_above_noise() {
        let a = gaussian(10, 50, 40.0, 6.0, 1e6);
        let mut b = gaussian(30, 70, 40.0, 6.0, 5e5);
        // scans 30 and 31 of b fall below the noise level
        b.intensities[0] = 10.0;
        b.intensities[1] = 10.0;
        let params = CorrelationParams { noise_level: 100.0, ..CorrelationParams::default() };

        let s = correlate_shape("s.mzML", 1, &a, 2, &b, &params).unwrap().unwrap();
        assert_eq!(s.len(), 21 - 2);
        assert!(s.pearson_r > 0.99);
    }

    #[test]
    fn test_shape_requires_overlap_above_min_points() {
        let a = gaussian(10, 20, 15.0, 3.0, 1e6);
        let b = gaussian(18, 30, 22.0, 3.0, 1e6);
        // shared scans 18..=20 are three points, not more than min_data_points
        let params = CorrelationParams { noise_level: 0.0, ..CorrelationParams::default() };
        assert!(correlate_shape("s.mzML", 1, &a, 2, &b, &params).unwrap().is_none());
    }

    #[test]
    fn test_scan_identity_mismatch_is_fatal() {
        let a = FeatureTrace::from_scans(1, vec![1.0, 5.0, 9.0, 5.0, 1.0]).unwrap();
        let mut b = FeatureTrace::from_scans(1, vec![2.0, 10.0, 18.0, 10.0, 2.0]).unwrap();
        b.scan_numbers[2] = 999;
        let params = CorrelationParams { noise_level: 0.0, ..CorrelationParams::default() };
        let err = correlate_shape("s.mzML", 1, &a, 2, &b, &params).unwrap_err();
        assert!(err.is_fatal());
        match err {
            CorrNetError::ScanIdentityMismatch { scan_index, scan_a, scan_b, .. } => {
                assert_eq!(scan_index, 3);
                assert_eq!(scan_a, 3);
                assert_eq!(scan_b, 999);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_validation_is_monotone() {
        let a = row_with_heights(1, &[100.0, 200.0, 150.0, 300.0, 250.0]);
        let b = row_with_heights(2, &[60.0, 90.0, 80.0, 150.0, 110.0]);
        let params = CorrelationParams { noise_level: 0.0, ..CorrelationParams::default() };
        let height = correlate_heights(&a, &b, &params);
        let mut pair = PairCorrelation::new(height, BTreeMap::new());
        let r = pair.height_r().unwrap();
        assert!(r < 1.0);

        pair.validate(r - 0.01, 0.9);
        assert!(pair.has_height());
        pair.validate(r + 0.001, 0.9);
        assert!(!pair.has_height());
        assert!(!pair.is_valid());
        // a looser threshold cannot bring it back
        pair.validate(-1.0, -1.0);
        assert!(!pair.has_height());
    }

    #[test]
    fn test_negative_regression_is_dropped() {
        let a = row_with_heights(1, &[100.0, 200.0, 300.0, 400.0]);
        let b = row_with_heights(2, &[400.0, 300.0, 200.0, 100.0]);
        let params = CorrelationParams { noise_level: 0.0, min_height_r: -1.0, ..CorrelationParams::default() };
        assert!(correlate_heights(&a, &b, &params).is_none());
        let params = CorrelationParams { require_positive_slope: false, ..params };
        assert!(correlate_heights(&a, &b, &params).is_some());
    }
}
