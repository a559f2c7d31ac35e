//! Pearson and cosine correlation of paired intensity series.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Paired samples and their correlation measures.
///
/// Created once per measurement (height profile or one raw file's peak shape)
/// and never mutated afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CorrelationData {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub pearson_r: f64,
    pub cosine: f64,
    /// slope of the least-squares regression y ~ x
    pub slope: f64,
    pub min_x: f64,
    pub max_x: f64,
}

impl CorrelationData {
    /// Builds correlation data from paired samples.
    ///
    /// Returns `None` when the series differ in length, hold fewer than two pairs
    /// or one of them is constant (Pearson r undefined).
    ///
    /// # Example
    ///
    /// ```rust
    /// # use mscorr::algorithm::correlation::CorrelationData;
    /// let data = CorrelationData::new(vec![1.0, 2.0, 3.0], vec![2.0, 4.0, 6.0]).unwrap();
    /// assert!((data.pearson_r - 1.0).abs() < 1e-12);
    /// ```
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Option<Self> {
        if x.len() != y.len() || x.len() < 2 {
            return None;
        }
        let pearson_r = pearson(&x, &y)?;
        let slope = regression_slope(&x, &y)?;
        let cosine = cosine(&x, &y);
        let min_x = x.iter().copied().fold(f64::INFINITY, f64::min);
        let max_x = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(CorrelationData { x, y, pearson_r, cosine, slope, min_x, max_x })
    }

    /// Pools all points of several measurements into one correlation.
    pub fn pooled<'a, I>(parts: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a CorrelationData>,
    {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for p in parts {
            x.extend_from_slice(&p.x);
            y.extend_from_slice(&p.y);
        }
        Self::new(x, y)
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn is_negative_regression(&self) -> bool {
        self.slope < 0.0
    }
}

/// Sample Pearson correlation coefficient, `None` if undefined.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let sx = x.iter().std_dev();
    let sy = y.iter().std_dev();
    if !(sx > 0.0 && sy > 0.0) {
        return None;
    }
    let cov = x.iter().covariance(y.iter());
    Some((cov / (sx * sy)).clamp(-1.0, 1.0))
}

/// Cosine similarity, 0 if either vector is all zeros.
#[inline]
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let mut dot = 0f64;
    let mut na = 0f64;
    let mut nb = 0f64;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

fn regression_slope(x: &[f64], y: &[f64]) -> Option<f64> {
    let var_x = x.iter().variance();
    if !(var_x > 0.0) {
        return None;
    }
    Some(x.iter().covariance(y.iter()) / var_x)
}
