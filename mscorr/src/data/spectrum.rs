use serde::{Deserialize, Serialize};

use crate::algorithm::tolerance::MzTolerance;

/// Represents a fragmentation (MS/MS) peak list with associated m/z values and intensities.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MsMsSpectrum {
    #[serde(default)]
    pub precursor_mz: Option<f64>,
    pub mz: Vec<f64>,
    pub intensity: Vec<f64>,
}

impl MsMsSpectrum {
    /// Constructs a new `MsMsSpectrum`.
    ///
    /// # Arguments
    ///
    /// * `mz` - A vector of m/z values.
    /// * `intensity` - A vector of intensity values corresponding to the m/z values.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use mscorr::data::spectrum::MsMsSpectrum;
    /// let spectrum = MsMsSpectrum::new(vec![100.0, 200.0], vec![10.0, 20.0]);
    /// assert_eq!(spectrum.len(), 2);
    /// ```
    pub fn new(mz: Vec<f64>, intensity: Vec<f64>) -> Self {
        MsMsSpectrum { precursor_mz: None, mz, intensity }
    }

    pub fn len(&self) -> usize {
        self.mz.len().min(self.intensity.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn peaks(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.mz.iter().copied().zip(self.intensity.iter().copied())
    }

    /// Most intense peak within tolerance of `mz` and at least `min_height`.
    pub fn find_peak_at(&self, mz: f64, tolerance: &MzTolerance, min_height: f64) -> Option<(f64, f64)> {
        self.peaks()
            .filter(|&(m, i)| i >= min_height && tolerance.matches(m, mz))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Peak pairs `(high, low)` whose m/z differ by `delta` within tolerance,
    /// both at least `min_height`. Used to find neutral losses between any two signals.
    pub fn find_mass_differences(&self, delta: f64, tolerance: &MzTolerance, min_height: f64) -> Vec<((f64, f64), (f64, f64))> {
        let delta = delta.abs();
        let peaks: Vec<(f64, f64)> = self.peaks().filter(|&(_, i)| i >= min_height).collect();
        let mut hits = Vec::new();
        for &high in &peaks {
            for &low in &peaks {
                if high.0 > low.0 && tolerance.matches(high.0 - delta, low.0) {
                    hits.push((high, low));
                }
            }
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_peak_at_prefers_most_intense() {
        let s = MsMsSpectrum::new(vec![100.0, 100.0005, 150.0], vec![10.0, 40.0, 100.0]);
        let tol = MzTolerance::new(0.002, 5.0);
        let (mz, i) = s.find_peak_at(100.0, &tol, 0.0).unwrap();
        assert_eq!(mz, 100.0005);
        assert_eq!(i, 40.0);
        assert!(s.find_peak_at(100.0, &tol, 50.0).is_none());
        assert!(s.find_peak_at(120.0, &tol, 0.0).is_none());
    }

    #[test]
    fn test_find_mass_differences() {
        // water loss from 300 -> 281.989435
        let s = MsMsSpectrum::new(vec![281.989435, 300.0, 210.0], vec![50.0, 100.0, 5.0]);
        let tol = MzTolerance::new(0.002, 5.0);
        let hits = s.find_mass_differences(-18.010565, &tol, 1.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0 .0, 300.0);
        assert_eq!(hits[0].1 .0, 281.989435);
    }
}
