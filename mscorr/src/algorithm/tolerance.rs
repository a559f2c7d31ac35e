use serde::{Deserialize, Serialize};

/// m/z tolerance with an absolute and a relative (ppm) component.
/// The wider of both windows applies.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MzTolerance {
    pub abs: f64, // e.g. 0.002 Da
    pub ppm: f64, // e.g. 10.0
}

impl Default for MzTolerance {
    fn default() -> Self {
        MzTolerance { abs: 0.002, ppm: 10.0 }
    }
}

impl MzTolerance {
    pub fn new(abs: f64, ppm: f64) -> Self {
        MzTolerance { abs, ppm }
    }

    /// Half-width of the tolerance window around `mz`.
    #[inline]
    pub fn window(&self, mz: f64) -> f64 {
        self.abs.max(mz.abs() * self.ppm * 1e-6)
    }

    #[inline]
    pub fn range(&self, mz: f64) -> (f64, f64) {
        let d = self.window(mz);
        (mz - d, mz + d)
    }

    /// True if `a` and `b` are within the window around their mean.
    #[inline]
    pub fn matches(&self, a: f64, b: f64) -> bool {
        let center = 0.5 * (a + b);
        (a - b).abs() <= self.window(center)
    }

    pub fn is_valid(&self) -> bool {
        self.abs.is_finite() && self.ppm.is_finite() && self.abs >= 0.0 && self.ppm >= 0.0
            && (self.abs > 0.0 || self.ppm > 0.0)
    }
}
