//! Run configuration.
//!
//! All thresholds are passed explicitly into each stage; nothing is read from
//! shared mutable state. Every struct has a `Default` and can be loaded from JSON
//! with missing fields falling back to the defaults.

use std::path::Path;

use mscorr::algorithm::tolerance::MzTolerance;
use mscorr::chemistry::library::{IonLibrary, IonLibraryParams};
use serde::{Deserialize, Serialize};

use crate::error::{CorrNetError, Result};
use crate::grouping::filter::MinimumFeatureFilter;

/// Thresholds for height-profile and peak-shape correlation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationParams {
    /// Minimum number of paired points for any correlation
    pub min_data_points: usize,       // e.g. 3
    /// Minimum kept points on each side of the apex within the shape overlap (0 disables)
    pub min_edge_points: usize,       // e.g. 0
    /// Shape points at or below this intensity are ignored
    pub noise_level: f64,             // e.g. 1e4
    /// Features below this height do not enter the height profile
    pub min_height: f64,
    /// Height-profile Pearson r below this is discarded
    pub min_height_r: f64,            // e.g. 0.7
    /// Average per-file shape Pearson r below this is discarded
    pub min_shape_r: f64,             // e.g. 0.85
    /// Discard correlations with a negative regression slope
    pub require_positive_slope: bool,
}

impl Default for CorrelationParams {
    fn default() -> Self {
        Self {
            min_data_points: 3,
            min_edge_points: 0,
            noise_level: 1e4,
            min_height: 0.0,
            min_height_r: 0.7,
            min_shape_r: 0.85,
            require_positive_slope: true,
        }
    }
}

impl CorrelationParams {
    /// Accept weak but positive correlations.
    pub fn permissive() -> Self {
        Self {
            min_data_points: 3,
            min_edge_points: 0,
            noise_level: 0.0,
            min_height: 0.0,
            min_height_r: 0.5,
            min_shape_r: 0.6,
            require_positive_slope: true,
        }
    }

    /// Require well-sampled, strongly correlated peaks.
    pub fn strict() -> Self {
        Self {
            min_data_points: 5,
            min_edge_points: 2,
            noise_level: 1e4,
            min_height: 1e4,
            min_height_r: 0.85,
            min_shape_r: 0.9,
            require_positive_slope: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_data_points < 2 {
            return Err(CorrNetError::InvalidConfig(
                "min_data_points must be at least 2".into(),
            ));
        }
        for (name, r) in [("min_height_r", self.min_height_r), ("min_shape_r", self.min_shape_r)] {
            if !(-1.0..=1.0).contains(&r) {
                return Err(CorrNetError::InvalidConfig(format!("{name} must be within [-1, 1]")));
            }
        }
        if !(self.noise_level >= 0.0) || !(self.min_height >= 0.0) {
            return Err(CorrNetError::InvalidConfig(
                "noise_level and min_height must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// How the m/z agreement of a candidate pair is checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckMode {
    /// average row m/z
    Average,
    /// at least one shared raw file agrees
    OneFeature,
    /// every shared raw file agrees
    AllFeatures,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationParams {
    pub mz_tolerance: MzTolerance,
    pub check_mode: CheckMode,
    /// per-feature modes skip features below this height
    pub min_height: f64,
}

impl Default for AnnotationParams {
    fn default() -> Self {
        Self {
            mz_tolerance: MzTolerance::new(0.002, 10.0),
            check_mode: CheckMode::Average,
            min_height: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeutralLossMode {
    /// the fragment row's m/z must appear in the partner's MS/MS
    Precursor,
    /// additionally accept any two signals separated by the modification mass
    AnySignal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MsMsCheckParams {
    pub mz_tolerance: MzTolerance,
    pub min_height: f64,
    pub check_multimers: bool,
    pub check_neutral_losses: bool,
    pub neutral_loss_mode: NeutralLossMode,
}

impl Default for MsMsCheckParams {
    fn default() -> Self {
        Self {
            mz_tolerance: MzTolerance::new(0.005, 20.0),
            min_height: 0.0,
            check_multimers: true,
            check_neutral_losses: true,
            neutral_loss_mode: NeutralLossMode::Precursor,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementParams {
    pub enabled: bool,
    /// confidence at which competing links on a row are pruned
    pub true_threshold: usize,  // e.g. 4
    pub delete_xmers_on_msms: bool,
    /// drop networks without a monomer, or with one monomer and 3+ multimers
    pub delete_without_monomer: bool,
    /// a network of >= true_threshold rows preferred on all its rows removes every
    /// other network on those rows
    pub delete_smaller_networks: bool,
}

impl Default for RefinementParams {
    fn default() -> Self {
        Self {
            enabled: true,
            true_threshold: 4,
            delete_xmers_on_msms: true,
            delete_without_monomer: true,
            delete_smaller_networks: true,
        }
    }
}

/// Everything a run needs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Max |ΔRT| for a row pair to be compared at all (same unit as row RT)
    pub rt_tolerance: f64,
    pub correlation: CorrelationParams,
    pub feature_filter: MinimumFeatureFilter,
    pub library: IonLibraryParams,
    pub annotation: AnnotationParams,
    pub msms: MsMsCheckParams,
    pub refinement: RefinementParams,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            rt_tolerance: 0.1,
            correlation: CorrelationParams::default(),
            feature_filter: MinimumFeatureFilter::default(),
            library: IonLibraryParams::default(),
            annotation: AnnotationParams::default(),
            msms: MsMsCheckParams::default(),
            refinement: RefinementParams::default(),
        }
    }
}

impl RunConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: RunConfig = serde_json::from_str(&text)?;
        Ok(cfg)
    }

    /// Checks all parameters and enumerates the ion library once,
    /// so that a candidate overflow surfaces before any work starts.
    pub fn validate(&self) -> Result<IonLibrary> {
        if !(self.rt_tolerance >= 0.0) || !self.rt_tolerance.is_finite() {
            return Err(CorrNetError::InvalidConfig("rt_tolerance must be a finite, non-negative number".into()));
        }
        self.correlation.validate()?;
        self.feature_filter.validate()?;
        if !self.annotation.mz_tolerance.is_valid() || !self.msms.mz_tolerance.is_valid() {
            return Err(CorrNetError::InvalidConfig("m/z tolerances must be non-negative and not both zero".into()));
        }
        if self.refinement.true_threshold == 0 {
            return Err(CorrNetError::InvalidConfig("true_threshold must be at least 1".into()));
        }
        Ok(IonLibrary::build(&self.library)?)
    }
}
