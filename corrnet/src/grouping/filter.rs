//! Minimum feature filter.
//!
//! Keeps rows that were detected in a minimum number (or fraction) of the samples
//! of at least one sample group. Rows failing the filter take no part in grouping.

use std::collections::{BTreeMap, BTreeSet};

use mscorr::data::feature::FeatureRow;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CorrNetError, Result};

/// Required number of samples, absolute or as a fraction of the group size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum MinSamples {
    Absolute(usize),
    Relative(f64),
}

impl MinSamples {
    /// Samples required out of a group of `n`.
    #[inline]
    pub fn required(&self, n: usize) -> usize {
        match *self {
            MinSamples::Absolute(k) => k,
            MinSamples::Relative(f) => (f * n as f64 - 1e-9).ceil().max(0.0) as usize,
        }
    }
}

/// Minimum-samples filter configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimumFeatureFilter {
    /// Per sample group
    pub min_samples: MinSamples,
    /// Features below this height do not count as detected
    pub min_height: f64,
    /// Sample group name -> raw files. Empty: all raw files form one group.
    pub sample_groups: BTreeMap<String, Vec<String>>,
}

impl Default for MinimumFeatureFilter {
    fn default() -> Self {
        Self {
            // detected at least once
            min_samples: MinSamples::Absolute(1),
            min_height: 0.0,
            sample_groups: BTreeMap::new(),
        }
    }
}

impl MinimumFeatureFilter {
    /// Only drop rows that were never detected above noise.
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Present in at least half the samples of one group.
    pub fn strict() -> Self {
        Self {
            min_samples: MinSamples::Relative(0.5),
            min_height: 1e4,
            sample_groups: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let MinSamples::Relative(f) = self.min_samples {
            if !(0.0..=1.0).contains(&f) {
                return Err(CorrNetError::InvalidConfig(
                    "relative min_samples must be within [0, 1]".into(),
                ));
            }
        }
        if !(self.min_height >= 0.0) {
            return Err(CorrNetError::InvalidConfig("min_height must be non-negative".into()));
        }
        if self.sample_groups.values().any(|g| g.is_empty()) {
            return Err(CorrNetError::InvalidConfig("sample groups must not be empty".into()));
        }
        Ok(())
    }

    /// Sample groups to test against. Without configured groups, all raw files seen in
    /// `rows` form a single group.
    pub fn resolve_groups(&self, rows: &[FeatureRow]) -> Vec<Vec<String>> {
        if !self.sample_groups.is_empty() {
            return self.sample_groups.values().cloned().collect();
        }
        let all: BTreeSet<&String> = rows.iter().flat_map(|r| r.features.keys()).collect();
        vec![all.into_iter().cloned().collect()]
    }

    #[inline]
    fn detected(&self, row: &FeatureRow, raw: &str) -> bool {
        row.height(raw).is_some_and(|h| h >= self.min_height)
    }

    /// Check if a row passes in at least one sample group.
    pub fn passes(&self, row: &FeatureRow, groups: &[Vec<String>]) -> bool {
        groups.iter().any(|g| {
            let found = g.iter().filter(|raw| self.detected(row, raw)).count();
            found > 0 && found >= self.min_samples.required(g.len())
        })
    }

    /// Check if two rows are detected together in enough samples of one group.
    pub fn passes_pair(&self, a: &FeatureRow, b: &FeatureRow, groups: &[Vec<String>]) -> bool {
        groups.iter().any(|g| {
            let found = g
                .iter()
                .filter(|raw| self.detected(a, raw) && self.detected(b, raw))
                .count();
            found > 0 && found >= self.min_samples.required(g.len())
        })
    }

    /// Mask of passing rows, computed in parallel.
    pub fn filter_par(&self, rows: &[FeatureRow]) -> Vec<bool> {
        let groups = self.resolve_groups(rows);
        rows.par_iter().map(|r| self.passes(r, &groups)).collect()
    }

    /// Counts why rows are rejected.
    pub fn diagnose(&self, rows: &[FeatureRow]) -> FilterDiagnostics {
        let groups = self.resolve_groups(rows);
        let mut diag = FilterDiagnostics { total: rows.len(), ..Default::default() };
        for r in rows {
            if r.features.is_empty() {
                diag.no_features += 1;
            } else if !r.features.keys().any(|raw| self.detected(r, raw)) {
                diag.below_min_height += 1;
            } else if !self.passes(r, &groups) {
                diag.too_few_samples += 1;
            } else {
                diag.passed += 1;
            }
        }
        diag
    }
}

/// Per-row outcome counts of the filter, first failing criterion only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilterDiagnostics {
    pub total: usize,
    pub passed: usize,
    /// rows without any feature
    pub no_features: usize,
    /// rows whose features are all below `min_height`
    pub below_min_height: usize,
    /// rows detected, but in too few samples of every group
    pub too_few_samples: usize,
}

impl FilterDiagnostics {
    pub fn rejected(&self) -> usize {
        self.total - self.passed
    }

    pub fn summary(&self) -> String {
        format!(
            "{} of {} rows kept ({} without features, {} below min height, {} in too few samples)",
            self.passed, self.total, self.no_features, self.below_min_height, self.too_few_samples
        )
    }
}
