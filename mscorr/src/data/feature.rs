use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::spectrum::MsMsSpectrum;
use crate::error::{ChemError, Result};

/// Chromatographic trace of one feature in one raw file.
///
/// `scan_indices` position each point within the raw file's scan list and are used to
/// align two traces; `scan_numbers` identify the scan itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FeatureTrace {
    pub scan_indices: Vec<u32>,
    pub scan_numbers: Vec<u32>,
    #[serde(default)]
    pub retention_times: Vec<f64>,
    pub intensities: Vec<f64>,
}

impl FeatureTrace {
    pub fn new(scan_indices: Vec<u32>, scan_numbers: Vec<u32>, retention_times: Vec<f64>, intensities: Vec<f64>) -> Self {
        FeatureTrace { scan_indices, scan_numbers, retention_times, intensities }
    }

    /// Trace where scan number and scan index coincide.
    ///
    /// Fails if the last scan would not fit into a `u32`.
    pub fn from_scans(first_scan: u32, intensities: Vec<f64>) -> Result<Self> {
        let len = intensities.len();
        let scans: Vec<u32> = match len.checked_sub(1) {
            None => Vec::new(),
            Some(offset) => {
                let last = u32::try_from(offset)
                    .ok()
                    .and_then(|k| first_scan.checked_add(k))
                    .ok_or(ChemError::ScanOverflow { first_scan, len })?;
                (first_scan..=last).collect()
            }
        };
        Ok(FeatureTrace {
            scan_indices: scans.clone(),
            scan_numbers: scans,
            retention_times: Vec::new(),
            intensities,
        })
    }

    pub fn len(&self) -> usize {
        self.scan_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scan_indices.is_empty()
    }

    pub fn first_index(&self) -> Option<u32> {
        self.scan_indices.first().copied()
    }

    pub fn last_index(&self) -> Option<u32> {
        self.scan_indices.last().copied()
    }

    pub fn validate(&self, raw_file: &str) -> Result<()> {
        let malformed = |reason: &str| ChemError::MalformedTrace {
            raw_file: raw_file.to_string(),
            reason: reason.to_string(),
        };
        let n = self.scan_indices.len();
        if self.scan_numbers.len() != n || self.intensities.len() != n {
            return Err(malformed("scan indices, scan numbers and intensities differ in length"));
        }
        if !self.retention_times.is_empty() && self.retention_times.len() != n {
            return Err(malformed("retention times differ in length"));
        }
        if self.scan_indices.windows(2).any(|w| w[0] >= w[1]) {
            return Err(malformed("scan indices are not strictly increasing"));
        }
        Ok(())
    }
}

/// A feature: the peak of one row in one raw file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Feature {
    pub mz: f64,
    pub rt: f64,
    pub height: f64,
    #[serde(default)]
    pub trace: FeatureTrace,
}

/// One row of a feature table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeatureRow {
    pub id: u32,
    pub mz: f64,
    pub rt: f64,
    /// detected charge state, 0 if unknown
    #[serde(default)]
    pub charge: i32,
    /// features by raw file name
    #[serde(default)]
    pub features: BTreeMap<String, Feature>,
    /// best fragmentation spectrum, if any
    #[serde(default)]
    pub msms: Option<MsMsSpectrum>,
}

impl FeatureRow {
    pub fn new(id: u32, mz: f64, rt: f64, charge: i32) -> Self {
        FeatureRow { id, mz, rt, charge, features: BTreeMap::new(), msms: None }
    }

    pub fn with_feature(mut self, raw_file: &str, feature: Feature) -> Self {
        self.features.insert(raw_file.to_string(), feature);
        self
    }

    pub fn with_msms(mut self, msms: MsMsSpectrum) -> Self {
        self.msms = Some(msms);
        self
    }

    pub fn feature(&self, raw_file: &str) -> Option<&Feature> {
        self.features.get(raw_file)
    }

    pub fn is_present_in(&self, raw_file: &str) -> bool {
        self.features.contains_key(raw_file)
    }

    pub fn height(&self, raw_file: &str) -> Option<f64> {
        self.features.get(raw_file).map(|f| f.height)
    }

    pub fn abs_charge(&self) -> u32 {
        self.charge.unsigned_abs()
    }

    /// Validates all traces of this row.
    pub fn validate(&self) -> Result<()> {
        for (raw, f) in &self.features {
            f.trace.validate(raw)?;
        }
        Ok(())
    }
}
