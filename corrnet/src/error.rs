use mscorr::ChemError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorrNetError {
    /// Two traces claim the same scan index for different scans. Aborts the run.
    #[error(
        "scan identity mismatch in raw file `{raw_file}` at scan index {scan_index}: \
         row {row_a} has scan {scan_a}, row {row_b} has scan {scan_b}"
    )]
    ScanIdentityMismatch {
        raw_file: String,
        scan_index: u32,
        row_a: u32,
        row_b: u32,
        scan_a: u32,
        scan_b: u32,
    },

    #[error(transparent)]
    Chem(#[from] ChemError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown row id {0}")]
    UnknownRow(u32),

    #[error("duplicate row id {0}")]
    DuplicateRow(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CorrNetError {
    /// Data-integrity faults that must abort a run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CorrNetError::ScanIdentityMismatch { .. })
    }

    /// Errors surfaced by configuration checks before a run starts.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CorrNetError::InvalidConfig(_)
                | CorrNetError::Chem(ChemError::CandidateOverflow { .. })
                | CorrNetError::Chem(ChemError::InvalidLibrary(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, CorrNetError>;
