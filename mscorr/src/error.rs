use thiserror::Error;

/// Errors raised while building ion identities, libraries or feature data.
#[derive(Debug, Error)]
pub enum ChemError {
    #[error("ion part `{name}` has a non-finite mass difference")]
    NonFiniteMass { name: String },

    #[error("ion part without a name")]
    EmptyName,

    #[error("{count} ion identity candidates exceed the configured cap of {cap}")]
    CandidateOverflow { count: usize, cap: usize },

    #[error("invalid ion library parameters: {0}")]
    InvalidLibrary(String),

    #[error("trace of {len} scans starting at scan {first_scan} overflows the scan range")]
    ScanOverflow { first_scan: u32, len: usize },

    #[error("feature trace for raw file `{raw_file}` is malformed: {reason}")]
    MalformedTrace { raw_file: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ChemError>;
