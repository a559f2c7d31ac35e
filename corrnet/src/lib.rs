pub mod error;
pub mod config;

pub mod correlation {
    pub mod pair;
    pub mod map;
}

pub mod grouping {
    pub mod filter;
    pub mod group;
}

pub mod annotation {
    pub mod link;
    pub mod matcher;
    pub mod msms;
    pub mod network;
    pub mod refine;
}

pub mod export;
pub mod run;

pub use error::{CorrNetError, Result};
