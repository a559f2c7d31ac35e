pub mod error;

// chemistry module
pub mod chemistry {
    pub mod constants;
    pub mod ion;
    pub mod library;
}

// algorithm module
pub mod algorithm {
    pub mod correlation;
    pub mod tolerance;
}

// data module
pub mod data {
    pub mod feature;
    pub mod spectrum;
}

pub use error::{ChemError, Result};
