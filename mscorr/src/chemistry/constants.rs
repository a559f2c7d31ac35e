// Purpose: ion masses used to build adducts, in-source modifications and isotopes
pub const MASS_PROTON: f64 = 1.007276; // [M+H]+ mass difference, Da
pub const MASS_ELECTRON: f64 = 0.00054858; // Da
pub const MASS_SODIUM_ION: f64 = 22.989218; // Na+
pub const MASS_AMMONIUM_ION: f64 = 18.033823; // NH4+
pub const MASS_POTASSIUM_ION: f64 = 38.963158; // K+
pub const MASS_CALCIUM_ION: f64 = 39.961493820; // Ca2+
pub const MASS_IRON_ION: f64 = 55.933840; // Fe2+

// negative mode
pub const MASS_CHLORIDE_ION: f64 = 34.969401; // Cl-
pub const MASS_BROMIDE_ION: f64 = 78.918886; // Br-
pub const MASS_FORMATE_ION: f64 = 44.99820285; // HCOO-

// neutral losses (negative) and clusters (positive)
pub const MASS_WATER: f64 = 18.010565;
pub const MASS_AMMONIA: f64 = 17.026549;
pub const MASS_CARBON_MONOXIDE: f64 = 27.994915;
pub const MASS_CARBON_DIOXIDE: f64 = 43.989829;
pub const MASS_ETHENE: f64 = 28.031301;
pub const MASS_FORMIC_ACID: f64 = 46.005479;
pub const MASS_ACETIC_ACID: f64 = 60.021129;
pub const MASS_METHANOL: f64 = 32.026215;
pub const MASS_ACETONITRILE: f64 = 41.026549;
pub const MASS_ISOPROPANOL: f64 = 60.058064;

// isotopes
pub const MASS_C13_SHIFT: f64 = 1.003354838; // 13C - 12C
