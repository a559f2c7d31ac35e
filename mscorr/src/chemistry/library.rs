//! Enumeration of the ion identity candidate space.
//!
//! The space is built once per run from the configured adducts and modifications:
//!
//! 1. adduct combinations of up to `max_combination` parts whose net charge matches the
//!    polarity and does not exceed `max_charge`
//! 2. hydrogen-adjusted variants (optional): multiply charged adducts lose protons down to
//!    a single charge (`[M+Fe]2+` gives `[M+Fe-H]+`), adducts of the other polarity gain
//!    protons until they fit the polarity (`[M-2H+Na]-`, `[M-3H+Na]2-`)
//! 3. every adduct combination with every modification combination of up to `max_mods` parts
//! 4. multimers `2M..max_molecules M` of all of the above
//!
//! The number of candidates is capped by `max_candidates`; exceeding the cap is an error.

use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::chemistry::constants::*;
use crate::chemistry::ion::{IonIdentity, IonPart, PartRole};
use crate::error::{ChemError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    #[inline]
    pub fn accepts(&self, charge: i32) -> bool {
        match self {
            Polarity::Positive => charge > 0,
            Polarity::Negative => charge < 0,
        }
    }
}

pub fn default_positive_adducts() -> Vec<IonPart> {
    vec![
        IonPart::adduct("H", MASS_PROTON, 1),
        IonPart::adduct("Na", MASS_SODIUM_ION, 1),
        IonPart::adduct("NH4", MASS_AMMONIUM_ION, 1),
        IonPart::adduct("K", MASS_POTASSIUM_ION, 1),
        IonPart::adduct("Ca", MASS_CALCIUM_ION, 2),
        IonPart::adduct("Fe", MASS_IRON_ION, 2),
    ]
}

/// Na is kept so that combinations like `[M-2H+Na]-` can be formed.
pub fn default_negative_adducts() -> Vec<IonPart> {
    vec![
        IonPart::adduct("H", -MASS_PROTON, -1),
        IonPart::adduct("Na", MASS_SODIUM_ION, 1),
        IonPart::adduct("Cl", MASS_CHLORIDE_ION, -1),
        IonPart::adduct("Br", MASS_BROMIDE_ION, -1),
        IonPart::adduct("FA", MASS_FORMATE_ION, -1),
    ]
}

pub fn default_modifications() -> Vec<IonPart> {
    vec![
        IonPart::modification("H2O", -MASS_WATER),
        IonPart::modification("NH3", -MASS_AMMONIA),
        IonPart::modification("CO", -MASS_CARBON_MONOXIDE),
        IonPart::modification("CO2", -MASS_CARBON_DIOXIDE),
        IonPart::modification("C2H4", -MASS_ETHENE),
        IonPart::modification("HFA", MASS_FORMIC_ACID),
        IonPart::modification("HAc", MASS_ACETIC_ACID),
        IonPart::modification("MeOH", MASS_METHANOL),
        IonPart::modification("ACN", MASS_ACETONITRILE),
        IonPart::modification("IsoProp", MASS_ISOPROPANOL),
    ]
}

/// Radical cation `[M-e]+`, not part of the defaults.
pub fn electron_loss() -> IonPart {
    IonPart::adduct("e", -MASS_ELECTRON, 1)
}

pub fn isotope_c13() -> IonPart {
    IonPart::modification("(13C)", MASS_C13_SHIFT)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IonLibraryParams {
    pub polarity: Polarity,
    pub adducts: Vec<IonPart>,
    pub modifications: Vec<IonPart>,
    pub max_charge: u32,      // e.g. 2
    pub max_molecules: u32,   // e.g. 2 -> [M..] and [2M..]
    pub max_combination: u32, // adduct parts per identity
    pub max_mods: u32,        // modification parts per identity, 0 disables
    pub max_candidates: usize,
    /// add proton gain/loss variants of the adduct combinations
    pub adjust_hydrogen: bool,
}

impl Default for IonLibraryParams {
    fn default() -> Self {
        Self {
            polarity: Polarity::Positive,
            adducts: default_positive_adducts(),
            modifications: default_modifications(),
            max_charge: 2,
            max_molecules: 2,
            max_combination: 2,
            max_mods: 1,
            max_candidates: 5_000,
            adjust_hydrogen: true,
        }
    }
}

impl IonLibraryParams {
    /// Default tables for negative mode.
    pub fn negative() -> Self {
        Self {
            polarity: Polarity::Negative,
            adducts: default_negative_adducts(),
            max_combination: 3,
            ..Self::default()
        }
    }

    /// Plain adducts only: no modifications, no multimers.
    pub fn adducts_only(adducts: Vec<IonPart>) -> Self {
        Self {
            adducts,
            modifications: Vec::new(),
            max_molecules: 1,
            max_combination: 1,
            max_mods: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.adducts.is_empty() {
            return Err(ChemError::InvalidLibrary("no adducts configured".into()));
        }
        if self.max_charge == 0 || self.max_molecules == 0 || self.max_combination == 0 {
            return Err(ChemError::InvalidLibrary(
                "max_charge, max_molecules and max_combination must be at least 1".into(),
            ));
        }
        for a in &self.adducts {
            a.validate()?;
            if a.role != PartRole::Adduct || a.charge == 0 {
                return Err(ChemError::InvalidLibrary(format!("`{}` is not a charged adduct", a.name)));
            }
        }
        for m in &self.modifications {
            m.validate()?;
            if m.role != PartRole::Modification {
                return Err(ChemError::InvalidLibrary(format!("`{}` is not a modification", m.name)));
            }
        }
        Ok(())
    }
}

/// The enumerated candidate identity space of one run.
#[derive(Clone, Debug)]
pub struct IonLibrary {
    params: IonLibraryParams,
    candidates: Vec<IonIdentity>,
    modifications: Vec<IonIdentity>,
}

impl IonLibrary {
    pub fn build(params: &IonLibraryParams) -> Result<Self> {
        params.validate()?;
        let cap = params.max_candidates;
        let mut candidates: Vec<IonIdentity> = Vec::new();

        // ---- 1) ADDUCT COMBINATIONS ----
        for k in 1..=params.max_combination as usize {
            for combo in params.adducts.iter().combinations_with_replacement(k) {
                let ion = IonIdentity::from_parts(combo.into_iter().cloned().collect(), Vec::new(), 1);
                if params.polarity.accepts(ion.charge())
                    && ion.abs_charge() <= params.max_charge
                    && !candidates.contains(&ion)
                {
                    push_capped(&mut candidates, ion, cap)?;
                }
            }
        }
        if params.adjust_hydrogen {
            adjust_hydrogen(params, &mut candidates)?;
        }
        let n_adducts = candidates.len();

        // ---- 3) MODIFICATION COMBINATIONS ----
        let mut modifications: Vec<IonIdentity> = Vec::new();
        for k in 1..=params.max_mods as usize {
            for combo in params.modifications.iter().combinations_with_replacement(k) {
                let m = IonIdentity::from_parts(Vec::new(), combo.into_iter().cloned().collect(), 1);
                if !modifications.contains(&m) {
                    modifications.push(m);
                }
            }
        }
        for i in 0..n_adducts {
            for m in &modifications {
                let ion = candidates[i].modified(m);
                push_capped(&mut candidates, ion, cap)?;
            }
        }

        // ---- 4) MULTIMERS ----
        let n_single = candidates.len();
        for i in 0..n_single {
            for mol in 2..=params.max_molecules {
                let ion = candidates[i].with_molecules(mol);
                push_capped(&mut candidates, ion, cap)?;
            }
        }

        info!(
            "ion library: {} candidates ({} adducts, {} modification sets, up to {}M)",
            candidates.len(), n_adducts, modifications.len(), params.max_molecules
        );
        for c in &candidates {
            debug!("candidate {} ({:.6})", c, c.mass_difference());
        }

        Ok(IonLibrary { params: params.clone(), candidates, modifications })
    }

    pub fn candidates(&self) -> &[IonIdentity] {
        &self.candidates
    }

    pub fn modifications(&self) -> &[IonIdentity] {
        &self.modifications
    }

    pub fn params(&self) -> &IonLibraryParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// ---- 2) HYDROGEN ADJUSTMENT ----
fn adjust_hydrogen(params: &IonLibraryParams, candidates: &mut Vec<IonIdentity>) -> Result<()> {
    let cap = params.max_candidates;
    let sign = match params.polarity {
        Polarity::Positive => 1,
        Polarity::Negative => -1,
    };
    let gain = IonIdentity::adduct("H", sign as f64 * MASS_PROTON, sign);
    let loss = IonIdentity::adduct("H", -sign as f64 * MASS_PROTON, -sign);

    // [M+Fe]2+ -> [M+Fe-H]+, skipping sums that already carry protons of the polarity
    let n = candidates.len();
    for i in 0..n {
        if candidates[i].adducts().iter().any(|p| p.name == "H" && p.charge == sign) {
            continue;
        }
        let mut ion = candidates[i].clone();
        while ion.abs_charge() > 1 {
            ion = ion.combine(&loss);
            if !candidates.contains(&ion) {
                push_capped(candidates, ion.clone(), cap)?;
            }
        }
    }

    // Na+ in negative mode -> [M-2H+Na]-, [M-3H+Na]2- ...
    for a in params.adducts.iter().filter(|a| !params.polarity.accepts(a.charge)) {
        let mut ion = IonIdentity::from_part(a.clone());
        for _ in 0..=a.charge.unsigned_abs() {
            ion = ion.combine(&gain);
        }
        while ion.abs_charge() <= params.max_charge {
            if !candidates.contains(&ion) {
                push_capped(candidates, ion.clone(), cap)?;
            }
            ion = ion.combine(&gain);
        }
    }
    Ok(())
}

#[inline]
fn push_capped(list: &mut Vec<IonIdentity>, ion: IonIdentity, cap: usize) -> Result<()> {
    if list.len() >= cap {
        return Err(ChemError::CandidateOverflow { count: list.len() + 1, cap });
    }
    list.push(ion);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adducts_only_library() {
        let params = IonLibraryParams::adducts_only(vec![
            IonPart::adduct("H", MASS_PROTON, 1),
            IonPart::adduct("Na", MASS_SODIUM_ION, 1),
        ]);
        let lib = IonLibrary::build(&params).unwrap();
        let names: Vec<String> = lib.candidates().iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["[M+H]+", "[M+Na]+"]);
    }

    #[test]
    fn test_polarity_and_charge_filters() {
        let params = IonLibraryParams {
            modifications: Vec::new(),
            max_mods: 0,
            max_molecules: 1,
            max_combination: 2,
            max_charge: 1,
            ..IonLibraryParams::default()
        };
        let lib = IonLibrary::build(&params).unwrap();
        assert!(lib.candidates().iter().all(|c| c.charge() == 1));
        // Ca and Fe are doubly charged
        assert!(!lib.candidates().iter().any(|c| c.name().contains("Ca")));
    }

    #[test]
    fn test_negative_mode_combinations() {
        let lib = IonLibrary::build(&IonLibraryParams {
            modifications: Vec::new(),
            max_mods: 0,
            max_molecules: 1,
            ..IonLibraryParams::negative()
        })
        .unwrap();
        assert!(lib.candidates().iter().all(|c| c.charge() < 0));
        assert!(lib.candidates().iter().any(|c| c.name() == "-2H+Na"));
        assert!(!lib.candidates().iter().any(|c| c.name() == "+Na"));
    }

    #[test]
    fn test_hydrogen_adjusted_variants() {
        let params = IonLibraryParams {
            modifications: Vec::new(),
            max_mods: 0,
            max_molecules: 1,
            max_combination: 1,
            ..IonLibraryParams::default()
        };
        let lib = IonLibrary::build(&params).unwrap();
        let names: Vec<String> = lib.candidates().iter().map(|c| c.to_string()).collect();
        assert!(names.contains(&"[M+Fe-H]+".to_string()));
        assert!(names.contains(&"[M+Ca-H]+".to_string()));
        assert!(names.contains(&"[M+Fe]2+".to_string()));
        let fe = lib.candidates().iter().find(|c| c.name() == "+Fe-H").unwrap();
        assert_eq!(fe.charge(), 1);
        assert!((fe.mass_difference() - (MASS_IRON_ION - MASS_PROTON)).abs() < 1e-9);

        let plain = IonLibrary::build(&IonLibraryParams { adjust_hydrogen: false, ..params }).unwrap();
        assert_eq!(plain.len() + 2, lib.len());
        assert!(!plain.candidates().iter().any(|c| c.name() == "+Fe-H"));
    }

    #[test]
    fn test_negative_mode_gains_protons_on_cations() {
        let lib = IonLibrary::build(&IonLibraryParams {
            modifications: Vec::new(),
            max_mods: 0,
            max_molecules: 1,
            max_combination: 1,
            ..IonLibraryParams::negative()
        })
        .unwrap();
        let na: Vec<String> = lib
            .candidates()
            .iter()
            .filter(|c| c.name().contains("Na"))
            .map(|c| c.to_string())
            .collect();
        assert_eq!(na, vec!["[M-2H+Na]-", "[M-3H+Na]2-"]);
    }

    #[test]
    fn test_modifications_and_multimers() {
        let params = IonLibraryParams {
            adducts: vec![IonPart::adduct("H", MASS_PROTON, 1)],
            modifications: vec![IonPart::modification("H2O", -MASS_WATER)],
            max_combination: 1,
            max_mods: 1,
            max_molecules: 2,
            ..IonLibraryParams::default()
        };
        let lib = IonLibrary::build(&params).unwrap();
        let names: Vec<String> = lib.candidates().iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["[M+H]+", "[M-H2O+H]+", "[2M+H]+", "[2M-H2O+H]+"]);
        assert_eq!(lib.modifications().len(), 1);
    }

    #[test]
    fn test_candidate_overflow_is_an_error() {
        let params = IonLibraryParams {
            max_candidates: 10,
            max_mods: 2,
            max_molecules: 3,
            ..IonLibraryParams::default()
        };
        match IonLibrary::build(&params) {
            Err(ChemError::CandidateOverflow { cap, .. }) => assert_eq!(cap, 10),
            other => panic!("expected overflow, got {:?}", other.map(|l| l.len())),
        }
    }

    #[test]
    fn test_invalid_params() {
        let params = IonLibraryParams { adducts: Vec::new(), ..IonLibraryParams::default() };
        assert!(IonLibrary::build(&params).is_err());
        let params = IonLibraryParams {
            adducts: vec![IonPart::modification("H2O", -MASS_WATER)],
            ..IonLibraryParams::default()
        };
        assert!(params.validate().is_err());
        assert_eq!(electron_loss().charge, 1);
        assert!(isotope_c13().validate().is_ok());
    }
}
