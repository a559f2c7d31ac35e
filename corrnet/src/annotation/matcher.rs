//! Pairwise ion identity matching.
//!
//! Two rows match when the neutral mass implied by one identity on row A predicts the
//! m/z of row B under another identity, within the m/z tolerance. Only the first
//! matching identity pair is kept per row pair.

use mscorr::chemistry::ion::IonIdentity;
use mscorr::chemistry::library::IonLibrary;
use mscorr::data::feature::FeatureRow;

use crate::config::{AnnotationParams, CheckMode};

/// Identities assigned to both rows of a matching pair.
#[derive(Clone, Debug, PartialEq)]
pub struct IonMatch {
    pub ion_a: IonIdentity,
    pub ion_b: IonIdentity,
}

pub struct AnnotationMatcher {
    library: IonLibrary,
    params: AnnotationParams,
}

impl AnnotationMatcher {
    pub fn new(library: IonLibrary, params: AnnotationParams) -> Self {
        AnnotationMatcher { library, params }
    }

    pub fn library(&self) -> &IonLibrary {
        &self.library
    }

    pub fn params(&self) -> &AnnotationParams {
        &self.params
    }

    /// First identity pair explaining `a` and `b` as ions of one molecule.
    pub fn find_match(&self, a: &FeatureRow, b: &FeatureRow) -> Option<IonMatch> {
        if a.id == b.id {
            return None;
        }
        let candidates = self.library.candidates();
        for ia in candidates.iter().filter(|i| fits_row_charge(i, a)) {
            for ib in candidates.iter().filter(|i| fits_row_charge(i, b)) {
                if !allowed_pair(ia, ib) {
                    continue;
                }
                if self.check(a, ia, b, ib) {
                    return Some(assign(ia, ib));
                }
            }
        }
        None
    }

    /// m/z agreement of `b` with the value predicted from `a`, per check mode.
    pub fn check(&self, a: &FeatureRow, ia: &IonIdentity, b: &FeatureRow, ib: &IonIdentity) -> bool {
        let tol = &self.params.mz_tolerance;
        let agrees = |mz_a: f64, mz_b: f64| {
            ia.neutral_mass(mz_a)
                .and_then(|m| ib.mz(m))
                .is_some_and(|expected| tol.matches(expected, mz_b))
        };
        match self.params.check_mode {
            CheckMode::Average => agrees(a.mz, b.mz),
            CheckMode::OneFeature => self.shared_features(a, b).any(|(fa, fb)| agrees(fa, fb)),
            CheckMode::AllFeatures => {
                let shared: Vec<(f64, f64)> = self.shared_features(a, b).collect();
                !shared.is_empty() && shared.iter().all(|&(fa, fb)| agrees(fa, fb))
            }
        }
    }

    /// Feature m/z of both rows in raw files where both are above `min_height`.
    fn shared_features<'r>(&'r self, a: &'r FeatureRow, b: &'r FeatureRow) -> impl Iterator<Item = (f64, f64)> + 'r {
        let min_height = self.params.min_height;
        a.features.iter().filter_map(move |(raw, fa)| {
            let fb = b.features.get(raw)?;
            (fa.height >= min_height && fb.height >= min_height).then_some((fa.mz, fb.mz))
        })
    }
}

/// A known row charge must equal the identity's absolute charge.
#[inline]
fn fits_row_charge(ion: &IonIdentity, row: &FeatureRow) -> bool {
    row.charge == 0 || ion.abs_charge() == row.abs_charge()
}

#[inline]
fn allowed_pair(ia: &IonIdentity, ib: &IonIdentity) -> bool {
    if ia == ib {
        return false;
    }
    // [2M+H]+ vs [2M+Na]+ is explained by [M+H]+ vs [M+Na]+
    if ia.molecules() > 1 && ia.molecules() == ib.molecules() {
        return false;
    }
    // [M+Fe]2+ vs [M+Fe-H]+ differ only by a proton
    if ia.charge() != ib.charge() && ia.shares_parts_with(ib) {
        return false;
    }
    !(ia.has_mods() && ib.has_mods())
}

/// In-source fragments: the intact side becomes `[M]`, the fragment side only carries
/// the modifications.
fn assign(ia: &IonIdentity, ib: &IonIdentity) -> IonMatch {
    if ia.is_modification_of(ib) {
        IonMatch { ion_a: ia.subtract_mods(ib), ion_b: IonIdentity::unmodified() }
    } else if ib.is_modification_of(ia) {
        IonMatch { ion_a: IonIdentity::unmodified(), ion_b: ib.subtract_mods(ia) }
    } else {
        IonMatch { ion_a: ia.clone(), ion_b: ib.clone() }
    }
}
