//! Ion identities: adducts, in-source modifications, clusters and multimers.
//!
//! An [`IonIdentity`] describes how a neutral molecule `M` turns into an observed ion,
//! e.g. `[M+H]+`, `[2M+Na]+` or `[M-H2O+H]+`. Identities built along different paths
//! (e.g. `H + Na` vs. `Na + H`) compare equal because equality is structural: canonical
//! name, net mass difference, charge and molecule count.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{ChemError, Result};

/// Two mass differences closer than this are the same.
pub const MASS_EPSILON: f64 = 1e-9;

/// Whether a part carries charge (adduct) or only shifts the mass (modification).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartRole {
    Adduct,
    Modification,
}

/// A single raw ion change, e.g. `+Na` or `-H2O`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IonPart {
    pub name: String,
    /// signed mass difference for one molecule, e.g. 22.989218 for Na+
    pub mass: f64,
    /// signed charge, 0 for modifications
    #[serde(default)]
    pub charge: i32,
    pub role: PartRole,
}

impl IonPart {
    pub fn adduct(name: &str, mass: f64, charge: i32) -> Self {
        IonPart { name: name.to_string(), mass, charge, role: PartRole::Adduct }
    }

    pub fn modification(name: &str, mass: f64) -> Self {
        IonPart { name: name.to_string(), mass, charge: 0, role: PartRole::Modification }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ChemError::EmptyName);
        }
        if !self.mass.is_finite() {
            return Err(ChemError::NonFiniteMass { name: self.name.clone() });
        }
        if self.role == PartRole::Modification && self.charge != 0 {
            return Err(ChemError::InvalidLibrary(format!(
                "modification `{}` must not carry a charge", self.name
            )));
        }
        Ok(())
    }

    #[inline]
    fn canonical_cmp(&self, other: &IonPart) -> Ordering {
        self.name
            .cmp(&other.name)
            .then(OrderedFloat(self.mass).cmp(&OrderedFloat(other.mass)))
    }

    #[inline]
    fn same_as(&self, other: &IonPart) -> bool {
        self.name == other.name
            && self.charge == other.charge
            && (self.mass - other.mass).abs() < MASS_EPSILON
    }
}

/// Tagged composition of an identity. Both variants share one implementation
/// of combination, naming and equality on [`IonIdentity`].
#[derive(Clone, Debug, Serialize)]
pub enum IonComposition {
    /// exactly one raw part
    Atomic(IonPart),
    /// any number of adducts and modifications, kept in canonical order
    Combined { adducts: Vec<IonPart>, mods: Vec<IonPart> },
}

impl IonComposition {
    pub fn adducts(&self) -> &[IonPart] {
        match self {
            IonComposition::Atomic(p) if p.role == PartRole::Adduct => std::slice::from_ref(p),
            IonComposition::Atomic(_) => &[],
            IonComposition::Combined { adducts, .. } => adducts,
        }
    }

    pub fn modifications(&self) -> &[IonPart] {
        match self {
            IonComposition::Atomic(p) if p.role == PartRole::Modification => std::slice::from_ref(p),
            IonComposition::Atomic(_) => &[],
            IonComposition::Combined { mods, .. } => mods,
        }
    }
}

/// An ion identity `[yM ± parts]z±`.
#[derive(Clone, Debug, Serialize)]
pub struct IonIdentity {
    composition: IonComposition,
    molecules: u32,
    mass: f64,
    charge: i32,
    name: String,
}

impl IonIdentity {
    /// Builds an identity from raw parts. A single part yields an atomic identity.
    pub fn from_parts(mut adducts: Vec<IonPart>, mut mods: Vec<IonPart>, molecules: u32) -> Self {
        adducts.sort_by(IonPart::canonical_cmp);
        mods.sort_by(IonPart::canonical_cmp);

        // summing in canonical order keeps the mass bit-identical across construction paths
        let mass = mods.iter().chain(adducts.iter()).map(|p| p.mass).sum();
        let charge = adducts.iter().map(|p| p.charge).sum();
        let name = canonical_name(&adducts, &mods);

        let composition = match (adducts.len(), mods.len()) {
            (1, 0) => IonComposition::Atomic(adducts.remove(0)),
            (0, 1) => IonComposition::Atomic(mods.remove(0)),
            _ => IonComposition::Combined { adducts, mods },
        };

        IonIdentity { composition, molecules: molecules.max(1), mass, charge, name }
    }

    pub fn from_part(part: IonPart) -> Self {
        match part.role {
            PartRole::Adduct => Self::from_parts(vec![part], Vec::new(), 1),
            PartRole::Modification => Self::from_parts(Vec::new(), vec![part], 1),
        }
    }

    pub fn adduct(name: &str, mass: f64, charge: i32) -> Self {
        Self::from_part(IonPart::adduct(name, mass, charge))
    }

    pub fn modification(name: &str, mass: f64) -> Self {
        Self::from_part(IonPart::modification(name, mass))
    }

    /// The bare molecule `[M]`, assigned to the intact side of an in-source fragment pair.
    pub fn unmodified() -> Self {
        Self::from_parts(Vec::new(), Vec::new(), 1)
    }

    /// Sums mass and charge and concatenates parts. The molecule count is the larger of both.
    pub fn combine(&self, other: &IonIdentity) -> IonIdentity {
        let adducts = self.adducts().iter().chain(other.adducts()).cloned().collect();
        let mods = self.modifications().iter().chain(other.modifications()).cloned().collect();
        Self::from_parts(adducts, mods, self.molecules.max(other.molecules))
    }

    /// Applies all modifications of `modification` (its adducts are ignored).
    pub fn modified(&self, modification: &IonIdentity) -> IonIdentity {
        let mods = self.modifications().iter().chain(modification.modifications()).cloned().collect();
        Self::from_parts(self.adducts().to_vec(), mods, self.molecules)
    }

    pub fn with_molecules(&self, molecules: u32) -> IonIdentity {
        let mut ion = self.clone();
        ion.molecules = molecules.max(1);
        ion
    }

    pub fn composition(&self) -> &IonComposition {
        &self.composition
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self.composition, IonComposition::Atomic(_))
    }

    pub fn adducts(&self) -> &[IonPart] {
        self.composition.adducts()
    }

    pub fn modifications(&self) -> &[IonPart] {
        self.composition.modifications()
    }

    /// Canonical name, e.g. `-2H+Na` or `-H2O+H`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mass_difference(&self) -> f64 {
        self.mass
    }

    pub fn charge(&self) -> i32 {
        self.charge
    }

    pub fn abs_charge(&self) -> u32 {
        self.charge.unsigned_abs()
    }

    pub fn molecules(&self) -> u32 {
        self.molecules
    }

    pub fn mod_count(&self) -> usize {
        self.modifications().len()
    }

    pub fn has_mods(&self) -> bool {
        !self.modifications().is_empty()
    }

    pub fn is_unmodified(&self) -> bool {
        self.adducts().is_empty() && self.modifications().is_empty()
    }

    /// In-source fragment or cluster: carries modifications or no charge at all.
    pub fn is_fragment(&self) -> bool {
        self.has_mods() || self.charge == 0
    }

    /// Neutral mass of `M` for an ion observed at `mz`: `(mz·|z| − Δ) / mol`.
    /// `None` for uncharged identities.
    #[inline]
    pub fn neutral_mass(&self, mz: f64) -> Option<f64> {
        if self.charge == 0 {
            return None;
        }
        Some((mz * self.abs_charge() as f64 - self.mass) / self.molecules as f64)
    }

    /// m/z of this ion for neutral mass `M`: `(M·mol + Δ) / |z|`.
    #[inline]
    pub fn mz(&self, neutral_mass: f64) -> Option<f64> {
        if self.charge == 0 {
            return None;
        }
        Some((neutral_mass * self.molecules as f64 + self.mass) / self.abs_charge() as f64)
    }

    /// Same mass difference, charge and molecule count.
    /// Whether both identities carry an equal adduct or an equal modification.
    pub fn shares_parts_with(&self, other: &IonIdentity) -> bool {
        let shared = |a: &[IonPart], b: &[IonPart]| a.iter().any(|x| b.iter().any(|y| x.same_as(y)));
        shared(self.adducts(), other.adducts()) || shared(self.modifications(), other.modifications())
    }

    pub fn same_math(&self, other: &IonIdentity) -> bool {
        (self.mass - other.mass).abs() < MASS_EPSILON
            && self.charge == other.charge
            && self.molecules == other.molecules
    }

    /// True iff every modification of `self` is present, with multiplicity, in `other`.
    pub fn is_subset_of(&self, other: &IonIdentity) -> bool {
        let mut pool: Vec<&IonPart> = other.modifications().iter().collect();
        for m in self.modifications() {
            match pool.iter().position(|p| p.same_as(m)) {
                Some(pos) => {
                    pool.swap_remove(pos);
                }
                None => return false,
            }
        }
        true
    }

    /// Same adducts, charge and molecules, but `self` carries strictly more modifications
    /// that include all of `other`'s.
    pub fn is_modification_of(&self, other: &IonIdentity) -> bool {
        self.molecules == other.molecules
            && self.charge == other.charge
            && self.has_mods()
            && self.mod_count() > other.mod_count()
            && same_parts(self.adducts(), other.adducts())
            && other.is_subset_of(self)
    }

    /// Modifications of `self` that are not in `other`, as an uncharged identity.
    pub fn subtract_mods(&self, other: &IonIdentity) -> IonIdentity {
        let mut remove: Vec<&IonPart> = other.modifications().iter().collect();
        let mut left = Vec::new();
        for m in self.modifications() {
            match remove.iter().position(|p| p.same_as(m)) {
                Some(pos) => {
                    remove.swap_remove(pos);
                }
                None => left.push(m.clone()),
            }
        }
        Self::from_parts(Vec::new(), left, 1)
    }

    /// Only the modifications of this identity, or `None` if it has none.
    pub fn modifications_only(&self) -> Option<IonIdentity> {
        if !self.has_mods() {
            return None;
        }
        Some(Self::from_parts(Vec::new(), self.modifications().to_vec(), 1))
    }
}

impl PartialEq for IonIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.same_math(other)
    }
}

impl Display for IonIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mol = if self.molecules > 1 { self.molecules.to_string() } else { String::new() };
        let z = match self.abs_charge() {
            0 | 1 => String::new(),
            n => n.to_string(),
        };
        let sign = match self.charge.cmp(&0) {
            Ordering::Greater => "+",
            Ordering::Less => "-",
            Ordering::Equal => "",
        };
        write!(f, "[{}M{}]{}{}", mol, self.name, z, sign)
    }
}

fn same_parts(a: &[IonPart], b: &[IonPart]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
}

/// Mods first, then adducts. Runs of the same name and sign collapse to a count.
fn canonical_name(adducts: &[IonPart], mods: &[IonPart]) -> String {
    let mut name = String::new();
    append_group(&mut name, mods);
    append_group(&mut name, adducts);
    name
}

fn append_group(out: &mut String, sorted: &[IonPart]) {
    for (count, part) in sorted
        .iter()
        .dedup_by_with_count(|a, b| a.name == b.name && (a.mass < 0.0) == (b.mass < 0.0))
    {
        out.push(if part.mass < 0.0 { '-' } else { '+' });
        if count > 1 {
            out.push_str(&count.to_string());
        }
        out.push_str(&part.name);
    }
}
