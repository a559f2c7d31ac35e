//! MS/MS corroboration of adduct links.
//!
//! Two kinds of evidence raise a link's confidence:
//! - multimer: a `[nM..]` link whose MS/MS holds the same ion at a lower multiplicity
//! - neutral loss: a fragment link whose m/z shows up in the MS/MS of a less modified partner

use log::{debug, info, warn};
use mscorr::data::feature::FeatureRow;
use serde::Serialize;

use crate::annotation::link::{AdductLink, LinkGraph, LinkId};
use crate::config::{MsMsCheckParams, NeutralLossMode};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MultimerEvidence {
    /// multiplicity of the fragment ion found, e.g. 1 for `[M+H]+` in a `[2M+H]+` spectrum
    pub molecules: u32,
    pub mz: f64,
    pub intensity: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NeutralLossEvidence {
    /// row whose MS/MS holds the signal
    pub partner: u32,
    pub modification: String,
    pub mz: f64,
    pub intensity: f64,
}

/// Looks for lower multiplicities of a multimer link in its own row's MS/MS.
pub fn check_multimer(link: &AdductLink, row: &FeatureRow, params: &MsMsCheckParams) -> Option<MultimerEvidence> {
    let n = link.identity.molecules();
    if n < 2 {
        return None;
    }
    let msms = row.msms.as_ref().filter(|s| !s.is_empty())?;
    let mass = link.identity.neutral_mass(row.mz)?;
    (1..n).find_map(|k| {
        let mz = link.identity.with_molecules(k).mz(mass)?;
        msms.find_peak_at(mz, &params.mz_tolerance, params.min_height)
            .map(|(mz, intensity)| MultimerEvidence { molecules: k, mz, intensity })
    })
}

/// Looks for a fragment link's signal in the MS/MS of its less modified partners.
pub fn check_neutral_loss<'a, F>(
    link: &AdductLink,
    row: &FeatureRow,
    graph: &LinkGraph,
    lookup: &F,
    params: &MsMsCheckParams,
) -> Option<NeutralLossEvidence>
where
    F: Fn(u32) -> Option<&'a FeatureRow>,
{
    let modification = link.identity.modifications_only()?;
    for (&partner_row, &partner_link) in &link.partners {
        let Some(partner) = graph.get(partner_link) else { continue };
        if partner.identity.mod_count() >= link.identity.mod_count() {
            continue;
        }
        let Some(msms) = lookup(partner_row).and_then(|r| r.msms.as_ref()) else { continue };

        if let Some((mz, intensity)) = msms.find_peak_at(row.mz, &params.mz_tolerance, params.min_height) {
            return Some(NeutralLossEvidence {
                partner: partner_row,
                modification: modification.name().to_string(),
                mz,
                intensity,
            });
        }
        if params.neutral_loss_mode == NeutralLossMode::AnySignal {
            let delta = modification.mass_difference() / link.identity.abs_charge().max(1) as f64;
            let hits = msms.find_mass_differences(delta, &params.mz_tolerance, params.min_height);
            if let Some(&(_, (mz, intensity))) = hits.iter().max_by(|a, b| a.1 .1.total_cmp(&b.1 .1)) {
                return Some(NeutralLossEvidence {
                    partner: partner_row,
                    modification: modification.name().to_string(),
                    mz,
                    intensity,
                });
            }
        }
    }
    None
}

/// Counts of links that gained evidence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MsMsSummary {
    pub multimers: usize,
    pub neutral_losses: usize,
}

/// Checks every live link and attaches the evidence found.
pub fn check_links<'a, F>(graph: &mut LinkGraph, lookup: &F, params: &MsMsCheckParams) -> MsMsSummary
where
    F: Fn(u32) -> Option<&'a FeatureRow>,
{
    let mut found: Vec<(LinkId, Option<MultimerEvidence>, Option<NeutralLossEvidence>)> = Vec::new();
    for link in graph.live() {
        let Some(row) = lookup(link.row) else {
            warn!("link {} refers to unknown row {}", link.id, link.row);
            continue;
        };
        let multimer = if params.check_multimers { check_multimer(link, row, params) } else { None };
        let loss = if params.check_neutral_losses {
            check_neutral_loss(link, row, graph, lookup, params)
        } else {
            None
        };
        if multimer.is_some() || loss.is_some() {
            debug!(
                "row {} {}: multimer {:?}, neutral loss {:?}",
                link.row, link.identity, multimer.as_ref().map(|m| m.molecules), loss.as_ref().map(|l| l.partner)
            );
            found.push((link.id, multimer, loss));
        }
    }

    let mut summary = MsMsSummary::default();
    for (id, multimer, loss) in found {
        if let Some(link) = graph.get_mut(id) {
            summary.multimers += multimer.is_some() as usize;
            summary.neutral_losses += loss.is_some() as usize;
            link.multimer = multimer;
            link.neutral_loss = loss;
        }
    }
    info!(
        "MS/MS check: {} multimer and {} neutral loss corroborations",
        summary.multimers, summary.neutral_losses
    );
    summary
}
