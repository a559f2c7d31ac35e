//! Run reports.
//!
//! A [`RunReport`] is the serializable view of a run: one entry per row with its group,
//! preferred ion and network, plus the groups and networks themselves. Rows can also be
//! rendered as flag lines (`CORR_GROUPID=`, `COMPOUND_ID=`, `COMPOUND_MASS=`, `ION=`).

use std::io::Write;

use mscorr::data::feature::FeatureRow;
use serde::Serialize;

use crate::annotation::network::AnnotationNetwork;
use crate::error::Result;
use crate::grouping::filter::FilterDiagnostics;
use crate::grouping::group::GroupStats;
use crate::run::{RunOutcome, RunResults};

#[derive(Clone, Debug, Serialize)]
pub struct LinkReport {
    pub ion: String,
    pub confidence: usize,
    pub partners: Vec<u32>,
    pub network: Option<u32>,
    pub msms_multimer: bool,
    pub msms_neutral_loss: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct RowReport {
    pub id: u32,
    pub mz: f64,
    pub rt: f64,
    pub group: Option<u32>,
    /// rows with a valid correlation to this one
    pub correlated: Vec<u32>,
    pub network: Option<u32>,
    pub neutral_mass: Option<f64>,
    /// display name of the preferred link
    pub ion: Option<String>,
    /// all live links, preferred first
    pub links: Vec<LinkReport>,
}

impl RowReport {
    /// Flag lines of this row, each only when the value is present.
    pub fn flags(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(g) = self.group {
            out.push(format!("CORR_GROUPID={g}"));
        }
        if let Some(n) = self.network {
            out.push(format!("COMPOUND_ID={n}"));
        }
        if let Some(m) = self.neutral_mass {
            out.push(format!("COMPOUND_MASS={m:.4}"));
        }
        if let Some(ion) = &self.ion {
            out.push(format!("ION={ion}"));
        }
        out
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct GroupReport {
    pub id: u32,
    pub rows: Vec<u32>,
    pub avg_rt: f64,
    pub stats: GroupStats,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub canceled: bool,
    pub matched_pairs: usize,
    pub correlated_pairs: usize,
    pub row_filter: FilterDiagnostics,
    pub rows: Vec<RowReport>,
    pub groups: Vec<GroupReport>,
    pub networks: Vec<AnnotationNetwork>,
}

impl RunReport {
    pub fn new(rows: &[FeatureRow], outcome: &RunOutcome) -> Self {
        let results = outcome.results();
        RunReport {
            canceled: outcome.is_canceled(),
            matched_pairs: results.matched_pairs,
            correlated_pairs: results.correlations.len(),
            row_filter: results.grouping.row_filter.clone(),
            rows: rows.iter().map(|r| row_report(r, results)).collect(),
            groups: results
                .grouping
                .groups
                .iter()
                .map(|g| GroupReport { id: g.id, rows: g.rows().to_vec(), avg_rt: g.avg_rt(), stats: g.stats().clone() })
                .collect(),
            networks: results.networks.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// One line per annotated row: `<row id>\t<flag>;<flag>;...`.
    pub fn write_flags<W: Write>(&self, mut out: W) -> Result<()> {
        for row in &self.rows {
            let flags = row.flags();
            if !flags.is_empty() {
                writeln!(out, "{}\t{}", row.id, flags.join(";"))?;
            }
        }
        Ok(())
    }
}

fn row_report(row: &FeatureRow, results: &RunResults) -> RowReport {
    let links: Vec<LinkReport> = results
        .links
        .ranked(row.id)
        .into_iter()
        .filter_map(|id| results.links.get(id))
        .map(|l| LinkReport {
            ion: l.identity.to_string(),
            confidence: l.confidence(),
            partners: l.partners.keys().copied().collect(),
            network: l.network,
            msms_multimer: l.multimer.is_some(),
            msms_neutral_loss: l.neutral_loss.is_some(),
        })
        .collect();

    let preferred = results.links.preferred(row.id);
    let network = preferred.and_then(|l| l.network);
    let neutral_mass = network
        .and_then(|id| results.networks.iter().find(|n| n.id == id))
        .and_then(|n| n.neutral_mass);

    RowReport {
        id: row.id,
        mz: row.mz,
        rt: row.rt,
        group: results.grouping.group_of(row.id),
        correlated: results.correlations.neighbours(row.id),
        network,
        neutral_mass,
        ion: preferred.map(|l| l.identity.to_string()),
        links,
    }
}
