//! Adduct links: one ion identity assigned to one row, plus its partners.
//!
//! Links are built concurrently in a [`LinkStore`] (one lock per row) and then frozen
//! into an arena-indexed [`LinkGraph`]. Partners are stored as `row -> link id`, so a
//! partner relation is symmetric by construction: if link `x` on row `a` lists row `b`
//! with link `y`, then `y` lists row `a` with link `x`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use mscorr::chemistry::ion::IonIdentity;
use serde::Serialize;

use crate::annotation::msms::{MultimerEvidence, NeutralLossEvidence};
use crate::error::{CorrNetError, Result};

/// Arena index of a link.
pub type LinkId = usize;

#[derive(Clone, Debug, Serialize)]
pub struct AdductLink {
    pub id: LinkId,
    pub row: u32,
    pub identity: IonIdentity,
    /// partner row -> partner link
    pub partners: BTreeMap<u32, LinkId>,
    pub network: Option<u32>,
    pub multimer: Option<MultimerEvidence>,
    pub neutral_loss: Option<NeutralLossEvidence>,
    pub deleted: bool,
}

impl AdductLink {
    /// `|partners|` plus one for each kind of MS/MS corroboration.
    pub fn confidence(&self) -> usize {
        self.partners.len() + self.multimer.is_some() as usize + self.neutral_loss.is_some() as usize
    }

    pub fn has_msms_evidence(&self) -> bool {
        self.multimer.is_some() || self.neutral_loss.is_some()
    }

    pub fn is_multimer(&self) -> bool {
        self.identity.molecules() > 1
    }

    /// Ranking used to pick the preferred link of a row: higher confidence first,
    /// then fewer modifications, then fewer molecules, then the older link.
    fn rank_cmp(&self, other: &AdductLink) -> std::cmp::Ordering {
        other
            .confidence()
            .cmp(&self.confidence())
            .then(self.identity.mod_count().cmp(&other.identity.mod_count()))
            .then(self.identity.molecules().cmp(&other.identity.molecules()))
            .then(self.id.cmp(&other.id))
    }
}

#[derive(Debug)]
struct PendingLink {
    identity: IonIdentity,
    /// partner row -> index into the partner row's pending list
    partners: BTreeMap<u32, usize>,
}

/// Concurrent builder: links of one row are guarded by that row's lock.
#[derive(Debug, Default)]
pub struct LinkStore {
    rows: HashMap<u32, Mutex<Vec<PendingLink>>>,
}

impl LinkStore {
    pub fn new<I: IntoIterator<Item = u32>>(row_ids: I) -> Self {
        LinkStore { rows: row_ids.into_iter().map(|id| (id, Mutex::new(Vec::new()))).collect() }
    }

    /// Finds the link of `row` with an equal identity or appends a new one.
    fn locate_or_create(&self, row: u32, identity: &IonIdentity) -> Result<usize> {
        let slot = self.rows.get(&row).ok_or(CorrNetError::UnknownRow(row))?;
        let mut links = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(i) = links.iter().position(|l| l.identity == *identity) {
            return Ok(i);
        }
        links.push(PendingLink { identity: identity.clone(), partners: BTreeMap::new() });
        Ok(links.len() - 1)
    }

    fn add_partner(&self, row: u32, idx: usize, partner_row: u32, partner_idx: usize) -> Result<()> {
        let slot = self.rows.get(&row).ok_or(CorrNetError::UnknownRow(row))?;
        let mut links = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(link) = links.get_mut(idx) {
            link.partners.insert(partner_row, partner_idx);
        }
        Ok(())
    }

    /// Records that `a` is `ion_a` and `b` is `ion_b` of the same molecule.
    ///
    /// Only one row lock is held at a time.
    pub fn link(&self, a: u32, ion_a: &IonIdentity, b: u32, ion_b: &IonIdentity) -> Result<()> {
        let ia = self.locate_or_create(a, ion_a)?;
        let ib = self.locate_or_create(b, ion_b)?;
        self.add_partner(a, ia, b, ib)?;
        self.add_partner(b, ib, a, ia)
    }

    /// Number of links on `row`.
    pub fn row_len(&self, row: u32) -> usize {
        self.rows
            .get(&row)
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .unwrap_or(0)
    }

    /// Assigns arena ids in ascending row order.
    pub fn freeze(self) -> LinkGraph {
        let mut pending: Vec<(u32, Vec<PendingLink>)> = self
            .rows
            .into_iter()
            .map(|(row, m)| (row, m.into_inner().unwrap_or_else(PoisonError::into_inner)))
            .collect();
        pending.sort_unstable_by_key(|(row, _)| *row);

        let mut offsets: HashMap<u32, usize> = HashMap::new();
        let mut next = 0;
        for (row, links) in &pending {
            offsets.insert(*row, next);
            next += links.len();
        }

        let mut graph = LinkGraph::default();
        for (row, links) in pending {
            for p in links {
                let id = graph.links.len();
                let partners = p
                    .partners
                    .into_iter()
                    .filter_map(|(r, i)| offsets.get(&r).map(|o| (r, o + i)))
                    .collect();
                graph.by_row.entry(row).or_default().push(id);
                graph.links.push(AdductLink {
                    id,
                    row,
                    identity: p.identity,
                    partners,
                    network: None,
                    multimer: None,
                    neutral_loss: None,
                    deleted: false,
                });
            }
        }
        graph
    }
}

/// Arena of all links of a run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct LinkGraph {
    links: Vec<AdductLink>,
    by_row: BTreeMap<u32, Vec<LinkId>>,
    /// row -> link forced to the front of the ranking
    promoted: BTreeMap<u32, LinkId>,
}

impl LinkGraph {
    pub fn get(&self, id: LinkId) -> Option<&AdductLink> {
        self.links.get(id)
    }

    pub fn get_mut(&mut self, id: LinkId) -> Option<&mut AdductLink> {
        self.links.get_mut(id)
    }

    /// All links, deleted ones included.
    pub fn all(&self) -> &[AdductLink] {
        &self.links
    }

    pub fn live(&self) -> impl Iterator<Item = &AdductLink> {
        self.links.iter().filter(|l| !l.deleted)
    }

    pub fn live_count(&self) -> usize {
        self.live().count()
    }

    /// Rows carrying at least one live link, ascending.
    pub fn rows(&self) -> Vec<u32> {
        self.by_row.keys().copied().filter(|&r| !self.row_links(r).is_empty()).collect()
    }

    /// Live links of `row` in creation order.
    pub fn row_links(&self, row: u32) -> Vec<LinkId> {
        self.by_row
            .get(&row)
            .map(|ids| ids.iter().copied().filter(|&i| !self.links[i].deleted).collect())
            .unwrap_or_default()
    }

    /// Live links of `row`, best first. A live promoted link always leads.
    pub fn ranked(&self, row: u32) -> Vec<LinkId> {
        let mut ids = self.row_links(row);
        ids.sort_by(|&a, &b| self.links[a].rank_cmp(&self.links[b]));
        if let Some(pos) = self.promoted.get(&row).and_then(|p| ids.iter().position(|i| i == p)) {
            ids[..=pos].rotate_right(1);
        }
        ids
    }

    /// Makes `id` the preferred link of its row regardless of confidence.
    ///
    /// Returns false for unknown or deleted links.
    pub fn promote(&mut self, id: LinkId) -> bool {
        match self.links.get(id) {
            Some(link) if !link.deleted => {
                self.promoted.insert(link.row, id);
                true
            }
            _ => false,
        }
    }

    /// The promoted link of `row`, while it is live.
    pub fn promoted(&self, row: u32) -> Option<LinkId> {
        self.promoted.get(&row).copied().filter(|&id| !self.links[id].deleted)
    }

    /// The preferred link of `row`: the promoted link, else the top of the ranking.
    pub fn preferred(&self, row: u32) -> Option<&AdductLink> {
        self.ranked(row).first().map(|&i| &self.links[i])
    }

    /// Deletes link `id` and, recursively, every partner link reachable from it.
    ///
    /// `keep` is never deleted. Returns the deleted links.
    pub fn delete(&mut self, id: LinkId, keep: Option<LinkId>) -> Vec<LinkId> {
        let mut deleted = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if Some(cur) == keep {
                continue;
            }
            let Some(link) = self.links.get_mut(cur) else { continue };
            if link.deleted {
                continue;
            }
            link.deleted = true;
            link.network = None;
            deleted.push(cur);
            stack.extend(link.partners.values().copied());
        }
        // survivors forget deleted partners
        for &d in &deleted {
            let (row, partners): (u32, Vec<LinkId>) = {
                let l = &self.links[d];
                (l.row, l.partners.values().copied().collect())
            };
            for p in partners {
                if let Some(pl) = self.links.get_mut(p) {
                    if !pl.deleted && pl.partners.get(&row) == Some(&d) {
                        pl.partners.remove(&row);
                    }
                }
            }
        }
        deleted
    }
}
