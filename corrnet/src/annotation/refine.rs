//! Pruning of competing links and networks.
//!
//! Per row, links are ranked by confidence. A link corroborated as a multimer by MS/MS
//! is promoted to preferred first; then, once the preferred link reaches the true
//! threshold, every other link on the row is deleted. Deletions cascade through partner
//! links.
//!
//! Two network passes follow: networks without a monomer are dropped, and a large
//! network that is preferred on all of its rows removes every other network there.

use std::collections::BTreeSet;

use log::{debug, info};
use serde::Serialize;

use crate::annotation::link::{LinkGraph, LinkId};
use crate::annotation::network::{detach, AnnotationNetwork};
use crate::config::RefinementParams;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RefineSummary {
    pub rows_pruned: usize,
    pub links_deleted: usize,
    pub networks_deleted: usize,
}

pub struct AnnotationRefiner {
    params: RefinementParams,
}

impl AnnotationRefiner {
    pub fn new(params: RefinementParams) -> Self {
        AnnotationRefiner { params }
    }

    /// Refines all rows in ascending id order.
    pub fn refine(&self, graph: &mut LinkGraph, networks: &mut Vec<AnnotationNetwork>) -> RefineSummary {
        let mut summary = RefineSummary::default();
        if !self.params.enabled {
            return summary;
        }
        for row in graph.rows() {
            let deleted = self.refine_row(graph, row);
            if !deleted.is_empty() {
                summary.rows_pruned += 1;
                summary.links_deleted += deleted.len();
                detach(networks, graph, &deleted);
            }
        }

        let before = networks.len();
        if self.params.delete_without_monomer {
            summary.links_deleted += delete_without_monomer(graph, networks);
        }
        if self.params.delete_smaller_networks {
            summary.links_deleted += self.delete_smaller_networks(graph, networks);
        }
        summary.networks_deleted = before - networks.len();

        info!(
            "refinement: pruned {} rows, {} links and {} networks deleted, {} links left",
            summary.rows_pruned, summary.links_deleted, summary.networks_deleted, graph.live_count()
        );
        summary
    }

    /// Keeps a network of at least `true_threshold` rows that is preferred on each of its
    /// rows, and deletes every other network touching those rows.
    pub fn delete_smaller_networks(&self, graph: &mut LinkGraph, networks: &mut Vec<AnnotationNetwork>) -> usize {
        let threshold = self.params.true_threshold;
        if threshold <= 1 {
            return 0;
        }
        let mut total = 0;
        // largest first, so a big network is settled before the ones it removes
        let mut order: Vec<(usize, u32)> = networks.iter().map(|n| (n.len(), n.id)).collect();
        order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        for (_, id) in order {
            let Some(net) = networks.iter().find(|n| n.id == id) else { continue };
            if net.len() < threshold || !is_preferred_everywhere(graph, net) {
                continue;
            }
            let rows = net.rows.clone();
            let doomed: Vec<u32> = networks
                .iter()
                .filter(|o| o.id != id && o.rows.iter().any(|r| rows.binary_search(r).is_ok()))
                .map(|o| o.id)
                .collect();
            for other in doomed {
                let deleted = delete_network(graph, networks, other);
                debug!("network {} removes network {} ({} links)", id, other, deleted);
                total += deleted;
            }
        }
        total
    }

    /// Refines the links of one row. Returns every link deleted, cascades included.
    pub fn refine_row(&self, graph: &mut LinkGraph, row: u32) -> Vec<LinkId> {
        let mut deleted = Vec::new();
        let ranked = graph.ranked(row);
        if ranked.len() < 2 {
            return deleted;
        }
        let threshold = self.params.true_threshold;

        // ---- 1) MULTIMER PRIORITY ----
        if self.params.delete_xmers_on_msms {
            let promoted = ranked
                .iter()
                .copied()
                .find(|&id| graph.get(id).is_some_and(|l| l.multimer.is_some()));
            if let Some(keep) = promoted {
                graph.promote(keep);
                for &id in &ranked {
                    let Some(link) = graph.get(id) else { continue };
                    if id == keep || link.deleted {
                        continue;
                    }
                    // weak, uncorroborated links survive this step
                    if !link.has_msms_evidence() && link.confidence() < threshold {
                        continue;
                    }
                    deleted.extend(graph.delete(id, Some(keep)));
                }
                debug!("row {}: multimer link {} promoted", row, keep);
            }
        }

        // ---- 2) TRUE THRESHOLD ----
        let ranked = graph.ranked(row);
        if let Some(&best) = ranked.first() {
            if graph.get(best).is_some_and(|l| l.confidence() >= threshold) {
                for &id in &ranked[1..] {
                    deleted.extend(graph.delete(id, Some(best)));
                }
            }
        }

        if !deleted.is_empty() {
            debug!("row {}: {} links deleted", row, deleted.len());
        }
        deleted
    }
}

/// Deletes networks without a monomer link, and networks with exactly one monomer but
/// three or more multimers. Returns the number of deleted links.
pub fn delete_without_monomer(graph: &mut LinkGraph, networks: &mut Vec<AnnotationNetwork>) -> usize {
    let doomed: Vec<u32> = networks
        .iter()
        .filter(|net| {
            let (mut monomers, mut multimers) = (0, 0);
            for link in net.links.iter().filter_map(|&id| graph.get(id)) {
                match link.identity.molecules() {
                    1 => monomers += 1,
                    n if n > 1 => multimers += 1,
                    _ => {}
                }
            }
            monomers == 0 || (monomers == 1 && multimers >= 3)
        })
        .map(|net| net.id)
        .collect();
    let mut total = 0;
    for id in doomed {
        let deleted = delete_network(graph, networks, id);
        debug!("network {} has no monomer, {} links deleted", id, deleted);
        total += deleted;
    }
    total
}

/// True if the preferred link of every member row belongs to `net`.
fn is_preferred_everywhere(graph: &LinkGraph, net: &AnnotationNetwork) -> bool {
    let members: BTreeSet<LinkId> = net.links.iter().copied().collect();
    net.rows
        .iter()
        .all(|&row| graph.preferred(row).map_or(true, |l| members.contains(&l.id)))
}

/// Deletes every link of network `id` and detaches the deleted links from all networks.
fn delete_network(graph: &mut LinkGraph, networks: &mut Vec<AnnotationNetwork>, id: u32) -> usize {
    let Some(pos) = networks.iter().position(|n| n.id == id) else { return 0 };
    let net = networks.remove(pos);
    let mut deleted = Vec::new();
    for link in net.links {
        deleted.extend(graph.delete(link, None));
    }
    detach(networks, graph, &deleted);
    deleted.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::link::LinkStore;
    use crate::annotation::msms::MultimerEvidence;
    use crate::annotation::network::build_networks;
    use mscorr::chemistry::ion::IonIdentity;
    use mscorr::data::feature::FeatureRow;
    use std::collections::HashMap;

    fn ion(name: &str, mass: f64) -> IonIdentity {
        IonIdentity::adduct(name, mass, 1)
    }

    fn multimer_evidence() -> Option<MultimerEvidence> {
        Some(MultimerEvidence { molecules: 1, mz: 300.1, intensity: 1e4 })
    }

    fn plain_rows(n: u32) -> Vec<FeatureRow> {
        (1..=n).map(|id| FeatureRow::new(id, 100.0 + id as f64, 1.0 + id as f64 * 0.01, 1)).collect()
    }

    /// Row 1 with five links: a dimer link with six partners and four links with two or
    /// three partners each. Partner rows are disjoint.
    fn crowded_row() -> (LinkGraph, LinkId) {
        let store = LinkStore::new(1..=20);
        let dimer = ion("H", 1.007276).with_molecules(2);
        let mut partner = 2;
        for p in 0..6 {
            store.link(1, &dimer, partner, &ion(&format!("P{p}"), 10.0 + p as f64)).unwrap();
            partner += 1;
        }
        for (k, n) in [(0, 2), (1, 3), (2, 2), (3, 3)] {
            let own = ion(&format!("A{k}"), 50.0 + k as f64);
            for _ in 0..n {
                store.link(1, &own, partner, &ion("X", 90.0)).unwrap();
                partner += 1;
            }
        }
        let mut graph = store.freeze();
        let dimer_id = graph
            .row_links(1)
            .into_iter()
            .find(|&id| graph.get(id).unwrap().identity.molecules() == 2)
            .unwrap();
        graph.get_mut(dimer_id).unwrap().multimer = multimer_evidence();
        (graph, dimer_id)
    }

    #[test]
    fn test_multimer_link_survives_alone() {
        let (mut graph, dimer) = crowded_row();
        assert_eq!(graph.row_links(1).len(), 5);
        assert_eq!(graph.get(dimer).unwrap().confidence(), 7);

        let refiner = AnnotationRefiner::new(RefinementParams::default());
        let summary = refiner.refine(&mut graph, &mut Vec::new());
        assert_eq!(graph.row_links(1), vec![dimer]);
        assert_eq!(graph.get(dimer).unwrap().partners.len(), 6);
        // four links plus their ten partner links
        assert_eq!(summary.links_deleted, 14);
    }

    #[test]
    fn test_below_threshold_nothing_is_pruned() {
        let store = LinkStore::new(1..=4);
        store.link(1, &ion("H", 1.007276), 2, &ion("Na", 22.989218)).unwrap();
        store.link(1, &ion("K", 38.963158), 3, &ion("Na", 22.989218)).unwrap();
        store.link(1, &ion("K", 38.963158), 4, &ion("Na", 22.989218)).unwrap();
        let mut graph = store.freeze();

        let refiner = AnnotationRefiner::new(RefinementParams::default());
        assert!(refiner.refine_row(&mut graph, 1).is_empty());
        assert_eq!(graph.row_links(1).len(), 2);

        let strict = AnnotationRefiner::new(RefinementParams { true_threshold: 2, ..RefinementParams::default() });
        let deleted = strict.refine_row(&mut graph, 1);
        assert_eq!(deleted.len(), 2);
        assert_eq!(graph.preferred(1).unwrap().identity, ion("K", 38.963158));
        assert_eq!(graph.row_links(1).len(), 1);
    }

    #[test]
    fn test_multimer_priority_deletes_strong_competitors() {
        // strong competitor: 4 partners, no MS/MS; dimer: 1 partner + multimer evidence
        let store = LinkStore::new(1..=6);
        let dimer = ion("H", 1.007276).with_molecules(2);
        store.link(1, &dimer, 2, &ion("H", 1.007276)).unwrap();
        for r in 3..=6 {
            store.link(1, &ion("Na", 22.989218), r, &ion("K", 38.963158)).unwrap();
        }
        let mut graph = store.freeze();
        let dimer_id = graph.row_links(1)[0];
        graph.get_mut(dimer_id).unwrap().multimer = multimer_evidence();

        let refiner = AnnotationRefiner::new(RefinementParams::default());
        refiner.refine_row(&mut graph, 1);
        assert_eq!(graph.row_links(1), vec![dimer_id]);

        // disabled multimer priority keeps the stronger link instead
        let store = LinkStore::new(1..=6);
        store.link(1, &dimer, 2, &ion("H", 1.007276)).unwrap();
        for r in 3..=6 {
            store.link(1, &ion("Na", 22.989218), r, &ion("K", 38.963158)).unwrap();
        }
        let mut graph = store.freeze();
        let dimer_id = graph.row_links(1)[0];
        graph.get_mut(dimer_id).unwrap().multimer = multimer_evidence();
        let refiner = AnnotationRefiner::new(RefinementParams { delete_xmers_on_msms: false, ..RefinementParams::default() });
        refiner.refine_row(&mut graph, 1);
        assert_eq!(graph.preferred(1).unwrap().identity, ion("Na", 22.989218));
        assert_eq!(graph.row_links(1).len(), 1);
    }

    #[test]
    fn test_disabled_refinement() {
        let (mut graph, _) = crowded_row();
        let refiner = AnnotationRefiner::new(RefinementParams { enabled: false, ..RefinementParams::default() });
        assert_eq!(refiner.refine(&mut graph, &mut Vec::new()), RefineSummary::default());
        assert_eq!(graph.row_links(1).len(), 5);
    }

    #[test]
    fn test_multimer_link_becomes_preferred_over_spared_competitor() {
        // dimer: 1 partner + multimer evidence (confidence 2); Na: 3 partners (confidence 3)
        let store = LinkStore::new(1..=5);
        let dimer = ion("H", 1.007276).with_molecules(2);
        store.link(1, &dimer, 2, &ion("H", 1.007276)).unwrap();
        for r in 3..=5 {
            store.link(1, &ion("Na", 22.989218), r, &ion("K", 38.963158)).unwrap();
        }
        let mut graph = store.freeze();
        let dimer_id = graph.row_links(1)[0];
        graph.get_mut(dimer_id).unwrap().multimer = multimer_evidence();
        assert_eq!(graph.preferred(1).unwrap().identity, ion("Na", 22.989218));

        let refiner = AnnotationRefiner::new(RefinementParams::default());
        assert!(refiner.refine_row(&mut graph, 1).is_empty());
        // the weaker Na link is kept, but the dimer is preferred
        assert_eq!(graph.row_links(1).len(), 2);
        assert_eq!(graph.preferred(1).unwrap().id, dimer_id);
        assert_eq!(graph.ranked(1)[0], dimer_id);
        assert_eq!(graph.promoted(1), Some(dimer_id));
    }

    #[test]
    fn test_networks_without_monomer_are_deleted() {
        let rows = plain_rows(8);
        let by_id: HashMap<u32, &FeatureRow> = rows.iter().map(|r| (r.id, r)).collect();
        let lookup = |id: u32| by_id.get(&id).copied();

        let store = LinkStore::new(1..=8);
        // dimers only
        store.link(1, &ion("H", 1.007276).with_molecules(2), 2, &ion("Na", 22.989218).with_molecules(2)).unwrap();
        // plain monomer pair
        store.link(3, &ion("H", 1.007276), 4, &ion("Na", 22.989218)).unwrap();
        // one monomer against three multimers
        store.link(5, &ion("H", 1.007276), 6, &ion("H", 1.007276).with_molecules(2)).unwrap();
        store.link(5, &ion("H", 1.007276), 7, &ion("Na", 22.989218).with_molecules(2)).unwrap();
        store.link(5, &ion("H", 1.007276), 8, &ion("K", 38.963158).with_molecules(3)).unwrap();
        let mut graph = store.freeze();
        let mut networks = build_networks(&mut graph, &lookup);
        assert_eq!(networks.len(), 3);

        assert_eq!(delete_without_monomer(&mut graph, &mut networks), 6);
        assert_eq!(networks.len(), 1);
        assert_eq!(networks[0].rows, vec![3, 4]);
        assert!(graph.row_links(1).is_empty());
        assert!(graph.row_links(5).is_empty());
        assert_eq!(graph.live_count(), 2);
    }

    #[test]
    fn test_preferred_large_network_removes_smaller_ones() {
        let rows = plain_rows(4);
        let by_id: HashMap<u32, &FeatureRow> = rows.iter().map(|r| (r.id, r)).collect();
        let lookup = |id: u32| by_id.get(&id).copied();

        let build = || {
            let store = LinkStore::new(1..=4);
            store.link(1, &ion("H", 1.007276), 2, &ion("Na", 22.989218)).unwrap();
            store.link(1, &ion("H", 1.007276), 3, &ion("K", 38.963158)).unwrap();
            // competing network on row 1
            store.link(1, &ion("Na", 22.989218), 4, &ion("H", 1.007276)).unwrap();
            store.freeze()
        };

        let mut graph = build();
        let mut networks = build_networks(&mut graph, &lookup);
        assert_eq!(networks.len(), 2);
        let refiner = AnnotationRefiner::new(RefinementParams { true_threshold: 3, ..RefinementParams::default() });
        let summary = refiner.refine(&mut graph, &mut networks);
        assert_eq!(summary.networks_deleted, 1);
        assert_eq!(summary.links_deleted, 2);
        assert_eq!(networks.len(), 1);
        assert_eq!(networks[0].rows, vec![1, 2, 3]);
        assert!(graph.row_links(4).is_empty());

        // below the size threshold both networks stay
        let mut graph = build();
        let mut networks = build_networks(&mut graph, &lookup);
        let refiner = AnnotationRefiner::new(RefinementParams { true_threshold: 4, ..RefinementParams::default() });
        assert_eq!(refiner.delete_smaller_networks(&mut graph, &mut networks), 0);
        assert_eq!(networks.len(), 2);
    }
}
