//! Annotation networks: connected components of the link partner graph.
//!
//! Networks are built in one pass once all links are settled. Ids start at 1 and
//! increase with the network's average RT.

use std::collections::BTreeSet;

use log::{debug, info};
use mscorr::data::feature::FeatureRow;
use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::annotation::link::{LinkGraph, LinkId};
use crate::grouping::group::Components;

#[derive(Clone, Debug, Serialize)]
pub struct AnnotationNetwork {
    pub id: u32,
    /// neutral mass derived from one representative charged member
    ///
    /// `None` when no member is charged, e.g. an intact `[M]` with its in-source
    /// fragment `-H2O`: neither identity carries the charge needed to recover `M`
    /// from the observed m/z.
    pub neutral_mass: Option<f64>,
    /// largest distance of a member-derived neutral mass from `neutral_mass`
    pub max_deviation: Option<f64>,
    pub avg_rt: f64,
    /// member rows, ascending
    pub rows: Vec<u32>,
    pub links: Vec<LinkId>,
}

impl AnnotationNetwork {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains_row(&self, row: u32) -> bool {
        self.rows.binary_search(&row).is_ok()
    }

    /// Drops the network: member links lose their network reference.
    pub fn delete(self, graph: &mut LinkGraph) {
        for id in self.links {
            if let Some(link) = graph.get_mut(id) {
                if link.network == Some(self.id) {
                    link.network = None;
                }
            }
        }
    }
}

/// Groups live, partnered links into networks and sets each link's network id.
pub fn build_networks<'a, F>(graph: &mut LinkGraph, lookup: &F) -> Vec<AnnotationNetwork>
where
    F: Fn(u32) -> Option<&'a FeatureRow>,
{
    let live: Vec<LinkId> = graph.live().filter(|l| !l.partners.is_empty()).map(|l| l.id).collect();

    let mut components = Components::new(live.iter().copied());
    for &id in &live {
        let Some(link) = graph.get(id) else { continue };
        for &partner in link.partners.values() {
            components.join(id, partner);
        }
    }

    let mut networks: Vec<AnnotationNetwork> = components
        .into_components(2)
        .into_iter()
        .map(|links| summarize(links, graph, lookup))
        .collect();

    reset_ids(&mut networks);
    for link in graph.live().map(|l| l.id).collect::<Vec<_>>() {
        if let Some(l) = graph.get_mut(link) {
            l.network = None;
        }
    }
    for net in &networks {
        for &id in &net.links {
            if let Some(link) = graph.get_mut(id) {
                link.network = Some(net.id);
            }
        }
        debug!(
            "network {}: {} rows, M = {:?}, max deviation {:?}",
            net.id, net.rows.len(), net.neutral_mass, net.max_deviation
        );
    }
    info!("{} annotation networks from {} links", networks.len(), live.len());
    networks
}

fn summarize<'a, F>(links: Vec<LinkId>, graph: &LinkGraph, lookup: &F) -> AnnotationNetwork
where
    F: Fn(u32) -> Option<&'a FeatureRow>,
{
    let rows: BTreeSet<u32> = links.iter().filter_map(|&id| graph.get(id)).map(|l| l.row).collect();

    let masses: Vec<f64> = links
        .iter()
        .filter_map(|&id| graph.get(id))
        .filter_map(|l| l.identity.neutral_mass(lookup(l.row)?.mz))
        .collect();
    let neutral_mass = masses.first().copied();
    let max_deviation = neutral_mass.map(|m| masses.iter().map(|x| (x - m).abs()).fold(0.0, f64::max));

    let rts: Vec<f64> = rows.iter().filter_map(|&r| lookup(r)).map(|r| r.rt).collect();
    let avg_rt = if rts.is_empty() { 0.0 } else { rts.iter().sum::<f64>() / rts.len() as f64 };

    AnnotationNetwork {
        id: 0,
        neutral_mass,
        max_deviation,
        avg_rt,
        rows: rows.into_iter().collect(),
        links,
    }
}

/// Renumbers networks from 1 by ascending average RT.
pub fn reset_ids(networks: &mut [AnnotationNetwork]) {
    networks.sort_by(|a, b| OrderedFloat(a.avg_rt).cmp(&OrderedFloat(b.avg_rt)).then(a.links.cmp(&b.links)));
    for (i, net) in networks.iter_mut().enumerate() {
        net.id = i as u32 + 1;
    }
}

/// Removes deleted links (and rows left without links) from their networks.
pub fn detach(networks: &mut Vec<AnnotationNetwork>, graph: &LinkGraph, deleted: &[LinkId]) {
    if deleted.is_empty() {
        return;
    }
    let gone: BTreeSet<LinkId> = deleted.iter().copied().collect();
    for net in networks.iter_mut() {
        net.links.retain(|id| !gone.contains(id));
        net.rows = net
            .links
            .iter()
            .filter_map(|&id| graph.get(id))
            .map(|l| l.row)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
    }
    networks.retain(|n| !n.links.is_empty());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::link::LinkStore;
    use mscorr::chemistry::ion::IonIdentity;
    use std::collections::HashMap;

    const M: f64 = 299.092724;

    fn h() -> IonIdentity {
        IonIdentity::adduct("H", 1.007276, 1)
    }

    fn na() -> IonIdentity {
        IonIdentity::adduct("Na", 22.989218, 1)
    }

    fn k() -> IonIdentity {
        IonIdentity::adduct("K", 38.963158, 1)
    }

    fn rows() -> Vec<FeatureRow> {
        vec![
            FeatureRow::new(1, M + 1.007276, 6.0, 1),
            FeatureRow::new(2, M + 22.989218 + 0.001, 6.2, 1),
            FeatureRow::new(3, M + 38.963158, 6.1, 1),
            FeatureRow::new(4, 150.0, 2.0, 1),
            FeatureRow::new(5, 172.0, 2.0, 1),
        ]
    }

    #[test]
    fn test_components_and_consensus_mass() {
        let rows = rows();
        let by_id: HashMap<u32, &FeatureRow> = rows.iter().map(|r| (r.id, r)).collect();
        let lookup = |id: u32| by_id.get(&id).copied();

        let store = LinkStore::new(1..=5);
        store.link(1, &h(), 2, &na()).unwrap();
        store.link(2, &na(), 3, &k()).unwrap();
        store.link(4, &h(), 5, &na()).unwrap();
        let mut graph = store.freeze();

        let networks = build_networks(&mut graph, &lookup);
        assert_eq!(networks.len(), 2);
        // earlier RT first
        assert_eq!(networks[0].id, 1);
        assert_eq!(networks[0].rows, vec![4, 5]);
        assert_eq!(networks[1].rows, vec![1, 2, 3]);

        let big = &networks[1];
        assert!((big.neutral_mass.unwrap() - M).abs() < 1e-6);
        assert!((big.max_deviation.unwrap() - 0.001).abs() < 1e-6);
        assert!((big.avg_rt - 6.1).abs() < 1e-9);
        for &id in &big.links {
            assert_eq!(graph.get(id).unwrap().network, Some(2));
        }
    }

    #[test]
    fn test_detach_and_delete() {
        let rows = rows();
        let by_id: HashMap<u32, &FeatureRow> = rows.iter().map(|r| (r.id, r)).collect();
        let lookup = |id: u32| by_id.get(&id).copied();

        let store = LinkStore::new(1..=5);
        store.link(1, &h(), 2, &na()).unwrap();
        store.link(4, &h(), 5, &na()).unwrap();
        let mut graph = store.freeze();
        let mut networks = build_networks(&mut graph, &lookup);

        let target = graph.row_links(4)[0];
        let deleted = graph.delete(target, None);
        detach(&mut networks, &graph, &deleted);
        assert_eq!(networks.len(), 1);
        assert_eq!(networks[0].rows, vec![1, 2]);

        let net = networks.remove(0);
        let members = net.links.clone();
        net.delete(&mut graph);
        assert!(members.iter().all(|&id| graph.get(id).unwrap().network.is_none()));
    }

    #[test]
    fn test_unpartnered_links_form_no_network() {
        let rows = rows();
        let by_id: HashMap<u32, &FeatureRow> = rows.iter().map(|r| (r.id, r)).collect();
        let lookup = |id: u32| by_id.get(&id).copied();
        let store = LinkStore::new(1..=2);
        store.link(1, &h(), 2, &na()).unwrap();
        let mut graph = store.freeze();
        let keep = graph.row_links(1)[0];
        let other = graph.row_links(2)[0];
        graph.delete(other, Some(keep));
        assert!(build_networks(&mut graph, &lookup).is_empty());
        assert!(graph.get(keep).unwrap().network.is_none());
    }

    #[test]
    fn test_uncharged_network_has_no_neutral_mass() {
        let rows = vec![
            FeatureRow::new(1, M + 1.007276, 6.0, 1),
            FeatureRow::new(2, M - 18.010565 + 1.007276, 6.0, 1),
        ];
        let by_id: HashMap<u32, &FeatureRow> = rows.iter().map(|r| (r.id, r)).collect();
        let lookup = |id: u32| by_id.get(&id).copied();
        let store = LinkStore::new(1..=2);
        store.link(1, &IonIdentity::unmodified(), 2, &IonIdentity::modification("H2O", -18.010565)).unwrap();
        let mut graph = store.freeze();

        let networks = build_networks(&mut graph, &lookup);
        assert_eq!(networks.len(), 1);
        assert_eq!(networks[0].rows, vec![1, 2]);
        assert!(networks[0].neutral_mass.is_none());
        assert!(networks[0].max_deviation.is_none());
    }
}
