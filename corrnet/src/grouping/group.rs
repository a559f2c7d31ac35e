//! Row groups: connected components of the correlation map.
//!
//! Rows that pass the minimum feature filter are joined along every correlation edge
//! with a union-find. Components of size one are dropped. Each group keeps per-raw-file
//! RT bookkeeping and correlation statistics over all member pairs; both are recomputed
//! from scratch whenever the membership changes.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use itertools::Itertools;
use log::{debug, info};
use mscorr::data::feature::FeatureRow;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::Serialize;

use crate::correlation::map::CorrelationMap;
use crate::grouping::filter::{FilterDiagnostics, MinimumFeatureFilter};

/// Union-find keyed by row (or link) id.
///
/// Every root owns the member list of its component, so joining moves the smaller list
/// into the larger one and components come out without a second pass.
#[derive(Clone, Debug)]
pub struct Components<K> {
    slot: HashMap<K, usize>,
    parent: Vec<usize>,
    members: Vec<Vec<K>>,
}

impl<K: Copy + Eq + Hash + Ord> Components<K> {
    /// One singleton component per key. Repeated keys are ignored.
    pub fn new<I: IntoIterator<Item = K>>(keys: I) -> Self {
        let mut c = Components { slot: HashMap::new(), parent: Vec::new(), members: Vec::new() };
        for key in keys {
            if !c.slot.contains_key(&key) {
                c.slot.insert(key, c.parent.len());
                c.parent.push(c.parent.len());
                c.members.push(vec![key]);
            }
        }
        c
    }

    fn root(&mut self, mut i: usize) -> usize {
        // path halving
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    /// Joins the components of `a` and `b`. Returns false if either key is unknown or
    /// both already share a component.
    pub fn join(&mut self, a: K, b: K) -> bool {
        let (Some(&sa), Some(&sb)) = (self.slot.get(&a), self.slot.get(&b)) else { return false };
        let (ra, rb) = (self.root(sa), self.root(sb));
        if ra == rb {
            return false;
        }
        let (big, small) = if self.members[ra].len() >= self.members[rb].len() { (ra, rb) } else { (rb, ra) };
        self.parent[small] = big;
        let moved = std::mem::take(&mut self.members[small]);
        self.members[big].extend(moved);
        true
    }

    pub fn contains(&self, key: K) -> bool {
        self.slot.contains_key(&key)
    }

    /// Components with at least `min_size` members, members ascending, ordered by their
    /// smallest member.
    pub fn into_components(self, min_size: usize) -> Vec<Vec<K>> {
        let mut out: Vec<Vec<K>> = self
            .members
            .into_iter()
            .filter(|m| !m.is_empty() && m.len() >= min_size)
            .map(|mut m| {
                m.sort_unstable();
                m
            })
            .collect();
        out.sort_unstable_by(|x, y| x[0].cmp(&y[0]));
        out
    }
}

/// RT bookkeeping of a group within one raw file.
#[derive(Clone, Debug, Serialize)]
pub struct RtRange {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: usize,
}

impl RtRange {
    fn empty() -> Self {
        RtRange { min: f64::INFINITY, max: f64::NEG_INFINITY, sum: 0.0, count: 0 }
    }

    fn push(&mut self, rt: f64) {
        self.min = self.min.min(rt);
        self.max = self.max.max(rt);
        self.sum += rt;
        self.count += 1;
    }

    pub fn center(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Correlation statistics over all member pairs of a group.
#[derive(Clone, Debug, Default, Serialize)]
pub struct GroupStats {
    /// member pairs with a map entry
    pub n_pairs: usize,
    pub min_height_r: Option<f64>,
    pub avg_height_r: Option<f64>,
    pub max_height_r: Option<f64>,
    pub min_shape_r: Option<f64>,
    pub avg_shape_r: Option<f64>,
    pub max_shape_r: Option<f64>,
    pub avg_shape_points: Option<f64>,
    pub avg_total_r: Option<f64>,
}

#[derive(Default)]
struct Acc {
    min: Option<f64>,
    max: Option<f64>,
    sum: f64,
    n: usize,
}

impl Acc {
    fn push(&mut self, v: Option<f64>) {
        let Some(v) = v else { return };
        self.min = Some(self.min.map_or(v, |m| m.min(v)));
        self.max = Some(self.max.map_or(v, |m| m.max(v)));
        self.sum += v;
        self.n += 1;
    }

    fn avg(&self) -> Option<f64> {
        (self.n > 0).then(|| self.sum / self.n as f64)
    }
}

impl GroupStats {
    /// All `k·(k-1)/2` member pairs are looked up in the map.
    pub fn compute(rows: &[u32], map: &CorrelationMap) -> Self {
        let (mut height, mut shape, mut points, mut total) =
            (Acc::default(), Acc::default(), Acc::default(), Acc::default());
        let mut n_pairs = 0;
        for (&a, &b) in rows.iter().tuple_combinations() {
            let Some(pair) = map.get(a, b) else { continue };
            n_pairs += 1;
            height.push(pair.height_r());
            for s in pair.shapes.values() {
                shape.push(Some(s.pearson_r));
            }
            points.push(pair.avg_shape_points());
            total.push(pair.total_r());
        }
        GroupStats {
            n_pairs,
            min_height_r: height.min,
            avg_height_r: height.avg(),
            max_height_r: height.max,
            min_shape_r: shape.min,
            avg_shape_r: shape.avg(),
            max_shape_r: shape.max,
            avg_shape_points: points.avg(),
            avg_total_r: total.avg(),
        }
    }
}

/// A group of correlated rows.
#[derive(Clone, Debug, Serialize)]
pub struct RowGroup {
    pub id: u32,
    /// member row ids, ascending m/z
    rows: Vec<u32>,
    rt: BTreeMap<String, RtRange>,
    avg_rt: f64,
    stats: GroupStats,
}

impl RowGroup {
    /// Builds a group and computes its bookkeeping. `lookup` resolves row ids.
    pub fn new<'a, F>(id: u32, rows: Vec<u32>, lookup: &F, map: &CorrelationMap) -> Self
    where
        F: Fn(u32) -> Option<&'a FeatureRow>,
    {
        let mut group = RowGroup {
            id,
            rows,
            rt: BTreeMap::new(),
            avg_rt: 0.0,
            stats: GroupStats::default(),
        };
        group.recalculate(lookup, map);
        group
    }

    pub fn rows(&self) -> &[u32] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, row: u32) -> bool {
        self.rows.contains(&row)
    }

    pub fn stats(&self) -> &GroupStats {
        &self.stats
    }

    /// Average RT of the member rows.
    pub fn avg_rt(&self) -> f64 {
        self.avg_rt
    }

    pub fn rt_range(&self, raw_file: &str) -> Option<&RtRange> {
        self.rt.get(raw_file)
    }

    /// A feature at `rt` in `raw_file` fits this group if it lies within the members'
    /// RT span there, or within `tolerance` of their center.
    pub fn is_in_range(&self, raw_file: &str, rt: f64, tolerance: f64) -> bool {
        let Some(range) = self.rt.get(raw_file) else { return false };
        let Some(center) = range.center() else { return false };
        (rt >= range.min && rt <= range.max) || (rt - center).abs() <= tolerance
    }

    pub fn add_row<'a, F>(&mut self, row: u32, lookup: &F, map: &CorrelationMap) -> bool
    where
        F: Fn(u32) -> Option<&'a FeatureRow>,
    {
        if self.contains(row) || lookup(row).is_none() {
            return false;
        }
        self.rows.push(row);
        self.recalculate(lookup, map);
        true
    }

    pub fn remove_row<'a, F>(&mut self, row: u32, lookup: &F, map: &CorrelationMap) -> bool
    where
        F: Fn(u32) -> Option<&'a FeatureRow>,
    {
        let before = self.rows.len();
        self.rows.retain(|&r| r != row);
        if self.rows.len() == before {
            return false;
        }
        self.recalculate(lookup, map);
        true
    }

    /// Recomputes member order, RT bookkeeping and statistics from the member list.
    pub fn recalculate<'a, F>(&mut self, lookup: &F, map: &CorrelationMap)
    where
        F: Fn(u32) -> Option<&'a FeatureRow>,
    {
        let mut members: Vec<&FeatureRow> = self.rows.iter().filter_map(|&r| lookup(r)).collect();
        members.sort_by(|a, b| a.mz.total_cmp(&b.mz).then(a.id.cmp(&b.id)));
        self.rows = members.iter().map(|r| r.id).collect();

        self.rt.clear();
        for row in &members {
            for (raw, f) in &row.features {
                self.rt.entry(raw.clone()).or_insert_with(RtRange::empty).push(f.rt);
            }
        }
        self.avg_rt = if members.is_empty() {
            0.0
        } else {
            members.iter().map(|r| r.rt).sum::<f64>() / members.len() as f64
        };
        self.stats = GroupStats::compute(&self.rows, map);
    }
}

/// All groups of a run plus the row → group assignment.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Grouping {
    pub groups: Vec<RowGroup>,
    assignment: HashMap<u32, u32>,
    /// why rows were kept out of grouping
    pub row_filter: FilterDiagnostics,
}

impl Grouping {
    pub fn group_of(&self, row: u32) -> Option<u32> {
        self.assignment.get(&row).copied()
    }

    pub fn group(&self, id: u32) -> Option<&RowGroup> {
        // ids are positions + 1
        self.groups.get((id as usize).checked_sub(1)?)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Groups rows along correlation edges.
///
/// Edges touching a row that fails `filter`, or whose rows are not detected together
/// often enough, are ignored. Groups are numbered from 1 by ascending average RT.
pub fn build_groups(rows: &[FeatureRow], map: &CorrelationMap, filter: &MinimumFeatureFilter) -> Grouping {
    let by_id: HashMap<u32, usize> = rows.iter().enumerate().map(|(i, r)| (r.id, i)).collect();
    let sample_groups = filter.resolve_groups(rows);
    let diagnostics = filter.diagnose(rows);
    info!("row filter: {}", diagnostics.summary());

    // rows failing the filter are not part of the union at all
    let mask = filter.filter_par(rows);
    let mut components = Components::new(rows.iter().zip(&mask).filter(|(_, &keep)| keep).map(|(r, _)| r.id));
    let mut used = 0usize;
    for (a, b) in map.edges() {
        if !components.contains(a) || !components.contains(b) {
            continue;
        }
        let (Some(&ia), Some(&ib)) = (by_id.get(&a), by_id.get(&b)) else { continue };
        if !filter.passes_pair(&rows[ia], &rows[ib], &sample_groups) {
            continue;
        }
        components.join(a, b);
        used += 1;
    }

    let lookup = |id: u32| by_id.get(&id).map(|&i| &rows[i]);
    let components = components.into_components(2);

    // O(k²) statistics per group
    let mut groups: Vec<RowGroup> = components
        .into_par_iter()
        .map(|members| RowGroup::new(0, members, &lookup, map))
        .collect();

    groups.sort_by(|a, b| OrderedFloat(a.avg_rt).cmp(&OrderedFloat(b.avg_rt)).then(a.rows.cmp(&b.rows)));
    let mut assignment = HashMap::new();
    for (i, g) in groups.iter_mut().enumerate() {
        g.id = i as u32 + 1;
        for &r in &g.rows {
            assignment.insert(r, g.id);
        }
        debug!(
            "group {}: {} rows, avg RT {:.3}, avg height r {:?}",
            g.id, g.rows.len(), g.avg_rt, g.stats.avg_height_r
        );
    }

    info!(
        "grouping: {} of {} edges used, {} groups covering {} rows",
        used, map.len(), groups.len(), assignment.len()
    );
    Grouping { groups, assignment, row_filter: diagnostics }
}
