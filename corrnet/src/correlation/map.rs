use std::collections::HashMap;

use crate::correlation::pair::PairCorrelation;

/// Canonical key of an unordered row pair.
#[inline]
pub fn pair_key(a: u32, b: u32) -> (u32, u32) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Sparse undirected edge store of validated row pairs, keyed by row id.
#[derive(Clone, Debug, Default)]
pub struct CorrelationMap {
    entries: HashMap<(u32, u32), PairCorrelation>,
}

impl CorrelationMap {
    pub fn new() -> Self {
        CorrelationMap { entries: HashMap::new() }
    }

    /// Inserts a valid correlation for `a != b`. Returns false if nothing was stored.
    pub fn add(&mut self, a: u32, b: u32, pair: PairCorrelation) -> bool {
        if a == b || !pair.is_valid() {
            return false;
        }
        self.entries.insert(pair_key(a, b), pair);
        true
    }

    pub fn get(&self, a: u32, b: u32) -> Option<&PairCorrelation> {
        self.entries.get(&pair_key(a, b))
    }

    pub fn contains(&self, a: u32, b: u32) -> bool {
        self.entries.contains_key(&pair_key(a, b))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(u32, u32), &PairCorrelation)> {
        self.entries.iter()
    }

    /// All edges in ascending key order.
    pub fn edges(&self) -> Vec<(u32, u32)> {
        let mut keys: Vec<(u32, u32)> = self.entries.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Row ids connected to `row`.
    pub fn neighbours(&self, row: u32) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .entries
            .keys()
            .filter_map(|&(a, b)| if a == row { Some(b) } else if b == row { Some(a) } else { None })
            .collect();
        out.sort_unstable();
        out
    }
}

impl Extend<((u32, u32), PairCorrelation)> for CorrelationMap {
    fn extend<T: IntoIterator<Item = ((u32, u32), PairCorrelation)>>(&mut self, iter: T) {
        for ((a, b), pair) in iter {
            self.add(a, b, pair);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mscorr::algorithm::correlation::CorrelationData;
    use std::collections::BTreeMap;

    fn valid_pair() -> PairCorrelation {
        let h = CorrelationData::new(vec![1.0, 2.0, 3.0], vec![2.0, 4.0, 6.5]);
        PairCorrelation::new(h, BTreeMap::new())
    }

    #[test]
    fn test_symmetric_lookup() {
        let mut map = CorrelationMap::new();
        assert!(map.add(7, 3, valid_pair()));
        assert!(map.contains(3, 7));
        let ab = map.get(3, 7).map(|p| p.height_r());
        let ba = map.get(7, 3).map(|p| p.height_r());
        assert_eq!(ab, ba);
        assert_eq!(map.edges(), vec![(3, 7)]);
        assert_eq!(map.neighbours(7), vec![3]);
    }

    #[test]
    fn test_rejects_self_and_invalid() {
        let mut map = CorrelationMap::new();
        assert!(!map.add(4, 4, valid_pair()));
        assert!(!map.add(1, 2, PairCorrelation::default()));
        assert!(map.is_empty());
    }

    #[test]
    fn test_one_entry_per_unordered_pair() {
        let mut map = CorrelationMap::new();
        map.add(1, 2, valid_pair());
        map.add(2, 1, valid_pair());
        assert_eq!(map.len(), 1);
    }
}
