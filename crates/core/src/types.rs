use serde::Serialize;

use crate::error::StructureError;

/// Pairing links over the positions of a residue chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingGraph {
    /// pairs[i] = j means base i is paired with base j; pairs[i] = i means unpaired
    pub pairs: Vec<usize>,
    /// Nesting level of the pair at each position (0 = primary). Unpaired bases carry 0.
    pub levels: Vec<usize>,
    /// Strand break positions. Always starts with 0.
    pub nicks: Vec<usize>,
    pub n_bases: usize,
}

impl PairingGraph {
    /// A single strand of `n` unpaired bases.
    pub fn unpaired(n: usize) -> Self {
        Self {
            pairs: (0..n).collect(),
            levels: vec![0; n],
            nicks: vec![0],
            n_bases: n,
        }
    }

    /// Build a graph from explicit `(i, j)` pairs. Nesting levels are
    /// assigned greedily: a pair takes the lowest level in which it crosses
    /// no pair seen so far (pairs visited by opening position).
    pub fn from_pairs(n: usize, pairs: &[(usize, usize)]) -> Result<Self, StructureError> {
        let mut graph = Self::unpaired(n);
        for &(a, b) in pairs {
            for p in [a, b] {
                if p >= n {
                    return Err(StructureError::OutOfRange { position: p, len: n });
                }
            }
            if a == b {
                return Err(StructureError::SelfPair(a));
            }
            for p in [a, b] {
                if graph.pairs[p] != p {
                    return Err(StructureError::AlreadyPaired {
                        position: p,
                        partner: graph.pairs[p],
                    });
                }
            }
            graph.pairs[a] = b;
            graph.pairs[b] = a;
        }
        graph.assign_levels();
        Ok(graph)
    }

    /// Replace the strand breaks. Position 0 is always kept as the first entry.
    pub fn with_nicks(mut self, nicks: &[usize]) -> Self {
        let mut all: Vec<usize> = nicks
            .iter()
            .copied()
            .filter(|&k| k > 0 && k < self.n_bases)
            .collect();
        all.push(0);
        all.sort_unstable();
        all.dedup();
        self.nicks = all;
        self
    }

    pub fn partner(&self, i: usize) -> Option<usize> {
        match self.pairs.get(i) {
            Some(&j) if j != i => Some(j),
            _ => None,
        }
    }

    pub fn is_paired(&self, i: usize) -> bool {
        self.partner(i).is_some()
    }

    /// Partner of `i` restricted to the primary (level 0) nesting.
    pub fn primary_partner(&self, i: usize) -> Option<usize> {
        self.partner(i).filter(|_| self.levels[i] == 0)
    }

    /// All pairs as `(i, j)` with `i < j`, ordered by `i`.
    pub fn pair_list(&self) -> Vec<(usize, usize)> {
        (0..self.n_bases)
            .filter_map(|i| self.partner(i).filter(|&j| i < j).map(|j| (i, j)))
            .collect()
    }

    pub fn pair_count(&self) -> usize {
        self.pair_list().len()
    }

    /// Number of distinct nesting levels in use.
    pub fn level_count(&self) -> usize {
        (0..self.n_bases)
            .filter(|&i| self.is_paired(i))
            .map(|i| self.levels[i] + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn has_pseudoknots(&self) -> bool {
        self.level_count() > 1
    }

    /// True when a strand begins at position `i`.
    pub fn is_strand_start(&self, i: usize) -> bool {
        self.nicks.contains(&i)
    }

    /// True when a strand ends at position `i`.
    pub fn is_strand_end(&self, i: usize) -> bool {
        i + 1 >= self.n_bases || self.nicks.contains(&(i + 1))
    }

    /// True when positions `i` and `i + 1` are joined by a backbone bond.
    pub fn is_bonded(&self, i: usize) -> bool {
        i + 1 < self.n_bases && !self.nicks.contains(&(i + 1))
    }

    /// Layout records: partner index and nesting level per position.
    pub fn records(&self) -> Vec<BasePairRecord> {
        (0..self.n_bases)
            .map(|i| BasePairRecord {
                partner: self.partner(i),
                level: self.levels[i],
            })
            .collect()
    }

    /// Recompute nesting levels greedily from the current pairs.
    pub fn assign_levels(&mut self) {
        let mut by_level: Vec<Vec<(usize, usize)>> = Vec::new();
        self.levels = vec![0; self.n_bases];
        for (i, j) in self.pair_list() {
            let level = by_level
                .iter()
                .position(|assigned| !assigned.iter().any(|&p| crosses(p, (i, j))))
                .unwrap_or(by_level.len());
            if level == by_level.len() {
                by_level.push(Vec::new());
            }
            by_level[level].push((i, j));
            self.levels[i] = level;
            self.levels[j] = level;
        }
    }
}

/// True when two pairs (each given with `i < j`) cross in nested notation.
pub fn crosses(a: (usize, usize), b: (usize, usize)) -> bool {
    (a.0 < b.0 && b.0 < a.1 && a.1 < b.1) || (b.0 < a.0 && a.0 < b.1 && b.1 < a.1)
}

/// Per-position record used by the layout engine.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BasePairRecord {
    pub partner: Option<usize>,
    pub level: usize,
}

/// A 2D residue coordinate.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn distance(&self, other: &Coordinate) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Loop of the primary nesting, used to seed the layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopInfo {
    /// Pair closing this loop; `None` for the external loop.
    pub parent_pair: Option<(usize, usize)>,
    /// Child pairs contained directly in this loop: (base_i, base_j) where i < j
    pub child_pairs: Vec<(usize, usize)>,
    /// Unpaired (at the primary level) bases directly in this loop
    pub unpaired_bases: Vec<usize>,
}

impl LoopInfo {
    /// Stem: the closing pair stacks directly on a single child pair.
    pub fn is_stack(&self) -> bool {
        match (self.parent_pair, self.child_pairs.as_slice()) {
            (Some((i, j)), [(ci, cj)]) => {
                self.unpaired_bases.is_empty() && *ci == i + 1 && *cj + 1 == j
            }
            _ => false,
        }
    }

    pub fn is_hairpin(&self) -> bool {
        self.parent_pair.is_some() && self.child_pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs_nested() {
        let g = PairingGraph::from_pairs(6, &[(0, 5), (1, 4)]).unwrap();
        assert_eq!(g.pairs, vec![5, 4, 2, 3, 1, 0]);
        assert_eq!(g.level_count(), 1);
        assert!(!g.has_pseudoknots());
        assert_eq!(g.pair_list(), vec![(0, 5), (1, 4)]);
    }

    #[test]
    fn test_from_pairs_crossing_gets_second_level() {
        let g = PairingGraph::from_pairs(6, &[(0, 4), (1, 3), (2, 5)]).unwrap();
        assert_eq!(g.levels[0], 0);
        assert_eq!(g.levels[1], 0);
        assert_eq!(g.levels[2], 1);
        assert_eq!(g.levels[5], 1);
        assert!(g.has_pseudoknots());
    }

    #[test]
    fn test_from_pairs_rejects_double_pairing() {
        let err = PairingGraph::from_pairs(4, &[(0, 3), (3, 1)]).unwrap_err();
        assert_eq!(
            err,
            StructureError::AlreadyPaired {
                position: 3,
                partner: 0
            }
        );
    }

    #[test]
    fn test_from_pairs_rejects_out_of_range() {
        assert!(PairingGraph::from_pairs(3, &[(0, 3)]).is_err());
        assert!(PairingGraph::from_pairs(3, &[(1, 1)]).is_err());
    }

    #[test]
    fn test_strand_boundaries() {
        let g = PairingGraph::unpaired(6).with_nicks(&[3, 0, 9]);
        assert_eq!(g.nicks, vec![0, 3]);
        assert!(g.is_strand_start(3));
        assert!(g.is_strand_end(2));
        assert!(g.is_strand_end(5));
        assert!(!g.is_bonded(2));
        assert!(g.is_bonded(3));
    }

    #[test]
    fn test_crosses() {
        assert!(crosses((0, 4), (2, 6)));
        assert!(!crosses((0, 6), (2, 4)));
        assert!(!crosses((0, 2), (3, 5)));
    }
}
