use serde::Serialize;
use std::collections::HashSet;

use crate::config::{EnergyWeights, LayoutConfig};
use crate::geometry::{cross, Vec2};
use crate::types::PairingGraph;

/// Per-term layout energy.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct EnergyBreakdown {
    pub pair: f64,
    pub stacking: f64,
    pub crossing: f64,
    /// Number of crossing backbone segment pairs
    pub crossings: usize,
    pub clash: f64,
    pub bond: f64,
    pub total: f64,
}

impl EnergyBreakdown {
    fn infinite() -> Self {
        Self {
            total: f64::INFINITY,
            ..Self::default()
        }
    }
}

/// Layout energy of one pairing graph.
///
/// Every term only looks at residues below a `limit`, so the same model
/// scores growing prefix windows.
#[derive(Debug, Clone)]
pub struct EnergyModel {
    pairs: Vec<(usize, usize)>,
    /// (residue, residue) pairs held at the stacking distance
    stacking: Vec<(usize, usize)>,
    /// Backbone bonds `k -> k + 1`
    bonds: Vec<usize>,
    /// Residue pairs never penalised for closeness
    exempt: HashSet<(usize, usize)>,
    bond_length: f64,
    pair_distance: f64,
    stacking_distance: f64,
    clearance: f64,
    weights: EnergyWeights,
}

impl EnergyModel {
    pub fn new(graph: &PairingGraph, config: &LayoutConfig) -> Self {
        let n = graph.n_bases;
        let pairs = graph.pair_list();
        let bonds: Vec<usize> = (0..n).filter(|&k| graph.is_bonded(k)).collect();

        let mut stacking = Vec::new();
        for &(i, j) in &pairs {
            let stacked = i + 1 < j - 1
                && graph.partner(i + 1) == Some(j - 1)
                && graph.levels[i + 1] == graph.levels[i]
                && graph.is_bonded(i)
                && graph.is_bonded(j - 1);
            if stacked {
                stacking.push((i, j - 1));
                stacking.push((i + 1, j));
            }
        }

        let mut exempt: HashSet<(usize, usize)> = HashSet::new();
        exempt.extend(pairs.iter().copied());
        exempt.extend(stacking.iter().copied());
        exempt.extend(bonds.iter().map(|&k| (k, k + 1)));

        Self {
            pairs,
            stacking,
            bonds,
            exempt,
            bond_length: config.bond_length,
            pair_distance: config.pair_distance,
            stacking_distance: config.stacking_distance(),
            clearance: config.clearance,
            weights: config.weights,
        }
    }

    pub fn total(&self, pos: &[Vec2], limit: usize) -> f64 {
        self.breakdown(pos, limit).total
    }

    /// Like [`total`](Self::total), but infinite once more than `allowed`
    /// backbone segment pairs cross anywhere in `pos`, not only below
    /// `limit`.
    pub fn total_within(&self, pos: &[Vec2], limit: usize, allowed: usize) -> f64 {
        if self.crossings(pos, pos.len()) > allowed {
            f64::INFINITY
        } else {
            self.total(pos, limit)
        }
    }

    /// Crossing backbone segment pairs among residues `0..limit`.
    pub fn crossings(&self, pos: &[Vec2], limit: usize) -> usize {
        let limit = limit.min(pos.len());
        let segments: Vec<usize> = self
            .bonds
            .iter()
            .copied()
            .filter(|&k| k + 1 < limit)
            .collect();
        let mut count = 0;
        for (s, &k) in segments.iter().enumerate() {
            for &m in &segments[s + 1..] {
                if m > k + 1 && segments_cross(pos[k], pos[k + 1], pos[m], pos[m + 1]) {
                    count += 1;
                }
            }
        }
        count
    }

    /// Score residues `0..limit`. Non-finite coordinates score infinity.
    pub fn breakdown(&self, pos: &[Vec2], limit: usize) -> EnergyBreakdown {
        let limit = limit.min(pos.len());
        if pos[..limit].iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
            return EnergyBreakdown::infinite();
        }
        let w = &self.weights;
        let inside = |&(a, b): &(usize, usize)| a < limit && b < limit;
        let deviation = |a: usize, b: usize, target: f64| {
            let d = (pos[a] - pos[b]).norm() - target;
            d * d
        };

        let pair = w.pair
            * self
                .pairs
                .iter()
                .filter(|p| inside(p))
                .map(|&(a, b)| deviation(a, b, self.pair_distance))
                .sum::<f64>();
        let stacking = w.stacking
            * self
                .stacking
                .iter()
                .filter(|p| inside(p))
                .map(|&(a, b)| deviation(a, b, self.stacking_distance))
                .sum::<f64>();
        let bond = w.bond
            * self
                .bonds
                .iter()
                .filter(|&&k| k + 1 < limit)
                .map(|&k| deviation(k, k + 1, self.bond_length))
                .sum::<f64>();

        let crossings = self.crossings(pos, limit);
        let crossing = w.crossing * crossings as f64;

        let mut clash = 0.0;
        if self.clearance > 0.0 {
            for a in 0..limit {
                for b in a + 1..limit {
                    if self.exempt.contains(&(a, b)) {
                        continue;
                    }
                    let d = (pos[a] - pos[b]).norm();
                    if d < self.clearance {
                        clash += (self.clearance - d) * (self.clearance - d);
                    }
                }
            }
        }
        let clash = w.clash * clash;

        EnergyBreakdown {
            pair,
            stacking,
            crossing,
            crossings,
            clash,
            bond,
            total: pair + stacking + crossing + clash + bond,
        }
    }
}

/// Strict intersection of segments `p1-p2` and `q1-q2`; touching endpoints
/// and collinear overlaps do not count.
pub fn segments_cross(p1: Vec2, p2: Vec2, q1: Vec2, q2: Vec2) -> bool {
    let d1 = cross(p2 - p1, q1 - p1);
    let d2 = cross(p2 - p1, q2 - p1);
    let d3 = cross(q2 - q1, p1 - q1);
    let d4 = cross(q2 - q1, p2 - q1);
    d1 * d2 < 0.0 && d3 * d4 < 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::seed;
    use crate::parser::parse;

    fn v(x: f64, y: f64) -> Vec2 {
        Vec2::new(x, y)
    }

    #[test]
    fn test_segments_cross() {
        assert!(segments_cross(v(0.0, 0.0), v(1.0, 1.0), v(0.0, 1.0), v(1.0, 0.0)));
        assert!(!segments_cross(v(0.0, 0.0), v(1.0, 0.0), v(0.0, 1.0), v(1.0, 1.0)));
        // shared endpoint
        assert!(!segments_cross(v(0.0, 0.0), v(1.0, 0.0), v(1.0, 0.0), v(2.0, 1.0)));
    }

    #[test]
    fn test_seeded_hairpin_has_no_energy() {
        let config = LayoutConfig::default();
        let graph = parse("((((....))))").unwrap();
        let model = EnergyModel::new(&graph, &config);
        let energy = model.breakdown(&seed(&graph, &config), graph.n_bases);
        assert!(energy.total < 1e-12, "{energy:?}");
        assert_eq!(energy.crossings, 0);
    }

    #[test]
    fn test_crossing_and_clash_terms() {
        let config = LayoutConfig::default();
        let graph = PairingGraph::unpaired(4);
        let model = EnergyModel::new(&graph, &config);
        // 0-1 and 2-3 cross in the middle
        let pos = vec![v(0.0, 0.0), v(1.0, 1.0), v(0.0, 1.0), v(1.0, 0.0)];
        let energy = model.breakdown(&pos, 4);
        assert_eq!(energy.crossings, 1);
        assert_eq!(energy.crossing, config.weights.crossing);
        assert!(energy.bond > 0.0);

        let close = vec![v(0.0, 0.0), v(1.0, 0.0), v(1.0, 1.0), v(0.0, 0.5)];
        let energy = model.breakdown(&close, 4);
        assert_eq!(energy.crossings, 0);
        assert!(energy.clash > 0.0);
        // only the first two residues count
        assert_eq!(model.breakdown(&close, 2).total, 0.0);
    }

    #[test]
    fn test_total_within_rejects_new_crossings() {
        let config = LayoutConfig::default();
        let graph = PairingGraph::unpaired(4);
        let model = EnergyModel::new(&graph, &config);
        let crossed = vec![v(0.0, 0.0), v(1.0, 1.0), v(0.0, 1.0), v(1.0, 0.0)];
        assert_eq!(model.total_within(&crossed, 4, 0), f64::INFINITY);
        assert_eq!(model.total_within(&crossed, 4, 1), model.total(&crossed, 4));
        // the crossing lies past the scored prefix but still counts
        assert_eq!(model.total_within(&crossed, 2, 0), f64::INFINITY);
        assert!(model.total_within(&crossed, 2, 1).is_finite());
    }

    #[test]
    fn test_non_finite_is_infinite() {
        let config = LayoutConfig::default();
        let graph = PairingGraph::unpaired(2);
        let model = EnergyModel::new(&graph, &config);
        let pos = vec![v(0.0, 0.0), v(f64::NAN, 0.0)];
        assert_eq!(model.total(&pos, 2), f64::INFINITY);
    }

    #[test]
    fn test_nick_removes_bond() {
        let config = LayoutConfig::default();
        let graph = parse("..+..").unwrap();
        let model = EnergyModel::new(&graph, &config);
        let pos = vec![v(0.0, 0.0), v(1.0, 0.0), v(3.0, 0.0), v(4.0, 0.0)];
        assert_eq!(model.total(&pos, 4), 0.0);
    }
}
