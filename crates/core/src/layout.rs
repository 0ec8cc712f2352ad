//! 2D layout: deterministic seed, then CMA-ES refinement over growing
//! prefix windows.

use nalgebra::DVector;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::cmaes::{self, CmaesOptions};
use crate::config::{Formulation, LayoutConfig};
use crate::energy::{EnergyBreakdown, EnergyModel};
use crate::error::{ConfigError, StructureError};
use crate::geometry::{self, Vec2};
use crate::loops::decompose;
use crate::parser;
use crate::types::{BasePairRecord, Coordinate, PairingGraph};

/// Finished layout.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Layout {
    pub coordinates: Vec<Coordinate>,
    pub records: Vec<BasePairRecord>,
    pub energy: EnergyBreakdown,
    /// Energy evaluations spent by the optimiser
    pub evaluations: usize,
}

/// Computes 2D coordinates from a pairing graph.
///
/// Seeding alone is exact for nested structures. Pseudoknots are handled by
/// minimising penalties, so pair distances, crossings and clashes there are
/// reduced but not guaranteed to vanish.
#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn layout_dot_bracket(&self, input: &str) -> Result<Layout, StructureError> {
        Ok(self.layout(&parser::parse(input)?))
    }

    #[instrument(skip_all, fields(n = graph.n_bases))]
    pub fn layout(&self, graph: &PairingGraph) -> Layout {
        let n = graph.n_bases;
        let config = &self.config;
        let model = EnergyModel::new(graph, config);
        let seeded = geometry::seed(graph, config);
        let mut pos = seeded.clone();
        let mut evaluations = 0;

        if config.refine && n >= 3 {
            let units = rigid_units(graph);
            let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
            let mut polar = Polar::from_positions(&pos);
            for limit in windows(n, config.window_size, config.window_step) {
                let before = model.total(&pos, limit);
                if before < config.energy_tolerance {
                    debug!(limit, before, "window already relaxed");
                    continue;
                }
                let (refined, spent) = match config.formulation {
                    Formulation::Polar => {
                        self.refine_polar(&model, &mut polar, &units, limit, &mut rng)
                    }
                    Formulation::Cartesian => {
                        self.refine_cartesian(&model, &pos, &units, limit, &mut rng)
                    }
                };
                evaluations += spent;
                if let Some(refined) = refined {
                    let after = model.total(&refined, limit);
                    debug!(limit, before, after, spent, "window refined");
                    pos = refined;
                }
            }
        }

        if pos.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
            warn!("refinement produced non-finite coordinates, keeping the seed");
            pos = seeded;
        }
        if config.align_stem {
            if let Some(angle) = geometry::stem_rotation(graph, &pos) {
                geometry::rotate_all(&mut pos, angle);
            }
        }
        geometry::center_coordinates(&mut pos);

        let energy = model.breakdown(&pos, n);
        info!(
            total = energy.total,
            crossings = energy.crossings,
            evaluations,
            "layout finished"
        );
        Layout {
            coordinates: pos.iter().map(|p| Coordinate { x: p.x, y: p.y }).collect(),
            records: graph.records(),
            energy,
            evaluations,
        }
    }

    fn options(&self, sigma: f64) -> CmaesOptions {
        CmaesOptions {
            sigma,
            max_evaluations: self.config.max_evaluations,
            stall_generations: self.config.stall_generations,
            stall_tolerance: self.config.stall_tolerance,
            target: self.config.energy_tolerance,
            population: None,
        }
    }

    /// Optimise the free turn angles acting on residues below `limit`.
    /// Returns the new positions when the energy went down. Candidates with
    /// more backbone crossings than the starting layout are never kept.
    fn refine_polar(
        &self,
        model: &EnergyModel,
        polar: &mut Polar,
        units: &[Option<usize>],
        limit: usize,
        rng: &mut ChaCha8Rng,
    ) -> (Option<Vec<Vec2>>, usize) {
        // turn k bends the chain at residue k and moves residues k + 1 onwards
        let free: Vec<usize> = (1..limit.saturating_sub(1))
            .filter(|&k| !rigid_at(units, k))
            .collect();
        if free.is_empty() {
            return (None, 0);
        }
        let current = polar.positions(polar.len());
        let before = model.total(&current, limit);
        let allowed = model.crossings(&current, current.len());
        let x0 = DVector::from_iterator(free.len(), free.iter().map(|&k| polar.turns[k - 1]));
        let energy = |x: &DVector<f64>| {
            let mut trial = polar.clone();
            for (&k, &t) in free.iter().zip(x.iter()) {
                trial.turns[k - 1] = t;
            }
            model.total_within(&trial.positions(trial.len()), limit, allowed)
        };
        let outcome = cmaes::minimize_with_restarts(
            energy,
            x0,
            &self.options(self.config.sigma),
            self.config.max_restarts,
            rng,
        );
        if outcome.best_value >= before {
            return (None, outcome.evaluations);
        }
        for (&k, &t) in free.iter().zip(outcome.best.iter()) {
            polar.turns[k - 1] = t;
        }
        (Some(polar.positions(polar.len())), outcome.evaluations)
    }

    /// Optimise per-residue displacements below `limit`.
    fn refine_cartesian(
        &self,
        model: &EnergyModel,
        pos: &[Vec2],
        units: &[Option<usize>],
        limit: usize,
        rng: &mut ChaCha8Rng,
    ) -> (Option<Vec<Vec2>>, usize) {
        let free: Vec<usize> = (0..limit).filter(|&r| !rigid_at(units, r)).collect();
        if free.is_empty() {
            return (None, 0);
        }
        let before = model.total(pos, limit);
        let allowed = model.crossings(pos, pos.len());
        let displaced = |x: &DVector<f64>| {
            let mut trial = pos.to_vec();
            for (slot, &r) in free.iter().enumerate() {
                trial[r] += Vec2::new(x[2 * slot], x[2 * slot + 1]);
            }
            trial
        };
        let energy = |x: &DVector<f64>| model.total_within(&displaced(x), limit, allowed);
        let x0 = DVector::zeros(2 * free.len());
        let sigma = self.config.sigma * self.config.bond_length;
        let outcome = cmaes::minimize_with_restarts(
            energy,
            x0,
            &self.options(sigma),
            self.config.max_restarts,
            rng,
        );
        if outcome.best_value >= before {
            return (None, outcome.evaluations);
        }
        (Some(displaced(&outcome.best)), outcome.evaluations)
    }
}

/// Window limits: the first window, then growing by `step` up to `n`.
fn windows(n: usize, size: usize, step: usize) -> Vec<usize> {
    let mut limits = Vec::new();
    let mut limit = size.min(n);
    loop {
        limits.push(limit);
        if limit >= n {
            break limits;
        }
        limit = (limit + step).min(n);
    }
}

/// The chain as a start point, a start heading, fixed step lengths and the
/// turn between consecutive steps.
#[derive(Debug, Clone)]
struct Polar {
    origin: Vec2,
    heading: f64,
    lengths: Vec<f64>,
    /// turns[k - 1] is the turn at residue k
    turns: Vec<f64>,
}

impl Polar {
    fn from_positions(pos: &[Vec2]) -> Self {
        let steps: Vec<Vec2> = pos.windows(2).map(|w| w[1] - w[0]).collect();
        let headings: Vec<f64> = steps.iter().map(|s| s.y.atan2(s.x)).collect();
        Self {
            origin: pos.first().copied().unwrap_or_else(Vec2::zeros),
            heading: headings.first().copied().unwrap_or(0.0),
            lengths: steps.iter().map(|s| s.norm()).collect(),
            turns: headings.windows(2).map(|h| wrap_angle(h[1] - h[0])).collect(),
        }
    }

    fn len(&self) -> usize {
        if self.lengths.is_empty() {
            1
        } else {
            self.lengths.len() + 1
        }
    }

    /// Positions of the first `count` residues.
    fn positions(&self, count: usize) -> Vec<Vec2> {
        let mut out = Vec::with_capacity(count);
        if count == 0 {
            return out;
        }
        let mut p = self.origin;
        let mut heading = self.heading;
        out.push(p);
        for k in 0..count.saturating_sub(1).min(self.lengths.len()) {
            if k > 0 {
                heading += self.turns[k - 1];
            }
            p += self.lengths[k] * Vec2::new(heading.cos(), heading.sin());
            out.push(p);
        }
        out
    }
}

fn wrap_angle(a: f64) -> f64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    let wrapped = a.rem_euclid(two_pi);
    if wrapped > std::f64::consts::PI {
        wrapped - two_pi
    } else {
        wrapped
    }
}

/// Rigid unit of each residue, if any.
///
/// A helix closed by a hairpin is one unit from its outermost pair through
/// the loop. Any other helix contributes one unit per strand. Units never
/// contain residues paired at a crossing level.
fn rigid_units(graph: &PairingGraph) -> Vec<Option<usize>> {
    let n = graph.n_bases;
    let tree = decompose(graph);
    let mut units = vec![None; n];
    let mut next = 0;
    let crossing = |k: usize| graph.is_paired(k) && graph.levels[k] > 0;
    let stacked = |i: usize, j: usize| {
        i + 1 < j - 1
            && graph.primary_partner(i + 1) == Some(j - 1)
            && graph.is_bonded(i)
            && graph.is_bonded(j - 1)
    };

    for (i, j) in graph.pair_list() {
        if graph.primary_partner(i) != Some(j) {
            continue;
        }
        // only start at the outermost pair of a helix
        let outer = i > 0 && j + 1 < n && graph.primary_partner(i - 1) == Some(j + 1);
        if outer && stacked(i - 1, j + 1) {
            continue;
        }
        let (mut a, mut b) = (i, j);
        while stacked(a, b) {
            a += 1;
            b -= 1;
        }
        let hairpin = tree.closed_by(a).is_some_and(|l| l.is_hairpin());
        if hairpin && !(i..=j).any(|k| crossing(k)) {
            units[i..=j].fill(Some(next));
            next += 1;
        } else {
            for strand in [i..=a, b..=j] {
                units[strand].fill(Some(next));
                next += 1;
            }
        }
    }
    units
}

/// True when residue `k` and both its neighbours belong to one rigid unit.
fn rigid_at(units: &[Option<usize>], k: usize) -> bool {
    if k == 0 || k + 1 >= units.len() {
        return false;
    }
    match units[k] {
        Some(u) => units[k - 1] == Some(u) && units[k + 1] == Some(u),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> LayoutEngine {
        LayoutEngine::default()
    }

    #[test]
    fn test_windows() {
        assert_eq!(windows(10, 24, 16), vec![10]);
        assert_eq!(windows(24, 24, 16), vec![24]);
        assert_eq!(windows(50, 24, 16), vec![24, 40, 50]);
    }

    #[test]
    fn test_polar_reproduces_positions() {
        let graph = parser::parse("((..((...))..))").unwrap();
        let pos = geometry::seed(&graph, &LayoutConfig::default());
        let polar = Polar::from_positions(&pos);
        let again = polar.positions(polar.len());
        assert_eq!(again.len(), pos.len());
        for (a, b) in pos.iter().zip(&again) {
            assert!((a - b).norm() < 1e-9);
        }
    }

    #[test]
    fn test_rigid_units() {
        let graph = parser::parse("((...))..((.((...)).))").unwrap();
        let units = rigid_units(&graph);
        // hairpin-closed helix is a single unit
        assert!(units[0..=6].iter().all(|&u| u == units[0] && u.is_some()));
        assert_eq!(units[7], None);
        // helix closing an internal loop: one unit per strand
        assert_eq!(units[9], units[10]);
        assert_ne!(units[10], units[20]);
        assert!(rigid_at(&units, 3));
        assert!(!rigid_at(&units, 10));
    }

    #[test]
    fn test_pseudoknot_residues_not_rigid() {
        let graph = parser::parse("(([))]").unwrap();
        let units = rigid_units(&graph);
        assert!((0..6).all(|k| !rigid_at(&units, k)));
    }

    #[test]
    fn test_nested_layout_skips_refinement() {
        let layout = engine().layout_dot_bracket("((((....))))").unwrap();
        assert_eq!(layout.evaluations, 0);
        assert!(layout.energy.total < 1e-9);
        assert_eq!(layout.coordinates.len(), 12);
    }

    #[test]
    fn test_pseudoknot_is_refined_without_crossings() {
        let layout = engine().layout_dot_bracket("(([))]").unwrap();
        assert!(layout.evaluations > 0);
        assert_eq!(layout.energy.crossings, 0);
        assert!(layout.coordinates.iter().all(|c| c.x.is_finite() && c.y.is_finite()));
    }

    #[test]
    fn test_cartesian_formulation() {
        let config = LayoutConfig {
            formulation: Formulation::Cartesian,
            max_evaluations: 800,
            ..LayoutConfig::default()
        };
        let graph = parser::parse("(([))]").unwrap();
        let seed_energy = EnergyModel::new(&graph, &config)
            .total(&geometry::seed(&graph, &config), graph.n_bases);
        let layout = LayoutEngine::new(config).unwrap().layout(&graph);
        assert!(layout.energy.total <= seed_energy + 1e-9);
        assert_eq!(layout.energy.crossings, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LayoutConfig {
            pair_distance: 0.0,
            ..LayoutConfig::default()
        };
        assert!(LayoutEngine::new(config).is_err());
    }

    #[test]
    fn test_same_seed_same_layout() {
        let a = engine().layout_dot_bracket("((..[[..))..]]").unwrap();
        let b = engine().layout_dot_bracket("((..[[..))..]]").unwrap();
        assert_eq!(a, b);
    }
}
