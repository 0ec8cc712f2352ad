use nalgebra::Point3;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::catalog::{BasePairType, Candidate, PairConstraint, PairGeometryCatalog, Side};
use crate::config::ClassifierConfig;
use crate::model::{Molecule, Residue};
use crate::types::PairingGraph;

/// Type id of a canonical Watson-Crick pair.
pub const WATSON_CRICK: u32 = 1;

/// A classified pair between residues `i < j` of a molecule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BasePair {
    pub i: usize,
    pub j: usize,
    pub type_id: u32,
}

/// Assigns base-pair types from 3D atom positions.
#[derive(Debug, Clone)]
pub struct BasePairClassifier<'a> {
    catalog: &'a PairGeometryCatalog,
    config: ClassifierConfig,
}

impl BasePairClassifier<'static> {
    pub fn with_builtin(config: ClassifierConfig) -> Self {
        Self::new(PairGeometryCatalog::builtin(), config)
    }
}

impl Default for BasePairClassifier<'static> {
    fn default() -> Self {
        Self::with_builtin(ClassifierConfig::default())
    }
}

impl<'a> BasePairClassifier<'a> {
    pub fn new(catalog: &'a PairGeometryCatalog, config: ClassifierConfig) -> Self {
        Self { catalog, config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Type id of the pair formed by `a` and `b`, or 0 when they do not pair.
    pub fn classify(&self, a: &Residue, b: &Residue) -> u32 {
        self.classify_type(a, b).map_or(0, |t| t.id)
    }

    /// The first catalog type whose constraint groups all hold.
    pub fn classify_type(&self, a: &Residue, b: &Residue) -> Option<&'a BasePairType> {
        if let (Some(pa), Some(pb)) = (
            a.atom(&self.config.anchor_atom),
            b.atom(&self.config.anchor_atom),
        ) {
            if nalgebra::distance(pa, pb) > self.config.anchor_cutoff {
                return None;
            }
        }

        self.catalog
            .candidates(a.base, b.base)
            .into_iter()
            .find(|c| self.matches(c, a, b))
            .map(|c| c.pair_type)
    }

    fn matches(&self, candidate: &Candidate<'_>, a: &Residue, b: &Residue) -> bool {
        let (first, second) = if candidate.swapped { (b, a) } else { (a, b) };
        candidate
            .pair_type
            .groups
            .iter()
            .all(|group| group.iter().any(|c| self.satisfies(c, first, second)))
    }

    fn satisfies(&self, c: &PairConstraint, first: &Residue, second: &Residue) -> bool {
        let (donor, acceptor) = match c.donor {
            Side::A => (first, second),
            Side::B => (second, first),
        };
        let (Some(parent), Some(target)) = (donor.atom(&c.parent), acceptor.atom(&c.acceptor))
        else {
            return false;
        };
        let heavy = nalgebra::distance(parent, target);
        if !within(heavy, c.heavy_distance) {
            return false;
        }
        match donor.atom(&c.hydrogen) {
            Some(hydrogen) => {
                within(nalgebra::distance(hydrogen, target), c.distance)
                    && hbond_angle(parent, hydrogen, target) >= self.config.min_hbond_angle
            }
            None => self.config.heavy_atom_fallback,
        }
    }

    /// Every typed pair `(i, j)` with `i < j`, in scan order.
    #[instrument(skip_all, fields(residues = molecule.len()))]
    pub fn find_base_pairs(&self, molecule: &Molecule) -> Vec<BasePair> {
        let residues = molecule.residues();
        let mut found = Vec::new();
        for (i, a) in residues.iter().enumerate() {
            for (j, b) in residues.iter().enumerate().skip(i + 1) {
                let type_id = self.classify(a, b);
                if type_id != 0 {
                    found.push(BasePair { i, j, type_id });
                }
            }
        }
        debug!(pairs = found.len(), "classified base pairs");
        found
    }

    /// Pairing graph built from Watson-Crick pairs only. A residue keeps the
    /// first partner found in scan order; chain boundaries become strand
    /// breaks.
    #[instrument(skip_all, fields(residues = molecule.len()))]
    pub fn pairing_graph(&self, molecule: &Molecule) -> PairingGraph {
        let mut graph = molecule.empty_pairing();
        for pair in self.find_base_pairs(molecule) {
            if pair.type_id != WATSON_CRICK {
                continue;
            }
            if graph.is_paired(pair.i) || graph.is_paired(pair.j) {
                debug!(i = pair.i, j = pair.j, "residue already paired, skipping");
                continue;
            }
            graph.pairs[pair.i] = pair.j;
            graph.pairs[pair.j] = pair.i;
        }
        graph.assign_levels();
        graph
    }
}

fn within(value: f64, [lo, hi]: [f64; 2]) -> bool {
    lo <= value && value <= hi
}

/// Donor-hydrogen-acceptor angle in degrees.
fn hbond_angle(donor: &Point3<f64>, hydrogen: &Point3<f64>, acceptor: &Point3<f64>) -> f64 {
    (donor - hydrogen).angle(&(acceptor - hydrogen)).to_degrees()
}
