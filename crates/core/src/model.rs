//! Minimal residue/molecule representation consumed by the classifier and
//! analyzer. Richer molecular models convert into these types.

use nalgebra::Point3;
use std::collections::HashMap;

use crate::types::PairingGraph;

/// The four canonical RNA bases.
pub const CANONICAL_BASES: [char; 4] = ['A', 'C', 'G', 'U'];

#[derive(Debug, Clone, PartialEq)]
pub struct Residue {
    /// Chain identifier
    pub chain: String,
    /// Residue sequence number from the source model
    pub number: i32,
    /// One-letter base code, upper case
    pub base: char,
    /// Atom name to position
    atoms: HashMap<String, Point3<f64>>,
}

impl Residue {
    pub fn new(chain: &str, number: i32, base: char) -> Self {
        Self {
            chain: chain.to_string(),
            number,
            base: base.to_ascii_uppercase(),
            atoms: HashMap::new(),
        }
    }

    pub fn with_atom(mut self, name: &str, position: Point3<f64>) -> Self {
        self.add_atom(name, position);
        self
    }

    pub fn add_atom(&mut self, name: &str, position: Point3<f64>) {
        self.atoms.insert(name.to_string(), position);
    }

    pub fn atom(&self, name: &str) -> Option<&Point3<f64>> {
        self.atoms.get(name)
    }

    pub fn is_canonical(&self) -> bool {
        CANONICAL_BASES.contains(&self.base)
    }
}

/// Residues in chain order. Consecutive residues with the same chain id
/// form one strand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Molecule {
    residues: Vec<Residue>,
}

impl Molecule {
    pub fn new(residues: Vec<Residue>) -> Self {
        Self { residues }
    }

    /// Build atom-less residues from a sequence, numbered from 1.
    pub fn from_sequence(chain: &str, sequence: &str) -> Self {
        let residues = sequence
            .chars()
            .enumerate()
            .map(|(k, base)| Residue::new(chain, k as i32 + 1, base))
            .collect();
        Self { residues }
    }

    pub fn residues(&self) -> &[Residue] {
        &self.residues
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    /// Positions where a new chain starts. Always starts with 0.
    pub fn chain_breaks(&self) -> Vec<usize> {
        let mut breaks = vec![0];
        breaks.extend(
            self.residues
                .windows(2)
                .enumerate()
                .filter(|(_, w)| w[0].chain != w[1].chain)
                .map(|(k, _)| k + 1),
        );
        breaks
    }

    pub fn sequence(&self) -> String {
        self.residues.iter().map(|r| r.base).collect()
    }

    /// An unpaired pairing graph over this molecule, with strand breaks at
    /// chain boundaries.
    pub fn empty_pairing(&self) -> PairingGraph {
        PairingGraph::unpaired(self.len()).with_nicks(&self.chain_breaks())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_breaks() {
        let mut residues = Molecule::from_sequence("A", "GGG").residues().to_vec();
        residues.extend_from_slice(Molecule::from_sequence("B", "CC").residues());
        let mol = Molecule::new(residues);
        assert_eq!(mol.chain_breaks(), vec![0, 3]);
        assert_eq!(mol.sequence(), "GGGCC");
        assert_eq!(mol.empty_pairing().nicks, vec![0, 3]);
    }

    #[test]
    fn test_atoms() {
        let r = Residue::new("A", 5, 'g').with_atom("N1", Point3::new(1.0, 2.0, 3.0));
        assert_eq!(r.base, 'G');
        assert!(r.is_canonical());
        assert_eq!(r.atom("N1"), Some(&Point3::new(1.0, 2.0, 3.0)));
        assert!(r.atom("N3").is_none());
    }
}
