//! Base-pair geometry catalog.
//!
//! Types are read from TOML (see `data/base_pairs.toml` for the embedded
//! table). The embedded catalog is parsed once and shared read-only.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::CatalogError;
use crate::model::CANONICAL_BASES;

static BUILTIN: OnceLock<PairGeometryCatalog> = OnceLock::new();

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    pair: Vec<PairEntry>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PairEntry {
    id: u32,
    name: String,
    bases: String,
    groups: Vec<Vec<PairConstraint>>,
}

/// Residue of a candidate pair that carries the donor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    A,
    B,
}

/// One hydrogen-bond alternative inside a constraint group.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PairConstraint {
    pub donor: Side,
    pub parent: String,
    pub hydrogen: String,
    pub acceptor: String,
    /// Hydrogen to acceptor bounds in Å
    pub distance: [f64; 2],
    /// Donor to acceptor bounds in Å
    pub heavy_distance: [f64; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasePairType {
    /// 1 = canonical Watson-Crick, larger ids are non-canonical families
    pub id: u32,
    pub name: String,
    /// Base of residue `a` and residue `b`
    pub bases: (char, char),
    /// All groups must hold; a group holds when any of its alternatives does
    pub groups: Vec<Vec<PairConstraint>>,
}

/// A catalog type to test, and whether residue roles are swapped for it.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub pair_type: &'a BasePairType,
    pub swapped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairGeometryCatalog {
    types: Vec<BasePairType>,
}

impl PairGeometryCatalog {
    /// The catalog compiled into the crate.
    ///
    /// # Panics
    ///
    /// Panics if the embedded data is invalid, which is a build defect.
    pub fn builtin() -> &'static PairGeometryCatalog {
        BUILTIN.get_or_init(|| {
            let content = include_str!("../data/base_pairs.toml");
            Self::from_toml_str(content)
                .unwrap_or_else(|e| panic!("Failed to load embedded base-pair catalog: {e}"))
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(content)?;
        let mut seen = HashSet::new();
        let mut types = Vec::with_capacity(file.pair.len());
        for entry in file.pair {
            let pair_type = validate_entry(entry)?;
            if !seen.insert((pair_type.id, pair_type.bases)) {
                let (a, b) = pair_type.bases;
                return Err(CatalogError::Duplicate {
                    id: pair_type.id,
                    bases: format!("{a}{b}"),
                });
            }
            types.push(pair_type);
        }
        Ok(Self { types })
    }

    pub fn types(&self) -> &[BasePairType] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Types to test for residues with bases `a` and `b`.
    ///
    /// For two canonical bases only the types registered for that identity
    /// pair are returned, in either order (reversed registrations come back
    /// with `swapped` set), sorted by id. Anything else gets the full catalog
    /// in both orientations.
    pub fn candidates(&self, a: char, b: char) -> Vec<Candidate<'_>> {
        let a = a.to_ascii_uppercase();
        let b = b.to_ascii_uppercase();
        let canonical = CANONICAL_BASES.contains(&a) && CANONICAL_BASES.contains(&b);
        let mut out: Vec<Candidate<'_>> = if canonical {
            self.types
                .iter()
                .filter_map(|t| {
                    if t.bases == (a, b) {
                        Some(Candidate {
                            pair_type: t,
                            swapped: false,
                        })
                    } else if t.bases == (b, a) {
                        Some(Candidate {
                            pair_type: t,
                            swapped: true,
                        })
                    } else {
                        None
                    }
                })
                .collect()
        } else {
            self.types
                .iter()
                .flat_map(|t| {
                    [
                        Candidate {
                            pair_type: t,
                            swapped: false,
                        },
                        Candidate {
                            pair_type: t,
                            swapped: true,
                        },
                    ]
                })
                .collect()
        };
        out.sort_by_key(|c| (c.pair_type.id, c.swapped));
        out
    }

    pub fn get(&self, id: u32) -> Option<&BasePairType> {
        self.types.iter().find(|t| t.id == id)
    }
}

fn validate_entry(entry: PairEntry) -> Result<BasePairType, CatalogError> {
    let invalid = |reason: String| CatalogError::InvalidEntry {
        name: entry.name.clone(),
        reason,
    };
    if entry.id == 0 {
        return Err(invalid("id 0 is reserved for 'no pair'".into()));
    }
    let chars: Vec<char> = entry.bases.chars().map(|c| c.to_ascii_uppercase()).collect();
    let bases = match chars.as_slice() {
        [a, b] if CANONICAL_BASES.contains(a) && CANONICAL_BASES.contains(b) => (*a, *b),
        _ => {
            return Err(invalid(format!(
                "bases must be two of {CANONICAL_BASES:?}, got '{}'",
                entry.bases
            )))
        }
    };
    if entry.groups.is_empty() {
        return Err(invalid("no constraint groups".into()));
    }
    for (g, group) in entry.groups.iter().enumerate() {
        if group.is_empty() {
            return Err(invalid(format!("group {g} has no alternatives")));
        }
        for c in group {
            if c.parent.is_empty() || c.hydrogen.is_empty() || c.acceptor.is_empty() {
                return Err(invalid(format!("group {g} has an empty atom name")));
            }
            let bounds = [("distance", c.distance), ("heavy_distance", c.heavy_distance)];
            for (label, [lo, hi]) in bounds {
                if !(lo.is_finite() && hi.is_finite() && 0.0 <= lo && lo <= hi) {
                    return Err(invalid(format!("group {g} has bad {label} bounds [{lo}, {hi}]")));
                }
            }
        }
    }
    Ok(BasePairType {
        id: entry.id,
        name: entry.name,
        bases,
        groups: entry.groups,
    })
}
