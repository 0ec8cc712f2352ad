use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Options for geometric base-pair classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Atom used for the fast distance reject (default: "C1'")
    pub anchor_atom: String,
    /// Anchor separation above which two residues never pair, in Å (default: 25.0)
    pub anchor_cutoff: f64,
    /// Minimum donor–hydrogen–acceptor angle in degrees (default: 120.0)
    pub min_hbond_angle: f64,
    /// Test heavy-atom distances alone when a constraint's hydrogen is absent (default: true)
    pub heavy_atom_fallback: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            anchor_atom: "C1'".into(),
            anchor_cutoff: 25.0,
            min_hbond_angle: 120.0,
            heavy_atom_fallback: true,
        }
    }
}

/// Parameterisation used by the layout optimiser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Formulation {
    /// Per-step turn angles; bond lengths stay fixed.
    #[default]
    Polar,
    /// Per-residue displacements with an explicit bond-length term.
    Cartesian,
}

/// Weights of the layout energy terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyWeights {
    pub pair: f64,
    pub stacking: f64,
    /// Added once per crossing of two backbone segments
    pub crossing: f64,
    pub clash: f64,
    /// Only used by the Cartesian formulation
    pub bond: f64,
}

impl Default for EnergyWeights {
    fn default() -> Self {
        Self {
            pair: 10.0,
            stacking: 2.0,
            crossing: 1000.0,
            clash: 5.0,
            bond: 10.0,
        }
    }
}

/// Options for the 2D layout engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Distance between sequential residues (default: 1.0)
    pub bond_length: f64,
    /// Distance between paired residues (default: 1.0)
    pub pair_distance: f64,
    /// Non-bonded residues closer than this are penalised (default: 0.75)
    pub clearance: f64,
    /// Chord between the chain ends when the external loop is drawn as a polygon (default: 1.5)
    pub gap_length: f64,
    pub weights: EnergyWeights,
    pub formulation: Formulation,
    /// Run the optimiser after seeding (default: true)
    pub refine: bool,
    /// Optimiser random seed (default: 7)
    pub seed: u64,
    /// Evaluation budget per window, shared by all restarts (default: 40000)
    pub max_evaluations: usize,
    /// Optimiser restarts with a doubled population after a stall (default: 8)
    pub max_restarts: usize,
    /// Initial CMA-ES step size (default: 0.25)
    pub sigma: f64,
    /// Residues in the first optimisation window (default: 24)
    pub window_size: usize,
    /// Residues added per window (default: 16)
    pub window_step: usize,
    /// Generations without relative improvement before a run stops; grows
    /// with the number of free parameters (default: 60)
    pub stall_generations: usize,
    /// Relative improvement that counts as progress (default: 1e-6)
    pub stall_tolerance: f64,
    /// Windows whose energy is already below this are not optimised (default: 1e-9)
    pub energy_tolerance: f64,
    /// Rotate so the root helix points up (default: true)
    pub align_stem: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            bond_length: 1.0,
            pair_distance: 1.0,
            clearance: 0.75,
            gap_length: 1.5,
            weights: EnergyWeights::default(),
            formulation: Formulation::Polar,
            refine: true,
            seed: 7,
            max_evaluations: 40_000,
            max_restarts: 8,
            sigma: 0.25,
            window_size: 24,
            window_step: 16,
            stall_generations: 60,
            stall_tolerance: 1e-6,
            energy_tolerance: 1e-9,
            align_stem: true,
        }
    }
}

impl LayoutConfig {
    /// Target distance between a residue and the partner of its stacked neighbour.
    pub fn stacking_distance(&self) -> f64 {
        self.pair_distance.hypot(self.bond_length)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be a positive number, got {value}"),
                })
            }
        }
        positive("bond_length", self.bond_length)?;
        positive("pair_distance", self.pair_distance)?;
        positive("gap_length", self.gap_length)?;
        positive("sigma", self.sigma)?;
        if !(self.clearance.is_finite() && self.clearance >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "clearance",
                reason: format!("must be zero or positive, got {}", self.clearance),
            });
        }
        if self.window_size < 2 {
            return Err(ConfigError::Invalid {
                field: "window_size",
                reason: "must be at least 2".into(),
            });
        }
        if self.window_step == 0 {
            return Err(ConfigError::Invalid {
                field: "window_step",
                reason: "must be at least 1".into(),
            });
        }
        let w = &self.weights;
        for (field, value) in [
            ("weights.pair", w.pair),
            ("weights.stacking", w.stacking),
            ("weights.crossing", w.crossing),
            ("weights.clash", w.clash),
            ("weights.bond", w.bond),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be zero or positive, got {value}"),
                });
            }
        }
        Ok(())
    }
}

/// Full engine configuration, as read from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub classifier: ClassifierConfig,
    pub layout: LayoutConfig,
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.layout.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}
