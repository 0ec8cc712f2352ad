pub mod catalog;
mod classifier;
pub mod cmaes;
pub mod config;
mod energy;
pub mod error;
mod geometry;
mod layout;
pub mod loop_families;
mod loops;
mod model;
mod motifs;
mod parser;
mod types;

use serde::Serialize;

pub use catalog::{BasePairType, PairGeometryCatalog};
pub use classifier::{BasePair, BasePairClassifier, WATSON_CRICK};
pub use config::{ClassifierConfig, EngineConfig, Formulation, LayoutConfig};
pub use energy::EnergyBreakdown;
pub use error::{CatalogError, ConfigError, Error, StructureError};
pub use layout::{Layout, LayoutEngine};
pub use loops::{decompose, LoopTree};
pub use model::{Molecule, Residue};
pub use motifs::{
    analyze, analyze_with_sequence, Analysis, Motif, MotifKind, SecondaryStructureAnalyzer,
};
pub use parser::{parse, to_dot_bracket};
pub use types::*;

/// Layout of one structure together with its pairing.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct DrawResult {
    pub layout: Layout,
    pub nicks: Vec<usize>,
    pub pairs: Vec<usize>,
    pub dot_bracket: String,
}

/// Parse dot-bracket-plus notation and lay it out with `config`.
pub fn compute_layout(input: &str, config: &LayoutConfig) -> Result<DrawResult, Error> {
    let graph = parser::parse(input)?;
    let engine = LayoutEngine::new(config.clone())?;
    let layout = engine.layout(&graph);
    let dot_bracket = parser::to_dot_bracket(&graph)?;
    Ok(DrawResult {
        layout,
        nicks: graph.nicks,
        pairs: graph.pairs,
        dot_bracket,
    })
}

/// Parse dot-bracket-plus notation and split it into motifs.
pub fn compute_analysis(input: &str, sequence: Option<&str>) -> Result<Analysis, Error> {
    let graph = parser::parse(input)?;
    Ok(match sequence {
        Some(seq) => motifs::analyze_with_sequence(&graph, seq),
        None => motifs::analyze(&graph),
    })
}

/// Main entry point: takes dot-bracket-plus notation, returns JSON string.
/// Empty on invalid input.
pub fn draw_structure(input: &str) -> String {
    compute_layout(input, &LayoutConfig::default())
        .ok()
        .and_then(|r| serde_json::to_string(&r).ok())
        .unwrap_or_default()
}

/// Motif decomposition as a JSON string. Empty on invalid input.
pub fn analyze_structure(input: &str, sequence: Option<&str>) -> String {
    compute_analysis(input, sequence)
        .ok()
        .and_then(|a| serde_json::to_string(&a).ok())
        .unwrap_or_default()
}
