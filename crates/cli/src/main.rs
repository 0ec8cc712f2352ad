mod error;
mod logging;

use std::io::Write;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use rnastruct_core::{ClassifierConfig, EngineConfig, Formulation, LayoutConfig};
use tracing::debug;

use crate::error::{CliError, Result};

#[derive(Clone, Copy, Debug, PartialEq, clap::ValueEnum)]
enum Format {
    /// 2D coordinates, pairs and layout energy
    Layout,
    /// Motif decomposition
    Analysis,
    /// Normalised dot-bracket-plus notation
    DotBracket,
}

#[derive(Clone, Copy, Debug, PartialEq, clap::ValueEnum)]
enum FormulationArg {
    Polar,
    Cartesian,
}

impl From<FormulationArg> for Formulation {
    fn from(arg: FormulationArg) -> Self {
        match arg {
            FormulationArg::Polar => Formulation::Polar,
            FormulationArg::Cartesian => Formulation::Cartesian,
        }
    }
}

/// RNA secondary structure analysis and 2D layout
#[derive(Parser, Debug)]
#[command(name = "rnastruct", version)]
struct Cli {
    /// Dot-bracket-plus structure notation
    #[arg(short, long)]
    structure: String,

    /// RNA sequence (e.g. GGGAAACCC), used to label hairpin loop families
    #[arg(short = 'q', long)]
    sequence: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Layout)]
    format: Format,

    /// TOML file with [layout] and [classifier] tables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Optimiser parameterisation
    #[arg(long, value_enum)]
    formulation: Option<FormulationArg>,

    /// Optimiser random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Evaluation budget per optimisation window
    #[arg(long)]
    max_evaluations: Option<usize>,

    /// Keep the seeded layout without optimisation
    #[arg(long)]
    no_refine: bool,

    /// Disable stem auto-alignment
    #[arg(long)]
    no_align: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Silence all logging
    #[arg(long, conflicts_with = "verbose")]
    quiet: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::setup_logging(cli.verbose, cli.quiet) {
        eprintln!("warning: {e}");
    }
    if let Err(e) = run(&cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let output = render(cli)?;
    match &cli.output {
        Some(path) => std::fs::write(path, &output).map_err(|source| CliError::Write {
            path: path.clone(),
            source,
        })?,
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(output.as_bytes())?;
            handle.write_all(b"\n")?;
        }
    }
    Ok(())
}

fn render(cli: &Cli) -> Result<String> {
    match cli.format {
        Format::Layout => {
            let config = layout_config(cli)?;
            debug!(?config, "layout configuration");
            let result = rnastruct_core::compute_layout(&cli.structure, &config)?;
            to_json(&result, cli.pretty)
        }
        Format::Analysis => {
            let analysis =
                rnastruct_core::compute_analysis(&cli.structure, cli.sequence.as_deref())?;
            to_json(&analysis, cli.pretty)
        }
        Format::DotBracket => {
            let graph = rnastruct_core::parse(&cli.structure).map_err(rnastruct_core::Error::from)?;
            let notation =
                rnastruct_core::to_dot_bracket(&graph).map_err(rnastruct_core::Error::from)?;
            Ok(notation)
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}

/// File configuration first, then command-line overrides.
fn layout_config(cli: &Cli) -> Result<LayoutConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let engine = EngineConfig::from_path(path)?;
            if engine.classifier != ClassifierConfig::default() {
                debug!(
                    path = %path.display(),
                    "[classifier] settings only apply to 3D input and are not used here"
                );
            }
            engine.layout
        }
        None => LayoutConfig::default(),
    };
    if let Some(formulation) = cli.formulation {
        config.formulation = formulation.into();
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(max_evaluations) = cli.max_evaluations {
        config.max_evaluations = max_evaluations;
    }
    if cli.no_refine {
        config.refine = false;
    }
    if cli.no_align {
        config.align_stem = false;
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("rnastruct").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_overrides_apply() {
        let args = cli(&[
            "-s",
            "((...))",
            "--formulation",
            "cartesian",
            "--seed",
            "3",
            "--max-evaluations",
            "100",
            "--no-align",
        ]);
        let config = layout_config(&args).unwrap();
        assert_eq!(config.formulation, Formulation::Cartesian);
        assert_eq!(config.seed, 3);
        assert_eq!(config.max_evaluations, 100);
        assert!(!config.align_stem);
        assert!(config.refine);
    }

    #[test]
    fn test_config_file_then_overrides() {
        let path = std::env::temp_dir().join(format!("rnastruct-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[layout]\nseed = 11\nmax_restarts = 2\n\n[classifier]\nmin_hbond_angle = 110.0\n",
        )
        .unwrap();
        let path_arg = path.to_string_lossy().into_owned();
        let args = cli(&["-s", "((...))", "--config", &path_arg, "--seed", "4"]);
        let config = layout_config(&args);
        std::fs::remove_file(&path).unwrap();
        let config = config.unwrap();
        assert_eq!(config.seed, 4);
        assert_eq!(config.max_restarts, 2);
    }

    #[test]
    fn test_dot_bracket_output() {
        let args = cli(&["-s", "((..)).[[..]]", "-f", "dot-bracket"]);
        assert_eq!(render(&args).unwrap(), "((..)).[[..]]");
    }

    #[test]
    fn test_analysis_output() {
        let args = cli(&["-s", "((((....))))", "-f", "analysis"]);
        let json: serde_json::Value = serde_json::from_str(&render(&args).unwrap()).unwrap();
        assert_eq!(json["motifs"].as_array().unwrap().len(), 2);
        assert_eq!(json["motifs"][0]["kind"], "helix");
    }

    #[test]
    fn test_invalid_structure_is_error() {
        let args = cli(&["-s", "((.)"]);
        assert!(matches!(render(&args), Err(CliError::Core(_))));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let parsed = Cli::try_parse_from(["rnastruct", "-s", "..", "-v", "--quiet"]);
        assert!(parsed.is_err());
    }
}
