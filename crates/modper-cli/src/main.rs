//! `modper` – command line front end of the modular perceiver.
//!
//! ```text
//! modper atoms --grid world.txt [--objects A,B,C] [--dot modules.dot]
//! modper config
//! ```
//!
//! `atoms` runs the grid-world pipeline on a whitespace separated label grid
//! and prints every true ground atom; `config` prints the effective
//! perceiver configuration.

mod config;
mod pipeline;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info};

use pipeline::Vocabulary;

/// Query a modular perceiver from the command line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.modper/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every true ground atom of a letter grid
    Atoms(AtomsArgs),

    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug)]
struct AtomsArgs {
    /// Grid file: one row per line, cells separated by whitespace, `X` = empty
    #[arg(short, long)]
    grid: PathBuf,

    /// Comma separated objects to reason about (default: every letter found)
    #[arg(short, long, value_delimiter = ',')]
    objects: Option<Vec<String>>,

    /// Write the observed module graph to this DOT file
    #[arg(long)]
    dot: Option<PathBuf>,
}

fn main() -> ExitCode {
    let _guard = telemetry::init_tracing("modper");
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Atoms(args) => atoms(args, cfg),
        Commands::Config => {
            print!("{}", cfg.to_toml_string()?);
            Ok(())
        }
    }
}

fn atoms(args: AtomsArgs, cfg: modper_core::PerceiverConfig) -> anyhow::Result<()> {
    let grid = pipeline::load_grid(&args.grid)?;
    let vocabulary = Vocabulary::default();
    let mut perceiver = pipeline::build_perceiver(grid, &vocabulary, cfg)?;

    let atoms = pipeline::ground_atoms(&mut perceiver, &vocabulary, args.objects.as_deref())
        .context("perception failed")?;
    for atom in &atoms {
        println!("{}", atom.to_string().green());
    }

    let stats = perceiver.stats();
    info!(
        atoms = atoms.len(),
        queries = stats.queries,
        cache_hits = stats.cache_hits,
        module_calls = stats.module_calls,
        "done"
    );

    if let Some(path) = args.dot {
        perceiver
            .write_dot(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("{} {}", "module graph written to".dimmed(), path.display());
    }
    Ok(())
}
