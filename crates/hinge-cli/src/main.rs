//! Hinge CLI
//!
//! - `hinge run`: full solve of a model, then incremental rounds from a
//!   round script
//! - `hinge score`: full solve, then the top activation scores
//! - `hinge diff`: which atoms differ between two model files

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use hinge_model::{GroundProgram, MemoryStore, ModelFile, StoreDiff};
use hinge_online::{rank_descending, OnlineConfig, OnlineInference, RoundResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod rounds;

use rounds::RoundsFile;

#[derive(Parser)]
#[command(name = "hinge")]
#[command(author, version, about = "Hinge: incremental hinge-loss inference")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a model, then run incremental rounds
    Run {
        /// Model file (predicates, atoms, kernels)
        #[arg(short, long)]
        model: PathBuf,
        /// Online inference configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Round script; without one only the initial solve runs
        #[arg(short, long)]
        rounds: Option<PathBuf>,
        /// Print one JSON object per round
        #[arg(long)]
        json: bool,
    },

    /// Solve a model and print its activation scores
    Score {
        #[arg(short, long)]
        model: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of scores to print
        #[arg(short, long, default_value = "10")]
        top: usize,
    },

    /// Compare the atoms of two model files
    Diff {
        #[arg(long)]
        before: PathBuf,
        #[arg(long)]
        after: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            model,
            config,
            rounds,
            json,
        } => cmd_run(&model, config.as_deref(), rounds.as_deref(), json),
        Commands::Score { model, config, top } => cmd_score(&model, config.as_deref(), top),
        Commands::Diff { before, after } => cmd_diff(&before, &after),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load_model(path: &Path) -> Result<(Arc<MemoryStore>, Arc<GroundProgram>)> {
    let model = ModelFile::from_json_file(path)
        .with_context(|| format!("loading model {}", path.display()))?;
    let store = model
        .build_store()
        .with_context(|| format!("building store from {}", path.display()))?;
    let program = model
        .build_program()
        .with_context(|| format!("building program from {}", path.display()))?;
    Ok((Arc::new(store), Arc::new(program)))
}

fn load_config(path: Option<&Path>) -> Result<OnlineConfig> {
    match path {
        Some(path) => OnlineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(OnlineConfig::default()),
    }
}

fn cmd_run(model: &Path, config: Option<&Path>, rounds: Option<&Path>, json: bool) -> Result<()> {
    let (store, program) = load_model(model)?;
    let config = load_config(config)?;
    let script = match rounds {
        Some(path) => RoundsFile::from_json_file(path)?,
        None => RoundsFile::default(),
    };

    let mut online = OnlineInference::with_admm(Arc::clone(&store), program, config)?;
    let initial = online.run_round(&[]).context("initial solve")?;
    print_round(&initial, json)?;

    for (i, spec) in script.rounds.iter().enumerate() {
        let seeds = spec
            .prepare(&store)
            .with_context(|| format!("preparing round {}", i + 1))?;
        let result = online
            .run_round(&seeds)
            .with_context(|| format!("round {}", i + 1))?;
        print_round(&result, json)?;
    }
    Ok(())
}

fn print_round(result: &RoundResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(result)?);
        return Ok(());
    }

    let label = if result.first_round {
        "initial".to_string()
    } else {
        format!("round {}", result.round)
    };
    let status = if result.converged {
        "converged".green()
    } else {
        "not converged".yellow()
    };
    println!(
        "{} {} ({} iterations)",
        label.bold(),
        status,
        result.iterations
    );
    println!(
        "  {} activated {}, clamped {}, committed {}, problem size {}",
        "→".cyan(),
        result.activated_count,
        result.clamped_count,
        result.committed_count,
        result.problem_size
    );
    if let Some(quota) = result.quota {
        println!("  {} quota {}", "→".cyan(), quota);
    }
    println!(
        "  {} incompatibility {:.4}, infeasibility {:.6}",
        "→".cyan(),
        result.total_weighted_incompatibility,
        result.infeasibility_norm
    );
    if let Some(diag) = &result.quota_diagnostic {
        println!("  {} {}", "warning:".yellow().bold(), diag);
    }
    if let Some(shortfall) = result.sampling_shortfall {
        println!(
            "  {} sampling stopped {} short of the quota",
            "warning:".yellow().bold(),
            shortfall
        );
    }
    if let Some(fallback) = &result.scoring_fallback {
        println!("  {} {}", "warning:".yellow().bold(), fallback);
    }
    Ok(())
}

fn cmd_score(model: &Path, config: Option<&Path>, top: usize) -> Result<()> {
    let (store, program) = load_model(model)?;
    let config = load_config(config)?;
    let mut online = OnlineInference::with_admm(store, program, config)?;
    online.run_round(&[]).context("initial solve")?;

    let scores = online.scores().unwrap_or_default();
    println!(
        "{} {} variables scored",
        "ok".green().bold(),
        scores.len()
    );
    for (atom, score) in rank_descending(&scores).into_iter().take(top) {
        println!("  {:>10.4}  {}", score, atom);
    }
    Ok(())
}

fn cmd_diff(before: &Path, after: &Path) -> Result<()> {
    let (before_store, _) = load_model(before)?;
    let (after_store, _) = load_model(after)?;
    let diff = StoreDiff::between(&before_store.image(), &after_store.image());

    if diff.is_empty() {
        println!("{} no differences", "ok".green().bold());
        return Ok(());
    }
    for atom in &diff.updated {
        println!("  {} {}", "~".yellow(), atom);
    }
    for atom in &diff.added {
        println!("  {} {}", "+".green(), atom);
    }
    for atom in &diff.removed {
        println!("  {} {}", "-".red(), atom);
    }
    println!(
        "{} updated, {} added, {} removed",
        diff.updated.len(),
        diff.added.len(),
        diff.removed.len()
    );
    Ok(())
}
