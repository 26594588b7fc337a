//! biokg CLI
//!
//! - `biokg build --config build.toml`: run the whole pipeline
//! - `biokg check-config --config build.toml`: parse and validate only

use anyhow::{Context, Result};
use biokg_build::{BuildConfig, BuildPipeline, BuildReport};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "biokg")]
#[command(author, version, about = "Biomedical knowledge-graph builder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the knowledge graph described by a config file.
    Build {
        /// Build configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,
        /// Override `output.directory`
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the build report as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Parse and validate a config file without building.
    CheckConfig {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build {
            config,
            output,
            json,
        } => cmd_build(&config, output, json),
        Commands::CheckConfig { config } => cmd_check_config(&config),
    }
}

fn load_config(path: &Path) -> Result<BuildConfig> {
    BuildConfig::from_file(path).with_context(|| format!("invalid config {}", path.display()))
}

fn cmd_build(path: &Path, output: Option<PathBuf>, json: bool) -> Result<()> {
    let mut config = load_config(path)?;
    if let Some(output) = output {
        config.output.directory = output;
    }
    tracing::info!(
        config = %path.display(),
        output = %config.output.directory.display(),
        reasoner = %config.closure.program,
        "starting build"
    );

    let outcome = match BuildPipeline::new(config).run() {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!(
                "{} stage `{}` after {} items",
                "failed".red().bold(),
                err.stage,
                err.processed
            );
            if err.is_timeout() {
                eprintln!("hint: raise {}", "closure.timeout_secs".bold());
            }
            return Err(err.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    }
    print_summary(&outcome.report);
    eprintln!(
        "{} {}",
        "wrote".green().bold(),
        outcome.output_dir.display().to_string().bold()
    );
    Ok(())
}

fn cmd_check_config(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    eprintln!(
        "{} {} ontologies, {} node tables, {} edge sources, reasoner {} ({}s budget)",
        "ok".green().bold(),
        config.ontologies.len(),
        config.node_tables.len(),
        config.edge_sources.len(),
        config.closure.program,
        config.closure.timeout_secs
    );
    Ok(())
}

fn print_summary(report: &BuildReport) {
    eprintln!(
        "  registry: {} nodes ({} equivalence entries)",
        report.registry_nodes, report.equivalence_entries
    );
    eprintln!(
        "  merge: {} edges, {} axioms, {} conflicts resolved",
        report.merge.edges,
        report.merge.axioms,
        report.merge.conflicts.len()
    );
    let rejected = report.rejected_rows();
    let rejected_text = format!("{rejected} edge rows rejected");
    eprintln!(
        "  edge sources: {}",
        if rejected > 0 {
            rejected_text.yellow().to_string()
        } else {
            rejected_text
        }
    );
    eprintln!("  pruned: {} axioms", report.prune.removed_total());
    eprintln!(
        "  closure ({}): {} edges, {} equivalences inferred",
        report.closure.reasoner,
        report.closure.inferred_edges_added,
        report.closure.equivalences_added
    );
    let filtered: usize = report.filter.rules.iter().map(|r| r.edges_removed).sum();
    eprintln!("  filtered: {filtered} edges");
    eprintln!(
        "  graph: {} triples, {} nodes, {} relations",
        report.statistics.triples.to_string().bold(),
        report.statistics.unique_nodes,
        report.statistics.unique_relations
    );
}
