use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use storyweave_backend::cli;
use storyweave_backend::config::StoryweaveConfig;
use storyweave_backend::telemetry;
use storyweave_backend::utils::APP_NAME;

#[derive(Parser)]
#[command(author, version, about = "Storyweave contribution and reward ledger")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a story's contribution forest and its metrics
    Tree {
        #[arg(long)]
        story: u64,
        /// Emit the nested tree as JSON instead of an outline
        #[arg(long)]
        json: bool,
    },
    /// Print a contributor's stats and claimable amount
    Stats {
        #[arg(long)]
        contributor: String,
    },
    /// Append ledger events from a JSON-lines file to the journal
    Import { file: PathBuf },
    /// Print the journal as JSON lines
    Export,
}

fn main() -> Result<()> {
    telemetry::init_tracing();
    let args = Args::parse();
    let config = StoryweaveConfig::from_env()?;
    tracing::debug!(
        app = APP_NAME,
        db = %config.paths.db_path.display(),
        base_rate = %config.rewards.base_rate,
        "configuration loaded"
    );

    let mut out = io::stdout().lock();
    match args.command {
        Command::Tree { story, json } => cli::run_tree(&config, story, json, &mut out),
        Command::Stats { contributor } => cli::run_stats(&config, &contributor, &mut out),
        Command::Import { file } => {
            let imported = cli::run_import(&config, &file)?;
            writeln!(out, "imported {imported} events")?;
            Ok(())
        }
        Command::Export => cli::run_export(&config, &mut out),
    }
}
