//! Operator commands. Every command rebuilds in-memory state from the
//! on-disk journal; only `import` writes to it.

use crate::collaborators::DryRunTransfer;
use crate::config::StoryweaveConfig;
use crate::database::models::StoryId;
use crate::database::Database;
use crate::events::{EventJournal, LedgerEvent, SqliteEventJournal};
use crate::metrics::TreeMetrics;
use crate::story::StoryService;
use crate::utils::format_unix;
use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;

pub fn open_journal(config: &StoryweaveConfig) -> Result<SqliteEventJournal> {
    config.paths.ensure_dirs()?;
    let database = Database::connect(&config.paths)
        .with_context(|| format!("failed to open {}", config.paths.db_path.display()))?;
    let fresh = database.ensure_migrations()?;
    if fresh {
        tracing::info!(path = %config.paths.db_path.display(), "created new journal database");
    }
    Ok(SqliteEventJournal::new(database))
}

/// Replays `events` into a throwaway service. Payouts go to a dry-run
/// transfer, which replay never calls anyway.
pub fn rebuild(config: &StoryweaveConfig, events: Vec<LedgerEvent>) -> Result<StoryService> {
    let service = StoryService::in_memory(&config.rewards, Arc::new(DryRunTransfer::new()));
    service
        .replay(events)
        .context("journal does not replay cleanly")?;
    Ok(service)
}

pub fn run_tree<W: Write>(
    config: &StoryweaveConfig,
    story_id: StoryId,
    json: bool,
    out: &mut W,
) -> Result<()> {
    let journal = open_journal(config)?;
    let service = rebuild(config, journal.load()?)?;
    let forest = service.story_forest(story_id)?;

    if json {
        serde_json::to_writer_pretty(&mut *out, &forest.to_view())?;
        writeln!(out)?;
        return Ok(());
    }

    for node in forest.iter() {
        let c = &node.contribution;
        let indent = "  ".repeat(node.level as usize);
        let marker = match (c.is_branch, node.orphaned) {
            (true, _) => format!(" [branch: {}]", c.branch_title.as_deref().unwrap_or("")),
            (false, true) => " [orphan]".to_string(),
            (false, false) => String::new(),
        };
        writeln!(
            out,
            "{indent}#{} {} +{}/-{} {} {}{marker}",
            c.id,
            c.contributor,
            c.upvotes,
            c.downvotes,
            c.status.as_str(),
            format_unix(c.created_at),
        )?;
    }

    let TreeMetrics {
        total_contributions,
        root_contributions,
        branch_count,
        max_depth,
    } = TreeMetrics::from_forest(&forest);
    writeln!(
        out,
        "story {story_id}: {total_contributions} contributions, {root_contributions} roots, {branch_count} branches, depth {max_depth}"
    )?;
    Ok(())
}

pub fn run_stats<W: Write>(
    config: &StoryweaveConfig,
    contributor: &str,
    out: &mut W,
) -> Result<()> {
    let journal = open_journal(config)?;
    let service = rebuild(config, journal.load()?)?;
    let stats = service.contributor_stats(contributor)?;
    let claimable = service.claimable_amount(contributor)?;

    writeln!(out, "contributor:      {}", stats.contributor)?;
    writeln!(out, "contributions:    {}", stats.total_contributions)?;
    writeln!(out, "upvotes:          {}", stats.total_upvotes)?;
    writeln!(out, "average rating:   {}%", stats.average_rating)?;
    writeln!(out, "rewards earned:   {}", stats.total_rewards_earned)?;
    writeln!(out, "claimable:        {claimable}")?;
    match stats.last_contribution_time {
        Some(ts) => writeln!(out, "last contributed: {}", format_unix(ts))?,
        None => writeln!(out, "last contributed: never")?,
    }
    Ok(())
}

/// Appends events from a JSON-lines file. The combined journal is replayed
/// first; nothing is written if any line is malformed or does not apply.
pub fn run_import(config: &StoryweaveConfig, path: &Path) -> Result<usize> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut incoming = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: LedgerEvent = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: not a ledger event", path.display(), index + 1))?;
        incoming.push(event);
    }

    let journal = open_journal(config)?;
    let mut combined = journal.load()?;
    combined.extend(incoming.iter().cloned());
    rebuild(config, combined)?;

    for event in &incoming {
        journal.append(event)?;
    }
    tracing::info!(path = %path.display(), imported = incoming.len(), "events imported");
    Ok(incoming.len())
}

pub fn run_export<W: Write>(config: &StoryweaveConfig, out: &mut W) -> Result<()> {
    let journal = open_journal(config)?;
    for event in journal.load()? {
        serde_json::to_writer(&mut *out, &event)?;
        writeln!(out)?;
    }
    Ok(())
}
