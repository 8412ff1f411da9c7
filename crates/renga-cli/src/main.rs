//! renga command-line tool.
//!
//! Works on a session file: a JSON array of blocks.
//!
//! Usage:
//!   renga graph session.json
//!   renga cascade session.json nasdaq
//!   renga inline session.json "Summarize @block:nasdaq"
//!   renga refresh session.json --config renga.toml --delay-ms 20 --write

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use renga_kernel::{
    DependencyGraph, EchoCapability, RefreshConfig, RefreshEvent, RefreshOutcome, Session,
    cascade_dependents, refresh_channel,
};
use renga_types::{Block, BlockId, resolve_block_prefix};

/// Inspect renga sessions and run refresh passes.
#[derive(Parser, Debug)]
#[command(name = "renga")]
#[command(about = "Live-block dependency graph and refresh scheduler")]
struct Args {
    /// TOML config (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print each block's references and dependents
    Graph {
        session: PathBuf,
    },
    /// Print the blocks that would refresh if BLOCK changed
    Cascade {
        session: PathBuf,
        /// Alias or id prefix
        block: String,
    },
    /// Print TEXT with mentions replaced by referenced content
    Inline {
        session: PathBuf,
        text: String,
    },
    /// Open the session with the echo capability and run the on-open pass
    Refresh {
        session: PathBuf,
        /// Delay before each streamed fragment
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
        /// Write refreshed blocks back to the session file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => RefreshConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RefreshConfig::default(),
    };

    match args.command {
        Command::Graph { session } => cmd_graph(&load_blocks(&session)?),
        Command::Cascade { session, block } => cmd_cascade(&load_blocks(&session)?, &block, &config),
        Command::Inline { session, text } => cmd_inline(&load_blocks(&session)?, &text, &config),
        Command::Refresh {
            session,
            delay_ms,
            write,
        } => cmd_refresh(&session, config, delay_ms, write).await,
    }
}

fn load_blocks(path: &Path) -> Result<Vec<Block>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading session {}", path.display()))?;
    let mut blocks: Vec<Block> = serde_json::from_str(&text)
        .with_context(|| format!("parsing session {}", path.display()))?;
    blocks.sort_by_key(Block::sort_key);
    Ok(blocks)
}

fn save_blocks(path: &Path, blocks: &[Block]) -> Result<()> {
    let json = serde_json::to_string_pretty(blocks)?;
    std::fs::write(path, json).with_context(|| format!("writing session {}", path.display()))
}

fn resolve(blocks: &[Block], query: &str) -> Result<BlockId> {
    let entries = blocks.iter().map(|b| (b.id, b.alias.as_deref()));
    Ok(resolve_block_prefix(entries, query)?)
}

fn labels(blocks: &[Block], ids: impl IntoIterator<Item = BlockId>) -> String {
    let names: Vec<String> = ids
        .into_iter()
        .map(|id| match blocks.iter().find(|b| b.id == id) {
            Some(b) => b.label(),
            None => format!("{}?", id.short()),
        })
        .collect();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}

fn cmd_graph(blocks: &[Block]) -> Result<()> {
    let graph = DependencyGraph::from_blocks(blocks);
    for block in blocks {
        println!("{} [{}, {}]", block.label(), block.kind, block.refresh_trigger());
        println!("  references: {}", labels(blocks, graph.references(block.id).iter().copied()));
        println!(
            "  dependents: {}",
            labels(blocks, graph.direct_dependents(block.id).iter().copied())
        );
    }
    println!("{} blocks, {} edges", blocks.len(), graph.edge_count());
    Ok(())
}

fn cmd_cascade(blocks: &[Block], query: &str, config: &RefreshConfig) -> Result<()> {
    let origin = resolve(blocks, query)?;
    let graph = DependencyGraph::from_blocks(blocks);
    let cascade = cascade_dependents(&graph, origin, config.max_cascade_depth);
    if cascade.is_empty() {
        println!("no dependents");
        return Ok(());
    }
    for (i, id) in cascade.iter().enumerate() {
        let Some(block) = blocks.iter().find(|b| b.id == *id) else {
            continue;
        };
        println!("{:>2}. {} ({})", i + 1, block.label(), block.refresh_trigger());
    }
    Ok(())
}

fn cmd_inline(blocks: &[Block], text: &str, config: &RefreshConfig) -> Result<()> {
    let parser = config.mention_parser()?;
    println!("{}", parser.inline(text, blocks));
    Ok(())
}

async fn cmd_refresh(path: &Path, config: RefreshConfig, delay_ms: u64, write: bool) -> Result<()> {
    let blocks = load_blocks(path)?;
    let mut capability = EchoCapability::new();
    if delay_ms > 0 {
        capability = capability.with_delay(Duration::from_millis(delay_ms));
    }

    let (tx, mut rx) = refresh_channel();
    let session = Session::open(blocks, Arc::new(capability), config, tx)?;

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match &event {
                RefreshEvent::Chunk { text, .. } => {
                    tracing::debug!(block = %event.block_id().short(), text, "chunk");
                }
                RefreshEvent::Complete { text, .. } => {
                    println!("{} {} {}", event.subject(), event.block_id().short(), text);
                }
                RefreshEvent::Error { error, .. } => {
                    println!("{} {} {}", event.subject(), event.block_id().short(), error);
                }
                RefreshEvent::Started { .. } => {
                    println!("{} {}", event.subject(), event.block_id().short());
                }
            }
        }
    });

    let outcomes = session.refresh_on_open().await;
    let refreshed = session.close();
    printer.await.context("event printer task")?;

    let completed = outcomes.iter().filter(|o| o.is_completed()).count();
    let skipped: Vec<&RefreshOutcome> = outcomes.iter().filter(|o| o.is_skipped()).collect();
    for outcome in &skipped {
        if let RefreshOutcome::Skipped { block_id, reason } = outcome {
            println!("skipped {} ({})", block_id.short(), reason);
        }
    }
    println!(
        "{} refreshed, {} failed, {} skipped",
        completed,
        outcomes.len() - completed - skipped.len(),
        skipped.len()
    );

    if write {
        save_blocks(path, &refreshed)?;
        tracing::info!(path = %path.display(), "session written");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use renga_types::BlockBuilder;

    #[test]
    fn test_session_file_round_trip_sorts_by_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let late = BlockBuilder::new(BlockId::new(), 5).alias("late").build();
        let early = BlockBuilder::new(BlockId::new(), 1).alias("early").reference(late.id).build();
        save_blocks(&path, &[late.clone(), early.clone()]).unwrap();

        let loaded = load_blocks(&path).unwrap();
        assert_eq!(loaded, vec![early, late]);
    }

    #[test]
    fn test_resolve_by_alias_and_prefix() {
        let a = BlockBuilder::new(BlockId::new(), 0).alias("nasdaq").build();
        let b = Block::new(BlockId::new(), 1, "");
        let blocks = vec![a.clone(), b.clone()];

        assert_eq!(resolve(&blocks, "NASDAQ").unwrap(), a.id);
        assert_eq!(resolve(&blocks, &b.id.to_hex()[..10]).unwrap(), b.id);
        assert!(resolve(&blocks, "missing").is_err());
    }

    #[test]
    fn test_labels_marks_unknown_ids() {
        let a = BlockBuilder::new(BlockId::new(), 0).alias("nasdaq").build();
        let ghost = BlockId::new();
        let blocks = vec![a.clone()];
        assert_eq!(labels(&blocks, [a.id]), "nasdaq");
        assert_eq!(labels(&blocks, [ghost]), format!("{}?", ghost.short()));
        assert_eq!(labels(&blocks, Vec::new()), "-");
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_blocks(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("reading session"));
    }
}
