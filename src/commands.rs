use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Config, IndexConfig};
use crate::database::lancedb::{AddReport, NoteStore, ProvisionOutcome, connect, resolve_table};
use crate::embeddings::OllamaClient;
use crate::files::{build_file_tree, list_files, path_within, read_file_lossy};
use crate::indexer::{ReconcileOutcome, add_tree, reconcile, remove_tree, update_note};

/// Resolve the notes directory from an explicit argument or the config
///
/// The result is canonical, so every spelling of a directory maps to the same
/// table.
#[inline]
pub fn notes_dir(config: &Config, explicit: Option<PathBuf>) -> Result<PathBuf> {
    let dir = explicit
        .or_else(|| config.index.notes_dir.clone())
        .context("No notes directory given; pass one or set it with `notevec config`")?;
    std::fs::canonicalize(&dir)
        .with_context(|| format!("Failed to resolve notes directory {}", dir.display()))
}

/// Canonical form of a note path given on the command line
#[inline]
pub fn note_path(notes_dir: &Path, path: &Path) -> Result<PathBuf> {
    path_within(notes_dir, path)
        .with_context(|| format!("Cannot use {} as a note path", path.display()))
}

/// Connect to the vector database and provision the table for `notes_dir`
#[inline]
pub async fn open_store(config: &Config, notes_dir: &Path) -> Result<NoteStore> {
    let connection = connect(&config.vector_database_path())
        .await
        .context("Failed to open vector database")?;

    let embedder =
        Arc::new(OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?);

    let resolved = resolve_table(&connection, embedder.as_ref(), notes_dir)
        .await
        .context("Failed to provision note table")?;

    match resolved.outcome {
        ProvisionOutcome::Created => info!("Using new table {}", resolved.name),
        ProvisionOutcome::Reused => info!("Using existing table {}", resolved.name),
        ProvisionOutcome::Recreated => {
            warn!(
                "Table {} was rebuilt for a new embedding width; notes will be re-indexed",
                resolved.name
            );
        }
    }

    Ok(NoteStore::new(resolved.table, embedder).with_batch_size(config.index.insert_batch_size))
}

async fn ollama_health(config: &Config) -> Result<()> {
    let client = OllamaClient::new(&config.ollama)?;
    tokio::task::spawn_blocking(move || client.health_check())
        .await
        .context("Health check task failed")?
}

fn spinner(message: &str) -> ProgressBar {
    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };
    if let Ok(spinner_style) = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
    {
        bar.set_style(spinner_style);
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn print_add_report(report: &AddReport) {
    println!(
        "  Inserted {} notes in {} batches",
        report.inserted_rows, report.succeeded_batches
    );
    for failure in &report.failed_batches {
        println!(
            "  {} batch {} ({} notes): {}",
            style("Failed").red(),
            failure.index + 1,
            failure.size,
            failure.error
        );
    }
}

/// Bring the table for the notes directory up to date
#[inline]
pub async fn index_notes(config: &Config, dir: Option<PathBuf>) -> Result<()> {
    let notes_dir = notes_dir(config, dir)?;
    let store = open_store(config, &notes_dir).await?;

    let bar = spinner(&format!("Indexing {}", notes_dir.display()));
    let outcome = reconcile(&store, &notes_dir, &config.index.extensions).await;
    bar.finish_and_clear();

    match outcome.context("Failed to reconcile notes")? {
        ReconcileOutcome::UpToDate { rows } => {
            println!(
                "{} {} notes already indexed in {}",
                style("✓").green(),
                rows,
                store.table_name()
            );
        }
        ReconcileOutcome::Repopulated {
            previous_rows,
            files,
            report,
        } => {
            println!(
                "{} Rebuilt {} ({} rows before, {} note files)",
                style("✓").green(),
                store.table_name(),
                previous_rows,
                files
            );
            print_add_report(&report);
        }
    }

    Ok(())
}

/// Print the notes most similar to `query`
#[inline]
pub async fn search_notes(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    filter: Option<&str>,
) -> Result<()> {
    let limit = limit.unwrap_or(config.index.search_limit);
    IndexConfig::check_search_limit(limit)?;

    let notes_dir = notes_dir(config, None)?;
    let store = open_store(config, &notes_dir).await?;

    let results = store
        .search(query, limit, filter)
        .await
        .context("Search failed")?;

    if results.entries.is_empty() {
        println!("No matching notes.");
    }

    for (rank, entry) in results.entries.iter().enumerate() {
        println!(
            "{}. {}",
            rank + 1,
            style(&entry.note_path).bold().cyan()
        );
        let preview: String = entry.content.chars().take(160).collect();
        println!("   {}", preview.replace('\n', " "));
    }

    if !results.rejected.is_empty() {
        println!(
            "{} {} malformed rows were skipped",
            style("⚠").yellow(),
            results.rejected.len()
        );
    }

    Ok(())
}

/// Index every note under `path`, a file or directory inside the notes directory
#[inline]
pub async fn add_path(config: &Config, path: &Path) -> Result<()> {
    let notes_dir = notes_dir(config, None)?;
    let path = note_path(&notes_dir, path)?;
    let store = open_store(config, &notes_dir).await?;

    let tree = build_file_tree(&path, &config.index.extensions)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let report = add_tree(&store, &tree).await;

    println!("Added {}", path.display());
    print_add_report(&report);
    Ok(())
}

/// Remove every note under `path` from the index
#[inline]
pub async fn remove_path(config: &Config, path: &Path) -> Result<()> {
    let notes_dir = notes_dir(config, None)?;
    let path = note_path(&notes_dir, path)?;
    let store = open_store(config, &notes_dir).await?;

    let tree = build_file_tree(&path, &config.index.extensions)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let removed = remove_tree(&store, &tree)
        .await
        .context("Failed to remove notes")?;

    println!("Removed {} notes under {}", removed, path.display());
    Ok(())
}

/// Re-read one note from disk and replace its indexed content
#[inline]
pub async fn update_path(config: &Config, path: &Path) -> Result<()> {
    let notes_dir = notes_dir(config, None)?;
    let path = note_path(&notes_dir, path)?;
    let store = open_store(config, &notes_dir).await?;

    let content = read_file_lossy(&path).await;
    update_note(&store, &path.to_string_lossy(), &content)
        .await
        .context("Failed to update note")?;

    println!("Updated {}", path.display());
    Ok(())
}

/// Show table and directory counts
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    let notes_dir = notes_dir(config, None)?;
    let store = open_store(config, &notes_dir).await?;

    let rows = store.count_rows().await.context("Failed to count rows")?;
    let files = list_files(&notes_dir, &config.index.extensions)
        .context("Failed to list note files")?;

    println!("{}", style("📋 Index Status").bold().cyan());
    println!("  Notes directory: {}", notes_dir.display());
    println!("  Table: {}", store.table_name());
    println!("  Embedding model: {}", config.ollama.model);
    println!("  Vector width: {}", store.vector_width());
    println!("  Indexed rows: {}", rows);
    println!("  Note files: {}", files.len());

    if rows == files.len() {
        println!("  {}", style("Up to date").green());
    } else {
        println!(
            "  {}",
            style("Out of date, run `notevec index` to rebuild").yellow()
        );
    }

    println!();
    println!("{}", style("🤖 Ollama Status").bold().cyan());
    match ollama_health(config).await {
        Ok(()) => println!(
            "  {} Connected to {}:{} with model {}",
            style("✓").green(),
            config.ollama.host,
            config.ollama.port,
            config.ollama.model
        ),
        Err(e) => println!("  {} Unhealthy: {:#}", style("⚠").yellow(), e),
    }

    Ok(())
}
