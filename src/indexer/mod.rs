// Indexer module
// Keeps a note table in step with the files on disk


use std::path::Path;
use tracing::{debug, info};

use crate::database::lancedb::{AddReport, Entry, NoteStore};
use crate::files::{
    FileInfo, FileInfoNode, flatten_file_tree, list_files, note_key, read_file_lossy,
};
use crate::{NotevecError, Result};

/// What `reconcile` did to the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Row count already matched the number of note files
    UpToDate { rows: usize },
    /// The table was emptied and rebuilt from the current files
    Repopulated {
        previous_rows: usize,
        files: usize,
        report: AddReport,
    },
}

/// One single-chunk entry per file, with content read best-effort
#[inline]
pub async fn entries_from_files(files: &[FileInfo]) -> Vec<Entry> {
    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        let content = read_file_lossy(&file.path).await;
        entries.push(Entry::new(file.path.to_string_lossy(), content));
    }
    entries
}

/// Rebuild the table when its row count differs from the number of note files
///
/// Equal counts are taken to mean the table is current; edits that keep the
/// count unchanged are not detected.
#[inline]
pub async fn reconcile(
    store: &NoteStore,
    directory: &Path,
    extensions: &[String],
) -> Result<ReconcileOutcome> {
    let rows = store.count_rows().await?;
    let files = list_files(directory, extensions)?;

    if rows == files.len() {
        debug!(
            "Table {} has {} rows for {} files, nothing to do",
            store.table_name(),
            rows,
            files.len()
        );
        return Ok(ReconcileOutcome::UpToDate { rows });
    }

    info!(
        "Table {} has {} rows but {} files were found, repopulating",
        store.table_name(),
        rows,
        files.len()
    );

    store.delete_all().await?;
    let entries = entries_from_files(&files).await;
    let report = store.add(&entries).await;

    Ok(ReconcileOutcome::Repopulated {
        previous_rows: rows,
        files: files.len(),
        report,
    })
}

/// Add every file of a tree snapshot
#[inline]
pub async fn add_tree(store: &NoteStore, tree: &[FileInfoNode]) -> AddReport {
    let files = flatten_file_tree(tree);
    let entries = entries_from_files(&files).await;
    store.add(&entries).await
}

/// Remove every file of a tree snapshot, one delete per file
///
/// # Returns
/// * `Result<usize>` - Number of paths deleted; stops at the first failure
#[inline]
pub async fn remove_tree(store: &NoteStore, tree: &[FileInfoNode]) -> Result<usize> {
    let files = flatten_file_tree(tree);
    for file in &files {
        store.delete_by_path(&file.path.to_string_lossy()).await?;
    }
    debug!("Removed {} paths from {}", files.len(), store.table_name());
    Ok(files.len())
}

/// Replace the stored content of one note
///
/// `path` is keyed the way listings key it, so any spelling of an existing
/// file replaces the same row. The old rows are deleted before the new one is
/// inserted, so a failure in between leaves the note absent until the next
/// reconcile.
#[inline]
pub async fn update_note(store: &NoteStore, path: &str, content: &str) -> Result<()> {
    let path = note_key(Path::new(path));
    store.delete_by_path(&path).await?;

    let entry = Entry::new(path.as_str(), content);
    let report = store.add(std::slice::from_ref(&entry)).await;

    match report.failed_batches.into_iter().next() {
        None => {
            debug!("Updated note {}", path);
            Ok(())
        }
        Some(failure) => Err(NotevecError::Database(format!(
            "Failed to re-insert note {}: {}",
            path, failure.error
        ))),
    }
}
