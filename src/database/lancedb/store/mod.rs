
use arrow::array::RecordBatchIterator;
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::Table;
use lancedb::arrow::SendableRecordBatchStream;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{
    DEFAULT_INSERT_BATCH_SIZE, DatabaseFields, Entry, MalformedRecord, entries_from_record_batch,
    entries_to_record_batch,
};
use crate::embeddings::EmbeddingFunction;
use crate::{NotevecError, Result};

/// CRUD facade over one provisioned note table
///
/// Vectors are computed with the bound embedding function on insert and for
/// similarity queries.
pub struct NoteStore {
    table: Table,
    embedder: Arc<dyn EmbeddingFunction>,
    batch_size: usize,
}

/// A batch that could not be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Position of the batch within the `add` call
    pub index: usize,
    pub size: usize,
    pub error: String,
}

/// Result of a batched insert; failed batches are not retried
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddReport {
    pub succeeded_batches: usize,
    pub inserted_rows: usize,
    pub failed_batches: Vec<BatchFailure>,
}

impl AddReport {
    /// Whether every batch made it into the table
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.failed_batches.is_empty()
    }

    #[inline]
    pub fn failed_rows(&self) -> usize {
        self.failed_batches.iter().map(|f| f.size).sum()
    }
}

/// Entries read from the table plus rows that failed validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub entries: Vec<Entry>,
    pub rejected: Vec<MalformedRecord>,
    rows_seen: usize,
}

impl SearchResults {
    /// Append the rows of the next result batch
    ///
    /// Rejected rows are numbered across every batch absorbed so far.
    #[inline]
    pub fn absorb(&mut self, batch: &RecordBatch) {
        let first_row = self.rows_seen;
        let (entries, rejected) = entries_from_record_batch(batch);
        self.entries.extend(entries);
        self.rejected
            .extend(rejected.into_iter().map(|mut malformed| {
                malformed.row += first_row;
                malformed
            }));
        self.rows_seen += batch.num_rows();
    }
}

/// Filter matching rows whose note path equals `path`
#[inline]
pub fn path_filter(path: &str) -> String {
    format!("{} = '{}'", DatabaseFields::NOTE_PATH, path.replace('\'', "''"))
}

impl NoteStore {
    #[inline]
    pub fn new(table: Table, embedder: Arc<dyn EmbeddingFunction>) -> Self {
        Self {
            table,
            embedder,
            batch_size: DEFAULT_INSERT_BATCH_SIZE,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        self.table.name()
    }

    #[inline]
    pub fn vector_width(&self) -> usize {
        self.embedder.vector_width()
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Insert entries in batches, continuing past failed batches
    ///
    /// # Returns
    /// * `AddReport` - Which batches were inserted and which failed
    #[inline]
    pub async fn add(&self, entries: &[Entry]) -> AddReport {
        let mut report = AddReport::default();
        if entries.is_empty() {
            debug!("No entries to add");
            return report;
        }

        let batch_count = entries.len().div_ceil(self.batch_size);
        debug!(
            "Adding {} entries to {} in {} batches",
            entries.len(),
            self.table_name(),
            batch_count
        );

        for (index, batch) in entries.chunks(self.batch_size).enumerate() {
            match self.add_batch(batch).await {
                Ok(()) => {
                    report.succeeded_batches += 1;
                    report.inserted_rows += batch.len();
                }
                Err(e) => {
                    error!(
                        "Failed to add batch {}/{} ({} entries): {}",
                        index + 1,
                        batch_count,
                        batch.len(),
                        e
                    );
                    report.failed_batches.push(BatchFailure {
                        index,
                        size: batch.len(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Added {} entries to {} ({} of {} batches failed)",
            report.inserted_rows,
            self.table_name(),
            report.failed_batches.len(),
            batch_count
        );
        report
    }

    async fn add_batch(&self, batch: &[Entry]) -> Result<()> {
        let entries = self.with_vectors(batch).await?;
        let record_batch = entries_to_record_batch(&entries, self.vector_width())?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        self.table
            .add(reader)
            .execute()
            .await
            .map_err(|e| NotevecError::Database(format!("Failed to insert entries: {}", e)))?;

        Ok(())
    }

    /// Fill in missing vectors with one embedding call for the batch
    async fn with_vectors(&self, batch: &[Entry]) -> Result<Vec<Entry>> {
        let mut entries = batch.to_vec();
        let pending: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.vector.is_none())
            .map(|(i, _)| i)
            .collect();

        if pending.is_empty() {
            return Ok(entries);
        }

        let texts: Vec<String> = pending
            .iter()
            .map(|&i| entries[i].content.clone())
            .collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != pending.len() {
            return Err(NotevecError::Embedding(format!(
                "Expected {} embeddings, got {}",
                pending.len(),
                vectors.len()
            )));
        }

        for (i, vector) in pending.into_iter().zip(vectors) {
            entries[i].vector = Some(vector);
        }
        Ok(entries)
    }

    /// Delete rows matching a SQL filter expression
    #[inline]
    pub async fn delete(&self, filter: &str) -> Result<()> {
        debug!("Deleting from {} where {}", self.table_name(), filter);
        self.table
            .delete(filter)
            .await
            .map_err(|e| NotevecError::Database(format!("Failed to delete entries: {}", e)))?;
        Ok(())
    }

    /// Delete every row for a note path
    #[inline]
    pub async fn delete_by_path(&self, path: &str) -> Result<()> {
        self.delete(&path_filter(path)).await
    }

    /// Delete every row in the table
    #[inline]
    pub async fn delete_all(&self) -> Result<()> {
        self.delete("true").await
    }

    /// Similarity search for `query`, optionally restricted by a filter
    ///
    /// An empty query performs a plain scan instead: every row matching
    /// `filter` when one is given, otherwise the first `limit` rows. Rows
    /// missing a required column are returned in `rejected`, so fewer than
    /// `limit` entries may come back.
    #[inline]
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&str>,
    ) -> Result<SearchResults> {
        debug!("Searching {} with limit {}", self.table_name(), limit);

        if query.is_empty() {
            if let Some(filter) = filter {
                return self.filter(filter).await;
            }
            let stream = self
                .table
                .query()
                .limit(limit)
                .execute()
                .await
                .map_err(|e| NotevecError::Database(format!("Failed to execute scan: {}", e)))?;
            return collect_results(stream).await;
        }

        let query_vector = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| NotevecError::Embedding("No embedding returned for query".into()))?;

        let mut vector_query = self
            .table
            .vector_search(query_vector)
            .map_err(|e| NotevecError::Database(format!("Failed to create vector search: {}", e)))?
            .column(DatabaseFields::VECTOR)
            .limit(limit);

        if let Some(filter) = filter {
            vector_query = vector_query.only_if(filter);
        }

        let stream = vector_query
            .execute()
            .await
            .map_err(|e| NotevecError::Database(format!("Failed to execute search: {}", e)))?;

        collect_results(stream).await
    }

    /// All rows matching `filter`, without similarity ranking
    #[inline]
    pub async fn filter(&self, filter: &str) -> Result<SearchResults> {
        debug!("Filtering {} where {}", self.table_name(), filter);

        // plain queries default to a top-k limit
        let rows = self.count_rows().await?;
        let stream = self
            .table
            .query()
            .only_if(filter)
            .limit(rows.max(1))
            .execute()
            .await
            .map_err(|e| NotevecError::Database(format!("Failed to execute filter: {}", e)))?;

        collect_results(stream).await
    }

    /// Entries stored for a note path
    #[inline]
    pub async fn find_by_path(&self, path: &str) -> Result<SearchResults> {
        self.filter(&path_filter(path)).await
    }

    #[inline]
    pub async fn count_rows(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| NotevecError::Database(format!("Failed to count rows: {}", e)))
    }
}

async fn collect_results(mut stream: SendableRecordBatchStream) -> Result<SearchResults> {
    let mut results = SearchResults::default();

    while let Some(batch) = stream
        .try_next()
        .await
        .map_err(|e| NotevecError::Database(format!("Failed to read result stream: {}", e)))?
    {
        results.absorb(&batch);
    }

    for malformed in &results.rejected {
        warn!("Discarding malformed record: {}", malformed);
    }

    debug!(
        "Collected {} entries ({} rejected)",
        results.entries.len(),
        results.rejected.len()
    );
    Ok(results)
}
