
use arrow::datatypes::SchemaRef;
use lancedb::{Connection, Table};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{create_schema, schema_vector_width, schemas_match, table_name};
use crate::embeddings::EmbeddingFunction;
use crate::{NotevecError, Result};

/// How `resolve_table` obtained its table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// No table existed under the name
    Created,
    /// The stored schema matched and existing rows were kept
    Reused,
    /// The stored schema differed; the old table and its rows were dropped
    Recreated,
}

/// A table ready for use, together with the path taken to get it
pub struct ResolvedTable {
    pub table: Table,
    pub name: String,
    pub outcome: ProvisionOutcome,
}

/// Open a LanceDB connection rooted at `db_path`, creating the directory first
#[inline]
pub async fn connect(db_path: &Path) -> Result<Connection> {
    debug!("Initializing LanceDB at path: {:?}", db_path);

    std::fs::create_dir_all(db_path).map_err(|e| {
        NotevecError::Database(format!("Failed to create vector database directory: {}", e))
    })?;

    let uri = format!("file://{}", db_path.display());
    lancedb::connect(&uri)
        .execute()
        .await
        .map_err(|e| NotevecError::Database(format!("Failed to connect to LanceDB: {}", e)))
}

/// Ensure the table for `embedder` and `source_dir` exists with a matching schema
///
/// A table whose stored schema differs from the one implied by the embedding
/// width is dropped and recreated empty. Every engine failure is returned.
#[inline]
pub async fn resolve_table(
    connection: &Connection,
    embedder: &dyn EmbeddingFunction,
    source_dir: &Path,
) -> Result<ResolvedTable> {
    let name = table_name(embedder.name(), &source_dir.to_string_lossy());
    let intended_schema = create_schema(embedder.vector_width())?;
    debug!(
        "Resolving table {} for vector width {}",
        name,
        embedder.vector_width()
    );

    let table_names = connection
        .table_names()
        .execute()
        .await
        .map_err(|e| NotevecError::Database(format!("Failed to list tables: {}", e)))?;

    if !table_names.contains(&name) {
        let table = create_table(connection, &name, &intended_schema).await?;
        info!("Created table {}", name);
        return Ok(ResolvedTable {
            table,
            name,
            outcome: ProvisionOutcome::Created,
        });
    }

    let table = connection
        .open_table(&name)
        .execute()
        .await
        .map_err(|e| NotevecError::Database(format!("Failed to open table {}: {}", name, e)))?;

    let stored_schema = table
        .schema()
        .await
        .map_err(|e| NotevecError::Database(format!("Failed to get table schema: {}", e)))?;

    if schemas_match(&stored_schema, &intended_schema) {
        debug!("Table {} matches the intended schema", name);
        return Ok(ResolvedTable {
            table,
            name,
            outcome: ProvisionOutcome::Reused,
        });
    }

    info!(
        "Schema mismatch for table {} (stored vector width {:?}, intended {}), recreating",
        name,
        schema_vector_width(&stored_schema),
        embedder.vector_width()
    );

    connection
        .drop_table(&name)
        .await
        .map_err(|e| NotevecError::Database(format!("Failed to drop table {}: {}", name, e)))?;
    info!("Deleted table {} due to schema mismatch", name);

    let table = create_table(connection, &name, &intended_schema).await?;
    info!("Recreated table {} with the intended schema", name);

    Ok(ResolvedTable {
        table,
        name,
        outcome: ProvisionOutcome::Recreated,
    })
}

async fn create_table(
    connection: &Connection,
    name: &str,
    schema: &SchemaRef,
) -> Result<Table> {
    connection
        .create_empty_table(name, Arc::clone(schema))
        .execute()
        .await
        .map_err(|e| NotevecError::Database(format!("Failed to create table {}: {}", name, e)))
}
