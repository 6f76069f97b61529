// Deterministic embedding function and table helpers for unit tests

use async_trait::async_trait;
use lancedb::Connection;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use crate::database::lancedb::{NoteStore, connect, resolve_table};
use crate::embeddings::EmbeddingFunction;
use crate::{NotevecError, Result};

/// Content containing this marker makes `HashEmbedder::embed` fail
pub const FAIL_MARKER: &str = "<<fail-embedding>>";

/// Embeds text by spreading its bytes over a fixed number of dimensions
pub struct HashEmbedder {
    name: String,
    width: usize,
}

impl HashEmbedder {
    pub fn new(name: &str, width: usize) -> Self {
        Self {
            name: name.to_string(),
            width,
        }
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.width];
        for (i, byte) in text.bytes().enumerate() {
            vector[(i + usize::from(byte)) % self.width] += f32::from(byte) / 255.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingFunction for HashEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn vector_width(&self) -> usize {
        self.width
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains(FAIL_MARKER)) {
            return Err(NotevecError::Embedding("refusing marked text".to_string()));
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

pub async fn temp_connection() -> (Connection, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let connection = connect(&temp_dir.path().join("vectors"))
        .await
        .expect("should connect to lancedb");
    (connection, temp_dir)
}

/// A store over a fresh table bound to a `HashEmbedder` of width 8
pub async fn temp_store(source_dir: &Path) -> (NoteStore, TempDir) {
    let (connection, temp_dir) = temp_connection().await;
    let embedder = Arc::new(HashEmbedder::new("hash", 8));
    let resolved = resolve_table(&connection, embedder.as_ref(), source_dir)
        .await
        .expect("should resolve table");
    (NoteStore::new(resolved.table, embedder), temp_dir)
}
