use thiserror::Error;

pub type Result<T> = std::result::Result<T, NotevecError>;

#[derive(Error, Debug)]
pub enum NotevecError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod files;
pub mod indexer;

#[cfg(test)]
mod test_support;
