// Database module
// LanceDB tables holding note entries and their embeddings

pub mod lancedb;
