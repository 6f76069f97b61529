// LanceDB vector database module
// Note entries, the table schema, and conversion to and from Arrow batches


pub mod provisioner;
pub mod store;

use arrow::array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, StringArray, TimestampMillisecondArray,
    UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::{NotevecError, Result};

pub use provisioner::{ProvisionOutcome, ResolvedTable, connect, resolve_table};
pub use store::{AddReport, BatchFailure, NoteStore, SearchResults};

/// Rows inserted per `add` call on the engine
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 100;

const TABLE_PREFIX: &str = "notevec_table";

/// Column names of the note table
pub struct DatabaseFields;

impl DatabaseFields {
    pub const NOTE_PATH: &'static str = "notepath";
    pub const VECTOR: &'static str = "vector";
    pub const CONTENT: &'static str = "content";
    pub const SUB_NOTE_INDEX: &'static str = "subnoteindex";
    pub const TIME_ADDED: &'static str = "timeadded";

    pub const ALL: [&'static str; 5] = [
        Self::NOTE_PATH,
        Self::VECTOR,
        Self::CONTENT,
        Self::SUB_NOTE_INDEX,
        Self::TIME_ADDED,
    ];
}

/// One indexed unit of note content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub note_path: String,
    /// Filled in by the store from the bound embedding function when absent
    pub vector: Option<Vec<f32>>,
    pub content: String,
    /// Position within a multi-chunk note; notes are stored as a single chunk
    pub sub_note_index: u32,
    pub time_added: DateTime<Utc>,
}

impl Entry {
    /// A single-chunk entry awaiting its embedding
    #[inline]
    pub fn new(note_path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            note_path: note_path.into(),
            vector: None,
            content: content.into(),
            sub_note_index: 0,
            time_added: now_millis(),
        }
    }
}

/// A row read back from the table that lacks one or more required columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    pub row: usize,
    pub note_path: Option<String>,
    pub missing: Vec<&'static str>,
}

impl fmt::Display for MalformedRecord {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} ({}) is missing {}",
            self.row,
            self.note_path.as_deref().unwrap_or("unknown path"),
            self.missing.join(", ")
        )
    }
}

/// Current time truncated to what the table stores
#[inline]
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Replace everything a table name may not contain with `_`
///
/// LanceDB accepts only ASCII alphanumerics, `_`, `-` and `.`, which also
/// excludes the characters reserved by common filesystems.
#[inline]
pub fn sanitize_for_table_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Deterministic table name for an embedding function and source directory
#[inline]
pub fn table_name(embedding_name: &str, source_dir: &str) -> String {
    format!(
        "{}_{}_{}",
        TABLE_PREFIX,
        sanitize_for_table_name(embedding_name),
        sanitize_for_table_name(source_dir)
    )
}

fn vector_item_field() -> Arc<Field> {
    Arc::new(Field::new("item", DataType::Float32, false))
}

fn vector_width_i32(vector_width: usize) -> Result<i32> {
    i32::try_from(vector_width).map_err(|_| {
        NotevecError::Database(format!("Vector width {} is too large", vector_width))
    })
}

/// Schema of a note table whose vectors have `vector_width` dimensions
#[inline]
pub fn create_schema(vector_width: usize) -> Result<SchemaRef> {
    let width = vector_width_i32(vector_width)?;
    Ok(Arc::new(Schema::new(vec![
        Field::new(DatabaseFields::NOTE_PATH, DataType::Utf8, false),
        Field::new(
            DatabaseFields::VECTOR,
            DataType::FixedSizeList(vector_item_field(), width),
            true,
        ),
        Field::new(DatabaseFields::CONTENT, DataType::Utf8, false),
        Field::new(DatabaseFields::SUB_NOTE_INDEX, DataType::UInt32, false),
        Field::new(
            DatabaseFields::TIME_ADDED,
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
    ])))
}

/// Order-insensitive description of a schema: column name to normalized type
///
/// Nullability and the name of the list item field are not part of the
/// signature, so a schema read back from storage compares equal to the one
/// it was created from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSignature(BTreeMap<String, String>);

impl SchemaSignature {
    #[inline]
    pub fn of(schema: &Schema) -> Self {
        Self(
            schema
                .fields()
                .iter()
                .map(|field| (field.name().clone(), normalized_type(field.data_type())))
                .collect(),
        )
    }

    /// Width of the vector column, if the schema has one
    #[inline]
    pub fn vector_width(&self) -> Option<usize> {
        self.0
            .get(DatabaseFields::VECTOR)
            .and_then(|ty| ty.rsplit_once('['))
            .and_then(|(_, rest)| rest.trim_end_matches(']').parse().ok())
    }
}

fn normalized_type(data_type: &DataType) -> String {
    match data_type {
        DataType::FixedSizeList(item, width) => {
            format!("fixed_size_list<{}>[{}]", item.data_type(), width)
        }
        other => other.to_string(),
    }
}

/// Whether two schemas describe the same columns and vector width
#[inline]
pub fn schemas_match(stored: &Schema, intended: &Schema) -> bool {
    SchemaSignature::of(stored) == SchemaSignature::of(intended)
}

/// Width of the vector column in `schema`
#[inline]
pub fn schema_vector_width(schema: &Schema) -> Option<usize> {
    SchemaSignature::of(schema).vector_width()
}

/// Build a record batch from entries whose vectors are all present
///
/// # Errors
/// Fails when an entry has no vector or a vector of the wrong width.
#[inline]
pub fn entries_to_record_batch(entries: &[Entry], vector_width: usize) -> Result<RecordBatch> {
    let len = entries.len();
    let width = vector_width_i32(vector_width)?;

    let mut note_paths = Vec::with_capacity(len);
    let mut contents = Vec::with_capacity(len);
    let mut sub_note_indices = Vec::with_capacity(len);
    let mut times_added = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * vector_width);

    for entry in entries {
        let vector = entry.vector.as_deref().ok_or_else(|| {
            NotevecError::Database(format!("Entry {} has no vector", entry.note_path))
        })?;
        if vector.len() != vector_width {
            return Err(NotevecError::Database(format!(
                "Entry {} has a vector of width {}, expected {}",
                entry.note_path,
                vector.len(),
                vector_width
            )));
        }

        note_paths.push(entry.note_path.as_str());
        contents.push(entry.content.as_str());
        sub_note_indices.push(entry.sub_note_index);
        times_added.push(entry.time_added.timestamp_millis());
        flat_values.extend_from_slice(vector);
    }

    let vector_array = FixedSizeListArray::try_new(
        vector_item_field(),
        width,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| NotevecError::Database(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(note_paths)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(contents)),
        Arc::new(UInt32Array::from(sub_note_indices)),
        Arc::new(TimestampMillisecondArray::from(times_added)),
    ];

    RecordBatch::try_new(create_schema(vector_width)?, arrays)
        .map_err(|e| NotevecError::Database(format!("Failed to create record batch: {}", e)))
}

/// Typed view over the five note columns of a result batch
///
/// A column absent from the batch, or present with an unexpected type, is
/// treated as null in every row.
struct EntryColumns<'a> {
    note_paths: Option<&'a StringArray>,
    vectors: Option<&'a FixedSizeListArray>,
    contents: Option<&'a StringArray>,
    sub_note_indices: Option<&'a UInt32Array>,
    times_added: Option<&'a TimestampMillisecondArray>,
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Option<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<T>())
}

fn value_at<'a, A: Array>(array: Option<&'a A>, row: usize) -> Option<&'a A> {
    array.filter(|a| a.is_valid(row))
}

impl<'a> EntryColumns<'a> {
    fn new(batch: &'a RecordBatch) -> Self {
        Self {
            note_paths: column(batch, DatabaseFields::NOTE_PATH),
            vectors: column(batch, DatabaseFields::VECTOR),
            contents: column(batch, DatabaseFields::CONTENT),
            sub_note_indices: column(batch, DatabaseFields::SUB_NOTE_INDEX),
            times_added: column(batch, DatabaseFields::TIME_ADDED),
        }
    }

    fn vector(&self, row: usize) -> Option<Vec<f32>> {
        let list = value_at(self.vectors, row)?;
        let values = list.value(row);
        let floats = values.as_any().downcast_ref::<Float32Array>()?;
        if floats.null_count() > 0 {
            return None;
        }
        Some(floats.values().to_vec())
    }

    fn entry(&self, row: usize) -> std::result::Result<Entry, MalformedRecord> {
        let note_path = value_at(self.note_paths, row).map(|a| a.value(row).to_string());
        let vector = self.vector(row);
        let content = value_at(self.contents, row).map(|a| a.value(row).to_string());
        let sub_note_index = value_at(self.sub_note_indices, row).map(|a| a.value(row));
        let time_added = value_at(self.times_added, row)
            .and_then(|a| DateTime::from_timestamp_millis(a.value(row)));

        match (note_path, vector, content, sub_note_index, time_added) {
            (
                Some(note_path),
                Some(vector),
                Some(content),
                Some(sub_note_index),
                Some(time_added),
            ) => Ok(Entry {
                note_path,
                vector: Some(vector),
                content,
                sub_note_index,
                time_added,
            }),
            (note_path, vector, content, sub_note_index, time_added) => {
                let present = [
                    note_path.is_some(),
                    vector.is_some(),
                    content.is_some(),
                    sub_note_index.is_some(),
                    time_added.is_some(),
                ];
                let missing = DatabaseFields::ALL
                    .iter()
                    .zip(present)
                    .filter(|(_, present)| !present)
                    .map(|(name, _)| *name)
                    .collect();
                Err(MalformedRecord {
                    row,
                    note_path,
                    missing,
                })
            }
        }
    }
}

/// Convert every row of `batch` into an entry, separating out malformed rows
#[inline]
pub fn entries_from_record_batch(batch: &RecordBatch) -> (Vec<Entry>, Vec<MalformedRecord>) {
    let columns = EntryColumns::new(batch);
    let mut entries = Vec::with_capacity(batch.num_rows());
    let mut rejected = Vec::new();

    for row in 0..batch.num_rows() {
        match columns.entry(row) {
            Ok(entry) => entries.push(entry),
            Err(malformed) => rejected.push(malformed),
        }
    }

    (entries, rejected)
}
