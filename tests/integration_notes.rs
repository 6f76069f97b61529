#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

/// End-to-end tests over a real notes directory and an on-disk LanceDB database
use async_trait::async_trait;
use notevec::config::{Config, IndexConfig, OllamaConfig};
use notevec::database::lancedb::{NoteStore, ProvisionOutcome, connect, resolve_table};
use notevec::embeddings::EmbeddingFunction;
use notevec::files::build_file_tree;
use notevec::indexer::{ReconcileOutcome, reconcile, remove_tree, update_note};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Bag-of-words embedder: each word lands in a bucket chosen by its bytes
struct WordBucketEmbedder {
    width: usize,
}

impl WordBucketEmbedder {
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.width];
        for word in text.split_whitespace() {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(7_usize, |acc, b| acc.wrapping_mul(31).wrapping_add(usize::from(b)));
            vector[bucket % self.width] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingFunction for WordBucketEmbedder {
    fn name(&self) -> &str {
        "word-bucket"
    }

    fn vector_width(&self) -> usize {
        self.width
    }

    async fn embed(&self, texts: &[String]) -> notevec::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn create_test_config() -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ollama: OllamaConfig::default(),
        index: IndexConfig::default(),
    };
    (config, temp_dir)
}

fn write_notes(dir: &Path) {
    fs::create_dir_all(dir.join("cooking")).expect("should create dir");
    fs::write(
        dir.join("rust.md"),
        "lifetimes borrowing ownership traits generics",
    )
    .expect("should write note");
    fs::write(
        dir.join("garden.txt"),
        "tomatoes basil compost watering seedlings",
    )
    .expect("should write note");
    fs::write(
        dir.join("cooking").join("bread.md"),
        "flour yeast dough kneading oven",
    )
    .expect("should write note");
    fs::write(
        dir.join("cooking").join("soup.markdown"),
        "onions stock simmer carrots celery",
    )
    .expect("should write note");
    // ignored: wrong extension and hidden
    fs::write(dir.join("image.png"), "not a note").expect("should write file");
    fs::write(dir.join(".draft.md"), "hidden draft").expect("should write file");
}

async fn open_store(config: &Config, notes_dir: &Path, width: usize) -> (NoteStore, ProvisionOutcome) {
    let connection = connect(&config.vector_database_path())
        .await
        .expect("should connect");
    let embedder = Arc::new(WordBucketEmbedder { width });
    let resolved = resolve_table(&connection, embedder.as_ref(), notes_dir)
        .await
        .expect("should resolve table");
    let store = NoteStore::new(resolved.table, embedder)
        .with_batch_size(config.index.insert_batch_size);
    (store, resolved.outcome)
}

#[tokio::test]
async fn index_search_and_update_notes() {
    let (config, _db_dir) = create_test_config();
    let notes = TempDir::new().expect("should create temp dir");
    write_notes(notes.path());
    let extensions = &config.index.extensions;

    let (store, outcome) = open_store(&config, notes.path(), 64).await;
    assert_eq!(outcome, ProvisionOutcome::Created);

    let first = reconcile(&store, notes.path(), extensions)
        .await
        .expect("reconcile should succeed");
    assert!(matches!(
        first,
        ReconcileOutcome::Repopulated {
            previous_rows: 0,
            files: 4,
            ..
        }
    ));
    assert_eq!(store.count_rows().await.expect("should count rows"), 4);

    let results = store
        .search("yeast dough oven", 1, None)
        .await
        .expect("search should succeed");
    assert_eq!(results.entries.len(), 1);
    assert!(results.entries[0].note_path.ends_with("bread.md"));

    let filtered = store
        .search("yeast dough oven", 10, Some("notepath LIKE '%garden%'"))
        .await
        .expect("search should succeed");
    assert_eq!(filtered.entries.len(), 1);
    assert!(filtered.entries[0].note_path.ends_with("garden.txt"));

    // edit a note on disk and push the change through
    let rust_note = notes.path().join("rust.md");
    fs::write(&rust_note, "sourdough starter yeast").expect("should rewrite note");
    let rust_path = rust_note.to_string_lossy().into_owned();
    update_note(&store, &rust_path, "sourdough starter yeast")
        .await
        .expect("update should succeed");
    assert_eq!(store.count_rows().await.expect("should count rows"), 4);

    let found = store
        .find_by_path(&rust_path)
        .await
        .expect("filter should succeed");
    assert_eq!(found.entries.len(), 1);
    assert_eq!(found.entries[0].content, "sourdough starter yeast");

    // counts match again so a second reconcile is a no-op
    let second = reconcile(&store, notes.path(), extensions)
        .await
        .expect("reconcile should succeed");
    assert_eq!(second, ReconcileOutcome::UpToDate { rows: 4 });
}

#[tokio::test]
async fn removing_a_directory_then_reconciling_restores_it() {
    let (config, _db_dir) = create_test_config();
    let notes = TempDir::new().expect("should create temp dir");
    write_notes(notes.path());
    let extensions = &config.index.extensions;

    let (store, _) = open_store(&config, notes.path(), 32).await;
    reconcile(&store, notes.path(), extensions)
        .await
        .expect("reconcile should succeed");

    let cooking = build_file_tree(&notes.path().join("cooking"), extensions)
        .expect("should build tree");
    let removed = remove_tree(&store, &cooking)
        .await
        .expect("remove should succeed");
    assert_eq!(removed, 2);
    assert_eq!(store.count_rows().await.expect("should count rows"), 2);

    let outcome = reconcile(&store, notes.path(), extensions)
        .await
        .expect("reconcile should succeed");
    assert!(matches!(
        outcome,
        ReconcileOutcome::Repopulated {
            previous_rows: 2,
            files: 4,
            ..
        }
    ));
    assert_eq!(store.count_rows().await.expect("should count rows"), 4);
}

#[tokio::test]
async fn embedding_width_change_rebuilds_the_table() {
    let (config, _db_dir) = create_test_config();
    let notes = TempDir::new().expect("should create temp dir");
    write_notes(notes.path());
    let extensions = &config.index.extensions;

    let (store, _) = open_store(&config, notes.path(), 16).await;
    reconcile(&store, notes.path(), extensions)
        .await
        .expect("reconcile should succeed");
    let old_name = store.table_name().to_string();
    drop(store);

    let (store, outcome) = open_store(&config, notes.path(), 48).await;
    assert_eq!(outcome, ProvisionOutcome::Recreated);
    assert_eq!(store.table_name(), old_name);
    assert_eq!(store.vector_width(), 48);
    assert_eq!(store.count_rows().await.expect("should count rows"), 0);

    reconcile(&store, notes.path(), extensions)
        .await
        .expect("reconcile should succeed");
    let results = store
        .search("onions stock simmer", 1, None)
        .await
        .expect("search should succeed");
    assert!(results.entries[0].note_path.ends_with("soup.markdown"));
    assert_eq!(
        results.entries[0].vector.as_ref().map(Vec::len),
        Some(48)
    );
}

#[tokio::test]
async fn config_round_trips_through_base_dir() {
    let (mut config, temp_dir) = create_test_config();
    config.index.notes_dir = Some(temp_dir.path().join("notes"));
    config.index.set_extensions("md, org").expect("valid extensions");
    config.save().expect("should save config");

    let loaded = Config::load(temp_dir.path()).expect("should load config");
    assert_eq!(loaded.index.notes_dir, config.index.notes_dir);
    assert_eq!(loaded.index.extensions, vec!["md".to_string(), "org".to_string()]);
    assert_eq!(
        loaded.vector_database_path(),
        temp_dir.path().join("vectors")
    );
}
