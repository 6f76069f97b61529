use super::*;
use std::fs;
use tempfile::TempDir;

fn extensions() -> Vec<String> {
    vec!["md".to_string(), ".txt".to_string()]
}

fn create_notes_dir() -> TempDir {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let root = temp_dir.path();

    fs::create_dir_all(root.join("projects/rust")).expect("should create dirs");
    fs::create_dir_all(root.join("empty")).expect("should create dirs");
    fs::create_dir_all(root.join(".obsidian")).expect("should create dirs");

    fs::write(root.join("inbox.md"), "inbox").expect("should write file");
    fs::write(root.join("todo.TXT"), "todo").expect("should write file");
    fs::write(root.join("image.png"), [0_u8, 1, 2]).expect("should write file");
    fs::write(root.join(".hidden.md"), "secret").expect("should write file");
    fs::write(root.join(".obsidian/workspace.md"), "config").expect("should write file");
    fs::write(root.join("projects/plan.md"), "plan").expect("should write file");
    fs::write(root.join("projects/rust/ownership.md"), "borrow").expect("should write file");

    temp_dir
}

#[test]
fn list_files_filters_by_extension_recursively() {
    let temp_dir = create_notes_dir();
    let files = list_files(temp_dir.path(), &extensions()).expect("should list files");

    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["inbox.md", "plan.md", "ownership.md", "todo.TXT"]);
    assert!(files.iter().all(|f| f.modified.is_some()));
}

#[test]
fn list_files_on_missing_directory_fails() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let result = list_files(&temp_dir.path().join("missing"), &extensions());
    assert!(result.is_err());
}

#[test]
fn extension_matching() {
    let exts = extensions();
    assert!(has_extension(Path::new("a/b.md"), &exts));
    assert!(has_extension(Path::new("a/b.MD"), &exts));
    assert!(has_extension(Path::new("b.txt"), &exts));
    assert!(!has_extension(Path::new("b.markdown"), &exts));
    assert!(!has_extension(Path::new("md"), &exts));
}

#[test]
fn tree_snapshot_and_flatten() {
    let temp_dir = create_notes_dir();
    let tree = build_file_tree(temp_dir.path(), &extensions()).expect("should build tree");

    // empty/ has no notes and is left out
    let top: Vec<&str> = tree.iter().map(|n| n.info().name.as_str()).collect();
    assert_eq!(top, vec!["inbox.md", "projects", "todo.TXT"]);

    let root = canonical_path(temp_dir.path()).expect("should resolve root");
    let flattened = flatten_file_tree(&tree);
    let paths: Vec<PathBuf> = flattened.iter().map(|f| f.path.clone()).collect();
    assert_eq!(
        paths,
        vec![
            root.join("inbox.md"),
            root.join("projects/plan.md"),
            root.join("projects/rust/ownership.md"),
            root.join("todo.TXT"),
        ]
    );

    let listed = list_files(temp_dir.path(), &extensions()).expect("should list files");
    assert_eq!(flattened.len(), listed.len());
}

#[test]
fn tree_of_single_file() {
    let temp_dir = create_notes_dir();
    let file = canonical_path(&temp_dir.path().join("projects/plan.md"))
        .expect("should resolve file");

    let tree = build_file_tree(&file, &extensions()).expect("should build tree");
    assert_eq!(tree.len(), 1);
    assert!(matches!(&tree[0], FileInfoNode::File(info) if info.path == file));

    let ignored = build_file_tree(&temp_dir.path().join("image.png"), &extensions())
        .expect("should build tree");
    assert!(ignored.is_empty());
}

#[tokio::test]
async fn read_file_lossy_handles_failures() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let good = temp_dir.path().join("good.md");
    let binary = temp_dir.path().join("binary.md");
    fs::write(&good, "# Title\nbody").expect("should write file");
    fs::write(&binary, [b'o', b'k', 0xff]).expect("should write file");

    assert_eq!(read_file_lossy(&good).await, "# Title\nbody");
    assert_eq!(read_file_lossy(&binary).await, "ok\u{fffd}");
    assert_eq!(read_file_lossy(&temp_dir.path().join("missing.md")).await, "");
}

#[test]
fn listing_uses_one_spelling_per_file() {
    let temp_dir = create_notes_dir();
    let plain = list_files(temp_dir.path(), &extensions()).expect("should list files");
    let dotted = list_files(
        &temp_dir.path().join("projects").join(".."),
        &extensions(),
    )
    .expect("should list files");
    assert_eq!(plain, dotted);

    let tree = build_file_tree(
        &temp_dir.path().join(".").join("projects"),
        &extensions(),
    )
    .expect("should build tree");
    let root = canonical_path(temp_dir.path()).expect("should resolve root");
    assert_eq!(
        flatten_file_tree(&tree)[0].path,
        root.join("projects").join("plan.md")
    );
}

#[test]
fn path_within_resolves_and_rejects_outsiders() {
    let temp_dir = create_notes_dir();
    let notes = temp_dir.path().join("projects");
    let root = canonical_path(&notes).expect("should resolve root");

    let inside = path_within(&notes, &notes.join("rust").join("..").join("plan.md"))
        .expect("path should be inside");
    assert_eq!(inside, root.join("plan.md"));

    let outside = path_within(&notes, &temp_dir.path().join("inbox.md"));
    assert!(matches!(outside, Err(NotevecError::InvalidPath(_))));

    let missing = path_within(&notes, &notes.join("missing.md"));
    assert!(matches!(missing, Err(NotevecError::Io(_))));
}

#[test]
fn note_key_canonicalizes_existing_files_only() {
    let temp_dir = create_notes_dir();
    let root = canonical_path(temp_dir.path()).expect("should resolve root");

    let key = note_key(&temp_dir.path().join("projects").join("..").join("inbox.md"));
    assert_eq!(key, root.join("inbox.md").to_string_lossy());

    assert_eq!(note_key(Path::new("gone/away.md")), "gone/away.md");
}
