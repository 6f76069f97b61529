// Files module
// Lists note files, snapshots directory trees, and reads note content

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::config::normalize_extension;
use crate::{NotevecError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub path: PathBuf,
    pub modified: Option<DateTime<Utc>>,
}

/// A node of a directory snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileInfoNode {
    File(FileInfo),
    Directory {
        info: FileInfo,
        children: Vec<FileInfoNode>,
    },
}

pub type FileInfoTree = Vec<FileInfoNode>;

impl FileInfo {
    fn from_entry(entry: &DirEntry) -> Self {
        let modified = entry
            .metadata()
            .ok()
            .and_then(|metadata| metadata.modified().ok())
            .map(DateTime::<Utc>::from);

        Self {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path().to_path_buf(),
            modified,
        }
    }
}

impl FileInfoNode {
    #[inline]
    pub fn info(&self) -> &FileInfo {
        match self {
            Self::File(info) | Self::Directory { info, .. } => info,
        }
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Whether `path` has one of `extensions`, compared case-insensitively
#[inline]
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = ext.to_string_lossy();
    extensions
        .iter()
        .any(|wanted| ext.eq_ignore_ascii_case(&normalize_extension(wanted)))
}

/// Absolute form of `path` with symlinks, `.` and `..` resolved
#[inline]
pub fn canonical_path(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).map_err(|e| {
        NotevecError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to resolve {}: {}", path.display(), e),
        ))
    })
}

/// Canonical form of `path`, which must lie inside `notes_dir`
#[inline]
pub fn path_within(notes_dir: &Path, path: &Path) -> Result<PathBuf> {
    let root = canonical_path(notes_dir)?;
    let resolved = canonical_path(path)?;

    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(NotevecError::InvalidPath(format!(
            "{} is outside the notes directory {}",
            resolved.display(),
            root.display()
        )))
    }
}

/// The string a note is stored under
///
/// Existing files are keyed by their canonical path, so every spelling of the
/// same file maps to one key. A path that no longer resolves is kept as given.
#[inline]
pub fn note_key(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

/// Every note file under `directory`, recursively, sorted by path
///
/// Paths are reported under the canonical form of `directory`. Hidden files
/// and directories are skipped.
#[inline]
pub fn list_files(directory: &Path, extensions: &[String]) -> Result<Vec<FileInfo>> {
    let directory = canonical_path(directory)?;
    let mut files = Vec::new();

    for entry in WalkDir::new(&directory)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = entry.map_err(|e| {
            NotevecError::Io(std::io::Error::other(format!(
                "Failed to walk {}: {}",
                directory.display(),
                e
            )))
        })?;

        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            files.push(FileInfo::from_entry(&entry));
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Snapshot of `path` as a tree of note files
///
/// A file path yields a single-node tree; a directory yields its children.
/// Directories without note files are omitted. Paths in the tree are
/// canonical.
#[inline]
pub fn build_file_tree(path: &Path, extensions: &[String]) -> Result<FileInfoTree> {
    let path = canonical_path(path)?;
    let root = WalkDir::new(&path)
        .max_depth(0)
        .into_iter()
        .next()
        .ok_or_else(|| {
            NotevecError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Path not found: {}", path.display()),
            ))
        })?
        .map_err(|e| {
            NotevecError::Io(std::io::Error::other(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        })?;

    if root.file_type().is_file() {
        return Ok(if has_extension(root.path(), extensions) {
            vec![FileInfoNode::File(FileInfo::from_entry(&root))]
        } else {
            Vec::new()
        });
    }

    children_of(&path, extensions)
}

fn children_of(directory: &Path, extensions: &[String]) -> Result<FileInfoTree> {
    let mut nodes = Vec::new();

    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = entry.map_err(|e| {
            NotevecError::Io(std::io::Error::other(format!(
                "Failed to walk {}: {}",
                directory.display(),
                e
            )))
        })?;

        if entry.file_type().is_dir() {
            let children = children_of(entry.path(), extensions)?;
            if !children.is_empty() {
                nodes.push(FileInfoNode::Directory {
                    info: FileInfo::from_entry(&entry),
                    children,
                });
            }
        } else if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            nodes.push(FileInfoNode::File(FileInfo::from_entry(&entry)));
        }
    }

    Ok(nodes)
}

/// Files of a tree in depth-first order; directories are not included
#[inline]
pub fn flatten_file_tree(tree: &[FileInfoNode]) -> Vec<FileInfo> {
    let mut files = Vec::new();
    for node in tree {
        match node {
            FileInfoNode::File(info) => files.push(info.clone()),
            FileInfoNode::Directory { children, .. } => {
                files.extend(flatten_file_tree(children));
            }
        }
    }
    files
}

/// Read a note, returning an empty string when it cannot be read
///
/// Invalid UTF-8 is replaced rather than rejected.
#[inline]
pub async fn read_file_lossy(path: &Path) -> String {
    match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            String::new()
        }
    }
}
