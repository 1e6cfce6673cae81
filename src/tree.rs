//! Compare two unpacked directory trees (an extracted archive before and
//! after an update) file by file.
//!
//! Every regular file is keyed by its path relative to the tree root and
//! falls into exactly one group: only in the old tree, only in the new
//! tree, present in both with the same bytes, or present in both with
//! different bytes. Only the last group needs a binary patch. Moves and
//! renames are not detected; a moved file is one deletion plus one addition.

use crate::{DiffParams, Error, Result, compress::Compressor, diff};
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;
use walkdir::WalkDir;

/// How a relative path differs between the two trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Only in the old tree.
    Deleted,
    /// Only in the new tree.
    Added,
    /// In both trees with the same contents.
    Unchanged,
    /// In both trees with different contents.
    Modified,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TreeDiff {
    pub deleted: Vec<PathBuf>,
    pub added: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
}

impl TreeDiff {
    /// Every path with its group, sorted by path.
    pub fn entries(&self) -> Vec<(&Path, Change)> {
        let mut all: Vec<(&Path, Change)> = [
            (&self.deleted, Change::Deleted),
            (&self.added, Change::Added),
            (&self.unchanged, Change::Unchanged),
            (&self.modified, Change::Modified),
        ]
        .into_iter()
        .flat_map(|(paths, change)| paths.iter().map(move |p| (p.as_path(), change)))
        .collect();
        all.sort_by(|a, b| a.0.cmp(b.0));
        all
    }

    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.added.is_empty() && self.modified.is_empty()
    }
}

/// Relative paths of every regular file under `root`.
///
/// Symbolic links are neither followed nor listed, and directories only
/// contribute the files inside them.
pub fn list_files(root: &Path) -> Result<BTreeSet<PathBuf>> {
    if !fs::metadata(root)?.is_dir() {
        return Err(Error::InvalidInput(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut files = BTreeSet::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).map_err(|_| {
            Error::InvalidInput(format!(
                "{} is outside {}",
                entry.path().display(),
                root.display()
            ))
        })?;
        files.insert(rel.to_path_buf());
    }
    Ok(files)
}

fn same_contents(a: &Path, b: &Path) -> Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    Ok(fs::read(a)? == fs::read(b)?)
}

/// Classify every file of `old_root` and `new_root`.
pub fn compare(old_root: &Path, new_root: &Path) -> Result<TreeDiff> {
    let old_files = list_files(old_root)?;
    let new_files = list_files(new_root)?;

    let mut out = TreeDiff {
        deleted: old_files.difference(&new_files).cloned().collect(),
        added: new_files.difference(&old_files).cloned().collect(),
        ..Default::default()
    };
    for rel in old_files.intersection(&new_files) {
        if same_contents(&old_root.join(rel), &new_root.join(rel))? {
            out.unchanged.push(rel.clone());
        } else {
            out.modified.push(rel.clone());
        }
    }

    debug!(
        deleted = out.deleted.len(),
        added = out.added.len(),
        unchanged = out.unchanged.len(),
        modified = out.modified.len(),
        "compared {} with {}",
        old_root.display(),
        new_root.display()
    );
    Ok(out)
}

/// Serialized patch turning `old_root/rel` into `new_root/rel`.
pub fn diff_file(
    old_root: &Path,
    new_root: &Path,
    rel: &Path,
    params: &DiffParams,
    compressor: &dyn Compressor,
) -> Result<Vec<u8>> {
    let older = fs::read(old_root.join(rel))?;
    let newer = fs::read(new_root.join(rel))?;
    let bytes = diff::diff(&older, &newer, params)?.to_bytes(compressor)?;
    debug!(
        path = %rel.display(),
        old_len = older.len(),
        new_len = newer.len(),
        patch_len = bytes.len(),
        "diffed file"
    );
    Ok(bytes)
}
