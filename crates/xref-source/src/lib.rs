//! Source directory scan.
//!
//! Walks a directory root, git-blob-hashes every regular file, and collects
//! the results into an indexed table: one entry per distinct blob OID, in
//! first-encounter order, each carrying every relative path that produced
//! it. The table's dense indices are the coordinate system for all bitmaps
//! downstream.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use xref_hash::{Hasher, ObjectId};

/// Errors produced by the source scan. A scan either completes fully or the
/// run aborts; a partial table would silently misattribute coverage.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A distinct blob found under the scan root: its OID and every relative
/// path with that content. The path list is sorted and never empty.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub oid: ObjectId,
    pub paths: Vec<PathBuf>,
}

/// The indexed source table: `files[i].oid` is distinct, `0 <= i < len`.
pub struct SourceTable {
    files: Vec<SourceFile>,
    index: HashMap<ObjectId, usize>,
}

impl SourceTable {
    /// Scan `root` recursively.
    ///
    /// Regular files are hashed with git's blob convention; symlinks and
    /// other non-regular entries are skipped. Any unreadable file fails the
    /// scan.
    pub fn scan(root: impl AsRef<Path>) -> Result<Self, SourceError> {
        let root = root.as_ref();
        let mut table = Self {
            files: Vec::new(),
            index: HashMap::new(),
        };
        walk(root, root, &mut |path, rel| {
            let oid = hash_blob(path)?;
            table.insert(oid, rel);
            Ok(())
        })?;
        for file in &mut table.files {
            file.paths.sort();
        }
        Ok(table)
    }

    fn insert(&mut self, oid: ObjectId, rel: PathBuf) {
        match self.index.get(&oid) {
            Some(&i) => self.files[i].paths.push(rel),
            None => {
                self.index.insert(oid, self.files.len());
                self.files.push(SourceFile {
                    oid,
                    paths: vec![rel],
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn get(&self, i: usize) -> &SourceFile {
        &self.files[i]
    }

    /// The index of a blob OID, if any scanned file had that content.
    pub fn index_of(&self, oid: &ObjectId) -> Option<usize> {
        self.index.get(oid).copied()
    }

    /// The OIDs in index order: position `i` is source index `i`.
    pub fn oids(&self) -> Vec<ObjectId> {
        self.files.iter().map(|f| f.oid).collect()
    }
}

/// Depth-first walk calling `visit` for every regular non-symlink file.
/// Directory entries are visited in name order so table indices are stable
/// across runs.
fn walk(
    root: &Path,
    dir: &Path,
    visit: &mut impl FnMut(&Path, PathBuf) -> Result<(), SourceError>,
) -> Result<(), SourceError> {
    let read_dir = fs::read_dir(dir).map_err(|source| SourceError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut entries: Vec<_> = read_dir
        .collect::<Result<_, _>>()
        .map_err(|source| SourceError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type().map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir() {
            walk(root, &path, visit)?;
        } else if file_type.is_file() {
            let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            visit(&path, rel)?;
        }
        // Sockets, fifos, devices: skipped.
    }
    Ok(())
}

/// Git blob hash of a file: SHA-1 over `"blob <size>\0"` followed by the
/// file contents, streamed.
fn hash_blob(path: &Path) -> Result<ObjectId, SourceError> {
    let io_err = |source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = fs::File::open(path).map_err(io_err)?;
    let size = file.metadata().map_err(io_err)?.len();
    let mut hasher = Hasher::for_object("blob", size);
    let mut reader = io::BufReader::new(file);
    let copied = io::copy(&mut reader, &mut hasher).map_err(io_err)?;
    if copied != size {
        return Err(SourceError::Io {
            path: path.to_path_buf(),
            source: io::Error::other(format!(
                "file changed while hashing: stat said {size} bytes, read {copied}"
            )),
        });
    }
    Ok(hasher.finalize())
}
