//! Repository access for gitxref.
//!
//! Everything that touches the git repository goes through a subprocess
//! pipeline; no object database is opened in-process. The engine only ever
//! sees the parsed records produced by [`ObjectStream`].

pub mod cache;
mod error;
pub mod objects;

pub use cache::CacheStore;
pub use error::RepoError;
pub use objects::{ObjectRecord, ObjectStream};

use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use xref_hash::{Hasher, ObjectId};
use xref_utils::subprocess::GitCommand;
use xref_utils::UtilError;

/// A handle on a git repository, addressed by its git directory.
pub struct Repository {
    git_dir: PathBuf,
}

impl Repository {
    /// Resolve the repository containing `path`.
    pub fn discover(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let path = path.as_ref();
        let out = GitCommand::new("git")
            .arg("-C")
            .arg(path)
            .args(["rev-parse", "--absolute-git-dir"])
            .output()
            .map_err(|e| match e {
                UtilError::CommandFailed { stderr, .. } => RepoError::NotARepository {
                    path: path.to_path_buf(),
                    message: stderr,
                },
                other => RepoError::Util(other),
            })?;
        let git_dir = PathBuf::from(String::from_utf8_lossy(out.trim_ascii()).into_owned());
        Ok(Self { git_dir })
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// A `git -C <git-dir> …` command builder.
    pub(crate) fn git(&self) -> GitCommand {
        GitCommand::new("git").arg("-C").arg(&self.git_dir)
    }

    /// SHA-1 of the current `for-each-ref` listing: the cache invalidation
    /// key. Any ref movement changes it.
    pub fn refs_key(&self) -> Result<ObjectId, RepoError> {
        let listing = self.git().arg("for-each-ref").output()?;
        Ok(Hasher::digest(&listing))
    }

    /// Stream every commit and tree object in the repository.
    pub fn objects(&self) -> Result<ObjectStream, RepoError> {
        ObjectStream::open(self)
    }

    /// All commit OIDs in the object database (direct mode's work list).
    pub fn commit_oids(&self) -> Result<Vec<ObjectId>, RepoError> {
        let out = self
            .git()
            .args([
                "cat-file",
                "--buffer",
                "--batch-check=%(objecttype) %(objectname)",
                "--batch-all-objects",
            ])
            .output()?;
        let mut oids = Vec::new();
        for line in out.lines() {
            if let Some(hex) = line.strip_prefix(b"commit ") {
                oids.push(ObjectId::from_hex(hex)?);
            }
        }
        Ok(oids)
    }

    /// The blob OIDs of a commit's fully flattened tree, via
    /// `ls-tree -r <commit>`. Gitlink entries are excluded by their entry
    /// type; symlink entries are type `blob` and ride along, matching what
    /// the reverse graph records for them.
    pub fn tree_blobs(&self, commit: &ObjectId) -> Result<Vec<ObjectId>, RepoError> {
        let out = self
            .git()
            .args(["ls-tree", "-r", &commit.to_hex()])
            .output()?;
        let mut oids = Vec::new();
        for line in out.lines() {
            let mut fields = line.fields();
            let _mode = fields.next();
            let kind = fields.next();
            let oid = fields.next();
            if let (Some(kind), Some(hex)) = (kind, oid) {
                if kind == b"blob" {
                    oids.push(ObjectId::from_hex(hex)?);
                }
            }
        }
        Ok(oids)
    }

    /// The sidecar cache store for this repository, keyed by the given
    /// refs hash.
    pub fn cache(&self, key: ObjectId) -> CacheStore {
        CacheStore::new(self.git_dir.clone(), key)
    }
}
