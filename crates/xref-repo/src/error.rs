use std::path::PathBuf;

use xref_hash::HashError;
use xref_utils::UtilError;

/// Errors produced by repository access.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not a git repository: {}: {message}", path.display())]
    NotARepository { path: PathBuf, message: String },

    #[error("object stream truncated after {last_good}")]
    StreamTruncated { last_good: String },

    #[error("malformed {kind} object {oid}: {reason}")]
    MalformedObject {
        kind: &'static str,
        oid: String,
        reason: String,
    },

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Util(#[from] UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
