//! The object stream: every commit and tree in the repository, parsed.
//!
//! Two `cat-file` children are bridged in-process, the equivalent of:
//!
//! ```text
//! git -C <repo> cat-file --buffer --batch-all-objects \
//!     --batch-check='%(objecttype) %(objectname)'
//!   | keep commit/tree lines, cut the OID
//!   | git -C <repo> cat-file --buffer --batch
//! ```
//!
//! A filter thread copies qualifying OIDs from the first child's stdout into
//! the second child's stdin; the stream itself parses the second child's
//! framed output. Both children sit behind kill-on-drop guards, so every
//! exit path from the ingestion scope reaps them.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::process::{ChildStdin, ChildStdout};
use std::thread::JoinHandle;

use bstr::ByteSlice;
use xref_hash::ObjectId;
use xref_utils::subprocess::{ChildGuard, StdioMode};

use crate::{RepoError, Repository};

/// One parsed object from the stream. Kinds other than commit and tree are
/// filtered out before the parser ever sees them, but a record for them
/// exists so reordering or a looser filter cannot break construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectRecord {
    Commit {
        oid: ObjectId,
        tree: ObjectId,
        parents: Vec<ObjectId>,
    },
    Tree {
        oid: ObjectId,
        subtrees: Vec<ObjectId>,
        blobs: Vec<ObjectId>,
    },
    Other {
        oid: ObjectId,
    },
}

/// Streaming iterator over the repository's commit and tree objects.
pub struct ObjectStream {
    reader: BufReader<ChildStdout>,
    /// Guards ordered so the consumer (`--batch`) is killed before the
    /// producer on drop.
    _batch: ChildGuard,
    _check: ChildGuard,
    filter: Option<JoinHandle<std::io::Result<()>>>,
    /// Tree entries skipped because their mode string had an unexpected
    /// length.
    malformed_entries: u64,
    last_good: Option<ObjectId>,
    done: bool,
}

impl ObjectStream {
    pub(crate) fn open(repo: &Repository) -> Result<Self, RepoError> {
        let mut check = repo
            .git()
            .args([
                "cat-file",
                "--buffer",
                "--batch-check=%(objecttype) %(objectname)",
                "--batch-all-objects",
            ])
            .stdout(StdioMode::Pipe)
            .stderr(StdioMode::Inherit)
            .spawn()?;
        let mut batch = repo
            .git()
            .args(["cat-file", "--buffer", "--batch"])
            .stdin(StdioMode::Pipe)
            .stdout(StdioMode::Pipe)
            .stderr(StdioMode::Inherit)
            .spawn()?;

        let check_out = check
            .take_stdout()
            .ok_or_else(|| std::io::Error::other("batch-check stdout not piped"))?;
        let batch_in = batch
            .take_stdin()
            .ok_or_else(|| std::io::Error::other("batch stdin not piped"))?;
        let batch_out = batch
            .take_stdout()
            .ok_or_else(|| std::io::Error::other("batch stdout not piped"))?;

        let filter = std::thread::spawn(move || filter_oids(check_out, batch_in));

        Ok(Self {
            reader: BufReader::new(batch_out),
            _batch: batch,
            _check: check,
            filter: Some(filter),
            malformed_entries: 0,
            last_good: None,
            done: false,
        })
    }

    /// Tree entries skipped for an unexpected mode-string length, counted
    /// across the whole stream.
    pub fn malformed_entries(&self) -> u64 {
        self.malformed_entries
    }

    fn truncated(&self) -> RepoError {
        RepoError::StreamTruncated {
            last_good: self
                .last_good
                .map_or_else(|| "(start of stream)".to_string(), |oid| oid.to_hex()),
        }
    }

    fn read_record(&mut self) -> Result<Option<ObjectRecord>, RepoError> {
        let mut header = Vec::new();
        self.reader.read_until(b'\n', &mut header)?;
        if header.is_empty() {
            // Clean end of stream: the filter thread closed batch's stdin
            // and batch exited. Surface any filter I/O failure.
            if let Some(handle) = self.filter.take() {
                match handle.join() {
                    Ok(result) => result?,
                    Err(_) => return Err(self.truncated()),
                }
            }
            return Ok(None);
        }

        let mut fields = header.fields();
        let (oid_hex, kind, size) = match (fields.next(), fields.next(), fields.next()) {
            (Some(oid), Some(kind), Some(size)) => (oid, kind, size),
            (Some(oid), Some(word), None) if word == b"missing" => {
                return Err(RepoError::MalformedObject {
                    kind: "unknown",
                    oid: String::from_utf8_lossy(oid).into_owned(),
                    reason: "listed by batch-check but missing from the object store".into(),
                });
            }
            _ => return Err(self.truncated()),
        };
        let oid = ObjectId::from_hex(oid_hex)?;
        let size: usize = std::str::from_utf8(size)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RepoError::MalformedObject {
                kind: "unknown",
                oid: oid.to_hex(),
                reason: "unparsable size in batch header".into(),
            })?;

        let mut body = vec![0u8; size];
        self.reader.read_exact(&mut body).map_err(|_| self.truncated())?;
        // The framing newline after the body.
        let mut nl = [0u8; 1];
        self.reader.read_exact(&mut nl).map_err(|_| self.truncated())?;

        let record = match kind {
            b"commit" => parse_commit(oid, &body)?,
            b"tree" => {
                let (record, malformed) = parse_tree(oid, &body);
                self.malformed_entries += malformed;
                record
            }
            _ => ObjectRecord::Other { oid },
        };
        self.last_good = Some(oid);
        Ok(Some(record))
    }
}

impl Iterator for ObjectStream {
    type Item = Result<ObjectRecord, RepoError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Copy commit/tree OIDs from the batch-check listing into batch's stdin.
/// Dropping the writer at the end closes the pipe, which is what ends the
/// batch child's output.
fn filter_oids(check_out: ChildStdout, batch_in: ChildStdin) -> std::io::Result<()> {
    let reader = BufReader::new(check_out);
    let mut writer = BufWriter::new(batch_in);
    for line in reader.split(b'\n') {
        let line = line?;
        let oid = if let Some(rest) = line.strip_prefix(b"commit ") {
            rest
        } else if let Some(rest) = line.strip_prefix(b"tree ") {
            rest
        } else {
            continue;
        };
        writer.write_all(oid)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

fn parse_commit(oid: ObjectId, body: &[u8]) -> Result<ObjectRecord, RepoError> {
    let malformed = |reason: &str| RepoError::MalformedObject {
        kind: "commit",
        oid: oid.to_hex(),
        reason: reason.to_string(),
    };

    let mut lines = ByteSlice::lines(body);
    let tree_hex = lines
        .next()
        .and_then(|line| line.strip_prefix(b"tree "))
        .ok_or_else(|| malformed("missing tree header"))?;
    let tree = ObjectId::from_hex(tree_hex).map_err(|_| malformed("bad tree OID"))?;

    // `parent` headers directly follow the tree line; the first other
    // header ends the list.
    let mut parents = Vec::new();
    for line in lines {
        match line.strip_prefix(b"parent ") {
            Some(hex) => {
                parents.push(ObjectId::from_hex(hex).map_err(|_| malformed("bad parent OID"))?)
            }
            None => break,
        }
    }

    Ok(ObjectRecord::Commit { oid, tree, parents })
}

/// Parse a tree body: repeating `<mode-ascii> <name>\0<20-byte-oid>` records.
/// The space that ends the mode string classifies the child: a 5-character
/// mode is a subtree, a 6-character mode a blob, anything else is skipped
/// and counted. Returns the record and the skipped-entry count.
fn parse_tree(oid: ObjectId, body: &[u8]) -> (ObjectRecord, u64) {
    let mut subtrees = Vec::new();
    let mut blobs = Vec::new();
    let mut malformed = 0u64;

    let mut pos = 0;
    while pos < body.len() {
        let Some(nul) = body[pos..].find_byte(0) else {
            malformed += 1;
            break;
        };
        let entry = &body[pos..pos + nul];
        let oid_start = pos + nul + 1;
        let oid_end = oid_start + ObjectId::LEN;
        if oid_end > body.len() {
            malformed += 1;
            break;
        }
        let child = match ObjectId::from_bytes(&body[oid_start..oid_end]) {
            Ok(child) => child,
            Err(_) => {
                malformed += 1;
                pos = oid_end;
                continue;
            }
        };
        match entry.find_byte(b' ') {
            Some(5) => subtrees.push(child),
            Some(6) => blobs.push(child),
            _ => malformed += 1,
        }
        pos = oid_end;
    }

    (ObjectRecord::Tree { oid, subtrees, blobs }, malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        ObjectId::from(bytes)
    }

    fn tree_entry(mode: &[u8], name: &[u8], child: ObjectId) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(mode);
        out.push(b' ');
        out.extend_from_slice(name);
        out.push(0);
        out.extend_from_slice(child.as_bytes());
        out
    }

    #[test]
    fn parse_commit_with_parents() {
        let body = format!(
            "tree {}\nparent {}\nparent {}\nauthor A <a@b> 0 +0000\n\nmsg\n",
            oid(10), oid(2), oid(3),
        );
        let record = parse_commit(oid(1), body.as_bytes()).unwrap();
        assert_eq!(
            record,
            ObjectRecord::Commit {
                oid: oid(1),
                tree: oid(10),
                parents: vec![oid(2), oid(3)],
            }
        );
    }

    #[test]
    fn parse_root_commit() {
        let body = format!("tree {}\nauthor A <a@b> 0 +0000\n\nmsg\n", oid(10));
        let record = parse_commit(oid(1), body.as_bytes()).unwrap();
        match record {
            ObjectRecord::Commit { parents, .. } => assert!(parents.is_empty()),
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn parent_list_ends_at_first_other_header() {
        // A `parent` line after `author` belongs to nothing we parse.
        let body = format!(
            "tree {}\nauthor A <a@b> 0 +0000\nparent {}\n\nmsg\n",
            oid(10), oid(2),
        );
        let record = parse_commit(oid(1), body.as_bytes()).unwrap();
        match record {
            ObjectRecord::Commit { parents, .. } => assert!(parents.is_empty()),
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn parse_commit_without_tree_fails() {
        assert!(parse_commit(oid(1), b"author A <a@b> 0 +0000\n\nmsg\n").is_err());
    }

    #[test]
    fn parse_tree_classifies_by_mode_length() {
        let mut body = Vec::new();
        body.extend(tree_entry(b"40000", b"dir", oid(11)));
        body.extend(tree_entry(b"100644", b"file.txt", oid(20)));
        body.extend(tree_entry(b"100755", b"run.sh", oid(21)));
        // Symlinks have a six-character mode and classify as blobs; they can
        // never match a scanned file because the scan skips symlinks.
        body.extend(tree_entry(b"120000", b"link", oid(22)));

        let (record, malformed) = parse_tree(oid(10), &body);
        assert_eq!(malformed, 0);
        assert_eq!(
            record,
            ObjectRecord::Tree {
                oid: oid(10),
                subtrees: vec![oid(11)],
                blobs: vec![oid(20), oid(21), oid(22)],
            }
        );
    }

    #[test]
    fn parse_tree_skips_odd_mode_lengths() {
        let mut body = Vec::new();
        body.extend(tree_entry(b"1006440", b"weird", oid(20)));
        body.extend(tree_entry(b"100644", b"normal", oid(21)));

        let (record, malformed) = parse_tree(oid(10), &body);
        assert_eq!(malformed, 1);
        match record {
            ObjectRecord::Tree { blobs, .. } => assert_eq!(blobs, vec![oid(21)]),
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn parse_tree_truncated_record_counts_and_stops() {
        let mut body = tree_entry(b"100644", b"a", oid(20));
        body.extend_from_slice(b"100644 b\0short");
        let (record, malformed) = parse_tree(oid(10), &body);
        assert_eq!(malformed, 1);
        match record {
            ObjectRecord::Tree { blobs, .. } => assert_eq!(blobs, vec![oid(20)]),
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn parse_empty_tree() {
        let (record, malformed) = parse_tree(oid(10), b"");
        assert_eq!(malformed, 0);
        assert_eq!(
            record,
            ObjectRecord::Tree { oid: oid(10), subtrees: vec![], blobs: vec![] }
        );
    }
}
