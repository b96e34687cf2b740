//! Direct mode: per-commit tree materialization.
//!
//! Instead of building the reverse graph, fan `ls-tree -r` out across a
//! worker pool and set bits straight from each commit's flattened tree.
//! Slower per run and nothing is cached, but it needs no graph in memory;
//! the output is identical to the graph path.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use rayon::prelude::*;

use xref_graph::Bitmap;
use xref_hash::ObjectId;
use xref_repo::{RepoError, Repository};
use xref_source::SourceTable;
use xref_utils::progress::Progress;

pub fn bitmaps(
    repo: &Repository,
    table: &SourceTable,
    threads: Option<usize>,
) -> Result<HashMap<ObjectId, Bitmap>> {
    let commits = repo.commit_oids()?;

    let mut pool = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        pool = pool.num_threads(n);
    }
    let pool = pool.build().context("building direct-mode worker pool")?;

    let progress = Mutex::new(Progress::new(
        "Materializing commit trees",
        Some(commits.len() as u64),
    ));

    let results: std::result::Result<Vec<(ObjectId, Bitmap)>, RepoError> = pool.install(|| {
        commits
            .par_iter()
            .map(|&commit| {
                let mut bitmap = Bitmap::zeros(table.len());
                for oid in repo.tree_blobs(&commit)? {
                    if let Some(i) = table.index_of(&oid) {
                        bitmap.set(i);
                    }
                }
                if let Ok(mut p) = progress.lock() {
                    p.tick();
                }
                Ok((commit, bitmap))
            })
            .collect()
    });
    let results = results?;
    if let Ok(p) = progress.into_inner() {
        p.finish();
    }

    // Commits touching no source blob get no entry, exactly like the graph
    // path, so grouping and cover emission match byte for byte.
    Ok(results
        .into_iter()
        .filter(|(_, bitmap)| !bitmap.is_zero())
        .collect())
}
