use std::collections::HashMap;

use xref_hash::ObjectId;

use crate::bitmap::Bitmap;

/// An equivalence class of commits whose coverage bitmaps are byte-identical.
///
/// Commits sharing a tree (or covering the same sources through different
/// trees) land in one group; the member list is sorted.
#[derive(Debug, Clone)]
pub struct CommitGroup {
    pub commits: Vec<ObjectId>,
    pub bitmap: Bitmap,
}

/// One emission of the greedy cover: the commits of the chosen group and the
/// bits they newly covered. An empty commit list is the trailing pseudo-entry
/// naming the sources no commit covers.
#[derive(Debug, Clone)]
pub struct CoverEntry {
    pub commits: Vec<ObjectId>,
    pub covered: Bitmap,
}

impl CoverEntry {
    pub fn is_unfound(&self) -> bool {
        self.commits.is_empty()
    }
}

/// Fold the per-commit bitmap map into groups keyed by bitmap bytes.
///
/// Groups come back ordered by their smallest member OID, which fixes the
/// scan order of the selector and thereby its tie-break, independent of the
/// object stream order.
pub fn group_commits(bitmaps: HashMap<ObjectId, Bitmap>) -> Vec<CommitGroup> {
    let mut by_bytes: HashMap<Bitmap, Vec<ObjectId>> = HashMap::new();
    for (commit, bitmap) in bitmaps {
        by_bytes.entry(bitmap).or_default().push(commit);
    }
    let mut groups: Vec<CommitGroup> = by_bytes
        .into_iter()
        .map(|(bitmap, mut commits)| {
            commits.sort();
            CommitGroup { commits, bitmap }
        })
        .collect();
    groups.sort_by(|a, b| a.commits[0].cmp(&b.commits[0]));
    groups
}

/// Greedy set cover over the groups.
///
/// Each round picks the group covering the most still-unfound sources and
/// emits it with exactly the newly covered bits; groups whose marginal
/// coverage drops to zero are discarded. Ties are broken toward the group
/// with the bytewise-smallest first commit OID (the groups arrive sorted
/// that way and the scan keeps the first maximum). The trailing entry
/// carries whatever no group could cover.
pub fn greedy_cover(mut groups: Vec<CommitGroup>, source_count: usize) -> Vec<CoverEntry> {
    let mut unfound = Bitmap::ones(source_count);
    let mut out = Vec::new();

    loop {
        let mut best: Option<(usize, usize)> = None;
        for (i, group) in groups.iter().enumerate() {
            let coverage = group.bitmap.and_count(&unfound);
            if coverage > best.map_or(0, |(c, _)| c) {
                best = Some((coverage, i));
            }
        }
        let Some((_, idx)) = best else {
            break;
        };
        let group = groups.remove(idx);
        let covered = group.bitmap.and(&unfound);
        unfound.and_not_assign(&group.bitmap);
        out.push(CoverEntry {
            commits: group.commits,
            covered,
        });
        groups.retain(|g| g.bitmap.and_count(&unfound) > 0);
    }

    out.push(CoverEntry {
        commits: Vec::new(),
        covered: unfound,
    });
    out
}
