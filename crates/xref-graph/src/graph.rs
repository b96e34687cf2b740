use std::collections::HashMap;

use xref_hash::ObjectId;

use crate::bitmap::Bitmap;
use crate::GraphError;

/// Identity of a vertex: its index in the graph's arena.
///
/// Two vertices with equal contents are still distinct; collapsing them
/// would fuse distinct tree OIDs and corrupt commit attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexId(pub(crate) u32);

impl VertexId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A vertex of the reverse graph: a tree or blob object.
///
/// The incoming list of the reversed DAG, split by element kind: `parents`
/// are the tree vertices that contain this object, `commits` are the commit
/// OIDs whose root tree this vertex is. Commits are leaf payloads, never
/// vertices.
#[derive(Debug, Default)]
pub struct Vertex {
    pub(crate) parents: Vec<VertexId>,
    pub(crate) commits: Vec<ObjectId>,
}

impl Vertex {
    fn new() -> Self {
        Self::default()
    }

    /// Total incoming-list length across both kinds.
    #[inline]
    fn degree(&self) -> usize {
        self.parents.len() + self.commits.len()
    }
}

/// Counters accumulated while building and reducing a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub commits: u64,
    pub trees: u64,
    pub blobs: u64,
    pub edges: u64,
    /// Singleton references collapsed by the reduction pass.
    pub reduced: u64,
}

/// The reverse graph: blob-keyed vertices over a shared arena.
///
/// Tree vertices are reachable only through the incoming edges of blob
/// vertices (and of other tree vertices). After construction the graph is
/// immutable; propagation keeps its transient per-vertex bitmaps in scratch
/// storage outside the arena.
pub struct Graph {
    pub(crate) arena: Vec<Vertex>,
    pub(crate) blobs: HashMap<ObjectId, VertexId>,
    pub(crate) commit_parents: HashMap<ObjectId, Vec<ObjectId>>,
    pub(crate) stats: BuildStats,
}

/// Single-pass graph construction from an unordered object stream.
///
/// References may precede definitions, so tree and blob lookups vivify a
/// placeholder vertex that later records wire into.
pub struct GraphBuilder {
    arena: Vec<Vertex>,
    trees: HashMap<ObjectId, VertexId>,
    blobs: HashMap<ObjectId, VertexId>,
    commit_parents: HashMap<ObjectId, Vec<ObjectId>>,
    stats: BuildStats,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            arena: Vec::new(),
            trees: HashMap::new(),
            blobs: HashMap::new(),
            commit_parents: HashMap::new(),
            stats: BuildStats::default(),
        }
    }

    fn tree_vertex(&mut self, oid: ObjectId) -> VertexId {
        vivify(&mut self.trees, &mut self.arena, oid)
    }

    fn blob_vertex(&mut self, oid: ObjectId) -> VertexId {
        vivify(&mut self.blobs, &mut self.arena, oid)
    }

    /// Ingest a commit: its OID becomes a leaf on its root tree's vertex,
    /// and its parent list is recorded in the side table.
    pub fn add_commit(&mut self, commit: ObjectId, tree: ObjectId, parents: Vec<ObjectId>) {
        let t = self.tree_vertex(tree);
        self.arena[t.index()].commits.push(commit);
        self.commit_parents.insert(commit, parents);
        self.stats.commits += 1;
        self.stats.edges += 1;
    }

    /// Ingest a tree: it becomes an incoming edge of each of its children.
    pub fn add_tree(&mut self, tree: ObjectId, subtrees: &[ObjectId], blobs: &[ObjectId]) {
        let tv = self.tree_vertex(tree);
        for &child in subtrees {
            let cv = self.tree_vertex(child);
            self.arena[cv.index()].parents.push(tv);
        }
        for &child in blobs {
            let cv = self.blob_vertex(child);
            self.arena[cv.index()].parents.push(tv);
        }
        self.stats.trees += 1;
        self.stats.edges += (subtrees.len() + blobs.len()) as u64;
    }

    /// Finish construction: run the reduction pass and seal the graph.
    pub fn finish(mut self) -> Graph {
        self.stats.blobs = self.blobs.len() as u64;
        self.stats.reduced = reduce(&mut self.arena);
        Graph {
            arena: self.arena,
            blobs: self.blobs,
            commit_parents: self.commit_parents,
            stats: self.stats,
        }
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn vivify(
    map: &mut HashMap<ObjectId, VertexId>,
    arena: &mut Vec<Vertex>,
    oid: ObjectId,
) -> VertexId {
    *map.entry(oid).or_insert_with(|| {
        let id = VertexId(arena.len() as u32);
        arena.push(Vertex::new());
        id
    })
}

const UNSEEN: u8 = 0;
const OPEN: u8 = 1;
const DONE: u8 = 2;

/// Collapse singleton references: any parent edge to a vertex whose whole
/// incoming list is a single element is replaced by that element. Long
/// chains of sole-parent trees become direct edges, which keeps both memory
/// and propagation depth flat. Each rewrite preserves list lengths, so a
/// vertex's degree never changes and the pass converges in one post-order
/// sweep.
fn reduce(arena: &mut [Vertex]) -> u64 {
    let mut state = vec![UNSEEN; arena.len()];
    let mut removed = 0u64;
    let mut stack: Vec<(u32, usize)> = Vec::new();

    for root in 0..arena.len() as u32 {
        if state[root as usize] != UNSEEN {
            continue;
        }
        state[root as usize] = OPEN;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let v = frame.0 as usize;
            let next = frame.1;
            if next < arena[v].parents.len() {
                frame.1 += 1;
                let p = arena[v].parents[next];
                if state[p.index()] == UNSEEN {
                    state[p.index()] = OPEN;
                    stack.push((p.0, 0));
                }
            } else {
                removed += collapse_singletons(arena, &state, v);
                state[v] = DONE;
                stack.pop();
            }
        }
    }
    removed
}

/// Rewrite `arena[v]`'s parent slots whose target is a finished singleton
/// vertex. A singleton holding a lone commit leaf surfaces that commit
/// directly on `v`; a singleton holding a lone parent edge is skipped over.
/// Targets still on the DFS stack (only possible with a cyclic input) are
/// left alone.
fn collapse_singletons(arena: &mut [Vertex], state: &[u8], v: usize) -> u64 {
    let mut removed = 0u64;
    let mut i = 0;
    while i < arena[v].parents.len() {
        let p = arena[v].parents[i].index();
        if p != v && state[p] == DONE && arena[p].degree() == 1 {
            let sole_parent = arena[p].parents.first().copied();
            let sole_commit = arena[p].commits.first().copied();
            removed += 1;
            if let Some(pp) = sole_parent {
                arena[v].parents[i] = pp;
                i += 1;
            } else if let Some(c) = sole_commit {
                arena[v].parents.remove(i);
                arena[v].commits.push(c);
            }
        } else {
            i += 1;
        }
    }
    removed
}

impl Graph {
    /// Whether any tree in the repository references this blob.
    pub fn contains_blob(&self, oid: &ObjectId) -> bool {
        match self.blobs.get(oid) {
            Some(v) => self.arena[v.index()].degree() > 0,
            None => false,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.arena.len()
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    /// The commit → parent-commits side table. Recorded for completeness;
    /// the selector does not consume it.
    pub fn commit_parents(&self) -> &HashMap<ObjectId, Vec<ObjectId>> {
        &self.commit_parents
    }

    /// Every commit whose tree transitively contains the given blob.
    /// Sorted and deduplicated.
    pub fn commits_for_blob(&self, blob: &ObjectId) -> Vec<ObjectId> {
        let mut out = Vec::new();
        let Some(&start) = self.blobs.get(blob) else {
            return out;
        };
        let mut visited = vec![false; self.arena.len()];
        visited[start.index()] = true;
        let mut stack = vec![start];
        while let Some(v) = stack.pop() {
            let vertex = &self.arena[v.index()];
            out.extend_from_slice(&vertex.commits);
            for &p in &vertex.parents {
                if !visited[p.index()] {
                    visited[p.index()] = true;
                    stack.push(p);
                }
            }
        }
        out.sort();
        out.dedup();
        out
    }

    /// Topological order over the vertices reachable from `sources` by
    /// incoming edges: every vertex precedes its parents. Iterative DFS with
    /// a visited set (hostile inputs can craft self-referential trees).
    fn topo_sort(&self, sources: &[VertexId]) -> Vec<VertexId> {
        let mut visited = vec![false; self.arena.len()];
        let mut order: Vec<VertexId> = Vec::new();
        let mut stack: Vec<(VertexId, usize)> = Vec::new();

        for &s in sources {
            if visited[s.index()] {
                continue;
            }
            visited[s.index()] = true;
            stack.push((s, 0));
            while let Some(frame) = stack.last_mut() {
                let v = frame.0;
                let i = frame.1;
                let parents = &self.arena[v.index()].parents;
                if i < parents.len() {
                    frame.1 += 1;
                    let p = parents[i];
                    if !visited[p.index()] {
                        visited[p.index()] = true;
                        stack.push((p, 0));
                    }
                } else {
                    order.push(v);
                    stack.pop();
                }
            }
        }
        order.reverse();
        order
    }

    /// Compute each commit's coverage bitmap over the source list: bit `i`
    /// is set iff `sources[i]` is transitively contained by that commit's
    /// tree.
    ///
    /// With `step = Some(s)` (a positive multiple of 8) the sources are
    /// propagated in `s`-sized slices and the partial bitmaps land in the
    /// full-width output at their byte offset; the result is identical, the
    /// peak bitmap memory is capped.
    pub fn bitmaps(
        &self,
        sources: &[ObjectId],
        step: Option<usize>,
    ) -> Result<HashMap<ObjectId, Bitmap>, GraphError> {
        let n = sources.len();
        let mut out: HashMap<ObjectId, Bitmap> = HashMap::new();
        if n == 0 {
            return Ok(out);
        }
        let step = match step {
            None => n,
            Some(s) if s == 0 || s % 8 != 0 => return Err(GraphError::InvalidStep(s)),
            Some(s) => s.min(n),
        };

        let mut start = 0;
        while start < n {
            let end = (start + step).min(n);
            let slice = &sources[start..end];
            let byte_base = start / 8;

            let slice_sources: Vec<VertexId> = slice
                .iter()
                .filter_map(|oid| self.blobs.get(oid).copied())
                .collect();
            let topo = self.topo_sort(&slice_sources);

            // Seed one bit per source on its blob vertex. Slots live outside
            // the arena so the graph stays immutable and shareable.
            let mut slots: Vec<Option<Bitmap>> = vec![None; self.arena.len()];
            for (i, oid) in slice.iter().enumerate() {
                if let Some(&v) = self.blobs.get(oid) {
                    let mut bm = Bitmap::zeros(slice.len());
                    bm.set(i);
                    slots[v.index()] = Some(bm);
                }
            }

            // Push bitmaps leaf-to-root. Taking the slot frees each vertex's
            // bitmap the moment it is consumed; only the frontier carries
            // bitmaps.
            for &v in &topo {
                let Some(bm) = slots[v.index()].take() else {
                    continue;
                };
                let vertex = &self.arena[v.index()];
                for &p in &vertex.parents {
                    match &mut slots[p.index()] {
                        Some(existing) => existing.or_assign(&bm),
                        slot @ None => *slot = Some(bm.clone()),
                    }
                }
                for &c in &vertex.commits {
                    out.entry(c)
                        .or_insert_with(|| Bitmap::zeros(n))
                        .or_bytes_at(byte_base, bm.as_bytes());
                }
            }

            start = end;
        }
        Ok(out)
    }
}
