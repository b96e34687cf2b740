//! Graph serialization for the on-disk cache.
//!
//! Big-endian, length-prefixed tables. Vertex sharing round-trips through
//! arena indices: two incoming-list elements that point at one vertex in
//! memory encode as the same index and decode back to one vertex.
//!
//! ```text
//! u32 vertex count
//! per vertex: u32 parent count, u32 parent ids,
//!             u32 commit count, 20-byte commit OIDs
//! u32 blob count,   per blob:  20-byte OID, u32 vertex id
//! u32 commit count, per entry: 20-byte OID, u32 parent count, 20-byte OIDs
//! ```

use std::collections::HashMap;

use xref_hash::ObjectId;

use crate::graph::{BuildStats, Graph, Vertex, VertexId};
use crate::GraphError;

/// Serialize a graph to bytes. Map tables are written in OID order so the
/// same graph always produces the same bytes.
pub fn encode(graph: &Graph) -> Vec<u8> {
    let mut out = Vec::new();

    put_u32(&mut out, graph.arena.len() as u32);
    for vertex in &graph.arena {
        put_u32(&mut out, vertex.parents.len() as u32);
        for p in &vertex.parents {
            put_u32(&mut out, p.0);
        }
        put_u32(&mut out, vertex.commits.len() as u32);
        for c in &vertex.commits {
            out.extend_from_slice(c.as_bytes());
        }
    }

    let mut blobs: Vec<(&ObjectId, &VertexId)> = graph.blobs.iter().collect();
    blobs.sort_by_key(|(oid, _)| **oid);
    put_u32(&mut out, blobs.len() as u32);
    for (oid, id) in blobs {
        out.extend_from_slice(oid.as_bytes());
        put_u32(&mut out, id.0);
    }

    let mut commits: Vec<(&ObjectId, &Vec<ObjectId>)> = graph.commit_parents.iter().collect();
    commits.sort_by_key(|(oid, _)| **oid);
    put_u32(&mut out, commits.len() as u32);
    for (oid, parents) in commits {
        out.extend_from_slice(oid.as_bytes());
        put_u32(&mut out, parents.len() as u32);
        for p in parents {
            out.extend_from_slice(p.as_bytes());
        }
    }

    out
}

/// Deserialize a graph. Any truncation or out-of-range vertex id is
/// reported as [`GraphError::Corrupt`]; callers treat that as a cache miss.
pub fn decode(data: &[u8]) -> Result<Graph, GraphError> {
    let mut r = Reader { data, pos: 0 };

    // Every count is validated against the bytes actually present before
    // any allocation, so a corrupt length prefix fails cleanly.
    let vertex_count = r.count(8)?;
    let mut arena = Vec::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        let parent_count = r.count(4)?;
        let mut parents = Vec::with_capacity(parent_count);
        for _ in 0..parent_count {
            parents.push(VertexId(r.vertex_id(vertex_count)?));
        }
        let commit_count = r.count(ObjectId::LEN)?;
        let mut commits = Vec::with_capacity(commit_count);
        for _ in 0..commit_count {
            commits.push(r.oid()?);
        }
        arena.push(Vertex { parents, commits });
    }

    let blob_count = r.count(ObjectId::LEN + 4)?;
    let mut blobs = HashMap::with_capacity(blob_count);
    for _ in 0..blob_count {
        let oid = r.oid()?;
        let id = VertexId(r.vertex_id(vertex_count)?);
        blobs.insert(oid, id);
    }

    let commit_count = r.count(ObjectId::LEN + 4)?;
    let mut commit_parents = HashMap::with_capacity(commit_count);
    for _ in 0..commit_count {
        let oid = r.oid()?;
        let parent_count = r.count(ObjectId::LEN)?;
        let mut parents = Vec::with_capacity(parent_count);
        for _ in 0..parent_count {
            parents.push(r.oid()?);
        }
        commit_parents.insert(oid, parents);
    }

    if r.pos != data.len() {
        return Err(GraphError::Corrupt(format!(
            "{} trailing bytes",
            data.len() - r.pos
        )));
    }

    Ok(Graph {
        arena,
        blobs,
        commit_parents,
        stats: BuildStats::default(),
    })
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take(&mut self, len: usize) -> Result<&[u8], GraphError> {
        let end = self.pos.checked_add(len).filter(|&e| e <= self.data.len());
        match end {
            Some(end) => {
                let slice = &self.data[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(GraphError::Corrupt(format!(
                "unexpected end of data at offset {}",
                self.pos
            ))),
        }
    }

    fn u32(&mut self) -> Result<u32, GraphError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a table length and check that `len * min_item_size` bytes can
    /// still follow.
    fn count(&mut self, min_item_size: usize) -> Result<usize, GraphError> {
        let len = self.u32()? as usize;
        let needed = len.checked_mul(min_item_size);
        if needed.map_or(true, |n| n > self.data.len() - self.pos) {
            return Err(GraphError::Corrupt(format!(
                "table of {len} entries does not fit in remaining data"
            )));
        }
        Ok(len)
    }

    fn vertex_id(&mut self, vertex_count: usize) -> Result<u32, GraphError> {
        let id = self.u32()?;
        if id as usize >= vertex_count {
            return Err(GraphError::Corrupt(format!(
                "vertex id {id} out of range ({vertex_count} vertices)"
            )));
        }
        Ok(id)
    }

    fn oid(&mut self) -> Result<ObjectId, GraphError> {
        let bytes = self.take(ObjectId::LEN)?;
        ObjectId::from_bytes(bytes).map_err(|e| GraphError::Corrupt(e.to_string()))
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}
