//! The reverse-graph bitmap engine.
//!
//! The repository's commit → tree → (tree|blob) DAG is inverted so that each
//! blob points back toward the commits that transitively contain it. Per-source
//! bitmaps are seeded on blob vertices and pushed leaf-to-root in one
//! topological pass, yielding a blob-coverage bitmap per commit. A greedy
//! set-cover selector then emits commit groups in decreasing marginal-coverage
//! order.

pub mod bitmap;
pub mod cover;
mod graph;
pub mod serialize;

pub use bitmap::Bitmap;
pub use cover::{greedy_cover, group_commits, CommitGroup, CoverEntry};
pub use graph::{BuildStats, Graph, GraphBuilder, Vertex, VertexId};

/// Errors produced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("step must be a positive multiple of 8, got {0}")]
    InvalidStep(usize),

    #[error("corrupt graph data: {0}")]
    Corrupt(String),
}
