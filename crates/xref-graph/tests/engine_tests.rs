//! Whole-engine properties: build, propagate, group, select.

use std::collections::HashMap;

use xref_graph::{greedy_cover, group_commits, serialize, Graph, GraphBuilder};
use xref_hash::ObjectId;

fn oid(kind: u8, n: u8) -> ObjectId {
    let mut bytes = [0u8; 20];
    bytes[0] = kind;
    bytes[19] = n;
    ObjectId::from(bytes)
}

fn commit(n: u8) -> ObjectId {
    oid(1, n)
}

fn tree(n: u8) -> ObjectId {
    oid(2, n)
}

fn blob(n: u8) -> ObjectId {
    oid(3, n)
}

/// A small history with sharing, nesting, and an orphaned blob:
///
/// - C1 → T1 { blob1, sub: T3 { blob3, blob4 } }
/// - C2 → T2 { blob2, sub: T3 }
/// - C3 → T1 (identical tree as C1)
/// - blob5 exists only in the source list
fn sample() -> Graph {
    let mut b = GraphBuilder::new();
    b.add_commit(commit(1), tree(1), vec![]);
    b.add_commit(commit(2), tree(2), vec![commit(1)]);
    b.add_commit(commit(3), tree(1), vec![commit(2)]);
    b.add_tree(tree(1), &[tree(3)], &[blob(1)]);
    b.add_tree(tree(2), &[tree(3)], &[blob(2)]);
    b.add_tree(tree(3), &[], &[blob(3), blob(4)]);
    b.finish()
}

fn sources() -> Vec<ObjectId> {
    vec![blob(1), blob(2), blob(3), blob(4), blob(5)]
}

#[test]
fn every_present_source_is_covered_exactly_once() {
    let graph = sample();
    let maps = graph.bitmaps(&sources(), None).unwrap();
    let cover = greedy_cover(group_commits(maps), sources().len());

    let mut covered_by = vec![0usize; sources().len()];
    for entry in cover.iter().filter(|e| !e.is_unfound()) {
        for i in entry.covered.iter_ones() {
            covered_by[i] += 1;
        }
    }
    // blob1..blob4 are in the graph and must be covered exactly once;
    // blob5 never.
    assert_eq!(covered_by, vec![1, 1, 1, 1, 0]);
}

#[test]
fn trailer_names_exactly_the_absent_sources() {
    let graph = sample();
    let srcs = sources();
    let maps = graph.bitmaps(&srcs, None).unwrap();
    let cover = greedy_cover(group_commits(maps), srcs.len());

    let trailer = cover.last().unwrap();
    assert!(trailer.is_unfound());
    for i in trailer.covered.iter_ones() {
        assert!(
            !graph.contains_blob(&srcs[i]),
            "source {i} is in the graph yet reported unfound"
        );
    }
    for (i, src) in srcs.iter().enumerate() {
        if !graph.contains_blob(src) {
            assert!(trailer.covered.get(i), "absent source {i} missing from trailer");
        }
    }
}

#[test]
fn emitted_coverage_is_monotonically_nonincreasing() {
    let graph = sample();
    let maps = graph.bitmaps(&sources(), None).unwrap();
    let cover = greedy_cover(group_commits(maps), sources().len());

    let counts: Vec<usize> = cover
        .iter()
        .filter(|e| !e.is_unfound())
        .map(|e| e.covered.count_ones())
        .collect();
    assert!(!counts.is_empty());
    assert!(counts.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn identical_trees_group_their_commits() {
    let graph = sample();
    let maps = graph.bitmaps(&sources(), None).unwrap();
    // C1 and C3 share tree(1) and must be byte-identical.
    assert_eq!(maps[&commit(1)], maps[&commit(3)]);

    let groups = group_commits(maps);
    let shared = groups
        .iter()
        .find(|g| g.commits.len() == 2)
        .expect("C1 and C3 should form one group");
    assert_eq!(shared.commits, vec![commit(1), commit(3)]);
}

#[test]
fn padding_bits_stay_zero_everywhere() {
    // Five sources: three padding bits in the single output byte.
    let graph = sample();
    let srcs = sources();
    let maps = graph.bitmaps(&srcs, None).unwrap();
    for bm in maps.values() {
        assert_eq!(bm.as_bytes()[0] & 0b0000_0111, 0);
    }
    let cover = greedy_cover(group_commits(maps), srcs.len());
    for entry in &cover {
        assert_eq!(entry.covered.as_bytes()[0] & 0b0000_0111, 0);
    }
}

#[test]
fn output_is_invariant_under_stream_permutation() {
    // The same objects in reversed ingestion order must produce the same
    // groups and the same emission order.
    let forward = sample();
    let backward = {
        let mut b = GraphBuilder::new();
        b.add_tree(tree(3), &[], &[blob(3), blob(4)]);
        b.add_tree(tree(2), &[tree(3)], &[blob(2)]);
        b.add_tree(tree(1), &[tree(3)], &[blob(1)]);
        b.add_commit(commit(3), tree(1), vec![commit(2)]);
        b.add_commit(commit(2), tree(2), vec![commit(1)]);
        b.add_commit(commit(1), tree(1), vec![]);
        b.finish()
    };

    let srcs = sources();
    let cover_a = greedy_cover(
        group_commits(forward.bitmaps(&srcs, None).unwrap()),
        srcs.len(),
    );
    let cover_b = greedy_cover(
        group_commits(backward.bitmaps(&srcs, None).unwrap()),
        srcs.len(),
    );

    assert_eq!(cover_a.len(), cover_b.len());
    for (a, b) in cover_a.iter().zip(&cover_b) {
        assert_eq!(a.commits, b.commits);
        assert_eq!(a.covered, b.covered);
    }
}

#[test]
fn cache_roundtrip_produces_identical_cover() {
    let graph = sample();
    let restored = serialize::decode(&serialize::encode(&graph)).unwrap();

    let srcs = sources();
    let cover_a = greedy_cover(
        group_commits(graph.bitmaps(&srcs, None).unwrap()),
        srcs.len(),
    );
    let cover_b = greedy_cover(
        group_commits(restored.bitmaps(&srcs, None).unwrap()),
        srcs.len(),
    );

    assert_eq!(cover_a.len(), cover_b.len());
    for (a, b) in cover_a.iter().zip(&cover_b) {
        assert_eq!(a.commits, b.commits);
        assert_eq!(a.covered, b.covered);
    }
}

#[test]
fn no_coverage_emits_lone_all_ones_trailer() {
    let graph = sample();
    // None of these sources exist in the repository.
    let srcs = vec![blob(50), blob(51), blob(52)];
    let maps = graph.bitmaps(&srcs, None).unwrap();
    assert!(maps.is_empty());

    let cover = greedy_cover(group_commits(maps), srcs.len());
    assert_eq!(cover.len(), 1);
    assert!(cover[0].is_unfound());
    assert_eq!(cover[0].covered.count_ones(), 3);
}

#[test]
fn commit_parent_map_survives_the_pipeline() {
    let graph = sample();
    let expected: HashMap<ObjectId, Vec<ObjectId>> = [
        (commit(1), vec![]),
        (commit(2), vec![commit(1)]),
        (commit(3), vec![commit(2)]),
    ]
    .into_iter()
    .collect();
    assert_eq!(graph.commit_parents(), &expected);

    let restored = serialize::decode(&serialize::encode(&graph)).unwrap();
    assert_eq!(restored.commit_parents(), &expected);
}
