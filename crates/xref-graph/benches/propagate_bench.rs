use criterion::{black_box, criterion_group, criterion_main, Criterion};
use xref_graph::{greedy_cover, group_commits, GraphBuilder};
use xref_hash::ObjectId;

fn oid(kind: u8, n: u32) -> ObjectId {
    let mut bytes = [0u8; 20];
    bytes[0] = kind;
    bytes[16..].copy_from_slice(&n.to_be_bytes());
    ObjectId::from(bytes)
}

/// A synthetic history: `commits` commits, each with its own root tree over
/// one shared subtree of `blobs` blobs plus one private blob.
fn build_graph(commits: u32, blobs: u32) -> (xref_graph::Graph, Vec<ObjectId>) {
    let shared_tree = oid(2, 0);
    let shared: Vec<ObjectId> = (0..blobs).map(|i| oid(3, i)).collect();

    let mut b = GraphBuilder::new();
    b.add_tree(shared_tree, &[], &shared);
    for c in 0..commits {
        let root = oid(2, c + 1);
        let own = oid(4, c);
        b.add_tree(root, &[shared_tree], &[own]);
        b.add_commit(oid(1, c), root, vec![]);
    }

    let mut sources = shared;
    sources.extend((0..commits).map(|c| oid(4, c)));
    (b.finish(), sources)
}

fn propagate(c: &mut Criterion) {
    let (graph, sources) = build_graph(200, 512);

    let mut group = c.benchmark_group("propagate");

    group.bench_function("bitmaps_full", |b| {
        b.iter(|| graph.bitmaps(black_box(&sources), None).unwrap())
    });

    group.bench_function("bitmaps_stepped_64", |b| {
        b.iter(|| graph.bitmaps(black_box(&sources), Some(64)).unwrap())
    });

    group.finish();
}

fn cover(c: &mut Criterion) {
    let (graph, sources) = build_graph(200, 512);
    let maps = graph.bitmaps(&sources, None).unwrap();

    let mut group = c.benchmark_group("cover");

    group.bench_function("group_and_select", |b| {
        b.iter(|| {
            let groups = group_commits(black_box(maps.clone()));
            greedy_cover(groups, sources.len())
        })
    });

    group.finish();
}

criterion_group!(benches, propagate, cover);
criterion_main!(benches);
