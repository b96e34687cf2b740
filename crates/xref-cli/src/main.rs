mod direct;

use std::io::Write;
use std::path::PathBuf;
use std::process;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use xref_graph::{greedy_cover, group_commits, serialize, CoverEntry, Graph, GraphBuilder};
use xref_repo::{ObjectRecord, Repository};
use xref_source::SourceTable;
use xref_utils::progress::Progress;

const GRAPH_ARTIFACT: &str = "graph";

/// Find the commits that best explain a directory of loose files.
#[derive(Parser)]
#[command(name = "gitxref", version)]
pub struct Cli {
    /// Path to the git repository
    repository: PathBuf,

    /// Path to the directory to explain (e.g. an unpacked tarball)
    directory: Option<PathBuf>,

    /// Rebuild the graph cache even if it is still valid
    #[arg(short = 'R', long)]
    rebuild: bool,

    /// Neither read nor write the graph cache
    #[arg(long)]
    skip_cache: bool,

    /// Compute per-commit bitmaps with ls-tree instead of the reverse graph
    #[arg(long)]
    direct: bool,

    /// Worker threads for --direct [default: all cores]
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Propagate bitmaps in slices of this many sources (multiple of 8)
    #[arg(long, conflicts_with = "direct")]
    step: Option<usize>,
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("fatal: {e:#}");
            process::exit(128);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let repo = Repository::discover(&cli.repository)?;

    let Some(ref directory) = cli.directory else {
        // No directory: just make sure the graph is built and cached.
        load_or_build_graph(&repo, &cli)?;
        return Ok(0);
    };

    let table = SourceTable::scan(directory)?;
    eprintln!("Source files: {} distinct blobs", table.len());

    let bitmaps = if cli.direct {
        direct::bitmaps(&repo, &table, cli.threads)?
    } else {
        let graph = load_or_build_graph(&repo, &cli)?;
        graph.bitmaps(&table.oids(), cli.step)?
    };

    let cover = greedy_cover(group_commits(bitmaps), table.len());

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    print_cover(&table, &cover, &mut out)?;
    Ok(0)
}

/// Load the graph from the sidecar cache, or ingest the object stream and
/// build it. A freshly built graph is written back unless the cache is
/// skipped; write failures are reported but never fail the run.
fn load_or_build_graph(repo: &Repository, cli: &Cli) -> Result<Graph> {
    let key = repo.refs_key()?;
    let cache = repo
        .cache(key)
        .force_rebuild(cli.rebuild)
        .skip(cli.skip_cache);

    if let Some(payload) = cache.load(GRAPH_ARTIFACT) {
        // A payload that fails to decode is the same as a stale one.
        if let Ok(graph) = serialize::decode(&payload) {
            eprintln!("Loading graph from cache.");
            return Ok(graph);
        }
    }

    let graph = build_graph(repo)?;

    if !cli.skip_cache {
        eprintln!("Saving graph cache.");
        if let Err(e) = cache.store(GRAPH_ARTIFACT, &serialize::encode(&graph)) {
            eprintln!("warning: could not write graph cache: {e}");
        }
    }
    Ok(graph)
}

/// Ingest the object stream on a worker thread and build the reverse graph
/// on this one. Construction is commutative over the record multiset, so no
/// ordering is imposed on the channel.
fn build_graph(repo: &Repository) -> Result<Graph> {
    let stream = repo.objects()?;
    let (tx, rx) = crossbeam::channel::bounded::<ObjectRecord>(1024);

    let reader = std::thread::spawn(move || -> std::result::Result<u64, xref_repo::RepoError> {
        let mut stream = stream;
        for record in &mut stream {
            if tx.send(record?).is_err() {
                // Receiver dropped: the build already failed, just stop.
                break;
            }
        }
        Ok(stream.malformed_entries())
    });

    let mut builder = GraphBuilder::new();
    let mut progress = Progress::new("Building reversed graph", None);
    for record in rx {
        match record {
            ObjectRecord::Commit { oid, tree, parents } => builder.add_commit(oid, tree, parents),
            ObjectRecord::Tree { oid, subtrees, blobs } => builder.add_tree(oid, &subtrees, &blobs),
            ObjectRecord::Other { .. } => {}
        }
        progress.tick();
    }
    progress.finish();

    let malformed = reader
        .join()
        .map_err(|_| anyhow!("object reader thread panicked"))?
        .context("reading object stream")?;
    if malformed > 0 {
        eprintln!("warning: skipped {malformed} tree entries with unexpected modes");
    }

    let graph = builder.finish();
    let stats = graph.stats();
    eprintln!(
        "Commits: {}, Trees: {}, Blobs: {}, Edges: {}",
        stats.commits, stats.trees, stats.blobs, stats.edges
    );
    eprintln!("{} singular references removed.", stats.reduced);
    Ok(graph)
}

/// One line per emitted group: space-separated short commit IDs and the
/// count of newly covered blobs, then one indented line per covered path.
/// The trailing pseudo-group is labelled `Unfound:`.
fn print_cover(
    table: &SourceTable,
    cover: &[CoverEntry],
    out: &mut impl Write,
) -> Result<()> {
    for entry in cover {
        let count = entry.covered.count_ones();
        if entry.is_unfound() {
            writeln!(out, "Unfound: {count}")?;
        } else {
            let ids: Vec<String> = entry.commits.iter().map(|c| c.short_hex(12)).collect();
            writeln!(out, "{} {count}", ids.join(" "))?;
        }
        for i in entry.covered.iter_ones() {
            for path in &table.get(i).paths {
                writeln!(out, "    {}", path.display())?;
            }
        }
    }
    Ok(())
}
