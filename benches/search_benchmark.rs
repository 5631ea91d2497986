//! Criterion benchmarks for result combination
//!
//! These benchmarks measure:
//! - Fair flattening of per-repository matches
//! - Union and intersection of leaf results by file

use codesearch_core::aggregate::{SearchResults, SearchResultsCommon};
use codesearch_core::evaluate::{intersect_merge, union_merge};
use codesearch_core::models::{FileMatch, Repo, SearchResult};
use codesearch_core::unindexed::flatten_file_matches;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Instant;

fn groups(repos: usize, files_per_repo: usize) -> Vec<Vec<FileMatch>> {
    (0..repos)
        .map(|r| {
            let repo = Repo::new(r as i32, format!("github.com/bench/r{}", r));
            (0..files_per_repo)
                .map(|f| FileMatch::new(repo.clone(), "c0ffee", format!("src/f{}.rs", f)))
                .collect()
        })
        .collect()
}

fn results(files: &[FileMatch]) -> SearchResults {
    SearchResults::new(
        files.iter().cloned().map(SearchResult::from).collect(),
        SearchResultsCommon::new(),
        Instant::now(),
    )
}

fn bench_flatten(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatten_file_matches");
    for repos in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(repos), &repos, |b, &repos| {
            let input = groups(repos, 20);
            b.iter(|| flatten_file_matches(black_box(input.clone()), 500));
        });
    }
    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let files: Vec<FileMatch> = groups(50, 40).into_iter().flatten().collect();
    let (left, right) = files.split_at(files.len() / 2);
    let overlap: Vec<FileMatch> = files[files.len() / 4..].to_vec();

    c.bench_function("union_merge", |b| {
        b.iter(|| union_merge(black_box(results(left)), black_box(results(right))));
    });
    c.bench_function("intersect_merge", |b| {
        b.iter(|| intersect_merge(black_box(results(left)), black_box(results(&overlap))));
    });
}

criterion_group!(benches, bench_flatten, bench_merge);
criterion_main!(benches);
