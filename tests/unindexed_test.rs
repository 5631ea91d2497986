//! Tests for searching repositories outside the index

mod common;

use codesearch_core::compiler::{compile, CompileMode};
use codesearch_core::config::{Config, UnindexedConfig};
use codesearch_core::evaluate::{Field, Parameter, QueryNode};
use codesearch_core::models::{PatternInfo, PatternType};
use codesearch_core::unindexed::{UnindexedSearchRequest, UnindexedSearcher};
use common::{file_uris, param, TestServices};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn searcher(services: &TestServices, requests_per_endpoint: usize) -> UnindexedSearcher {
    UnindexedSearcher::new(
        services.backend.clone(),
        services.backend.clone(),
        UnindexedConfig {
            requests_per_endpoint,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_concurrency_bounded_by_limiter() {
    let mut services = TestServices::new(&["backend-0"]);
    for i in 0..10 {
        let name = format!("github.com/acme/r{}", i);
        services.unindexed_repo(&name, &[("a.txt", "needle\n")]);
        services.backend.set_latency(&name, Duration::from_millis(20));
    }
    let searcher = searcher(&services, 2);
    let info = PatternInfo::new("needle", PatternType::Literal, 100);
    let compiled = compile(&info, CompileMode::Text).unwrap();

    let outcome = searcher
        .search(
            &UnindexedSearchRequest {
                info: &info,
                pattern: &compiled.backend,
                repos: &services.repos,
                deadline: Some(Instant::now() + Duration::from_secs(10)),
                use_full_deadline: true,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.groups.len(), 10);
    assert_eq!(outcome.common.searched.len(), 10);
    assert!(services.backend.max_in_flight() <= 2);
    assert_eq!(searcher.limiter().limit(), 2);
    assert_eq!(searcher.limiter().in_use(), 0);
}

#[tokio::test]
async fn test_limiter_scales_with_endpoints() {
    let mut services = TestServices::new(&["backend-0", "backend-1", "backend-2"]);
    services.unindexed_repo("github.com/acme/r", &[("a.txt", "needle\n")]);
    let searcher = searcher(&services, 4);
    let info = PatternInfo::new("needle", PatternType::Literal, 10);
    let compiled = compile(&info, CompileMode::Text).unwrap();

    searcher
        .search(
            &UnindexedSearchRequest {
                info: &info,
                pattern: &compiled.backend,
                repos: &services.repos,
                deadline: None,
                use_full_deadline: false,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(searcher.limiter().limit(), 12);

    services.backend.set_endpoints(vec!["backend-0".to_string()]);
    searcher
        .search(
            &UnindexedSearchRequest {
                info: &info,
                pattern: &compiled.backend,
                repos: &services.repos,
                deadline: None,
                use_full_deadline: false,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(searcher.limiter().limit(), 4);
}

#[tokio::test]
async fn test_cancelled_search_issues_no_requests() {
    let mut services = TestServices::new(&["backend-0"]);
    services.unindexed_repo("github.com/acme/r", &[("a.txt", "needle\n")]);
    let searcher = searcher(&services, 4);
    let info = PatternInfo::new("needle", PatternType::Literal, 10);
    let compiled = compile(&info, CompileMode::Text).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = searcher
        .search(
            &UnindexedSearchRequest {
                info: &info,
                pattern: &compiled.backend,
                repos: &services.repos,
                deadline: None,
                use_full_deadline: false,
            },
            &cancel,
        )
        .await
        .unwrap();

    assert!(outcome.groups.is_empty());
    assert_eq!(services.backend.request_count(), 0);
}

#[tokio::test]
async fn test_repo_has_file_filter() {
    let mut services = TestServices::new(&["backend-0"]);
    services.unindexed_repo(
        "github.com/acme/crate",
        &[("Cargo.toml", "[package]\n"), ("src/lib.rs", "needle\n")],
    );
    services.unindexed_repo("github.com/acme/other", &[("main.go", "needle\n")]);

    let results = services
        .service()
        .search(services.request(vec![
            param(Field::RepoHasFile, "Cargo\\.toml"),
            QueryNode::pattern("needle"),
        ]))
        .await
        .unwrap();

    assert_eq!(
        file_uris(&results.results),
        vec!["github.com/acme/crate#src/lib.rs"]
    );
}

#[tokio::test]
async fn test_file_and_language_filters() {
    let mut services = TestServices::new(&["backend-0"]);
    services.unindexed_repo(
        "github.com/acme/r",
        &[
            ("src/lib.rs", "needle\n"),
            ("src/lib_test.rs", "needle\n"),
            ("main.go", "needle\n"),
        ],
    );
    let service = services.service();

    let rust_only = service
        .search(services.request(vec![
            param(Field::Lang, "rust"),
            QueryNode::pattern("needle"),
        ]))
        .await
        .unwrap();
    assert_eq!(
        file_uris(&rust_only.results),
        vec!["github.com/acme/r#src/lib.rs", "github.com/acme/r#src/lib_test.rs"]
    );

    let without_tests = service
        .search(services.request(vec![
            param(Field::Lang, "rust"),
            QueryNode::Parameter(Parameter::negated(Field::File, "_test")),
            QueryNode::pattern("needle"),
        ]))
        .await
        .unwrap();
    assert_eq!(
        file_uris(&without_tests.results),
        vec!["github.com/acme/r#src/lib.rs"]
    );
}

#[tokio::test]
async fn test_slow_repository_among_many_times_out() {
    let mut services = TestServices::new(&["backend-0"]);
    services.unindexed_repo("github.com/acme/fast", &[("a.txt", "needle\n")]);
    services.unindexed_repo("github.com/acme/slow", &[("a.txt", "needle\n")]);
    // Longer than the per-repository budget used when several repositories are searched
    services
        .backend
        .set_latency("github.com/acme/slow", Duration::from_secs(5));

    let mut config = Config::default();
    config.unindexed.fetch_timeout_ms = 50;
    let results = services
        .service_with(config)
        .search(services.request(vec![QueryNode::pattern("needle")]))
        .await
        .unwrap();

    assert_eq!(file_uris(&results.results), vec!["github.com/acme/fast#a.txt"]);
    assert_eq!(results.common.timedout.len(), 1);
    assert!(results.alert.is_none());
    assert_eq!(results.approximate_result_count(), "1+");
}
