//! Index search execution

use super::client::{IndexError, IndexFileMatch, IndexSearchOptions, IndexService};
use super::options::{
    max_line_fragment_matches, max_line_matches, result_count_factor, search_options,
};
use crate::aggregate::SearchResultsCommon;
use crate::compiler::{CompileMode, IndexQuery};
use crate::config::IndexConfig;
use crate::models::{FileMatch, LineMatch, PatternInfo, Repo, RepositoryRevisions, SymbolMatch};
use crate::partition::IndexedRepoRevs;
use crate::search::metrics::SEARCH_METRICS;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// One index search
#[derive(Debug, Clone, Copy)]
pub struct IndexSearchRequest<'a> {
    pub pattern: &'a PatternInfo,
    pub query: &'a IndexQuery,
    pub mode: CompileMode,

    /// Indexed side of the partition
    pub indexed: &'a IndexedRepoRevs,

    /// Set for repo-unscoped searches: search the default branch of the
    /// whole index and resolve hits against this list by name.
    pub global_repos: Option<&'a [RepositoryRevisions]>,

    /// Number of repositories in the whole request
    pub num_repos: usize,

    pub deadline: Option<Instant>,
}

/// Matches and statistics from one index search
#[derive(Debug, Clone, Default)]
pub struct IndexSearchOutcome {
    pub matches: Vec<FileMatch>,
    pub common: SearchResultsCommon,
}

/// Runs queries against the index service
pub struct IndexSearcher {
    service: Arc<dyn IndexService>,
    config: IndexConfig,
}

impl IndexSearcher {
    pub fn new(service: Arc<dyn IndexService>, config: IndexConfig) -> Self {
        Self { service, config }
    }

    pub fn service(&self) -> &Arc<dyn IndexService> {
        &self.service
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Issue exactly one query to the index service and convert its hits.
    ///
    /// The call runs under its own deadline (wall time plus slack) rather
    /// than the request's cancellation, so results computed just before the
    /// request deadline are still returned.
    pub async fn search(
        &self,
        request: &IndexSearchRequest<'_>,
    ) -> Result<IndexSearchOutcome, IndexError> {
        let global = request.global_repos.is_some();
        if request.indexed.is_empty() && !global {
            return Ok(IndexSearchOutcome::default());
        }

        let remaining = request
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));
        if remaining.is_some_and(|r| r.is_zero()) {
            return Err(IndexError::NoResultsInTimeout);
        }

        let file_match_limit = request.pattern.file_match_limit;
        let k = result_count_factor(
            request.num_repos,
            file_match_limit,
            global,
            self.config.default_max_results,
        );
        let options = search_options(k, file_match_limit, remaining, &self.config);

        let restriction = if global {
            IndexQuery::Branch("HEAD".to_string())
        } else {
            IndexQuery::RepoBranches(request.indexed.repo_branches())
        };
        let query = IndexQuery::And(vec![request.query.clone(), restriction]).simplify();

        debug!(query = %query, k = k, wall_time_ms = options.max_wall_time.as_millis() as u64, "Searching index");

        let start = Instant::now();
        let result = match tokio::time::timeout(
            options.max_wall_time.saturating_add(self.config.deadline_slack()),
            self.service.search(&query, &options),
        )
        .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                observe(start, "error");
                return Err(e);
            }
            Err(_) => {
                observe(start, "timeout");
                return Err(IndexError::Timeout);
            }
        };

        if result.files.is_empty() && start.elapsed() >= options.max_wall_time {
            observe(start, "timeout");
            return Err(IndexError::NoResultsInTimeout);
        }
        observe(start, "success");

        let skipped = result.stats.files_skipped + result.stats.shards_skipped > 0;
        Ok(self.convert(request, &options, k, result.files, skipped))
    }

    fn convert(
        &self,
        request: &IndexSearchRequest<'_>,
        options: &IndexSearchOptions,
        k: usize,
        mut files: Vec<IndexFileMatch>,
        skipped: bool,
    ) -> IndexSearchOutcome {
        let mut common = SearchResultsCommon::new();
        for repo in request.indexed.iter() {
            common.searched.insert(repo.repo.clone());
            common.indexed.insert(repo.repo.clone());
        }

        let global_repos: Option<HashMap<&str, &Repo>> = request.global_repos.map(|repos| {
            repos
                .iter()
                .map(|reporev| (reporev.repo.name.as_str(), &reporev.repo))
                .collect()
        });

        // Hits on repositories outside the request never reach the limit
        files.retain(|file| match &global_repos {
            Some(by_name) => by_name.contains_key(file.repository.as_str()),
            None => request.indexed.get(&file.repository).is_some(),
        });

        let mut limit_hit = skipped;
        if skipped {
            for file in &files {
                common.partial.insert(file.repository.clone());
            }
        }

        let limit = request.pattern.file_match_limit;
        if files.len() > limit {
            for file in &files[limit..] {
                common.partial.insert(file.repository.clone());
            }
            files.truncate(limit);
            limit_hit = true;
        }
        common.limit_hit = limit_hit;

        let mut matches = Vec::with_capacity(files.len());
        for file in &files {
            let (repo, input_revs) = match &global_repos {
                Some(by_name) => match by_name.get(file.repository.as_str()) {
                    Some(repo) => ((*repo).clone(), vec![String::new()]),
                    None => continue,
                },
                None => match request.indexed.get(&file.repository) {
                    Some(indexed) => {
                        let mut revs = request.indexed.input_revs(&file.repository, &file.branches);
                        if revs.is_empty() {
                            warn!(repo = %file.repository, "Index hit on an unexpected branch, assuming default branch");
                            revs.push(String::new());
                        }
                        (indexed.repo.clone(), revs)
                    }
                    None => continue,
                },
            };
            if global_repos.is_some() {
                common.searched.insert(repo.clone());
                common.indexed.insert(repo.clone());
            }

            let (line_matches, symbols, file_limit_hit) = convert_lines(file, request.mode, k);
            for rev in input_revs {
                matches.push(FileMatch {
                    repo: repo.clone(),
                    commit: file.version.clone(),
                    input_rev: if rev.is_empty() { None } else { Some(rev) },
                    path: file.file_name.clone(),
                    line_matches: line_matches.clone(),
                    symbols: symbols.clone(),
                    limit_hit: file_limit_hit,
                });
            }
        }

        debug!(
            files = matches.len(),
            limit_hit = common.limit_hit,
            partial = common.partial.len(),
            max_doc_display_count = options.max_doc_display_count,
            "Index search completed"
        );

        common.result_count = matches.iter().map(FileMatch::result_count).sum();
        IndexSearchOutcome { matches, common }
    }
}

fn observe(start: Instant, outcome: &str) {
    SEARCH_METRICS
        .index_request_duration
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());
}

/// Convert index line matches into line or symbol records, applying the
/// per-file line cap and the per-line fragment cap.
fn convert_lines(
    file: &IndexFileMatch,
    mode: CompileMode,
    k: usize,
) -> (Vec<LineMatch>, Vec<SymbolMatch>, bool) {
    let max_lines = max_line_matches(k);
    let max_fragments = max_line_fragment_matches(k);

    let mut lines = Vec::new();
    let mut symbols = Vec::new();
    let mut limit_hit = false;

    for line in file.line_matches.iter().filter(|l| !l.file_name) {
        let line_number = line.line_number.saturating_sub(1);

        if mode == CompileMode::Symbol {
            for fragment in &line.fragments {
                if let Some(symbol) = &fragment.symbol {
                    symbols.push(SymbolMatch {
                        name: symbol.sym.clone(),
                        kind: symbol.kind.clone(),
                        parent: symbol.parent.clone(),
                        line: line_number,
                    });
                }
            }
            continue;
        }

        if lines.len() >= max_lines {
            limit_hit = true;
            break;
        }

        let mut fragments = line.fragments.as_slice();
        if fragments.len() > max_fragments {
            fragments = &fragments[..max_fragments];
            limit_hit = true;
        }
        let offset_and_lengths = fragments
            .iter()
            .map(|fragment| code_point_range(&line.line, fragment.line_offset, fragment.match_length))
            .collect();

        lines.push(LineMatch {
            preview: line.line.clone(),
            line_number,
            offset_and_lengths,
            limit_hit: false,
        });
    }

    (lines, symbols, limit_hit)
}

/// Byte offset and length to code point offset and length
fn code_point_range(line: &str, byte_offset: usize, byte_length: usize) -> (u32, u32) {
    let offset = line
        .get(..byte_offset)
        .map(|prefix| prefix.chars().count())
        .unwrap_or(byte_offset);
    let length = line
        .get(byte_offset..byte_offset + byte_length)
        .map(|matched| matched.chars().count())
        .unwrap_or(byte_length);
    (offset as u32, length as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile, CompileMode};
    use crate::index::client::{
        IndexBranch, IndexFragment, IndexLineMatch, IndexSearchResult, IndexSearchStats,
        IndexSymbol, IndexedRepository,
    };
    use crate::models::{PatternType, RevisionSpecifier};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Returns a canned response and records the query it was given
    struct CannedIndex {
        result: IndexSearchResult,
        latency: Duration,
        queries: Mutex<Vec<IndexQuery>>,
    }

    #[async_trait]
    impl IndexService for CannedIndex {
        fn enabled(&self) -> bool {
            true
        }

        async fn list(&self) -> Result<Vec<IndexedRepository>, IndexError> {
            Ok(Vec::new())
        }

        async fn search(
            &self,
            query: &IndexQuery,
            _options: &IndexSearchOptions,
        ) -> Result<IndexSearchResult, IndexError> {
            self.queries.lock().push(query.clone());
            tokio::time::sleep(self.latency).await;
            Ok(self.result.clone())
        }
    }

    fn canned(files: Vec<IndexFileMatch>, files_skipped: usize) -> Arc<CannedIndex> {
        Arc::new(CannedIndex {
            result: IndexSearchResult {
                files,
                stats: IndexSearchStats {
                    files_skipped,
                    ..Default::default()
                },
            },
            latency: Duration::ZERO,
            queries: Mutex::new(Vec::new()),
        })
    }

    fn hit(repo: &str, path: &str, branches: &[&str]) -> IndexFileMatch {
        IndexFileMatch {
            repository: repo.to_string(),
            file_name: path.to_string(),
            branches: branches.iter().map(|b| b.to_string()).collect(),
            version: "c0ffee".to_string(),
            line_matches: vec![IndexLineMatch {
                line: "héllo foo".to_string(),
                line_number: 3,
                file_name: false,
                fragments: vec![IndexFragment {
                    line_offset: 7,
                    match_length: 3,
                    symbol: None,
                }],
            }],
        }
    }

    fn indexed_revs(names: &[&str]) -> (IndexedRepoRevs, Vec<RepositoryRevisions>) {
        let mut revs = IndexedRepoRevs::new();
        let mut all = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let reporev = RepositoryRevisions::new(
                Repo::new(i as i32 + 1, *name),
                vec![RevisionSpecifier::head(), RevisionSpecifier::explicit("dev")],
            );
            revs.add(
                &reporev,
                &IndexedRepository {
                    name: name.to_string(),
                    branches: vec![
                        IndexBranch {
                            name: "HEAD".to_string(),
                            version: "c0ffee".to_string(),
                        },
                        IndexBranch {
                            name: "dev".to_string(),
                            version: "beef".to_string(),
                        },
                    ],
                    has_symbols: true,
                },
            );
            all.push(reporev);
        }
        (revs, all)
    }

    fn pattern(limit: usize) -> (PatternInfo, IndexQuery) {
        let info = PatternInfo::new("foo", PatternType::Literal, limit);
        let query = compile(&info, CompileMode::Text).unwrap().index_query;
        (info, query)
    }

    #[tokio::test]
    async fn test_files_skipped_marks_partial_and_limit_hit() {
        let service = canned(vec![hit("a", "x.go", &["HEAD"]), hit("b", "y.go", &["HEAD"])], 5);
        let searcher = IndexSearcher::new(service, IndexConfig::default());
        let (indexed, _) = indexed_revs(&["a", "b", "c"]);
        let (info, query) = pattern(30);

        let outcome = searcher
            .search(&IndexSearchRequest {
                pattern: &info,
                query: &query,
                mode: CompileMode::Text,
                indexed: &indexed,
                global_repos: None,
                num_repos: 3,
                deadline: None,
            })
            .await
            .unwrap();

        assert!(outcome.common.limit_hit);
        assert_eq!(
            outcome.common.partial.iter().cloned().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(outcome.common.indexed.len(), 3);
        assert_eq!(outcome.matches.len(), 2);
    }

    #[tokio::test]
    async fn test_file_limit_truncates_and_maps_revisions() {
        let service = canned(
            vec![
                hit("a", "1.go", &["HEAD", "dev"]),
                hit("a", "2.go", &["HEAD"]),
                hit("b", "3.go", &["dev"]),
            ],
            0,
        );
        let searcher = IndexSearcher::new(service.clone(), IndexConfig::default());
        let (indexed, _) = indexed_revs(&["a", "b"]);
        let (info, query) = pattern(2);

        let outcome = searcher
            .search(&IndexSearchRequest {
                pattern: &info,
                query: &query,
                mode: CompileMode::Text,
                indexed: &indexed,
                global_repos: None,
                num_repos: 2,
                deadline: None,
            })
            .await
            .unwrap();

        assert!(outcome.common.limit_hit);
        assert!(outcome.common.partial.contains("b"));
        // 1.go is on both requested revisions, 2.go on HEAD only
        let uris: Vec<String> = outcome.matches.iter().map(FileMatch::uri).collect();
        assert_eq!(uris, vec!["a#1.go", "a?dev#1.go", "a#2.go"]);

        let first = &outcome.matches[0];
        assert_eq!(first.line_matches[0].line_number, 2);
        assert_eq!(first.line_matches[0].offset_and_lengths, vec![(6, 3)]);

        let queries = service.queries.lock();
        assert!(matches!(&queries[0], IndexQuery::And(terms) if matches!(terms[1], IndexQuery::RepoBranches(_))));
    }

    #[tokio::test]
    async fn test_global_search_drops_unknown_repositories() {
        let service = canned(vec![hit("a", "1.go", &["HEAD"]), hit("gone", "2.go", &["HEAD"])], 0);
        let searcher = IndexSearcher::new(service.clone(), IndexConfig::default());
        let (indexed, all) = indexed_revs(&["a"]);
        let (info, query) = pattern(30);

        let outcome = searcher
            .search(&IndexSearchRequest {
                pattern: &info,
                query: &query,
                mode: CompileMode::Text,
                indexed: &indexed,
                global_repos: Some(&all),
                num_repos: 1,
                deadline: None,
            })
            .await
            .unwrap();

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].repo.name, "a");
        let queries = service.queries.lock();
        assert!(matches!(&queries[0], IndexQuery::And(terms) if terms[1] == IndexQuery::Branch("HEAD".to_string())));
    }

    #[tokio::test]
    async fn test_unknown_repositories_do_not_use_up_the_limit() {
        let service = canned(
            vec![
                hit("gone", "1.go", &["HEAD"]),
                hit("gone", "2.go", &["HEAD"]),
                hit("a", "3.go", &["HEAD"]),
            ],
            0,
        );
        let searcher = IndexSearcher::new(service, IndexConfig::default());
        let (indexed, all) = indexed_revs(&["a"]);
        let (info, query) = pattern(1);

        let outcome = searcher
            .search(&IndexSearchRequest {
                pattern: &info,
                query: &query,
                mode: CompileMode::Text,
                indexed: &indexed,
                global_repos: Some(&all),
                num_repos: 1,
                deadline: None,
            })
            .await
            .unwrap();

        let uris: Vec<String> = outcome.matches.iter().map(FileMatch::uri).collect();
        assert_eq!(uris, vec!["a#3.go"]);
        assert!(!outcome.common.limit_hit);
        assert!(outcome.common.partial.is_empty());
    }

    #[tokio::test]
    async fn test_symbol_mode_converts_annotations() {
        let mut file = hit("a", "x.go", &["HEAD"]);
        file.line_matches[0].fragments[0].symbol = Some(IndexSymbol {
            sym: "foo".to_string(),
            kind: "function".to_string(),
            parent: None,
        });
        let service = canned(vec![file], 0);
        let searcher = IndexSearcher::new(service, IndexConfig::default());
        let (indexed, _) = indexed_revs(&["a"]);
        let (info, query) = pattern(30);

        let outcome = searcher
            .search(&IndexSearchRequest {
                pattern: &info,
                query: &query,
                mode: CompileMode::Symbol,
                indexed: &indexed,
                global_repos: None,
                num_repos: 1,
                deadline: None,
            })
            .await
            .unwrap();

        let fm = &outcome.matches[0];
        assert!(fm.line_matches.is_empty());
        assert_eq!(fm.symbols.len(), 1);
        assert_eq!(fm.symbols[0].line, 2);
    }

    #[test]
    fn test_line_and_fragment_caps() {
        let mut file = hit("a", "x.go", &["HEAD"]);
        file.line_matches[0].fragments = (0..10)
            .map(|i| IndexFragment {
                line_offset: i,
                match_length: 1,
                symbol: None,
            })
            .collect();
        let (lines, _, limit_hit) = convert_lines(&file, CompileMode::Text, 1);
        assert_eq!(lines[0].offset_and_lengths.len(), 4);
        assert!(limit_hit);

        file.line_matches = (1..=40)
            .map(|n| IndexLineMatch {
                line: "foo".to_string(),
                line_number: n,
                file_name: false,
                fragments: vec![],
            })
            .collect();
        let (lines, _, limit_hit) = convert_lines(&file, CompileMode::Text, 1);
        assert_eq!(lines.len(), 26);
        assert!(limit_hit);
    }

    #[tokio::test]
    async fn test_empty_result_after_wall_time_is_timeout() {
        let service = Arc::new(CannedIndex {
            result: IndexSearchResult::default(),
            latency: Duration::from_millis(60),
            queries: Mutex::new(Vec::new()),
        });
        let searcher = IndexSearcher::new(service, IndexConfig::default());
        let (indexed, _) = indexed_revs(&["a"]);
        let (info, query) = pattern(30);

        let err = searcher
            .search(&IndexSearchRequest {
                pattern: &info,
                query: &query,
                mode: CompileMode::Text,
                indexed: &indexed,
                global_repos: None,
                num_repos: 1,
                deadline: Some(Instant::now() + Duration::from_millis(50)),
            })
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
