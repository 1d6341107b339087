use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, trace, warn};

use super::matcher::CompiledMatcher;
use super::processor::ScanContext;
use crate::archive::Archive;
use crate::config::{Limits, SearchConfig};
use crate::errors::{SearchError, SearchResult};
use crate::metrics::ScanMetrics;
use crate::request::PatternRequest;
use crate::results::{FileMatch, SearchOutput};

/// Per-scan settings that come from the request rather than the config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Maximum number of files to report
    pub file_match_limit: usize,
    pub matches_content: bool,
    pub matches_path: bool,
    /// Report files whose content does not match
    pub is_negated: bool,
    /// Stop pulling new files after this instant
    pub deadline: Option<Instant>,
}

impl ScanOptions {
    /// Content search with the full file limit and no deadline
    pub fn new(limits: &Limits) -> Self {
        Self {
            file_match_limit: limits.max_file_matches,
            matches_content: true,
            matches_path: false,
            is_negated: false,
            deadline: None,
        }
    }

    /// Options for `request`, with its file limit resolved against `limits`
    pub fn for_request(
        request: &PatternRequest,
        file_match_limit: Option<usize>,
        limits: &Limits,
    ) -> Self {
        let (matches_content, matches_path) = request.dimensions();
        Self {
            file_match_limit: limits.file_match_limit(file_match_limit),
            matches_content,
            matches_path,
            is_negated: request.is_negated,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Runs compiled matchers over archives on a fixed pool of workers
pub struct Searcher {
    pool: ThreadPool,
    limits: Limits,
    metrics: ScanMetrics,
}

impl Searcher {
    /// Creates a searcher with `config.thread_count` workers
    pub fn new(config: &SearchConfig) -> SearchResult<Self> {
        Self::with_metrics(config, ScanMetrics::new())
    }

    pub fn with_metrics(config: &SearchConfig, metrics: ScanMetrics) -> SearchResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.thread_count.get())
            .thread_name(|i| format!("snapgrep-worker-{}", i))
            .build()
            .map_err(|e| SearchError::config_error(e.to_string()))?;
        Ok(Self {
            pool,
            limits: config.limits,
            metrics,
        })
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }

    /// Applies `matcher` to every eligible file in `archive`.
    ///
    /// Results come back in archive order. `limit_hit` is set when the file
    /// limit or the deadline cut the scan short; whatever was found before
    /// that is still returned. Files that cannot be read are logged and left
    /// out.
    pub fn concurrent_find<A: Archive + ?Sized>(
        &self,
        matcher: &CompiledMatcher,
        archive: &A,
        options: &ScanOptions,
    ) -> SearchOutput {
        if matcher.regex().is_none() || !options.matches_content {
            return self.find_paths(matcher, archive, options);
        }

        let entries = archive.entries();
        let cursor = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let limit_hit = AtomicBool::new(false);
        let found: Mutex<Vec<(usize, FileMatch)>> = Mutex::new(Vec::new());
        let workers = self.pool.current_num_threads().min(entries.len()).max(1);

        debug!(
            "Scanning {} files on {} workers (file limit {})",
            entries.len(),
            workers,
            options.file_match_limit
        );

        self.pool.scope(|s| {
            for _ in 0..workers {
                s.spawn(|_| {
                    let mut ctx = matcher.scan_context(self.limits, self.metrics.clone());
                    while !stop.load(Ordering::Relaxed) {
                        let index = cursor.fetch_add(1, Ordering::Relaxed);
                        let Some(entry) = entries.get(index) else {
                            break;
                        };
                        // Only an entry left unscanned makes the result partial
                        if options.expired() {
                            debug!("Deadline passed, stopping scan");
                            limit_hit.store(true, Ordering::Relaxed);
                            stop.store(true, Ordering::Relaxed);
                            break;
                        }
                        if !matcher.is_path_eligible(&entry.name) {
                            self.metrics.record_file_skipped();
                            continue;
                        }

                        let Some(file_match) =
                            self.scan_file(&mut ctx, matcher, archive, index, options)
                        else {
                            continue;
                        };

                        let mut results = found.lock();
                        if results.len() < options.file_match_limit {
                            results.push((index, file_match));
                        } else {
                            limit_hit.store(true, Ordering::Relaxed);
                            stop.store(true, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        let mut found = found.into_inner();
        found.sort_unstable_by_key(|(index, _)| *index);
        SearchOutput {
            file_matches: found.into_iter().map(|(_, fm)| fm).collect(),
            limit_hit: limit_hit.into_inner(),
        }
    }

    /// Matches one file, returning what to report for it, if anything
    fn scan_file<A: Archive + ?Sized>(
        &self,
        ctx: &mut ScanContext<'_>,
        matcher: &CompiledMatcher,
        archive: &A,
        index: usize,
        options: &ScanOptions,
    ) -> Option<FileMatch> {
        let name = &archive.entries()[index].name;
        let found = match ctx.find(archive, index) {
            Ok(found) => found,
            Err(e) => {
                warn!("Skipping {}: {}", name, e);
                self.metrics.record_read_failure();
                return None;
            }
        };

        if options.is_negated {
            return found.is_empty().then(|| FileMatch::path_only(name.as_str()));
        }
        if !found.is_empty() {
            trace!("{}: {} line matches", name, found.line_matches.len());
            return Some(FileMatch {
                path: name.clone(),
                line_matches: found.line_matches,
                limit_hit: found.limit_hit,
            });
        }
        (options.matches_path && matcher.pattern_matches_path(name))
            .then(|| FileMatch::path_only(name.as_str()))
    }

    /// Matches on paths alone, without reading any content
    fn find_paths<A: Archive + ?Sized>(
        &self,
        matcher: &CompiledMatcher,
        archive: &A,
        options: &ScanOptions,
    ) -> SearchOutput {
        let mut output = SearchOutput::new();
        for entry in archive.entries() {
            if options.expired() {
                output.limit_hit = true;
                break;
            }
            if !matcher.is_path_eligible(&entry.name) {
                self.metrics.record_file_skipped();
                continue;
            }
            if !matcher.pattern_matches_path(&entry.name) {
                continue;
            }
            if output.file_matches.len() == options.file_match_limit {
                output.limit_hit = true;
                break;
            }
            output.file_matches.push(FileMatch::path_only(entry.name.as_str()));
        }
        output
    }
}
