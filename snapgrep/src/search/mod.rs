//! Searching repository snapshots.
//!
//! A search runs in three steps:
//!
//! 1. **Compile.** [`CompiledMatcher::compile`] turns a [`PatternRequest`]
//!    into a regex, lowered to ASCII lowercase when the search ignores case,
//!    plus the literal every match must contain and the path filters.
//!
//! 2. **Scan.** [`Searcher::concurrent_find`] hands archive entries to a fixed
//!    pool of workers through a shared cursor. Each worker owns a
//!    [`ScanContext`] with its own read and lowercase buffers:
//!    ```rust,ignore
//!    let mut ctx = matcher.scan_context(limits, metrics);
//!    while let Some(index) = next_entry() {
//!        let found = ctx.find(archive, index)?;
//!    }
//!    ```
//!
//! 3. **Map.** Each regex match becomes one [`LineMatch`] per line it touches,
//!    with offsets measured in the original bytes. Matches that cross lines
//!    go through the [`multiline`] mapper.
//!
//! Every step is bounded by [`Limits`]. Running into a limit truncates the
//! output and sets `limit_hit`; it never fails the search.
//!
//! [`PatternRequest`]: crate::request::PatternRequest
//! [`LineMatch`]: crate::results::LineMatch
//! [`Limits`]: crate::config::Limits

pub mod ascii;
pub mod engine;
pub mod lowering;
pub mod matcher;
pub mod multiline;
pub mod processor;

pub use engine::{ScanOptions, Searcher};
pub use matcher::CompiledMatcher;
pub use processor::{ContentMatches, ScanContext};

use std::time::Instant;
use tracing::info;

use crate::archive::{Archive, ArchiveProvider};
use crate::config::SearchConfig;
use crate::errors::SearchResult;
use crate::request::SearchRequest;
use crate::results::SearchOutput;

impl Searcher {
    /// Validates and compiles `request`, then scans `archive` with it
    pub fn search<A: Archive + ?Sized>(
        &self,
        request: &SearchRequest,
        archive: &A,
        deadline: Option<Instant>,
    ) -> SearchResult<SearchOutput> {
        request.validate()?;
        let matcher = CompiledMatcher::compile_with_metrics(&request.pattern_info, self.metrics())?;
        Ok(self.run(&matcher, request, archive, deadline))
    }

    /// Like [`Searcher::search`], opening the archive through `provider`.
    ///
    /// The pattern is compiled before the archive is opened, so a bad pattern
    /// fails without touching storage.
    pub fn search_repo<P: ArchiveProvider>(
        &self,
        provider: &P,
        request: &SearchRequest,
        deadline: Option<Instant>,
    ) -> SearchResult<SearchOutput> {
        request.validate()?;
        let matcher = CompiledMatcher::compile_with_metrics(&request.pattern_info, self.metrics())?;
        let archive = provider.open(&request.repo, &request.commit)?;
        Ok(self.run(&matcher, request, &archive, deadline))
    }

    fn run<A: Archive + ?Sized>(
        &self,
        matcher: &CompiledMatcher,
        request: &SearchRequest,
        archive: &A,
        deadline: Option<Instant>,
    ) -> SearchOutput {
        info!(
            "Searching {}@{} for {:?} across {} files",
            request.repo,
            request.commit,
            request.pattern_info.pattern,
            archive.entries().len()
        );

        let options =
            ScanOptions::for_request(&request.pattern_info, request.file_match_limit, self.limits())
                .with_deadline(deadline);
        let output = self.concurrent_find(matcher, archive, &options);

        self.metrics().log_stats();
        info!(
            "Search complete. Found {} line matches in {} files (limit hit: {})",
            output.total_line_matches(),
            output.files_with_matches(),
            output.limit_hit
        );
        output
    }
}

/// Searches `archive` using a searcher built from `config`
pub fn search<A: Archive + ?Sized>(
    config: &SearchConfig,
    request: &SearchRequest,
    archive: &A,
) -> SearchResult<SearchOutput> {
    let deadline = config.deadline.map(|d| Instant::now() + d);
    Searcher::new(config)?.search(request, archive, deadline)
}

/// Searches the snapshot `provider` holds for the request's repo and commit
pub fn search_repo<P: ArchiveProvider>(
    provider: &P,
    config: &SearchConfig,
    request: &SearchRequest,
) -> SearchResult<SearchOutput> {
    let deadline = config.deadline.map(|d| Instant::now() + d);
    Searcher::new(config)?.search_repo(provider, request, deadline)
}
