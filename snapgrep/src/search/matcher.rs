use dashmap::DashMap;
use memchr::memmem::Finder;
use once_cell::sync::Lazy;
use regex::bytes::{Regex, RegexBuilder};
use regex_syntax::hir::Look;
use regex_syntax::ParserBuilder;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

use super::lowering::{longest_literal, lower_regex_ascii};
use super::processor::ScanContext;
use crate::config::Limits;
use crate::errors::{SearchError, SearchResult};
use crate::filters::{PathMatcher, PathOptions};
use crate::metrics::ScanMetrics;
use crate::request::PatternRequest;

/// Compiled regexes are keyed by the expression after lowering, so
/// `Foo` and `FOO` searched case-insensitively share one entry.
const REGEX_CACHE_CAPACITY: usize = 256;
const REGEX_SIZE_LIMIT: usize = 64 * 1024 * 1024;

static REGEX_CACHE: Lazy<DashMap<String, Arc<Regex>>> = Lazy::new(DashMap::new);

/// A search pattern ready to run against file contents and paths.
///
/// Immutable once built and shared by reference across all scanning workers.
/// Each worker gets its own scratch buffers through [`CompiledMatcher::scan_context`].
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    re: Option<Arc<Regex>>,
    ignore_case: bool,
    multi_line: bool,
    literal: Vec<u8>,
    finder: Option<Finder<'static>>,
    // False when text anchors make a whole-file pass disagree with per-line matching
    whole_file_reject: bool,
    path: PathMatcher,
}

impl CompiledMatcher {
    /// Compiles `request` into a matcher
    pub fn compile(request: &PatternRequest) -> SearchResult<Self> {
        Self::compile_with_metrics(request, &ScanMetrics::new())
    }

    /// Compiles `request`, recording regex cache lookups in `metrics`
    pub fn compile_with_metrics(
        request: &PatternRequest,
        metrics: &ScanMetrics,
    ) -> SearchResult<Self> {
        let path = PathMatcher::compile(
            &request.include_patterns,
            &request.exclude_pattern,
            PathOptions::from(request),
        )?;
        let ignore_case = !request.is_case_sensitive;

        if request.pattern.is_empty() {
            debug!("Empty pattern, matching on paths only");
            return Ok(Self {
                re: None,
                ignore_case,
                multi_line: false,
                literal: Vec::new(),
                finder: None,
                whole_file_reject: false,
                path,
            });
        }

        let expr = build_expression(request);
        let hir = ParserBuilder::new()
            .utf8(false)
            .crlf(true)
            .build()
            .parse(&expr)
            .map_err(|e| SearchError::invalid_pattern(e.to_string()))?;
        let hir = if ignore_case {
            lower_regex_ascii(&hir)
        } else {
            hir
        };

        let literal = longest_literal(&hir);
        let finder = (!literal.is_empty()).then(|| Finder::new(&literal).into_owned());
        let re = cached_regex(&hir.to_string(), metrics)?;
        let multi_line = request.is_multi_line();
        let looks = hir.properties().look_set();
        let whole_file_reject = !looks.contains(Look::Start) && !looks.contains(Look::End);

        debug!(
            "Compiled {:?} (ignore_case={}, multi_line={}, literal={:?})",
            re.as_str(),
            ignore_case,
            multi_line,
            String::from_utf8_lossy(&literal)
        );

        Ok(Self {
            re: Some(re),
            ignore_case,
            multi_line,
            literal,
            finder,
            whole_file_reject,
            path,
        })
    }

    /// The content regex, absent when the pattern is empty
    pub fn regex(&self) -> Option<&Regex> {
        self.re.as_deref()
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    pub fn is_multi_line(&self) -> bool {
        self.multi_line
    }

    /// Substring every content match contains, possibly empty
    pub fn literal(&self) -> &[u8] {
        &self.literal
    }

    pub(crate) fn finder(&self) -> Option<&Finder<'static>> {
        self.finder.as_ref()
    }

    /// Whether a file with no match over its whole content can be skipped
    /// before matching line by line
    pub(crate) fn can_reject_whole_file(&self) -> bool {
        self.whole_file_reject
    }

    pub fn path_matcher(&self) -> &PathMatcher {
        &self.path
    }

    /// Whether `path` passes the include and exclude patterns
    pub fn is_path_eligible(&self, path: &str) -> bool {
        self.path.matches(path)
    }

    /// Whether the search pattern itself matches `path`. An empty pattern
    /// matches every path.
    pub fn pattern_matches_path(&self, path: &str) -> bool {
        let Some(re) = self.re.as_deref() else {
            return true;
        };
        let haystack = if self.ignore_case {
            Cow::Owned(path.to_ascii_lowercase())
        } else {
            Cow::Borrowed(path)
        };
        re.is_match(haystack.as_bytes())
    }

    /// Creates per-worker scratch state for scanning files
    pub fn scan_context(&self, limits: Limits, metrics: ScanMetrics) -> ScanContext<'_> {
        ScanContext::new(self, limits, metrics)
    }
}

/// Turns the request's pattern into regex syntax
fn build_expression(request: &PatternRequest) -> String {
    let mut expr = if request.is_regexp {
        request.pattern.clone()
    } else {
        regex::escape(&request.pattern)
    };
    if request.is_word_match {
        expr = format!("\\b(?:{})\\b", expr);
    }
    if request.is_regexp {
        expr = format!("(?m:{})", expr);
    }
    expr
}

fn cached_regex(expr: &str, metrics: &ScanMetrics) -> SearchResult<Arc<Regex>> {
    if let Some(entry) = REGEX_CACHE.get(expr) {
        metrics.record_cache_lookup(true);
        return Ok(Arc::clone(entry.value()));
    }
    metrics.record_cache_lookup(false);

    let re = RegexBuilder::new(expr)
        .crlf(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| SearchError::invalid_pattern(e.to_string()))?;
    let re = Arc::new(re);

    if REGEX_CACHE.len() >= REGEX_CACHE_CAPACITY {
        debug!("Regex cache full, clearing {} entries", REGEX_CACHE.len());
        REGEX_CACHE.clear();
    }
    REGEX_CACHE.insert(expr.to_string(), Arc::clone(&re));
    Ok(re)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(m: &CompiledMatcher, text: &str) -> Vec<(usize, usize)> {
        let lowered;
        let haystack = if m.ignore_case() {
            lowered = text.to_ascii_lowercase();
            lowered.as_bytes()
        } else {
            text.as_bytes()
        };
        m.regex()
            .unwrap()
            .find_iter(haystack)
            .map(|x| (x.start(), x.end()))
            .collect()
    }

    #[test]
    fn test_literal_pattern_is_escaped() {
        let m = CompiledMatcher::compile(&PatternRequest::literal("a.b(")).unwrap();
        assert_eq!(spans(&m, "axb( a.b("), vec![(5, 9)]);
        assert_eq!(m.literal(), b"a.b(");
    }

    #[test]
    fn test_case_insensitive_by_default() {
        let m = CompiledMatcher::compile(&PatternRequest::literal("Error Handler")).unwrap();
        assert!(m.ignore_case());
        assert_eq!(m.literal(), b"error handler");
        assert_eq!(spans(&m, "ERROR HANDLER"), vec![(0, 13)]);

        let mut request = PatternRequest::literal("Error");
        request.is_case_sensitive = true;
        let m = CompiledMatcher::compile(&request).unwrap();
        assert_eq!(m.literal(), b"Error");
        assert!(spans(&m, "ERROR error").is_empty());
    }

    #[test]
    fn test_word_match() {
        let mut request = PatternRequest::literal("foo");
        request.is_word_match = true;
        let m = CompiledMatcher::compile(&request).unwrap();
        assert_eq!(spans(&m, "foo food foo_ (foo)"), vec![(0, 3), (15, 18)]);
    }

    #[test]
    fn test_regex_is_multi_line_anchored() {
        let mut request = PatternRequest::regex("^func +[A-Z]");
        request.is_case_sensitive = true;
        let m = CompiledMatcher::compile(&request).unwrap();
        assert_eq!(spans(&m, "func Main\r\nfunc x\nfunc Zed\n"), vec![(0, 6), (18, 24)]);
    }

    #[test]
    fn test_dot_excludes_carriage_return() {
        let m = CompiledMatcher::compile(&PatternRequest::regex("a.b")).unwrap();
        assert!(spans(&m, "a\rb").is_empty());
        assert_eq!(spans(&m, "a\tb axb"), vec![(0, 3), (4, 7)]);
    }

    #[test]
    fn test_text_anchors_disable_whole_file_reject() {
        let m = CompiledMatcher::compile(&PatternRequest::regex("\\Afoo")).unwrap();
        assert!(!m.can_reject_whole_file());
        let m = CompiledMatcher::compile(&PatternRequest::regex("foo\\z")).unwrap();
        assert!(!m.can_reject_whole_file());
        let m = CompiledMatcher::compile(&PatternRequest::regex("^foo$")).unwrap();
        assert!(m.can_reject_whole_file());
    }

    #[test]
    fn test_invalid_pattern() {
        let err = CompiledMatcher::compile(&PatternRequest::regex("(unclosed")).unwrap_err();
        assert!(matches!(err, SearchError::InvalidPattern(_)));

        let request = PatternRequest {
            include_patterns: vec!["[".to_string()],
            path_patterns_are_regexps: true,
            ..PatternRequest::literal("x")
        };
        let err = CompiledMatcher::compile(&request).unwrap_err();
        assert!(matches!(err, SearchError::InvalidPathPattern { .. }));
    }

    #[test]
    fn test_multi_line_literal_compiles() {
        let m = CompiledMatcher::compile(&PatternRequest::literal("a\nb")).unwrap();
        assert!(m.is_multi_line());
        assert_eq!(spans(&m, "xa\nb"), vec![(1, 4)]);
    }

    #[test]
    fn test_empty_pattern_has_no_regex() {
        let m = CompiledMatcher::compile(&PatternRequest::default()).unwrap();
        assert!(m.regex().is_none());
        assert!(m.pattern_matches_path("anything"));
    }

    #[test]
    fn test_pattern_matches_path() {
        let m = CompiledMatcher::compile(&PatternRequest::regex("http.*client")).unwrap();
        assert!(m.pattern_matches_path("net/HTTP/Client.go"));
        assert!(!m.pattern_matches_path("net/rpc/client.go"));
    }

    #[test]
    fn test_path_eligibility() {
        let request = PatternRequest {
            include_patterns: vec!["\\.go$".to_string()],
            exclude_pattern: "vendor/".to_string(),
            path_patterns_are_regexps: true,
            ..PatternRequest::literal("x")
        };
        let m = CompiledMatcher::compile(&request).unwrap();
        assert!(m.is_path_eligible("cmd/main.go"));
        assert!(!m.is_path_eligible("vendor/x/y.go"));
        assert!(!m.is_path_eligible("README.md"));
    }

    #[test]
    fn test_regex_cache() {
        let metrics = ScanMetrics::new();
        // Unique to this test so other tests cannot warm the cache
        let pattern = "cache_probe_Q7hZ[0-9]+";
        CompiledMatcher::compile_with_metrics(&PatternRequest::regex(pattern), &metrics).unwrap();
        CompiledMatcher::compile_with_metrics(
            &PatternRequest::regex(pattern.to_uppercase()),
            &metrics,
        )
        .unwrap();

        let stats = metrics.get_stats();
        assert_eq!(stats.cache_hits + stats.cache_misses, 2);
        assert!(stats.cache_hits >= 1);
    }
}
