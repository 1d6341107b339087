//! Search request types as they arrive from the RPC layer.

use serde::{Deserialize, Serialize};

use crate::errors::{SearchError, SearchResult};

/// Describes what to search for and which files are eligible.
///
/// Field names follow the wire protocol (`isRegExp`, `includePatterns`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatternRequest {
    /// Literal text or regular expression, depending on `is_regexp`
    pub pattern: String,

    #[serde(rename = "isRegExp")]
    pub is_regexp: bool,

    pub is_case_sensitive: bool,

    /// Require word boundaries on both sides of each match
    pub is_word_match: bool,

    /// Report files whose content does *not* match
    pub is_negated: bool,

    #[serde(rename = "patternMatchesContent")]
    pub matches_content: bool,

    #[serde(rename = "patternMatchesPath")]
    pub matches_path: bool,

    /// A path must match every one of these
    pub include_patterns: Vec<String>,

    /// A path matching this is skipped
    pub exclude_pattern: String,

    #[serde(rename = "pathPatternsAreRegExps")]
    pub path_patterns_are_regexps: bool,

    pub path_patterns_are_case_sensitive: bool,
}

impl PatternRequest {
    /// Creates a content search for a literal pattern
    pub fn literal(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            matches_content: true,
            ..Default::default()
        }
    }

    /// Creates a content search for a regular expression
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            is_regexp: true,
            matches_content: true,
            ..Default::default()
        }
    }

    /// Returns the (content, path) dimensions to search. Content is searched
    /// when the request names neither.
    pub fn dimensions(&self) -> (bool, bool) {
        if !self.matches_content && !self.matches_path {
            (true, false)
        } else {
            (self.matches_content, self.matches_path)
        }
    }

    /// Whether the pattern text can match across a line break
    pub fn is_multi_line(&self) -> bool {
        self.pattern.contains('\n') || (self.is_regexp && self.pattern.contains("\\n"))
    }
}

/// A full search request: which snapshot to open and what to look for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchRequest {
    /// Repository name, e.g. `github.com/golang/go`
    pub repo: String,

    /// Fully resolved commit id
    pub commit: String,

    #[serde(flatten)]
    pub pattern_info: PatternRequest,

    /// Optional cap on reported files, bounded by the configured maximum
    pub file_match_limit: Option<usize>,
}

impl SearchRequest {
    pub fn new(
        repo: impl Into<String>,
        commit: impl Into<String>,
        pattern_info: PatternRequest,
    ) -> Self {
        Self {
            repo: repo.into(),
            commit: commit.into(),
            pattern_info,
            file_match_limit: None,
        }
    }

    /// Rejects requests that could never produce a meaningful search.
    pub fn validate(&self) -> SearchResult<()> {
        if self.repo.is_empty() {
            return Err(SearchError::invalid_request("repo must be non-empty"));
        }
        // Same sanity check git uses for a resolved object id
        if self.commit.len() != 40 || !self.commit.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(SearchError::invalid_request(format!(
                "commit must be resolved (commit={:?})",
                self.commit
            )));
        }
        let p = &self.pattern_info;
        if p.pattern.is_empty() && p.exclude_pattern.is_empty() && p.include_patterns.is_empty()
        {
            return Err(SearchError::invalid_request(
                "at least one of pattern and include/exclude patterns must be non-empty",
            ));
        }
        Ok(())
    }
}
