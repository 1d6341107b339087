/// Path filtering for archive entries.
///
/// A request may carry any number of include patterns and one exclude
/// pattern. A path is eligible when it matches **every** include pattern
/// (in any order, anywhere in the path) and does not match the exclude
/// pattern:
///
/// ```rust,ignore
/// let m = PathMatcher::compile(&["a".into(), "b".into()], "", opts)?;
/// assert!(m.matches("ab"));
/// assert!(m.matches("b/a"));
/// assert!(!m.matches("a/c")); // no "b"
/// ```
///
/// Patterns are either regular expressions or fixed substrings, and are
/// case-insensitive unless the request says otherwise. An empty pattern is
/// valid and matches every path.
use regex::{Regex, RegexBuilder};

use crate::errors::{SearchError, SearchResult};
use crate::request::PatternRequest;

/// How path patterns are interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathOptions {
    pub regexp: bool,
    pub case_sensitive: bool,
}

impl From<&PatternRequest> for PathOptions {
    fn from(p: &PatternRequest) -> Self {
        Self {
            regexp: p.path_patterns_are_regexps,
            case_sensitive: p.path_patterns_are_case_sensitive,
        }
    }
}

#[derive(Debug, Clone)]
enum PathPattern {
    Regex(Regex),
    Substring { needle: String, case_sensitive: bool },
}

impl PathPattern {
    fn compile(pattern: &str, options: PathOptions) -> SearchResult<Self> {
        if options.regexp {
            let re = RegexBuilder::new(pattern)
                .case_insensitive(!options.case_sensitive)
                .build()
                .map_err(|e| SearchError::invalid_path_pattern(pattern, e.to_string()))?;
            Ok(Self::Regex(re))
        } else if options.case_sensitive {
            Ok(Self::Substring {
                needle: pattern.to_string(),
                case_sensitive: true,
            })
        } else {
            Ok(Self::Substring {
                needle: pattern.to_ascii_lowercase(),
                case_sensitive: false,
            })
        }
    }

    fn is_match(&self, path: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(path),
            Self::Substring {
                needle,
                case_sensitive: true,
            } => path.contains(needle.as_str()),
            Self::Substring { needle, .. } => path.to_ascii_lowercase().contains(needle.as_str()),
        }
    }
}

/// Compiled include/exclude path filter
#[derive(Debug, Clone, Default)]
pub struct PathMatcher {
    include: Vec<PathPattern>,
    exclude: Option<PathPattern>,
}

impl PathMatcher {
    /// Compiles include patterns and an optional (empty means none) exclude pattern
    pub fn compile(
        include: &[String],
        exclude: &str,
        options: PathOptions,
    ) -> SearchResult<Self> {
        let include = include
            .iter()
            .map(|p| PathPattern::compile(p, options))
            .collect::<SearchResult<Vec<_>>>()?;
        let exclude = if exclude.is_empty() {
            None
        } else {
            Some(PathPattern::compile(exclude, options)?)
        };
        Ok(Self { include, exclude })
    }

    /// A matcher that accepts every path
    pub fn all() -> Self {
        Self::default()
    }

    /// Whether this matcher accepts every path without looking at it
    pub fn is_trivial(&self) -> bool {
        self.include.is_empty() && self.exclude.is_none()
    }

    /// Checks a path against all include patterns and the exclude pattern
    pub fn matches(&self, path: &str) -> bool {
        self.include.iter().all(|p| p.is_match(path))
            && !self.exclude.as_ref().is_some_and(|p| p.is_match(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regex_opts() -> PathOptions {
        PathOptions {
            regexp: true,
            case_sensitive: false,
        }
    }

    fn patterns(ps: &[&str]) -> Vec<String> {
        ps.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_include_patterns_are_anded() {
        let m = PathMatcher::compile(&patterns(&["a", "b"]), "", regex_opts()).unwrap();

        let paths = ["a", "a/b", "a/c", "ab", "b/a", "ba", "c/d"];
        let matched: Vec<_> = paths.iter().copied().filter(|p| m.matches(p)).collect();
        assert_eq!(matched, vec!["a/b", "ab", "b/a", "ba"]);
    }

    #[test]
    fn test_empty_pattern_matches_everything() {
        let m = PathMatcher::compile(&patterns(&[""]), "", regex_opts()).unwrap();
        assert!(m.matches("anything/at/all.rs"));
        assert!(m.matches(""));

        let m = PathMatcher::compile(&patterns(&[""]), "", PathOptions::default()).unwrap();
        assert!(m.matches("x"));

        assert!(PathMatcher::all().matches("x"));
        assert!(PathMatcher::all().is_trivial());
    }

    #[test]
    fn test_exclude_pattern() {
        let m = PathMatcher::compile(&patterns(&["\\.go$"]), "_test\\.go$", regex_opts()).unwrap();
        assert!(m.matches("cmd/main.go"));
        assert!(!m.matches("cmd/main_test.go"));
        assert!(!m.matches("README.md"));
    }

    #[test]
    fn test_substring_patterns() {
        let m = PathMatcher::compile(&patterns(&["src/", ".RS"]), "vendor", PathOptions::default())
            .unwrap();
        assert!(m.matches("src/lib.rs"));
        assert!(m.matches("SRC/Lib.RS"));
        assert!(!m.matches("vendor/src/lib.rs"));

        // Regex metacharacters are literal in substring mode
        let m = PathMatcher::compile(&patterns(&["a.b"]), "", PathOptions::default()).unwrap();
        assert!(m.matches("x/a.b"));
        assert!(!m.matches("x/acb"));
    }

    #[test]
    fn test_case_sensitive_paths() {
        let opts = PathOptions {
            regexp: true,
            case_sensitive: true,
        };
        let m = PathMatcher::compile(&patterns(&["Makefile"]), "", opts).unwrap();
        assert!(m.matches("build/Makefile"));
        assert!(!m.matches("build/makefile"));

        let m = PathMatcher::compile(&patterns(&["Makefile"]), "", regex_opts()).unwrap();
        assert!(m.matches("build/makefile"));
    }

    #[test]
    fn test_invalid_regex_is_compile_error() {
        let err = PathMatcher::compile(&patterns(&["("]), "", regex_opts()).unwrap_err();
        assert!(matches!(err, SearchError::InvalidPathPattern { .. }));

        let err = PathMatcher::compile(&[], "[", regex_opts()).unwrap_err();
        assert!(matches!(err, SearchError::InvalidPathPattern { .. }));
    }
}
