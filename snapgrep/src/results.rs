/// Search result types.
///
/// Results are plain owned values. A scan builds them up inside one worker,
/// hands each finished [`FileMatch`] over to the engine, and the engine hands
/// the assembled [`SearchOutput`] to the caller. Nothing is mutated after it
/// leaves the worker that produced it, so no result type needs interior
/// mutability or reference counting.
///
/// Field names serialize in the wire protocol's camelCase
/// (`lineMatches`, `offsetAndLengths`, `limitHit`, ...), and an offset/length
/// pair serializes as a two-element array.
use serde::{Deserialize, Serialize};

/// A match (or a run of matches) on a single line
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineMatch {
    /// The line content in its original case
    pub preview: String,
    /// Zero-based line number
    pub line_number: usize,
    /// Byte offset and length of each match within the line
    pub offset_and_lengths: Vec<(usize, usize)>,
    /// True if more offsets existed on this line than were reported
    pub limit_hit: bool,
}

/// All matches found in a single file
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMatch {
    /// Path of the file within the archive
    pub path: String,
    /// Line matches in increasing line order
    pub line_matches: Vec<LineMatch>,
    /// True if more line matches existed than were reported
    pub limit_hit: bool,
}

impl FileMatch {
    /// A match on the path alone, with no content matches
    pub fn path_only(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// The complete search results
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutput {
    /// Matches per file, in archive order
    pub file_matches: Vec<FileMatch>,
    /// True if the results are a truncated prefix of the full answer
    pub limit_hit: bool,
}

impl SearchOutput {
    /// Creates a new empty search result
    pub fn new() -> Self {
        Default::default()
    }

    /// Number of files with at least one match
    pub fn files_with_matches(&self) -> usize {
        self.file_matches.len()
    }

    /// Total number of line matches across all files
    pub fn total_line_matches(&self) -> usize {
        self.file_matches.iter().map(|f| f.line_matches.len()).sum()
    }

    /// Paths of all matched files
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.file_matches.iter().map(|f| f.path.as_str())
    }
}
