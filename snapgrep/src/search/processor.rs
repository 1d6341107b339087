use std::borrow::Cow;
use tracing::trace;

use super::ascii::lower_into;
use super::matcher::CompiledMatcher;
use super::multiline::multi_line_matches;
use crate::archive::Archive;
use crate::config::Limits;
use crate::errors::{SearchError, SearchResult};
use crate::metrics::ScanMetrics;
use crate::results::LineMatch;

/// Line matches found in one file's content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentMatches {
    pub line_matches: Vec<LineMatch>,
    /// True if the file had more matching lines than `max_line_matches`
    pub limit_hit: bool,
}

impl ContentMatches {
    pub fn is_empty(&self) -> bool {
        self.line_matches.is_empty()
    }
}

/// Scratch state for one scanning worker.
///
/// Holds the buffer file bytes are read into and the buffer their lowercased
/// copy is written to. Both grow to the largest file the worker has seen and
/// are reused for every later file. A context borrows its matcher, and is
/// `&mut` for every call, so two workers can never share one.
#[derive(Debug)]
pub struct ScanContext<'m> {
    matcher: &'m CompiledMatcher,
    limits: Limits,
    metrics: ScanMetrics,
    file_buf: Vec<u8>,
    transform_buf: Vec<u8>,
}

impl<'m> ScanContext<'m> {
    pub fn new(matcher: &'m CompiledMatcher, limits: Limits, metrics: ScanMetrics) -> Self {
        Self {
            matcher,
            limits,
            metrics,
            file_buf: Vec::new(),
            transform_buf: Vec::new(),
        }
    }

    /// Reads archive entry `index` and finds matches in it.
    ///
    /// Fails if the entry cannot be read in full; the caller decides whether
    /// that is fatal.
    pub fn find<A: Archive + ?Sized>(
        &mut self,
        archive: &A,
        index: usize,
    ) -> SearchResult<ContentMatches> {
        let entry = archive.entries().get(index).ok_or_else(|| {
            SearchError::file_read(
                format!("#{}", index),
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such archive entry"),
            )
        })?;

        let grew = entry.size > self.file_buf.capacity();
        self.file_buf.resize(entry.size, 0);
        if grew {
            self.metrics.record_buffer_size(self.file_buf.capacity() as u64);
        }

        let n = archive
            .read_entry(index, &mut self.file_buf)
            .map_err(|e| SearchError::file_read(entry.name.as_str(), e))?;
        if n != entry.size {
            return Err(SearchError::truncated_read(entry.name.as_str(), entry.size, n));
        }
        self.metrics.record_file_searched(n as u64);
        trace!("Searching {} ({} bytes)", entry.name, n);

        Ok(find_matches(
            self.matcher,
            &self.limits,
            &self.metrics,
            &mut self.transform_buf,
            &self.file_buf,
        ))
    }

    /// Finds matches in `content` directly, without an archive
    pub fn find_bytes(&mut self, content: &[u8]) -> ContentMatches {
        find_matches(
            self.matcher,
            &self.limits,
            &self.metrics,
            &mut self.transform_buf,
            content,
        )
    }
}

fn find_matches(
    matcher: &CompiledMatcher,
    limits: &Limits,
    metrics: &ScanMetrics,
    transform_buf: &mut Vec<u8>,
    content: &[u8],
) -> ContentMatches {
    let Some(re) = matcher.regex() else {
        return ContentMatches::default();
    };

    let match_buf: &[u8] = if matcher.ignore_case() {
        lower_into(transform_buf, content)
    } else {
        content
    };

    // Most files don't match at all
    if let Some(finder) = matcher.finder() {
        if finder.find(match_buf).is_none() {
            metrics.record_file_pruned();
            return ContentMatches::default();
        }
    }
    if matcher.can_reject_whole_file() && !re.is_match(match_buf) {
        metrics.record_file_pruned();
        return ContentMatches::default();
    }

    if matcher.is_multi_line() {
        let (line_matches, limit_hit) = multi_line_matches(re, content, match_buf, limits);
        return ContentMatches {
            line_matches,
            limit_hit,
        };
    }

    let mut found = ContentMatches::default();
    let mut line_start = 0;
    let mut line_number = 0;
    while line_start < content.len() {
        let line_end = memchr::memchr(b'\n', &content[line_start..])
            .map_or(content.len(), |i| line_start + i + 1);
        let body = &match_buf[line_start..strip_terminator(match_buf, line_start, line_end)];

        if body.len() <= limits.max_line_size {
            let mut offsets = Vec::new();
            let mut line_limit_hit = false;
            for m in re.find_iter(body) {
                if offsets.len() == limits.max_offsets {
                    line_limit_hit = true;
                    break;
                }
                offsets.push((m.start(), m.len()));
            }

            if !offsets.is_empty() {
                if found.line_matches.len() == limits.max_line_matches {
                    found.limit_hit = true;
                    break;
                }
                found.line_matches.push(LineMatch {
                    preview: preview(&content[line_start..line_end]),
                    line_number,
                    offset_and_lengths: offsets,
                    limit_hit: line_limit_hit,
                });
            }
        }

        line_start = line_end;
        line_number += 1;
    }

    found
}

/// End of the line `[start, end)` without its `\n` or `\r\n`
fn strip_terminator(buf: &[u8], start: usize, end: usize) -> usize {
    let mut end = end;
    if end > start && buf[end - 1] == b'\n' {
        end -= 1;
        if end > start && buf[end - 1] == b'\r' {
            end -= 1;
        }
    }
    end
}

fn preview(line: &[u8]) -> String {
    match String::from_utf8_lossy(line) {
        Cow::Borrowed(s) => s.to_string(),
        Cow::Owned(s) => s,
    }
}
