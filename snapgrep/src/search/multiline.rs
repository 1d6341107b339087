/// Maps matches that may span several lines onto per-line records.
///
/// A single regex match is a byte range `[start, end)` over the whole file.
/// Reporting works line by line, so a match crossing `k` newlines becomes
/// `k + 1` [`LineMatch`] records:
///
/// ```text
///   file:   a b c d \n e f g h \n i j k l \n
///   match:      [--------------------)
///   line 0:     c d \n               offset 2, length 3
///   line 1:  e f g h \n              offset 0, length 5
///   line 2:  i j                     offset 0, length 2
/// ```
///
/// The first record's preview is the whole first line including its
/// terminator, middle records cover their full line, and the last record's
/// preview stops where the match stops.
///
/// Offsets are reported against the original file bytes. The match itself is
/// found in the (possibly lowercased) match buffer, which always has the same
/// length and line structure as the original.
use regex::bytes::Regex;
use std::ops::Range;

use crate::config::Limits;
use crate::results::LineMatch;

/// Where a line starts and how long it is, for every line of a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    starts: Vec<usize>,
    lengths: Vec<usize>,
}

impl LineIndex {
    /// Indexes `buf`. Line lengths include the `\n` terminator. The text after
    /// the last newline is a line of its own, even when empty.
    pub fn new(buf: &[u8]) -> Self {
        let mut starts = vec![0];
        let mut lengths = Vec::new();
        for nl in memchr::memchr_iter(b'\n', buf) {
            let start = starts[starts.len() - 1];
            lengths.push(nl + 1 - start);
            starts.push(nl + 1);
        }
        lengths.push(buf.len() - starts[starts.len() - 1]);
        Self { starts, lengths }
    }

    /// The line containing byte `pos`. A position just past a newline belongs
    /// to the next line.
    pub fn line_of(&self, pos: usize) -> usize {
        self.starts.partition_point(|&s| s <= pos).saturating_sub(1)
    }

    pub fn start(&self, line: usize) -> usize {
        self.starts.get(line).copied().unwrap_or(0)
    }

    pub fn length(&self, line: usize) -> usize {
        self.lengths.get(line).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Byte range of `line`, terminator included
    pub fn span(&self, line: usize) -> Range<usize> {
        let start = self.start(line);
        start..start + self.length(line)
    }
}

/// Line number, offset within the line and length of one piece of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePosition {
    pub line: usize,
    pub offset: usize,
    pub length: usize,
}

/// Locates the start of `[start, end)`: its line, the offset into that line,
/// and how much of the line the match covers.
pub fn starting_match(lines: &LineIndex, start: usize, end: usize) -> LinePosition {
    let line = lines.line_of(start);
    let offset = start - lines.start(line);
    let length = lines
        .length(line)
        .saturating_sub(offset)
        .min(end.saturating_sub(start));
    LinePosition {
        line,
        offset,
        length,
    }
}

/// Locates the end of `[start, end)`: its line and the covered part of it.
///
/// A match ending right after a newline yields a zero-length piece at the
/// start of the following line.
pub fn ending_match(lines: &LineIndex, start: usize, end: usize) -> LinePosition {
    let line = lines.line_of(end);
    let line_start = lines.start(line);
    if line_start <= start {
        LinePosition {
            line,
            offset: start - line_start,
            length: end - start,
        }
    } else {
        LinePosition {
            line,
            offset: 0,
            length: end - line_start,
        }
    }
}

fn preview(buf: &[u8], range: Range<usize>) -> String {
    let end = range.end.min(buf.len());
    let start = range.start.min(end);
    String::from_utf8_lossy(&buf[start..end]).into_owned()
}

/// Builds one record per line from the starting and ending pieces of `span`.
///
/// The first and last records are always produced, even when both fall on
/// the same line: a match of `[0, 5)` over `"abcd\n..."` yields
/// `{line 0, (0, 5)}` followed by `{line 0, (5, 0)}`.
pub fn generate_matches(
    buf: &[u8],
    lines: &LineIndex,
    starting: LinePosition,
    ending: LinePosition,
    span: Range<usize>,
    line_limit_hit: bool,
) -> Vec<LineMatch> {
    let mut records = Vec::with_capacity(ending.line.saturating_sub(starting.line) + 2);

    records.push(LineMatch {
        preview: preview(buf, lines.span(starting.line)),
        line_number: starting.line,
        offset_and_lengths: vec![(starting.offset, starting.length)],
        limit_hit: line_limit_hit,
    });

    for line in starting.line + 1..ending.line {
        records.push(LineMatch {
            preview: preview(buf, lines.span(line)),
            line_number: line,
            offset_and_lengths: vec![(0, lines.length(line))],
            limit_hit: line_limit_hit,
        });
    }

    records.push(LineMatch {
        preview: preview(buf, span.end.saturating_sub(ending.length)..span.end),
        line_number: ending.line,
        offset_and_lengths: vec![(ending.offset, ending.length)],
        limit_hit: line_limit_hit,
    });

    records
}

/// Finds every match of `re` in `match_buf` and reports it against `file_buf`.
///
/// Pieces of different matches that land on the same line share one record,
/// with up to `max_offsets` offsets. Matches crossing lines go through
/// [`generate_matches`]. Returns the records and whether `max_line_matches`
/// cut the file short.
pub fn multi_line_matches(
    re: &Regex,
    file_buf: &[u8],
    match_buf: &[u8],
    limits: &Limits,
) -> (Vec<LineMatch>, bool) {
    let lines = LineIndex::new(file_buf);
    let mut records: Vec<LineMatch> = Vec::new();

    for m in re.find_iter(match_buf) {
        let (start, end) = (m.start(), m.end());
        let starting = starting_match(&lines, start, end);

        if memchr::memchr(b'\n', &match_buf[start..end]).is_none() {
            let piece = (starting.offset, end - start);
            if let Some(last) = records.last_mut() {
                if last.line_number == starting.line {
                    merge_offset(last, piece, file_buf, &lines, limits);
                    continue;
                }
            }

            if records.len() >= limits.max_line_matches {
                return (records, true);
            }
            records.push(LineMatch {
                preview: preview(file_buf, lines.span(starting.line)),
                line_number: starting.line,
                offset_and_lengths: vec![piece],
                limit_hit: false,
            });
            continue;
        }

        let ending = ending_match(&lines, start, end);
        // The first piece joins the record already open on its line, if any
        let open = records
            .last()
            .filter(|last| last.line_number == starting.line)
            .map(|last| last.offset_and_lengths.len() >= limits.max_offsets);
        let line_limit_hit = open.unwrap_or(false);
        let mut generated =
            generate_matches(file_buf, &lines, starting, ending, start..end, line_limit_hit)
                .into_iter();

        if open.is_some() {
            if let (Some(last), Some(first)) = (records.last_mut(), generated.next()) {
                for &piece in &first.offset_and_lengths {
                    merge_offset(last, piece, file_buf, &lines, limits);
                }
            }
        }

        let room = limits.max_line_matches.saturating_sub(records.len());
        let generated: Vec<LineMatch> = generated.collect();
        if generated.len() > room {
            records.extend(generated.into_iter().take(room));
            return (records, true);
        }
        records.extend(generated);
    }

    (records, false)
}

/// Adds `piece` to `record`, or flags the record once it holds `max_offsets`.
/// The record's preview widens to its full line.
fn merge_offset(
    record: &mut LineMatch,
    piece: (usize, usize),
    file_buf: &[u8],
    lines: &LineIndex,
    limits: &Limits,
) {
    if record.offset_and_lengths.len() >= limits.max_offsets {
        record.limit_hit = true;
        return;
    }
    record.offset_and_lengths.push(piece);
    record.preview = preview(file_buf, lines.span(record.line_number));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(line: usize, offset: usize, length: usize) -> LinePosition {
        LinePosition {
            line,
            offset,
            length,
        }
    }

    fn record(preview: &str, line_number: usize, offset: usize, length: usize) -> LineMatch {
        LineMatch {
            preview: preview.to_string(),
            line_number,
            offset_and_lengths: vec![(offset, length)],
            limit_hit: false,
        }
    }

    fn find(pattern: &str, content: &str) -> (Vec<LineMatch>, bool) {
        let re = Regex::new(pattern).unwrap();
        let lowered = content.to_ascii_lowercase();
        multi_line_matches(&re, content.as_bytes(), lowered.as_bytes(), &Limits::default())
    }

    fn offsets(records: &[LineMatch]) -> Vec<(usize, (usize, usize))> {
        records
            .iter()
            .map(|r| (r.line_number, r.offset_and_lengths[0]))
            .collect()
    }

    #[test]
    fn test_line_index() {
        let lines = LineIndex::new(b"abcd\nabcd\r\n");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines.span(0), 0..5);
        assert_eq!(lines.span(1), 5..11);
        assert_eq!(lines.span(2), 11..11);
        assert_eq!(lines.line_of(4), 0);
        assert_eq!(lines.line_of(5), 1);
        assert_eq!(lines.line_of(11), 2);

        let empty = LineIndex::new(b"");
        assert_eq!(empty.len(), 1);
        assert_eq!(empty.line_of(0), 0);
    }

    #[test]
    fn test_starting_match() {
        let lines = LineIndex::new(b"abcd\nabcd\r\n");
        // Entire first line
        assert_eq!(starting_match(&lines, 0, 9), pos(0, 0, 5));
        // Partial first line
        assert_eq!(starting_match(&lines, 2, 9), pos(0, 2, 3));
        // Partial first line, ending on its newline
        assert_eq!(starting_match(&lines, 2, 5), pos(0, 2, 3));

        // A match starting on a bare newline stays on that line
        let lines = LineIndex::new(b"\nabcd\r\n");
        assert_eq!(starting_match(&lines, 0, 5), pos(0, 0, 1));
    }

    #[test]
    fn test_ending_match() {
        let lines = LineIndex::new(b"abcd\nabcd\r\n");
        // Entire second line
        assert_eq!(ending_match(&lines, 0, 9), pos(1, 0, 4));
        // Partial second line
        assert_eq!(ending_match(&lines, 2, 6), pos(1, 0, 1));
        // Ending right after the first newline
        assert_eq!(ending_match(&lines, 2, 5), pos(1, 0, 0));
        // Start and end on the same line
        assert_eq!(ending_match(&lines, 6, 8), pos(1, 1, 2));
    }

    #[test]
    fn test_generate_matches() {
        let buf = b"abcd\nefgh\nijkl\nmnop\r\n";
        let lines = LineIndex::new(buf);

        // Starting and ending line are the same
        let got = generate_matches(buf, &lines, pos(0, 0, 5), pos(0, 5, 0), 0..5, false);
        assert_eq!(got, vec![record("abcd\n", 0, 0, 5), record("", 0, 5, 0)]);

        // Consecutive lines
        let got = generate_matches(buf, &lines, pos(0, 0, 5), pos(1, 0, 4), 0..9, false);
        assert_eq!(got, vec![record("abcd\n", 0, 0, 5), record("efgh", 1, 0, 4)]);

        // One line in between
        let got = generate_matches(buf, &lines, pos(0, 0, 5), pos(2, 0, 4), 0..14, false);
        assert_eq!(
            got,
            vec![
                record("abcd\n", 0, 0, 5),
                record("efgh\n", 1, 0, 5),
                record("ijkl", 2, 0, 4),
            ]
        );

        // Two lines in between
        let got = generate_matches(buf, &lines, pos(0, 0, 5), pos(3, 0, 4), 0..19, false);
        assert_eq!(
            got,
            vec![
                record("abcd\n", 0, 0, 5),
                record("efgh\n", 1, 0, 5),
                record("ijkl\n", 2, 0, 5),
                record("mnop", 3, 0, 4),
            ]
        );
    }

    #[test]
    fn test_generate_matches_carries_limit_flag() {
        let buf = b"abcd\nefgh\n";
        let lines = LineIndex::new(buf);
        let got = generate_matches(buf, &lines, pos(0, 2, 3), pos(1, 0, 2), 2..7, true);
        assert!(got.iter().all(|r| r.limit_hit));
    }

    #[test]
    fn test_full_file_match() {
        let (records, limit_hit) = find("a\nb", "a\nb\r\n");
        assert!(!limit_hit);
        assert_eq!(offsets(&records), vec![(0, (0, 2)), (1, (0, 1))]);
        assert_eq!(records[0].preview, "a\n");
        assert_eq!(records[1].preview, "b");
    }

    #[test]
    fn test_leading_newline_followed_by_content() {
        let (records, _) = find("\na", "1\na\nb\r\n");
        assert_eq!(offsets(&records), vec![(0, (1, 1)), (1, (0, 1))]);
    }

    #[test]
    fn test_trailing_newline_without_second_line_content() {
        let (records, _) = find("a\n", "a\nb\r\n");
        assert_eq!(offsets(&records), vec![(0, (0, 2)), (1, (0, 0))]);
    }

    #[test]
    fn test_partial_first_line() {
        let (records, _) = find("cd\nb", "abcd\nb\r\n");
        assert_eq!(offsets(&records), vec![(0, (2, 3)), (1, (0, 1))]);
    }

    #[test]
    fn test_partial_second_line() {
        let (records, _) = find("abcd\nab", "ABCD\nabcd\r\n");
        assert_eq!(offsets(&records), vec![(0, (0, 5)), (1, (0, 2))]);
        // Previews keep the original case
        assert_eq!(records[0].preview, "ABCD\n");
    }

    #[test]
    fn test_more_than_two_lines() {
        let (records, _) = find("abcd\nabcd\nabcd", "abcd\nabcd\nabcd\r\n");
        assert_eq!(
            offsets(&records),
            vec![(0, (0, 5)), (1, (0, 5)), (2, (0, 4))]
        );
    }

    #[test]
    fn test_single_line_matches_share_a_record() {
        let (records, limit_hit) = find("o", "foo\nbar\nboo\n");
        assert!(!limit_hit);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line_number, 0);
        assert_eq!(records[0].offset_and_lengths, vec![(1, 1), (2, 1)]);
        assert_eq!(records[0].preview, "foo\n");
        assert_eq!(records[1].line_number, 2);
    }

    #[test]
    fn test_single_and_cross_line_matches_share_records() {
        let (records, limit_hit) = find("b\nc|a", "ab\nca\n");
        assert!(!limit_hit);
        assert_eq!(
            records,
            vec![
                LineMatch {
                    preview: "ab\n".to_string(),
                    line_number: 0,
                    offset_and_lengths: vec![(0, 1), (1, 2)],
                    limit_hit: false,
                },
                LineMatch {
                    preview: "ca\n".to_string(),
                    line_number: 1,
                    offset_and_lengths: vec![(0, 1), (1, 1)],
                    limit_hit: false,
                },
            ]
        );
    }

    #[test]
    fn test_full_line_flags_cross_line_match() {
        let limits = Limits {
            max_offsets: 1,
            ..Limits::default()
        };
        let re = Regex::new("b\nc|a").unwrap();
        let content = b"ab\nc\n";
        let (records, limit_hit) = multi_line_matches(&re, content, content, &limits);

        assert!(!limit_hit);
        let got: Vec<_> = records
            .iter()
            .map(|r| (r.line_number, r.offset_and_lengths.clone(), r.limit_hit))
            .collect();
        assert_eq!(got, vec![(0, vec![(0, 1)], true), (1, vec![(0, 1)], true)]);
    }

    #[test]
    fn test_limits() {
        let limits = Limits {
            max_line_matches: 2,
            max_offsets: 2,
            ..Limits::default()
        };
        let re = Regex::new("x").unwrap();
        let content = b"xxx\nxx\nx\n";
        let (records, limit_hit) = multi_line_matches(&re, content, content, &limits);

        assert!(limit_hit);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset_and_lengths.len(), 2);
        assert!(records[0].limit_hit);
        assert!(!records[1].limit_hit);
    }

    #[test]
    fn test_limit_cuts_generated_records() {
        let limits = Limits {
            max_line_matches: 2,
            ..Limits::default()
        };
        let re = Regex::new("a\nb\nc").unwrap();
        let content = b"a\nb\nc\n";
        let (records, limit_hit) = multi_line_matches(&re, content, content, &limits);
        assert!(limit_hit);
        assert_eq!(records.len(), 2);
    }
}
