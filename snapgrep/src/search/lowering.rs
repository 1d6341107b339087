//! Rewrites parsed patterns for matching against ASCII-lowercased text, and
//! pulls out the literal every match must contain.

use regex_syntax::hir::{
    Capture, Class, ClassBytes, ClassBytesRange, ClassUnicode, ClassUnicodeRange, Hir, HirKind,
    Literal, Repetition,
};

/// Returns a pattern that, run against ASCII-lowercased text, matches the same
/// spans as `hir` run case-insensitively against the original text.
///
/// Literals are lowercased. Classes gain the lowercase form of any `A`-`Z`
/// members; a negated class keeps its uppercase exclusions and also excludes
/// their lowercase forms, so `[^A-Z]` becomes `[^A-Za-z]`. Everything else is
/// rebuilt unchanged.
pub fn lower_regex_ascii(hir: &Hir) -> Hir {
    match hir.kind() {
        HirKind::Empty | HirKind::Look(_) => hir.clone(),
        HirKind::Literal(Literal(bytes)) => Hir::literal(bytes.to_ascii_lowercase()),
        HirKind::Class(Class::Unicode(class)) => {
            Hir::class(Class::Unicode(lower_unicode_class(class)))
        }
        HirKind::Class(Class::Bytes(class)) => Hir::class(Class::Bytes(lower_bytes_class(class))),
        HirKind::Repetition(rep) => Hir::repetition(Repetition {
            min: rep.min,
            max: rep.max,
            greedy: rep.greedy,
            sub: Box::new(lower_regex_ascii(&rep.sub)),
        }),
        HirKind::Capture(cap) => Hir::capture(Capture {
            index: cap.index,
            name: cap.name.clone(),
            sub: Box::new(lower_regex_ascii(&cap.sub)),
        }),
        HirKind::Concat(subs) => Hir::concat(subs.iter().map(lower_regex_ascii).collect()),
        HirKind::Alternation(subs) => {
            Hir::alternation(subs.iter().map(lower_regex_ascii).collect())
        }
    }
}

/// The longest byte string that occurs in every match of `hir`.
///
/// Alternations, optional and starred parts contribute nothing. May be empty.
pub fn longest_literal(hir: &Hir) -> Vec<u8> {
    match hir.kind() {
        HirKind::Literal(Literal(bytes)) => bytes.to_vec(),
        HirKind::Capture(cap) => longest_literal(&cap.sub),
        HirKind::Repetition(rep) if rep.min >= 1 => longest_literal(&rep.sub),
        HirKind::Concat(subs) => subs.iter().map(longest_literal).fold(Vec::new(), |best, lit| {
            if lit.len() > best.len() {
                lit
            } else {
                best
            }
        }),
        _ => Vec::new(),
    }
}

/// Lowercase form of the part of `[start, end]` that falls in `A`-`Z`
fn upper_overlap(start: u32, end: u32) -> Option<(u8, u8)> {
    let lo = start.max(u32::from(b'A'));
    let hi = end.min(u32::from(b'Z'));
    (lo <= hi).then(|| (lo as u8 + 32, hi as u8 + 32))
}

fn is_upper_range(start: u32, end: u32) -> bool {
    start >= u32::from(b'A') && end <= u32::from(b'Z')
}

// A class spanning both ends of the alphabet with holes in it is how the
// parser spells a negated class.
fn lower_unicode_class(class: &ClassUnicode) -> ClassUnicode {
    let ranges = class.ranges();
    let is_exclusion = ranges.len() >= 2
        && ranges[0].start() == '\0'
        && ranges[ranges.len() - 1].end() == char::MAX;

    if is_exclusion {
        let mut excluded = class.clone();
        excluded.negate();
        let mut lowered = fold_unicode_class(&excluded, true);
        lowered.negate();
        lowered
    } else {
        fold_unicode_class(class, false)
    }
}

fn fold_unicode_class(class: &ClassUnicode, keep_upper: bool) -> ClassUnicode {
    let mut ranges = Vec::with_capacity(class.ranges().len() + 1);
    for range in class.iter() {
        let (start, end) = (u32::from(range.start()), u32::from(range.end()));
        if keep_upper || !is_upper_range(start, end) {
            ranges.push(*range);
        }
        if let Some((lo, hi)) = upper_overlap(start, end) {
            ranges.push(ClassUnicodeRange::new(char::from(lo), char::from(hi)));
        }
    }
    ClassUnicode::new(ranges)
}

fn lower_bytes_class(class: &ClassBytes) -> ClassBytes {
    let ranges = class.ranges();
    let is_exclusion =
        ranges.len() >= 2 && ranges[0].start() == 0 && ranges[ranges.len() - 1].end() == 0xff;

    if is_exclusion {
        let mut excluded = class.clone();
        excluded.negate();
        let mut lowered = fold_bytes_class(&excluded, true);
        lowered.negate();
        lowered
    } else {
        fold_bytes_class(class, false)
    }
}

fn fold_bytes_class(class: &ClassBytes, keep_upper: bool) -> ClassBytes {
    let mut ranges = Vec::with_capacity(class.ranges().len() + 1);
    for range in class.iter() {
        let (start, end) = (u32::from(range.start()), u32::from(range.end()));
        if keep_upper || !is_upper_range(start, end) {
            ranges.push(*range);
        }
        if let Some((lo, hi)) = upper_overlap(start, end) {
            ranges.push(ClassBytesRange::new(lo, hi));
        }
    }
    ClassBytes::new(ranges)
}
