//! Boundary refinement for one byte range.
//!
//! The raw inflection points of the signal method are cleaned up by four passes, always in
//! this order (see [`post_process`]):
//!
//! | Pass | Effect |
//! |------|--------|
//! | [`merge_char_sequences`] | consecutive printable segments become one `String` |
//! | [`slide_char_window`] | `String` segments grow over adjacent printable bytes |
//! | [`null_byte_transitions`] | short null runs move to the side they belong to |
//! | [`entropy_merge`] | near-identical high entropy neighbours are merged |
//!
//! Every pass takes a canonical segment list (sorted, unique offsets, first offset 0) and
//! returns a new canonical list.

use crate::config::Config;
use crate::message::{bounds, canonicalize, FieldType, Segment};

/// Tab, line feed, carriage return and the visible ASCII range.
pub fn is_printable(b: u8) -> bool {
    matches!(b, 0x09 | 0x0A | 0x0D | 0x20..=0x7E)
}

pub fn is_printable_slice(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| is_printable(b))
}

/// Shannon entropy in bits.
pub fn shannon_entropy(bytes: &[u8]) -> f64 {
    let mut counts = [0usize; 256];
    for &b in bytes {
        counts[b as usize] += 1;
    }
    let total = bytes.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Turn raw boundaries into segments, collapsing runs of two or more printable segments into
/// one `String` segment. A lone printable segment stays `Unknown`.
pub fn merge_char_sequences(boundaries: &[usize], bytes: &[u8]) -> Vec<Segment> {
    if boundaries.is_empty() {
        return vec![Segment::unknown(0)];
    }
    let mut points: Vec<usize> = std::iter::once(0)
        .chain(boundaries.iter().copied().filter(|&b| b < bytes.len()))
        .collect();
    points.sort_unstable();
    points.dedup();

    let end_of = |k: usize| points.get(k + 1).copied().unwrap_or(bytes.len());
    let is_text = |k: usize| is_printable_slice(&bytes[points[k]..end_of(k)]);

    let mut merged = Vec::with_capacity(points.len());
    let mut i = 0;
    while i < points.len() {
        let start = points[i];
        let mut field_type = FieldType::Unknown;
        if is_text(i) {
            while i + 1 < points.len() && is_text(i + 1) {
                i += 1;
                field_type = FieldType::String;
            }
        }
        merged.push(Segment::new(start, field_type));
        i += 1;
    }
    merged
}

/// Extend every `String` segment over printable bytes on both sides. A segment never starts
/// before the extended end of an earlier `String` segment.
pub fn slide_char_window(segments: &[Segment], bytes: &[u8]) -> Vec<Segment> {
    let mut improved = Vec::with_capacity(segments.len());
    let mut extended_end = 0;
    for (i, seg) in segments.iter().enumerate() {
        let end = bounds(segments, i, bytes.len()).end;
        let start = seg.offset.max(extended_end);
        if seg.field_type == FieldType::String {
            let mut new_start = start;
            while new_start > extended_end && is_printable(bytes[new_start - 1]) {
                new_start -= 1;
            }
            let mut new_end = end.max(start);
            while new_end < bytes.len() && is_printable(bytes[new_end]) {
                new_end += 1;
            }
            extended_end = new_end;
            improved.push(Segment::new(new_start, FieldType::String));
        } else {
            improved.push(Segment::new(start, seg.field_type));
        }
    }
    canonicalize(improved, bytes.len())
}

/// Move short null-byte runs across boundaries.
///
/// * After a `String`, up to `max_shift` nulls opening the next segment become the string's
///   terminator.
/// * Before a non-`String` segment, up to `max_shift` nulls closing the previous segment
///   become its leading padding; this rule wins when both apply.
///
/// Longer null runs are left alone.
pub fn null_byte_transitions(segments: &[Segment], bytes: &[u8], max_shift: usize) -> Vec<Segment> {
    let shiftable = |n: usize| (1..=max_shift).contains(&n);
    let mut shifted: Vec<Segment> = Vec::with_capacity(segments.len());
    for (i, seg) in segments.iter().enumerate() {
        let Some(prev) = i.checked_sub(1).map(|p| shifted[p]) else {
            shifted.push(*seg);
            continue;
        };
        let start = seg.offset;
        let mut new_start = start;

        if prev.field_type == FieldType::String {
            let trailing = bytes[start..].iter().take_while(|&&b| b == 0).count();
            if shiftable(trailing) {
                new_start = start + trailing;
            }
        }

        if seg.field_type != FieldType::String && prev.offset < start {
            let leading = bytes[prev.offset..start].iter().rev().take_while(|&&b| b == 0).count();
            if shiftable(leading) {
                new_start = start - leading;
            }
        }

        shifted.push(Segment::new(new_start, seg.field_type));
    }
    canonicalize(shifted, bytes.len())
}

/// Merge adjacent segments of equal type whose entropies are both high and nearly equal and
/// whose prefixes XOR to a high entropy value. A merged pair is not compared again with its
/// successor.
pub fn entropy_merge(segments: &[Segment], bytes: &[u8], config: &Config) -> Vec<Segment> {
    let n = segments.len();
    let mut merged = Vec::with_capacity(n);
    let mut i = 0;
    while i < n {
        let seg = segments[i];
        if i + 1 < n && segments[i + 1].field_type == seg.field_type {
            let current = &bytes[bounds(segments, i, bytes.len())];
            let next = &bytes[bounds(segments, i + 1, bytes.len())];
            if entropy_mergeable(current, next, config) {
                merged.push(seg);
                i += 2;
                continue;
            }
        }
        merged.push(seg);
        i += 1;
    }
    merged
}

fn entropy_mergeable(current: &[u8], next: &[u8], config: &Config) -> bool {
    let e1 = shannon_entropy(current);
    let e2 = shannon_entropy(next);
    if e1 <= config.entropy_threshold
        || e2 <= config.entropy_threshold
        || (e1 - e2).abs() >= config.entropy_diff_threshold
    {
        return false;
    }
    let xor: Vec<u8> = current.iter().zip(next).take(2).map(|(a, b)| a ^ b).collect();
    shannon_entropy(&xor) > config.xor_entropy_threshold
}

/// Run the four refinement passes over raw boundaries of `bytes`.
pub fn post_process(boundaries: &[usize], bytes: &[u8], config: &Config) -> Vec<Segment> {
    let merged = merge_char_sequences(boundaries, bytes);
    let slid = slide_char_window(&merged, bytes);
    let shifted = null_byte_transitions(&slid, bytes, config.max_null_shift);
    entropy_merge(&shifted, bytes, config)
}
