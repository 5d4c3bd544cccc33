//! Corpus-wide refinement: use what all messages of a session have in common to fix up
//! the per-message segmentations.
//!
//! Two passes run in order (see [`Segmenter::refine_across_corpus`]):
//!
//! - [`Segmenter::crop_distinct`] splits segments that contain a value which occurs as a
//!   segment of its own in many messages.
//! - [`Segmenter::detect_message_length_field`] looks for a length field that announces the
//!   remaining message size in *every* message and tags it. The hypothesis is all or nothing:
//!   if one message has no such field, no message is changed.

use crate::length_prefix::LengthField;
use crate::message::{bounds, canonicalize, find_segment_index, FieldType, ParsedMessage, Segment};
use crate::segmenter::Segmenter;
use std::collections::{BTreeSet, HashMap};

/// Length field configurations tested corpus-wide, in priority order.
pub const MESSAGE_LENGTH_CANDIDATES: [LengthField; 5] = [
    LengthField::U8,
    LengthField::U16_BE,
    LengthField::U16_LE,
    LengthField::U32_BE,
    LengthField::U32_LE,
];

/// Count how often every segment value occurs across `messages`. Segments shorter than
/// `min_length` and all-zero segments are not counted.
pub fn count_segment_values(messages: &[ParsedMessage], min_length: usize) -> HashMap<Vec<u8>, usize> {
    let mut counts: HashMap<Vec<u8>, usize> = HashMap::new();
    for msg in messages {
        for (_, bytes) in msg.iter_segments() {
            if bytes.len() < min_length || bytes.iter().all(|&b| b == 0) {
                continue;
            }
            *counts.entry(bytes.to_vec()).or_insert(0) += 1;
        }
    }
    counts
}

/// Start offsets of all non-overlapping occurrences of `needle` in `haystack`, left to right.
pub fn find_occurrences(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    let mut found = Vec::new();
    if needle.is_empty() {
        return found;
    }
    let mut from = 0;
    while from + needle.len() <= haystack.len() {
        match haystack[from..].windows(needle.len()).position(|w| w == needle) {
            Some(idx) => {
                found.push(from + idx);
                from += idx + needle.len();
            }
            None => break,
        }
    }
    found
}

/// Offset and announced length of the first length field in `msg` that spans exactly the
/// rest of the message and sits inside an `Unknown` segment.
pub fn detect_length_field_in_message(msg: &ParsedMessage, field: LengthField) -> Option<(usize, usize)> {
    let bytes = &msg.bytes;
    (0..bytes.len().saturating_sub(field.size)).find_map(|offset| {
        let length = field.read(bytes, offset)?;
        let payload_end = (offset + field.size).checked_add(length)?;
        if payload_end != bytes.len() {
            return None;
        }
        let idx = find_segment_index(&msg.segments, offset)?;
        (msg.segments[idx].field_type == FieldType::Unknown).then_some((offset, length))
    })
}

impl Segmenter {
    /// Split non-`String` segments around frequent values found inside them.
    pub fn crop_distinct(&self, messages: &[ParsedMessage]) -> Vec<ParsedMessage> {
        let counts = count_segment_values(messages, self.config.min_segment_value_length);
        let threshold = ((messages.len() as f64 * self.config.frequent_value_ratio) as usize).max(1);
        let frequent: Vec<&Vec<u8>> = counts
            .iter()
            .filter(|(_, &count)| count >= threshold)
            .map(|(value, _)| value)
            .collect();
        tracing::debug!(values = counts.len(), frequent = frequent.len(), threshold, "crop distinct");

        messages
            .iter()
            .map(|msg| {
                let mut segments = Vec::with_capacity(msg.segments.len());
                for (i, seg) in msg.segments.iter().enumerate() {
                    if seg.field_type == FieldType::String {
                        segments.push(*seg);
                        continue;
                    }
                    let range = bounds(&msg.segments, i, msg.len());
                    let value = &msg.bytes[range.clone()];
                    let mut splits = BTreeSet::from([0]);
                    for needle in frequent.iter().filter(|f| f.len() < value.len()) {
                        for at in find_occurrences(value, needle) {
                            splits.insert(at);
                            splits.insert(at + needle.len());
                        }
                    }
                    if !value.is_empty() {
                        splits.remove(&value.len());
                    }
                    segments.extend(splits.into_iter().map(|rel| Segment::new(range.start + rel, seg.field_type)));
                }
                msg.with_segments(canonicalize(segments, msg.len()))
            })
            .collect()
    }

    /// Tag a message length field shared by the whole corpus, if one exists.
    pub fn detect_message_length_field(&self, messages: &[ParsedMessage]) -> Vec<ParsedMessage> {
        let chosen = MESSAGE_LENGTH_CANDIDATES.iter().copied().find(|field| {
            messages
                .iter()
                .all(|msg| detect_length_field_in_message(msg, *field).is_some())
        });
        let Some(field) = chosen else {
            tracing::debug!(messages = messages.len(), "no corpus-wide message length field");
            return messages.to_vec();
        };
        tracing::debug!(size = field.size, endianness = ?field.endianness, "message length field detected");

        messages
            .iter()
            .map(|msg| match detect_length_field_in_message(msg, field) {
                Some((offset, _)) => msg.with_segments(tag_length_field(msg, offset, field)),
                None => msg.clone(),
            })
            .collect()
    }

    /// Corpus passes in their fixed order.
    pub fn refine_across_corpus(&self, messages: &[ParsedMessage]) -> Vec<ParsedMessage> {
        let cropped = self.crop_distinct(messages);
        self.detect_message_length_field(&cropped)
    }
}

/// Retype `offset` as a length field and make sure a boundary follows it.
fn tag_length_field(msg: &ParsedMessage, offset: usize, field: LengthField) -> Vec<Segment> {
    let payload_start = offset + field.size;
    let mut segments: Vec<Segment> = msg
        .segments
        .iter()
        .copied()
        .filter(|s| s.offset < offset || s.offset >= payload_start)
        .collect();
    segments.push(Segment::new(offset, field.field_type()));
    if !segments.iter().any(|s| s.offset == payload_start) {
        segments.push(Segment::unknown(payload_start));
    }
    canonicalize(segments, msg.len())
}
