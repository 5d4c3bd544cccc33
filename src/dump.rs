//! Text rendering of segmented messages and alignments (used by the `segment_corpus` tool).

use crate::align::AlignedSegment;
use crate::message::{FurtherDecode, ParsedMessage};
use crate::refine::is_printable;
use std::collections::BTreeMap;
use std::fmt::{Debug, Write};

/// Lowercase hex of `bytes`, space separated.
pub fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(" ")
}

/// Bytes as text, with non-printable bytes replaced by `.`.
pub fn printable_preview(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if is_printable(b) && b >= 0x20 { b as char } else { '.' })
        .collect()
}

/// One line per segment: offset, type tag, hex and printable preview.
pub fn format_message(msg: &ParsedMessage) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "message {} ({} bytes, {} segments)", msg.id, msg.len(), msg.segments.len());
    for (seg, bytes) in msg.iter_segments() {
        let _ = writeln!(
            out,
            "  {:>5}  {:<10}  {}  |{}|",
            seg.offset,
            seg.field_type.tag(),
            hex_string(bytes),
            printable_preview(bytes)
        );
    }
    out
}

/// Like [`format_message`], with the output of `decoder` appended under each segment it
/// accepts.
pub fn format_message_with<D>(msg: &ParsedMessage, decoder: &D) -> String
where
    D: FurtherDecode,
    D::Output: Debug,
{
    let nested: BTreeMap<usize, D::Output> = msg.decode_nested(decoder).into_iter().collect();
    let mut out = String::new();
    for (i, line) in format_message(msg).lines().enumerate() {
        out.push_str(line);
        out.push('\n');
        // line 0 is the header
        if let Some(decoded) = i.checked_sub(1).and_then(|idx| nested.get(&idx)) {
            let _ = writeln!(out, "         -> {:?}", decoded);
        }
    }
    out
}

/// One line per aligned segment pair, showing both values.
pub fn format_alignments(aligned: &[AlignedSegment], messages: &BTreeMap<usize, ParsedMessage>) -> String {
    let mut out = String::new();
    for a in aligned {
        let (Some(ma), Some(mb)) = (messages.get(&a.message_a), messages.get(&a.message_b)) else {
            continue;
        };
        let _ = writeln!(
            out,
            "{}[{}] <-> {}[{}]  d={:.3}  {} | {}",
            a.message_a,
            a.segment_index_a,
            a.message_b,
            a.segment_index_b,
            a.dissimilarity,
            hex_string(ma.segment_bytes(a.segment_index_a)),
            hex_string(mb.segment_bytes(a.segment_index_b)),
        );
    }
    out
}
