//! Integration tests: single-message segmentation, corpus refinement and the free-function
//! pipeline.

use protoseg::segmenter::confidence;
use protoseg::{refine_across_corpus, segment, FieldType, ParsedMessage, Segment, Segmenter};
use std::collections::BTreeMap;

const DNS_QUERY: [u8; 29] = [
    0xFE, 0x47, 0x81, 0x82, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x77, 0x77, 0x77, 0x03, 0x69, 0x66,
    0x63, 0x03, 0x63, 0x6F, 0x6D, 0x00, 0x00, 0x01, 0x00, 0x01,
];

fn assert_canonical(msg: &ParsedMessage) {
    assert_eq!(msg.segments.first().map(|s| s.offset), Some(0), "message {}", msg.id);
    for pair in msg.segments.windows(2) {
        assert!(pair[0].offset < pair[1].offset, "unsorted segments in message {}: {:?}", msg.id, msg.segments);
    }
    if !msg.is_empty() {
        assert!(msg.segments.iter().all(|s| s.offset < msg.len()));
    }
}

fn segment_at(msg: &ParsedMessage, offset: usize) -> Option<(FieldType, &[u8])> {
    let idx = msg.segments.iter().position(|s| s.offset == offset)?;
    Some((msg.segments[idx].field_type, msg.segment_bytes(idx)))
}

#[test]
fn test_dns_labels_are_length_prefixed() {
    let msg = segment(&DNS_QUERY, 0);
    assert_canonical(&msg);

    // the two zero bytes before the first label read as a 2-byte big endian length
    assert_eq!(segment_at(&msg, 11), Some((FieldType::PayloadLengthBigEndian, &[0x00, 0x03][..])));
    assert_eq!(segment_at(&msg, 13), Some((FieldType::StringPayload, &b"www"[..])));
    assert_eq!(segment_at(&msg, 16), Some((FieldType::PayloadLengthBigEndian, &[0x03][..])));
    assert_eq!(segment_at(&msg, 17), Some((FieldType::StringPayload, &b"ifc"[..])));
    assert_eq!(segment_at(&msg, 20), Some((FieldType::PayloadLengthBigEndian, &[0x03][..])));
    assert_eq!(segment_at(&msg, 21), Some((FieldType::StringPayload, &b"com"[..])));
    assert_eq!(msg.find_segment_for_offset(24), msg.segments.iter().position(|s| s.offset == 24).unwrap());
}

#[test]
fn test_short_inputs() {
    assert_eq!(segment(&[], 0).segments, vec![Segment::unknown(0)]);
    assert_eq!(segment(&[0x42], 1).segments, vec![Segment::unknown(0)]);
    assert_eq!(segment(&[0x05, 0x41], 2).segments, vec![Segment::unknown(0)]);
    assert_eq!(confidence(&[0x05, 0x41]), 0.0);
    assert_eq!(confidence(&[0x05, 0x41, 0x42]), 0.76);
}

#[test]
fn test_segmentations_are_canonical() {
    let inputs: Vec<Vec<u8>> = vec![
        DNS_QUERY.to_vec(),
        b"GET /index.html HTTP/1.1\r\nHost: example\r\n\r\n".to_vec(),
        (0u8..=255).collect(),
        vec![0x00; 40],
        vec![0x12, 0x34, 0x00, 0x00, 0x41, 0x42, 0x43, 0x00, 0xFF, 0xEE, 0x80, 0x01, 0x00],
        (0..64u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect(),
    ];
    for (id, bytes) in inputs.iter().enumerate() {
        let msg = segment(bytes, id);
        assert_eq!(msg.bytes, *bytes);
        assert_canonical(&msg);
    }
}

#[test]
fn test_length_prefix_wins_over_signal() {
    // a text field announced by a 1-byte length, surrounded by binary noise
    let mut bytes = vec![0x9C, 0x1F, 0xE2];
    bytes.push(0x05);
    bytes.extend_from_slice(b"hello");
    bytes.extend_from_slice(&[0xD0, 0x0D, 0xBE, 0xEF]);
    let msg = segment(&bytes, 0);
    assert_canonical(&msg);
    assert_eq!(segment_at(&msg, 3), Some((FieldType::PayloadLengthBigEndian, &[0x05][..])));
    assert_eq!(segment_at(&msg, 4), Some((FieldType::StringPayload, &b"hello"[..])));
    assert!(msg.segments.iter().any(|s| s.offset == 9));
}

#[test]
fn test_message_length_field_detected_across_corpus() {
    // 2-byte big endian length at offset 1 announcing the rest of the message; the
    // announced lengths do not fit in one byte, so the 1-byte configuration cannot match
    let build = |len: u16| {
        let mut bytes = vec![0x7E];
        bytes.extend_from_slice(&len.to_be_bytes());
        bytes.extend(std::iter::repeat(0u8).take(len as usize));
        bytes
    };
    let corpus = vec![
        ParsedMessage::with_boundaries(build(260), 0, &[]),
        ParsedMessage::with_boundaries(build(261), 1, &[]),
    ];
    let refined = Segmenter::default().detect_message_length_field(&corpus);
    for msg in &refined {
        assert_eq!(
            msg.segments,
            vec![
                Segment::unknown(0),
                Segment::new(1, FieldType::PayloadLengthBigEndian),
                Segment::unknown(3),
            ]
        );
    }
}

fn two_byte_length_corpus() -> Vec<Vec<u8>> {
    let payloads: [&[u8]; 3] = [b"hello", b"abcdefg", b"xyzw"];
    payloads
        .iter()
        .map(|p| {
            let mut bytes = (p.len() as u16).to_be_bytes().to_vec();
            bytes.extend_from_slice(p);
            bytes
        })
        .collect()
}

#[test]
fn test_message_length_field_prefers_one_byte_for_short_payloads() {
    // the low byte of a short big endian length is itself a valid 1-byte length, and the
    // 1-byte configuration is tried first
    let corpus: Vec<ParsedMessage> = two_byte_length_corpus()
        .into_iter()
        .enumerate()
        .map(|(id, bytes)| ParsedMessage::with_boundaries(bytes, id, &[]))
        .collect();
    let refined = Segmenter::default().detect_message_length_field(&corpus);
    for msg in &refined {
        assert_eq!(
            msg.segments,
            vec![
                Segment::unknown(0),
                Segment::new(1, FieldType::PayloadLengthBigEndian),
                Segment::unknown(2),
            ]
        );
    }
}

#[test]
fn test_two_byte_lengths_found_per_message_before_corpus_pass() {
    let parsed: Vec<ParsedMessage> = two_byte_length_corpus()
        .iter()
        .enumerate()
        .map(|(id, bytes)| segment(bytes, id))
        .collect();
    for msg in &parsed {
        assert_eq!(
            msg.segments,
            vec![
                Segment::new(0, FieldType::PayloadLengthBigEndian),
                Segment::new(2, FieldType::StringPayload),
            ]
        );
    }
    // offset 0 is no longer Unknown, so no corpus-wide length field is tagged
    let refined = refine_across_corpus(&parsed);
    assert_eq!(refined, parsed);
}

#[test]
fn test_boundaries_round_trip() {
    let mut inputs: Vec<Vec<u8>> = vec![
        DNS_QUERY.to_vec(),
        b"USER anonymous\r\n\x00\x00PASS \x01\x02secret".to_vec(),
        vec![0x00, 0x00, 0x41, 0x00, 0x42, 0x42, 0x00, 0x00, 0x00, 0x07],
    ];
    let mut state = 0x2545_F491u32;
    for len in [3usize, 8, 17, 33, 64, 150] {
        inputs.push(
            (0..len)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    (state >> 24) as u8 & 0x7F
                })
                .collect(),
        );
    }
    for (id, bytes) in inputs.into_iter().enumerate() {
        let msg = segment(&bytes, id);
        let rebuilt = ParsedMessage::with_boundaries(msg.bytes.clone(), msg.id, &msg.boundaries());
        assert_eq!(rebuilt.boundaries(), msg.boundaries(), "message {}", id);
        assert_canonical(&rebuilt);
    }
}

#[test]
fn test_corpus_refinement_keeps_messages_canonical() {
    let bytes: Vec<Vec<u8>> = vec![
        vec![0xCA, 0xFE, 0x01, 0x10, 0x00, 0x04, b'p', b'i', b'n', b'g', 0x7F, 0x33],
        vec![0xCA, 0xFE, 0x02, 0x11, 0x00, 0x04, b'p', b'o', b'n', b'g', 0x6E, 0x91],
        vec![0xCA, 0xFE, 0x03, 0x12, 0x00, 0x05, b'h', b'e', b'l', b'l', b'o', 0x00],
    ];
    let parsed: Vec<ParsedMessage> = bytes.iter().enumerate().map(|(id, b)| segment(b, id)).collect();
    let refined = refine_across_corpus(&parsed);
    assert_eq!(refined.len(), parsed.len());
    for (before, after) in parsed.iter().zip(&refined) {
        assert_eq!(before.id, after.id);
        assert_eq!(before.bytes, after.bytes);
        assert_canonical(after);
    }
}

#[test]
fn test_user_boundaries_then_align() {
    // boundaries edited by hand feed straight back into refinement and alignment
    let a = ParsedMessage::with_boundaries(vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06], 4, &[2, 4]);
    let b = ParsedMessage::with_boundaries(vec![0x01, 0x02, 0x7F, 0x80, 0x05, 0x06], 9, &[4, 2]);
    let refined = refine_across_corpus(&[a, b]);
    let by_id: BTreeMap<usize, ParsedMessage> = refined.into_iter().map(|m| (m.id, m)).collect();
    let aligned = protoseg::align(&by_id);
    assert!(!aligned.is_empty());
    for pair in &aligned {
        assert_eq!((pair.message_a, pair.message_b), (4, 9));
        assert!(pair.segment_index_a < by_id[&4].segments.len());
        assert!(pair.segment_index_b < by_id[&9].segments.len());
        assert!(pair.dissimilarity < 0.17);
    }
}
