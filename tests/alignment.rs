//! Alignment tests: Canberra-Ulm scoring and Needleman-Wunsch matching of segments.

use protoseg::align::canberra_ulm_dissimilarity;
use protoseg::{AlignedSegment, Aligner, Config, FieldType, ParsedMessage};
use std::collections::BTreeMap;

fn two_byte_fields(bytes: &[u8], id: usize) -> ParsedMessage {
    let offsets: Vec<usize> = (2..bytes.len()).step_by(2).collect();
    ParsedMessage::with_boundaries(bytes.to_vec(), id, &offsets)
}

fn pairs(aligned: &[AlignedSegment]) -> Vec<(usize, usize, usize, usize)> {
    aligned
        .iter()
        .map(|a| (a.message_a, a.segment_index_a, a.message_b, a.segment_index_b))
        .collect()
}

#[test]
fn test_identical_ends_align_and_differing_middle_does_not() {
    let a = two_byte_fields(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08], 0);
    let b = two_byte_fields(&[0x01, 0x02, 0x03, 0x0A, 0x0B, 0x06, 0x07, 0x08], 1);
    assert_eq!(a.segments.len(), 4);

    let aligned = Aligner::default().align_pair(&a, &b);
    // traceback order: last segment pair first
    assert_eq!(pairs(&aligned), vec![(0, 3, 1, 3), (0, 0, 1, 0)]);
    assert!(aligned.iter().all(|x| x.dissimilarity == 0.0));

    // the middle fields are close, just not close enough
    let d1 = canberra_ulm_dissimilarity(a.segment_bytes(1), b.segment_bytes(1), FieldType::Unknown, FieldType::Unknown, 0.8);
    let d2 = canberra_ulm_dissimilarity(a.segment_bytes(2), b.segment_bytes(2), FieldType::Unknown, FieldType::Unknown, 0.8);
    assert!((d1 - 3.0 / 14.0).abs() < 1e-12, "{}", d1);
    assert!((d2 - 0.1875).abs() < 1e-12, "{}", d2);
}

#[test]
fn test_looser_threshold_aligns_every_field() {
    let a = two_byte_fields(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08], 0);
    let b = two_byte_fields(&[0x01, 0x02, 0x03, 0x0A, 0x0B, 0x06, 0x07, 0x08], 1);
    let aligner = Aligner::new(Config::default().with_similarity_threshold(0.3));
    let aligned = aligner.align_pair(&a, &b);
    let indices: Vec<(usize, usize)> = aligned.iter().map(|x| (x.segment_index_a, x.segment_index_b)).collect();
    assert_eq!(indices, vec![(3, 3), (2, 2), (1, 1), (0, 0)]);
}

#[test]
fn test_alignment_with_different_segment_counts() {
    let a = two_byte_fields(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08], 0);
    let c = ParsedMessage::with_boundaries(vec![0x01, 0x02, 0x55, 0x66, 0x77, 0x07, 0x08], 1, &[2, 5]);
    let aligned = Aligner::default().align_pair(&a, &c);
    let indices: Vec<(usize, usize)> = aligned.iter().map(|x| (x.segment_index_a, x.segment_index_b)).collect();
    assert_eq!(indices, vec![(3, 2), (0, 0)]);
}

#[test]
fn test_dissimilarity_symmetry() {
    let samples: [&[u8]; 5] = [&[0x00, 0x10, 0x20], &[0xFF], &[0x41, 0x42, 0x43, 0x44, 0x45], &[0x00, 0x00], &[0x7F, 0x80, 0x01]];
    for a in samples {
        for b in samples {
            let ab = canberra_ulm_dissimilarity(a, b, FieldType::Unknown, FieldType::Unknown, 0.8);
            let ba = canberra_ulm_dissimilarity(b, a, FieldType::Unknown, FieldType::Unknown, 0.8);
            assert!((ab - ba).abs() < 1e-12, "{:?} vs {:?}: {} != {}", a, b, ab, ba);
            assert!((0.0..=1.0 + 1e-12).contains(&ab), "{:?} vs {:?}: {}", a, b, ab);
        }
    }
}

#[test]
fn test_corpus_alignment_visits_pairs_in_id_order() {
    let corpus: BTreeMap<usize, ParsedMessage> = [
        (20, ParsedMessage::with_boundaries(vec![0xAA, 0xBB, 0x09, 0x02], 20, &[2])),
        (3, ParsedMessage::with_boundaries(vec![0xAA, 0xBB, 0x01, 0x02], 3, &[2])),
        (7, ParsedMessage::with_boundaries(vec![0xAA, 0xBB, 0x01, 0x03], 7, &[2])),
    ]
    .into_iter()
    .collect();

    let aligned = protoseg::align(&corpus);
    assert_eq!(
        pairs(&aligned),
        vec![(3, 1, 7, 1), (3, 0, 7, 0), (3, 0, 20, 0), (7, 0, 20, 0)]
    );
    assert!((aligned[0].dissimilarity - 0.1).abs() < 1e-12);
}

#[test]
fn test_empty_corpus_and_single_message() {
    assert!(protoseg::align(&BTreeMap::new()).is_empty());
    let single: BTreeMap<usize, ParsedMessage> =
        [(0, ParsedMessage::with_boundaries(vec![1, 2, 3], 0, &[]))].into_iter().collect();
    assert!(protoseg::align(&single).is_empty());
}
