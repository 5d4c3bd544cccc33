//! Cross-message segment alignment.
//!
//! For every pair of messages, all segment pairs are scored with the Canberra-Ulm
//! dissimilarity. Scores that are similar enough go into a sparse similarity matrix, which
//! serves as the match score of a Needleman-Wunsch global alignment of the two segment
//! sequences. Diagonal steps of the traceback whose dissimilarity stays under the threshold
//! are reported as [`AlignedSegment`]s.
//!
//! Pairs are independent of each other; the total cost is
//! `O(pairs * segments_a * segments_b)`.

use crate::config::Config;
use crate::message::{FieldType, ParsedMessage};
use std::collections::{BTreeMap, HashMap};

/// Field `segment_index_a` of `message_a` corresponds to field `segment_index_b` of
/// `message_b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignedSegment {
    pub message_a: usize,
    pub message_b: usize,
    pub segment_index_a: usize,
    pub segment_index_b: usize,
    pub dissimilarity: f64,
}

/// Similarity of segment pairs `(index_a, index_b)`; absent entries fell below the threshold.
pub type SimilarityMatrix = HashMap<(usize, usize), f64>;

/// Canberra distance of two equally long byte strings. Positions where both bytes are zero
/// contribute nothing.
pub fn canberra_distance(a: &[u8], b: &[u8]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .filter(|(&x, &y)| x != 0 || y != 0)
        .map(|(&x, &y)| (x as f64 - y as f64).abs() / (x as f64 + y as f64))
        .sum()
}

/// Canberra-Ulm dissimilarity of two segments of any length, in `[0, 1]`.
///
/// Two length fields of the same byte order are always identical, whatever their widths.
/// Otherwise the shorter
/// segment slides over the longer one, the best normalized Canberra distance is kept, and a
/// size mismatch penalty tuned by `penalty_factor` is added.
pub fn canberra_ulm_dissimilarity(
    a: &[u8],
    b: &[u8],
    type_a: FieldType,
    type_b: FieldType,
    penalty_factor: f64,
) -> f64 {
    if type_a.is_length_field() && type_a == type_b {
        return 0.0;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return 1.0;
    }

    let min_d = long
        .windows(short.len())
        .map(|window| canberra_distance(short, window) / short.len() as f64)
        .fold(f64::INFINITY, f64::min);

    let s = short.len() as f64;
    let t = long.len() as f64;
    let r = (t - s) / t;
    (s / t) * min_d + r + (1.0 - min_d) * r * (s / (t * t) - penalty_factor)
}

/// Needleman-Wunsch score matrix of size `(m + 1) x (n + 1)`. Missing similarities score
/// negative infinity, so the only way past a dissimilar pair is a gap.
pub fn needleman_wunsch_matrix(m: usize, n: usize, similarity: &SimilarityMatrix, gap_penalty: f64) -> Vec<Vec<f64>> {
    let mut nw = vec![vec![0.0; n + 1]; m + 1];
    for (i, row) in nw.iter_mut().enumerate() {
        row[0] = i as f64 * gap_penalty;
    }
    for j in 0..=n {
        nw[0][j] = j as f64 * gap_penalty;
    }
    for i in 1..=m {
        for j in 1..=n {
            let sim = score(similarity, i - 1, j - 1);
            let matched = nw[i - 1][j - 1] + sim;
            let delete = nw[i - 1][j] + gap_penalty;
            let insert = nw[i][j - 1] + gap_penalty;
            nw[i][j] = matched.max(delete).max(insert);
        }
    }
    nw
}

fn score(similarity: &SimilarityMatrix, i: usize, j: usize) -> f64 {
    similarity.get(&(i, j)).copied().unwrap_or(f64::NEG_INFINITY)
}

/// Aligns the segments of every message pair of a corpus.
#[derive(Debug, Clone, Default)]
pub struct Aligner {
    pub config: Config,
}

impl Aligner {
    pub fn new(config: Config) -> Self {
        Aligner { config }
    }

    /// Sparse similarity of all segment pairs of `a` and `b`.
    pub fn similarity_matrix(&self, a: &ParsedMessage, b: &ParsedMessage) -> SimilarityMatrix {
        let mut matrix = SimilarityMatrix::new();
        for (i, (seg_a, bytes_a)) in a.iter_segments().enumerate() {
            for (j, (seg_b, bytes_b)) in b.iter_segments().enumerate() {
                let dissimilarity = canberra_ulm_dissimilarity(
                    bytes_a,
                    bytes_b,
                    seg_a.field_type,
                    seg_b.field_type,
                    self.config.penalty_factor,
                );
                let sim = 1.0 - dissimilarity;
                if sim >= self.config.similarity_threshold {
                    matrix.insert((i, j), sim);
                }
            }
        }
        matrix
    }

    /// Globally align the segments of one message pair.
    pub fn align_pair(&self, a: &ParsedMessage, b: &ParsedMessage) -> Vec<AlignedSegment> {
        let similarity = self.similarity_matrix(a, b);
        if similarity.is_empty() {
            return Vec::new();
        }
        let gap = self.config.gap_penalty;
        let (m, n) = (a.segments.len(), b.segments.len());
        let nw = needleman_wunsch_matrix(m, n, &similarity, gap);

        let mut aligned = Vec::new();
        let (mut i, mut j) = (m, n);
        while i > 0 && j > 0 {
            let current = nw[i][j];
            let sim = score(&similarity, i - 1, j - 1);
            if current == nw[i - 1][j - 1] + sim {
                let dissimilarity = 1.0 - sim;
                if dissimilarity < self.config.similarity_threshold {
                    aligned.push(AlignedSegment {
                        message_a: a.id,
                        message_b: b.id,
                        segment_index_a: i - 1,
                        segment_index_b: j - 1,
                        dissimilarity,
                    });
                }
                i -= 1;
                j -= 1;
            } else if current == nw[i - 1][j] + gap {
                i -= 1;
            } else {
                j -= 1;
            }
        }
        aligned
    }

    /// Align every unordered message pair, visiting ids in ascending order.
    pub fn align(&self, messages: &BTreeMap<usize, ParsedMessage>) -> Vec<AlignedSegment> {
        let mut aligned = Vec::new();
        for (pos, (id_a, a)) in messages.iter().enumerate() {
            for (id_b, b) in messages.iter().skip(pos + 1) {
                let pair = self.align_pair(a, b);
                tracing::trace!(id_a, id_b, aligned = pair.len(), "aligned message pair");
                aligned.extend(pair);
            }
        }
        tracing::debug!(messages = messages.len(), aligned = aligned.len(), "aligned corpus");
        aligned
    }
}
