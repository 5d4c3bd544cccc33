//! Single-message segmentation.
//!
//! [`Segmenter::segment`] first lets the [length-prefix detector](crate::length_prefix)
//! claim explicit `(length, payload)` structures, then runs the NEMESYS signal method on
//! every unclaimed byte range:
//!
//! 1. delta bit congruence of the range, smoothed by a Gaussian filter;
//! 2. local extrema of the smoothed signal;
//! 3. rising edges (minimum followed by maximum);
//! 4. the steepest step inside each rising edge becomes a boundary candidate;
//! 5. the candidates go through the [refinement pipeline](crate::refine).

use crate::config::Config;
use crate::length_prefix::detect_length_prefixed_fields;
use crate::message::{canonicalize, ParsedMessage, Segment};
use crate::refine::post_process;
use crate::signal::{apply_gaussian_filter, compute_delta_bc};
use std::ops::Range;

/// Classification of one signal sample relative to its neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Minimum,
    Maximum,
    Neither,
}

impl Extremum {
    fn classify(value: f64, neighbours: &[f64]) -> Self {
        if neighbours.iter().all(|&n| value < n) {
            Extremum::Minimum
        } else if neighbours.iter().all(|&n| value > n) {
            Extremum::Maximum
        } else {
            Extremum::Neither
        }
    }
}

/// Classify every index of `signal`. The first and last sample are compared only with
/// their single neighbour; signals with fewer than two samples have no extrema.
pub fn find_extrema_in_list(signal: &[f64]) -> Vec<(usize, Extremum)> {
    let n = signal.len();
    if n < 2 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let kind = if i == 0 {
                Extremum::classify(signal[0], &signal[1..2])
            } else if i == n - 1 {
                Extremum::classify(signal[i], &signal[i - 1..i])
            } else {
                Extremum::classify(signal[i], &[signal[i - 1], signal[i + 1]])
            };
            (i, kind)
        })
        .collect()
}

/// Pair each maximum with the nearest preceding minimum not yet used.
pub fn find_rising_deltas(extrema: &[(usize, Extremum)]) -> Vec<(usize, usize)> {
    let mut rising = Vec::new();
    let mut last_min: Option<usize> = None;
    for &(index, kind) in extrema {
        match kind {
            Extremum::Minimum => last_min = Some(index),
            Extremum::Maximum => {
                if let Some(min) = last_min.take() {
                    rising.push((min, index));
                }
            }
            Extremum::Neither => {}
        }
    }
    rising
}

/// For every rising edge `[min, max)`, report `i + 2` for the index `i` with the largest
/// `|signal[i] - signal[i + 1]|` (first one on ties, `min + 2` if no step is positive).
///
/// The `+ 2` maps a delta-signal index back to the byte offset it was derived from.
pub fn find_inflection_points(rising: &[(usize, usize)], signal: &[f64]) -> Vec<usize> {
    rising
        .iter()
        .map(|&(min, max)| {
            let mut best_index = min + 2;
            let mut best_delta = 0.0;
            for i in min..max {
                let delta = (signal[i] - signal[i + 1]).abs();
                if delta > best_delta {
                    best_delta = delta;
                    best_index = i + 2;
                }
            }
            best_index
        })
        .collect()
}

/// Raw boundary candidates of `bytes`, relative to its start. `None` when the slice is too
/// short to produce a signal.
pub fn raw_boundaries(bytes: &[u8], sigma: f64) -> Option<Vec<usize>> {
    let delta = compute_delta_bc(bytes);
    let smoothed = apply_gaussian_filter(&delta, sigma);
    if smoothed.is_empty() {
        return None;
    }
    let extrema = find_extrema_in_list(&smoothed);
    let rising = find_rising_deltas(&extrema);
    // the steepest step is searched on the unsmoothed delta; smoothing only picks the edges
    let mut boundaries = find_inflection_points(&rising, &delta);
    boundaries.sort_unstable();
    boundaries.dedup();
    Some(boundaries)
}

/// Confidence that a message is worth segmenting: the signal needs at least three bytes.
pub fn confidence(bytes: &[u8]) -> f64 {
    if bytes.len() >= 3 {
        0.76
    } else {
        0.0
    }
}

/// Per-message and corpus-wide segmentation driven by one [`Config`].
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    pub config: Config,
}

impl Segmenter {
    pub fn new(config: Config) -> Self {
        Segmenter { config }
    }

    /// Segment one message.
    pub fn segment(&self, bytes: &[u8], id: usize) -> ParsedMessage {
        let segments = self.find_segment_boundaries(bytes);
        tracing::debug!(id, len = bytes.len(), segments = segments.len(), "segmented message");
        ParsedMessage::new(segments, bytes.to_vec(), id)
    }

    fn find_segment_boundaries(&self, bytes: &[u8]) -> Vec<Segment> {
        if bytes.is_empty() {
            return vec![Segment::unknown(0)];
        }
        let claimed = detect_length_prefixed_fields(bytes, &self.config);
        let mut segments = claimed.segments;
        for range in free_ranges(&claimed.taken) {
            segments.extend(self.segment_free_range(bytes, range));
        }
        canonicalize(segments, bytes.len())
    }

    fn segment_free_range(&self, bytes: &[u8], range: Range<usize>) -> Vec<Segment> {
        let start = range.start;
        let slice = &bytes[range];
        match raw_boundaries(slice, self.config.sigma) {
            Some(boundaries) => post_process(&boundaries, slice, &self.config)
                .into_iter()
                .map(|s| Segment::new(start + s.offset, s.field_type))
                .collect(),
            None => vec![Segment::unknown(start)],
        }
    }
}

/// Maximal runs of unclaimed bytes.
fn free_ranges(taken: &[bool]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut current: Option<usize> = None;
    for (i, &t) in taken.iter().enumerate() {
        match (t, current) {
            (false, None) => current = Some(i),
            (true, Some(s)) => {
                ranges.push(s..i);
                current = None;
            }
            _ => {}
        }
    }
    if let Some(s) = current {
        ranges.push(s..taken.len());
    }
    ranges
}
