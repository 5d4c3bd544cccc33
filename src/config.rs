//! Tunable constants of the segmentation and alignment heuristics.

/// Parameters for [`Segmenter`](crate::Segmenter) and [`Aligner`](crate::Aligner).
///
/// The defaults reproduce the published NEMESYS setup plus the refinement thresholds used
/// throughout this crate; tests and callers normally start from `Config::default()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Standard deviation of the Gaussian smoothing applied to the delta signal.
    /// Not adapted to field length.
    pub sigma: f64,
    /// Smallest payload a length prefix may announce.
    pub min_length_payload: usize,
    /// Bytes inspected after a non-printable length-prefixed payload.
    pub lookahead: usize,
    /// Both segments must exceed this entropy to be merged.
    pub entropy_threshold: f64,
    /// Maximum entropy difference between merged segments.
    pub entropy_diff_threshold: f64,
    /// Entropy the XOR of the segment prefixes must exceed.
    pub xor_entropy_threshold: f64,
    /// Longest null-byte run moved across a boundary.
    pub max_null_shift: usize,
    /// Shortest segment counted as a corpus value.
    pub min_segment_value_length: usize,
    /// Share of the corpus a value must occur in to be treated as frequent.
    pub frequent_value_ratio: f64,
    /// Minimum similarity kept in the sparse matrix. Aligned pairs are reported when their
    /// dissimilarity stays below the same value.
    pub similarity_threshold: f64,
    /// Score of an insertion or deletion in the Needleman-Wunsch alignment.
    pub gap_penalty: f64,
    /// Non-linear size mismatch penalty of the Canberra-Ulm dissimilarity.
    pub penalty_factor: f64,
}

impl Config {
    pub const DEFAULT_SIGMA: f64 = 0.6;
    pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.17;
    pub const DEFAULT_GAP_PENALTY: f64 = -1.0;
    pub const DEFAULT_PENALTY_FACTOR: f64 = 0.8;

    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sigma: Self::DEFAULT_SIGMA,
            min_length_payload: 3,
            lookahead: 3,
            entropy_threshold: 0.7,
            entropy_diff_threshold: 0.05,
            xor_entropy_threshold: 0.8,
            max_null_shift: 2,
            min_segment_value_length: 2,
            frequent_value_ratio: 0.1,
            similarity_threshold: Self::DEFAULT_SIMILARITY_THRESHOLD,
            gap_penalty: Self::DEFAULT_GAP_PENALTY,
            penalty_factor: Self::DEFAULT_PENALTY_FACTOR,
        }
    }
}
