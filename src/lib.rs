//! # protoseg: schema-free segmentation of binary protocol messages
//!
//! Splits captured messages of an unknown binary protocol into fields without any prior
//! knowledge of the format, then aligns corresponding fields across messages.
//!
//! ## Pipeline
//!
//! 1. **Per message** ([`Segmenter::segment`]): explicit length-prefixed fields are claimed
//!    first; the remaining bytes are cut at the inflection points of the smoothed delta bit
//!    congruence signal and cleaned up by the [refinement passes](refine).
//! 2. **Per corpus** ([`Segmenter::refine_across_corpus`]): frequent values are cropped out
//!    of larger segments and a message length field common to all messages is tagged.
//! 3. **Alignment** ([`Aligner::align`]): segments of every message pair are matched with
//!    the Canberra-Ulm dissimilarity and a Needleman-Wunsch global alignment.
//!
//! ## Example
//!
//! ```
//! use protoseg::{segment, FieldType};
//!
//! let msg = segment(&[0x00, 0x03, b'w', b'w', b'w', 0x10, 0x20], 0);
//! assert_eq!(msg.segments[0].field_type, FieldType::PayloadLengthBigEndian);
//! assert_eq!(msg.segment_bytes(1), b"www");
//! ```
//!
//! Tunables live in [`Config`]; the free functions below use the defaults.

pub mod align;
pub mod config;
pub mod corpus;
pub mod dump;
pub mod input;
pub mod length_prefix;
pub mod message;
pub mod refine;
pub mod segmenter;
pub mod signal;

pub use align::{AlignedSegment, Aligner, SimilarityMatrix};
pub use config::Config;
pub use input::{load_corpus, parse_hex_corpus, read_capture, InputError};
pub use length_prefix::{Endianness, LengthField};
pub use message::{FieldType, FurtherDecode, Message, ParsedMessage, Segment};
pub use segmenter::Segmenter;

use std::collections::BTreeMap;

/// Segment one message with the default configuration.
pub fn segment(bytes: &[u8], id: usize) -> ParsedMessage {
    Segmenter::default().segment(bytes, id)
}

/// Corpus-wide refinement with the default configuration.
pub fn refine_across_corpus(messages: &[ParsedMessage]) -> Vec<ParsedMessage> {
    Segmenter::default().refine_across_corpus(messages)
}

/// Pairwise alignment with the default configuration.
pub fn align(messages: &BTreeMap<usize, ParsedMessage>) -> Vec<AlignedSegment> {
    Aligner::default().align(messages)
}
