//! Segmented message representation shared by every stage.
//!
//! A [`ParsedMessage`] owns a copy of the message bytes and an ordered list of
//! [`Segment`] start offsets. A segment ends where the next one starts (or at the end of
//! the message for the last one), so the list alone fully describes the field layout.

use std::ops::Range;

/// How the bytes of a segment should be interpreted downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FieldType {
    #[default]
    Unknown,
    /// Run of printable characters.
    String,
    PayloadLengthLittleEndian,
    PayloadLengthBigEndian,
    /// Payload announced by a preceding length field; currently always printable text.
    StringPayload,
}

impl FieldType {
    pub fn is_length_field(self) -> bool {
        matches!(
            self,
            FieldType::PayloadLengthLittleEndian | FieldType::PayloadLengthBigEndian
        )
    }

    /// Short tag used by the text dump.
    pub fn tag(self) -> &'static str {
        match self {
            FieldType::Unknown => "unknown",
            FieldType::String => "string",
            FieldType::PayloadLengthLittleEndian => "length(le)",
            FieldType::PayloadLengthBigEndian => "length(be)",
            FieldType::StringPayload => "payload",
        }
    }
}

/// Start of a field inside its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Segment {
    pub offset: usize,
    pub field_type: FieldType,
}

impl Segment {
    pub fn new(offset: usize, field_type: FieldType) -> Self {
        Segment { offset, field_type }
    }

    pub fn unknown(offset: usize) -> Self {
        Segment::new(offset, FieldType::Unknown)
    }
}

/// Sort by offset and keep the first segment seen for every offset; offsets at or past
/// `len` are dropped. Sorting is stable, so on duplicates the earlier entry wins.
pub fn canonicalize(mut segments: Vec<Segment>, len: usize) -> Vec<Segment> {
    segments.sort_by_key(|s| s.offset);
    segments.dedup_by_key(|s| s.offset);
    segments.retain(|s| s.offset < len || s.offset == 0);
    segments
}

/// Byte range of segment `index` within a message of `len` bytes.
pub(crate) fn bounds(segments: &[Segment], index: usize, len: usize) -> Range<usize> {
    let start = segments[index].offset;
    let end = segments.get(index + 1).map_or(len, |s| s.offset);
    start..end
}

/// Raw message bytes with an id unique within the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: usize,
    pub bytes: Vec<u8>,
}

impl Message {
    pub fn new(id: usize, bytes: Vec<u8>) -> Self {
        Message { id, bytes }
    }
}

/// One message of a corpus together with its current segmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub segments: Vec<Segment>,
    pub bytes: Vec<u8>,
    pub id: usize,
}

impl ParsedMessage {
    pub fn new(segments: Vec<Segment>, bytes: Vec<u8>, id: usize) -> Self {
        ParsedMessage { segments, bytes, id }
    }

    /// Message with user supplied boundaries. Field types cannot be carried over from a
    /// previous segmentation in a meaningful way, so every segment starts as `Unknown`.
    pub fn with_boundaries(bytes: Vec<u8>, id: usize, offsets: &[usize]) -> Self {
        let mut segments: Vec<Segment> = offsets.iter().copied().map(Segment::unknown).collect();
        segments.push(Segment::unknown(0));
        let segments = canonicalize(segments, bytes.len());
        ParsedMessage { segments, bytes, id }
    }

    /// Same message with a different segment list.
    pub fn with_segments(&self, segments: Vec<Segment>) -> Self {
        ParsedMessage {
            segments,
            bytes: self.bytes.clone(),
            id: self.id,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Start offsets of all segments.
    pub fn boundaries(&self) -> Vec<usize> {
        self.segments.iter().map(|s| s.offset).collect()
    }

    /// Byte range of the segment at `index`. Panics if `index` is out of range.
    pub fn segment_bounds(&self, index: usize) -> Range<usize> {
        bounds(&self.segments, index, self.bytes.len())
    }

    /// Bytes of the segment at `index`. Panics if `index` is out of range.
    pub fn segment_bytes(&self, index: usize) -> &[u8] {
        &self.bytes[self.segment_bounds(index)]
    }

    /// Iterate `(segment, bytes)` pairs in offset order.
    pub fn iter_segments(&self) -> impl Iterator<Item = (&Segment, &[u8])> + '_ {
        self.segments
            .iter()
            .enumerate()
            .map(move |(i, s)| (s, self.segment_bytes(i)))
    }

    /// Index of the segment containing `offset`.
    ///
    /// Offsets handed to this helper always come from validated segment lists, so an
    /// offset outside the message is a logic error.
    pub fn find_segment_for_offset(&self, offset: usize) -> usize {
        assert!(
            offset < self.bytes.len(),
            "offset {} out of range for message {} of {} bytes",
            offset,
            self.id,
            self.bytes.len()
        );
        find_segment_index(&self.segments, offset)
            .unwrap_or_else(|| panic!("offset {} precedes the first segment of message {}", offset, self.id))
    }

    /// Apply a further decoder to every segment that may carry nested content
    /// (`Unknown` and `StringPayload`). Returns `(segment index, decoded)` pairs.
    pub fn decode_nested<D: FurtherDecode>(&self, decoder: &D) -> Vec<(usize, D::Output)> {
        self.segments
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s.field_type, FieldType::Unknown | FieldType::StringPayload))
            .filter_map(|(i, _)| decoder.further_decode(self.segment_bytes(i)).map(|out| (i, out)))
            .collect()
    }
}

/// Index of the last segment starting at or before `offset`.
pub(crate) fn find_segment_index(segments: &[Segment], offset: usize) -> Option<usize> {
    let idx = segments.partition_point(|s| s.offset <= offset);
    idx.checked_sub(1)
}

/// Hook for schema-aware decoders (ASN.1, protobuf, ...) that a presentation layer may
/// run over segment contents. Segmentation never calls it.
pub trait FurtherDecode {
    type Output;

    fn further_decode(&self, bytes: &[u8]) -> Option<Self::Output>;
}

impl<F, T> FurtherDecode for F
where
    F: Fn(&[u8]) -> Option<T>,
{
    type Output = T;

    fn further_decode(&self, bytes: &[u8]) -> Option<T> {
        self(bytes)
    }
}
