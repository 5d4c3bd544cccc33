//! Detection of explicit length-prefixed fields inside a single message.
//!
//! The detector runs before the signal based segmenter and claims every byte range it
//! recognises as `length field + payload`. Only the remaining bytes are segmented
//! statistically.

use crate::config::Config;
use crate::message::{canonicalize, FieldType, Segment};
use crate::refine::{is_printable, is_printable_slice};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

/// Width and byte order of an unsigned length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthField {
    pub size: usize,
    pub endianness: Endianness,
}

impl LengthField {
    pub const U8: LengthField = LengthField::new(1, Endianness::Big);
    pub const U16_BE: LengthField = LengthField::new(2, Endianness::Big);
    pub const U16_LE: LengthField = LengthField::new(2, Endianness::Little);
    pub const U32_BE: LengthField = LengthField::new(4, Endianness::Big);
    pub const U32_LE: LengthField = LengthField::new(4, Endianness::Little);

    pub const fn new(size: usize, endianness: Endianness) -> Self {
        LengthField { size, endianness }
    }

    /// Read the length stored at `offset`; `None` if the field does not fit or the size is
    /// not 1, 2 or 4 bytes.
    pub fn read(&self, bytes: &[u8], offset: usize) -> Option<usize> {
        let end = offset.checked_add(self.size)?;
        let raw = bytes.get(offset..end)?;
        let value = match (self.size, self.endianness) {
            (1, _) => raw[0] as usize,
            (2, Endianness::Big) => BigEndian::read_u16(raw) as usize,
            (2, Endianness::Little) => LittleEndian::read_u16(raw) as usize,
            (4, Endianness::Big) => BigEndian::read_u32(raw) as usize,
            (4, Endianness::Little) => LittleEndian::read_u32(raw) as usize,
            _ => return None,
        };
        Some(value)
    }

    /// Field type tagging a length field of this byte order. Single-byte fields carry no
    /// byte order and are reported as big-endian.
    pub fn field_type(&self) -> FieldType {
        match self.endianness {
            Endianness::Big => FieldType::PayloadLengthBigEndian,
            Endianness::Little => FieldType::PayloadLengthLittleEndian,
        }
    }
}

/// Length field candidates in priority order.
pub const PREFIX_CANDIDATES: [LengthField; 3] =
    [LengthField::U16_BE, LengthField::U16_LE, LengthField::U8];

/// Segments found by the detector and the bytes they claim.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedFields {
    /// Sorted, one segment per offset.
    pub segments: Vec<Segment>,
    /// `taken[i]` is set when byte `i` belongs to a detected length field or payload.
    pub taken: Vec<bool>,
}

/// Scan `bytes` left to right for `length + payload` structures.
pub fn detect_length_prefixed_fields(bytes: &[u8], config: &Config) -> ClaimedFields {
    let mut taken = vec![false; bytes.len()];
    let mut segments = Vec::new();
    let mut i = 0;
    while i + 1 < bytes.len() {
        let accepted = PREFIX_CANDIDATES
            .iter()
            .find_map(|field| check_length_prefixed(bytes, &mut taken, &mut segments, i, *field, config));
        i = accepted.unwrap_or(i + 1);
    }
    ClaimedFields {
        segments: canonicalize(segments, bytes.len()),
        taken,
    }
}

/// Try to read a length field of the given kind at `offset`. On success the field and its
/// payload are recorded and the payload end is returned.
fn check_length_prefixed(
    bytes: &[u8],
    taken: &mut [bool],
    segments: &mut Vec<Segment>,
    offset: usize,
    field: LengthField,
    config: &Config,
) -> Option<usize> {
    let payload_start = offset + field.size;
    if payload_start >= bytes.len() {
        return None;
    }
    let length = field.read(bytes, offset)?;
    let payload_end = payload_start.checked_add(length)?;
    if payload_end > bytes.len() || length < config.min_length_payload {
        return None;
    }
    if taken[offset..payload_end].iter().any(|&t| t) {
        return None;
    }

    let printable = is_printable_slice(&bytes[payload_start..payload_end]);
    if !printable {
        // binary payloads directly followed by text are more likely part of a larger
        // structure than a self-contained field
        let lookahead_end = (payload_end + config.lookahead).min(bytes.len());
        let lookahead = &bytes[payload_end..lookahead_end];
        if !lookahead.is_empty() && lookahead.iter().all(|&b| is_printable(b)) {
            return None;
        }
    }

    let payload_type = if printable {
        FieldType::StringPayload
    } else {
        FieldType::Unknown
    };
    segments.push(Segment::new(offset, field.field_type()));
    segments.push(Segment::new(payload_start, payload_type));
    taken[offset..payload_end].iter_mut().for_each(|t| *t = true);
    tracing::trace!(offset, size = field.size, length, printable, "claimed length-prefixed field");
    Some(payload_end)
}
