//! Message acquisition for the command line tools: hex text corpora (PEST grammar) and
//! pcap/pcapng captures (one message per UDP payload).
//!
//! Nothing in the segmentation core depends on this module.

use crate::message::Message;
use byteorder::{BigEndian, ByteOrder};
use pcap_parser::pcapng::Block as PcapNgBlock;
use pcap_parser::traits::{PcapNGPacketBlock, PcapReaderIterator};
use pcap_parser::{Linktype, PcapBlockOwned, PcapError};
use pest::Parser;
use pest_derive::Parser as PestParser;
use std::collections::HashSet;
use std::io::{Cursor, Read};
use std::path::Path;

#[derive(PestParser)]
#[grammar = "hex_corpus.pest"]
struct HexCorpusParser;

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Syntax: {0}")]
    Syntax(String),
    #[error("line {line}: odd number of hex digits in `{run}`")]
    OddNibbles { line: usize, run: String },
    #[error("line {line}: duplicate message id {id}")]
    DuplicateId { line: usize, id: usize },
    #[error("Capture: {0}")]
    Capture(String),
}

/// Parse a hex text corpus. Messages without an explicit id are numbered by their position
/// among the messages of the corpus.
pub fn parse_hex_corpus(source: &str) -> Result<Vec<Message>, InputError> {
    let pairs = HexCorpusParser::parse(Rule::corpus, source).map_err(|e| InputError::Syntax(e.to_string()))?;
    let corpus = pairs.into_iter().next().ok_or_else(|| InputError::Syntax("empty parse".to_string()))?;

    let mut messages = Vec::new();
    let mut seen = HashSet::new();
    for line in corpus.into_inner().filter(|p| p.as_rule() == Rule::line) {
        let Some(message) = line.into_inner().next() else {
            continue;
        };
        let line_no = message.as_span().start_pos().line_col().0;
        let mut id = messages.len();
        let mut bytes = Vec::new();
        for part in message.into_inner() {
            match part.as_rule() {
                Rule::id => {
                    id = part
                        .as_str()
                        .parse()
                        .map_err(|_| InputError::Syntax(format!("line {}: id out of range", line_no)))?;
                }
                Rule::hex_run => bytes.extend(decode_hex_run(part.as_str(), line_no)?),
                _ => {}
            }
        }
        if !seen.insert(id) {
            return Err(InputError::DuplicateId { line: line_no, id });
        }
        messages.push(Message::new(id, bytes));
    }
    Ok(messages)
}

fn decode_hex_run(run: &str, line: usize) -> Result<Vec<u8>, InputError> {
    let digits = run
        .strip_prefix("0x")
        .or_else(|| run.strip_prefix("0X"))
        .unwrap_or(run)
        .as_bytes();
    if digits.len() % 2 != 0 {
        return Err(InputError::OddNibbles {
            line,
            run: run.to_string(),
        });
    }
    Ok(digits
        .chunks(2)
        .map(|pair| (nibble(pair[0]) << 4) | nibble(pair[1]))
        .collect())
}

// the grammar only lets hex digits through
fn nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => 0,
    }
}

/// True if `data` starts with a pcap or pcapng magic number.
pub fn is_capture(data: &[u8]) -> bool {
    matches!(
        data.get(..4),
        Some([0x0a, 0x0d, 0x0d, 0x0a])
            | Some([0xd4, 0xc3, 0xb2, 0xa1])
            | Some([0xa1, 0xb2, 0xc3, 0xd4])
            | Some([0x4d, 0x3c, 0xb2, 0xa1])
            | Some([0xa1, 0xb2, 0x3c, 0x4d])
    )
}

/// Load a corpus from disk, auto-detecting captures by their magic number.
pub fn load_corpus(path: &Path) -> Result<Vec<Message>, InputError> {
    let data = std::fs::read(path)?;
    if is_capture(&data) {
        return read_capture(&data);
    }
    let text = String::from_utf8(data).map_err(|e| InputError::Syntax(format!("not UTF-8: {}", e)))?;
    parse_hex_corpus(&text)
}

/// Every non-empty UDP payload of a pcap or pcapng capture, numbered in capture order.
pub fn read_capture(data: &[u8]) -> Result<Vec<Message>, InputError> {
    let mut payloads = Vec::new();
    if data.starts_with(&[0x0a, 0x0d, 0x0d, 0x0a]) {
        read_pcapng(Cursor::new(data), &mut payloads)?;
    } else {
        read_legacy_pcap(Cursor::new(data), &mut payloads)?;
    }
    tracing::debug!(messages = payloads.len(), "read capture");
    Ok(payloads
        .into_iter()
        .enumerate()
        .map(|(id, bytes)| Message::new(id, bytes))
        .collect())
}

fn push_payload(out: &mut Vec<Vec<u8>>, linktype: Linktype, frame: &[u8]) {
    match udp_payload_from_linktype(linktype, frame) {
        Some(payload) if !payload.is_empty() => out.push(payload.to_vec()),
        _ => tracing::trace!(linktype = linktype.0, len = frame.len(), "skipped frame without UDP payload"),
    }
}

fn read_legacy_pcap<R: Read>(reader: R, out: &mut Vec<Vec<u8>>) -> Result<(), InputError> {
    let mut reader = pcap_parser::pcap::LegacyPcapReader::new(1 << 16, reader)
        .map_err(|e| InputError::Capture(format!("pcap header: {:?}", e)))?;
    let mut linktype = Linktype(1);
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::LegacyHeader(h) => linktype = h.network,
                    PcapBlockOwned::Legacy(b) => push_payload(out, linktype, b.data),
                    PcapBlockOwned::NG(_) => {}
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| InputError::Capture(format!("pcap refill: {:?}", e)))?;
            }
            Err(e) => return Err(InputError::Capture(format!("pcap read: {:?}", e))),
        }
    }
    Ok(())
}

fn read_pcapng<R: Read>(reader: R, out: &mut Vec<Vec<u8>>) -> Result<(), InputError> {
    let mut reader = pcap_parser::pcapng::PcapNGReader::new(1 << 16, reader)
        .map_err(|e| InputError::Capture(format!("pcapng header: {:?}", e)))?;
    let mut if_linktypes: Vec<Linktype> = Vec::new();
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                if let PcapBlockOwned::NG(b) = block {
                    match &b {
                        PcapNgBlock::InterfaceDescription(idb) => if_linktypes.push(idb.linktype),
                        PcapNgBlock::EnhancedPacket(epb) => {
                            let lt = if_linktypes.get(epb.if_id as usize).copied().unwrap_or(Linktype(1));
                            push_payload(out, lt, epb.packet_data());
                        }
                        PcapNgBlock::SimplePacket(spb) => {
                            let lt = if_linktypes.first().copied().unwrap_or(Linktype(1));
                            push_payload(out, lt, spb.packet_data());
                        }
                        _ => {}
                    }
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| InputError::Capture(format!("pcapng refill: {:?}", e)))?;
            }
            Err(e) => return Err(InputError::Capture(format!("pcapng read: {:?}", e))),
        }
    }
    Ok(())
}

/// UDP payload of a captured frame, honouring the IPv4 and UDP length fields so that
/// Ethernet padding of short frames is not included.
pub fn udp_payload_from_linktype(linktype: Linktype, frame: &[u8]) -> Option<&[u8]> {
    let l3 = match linktype.0 {
        1 => ethernet_l3(frame)?,     // DLT_EN10MB
        101 => frame,                 // DLT_RAW
        113 => linux_sll_l3(frame)?,  // DLT_LINUX_SLL
        _ => return None,
    };
    ipv4_udp_payload(l3)
}

fn read_u16_be(bytes: &[u8], at: usize) -> Option<u16> {
    bytes.get(at..at + 2).map(BigEndian::read_u16)
}

fn ethernet_l3(frame: &[u8]) -> Option<&[u8]> {
    let mut off = 12usize;
    let mut ethertype = read_u16_be(frame, off)?;
    off += 2;
    // 802.1Q / 802.1ad tags
    while ethertype == 0x8100 || ethertype == 0x88a8 {
        ethertype = read_u16_be(frame, off + 2)?;
        off += 4;
    }
    (ethertype == 0x0800).then(|| &frame[off..])
}

fn linux_sll_l3(frame: &[u8]) -> Option<&[u8]> {
    (read_u16_be(frame, 14)? == 0x0800).then(|| &frame[16..])
}

fn ipv4_udp_payload(l3: &[u8]) -> Option<&[u8]> {
    let ver_ihl = *l3.first()?;
    if ver_ihl >> 4 != 4 {
        return None;
    }
    let ihl = (ver_ihl & 0x0f) as usize * 4;
    if ihl < 20 || l3.len() < ihl {
        return None;
    }
    let total_len = read_u16_be(l3, 2)? as usize;
    if total_len < ihl {
        return None;
    }
    let l3 = if total_len <= l3.len() { &l3[..total_len] } else { l3 };
    if l3.len() < ihl + 8 || l3[9] != 17 {
        return None;
    }
    let udp = &l3[ihl..];
    let udp_len = read_u16_be(udp, 4)? as usize;
    if udp_len < 8 || udp.len() < udp_len {
        return None;
    }
    Some(&udp[8..udp_len])
}
