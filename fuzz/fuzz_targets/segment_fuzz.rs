//! Segmentation fuzz target: arbitrary bytes must segment without panicking and always
//! yield a sorted segment list starting at offset 0.
//! Build with: cargo fuzz run segment_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let msg = protoseg::segment(data, 0);
    assert_eq!(msg.segments.first().map(|s| s.offset), Some(0));
    assert!(msg.segments.windows(2).all(|w| w[0].offset < w[1].offset));
    for i in 0..msg.segments.len() {
        let _ = msg.segment_bytes(i);
    }
    // split the input in two messages and run the corpus stages over them
    let mid = data.len() / 2;
    let pair = [protoseg::segment(&data[..mid], 0), protoseg::segment(&data[mid..], 1)];
    let refined = protoseg::refine_across_corpus(&pair);
    let by_id: std::collections::BTreeMap<usize, protoseg::ParsedMessage> =
        refined.into_iter().map(|m| (m.id, m)).collect();
    for aligned in protoseg::align(&by_id) {
        assert!(aligned.dissimilarity < 0.17);
    }
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = protoseg::parse_hex_corpus(text);
    }
    let _ = protoseg::read_capture(data);
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run segment_fuzz");
}
