//! Segment every message of a corpus and print the fields.
//!
//! Usage: segment_corpus [--verbose|-v] [--align] [--sigma=<f>] [--dump=<path>] <corpus>
//!
//! `<corpus>` is a pcap/pcapng capture (UDP payloads) or a hex text file, one message per
//! line. `RUST_LOG` overrides the log filter.

use protoseg::dump::{format_alignments, format_message};
use protoseg::{load_corpus, Aligner, Config, ParsedMessage, Segmenter};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

fn take_flag(args: &mut Vec<String>, names: &[&str]) -> bool {
    match args.iter().position(|a| names.contains(&a.as_str())) {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    }
}

fn take_value(args: &mut Vec<String>, prefix: &str) -> Option<String> {
    let pos = args.iter().position(|a| a.starts_with(prefix))?;
    let arg = args.remove(pos);
    arg.strip_prefix(prefix).map(str::to_string)
}

/// Log filter used when `RUST_LOG` is not set.
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "protoseg=debug,segment_corpus=debug,warn"
    } else {
        "protoseg=info,segment_corpus=info,warn"
    }
}

fn main() -> anyhow::Result<()> {
    let mut raw_args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = take_flag(&mut raw_args, &["--verbose", "-v"]);
    let with_alignment = take_flag(&mut raw_args, &["--align"]);
    let sigma: Option<f64> = take_value(&mut raw_args, "--sigma=")
        .map(|s| s.parse::<f64>())
        .transpose()
        .map_err(|e| anyhow::anyhow!("--sigma: {}", e))?;
    let dump_path: Option<PathBuf> = take_value(&mut raw_args, "--dump=").map(PathBuf::from);
    let corpus_path: PathBuf = raw_args
        .into_iter()
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("usage: segment_corpus [--verbose] [--align] [--sigma=<f>] [--dump=<path>] <corpus>"))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose).into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::default();
    if let Some(sigma) = sigma {
        anyhow::ensure!(sigma > 0.0, "--sigma must be positive");
        config = config.with_sigma(sigma);
    }

    let messages = load_corpus(&corpus_path)?;
    tracing::info!(path = %corpus_path.display(), messages = messages.len(), "loaded corpus");

    let segmenter = Segmenter::new(config.clone());
    let parsed: Vec<ParsedMessage> = messages.iter().map(|m| segmenter.segment(&m.bytes, m.id)).collect();
    let refined = segmenter.refine_across_corpus(&parsed);

    let mut out: Box<dyn Write> = match &dump_path {
        Some(p) => Box::new(File::create(p)?),
        None => Box::new(std::io::stdout()),
    };
    for msg in &refined {
        write!(out, "{}", format_message(msg))?;
    }

    if with_alignment {
        let by_id: BTreeMap<usize, ParsedMessage> = refined.into_iter().map(|m| (m.id, m)).collect();
        let aligned = Aligner::new(config).align(&by_id);
        tracing::info!(pairs = aligned.len(), "aligned segments");
        writeln!(out)?;
        write!(out, "{}", format_alignments(&aligned, &by_id))?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_library_and_tool() {
        for verbose in [false, true] {
            let filter = default_filter(verbose);
            assert!(filter.contains("protoseg="), "{}", filter);
            assert!(filter.contains("segment_corpus="), "{}", filter);
            assert!(filter.parse::<tracing_subscriber::EnvFilter>().is_ok(), "{}", filter);
        }
        assert!(default_filter(true).contains("segment_corpus=debug"));
    }
}
