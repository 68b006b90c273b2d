//! Textual detection summary: `<count> <class>` pairs.
//!
//! The pretrained model family reports its per-frame results as a
//! human-readable line such as `"3 whitefly 5 tuta"`. Counts here are
//! computed from structured detections, but the line format is kept for
//! logging and for verifying a run against a previously recorded summary.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Render counts as a `<count> <class>` summary line.
pub fn format_counts(counts: &BTreeMap<String, u32>) -> String {
    counts
        .iter()
        .map(|(name, count)| format!("{} {}", count, name))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a `<count> <class>` summary line into a class→count mapping.
///
/// Tokens that deviate from the `<integer><whitespace><word>` pattern are
/// silently dropped per pair; a count too large for u32 drops its pair too.
pub fn parse_counts(summary: &str) -> BTreeMap<String, u32> {
    static PAIR_RE: OnceLock<Regex> = OnceLock::new();
    let re = PAIR_RE.get_or_init(|| Regex::new(r"(\d+)\s+(\w+)").unwrap());

    let mut counts = BTreeMap::new();
    for caps in re.captures_iter(summary) {
        let Ok(count) = caps[1].parse::<u32>() else {
            continue;
        };
        counts.insert(caps[2].to_string(), count);
    }
    counts
}
