use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

/// Relative share of each class over the total detections, formatted to
/// two decimal places with a trailing percent sign.
///
/// The total over all classes must be greater than zero; callers only
/// invoke this when at least one detection occurred.
pub fn percentages(counts: &BTreeMap<String, u32>) -> Result<BTreeMap<String, String>> {
    let total: u64 = counts.values().map(|&c| c as u64).sum();
    if total == 0 {
        return Err(anyhow!("cannot compute percentages over zero detections"));
    }
    Ok(counts
        .iter()
        .map(|(name, &count)| {
            let share = (count as f64 / total as f64) * 100.0;
            (name.clone(), format!("{:.2}%", share))
        })
        .collect())
}
