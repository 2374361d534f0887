use crate::utils::error::{PartsError, Result};
use std::collections::BTreeMap;

/// Default upper bound on `max - min` of a merged group.
pub const DEFAULT_MAX_GROUP_SPAN: u64 = 500;

/// A contiguous barcode range queried with a single `BETWEEN`-style statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodeGroup {
    pub min: String,
    pub max: String,
    /// Requested barcodes in this range, ascending.
    pub members: Vec<String>,
}

impl BarcodeGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, barcode: &str) -> bool {
        self.members.iter().any(|m| m == barcode)
    }
}

/// Split ascending values into runs of consecutive integers.
pub fn consecutive_groups(sorted: &[u64]) -> Vec<Vec<u64>> {
    let mut groups: Vec<Vec<u64>> = Vec::new();
    for &value in sorted {
        match groups.last_mut() {
            Some(group) if group.last().map(|&last| last + 1) == Some(value) => {
                group.push(value)
            }
            _ => groups.push(vec![value]),
        }
    }
    groups
}

/// Merge runs while the merged group spans less than `max_span`.
fn merge_runs(runs: Vec<Vec<u64>>, max_span: u64) -> Vec<Vec<u64>> {
    let mut merged: Vec<Vec<u64>> = Vec::new();
    for run in runs {
        match merged.last_mut() {
            Some(group) => {
                let first = group[0];
                let last = *run.last().unwrap_or(&first);
                if last - first < max_span {
                    group.extend(run);
                } else {
                    merged.push(run);
                }
            }
            None => merged.push(run),
        }
    }
    merged
}

/// Group barcodes into ranges for batched queries.
///
/// Barcodes are compared as integers. Merged ranges may cover barcodes that
/// were not asked for, so query results have to be filtered by membership.
pub fn group_barcodes<S: AsRef<str>>(barcodes: &[S], max_span: u64) -> Result<Vec<BarcodeGroup>> {
    // every distinct spelling of a value is kept so membership checks match either
    let mut by_value: BTreeMap<u64, Vec<String>> = BTreeMap::new();
    for barcode in barcodes {
        let text = barcode.as_ref().trim();
        let value = text
            .parse::<u64>()
            .map_err(|_| PartsError::InvalidBarcode {
                barcode: text.to_string(),
            })?;

        let texts = by_value.entry(value).or_default();
        if texts.iter().any(|t| t == text) {
            continue;
        }
        if let Some(first) = texts.first() {
            tracing::warn!(
                "Barcodes {} and {} have the same value; keeping both",
                first,
                text
            );
        }
        texts.push(text.to_string());
    }

    let values: Vec<u64> = by_value.keys().copied().collect();
    let groups = merge_runs(consecutive_groups(&values), max_span);

    Ok(groups
        .into_iter()
        .filter_map(|group| {
            let first = by_value.get(group.first()?)?.first()?.clone();
            let last = by_value.get(group.last()?)?.first()?.clone();
            let members = group
                .iter()
                .filter_map(|v| by_value.get(v))
                .flatten()
                .cloned()
                .collect();
            Some(BarcodeGroup {
                min: first,
                max: last,
                members,
            })
        })
        .collect())
}
