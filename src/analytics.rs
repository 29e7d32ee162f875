//! Per-category PPE counts over detection records.
//!
//! [`aggregate`] is the real computation. [`SyntheticFallback`] is a separate
//! presentation decorator that replaces an all-zero summary with placeholder
//! numbers for demo dashboards; its output is flagged `synthetic`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;

use crate::detect::LabelSet;
use crate::storage::{
    DetectionRecord, DetectionStore, MalformedLabelData, StoreResult, StoredLabels,
};

pub const DEFAULT_CATEGORIES: [&str; 5] = ["helmet", "vest", "gloves", "boots", "mask"];

pub type PpeCounts = BTreeMap<String, u64>;

pub fn default_categories() -> BTreeSet<String> {
    DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
}

/// Anything that can yield the label set of one record.
pub trait LabelSource {
    fn record_id(&self) -> i64;

    fn label_set(&self) -> Result<Cow<'_, LabelSet>, MalformedLabelData>;
}

impl LabelSource for DetectionRecord {
    fn record_id(&self) -> i64 {
        self.id
    }

    fn label_set(&self) -> Result<Cow<'_, LabelSet>, MalformedLabelData> {
        Ok(Cow::Borrowed(&self.labels))
    }
}

impl LabelSource for StoredLabels {
    fn record_id(&self) -> i64 {
        self.record_id
    }

    fn label_set(&self) -> Result<Cow<'_, LabelSet>, MalformedLabelData> {
        self.decode().map(Cow::Owned)
    }
}

/// Count, per category, how many records carry a matching label.
///
/// Every category starts at zero. Labels match case-insensitively; labels
/// outside `categories` are ignored. A record whose labels cannot be decoded
/// is skipped and the rest are still counted.
pub fn aggregate<'a, R, I>(records: I, categories: &BTreeSet<String>) -> PpeCounts
where
    R: LabelSource + 'a,
    I: IntoIterator<Item = &'a R>,
{
    let mut counts: PpeCounts = categories
        .iter()
        .map(|category| (category.to_lowercase(), 0))
        .collect();

    for record in records {
        let labels = match record.label_set() {
            Ok(labels) => labels,
            Err(err) => {
                log::warn!(
                    "analytics: skipping record {} with malformed labels: {}",
                    record.record_id(),
                    err
                );
                continue;
            }
        };
        for label in labels.iter() {
            if let Some(count) = counts.get_mut(&label.to_lowercase()) {
                *count += 1;
            }
        }
    }

    counts
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_images: u64,
    pub ppe_counts: PpeCounts,
    /// True when the counts are placeholders rather than real data.
    #[serde(default)]
    pub synthetic: bool,
}

impl AnalyticsSummary {
    pub fn is_empty(&self) -> bool {
        self.total_images == 0 || self.ppe_counts.values().all(|v| *v == 0)
    }
}

/// Real counts over every stored record.
pub fn summarize(
    store: &dyn DetectionStore,
    categories: &BTreeSet<String>,
) -> StoreResult<AnalyticsSummary> {
    let stored = store.stored_labels()?;
    Ok(AnalyticsSummary {
        total_images: stored.len() as u64,
        ppe_counts: aggregate(&stored, categories),
        synthetic: false,
    })
}

/// Display-only decorator: substitutes random counts when a summary has no data.
pub struct SyntheticFallback<G: Rng> {
    rng: G,
    range: RangeInclusive<u64>,
}

impl SyntheticFallback<rand::rngs::ThreadRng> {
    pub fn new() -> Self {
        Self::with_rng(rand::thread_rng())
    }
}

impl Default for SyntheticFallback<rand::rngs::ThreadRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: Rng> SyntheticFallback<G> {
    pub fn with_rng(rng: G) -> Self {
        Self { rng, range: 1..=5 }
    }

    /// Pass `summary` through, or replace its counts when it is empty.
    /// `total_images` is never altered.
    pub fn apply(&mut self, summary: AnalyticsSummary) -> AnalyticsSummary {
        if !summary.is_empty() {
            return summary;
        }
        log::info!(
            "analytics: no detections to report over {} images; serving synthetic counts",
            summary.total_images
        );
        let ppe_counts = summary
            .ppe_counts
            .keys()
            .map(|category| (category.clone(), self.rng.gen_range(self.range.clone())))
            .collect();
        AnalyticsSummary {
            total_images: summary.total_images,
            ppe_counts,
            synthetic: true,
        }
    }
}
