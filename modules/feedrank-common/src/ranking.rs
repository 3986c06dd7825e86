//! Deterministic sort, date filtering and trim for fused items.
//!
//! Pure and stateless: the same input always yields the same ordering, so
//! the render step and the export step can run on separate cadences
//! without locking.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Item, SortKey, Target};

/// Metric value an item contributes under a sort key. Engagement weights
/// are fixed design constants.
pub fn metric(item: &Item, key: SortKey) -> u64 {
    match key {
        SortKey::Likes => item.like_count,
        SortKey::Comments => item.comment_count,
        SortKey::Shares => item.share_count,
        SortKey::Engagement => item.like_count + item.comment_count * 2 + item.share_count * 3,
    }
}

/// Timestamp used for ordering. Items without one sort as oldest.
fn sort_timestamp(item: &Item) -> i64 {
    item.timestamp.map(|t| t.timestamp_millis()).unwrap_or(0)
}

/// Sort descending by metric, then by timestamp, then by id.
///
/// The id tie-break makes the ordering a total order: two distinct items
/// never compare equal, so repeated sorts of any permutation agree.
pub fn rank(mut items: Vec<Item>, key: SortKey) -> Vec<Item> {
    items.sort_by(|a, b| {
        metric(b, key)
            .cmp(&metric(a, key))
            .then_with(|| sort_timestamp(b).cmp(&sort_timestamp(a)))
            .then_with(|| b.id.cmp(&a.id))
    });
    items
}

/// Keep the first `target` items of an already-ranked sequence.
pub fn trim(mut items: Vec<Item>, target: Target) -> Vec<Item> {
    if let Target::Count(n) = target {
        items.truncate(n);
    }
    items
}

/// Inclusive date window. An active window excludes timestamp-less items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn is_active(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    /// Whether an item with this timestamp passes the filter. With an
    /// active window, no timestamp means no way to prove membership.
    pub fn contains(&self, timestamp: Option<DateTime<Utc>>) -> bool {
        if !self.is_active() {
            return true;
        }
        let Some(ts) = timestamp else { return false };
        if let Some(from) = self.from {
            if ts < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if ts > to {
                return false;
            }
        }
        true
    }
}

/// Preset windows offered by the collection configuration surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePreset {
    Week,
    Month1,
    Month3,
    Month6,
    Year1,
    All,
}

impl DatePreset {
    pub fn to_range(self, now: DateTime<Utc>) -> DateRange {
        let days = match self {
            DatePreset::Week => 7,
            DatePreset::Month1 => 30,
            DatePreset::Month3 => 90,
            DatePreset::Month6 => 180,
            DatePreset::Year1 => 365,
            DatePreset::All => return DateRange::default(),
        };
        DateRange {
            from: Some(now - Duration::days(days)),
            to: Some(now),
        }
    }
}

/// Drop items outside the window before ranking.
pub fn apply_range(items: Vec<Item>, range: DateRange) -> Vec<Item> {
    if !range.is_active() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| range.contains(item.timestamp))
        .collect()
}
