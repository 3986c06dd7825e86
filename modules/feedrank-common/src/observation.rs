//! Raw observations and structured-envelope decoding.
//!
//! Both channels deliver loosely-shaped data. Everything funnels through
//! `RawObservation`, and normalization fails closed: an observation whose
//! identifier cannot be normalized is skipped, never an error.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::types::{Item, ItemId, UNKNOWN_AUTHOR};

/// Which channel produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Parsed from the structured-data envelope. Authoritative for
    /// descriptive fields (author, text).
    Structured,
    /// Scraped from the rendered feed. Best-effort, but counters may be
    /// fresher than the structured ones.
    Scraped,
}

/// One reading of an item from either channel, possibly partial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawObservation {
    pub channel: Channel,
    pub raw_id: String,
    pub author_name: Option<String>,
    pub text: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub like_count: u64,
    pub comment_count: u64,
    pub share_count: u64,
    pub is_promoted: bool,
}

impl RawObservation {
    /// Normalize into a canonical `Item`. `None` when the raw identifier
    /// carries no recognizable post id.
    pub fn normalize(&self) -> Option<Item> {
        let id = match ItemId::normalize(&self.raw_id) {
            Some(id) => id,
            None => {
                debug!(raw_id = self.raw_id.as_str(), "unrecognizable raw id, skipping");
                return None;
            }
        };
        Some(Item {
            id,
            author_name: self
                .author_name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            text: self.text.clone().unwrap_or_default(),
            timestamp: self.timestamp,
            like_count: self.like_count,
            comment_count: self.comment_count,
            share_count: self.share_count,
            is_promoted: self.is_promoted,
        })
    }
}

#[derive(Debug, Default)]
struct Counts {
    likes: u64,
    comments: u64,
    shares: u64,
}

/// Decode a structured-data envelope into full observations.
///
/// The envelope is an element list of raw post references plus an
/// `included` entity soup. Three entity kinds matter:
///
/// - `engagement_counts` — counters keyed by a post reference
/// - `update` — author/text payload keyed by a post reference
/// - `profile` — display names keyed by a profile reference
///
/// The join runs per element: resolve counts and the update by the post's
/// numeric id, resolve the author through the update's actor or the
/// profile index. Elements that resolve to nothing still produce an
/// observation (zero counters, unknown author) — the fusion store decides
/// what wins. A malformed envelope decodes to an empty batch.
pub fn decode_envelope(envelope: &Value) -> Vec<RawObservation> {
    let Some(elements) = envelope.get("elements").and_then(Value::as_array) else {
        debug!("envelope has no element list");
        return Vec::new();
    };
    let included = envelope
        .get("included")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let mut counts_by_digits: HashMap<String, Counts> = HashMap::new();
    let mut updates_by_digits: HashMap<String, &Value> = HashMap::new();
    let mut profiles_by_ref: HashMap<String, String> = HashMap::new();

    for entity in included {
        let kind = entity.get("kind").and_then(Value::as_str).unwrap_or("");
        let entity_ref = entity.get("ref").and_then(Value::as_str).unwrap_or("");
        match kind {
            "engagement_counts" => {
                if let Some(digits) = post_digits(entity_ref) {
                    counts_by_digits.insert(
                        digits,
                        Counts {
                            likes: u64_field(entity, "likes"),
                            comments: u64_field(entity, "comments"),
                            shares: u64_field(entity, "shares"),
                        },
                    );
                }
            }
            "update" => {
                if let Some(digits) = post_digits(entity_ref) {
                    updates_by_digits.insert(digits, entity);
                }
            }
            "profile" => {
                if let Some(name) = profile_name(entity) {
                    profiles_by_ref.insert(entity_ref.to_string(), name);
                }
            }
            _ => {}
        }
    }

    let mut observations = Vec::new();
    for element in elements {
        let Some(raw_id) = element.as_str() else { continue };
        let Some(digits) = post_digits(raw_id) else {
            debug!(raw_id, "element without a post id, skipping");
            continue;
        };

        let update = updates_by_digits.get(digits.as_str()).copied();
        let counts = counts_by_digits.get(digits.as_str());

        let mut author_name = None;
        let mut text = None;
        let mut timestamp = None;
        if let Some(update) = update {
            if let Some(actor) = update.get("actor") {
                author_name = actor
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| {
                        actor
                            .get("profile_ref")
                            .and_then(Value::as_str)
                            .and_then(|r| profiles_by_ref.get(r).cloned())
                    });
            }
            text = update.get("text").and_then(Value::as_str).map(str::to_string);
            timestamp = update
                .get("posted_at_ms")
                .and_then(Value::as_i64)
                .and_then(DateTime::from_timestamp_millis);
        }

        observations.push(RawObservation {
            channel: Channel::Structured,
            raw_id: raw_id.to_string(),
            author_name,
            text,
            timestamp,
            like_count: counts.map(|c| c.likes).unwrap_or(0),
            comment_count: counts.map(|c| c.comments).unwrap_or(0),
            share_count: counts.map(|c| c.shares).unwrap_or(0),
            is_promoted: raw_id.contains("promoted"),
        });
    }

    observations
}

fn post_digits(reference: &str) -> Option<String> {
    ItemId::normalize(reference).map(|id| id.digits().to_string())
}

fn u64_field(entity: &Value, field: &str) -> u64 {
    entity.get(field).and_then(Value::as_u64).unwrap_or(0)
}

fn profile_name(entity: &Value) -> Option<String> {
    if let Some(name) = entity.get("name").and_then(Value::as_str) {
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }
    let first = entity.get("first_name").and_then(Value::as_str).unwrap_or("");
    let last = entity.get("last_name").and_then(Value::as_str).unwrap_or("");
    let joined = format!("{first} {last}").trim().to_string();
    (!joined.is_empty()).then_some(joined)
}

static COMPACT_AGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+)\s*(mo|m|h|d|w|y)\b").expect("valid age regex"));
static VERBOSE_AGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d+)\s*(minute|hour|day|week|month|year)s?\b").expect("valid age regex")
});

/// Resolve a relative age label ("3h", "2 days") against `now`.
///
/// Feeds label items with relative ages rather than absolute dates; scrape
/// collaborators pass the label through and this turns it into a usable
/// timestamp. Month = 30 days, year = 365 days.
pub fn relative_age_to_timestamp(label: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let label = label.to_lowercase();

    let (value, unit) = if let Some(caps) = COMPACT_AGE_RE.captures(&label) {
        (caps[1].parse::<i64>().ok()?, caps[2].to_string())
    } else if let Some(caps) = VERBOSE_AGE_RE.captures(&label) {
        let unit = match &caps[2] {
            "minute" => "m",
            "hour" => "h",
            "day" => "d",
            "week" => "w",
            "month" => "mo",
            "year" => "y",
            _ => return None,
        };
        (caps[1].parse::<i64>().ok()?, unit.to_string())
    } else {
        return None;
    };

    let age = match unit.as_str() {
        "m" => Duration::minutes(value),
        "h" => Duration::hours(value),
        "d" => Duration::days(value),
        "w" => Duration::weeks(value),
        "mo" => Duration::days(value * 30),
        "y" => Duration::days(value * 365),
        _ => return None,
    };
    now.checked_sub_signed(age)
}
