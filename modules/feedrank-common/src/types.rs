use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Sentinel author used when no source has produced a display name yet.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

static POST_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"post:(\d+)").expect("valid post id regex"));

/// Normalized stable identifier for a feed item, used as the merge key.
///
/// Raw identifiers arrive in many shapes (`urn:feed:post:123`,
/// `feedElement:post:123-promoted`, bare `post:123`). Normalization keeps
/// only the numeric post id and re-prefixes it so every observation of the
/// same item maps to one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Extract and canonicalize the post id from a raw source identifier.
    /// Returns `None` when the raw string carries no recognizable post id.
    pub fn normalize(raw: &str) -> Option<Self> {
        let caps = POST_ID_RE.captures(raw)?;
        Some(Self(format!("urn:feed:post:{}", &caps[1])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric portion of the id. Present by construction.
    pub fn digits(&self) -> &str {
        self.0.rsplit(':').next().unwrap_or("")
    }

    /// Permalink form used in exports.
    pub fn permalink(&self) -> String {
        format!("https://feed.example.com/posts/{}/", self.digits())
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One fused feed item. Identity is the `id` alone; every other field is
/// evidence that may be upgraded by later observations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub author_name: String,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub like_count: u64,
    pub comment_count: u64,
    pub share_count: u64,
    pub is_promoted: bool,
}

impl Item {
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            author_name: UNKNOWN_AUTHOR.to_string(),
            text: String::new(),
            timestamp: None,
            like_count: 0,
            comment_count: 0,
            share_count: 0,
            is_promoted: false,
        }
    }

    /// Evidence score: the counter sum, used as the merge tie-break.
    pub fn score(&self) -> u64 {
        self.like_count + self.comment_count + self.share_count
    }

    pub fn author_known(&self) -> bool {
        self.author_name != UNKNOWN_AUTHOR
    }

    pub fn has_engagement(&self) -> bool {
        self.like_count > 0 || self.comment_count > 0 || self.share_count > 0
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Item {}

impl std::hash::Hash for Item {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Metric the final ordering is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Likes,
    Comments,
    Shares,
    Engagement,
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortKey::Likes => write!(f, "likes"),
            SortKey::Comments => write!(f, "comments"),
            SortKey::Shares => write!(f, "shares"),
            SortKey::Engagement => write!(f, "engagement"),
        }
    }
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "likes" => Ok(SortKey::Likes),
            "comments" => Ok(SortKey::Comments),
            "shares" => Ok(SortKey::Shares),
            "engagement" => Ok(SortKey::Engagement),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}

/// How aggressively the scrape channel is consulted during collection.
///
/// - `Lite`: structured channel only.
/// - `Synced`: scrape scans feed counter corrections once the store has data.
/// - `Precision`: additionally seeds the store from full scraped records
///   while the structured channel has produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    Lite,
    Synced,
    Precision,
}

impl std::fmt::Display for CollectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectionMode::Lite => write!(f, "lite"),
            CollectionMode::Synced => write!(f, "synced"),
            CollectionMode::Precision => write!(f, "precision"),
        }
    }
}

impl std::str::FromStr for CollectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lite" => Ok(CollectionMode::Lite),
            "synced" => Ok(CollectionMode::Synced),
            "precision" => Ok(CollectionMode::Precision),
            other => Err(format!("unknown collection mode: {other}")),
        }
    }
}

/// Collection target: a bounded item count or everything the feed yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Count(usize),
    All,
}

impl Target {
    pub fn is_bounded(&self) -> bool {
        matches!(self, Target::Count(_))
    }

    pub fn count(&self) -> Option<usize> {
        match self {
            Target::Count(n) => Some(*n),
            Target::All => None,
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Count(n) => write!(f, "{n}"),
            Target::All => write!(f, "all"),
        }
    }
}

/// Ordering handed to the render collaborator, with per-item fallback data
/// for entries the renderer cannot locate in the live feed.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub ordered_ids: Vec<ItemId>,
    pub fallback: HashMap<ItemId, Item>,
}

impl RenderPlan {
    pub fn new(items: &[Item]) -> Self {
        Self {
            ordered_ids: items.iter().map(|i| i.id.clone()).collect(),
            fallback: items.iter().map(|i| (i.id.clone(), i.clone())).collect(),
        }
    }
}

/// Result reported back by the render collaborator.
#[derive(Debug, Clone)]
pub struct RenderReport {
    pub success: bool,
    pub applied_count: usize,
    pub message: String,
}
