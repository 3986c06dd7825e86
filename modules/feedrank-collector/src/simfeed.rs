//! Deterministic in-memory feed simulation.
//!
//! Stands in for a real scrolling surface so the collector can be driven
//! end to end without a browser: a fixed population of posts is revealed
//! window by window as the controller advances, with an optional load-more
//! gate partway down. Counts are derived arithmetically from the post
//! index, so every run sees the same feed.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::info;

use feedrank_common::{Channel, ItemId, RawObservation, RenderPlan, RenderReport};

use crate::traits::{FeedRenderer, FeedSurface};

/// Pixels of container height one post contributes.
const POST_HEIGHT: u64 = 420;

struct SimState {
    posts: Vec<RawObservation>,
    revealed: usize,
    position: u64,
}

pub struct SimFeed {
    state: Mutex<SimState>,
    reveal_per_step: usize,
    /// Reveals pause at this count until `try_load_more` is clicked.
    load_more_gate: Option<usize>,
    gate_released: Mutex<bool>,
}

impl SimFeed {
    /// A feed of `total` posts revealing `reveal_per_step` at a time.
    pub fn new(total: usize, reveal_per_step: usize) -> Self {
        let now = Utc::now();
        let posts = (0..total)
            .map(|i| {
                let n = i as u64;
                RawObservation {
                    channel: Channel::Scraped,
                    raw_id: format!("urn:feed:post:{}", 100_000 + n),
                    author_name: Some(format!("Author {}", n % 17)),
                    text: Some(format!("Simulated post number {n}")),
                    timestamp: Some(now - Duration::hours(i as i64)),
                    like_count: (n * 7919) % 401,
                    comment_count: (n * 104_729) % 97,
                    share_count: (n * 1299_709) % 31,
                    is_promoted: n % 23 == 0,
                }
            })
            .collect();
        Self {
            state: Mutex::new(SimState {
                posts,
                revealed: reveal_per_step.min(total),
                position: 0,
            }),
            reveal_per_step,
            load_more_gate: None,
            gate_released: Mutex::new(false),
        }
    }

    /// Pause reveals at `gate` posts until load-more is clicked.
    pub fn with_load_more_gate(mut self, gate: usize) -> Self {
        self.load_more_gate = Some(gate);
        self
    }

    fn gate_open(&self, revealed: usize) -> bool {
        match self.load_more_gate {
            Some(gate) => revealed < gate || *self.gate_released.lock().unwrap_or_else(|e| e.into_inner()),
            None => true,
        }
    }
}

#[async_trait]
impl FeedSurface for SimFeed {
    async fn advance(&self, step_hint: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let size = state.revealed as u64 * POST_HEIGHT;
        state.position = state.position.saturating_add(step_hint).min(size);

        // Reaching the bottom of the revealed window loads the next one.
        if state.position >= size && self.gate_open(state.revealed) {
            state.revealed = (state.revealed + self.reveal_per_step).min(state.posts.len());
        }
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<RawObservation>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.posts[..state.revealed].to_vec())
    }

    async fn try_load_more(&self) -> Result<bool> {
        if self.load_more_gate.is_none() {
            return Ok(false);
        }
        let mut released = self.gate_released.lock().unwrap_or_else(|e| e.into_inner());
        if *released {
            return Ok(false);
        }
        *released = true;
        info!("load-more gate released");
        Ok(true)
    }

    async fn at_end(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.revealed == state.posts.len() && state.position >= state.revealed as u64 * POST_HEIGHT
    }

    async fn content_size(&self) -> u64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.revealed as u64 * POST_HEIGHT
    }

    async fn rewind(&self) -> Result<()> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).position = 0;
        Ok(())
    }
}

/// Renderer that records the applied ordering instead of touching a feed.
#[derive(Default)]
pub struct SimRenderer {
    applied: Mutex<Vec<ItemId>>,
}

impl SimRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied_order(&self) -> Vec<ItemId> {
        self.applied.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl FeedRenderer for SimRenderer {
    async fn apply(&self, plan: RenderPlan) -> Result<RenderReport> {
        let applied_count = plan.ordered_ids.len();
        *self.applied.lock().unwrap_or_else(|e| e.into_inner()) = plan.ordered_ids;
        Ok(RenderReport {
            success: true,
            applied_count,
            message: format!("applied {applied_count} items"),
        })
    }
}
