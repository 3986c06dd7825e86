// Test mocks for the collector loop.
//
// Three mocks matching the three trait boundaries:
// - MockSurface (FeedSurface) — scripted scans, sizes and load-more results
// - MockRenderer (FeedRenderer) — records the applied plan
// - MemorySessionStore (SessionStore) — in-memory snapshot slot
//
// Plus observation helpers for building scan batches.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use feedrank_common::{Channel, RawObservation, RenderPlan, RenderReport};

use crate::session::SessionSnapshot;
use crate::traits::{FeedRenderer, FeedSurface, SessionStore};

/// Full-record observation with only a like count, in the scrape channel.
pub fn observation(digits: &str, likes: u64) -> RawObservation {
    RawObservation {
        channel: Channel::Scraped,
        raw_id: format!("urn:feed:post:{digits}"),
        author_name: Some(format!("Author {digits}")),
        text: None,
        timestamp: None,
        like_count: likes,
        comment_count: 0,
        share_count: 0,
        is_promoted: false,
    }
}

pub enum ScanStep {
    Items(Vec<RawObservation>),
    Fail,
}

#[derive(Default)]
struct MockSurfaceState {
    scans: VecDeque<ScanStep>,
    sizes: VecDeque<u64>,
    last_size: u64,
    load_more: VecDeque<bool>,
    advances: u64,
    rewinds: u32,
    load_more_calls: u32,
    end_after_advances: Option<u64>,
}

/// Scripted surface. Scans pop from the script and fall back to empty;
/// container sizes pop from the script and fall back to steady growth so
/// stalls only happen when scripted.
#[derive(Default)]
pub struct MockSurface {
    state: Mutex<MockSurfaceState>,
}

impl MockSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan_items(self, items: Vec<RawObservation>) -> Self {
        self.state().scans.push_back(ScanStep::Items(items));
        self
    }

    pub fn scan_fail(self) -> Self {
        self.state().scans.push_back(ScanStep::Fail);
        self
    }

    pub fn sizes(self, sizes: &[u64]) -> Self {
        self.state().sizes.extend(sizes.iter().copied());
        self
    }

    pub fn load_more_results(self, results: &[bool]) -> Self {
        self.state().load_more.extend(results.iter().copied());
        self
    }

    pub fn end_after_advances(self, advances: u64) -> Self {
        self.state().end_after_advances = Some(advances);
        self
    }

    pub fn advances(&self) -> u64 {
        self.state().advances
    }

    pub fn rewinds(&self) -> u32 {
        self.state().rewinds
    }

    pub fn load_more_calls(&self) -> u32 {
        self.state().load_more_calls
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockSurfaceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl FeedSurface for MockSurface {
    async fn advance(&self, _step_hint: u64) -> Result<()> {
        self.state().advances += 1;
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<RawObservation>> {
        match self.state().scans.pop_front() {
            Some(ScanStep::Items(items)) => Ok(items),
            Some(ScanStep::Fail) => bail!("scripted scan failure"),
            None => Ok(Vec::new()),
        }
    }

    async fn try_load_more(&self) -> Result<bool> {
        let mut state = self.state();
        state.load_more_calls += 1;
        Ok(state.load_more.pop_front().unwrap_or(false))
    }

    async fn at_end(&self) -> bool {
        let state = self.state();
        match state.end_after_advances {
            Some(n) => state.advances >= n,
            None => false,
        }
    }

    async fn content_size(&self) -> u64 {
        let mut state = self.state();
        let size = match state.sizes.pop_front() {
            Some(size) => size,
            None => state.last_size + 100,
        };
        state.last_size = size;
        size
    }

    async fn rewind(&self) -> Result<()> {
        self.state().rewinds += 1;
        Ok(())
    }
}

/// Renderer that records the plan it was handed.
pub struct MockRenderer {
    succeed: bool,
    applied: Mutex<Option<RenderPlan>>,
}

impl MockRenderer {
    pub fn succeeding() -> Self {
        Self {
            succeed: true,
            applied: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            succeed: false,
            applied: Mutex::new(None),
        }
    }

    pub fn applied_plan(&self) -> Option<RenderPlan> {
        self.applied.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl FeedRenderer for MockRenderer {
    async fn apply(&self, plan: RenderPlan) -> Result<RenderReport> {
        let applied_count = plan.ordered_ids.len();
        *self.applied.lock().unwrap_or_else(|e| e.into_inner()) = Some(plan);
        if self.succeed {
            Ok(RenderReport {
                success: true,
                applied_count,
                message: "ok".to_string(),
            })
        } else {
            Ok(RenderReport {
                success: false,
                applied_count: 0,
                message: "feed container not found".to_string(),
            })
        }
    }
}

/// In-memory session store.
#[derive(Default)]
pub struct MemorySessionStore {
    snapshot: Mutex<Option<SessionSnapshot>>,
    saves: Mutex<u32>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saves(&self) -> u32 {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<SessionSnapshot>> {
        Ok(self.snapshot.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}
