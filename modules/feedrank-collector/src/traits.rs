// Trait abstractions for the collector's collaborators.
//
// FeedSurface — the advance/scan capability over whatever actually hosts
//   the feed (a driven browser page, a simulation, a test script).
// FeedRenderer — applies a finished ordering back to the feed.
// SessionStore — external key-value persistence for session state, the
//   sole source of truth across process restarts.
//
// These enable deterministic testing with MockSurface, MockRenderer and
// MemorySessionStore: no browser, no real clock pressure.

use anyhow::Result;
use async_trait::async_trait;

use feedrank_common::{RawObservation, RenderPlan, RenderReport};

use crate::session::SessionSnapshot;

#[async_trait]
pub trait FeedSurface: Send + Sync {
    /// Advance the feed by roughly `step_hint` units. Surfaces clamp the
    /// hint to whatever they can actually do; `u64::MAX` means "jump to
    /// the current end".
    async fn advance(&self, step_hint: u64) -> Result<()>;

    /// Enumerate currently visible items. Cheap, synchronous on the
    /// surface side; called at least twice per controller step.
    async fn scan(&self) -> Result<Vec<RawObservation>>;

    /// Attempt a semantically-recognized "load more" action. `false` when
    /// no such control is available right now.
    async fn try_load_more(&self) -> Result<bool>;

    /// Whether the surface has revealed everything it currently has.
    async fn at_end(&self) -> bool;

    /// Size of the content container, used for stall detection.
    async fn content_size(&self) -> u64;

    /// Jump back to the start of the feed.
    async fn rewind(&self) -> Result<()>;
}

#[async_trait]
pub trait FeedRenderer: Send + Sync {
    /// Apply the ordering. Items the renderer cannot locate are built from
    /// the plan's fallback data. Reported failure is terminal — the
    /// collector never retries a render.
    async fn apply(&self, plan: RenderPlan) -> Result<RenderReport>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> Result<Option<SessionSnapshot>>;
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<()>;
}
