//! The collection loop.
//!
//! One controller drives any `FeedSurface`: advance a bounded step, wait a
//! fixed settle delay, scan twice (content inserts asynchronously), merge
//! into the fusion store, and decide whether to keep going. Termination is
//! guaranteed by three independent brakes: the no-progress counter, the
//! end-of-content check, and a hard iteration cap. All waits are fixed
//! settle delays — the loop tolerates variable rendering latency without
//! adapting to it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use typed_builder::TypedBuilder;

use feedrank_common::{
    ranking, CollectError, CollectionMode, DateRange, Item, ItemId, RenderPlan, RenderReport,
    Target,
};

use crate::fuse::FusionStore;
use crate::session::{CollectionSession, SessionPhase};
use crate::stats::CollectStats;
use crate::traits::{FeedRenderer, FeedSurface, SessionStore};

/// Tuning for one collection run. Defaults match the profile-feed step
/// profile; `main_feed()` jumps straight to the container end each step.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ControllerConfig {
    /// Advance distance per step. `u64::MAX` = jump to current end.
    #[builder(default = 800)]
    pub step_hint: u64,
    /// Settle delay between advance and re-scan, in milliseconds.
    #[builder(default = 600)]
    pub settle_ms: u64,
    /// Longer settle after a load-more click.
    #[builder(default = 2000)]
    pub load_more_settle_ms: u64,
    /// Settle after a rewind to the feed start.
    #[builder(default = 500)]
    pub rewind_settle_ms: u64,
    /// Consecutive unchanged-container iterations before trying load-more.
    #[builder(default = 4)]
    pub max_stall: u32,
    /// Consecutive no-new-items iterations before giving up.
    #[builder(default = 8)]
    pub max_no_progress: u32,
    /// Lifetime cap on load-more attempts; a dead control stays dead.
    #[builder(default = 3)]
    pub max_load_more: u32,
    /// Hard cap guaranteeing termination when no other heuristic fires.
    #[builder(default = 60)]
    pub max_iterations: u32,
}

impl ControllerConfig {
    /// Profile-feed step profile: short steps, quick settles.
    pub fn profile() -> Self {
        Self::builder().build()
    }

    /// Main-feed step profile: jump to the container end and give the
    /// feed longer to backfill.
    pub fn main_feed() -> Self {
        Self::builder().step_hint(u64::MAX).settle_ms(3000).build()
    }
}

/// Why a collection run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Fused count reached the buffered target.
    TargetReached,
    /// No new items across the no-progress threshold.
    NoProgress,
    /// Surface reported the end twice (after one rewind pass).
    EndOfContent,
    /// External stop signal.
    Stopped,
    /// Hard iteration cap.
    IterationCap,
    /// Date window fully traversed.
    DateBoundary,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::TargetReached => write!(f, "target reached"),
            StopReason::NoProgress => write!(f, "no progress"),
            StopReason::EndOfContent => write!(f, "end of content"),
            StopReason::Stopped => write!(f, "stopped"),
            StopReason::IterationCap => write!(f, "iteration cap"),
            StopReason::DateBoundary => write!(f, "date boundary"),
        }
    }
}

/// Outcome of the collection phase. A fused count below a bounded request
/// is a normal partial result, reported, never silently absorbed.
#[derive(Debug, Clone)]
pub struct CollectResult {
    pub reason: StopReason,
    pub fused_count: usize,
    pub requested: Target,
    pub stats: CollectStats,
}

impl CollectResult {
    /// How far short of the request the run fell, if at all.
    pub fn shortfall(&self) -> Option<usize> {
        match self.requested {
            Target::Count(n) if self.fused_count < n => Some(n - self.fused_count),
            _ => None,
        }
    }
}

/// Collection plus the rendered ordering.
#[derive(Debug)]
pub struct RunSummary {
    pub collect: CollectResult,
    pub items: Vec<Item>,
    pub report: RenderReport,
}

/// Cooperative cancellation handle. Polled at iteration boundaries; the
/// in-flight iteration always completes before the run winds down.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// One collection run's worth of controller state plus its collaborators.
/// Instantiated per run target; never a process-wide singleton.
pub struct CollectorSession {
    surface: Arc<dyn FeedSurface>,
    store: Arc<FusionStore>,
    config: ControllerConfig,
    session_store: Option<Arc<dyn SessionStore>>,
    active: AtomicBool,
    stop_flag: Arc<AtomicBool>,
}

impl CollectorSession {
    pub fn new(surface: Arc<dyn FeedSurface>, store: Arc<FusionStore>, config: ControllerConfig) -> Self {
        Self {
            surface,
            store,
            config,
            session_store: None,
            active: AtomicBool::new(false),
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Persist session state through `store` at run boundaries.
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    pub fn store(&self) -> &Arc<FusionStore> {
        &self.store
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop_flag))
    }

    /// Run the collection loop to termination. Re-entrant calls fail fast
    /// while a run is in flight.
    pub async fn collect(
        &self,
        session: &mut CollectionSession,
    ) -> Result<CollectResult, CollectError> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(CollectError::AlreadyCollecting);
        }
        let result = self.collect_inner(session).await;
        self.active.store(false, Ordering::SeqCst);
        result
    }

    async fn collect_inner(
        &self,
        session: &mut CollectionSession,
    ) -> Result<CollectResult, CollectError> {
        self.persist(session).await;
        info!(
            run_id = %session.run_id(),
            target = %session.target(),
            sort_key = %session.sort_key(),
            mode = %session.mode(),
            "collection starting"
        );

        let mut stats = CollectStats::default();
        // Prior runs may have left fused items behind; they count as found.
        let mut seen: HashSet<ItemId> =
            self.store.snapshot().into_iter().map(|i| i.id).collect();
        let mut stall = 0u32;
        let mut no_progress = 0u32;
        let mut load_more_attempts = 0u32;
        let mut last_content_size = 0u64;
        let mut last_fused = self.store.len();
        let mut rewound = false;

        let reason = loop {
            if stats.iterations >= self.config.max_iterations {
                break StopReason::IterationCap;
            }
            if self.stop_flag.load(Ordering::SeqCst) {
                break StopReason::Stopped;
            }
            stats.iterations += 1;

            self.scan_and_merge(session.mode(), &mut seen, &mut stats).await;

            if session.target_met(self.store.len()) {
                break StopReason::TargetReached;
            }
            if self.date_boundary_reached(session.date_range()) {
                break StopReason::DateBoundary;
            }

            if let Err(e) = self.surface.advance(self.config.step_hint).await {
                warn!(error = %e, "advance failed, continuing");
            }
            // Double scan per step: content inserts asynchronously and the
            // first settle can land mid-render.
            for _ in 0..2 {
                self.settle(self.config.settle_ms).await;
                self.scan_and_merge(session.mode(), &mut seen, &mut stats).await;
            }

            let content_size = self.surface.content_size().await;
            if content_size == last_content_size {
                stall += 1;
                if stall >= self.config.max_stall && load_more_attempts < self.config.max_load_more
                {
                    match self.surface.try_load_more().await {
                        Ok(true) => {
                            load_more_attempts += 1;
                            stall = 0;
                            stats.load_more_clicks += 1;
                            self.settle(self.config.load_more_settle_ms).await;
                            self.scan_and_merge(session.mode(), &mut seen, &mut stats).await;
                        }
                        // No control available — keep scrolling regardless.
                        Ok(false) => {}
                        Err(e) => warn!(error = %e, "load-more attempt failed"),
                    }
                }
            } else {
                stall = 0;
                last_content_size = content_size;
            }

            let fused = self.store.len();
            if fused > last_fused {
                no_progress = 0;
                last_fused = fused;
            } else {
                no_progress += 1;
                if no_progress >= self.config.max_no_progress {
                    break StopReason::NoProgress;
                }
            }

            if self.surface.at_end().await {
                if rewound {
                    break StopReason::EndOfContent;
                }
                // One pass back to the start catches items that rendered
                // out of viewport order on the way down.
                rewound = true;
                stats.rewinds += 1;
                if let Err(e) = self.surface.rewind().await {
                    warn!(error = %e, "rewind failed");
                    break StopReason::EndOfContent;
                }
                self.settle(self.config.rewind_settle_ms).await;
                self.scan_and_merge(session.mode(), &mut seen, &mut stats).await;
            }
        };

        let fused_count = self.store.len();
        match reason {
            StopReason::Stopped => session.note_stopped(),
            _ => session.note_completed(),
        }
        self.persist(session).await;

        let result = CollectResult {
            reason,
            fused_count,
            requested: session.requested(),
            stats,
        };
        if let Some(short) = result.shortfall() {
            info!(
                reason = %reason,
                fused = fused_count,
                requested = %result.requested,
                short,
                "collection ended with a partial result"
            );
        } else {
            info!(reason = %reason, fused = fused_count, "collection ended");
        }
        info!("{}", result.stats);
        Ok(result)
    }

    /// One scan pass. Scan failures and unparseable observations are
    /// local: the iteration just sees zero new items.
    async fn scan_and_merge(
        &self,
        mode: CollectionMode,
        seen: &mut HashSet<ItemId>,
        stats: &mut CollectStats,
    ) {
        if mode == CollectionMode::Lite {
            return;
        }
        let observations = match self.surface.scan().await {
            Ok(o) => o,
            Err(e) => {
                warn!(error = %e, "scan failed, treating as empty");
                stats.failed_scans += 1;
                return;
            }
        };
        stats.scans += 1;

        let mut records = Vec::new();
        for observation in observations {
            let Some(item) = observation.normalize() else {
                stats.normalization_skips += 1;
                continue;
            };
            if seen.insert(item.id.clone()) {
                stats.observed += 1;
            }
            records.push(item);
        }
        if records.is_empty() {
            return;
        }

        let summary = if mode == CollectionMode::Precision {
            // Full-record path: scans compete with structured records in
            // the score race and may introduce new items.
            self.store.merge_replace_batch(records)
        } else {
            // Correction path: counters only, and a zero-engagement scan
            // can never win the score race anyway.
            self.store.merge_counters_batch(
                records.into_iter().filter(Item::has_engagement).collect(),
            )
        };
        stats.absorb(&summary);
    }

    /// With a lower-bounded date window over a reverse-chronological feed,
    /// seeing items on both sides of the bound means the window has been
    /// fully traversed.
    fn date_boundary_reached(&self, range: DateRange) -> bool {
        let Some(from) = range.from else { return false };
        let mut in_range = false;
        let mut older = false;
        for item in self.store.snapshot() {
            match item.timestamp {
                Some(ts) if ts >= from => in_range = true,
                Some(_) => older = true,
                None => {}
            }
            if in_range && older {
                return true;
            }
        }
        false
    }

    /// Rank, filter and trim the fused snapshot for this session. Items
    /// with no author and no engagement are scan shells — dropped.
    pub fn ranked_result(&self, session: &CollectionSession) -> Vec<Item> {
        let items: Vec<Item> = self
            .store
            .snapshot()
            .into_iter()
            .filter(|i| i.author_known() || i.like_count > 0 || i.comment_count > 0)
            .collect();
        let items = ranking::apply_range(items, session.date_range());
        let ranked = ranking::rank(items, session.sort_key());
        ranking::trim(ranked, session.requested())
    }

    /// Hand the ordering to the render collaborator. A reported failure is
    /// terminal; the collector never retries a render.
    pub async fn render(
        &self,
        items: &[Item],
        renderer: &dyn FeedRenderer,
    ) -> Result<RenderReport, CollectError> {
        let plan = RenderPlan::new(items);
        let report = renderer
            .apply(plan)
            .await
            .map_err(|e| CollectError::RenderFailed(e.to_string()))?;
        if !report.success {
            return Err(CollectError::RenderFailed(report.message.clone()));
        }
        info!(applied = report.applied_count, "feed reordered");
        Ok(report)
    }

    /// Collect, rank and render in one go.
    pub async fn run(
        &self,
        session: &mut CollectionSession,
        renderer: &dyn FeedRenderer,
    ) -> Result<RunSummary, CollectError> {
        let collect = self.collect(session).await?;
        let items = self.ranked_result(session);
        let report = self.render(&items, renderer).await?;
        Ok(RunSummary {
            collect,
            items,
            report,
        })
    }

    async fn settle(&self, ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    async fn persist(&self, session: &CollectionSession) {
        if let Some(store) = &self.session_store {
            if let Err(e) = store.save(&session.snapshot()).await {
                warn!(error = %e, "failed to persist session state");
            }
        }
    }
}

/// Re-hydrate a session that was mid-collection when the process died.
pub async fn resume_session(
    store: &dyn SessionStore,
) -> Result<Option<CollectionSession>, CollectError> {
    let snapshot = store
        .load()
        .await
        .map_err(|e| CollectError::SessionStore(e.to_string()))?;
    Ok(snapshot
        .filter(|s| s.phase == SessionPhase::Collecting)
        .map(CollectionSession::from_snapshot))
}
