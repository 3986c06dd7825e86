//! Collection-loop scenarios driven by the scripted surface.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use feedrank_common::{
    CollectError, CollectionMode, DateRange, RawObservation, SortKey, Target,
};
use feedrank_collector::channels::Channels;
use feedrank_collector::controller::{
    CollectorSession, ControllerConfig, StopHandle, StopReason,
};
use feedrank_collector::fuse::FusionStore;
use feedrank_collector::session::{CollectionSession, SessionPhase};
use feedrank_collector::testing::{observation, MockSurface};
use feedrank_collector::traits::FeedSurface;

/// Zero-delay config so scenarios run at full speed.
fn fast() -> ControllerConfig {
    ControllerConfig::builder()
        .settle_ms(0)
        .load_more_settle_ms(0)
        .rewind_settle_ms(0)
        .build()
}

fn session(requested: Target, mode: CollectionMode) -> CollectionSession {
    CollectionSession::begin(SortKey::Likes, requested, mode, DateRange::default()).unwrap()
}

#[tokio::test]
async fn no_progress_ends_with_partial_overshoot_reported() {
    // Three scans of two fresh items each, then silence: the run must end
    // through the no-progress brake with all six items fused.
    let surface = MockSurface::new()
        .scan_items(vec![observation("1", 1), observation("2", 2)])
        .scan_items(vec![observation("3", 3), observation("4", 4)])
        .scan_items(vec![observation("5", 5), observation("6", 6)]);
    let collector = CollectorSession::new(
        Arc::new(surface),
        Arc::new(FusionStore::new()),
        fast(),
    );
    let mut session = session(Target::Count(5), CollectionMode::Precision);

    let result = collector.collect(&mut session).await.unwrap();

    assert_eq!(result.reason, StopReason::NoProgress);
    assert_eq!(result.fused_count, 6);
    assert_eq!(result.requested, Target::Count(5));
    assert_eq!(result.shortfall(), None);
    assert_eq!(session.phase(), SessionPhase::Completed);
    assert_eq!(session.progress(result.fused_count), 5);
}

#[tokio::test]
async fn bounded_target_terminates_the_loop() {
    let batch = |base: u64| -> Vec<RawObservation> {
        (0..6).map(|i| observation(&format!("{}", base + i), base + i)).collect()
    };
    let surface = MockSurface::new()
        .scan_items(batch(10))
        .scan_items(batch(20))
        .scan_items(batch(30));
    let collector = CollectorSession::new(
        Arc::new(surface),
        Arc::new(FusionStore::new()),
        fast(),
    );
    let mut session = session(Target::Count(5), CollectionMode::Precision);

    let result = collector.collect(&mut session).await.unwrap();

    // Buffered target is 16; three batches of six satisfy it.
    assert_eq!(result.reason, StopReason::TargetReached);
    assert!(result.fused_count >= 16);
    assert_eq!(session.phase(), SessionPhase::Completed);
}

#[tokio::test]
async fn stalled_container_triggers_one_bounded_load_more() {
    let surface = Arc::new(
        MockSurface::new()
            .sizes(&[500, 500, 500, 500, 500, 500, 500, 500])
            .load_more_results(&[true, true, true]),
    );
    let config = ControllerConfig::builder()
        .settle_ms(0)
        .load_more_settle_ms(0)
        .rewind_settle_ms(0)
        .max_stall(2)
        .max_load_more(1)
        .build();
    let collector = CollectorSession::new(
        Arc::clone(&surface) as Arc<dyn FeedSurface>,
        Arc::new(FusionStore::new()),
        config,
    );
    let mut session = session(Target::Count(5), CollectionMode::Precision);

    let result = collector.collect(&mut session).await.unwrap();

    // The control was clicked exactly once despite repeated stalls, and
    // the empty feed still drained through the no-progress brake.
    assert_eq!(result.reason, StopReason::NoProgress);
    assert_eq!(result.stats.load_more_clicks, 1);
    assert_eq!(surface.load_more_calls(), 1);
}

#[tokio::test]
async fn unavailable_load_more_keeps_scrolling() {
    let surface = Arc::new(
        MockSurface::new().sizes(&[300, 300, 300, 300, 300, 300, 300, 300]),
    );
    let config = ControllerConfig::builder()
        .settle_ms(0)
        .load_more_settle_ms(0)
        .rewind_settle_ms(0)
        .max_stall(2)
        .build();
    let collector = CollectorSession::new(
        Arc::clone(&surface) as Arc<dyn FeedSurface>,
        Arc::new(FusionStore::new()),
        config,
    );
    let mut session = session(Target::Count(5), CollectionMode::Precision);

    let result = collector.collect(&mut session).await.unwrap();

    assert_eq!(result.reason, StopReason::NoProgress);
    assert_eq!(result.stats.load_more_clicks, 0);
    assert!(surface.load_more_calls() >= 1);
    assert!(surface.advances() > 0);
}

#[tokio::test]
async fn end_of_content_rewinds_once_then_terminates() {
    let surface = Arc::new(MockSurface::new().end_after_advances(1));
    let collector = CollectorSession::new(
        Arc::clone(&surface) as Arc<dyn FeedSurface>,
        Arc::new(FusionStore::new()),
        fast(),
    );
    let mut session = session(Target::Count(5), CollectionMode::Precision);

    let result = collector.collect(&mut session).await.unwrap();

    assert_eq!(result.reason, StopReason::EndOfContent);
    assert_eq!(surface.rewinds(), 1);
    assert_eq!(result.stats.rewinds, 1);
}

#[tokio::test]
async fn iteration_cap_guarantees_termination() {
    // Every scan finds a fresh item, so neither the target (unbounded)
    // nor the no-progress brake ever fires.
    let mut surface = MockSurface::new();
    for i in 0..100 {
        surface = surface.scan_items(vec![observation(&format!("{i}"), i)]);
    }
    let config = ControllerConfig::builder()
        .settle_ms(0)
        .load_more_settle_ms(0)
        .rewind_settle_ms(0)
        .max_iterations(3)
        .build();
    let collector =
        CollectorSession::new(Arc::new(surface), Arc::new(FusionStore::new()), config);
    let mut session = session(Target::All, CollectionMode::Precision);

    let result = collector.collect(&mut session).await.unwrap();

    assert_eq!(result.reason, StopReason::IterationCap);
    assert_eq!(result.stats.iterations, 3);
}

#[tokio::test]
async fn scan_failures_count_as_zero_progress() {
    let surface = MockSurface::new()
        .scan_fail()
        .scan_fail()
        .scan_fail();
    let collector = CollectorSession::new(
        Arc::new(surface),
        Arc::new(FusionStore::new()),
        fast(),
    );
    let mut session = session(Target::Count(5), CollectionMode::Precision);

    let result = collector.collect(&mut session).await.unwrap();

    assert_eq!(result.reason, StopReason::NoProgress);
    assert_eq!(result.fused_count, 0);
    assert_eq!(result.stats.failed_scans, 3);
    assert_eq!(result.shortfall(), Some(5));
}

#[tokio::test]
async fn lite_mode_never_consults_the_scrape_channel() {
    let store = Arc::new(FusionStore::new());
    let channels = Channels::new(Arc::clone(&store));
    // The structured channel alone satisfies the buffered target of 12.
    channels.ingest_batch((0..12).map(|i| observation(&format!("{i}"), i).normalize().unwrap()).collect());

    let surface = Arc::new(
        MockSurface::new().scan_items(vec![observation("999", 1)]),
    );
    let collector = CollectorSession::new(
        Arc::clone(&surface) as Arc<dyn FeedSurface>,
        Arc::clone(&store),
        fast(),
    );
    let mut session = session(Target::Count(1), CollectionMode::Lite);

    let result = collector.collect(&mut session).await.unwrap();

    assert_eq!(result.reason, StopReason::TargetReached);
    assert_eq!(result.stats.scans, 0);
    assert!(store.get(&feedrank_common::ItemId::normalize("post:999").unwrap()).is_none());
}

#[tokio::test]
async fn synced_mode_corrects_counters_without_inserting() {
    let store = Arc::new(FusionStore::new());
    let channels = Channels::new(Arc::clone(&store));
    channels.ingest_batch(vec![observation("1", 2).normalize().unwrap()]);

    let surface = MockSurface::new()
        .scan_items(vec![observation("1", 9), observation("777", 4)]);
    let collector = CollectorSession::new(Arc::new(surface), Arc::clone(&store), fast());
    let mut session = session(Target::Count(5), CollectionMode::Synced);

    let result = collector.collect(&mut session).await.unwrap();

    let known = store
        .get(&feedrank_common::ItemId::normalize("post:1").unwrap())
        .unwrap();
    assert_eq!(known.like_count, 9);
    assert!(store.get(&feedrank_common::ItemId::normalize("post:777").unwrap()).is_none());
    assert_eq!(result.fused_count, 1);
}

#[tokio::test]
async fn date_boundary_stops_a_windowed_run() {
    let from = chrono::DateTime::from_timestamp(1_000_000, 0).unwrap();
    let newer = {
        let mut o = observation("1", 1);
        o.timestamp = chrono::DateTime::from_timestamp(1_000_500, 0);
        o
    };
    let older = {
        let mut o = observation("2", 1);
        o.timestamp = chrono::DateTime::from_timestamp(999_000, 0);
        o
    };
    let surface = MockSurface::new().scan_items(vec![newer, older]);
    let collector = CollectorSession::new(
        Arc::new(surface),
        Arc::new(FusionStore::new()),
        fast(),
    );
    let mut session = CollectionSession::begin(
        SortKey::Likes,
        Target::All,
        CollectionMode::Precision,
        DateRange {
            from: Some(from),
            to: None,
        },
    )
    .unwrap();

    let result = collector.collect(&mut session).await.unwrap();

    assert_eq!(result.reason, StopReason::DateBoundary);
}

/// Surface that fires the stop signal from inside the first scan, proving
/// the in-flight iteration still completes before the run winds down.
struct StoppingSurface {
    inner: MockSurface,
    handle: Mutex<Option<StopHandle>>,
}

#[async_trait]
impl FeedSurface for StoppingSurface {
    async fn advance(&self, step_hint: u64) -> Result<()> {
        self.inner.advance(step_hint).await
    }

    async fn scan(&self) -> Result<Vec<RawObservation>> {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.stop();
        }
        self.inner.scan().await
    }

    async fn try_load_more(&self) -> Result<bool> {
        self.inner.try_load_more().await
    }

    async fn at_end(&self) -> bool {
        self.inner.at_end().await
    }

    async fn content_size(&self) -> u64 {
        self.inner.content_size().await
    }

    async fn rewind(&self) -> Result<()> {
        self.inner.rewind().await
    }
}

#[tokio::test]
async fn stop_signal_finishes_the_current_iteration() {
    let inner = MockSurface::new()
        .scan_items(vec![observation("1", 1)])
        .scan_items(vec![observation("2", 2)])
        .scan_items(vec![observation("3", 3)]);
    let surface = Arc::new(StoppingSurface {
        inner,
        handle: Mutex::new(None),
    });
    let store = Arc::new(FusionStore::new());
    let collector = CollectorSession::new(
        Arc::clone(&surface) as Arc<dyn FeedSurface>,
        Arc::clone(&store),
        fast(),
    );
    *surface.handle.lock().unwrap() = Some(collector.stop_handle());

    let mut session = session(Target::Count(50), CollectionMode::Precision);
    let result = collector.collect(&mut session).await.unwrap();

    // All three scans of iteration one landed before the stop took effect.
    assert_eq!(result.reason, StopReason::Stopped);
    assert_eq!(result.fused_count, 3);
    assert_eq!(session.phase(), SessionPhase::Stopped);
}

#[tokio::test]
async fn reentrant_collect_fails_fast() {
    let surface = Arc::new(MockSurface::new());
    let config = ControllerConfig::builder()
        .settle_ms(30)
        .load_more_settle_ms(0)
        .rewind_settle_ms(0)
        .build();
    let collector = Arc::new(CollectorSession::new(
        Arc::clone(&surface) as Arc<dyn FeedSurface>,
        Arc::new(FusionStore::new()),
        config,
    ));

    let background = Arc::clone(&collector);
    let first = tokio::spawn(async move {
        let mut session = session(Target::Count(5), CollectionMode::Precision);
        background.collect(&mut session).await
    });

    // Give the first run a moment to take the guard.
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let mut second_session = session(Target::Count(5), CollectionMode::Precision);
    let second = collector.collect(&mut second_session).await;
    assert!(matches!(second, Err(CollectError::AlreadyCollecting)));

    collector.stop_handle().stop();
    first.await.unwrap().unwrap();
}
