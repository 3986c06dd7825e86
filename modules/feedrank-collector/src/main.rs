use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use feedrank_common::{Config, DateRange, SortKey, Target};
use feedrank_collector::controller::{CollectorSession, ControllerConfig};
use feedrank_collector::export;
use feedrank_collector::fuse::FusionStore;
use feedrank_collector::session::CollectionSession;
use feedrank_collector::simfeed::{SimFeed, SimRenderer};

/// Drive the collector against the simulated feed. Useful for eyeballing
/// the loop heuristics and the final ordering without a real surface.
#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .init();

    info!("feedrank collector starting against the simulated feed");

    let surface = Arc::new(SimFeed::new(120, 10).with_load_more_gate(60));
    let store = Arc::new(FusionStore::new());
    let controller_config = ControllerConfig::builder()
        .settle_ms(config.settle_ms.min(20))
        .load_more_settle_ms(40)
        .rewind_settle_ms(10)
        .build();
    let collector = CollectorSession::new(surface, store, controller_config);

    let mut session = CollectionSession::begin(
        SortKey::Engagement,
        Target::Count(25),
        config.default_mode,
        DateRange::default(),
    )?;

    let renderer = SimRenderer::new();
    let summary = collector.run(&mut session, &renderer).await?;

    info!(
        reason = %summary.collect.reason,
        fused = summary.collect.fused_count,
        rendered = summary.report.applied_count,
        "run finished"
    );
    for row in export::export_rows(&summary.items).iter().take(10) {
        info!(
            rank = row.rank,
            author = row.author.as_str(),
            likes = row.likes,
            comments = row.comments,
            shares = row.shares,
            "ranked item"
        );
    }

    Ok(())
}
