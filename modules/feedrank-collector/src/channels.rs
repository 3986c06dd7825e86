//! Ingest entry points for the two observation channels.
//!
//! The structured channel delivers full parsed records (or raw envelopes)
//! and goes through the replacement policy; the scrape channel delivers
//! partial counter corrections and goes through the field-merge policy.
//! A malformed batch is dropped whole — collection continues on whatever
//! is already fused.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use feedrank_common::{decode_envelope, CollectError, Item, RawObservation};

use crate::fuse::{BatchSummary, FusionStore};

/// Channel facade over one fusion store. Clone-cheap; every entry point
/// takes the store lock once per batch.
#[derive(Clone)]
pub struct Channels {
    store: Arc<FusionStore>,
}

impl Channels {
    pub fn new(store: Arc<FusionStore>) -> Self {
        Self { store }
    }

    /// Structured-data channel: a raw envelope straight off the wire.
    /// Decode, normalize, then merge under the replacement policy.
    pub fn ingest_envelope(&self, envelope: &Value) -> Result<BatchSummary, CollectError> {
        if !envelope.is_object() {
            return Err(CollectError::ChannelFailure(
                "structured payload is not an object".to_string(),
            ));
        }
        let observations = decode_envelope(envelope);
        debug!(observations = observations.len(), "envelope decoded");
        Ok(self.ingest_batch(normalize_all(observations)))
    }

    /// Structured-data channel: already-parsed full records.
    pub fn ingest_batch(&self, records: Vec<Item>) -> BatchSummary {
        let summary = self.store.merge_replace_batch(records);
        debug!(
            inserted = summary.inserted,
            replaced = summary.replaced,
            kept = summary.kept_existing,
            "structured batch merged"
        );
        summary
    }

    /// Scrape channel: partial field corrections. Updates for ids the
    /// store has never seen are counted but never inserted.
    pub fn ingest_corrections(&self, updates: Vec<RawObservation>) -> BatchSummary {
        let summary = self.store.merge_counters_batch(normalize_all(updates));
        if summary.unknown_id > 0 {
            warn!(unknown = summary.unknown_id, "corrections for unknown items dropped");
        }
        summary
    }
}

fn normalize_all(observations: Vec<RawObservation>) -> Vec<Item> {
    observations
        .into_iter()
        .filter_map(|o| o.normalize())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedrank_common::{Channel, ItemId};
    use serde_json::json;

    fn correction(digits: &str, likes: u64) -> RawObservation {
        RawObservation {
            channel: Channel::Scraped,
            raw_id: format!("post:{digits}"),
            author_name: None,
            text: None,
            timestamp: None,
            like_count: likes,
            comment_count: 0,
            share_count: 0,
            is_promoted: false,
        }
    }

    #[test]
    fn envelope_batches_apply_the_replacement_policy() {
        let store = Arc::new(FusionStore::new());
        let channels = Channels::new(Arc::clone(&store));

        let first = json!({
            "elements": ["post:1"],
            "included": [{"kind": "engagement_counts", "ref": "post:1", "likes": 3}]
        });
        let second = json!({
            "elements": ["post:1"],
            "included": [{"kind": "engagement_counts", "ref": "post:1", "likes": 1}]
        });
        channels.ingest_envelope(&first).unwrap();
        channels.ingest_envelope(&second).unwrap();

        let fused = store.get(&ItemId::normalize("post:1").unwrap()).unwrap();
        assert_eq!(fused.like_count, 3);
    }

    #[test]
    fn malformed_envelope_is_dropped_whole() {
        let store = Arc::new(FusionStore::new());
        let channels = Channels::new(Arc::clone(&store));
        let err = channels.ingest_envelope(&json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, CollectError::ChannelFailure(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn corrections_field_merge_without_inserting() {
        let store = Arc::new(FusionStore::new());
        let channels = Channels::new(Arc::clone(&store));

        let mut stored = Item::new(ItemId::normalize("post:2").unwrap());
        stored.like_count = 2;
        channels.ingest_batch(vec![stored]);

        let summary =
            channels.ingest_corrections(vec![correction("2", 7), correction("404", 50)]);
        assert_eq!(summary.counters_raised, 1);
        assert_eq!(summary.unknown_id, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&ItemId::normalize("post:2").unwrap()).unwrap().like_count, 7);
    }

    #[test]
    fn unparseable_ids_are_skipped_not_fatal() {
        let store = Arc::new(FusionStore::new());
        let channels = Channels::new(Arc::clone(&store));
        let summary = channels.ingest_corrections(vec![correction("no-digits", 1)]);
        assert_eq!(summary, BatchSummary::default());
    }
}
