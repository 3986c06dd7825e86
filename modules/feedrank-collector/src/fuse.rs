//! Fusion store: one record per item id, merged under better-evidence rules.
//!
//! Two merge policies coexist on purpose. The replacement policy settles a
//! race between two complete observations of the same item — the higher
//! counter sum wins wholesale. The field-merge policy folds partial counter
//! corrections into a record whose descriptive fields are already trusted.
//! Neither policy ever lowers a counter.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use feedrank_common::{Item, ItemId};

/// What a single merge did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No record existed for the id.
    Inserted,
    /// Incoming record won the score race and replaced the stored one.
    Replaced,
    /// Counter correction applied (and possibly an author upgrade).
    CountersRaised,
    /// Stored record had equal or better evidence; nothing changed.
    KeptExisting,
    /// Correction for an id the store has never seen.
    UnknownId,
}

/// Per-batch tally of merge outcomes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub inserted: u32,
    pub replaced: u32,
    pub counters_raised: u32,
    pub kept_existing: u32,
    pub unknown_id: u32,
}

impl BatchSummary {
    fn record(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Inserted => self.inserted += 1,
            MergeOutcome::Replaced => self.replaced += 1,
            MergeOutcome::CountersRaised => self.counters_raised += 1,
            MergeOutcome::KeptExisting => self.kept_existing += 1,
            MergeOutcome::UnknownId => self.unknown_id += 1,
        }
    }

    pub fn changed(&self) -> u32 {
        self.inserted + self.replaced + self.counters_raised
    }
}

/// The fused item map. The interior mutex serializes controller-driven
/// merges against externally delivered channel batches — the replacement
/// policy is not commutative under interleaving, so batch entry points
/// hold the lock for the whole batch.
#[derive(Default)]
pub struct FusionStore {
    items: Mutex<HashMap<ItemId, Item>>,
}

impl FusionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get(&self, id: &ItemId) -> Option<Item> {
        self.lock().get(id).cloned()
    }

    /// All fused records, in unspecified order.
    pub fn snapshot(&self) -> Vec<Item> {
        self.lock().values().cloned().collect()
    }

    /// Explicit reset. Collection runs otherwise augment prior contents.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Replacement policy for one complete record.
    pub fn merge_replace(&self, incoming: Item) -> MergeOutcome {
        Self::replace_locked(&mut self.lock(), incoming)
    }

    /// Replacement policy for a batch, under one lock acquisition.
    pub fn merge_replace_batch(&self, records: Vec<Item>) -> BatchSummary {
        let mut items = self.lock();
        let mut summary = BatchSummary::default();
        for record in records {
            summary.record(Self::replace_locked(&mut items, record));
        }
        summary
    }

    /// Field-merge policy for one partial correction.
    pub fn merge_counters(&self, update: Item) -> MergeOutcome {
        Self::counters_locked(&mut self.lock(), update)
    }

    /// Field-merge policy for a batch, under one lock acquisition.
    pub fn merge_counters_batch(&self, updates: Vec<Item>) -> BatchSummary {
        let mut items = self.lock();
        let mut summary = BatchSummary::default();
        for update in updates {
            summary.record(Self::counters_locked(&mut items, update));
        }
        summary
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ItemId, Item>> {
        // A poisoned store only happens if a merge panicked; the map itself
        // is still coherent (each merge is all-or-nothing on one entry).
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn replace_locked(items: &mut HashMap<ItemId, Item>, incoming: Item) -> MergeOutcome {
        match items.entry(incoming.id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(incoming);
                MergeOutcome::Inserted
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get();
                if incoming.score() <= existing.score() {
                    debug!(
                        id = %incoming.id,
                        incoming_score = incoming.score(),
                        existing_score = existing.score(),
                        "replacement rejected"
                    );
                    return MergeOutcome::KeptExisting;
                }
                // The record travels wholesale, but individual counters
                // never move backwards even when the winner has one stale
                // counter among fresher ones.
                let mut winner = incoming;
                winner.like_count = winner.like_count.max(existing.like_count);
                winner.comment_count = winner.comment_count.max(existing.comment_count);
                winner.share_count = winner.share_count.max(existing.share_count);
                slot.insert(winner);
                MergeOutcome::Replaced
            }
        }
    }

    fn counters_locked(items: &mut HashMap<ItemId, Item>, update: Item) -> MergeOutcome {
        let Some(existing) = items.get_mut(&update.id) else {
            return MergeOutcome::UnknownId;
        };
        if update.score() <= existing.score() {
            return MergeOutcome::KeptExisting;
        }
        existing.like_count = existing.like_count.max(update.like_count);
        existing.comment_count = existing.comment_count.max(update.comment_count);
        existing.share_count = existing.share_count.max(update.share_count);
        if !existing.author_known() && update.author_known() {
            existing.author_name = update.author_name;
        }
        // Text and timestamp stay as stored: the correction channel is
        // trusted for counters, not for descriptive fields.
        MergeOutcome::CountersRaised
    }
}
