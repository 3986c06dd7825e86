//! Collection session lifecycle.
//!
//! `Idle → Collecting → (Stopped | Completed) → Idle`. The session owns the
//! run parameters and the phase; the fused data itself lives in the
//! `FusionStore`. Snapshots round-trip through the external `SessionStore`
//! so a run interrupted by a restart can resume where it left off.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use feedrank_common::{CollectError, CollectionMode, DateRange, SortKey, Target};

/// Extra items collected beyond the requested count. The renderer rejects
/// placeholder entries it cannot materialize, so the collector overshoots
/// to keep the delivered count at the requested size.
pub const TARGET_BUFFER: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Collecting,
    Stopped,
    Completed,
}

/// Serializable session state, the unit of external persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub run_id: Uuid,
    pub phase: SessionPhase,
    pub requested: Target,
    pub target: Target,
    pub sort_key: SortKey,
    pub mode: CollectionMode,
    pub date_range: DateRange,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CollectionSession {
    run_id: Uuid,
    phase: SessionPhase,
    /// User-facing count; what progress is reported against.
    requested: Target,
    /// Collection target including the overshoot buffer.
    target: Target,
    sort_key: SortKey,
    mode: CollectionMode,
    date_range: DateRange,
    started_at: DateTime<Utc>,
}

impl CollectionSession {
    /// Start a session. Fails on a non-positive bounded target — the one
    /// configuration error that propagates to the caller.
    pub fn begin(
        sort_key: SortKey,
        requested: Target,
        mode: CollectionMode,
        date_range: DateRange,
    ) -> Result<Self, CollectError> {
        let target = match requested {
            Target::Count(0) => {
                return Err(CollectError::InvalidConfig(
                    "target size must be positive".to_string(),
                ));
            }
            Target::Count(n) => Target::Count(n + TARGET_BUFFER),
            Target::All => Target::All,
        };
        Ok(Self {
            run_id: Uuid::new_v4(),
            phase: SessionPhase::Collecting,
            requested,
            target,
            sort_key,
            mode,
            date_range,
            started_at: Utc::now(),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_collecting(&self) -> bool {
        self.phase == SessionPhase::Collecting
    }

    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    pub fn mode(&self) -> CollectionMode {
        self.mode
    }

    pub fn date_range(&self) -> DateRange {
        self.date_range
    }

    /// The user-facing count.
    pub fn requested(&self) -> Target {
        self.requested
    }

    /// The buffered collection target the controller drives toward.
    pub fn target(&self) -> Target {
        self.target
    }

    /// Progress as shown to the caller: capped at the requested count for
    /// bounded runs so the overshoot buffer stays invisible.
    pub fn progress(&self, fused_count: usize) -> usize {
        match self.requested {
            Target::Count(n) => fused_count.min(n),
            Target::All => fused_count,
        }
    }

    /// Whether the fused count satisfies the buffered target.
    pub fn target_met(&self, fused_count: usize) -> bool {
        match self.target {
            Target::Count(n) => fused_count >= n,
            Target::All => false,
        }
    }

    /// Automatic completion, or an external "stop and sort now".
    pub fn note_completed(&mut self) {
        self.phase = SessionPhase::Completed;
    }

    pub fn note_stopped(&mut self) {
        self.phase = SessionPhase::Stopped;
    }

    /// Terminal states fold back to idle; collecting runs must stop first.
    pub fn reset(&mut self) -> Result<(), CollectError> {
        if self.is_collecting() {
            return Err(CollectError::AlreadyCollecting);
        }
        self.phase = SessionPhase::Idle;
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            run_id: self.run_id,
            phase: self.phase,
            requested: self.requested,
            target: self.target,
            sort_key: self.sort_key,
            mode: self.mode,
            date_range: self.date_range,
            started_at: self.started_at,
        }
    }

    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            run_id: snapshot.run_id,
            phase: snapshot.phase,
            requested: snapshot.requested,
            target: snapshot.target,
            sort_key: snapshot.sort_key,
            mode: snapshot.mode,
            date_range: snapshot.date_range,
            started_at: snapshot.started_at,
        }
    }
}
