//! Circle records and the derived per-circle aggregates.
//!
//! A circle is a fixed-membership accountability group, optionally led by a
//! coach. The coach's own alignment record exists and is readable, but it
//! never enters an average, a percentile ranking, or a streak computation;
//! it surfaces only in the per-member display map.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::alignment::AlignmentScore;

/// A day is kept when at least half the non-coach members were fully aligned.
pub const KEPT_THRESHOLD: f64 = 0.5;

/// Backstop staleness bound for [`CachedStats`], independent of the day
/// boundary. Explicit invalidation is the primary path; this only bounds the
/// window after a missed invalidation call.
pub const STATS_CACHE_TTL_SECS: i64 = 5 * 60;

// ─── Circle ──────────────────────────────────────────────────────────────────

/// Circle membership and metadata. Owned externally; this engine treats it as
/// read-mostly and writes only the [`CachedStats`] entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Circle {
  pub circle_id:    Uuid,
  pub name:         String,
  pub coach_id:     Option<Uuid>,
  /// Denormalized copy of the member id list, kept for display. Aggregation
  /// always resolves membership fresh from the membership records instead.
  pub member_ids:   Vec<Uuid>,
  pub created_at:   DateTime<Utc>,
  pub cached_stats: Option<CachedStats>,
}

// ─── Stats cache entry ───────────────────────────────────────────────────────

/// One member's row in the display map: today's score plus the per-user
/// streak. This is the one place member and coach ids mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberAlignment {
  pub alignment_score: AlignmentScore,
  pub current_streak:  u32,
}

/// The cache fields stored on a circle. Written and cleared as a unit: a hit
/// requires every field present and both freshness factors to hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedStats {
  pub avg_alignment:     u32,
  pub alignment_change:  i32,
  pub member_alignments: BTreeMap<Uuid, MemberAlignment>,
  /// Day the entry was computed on; an entry from yesterday is never served.
  pub cached_at:         NaiveDate,
  /// Instant the entry was computed at, for the TTL backstop.
  pub cached_at_ts:      DateTime<Utc>,
}

impl CachedStats {
  /// Both freshness factors must hold: computed today, and within the TTL.
  pub fn is_fresh(&self, today: NaiveDate, now: DateTime<Utc>) -> bool {
    self.cached_at == today
      && now - self.cached_at_ts <= Duration::seconds(STATS_CACHE_TTL_SECS)
  }
}

// ─── Derived aggregates ──────────────────────────────────────────────────────

/// One record per (circle, date): how the circle did that day.
///
/// Once the date is strictly in the past this record is write-once — computed
/// lazily on first access, then treated as immutable truth. The current day's
/// record is always recomputed, never trusted from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleAlignmentDay {
  pub circle_id:              Uuid,
  pub date:                   NaiveDate,
  pub fraction_fully_aligned: f64,
  pub num_fully_aligned:      u32,
  /// Member count excluding the coach.
  pub total_members:          u32,
  pub kept:                   bool,
}

/// One record per circle: the consecutive-kept-days streak.
/// Mutated at most once per calendar day per circle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircleAlignmentSummary {
  pub circle_id:      Uuid,
  pub current_streak: u32,
  pub last_kept_date: Option<NaiveDate>,
}

impl CircleAlignmentSummary {
  pub fn empty(circle_id: Uuid) -> Self {
    Self { circle_id, current_streak: 0, last_kept_date: None }
  }
}
