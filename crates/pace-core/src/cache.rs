//! The stats cache and the basic/full stats entry points.
//!
//! Basic stats (daily aggregator plus streak) sit behind a two-factor cache:
//! the entry must have been computed today AND within the last five minutes.
//! Explicit invalidation after any member's alignment write is the primary
//! freshness mechanism; the TTL is the backstop against missed calls.
//!
//! Full stats add the percentile and the contribution history. Both are
//! always computed on demand — there is no caching at that granularity.

use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  circle::{CachedStats, CircleAlignmentSummary, MemberAlignment},
  history::{contribution_history, ContributionDay},
  members,
  percentile::percentile,
  stats::daily_stats_with,
  store::AlignmentStore,
  streak::evaluate_streak_with,
};

/// The fast-path stats payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircleStats {
  pub avg_alignment:    u32,
  pub alignment_change: i32,
  pub members:          BTreeMap<Uuid, MemberAlignment>,
  /// Never served from the cache; always read fresh from the persisted
  /// circle summary (it has its own once-per-day write rule).
  pub streak:           CircleAlignmentSummary,
}

/// Basic stats plus the two expensive extras.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullCircleStats {
  #[serde(flatten)]
  pub stats:      CircleStats,
  /// "Top N%" standing among all circles, 1..=100.
  pub percentile: u8,
  pub history:    Vec<ContributionDay>,
}

// ─── Basic stats (cache-checked) ─────────────────────────────────────────────

/// Read a circle's basic stats through the cache.
///
/// On a miss the fresh result is returned immediately and the cache entry is
/// written in the background; a failed write is logged and never surfaces.
pub async fn basic_stats<S>(
  store: &Arc<S>,
  circle_id: Uuid,
) -> Result<CircleStats, S::Error>
where
  S: AlignmentStore + 'static,
{
  let now = Utc::now();
  let today = now.date_naive();

  let circle = store.circle(circle_id).await?;
  let coach_id = circle.as_ref().and_then(|c| c.coach_id);

  if let Some(cached) = circle.and_then(|c| c.cached_stats)
    && cached.is_fresh(today, now)
  {
    let streak = store
      .circle_summary(circle_id)
      .await?
      .unwrap_or_else(|| CircleAlignmentSummary::empty(circle_id));
    return Ok(CircleStats {
      avg_alignment:    cached.avg_alignment,
      alignment_change: cached.alignment_change,
      members:          cached.member_alignments,
      streak,
    });
  }

  // Miss: resolve membership once and thread it through both computations.
  let member_ids =
    members::members_excluding_coach(store.as_ref(), circle_id, coach_id).await?;
  let all_ids =
    members::all_user_ids(store.as_ref(), circle_id, coach_id).await?;

  let daily =
    daily_stats_with(store.as_ref(), &member_ids, &all_ids, today).await?;
  let streak =
    evaluate_streak_with(store.as_ref(), circle_id, coach_id, today).await?;

  let entry = CachedStats {
    avg_alignment:     daily.avg_today,
    alignment_change:  daily.change,
    member_alignments: daily.members.clone(),
    cached_at:         today,
    cached_at_ts:      now,
  };
  let writer = Arc::clone(store);
  tokio::spawn(async move {
    if let Err(e) = writer.write_stats_cache(circle_id, &entry).await {
      tracing::warn!(%circle_id, error = %e, "stats cache write failed");
    }
  });

  Ok(CircleStats {
    avg_alignment:    daily.avg_today,
    alignment_change: daily.change,
    members:          daily.members,
    streak,
  })
}

// ─── Full stats ──────────────────────────────────────────────────────────────

/// Basic stats plus percentile and `history_days` of contribution history.
/// The percentile scan makes this expensive; callers keep it off their fast
/// path and lazy-load it.
pub async fn full_stats<S>(
  store: &Arc<S>,
  circle_id: Uuid,
  history_days: u32,
) -> Result<FullCircleStats, S::Error>
where
  S: AlignmentStore + 'static,
{
  let stats = basic_stats(store, circle_id).await?;
  let percentile = percentile(store.as_ref(), circle_id, None).await?;
  let history =
    contribution_history(store.as_ref(), circle_id, history_days, 0, None)
      .await?;

  Ok(FullCircleStats { stats, percentile, history })
}

// ─── Invalidation ────────────────────────────────────────────────────────────

/// Clear a circle's cache entry so the next read recomputes.
///
/// Every writer of a member's alignment record must call this after the
/// write. Failure is swallowed: the TTL bounds the staleness window.
pub async fn invalidate<S: AlignmentStore>(store: &S, circle_id: Uuid) {
  if let Err(e) = store.clear_stats_cache(circle_id).await {
    tracing::warn!(%circle_id, error = %e, "stats cache invalidation failed");
  }
}
