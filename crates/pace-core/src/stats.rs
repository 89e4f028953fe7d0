//! The daily stats aggregator.
//!
//! Computes today's and yesterday's average alignment across a circle's
//! non-coach members, plus the per-member display map (which includes the
//! coach — display is the one surface where coach data appears).

use std::collections::BTreeMap;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
  alignment::{AlignmentScore, UserAlignment, UserAlignmentSummary},
  circle::MemberAlignment,
  dates::day_before,
  members,
  store::{AlignmentKey, AlignmentStore},
};

/// Document-store batch-read limit; larger requests are split and the
/// results reassembled by position.
pub const FETCH_CHUNK: usize = 30;

/// Output of [`daily_stats`]. Averages are rounded to the nearest integer;
/// `change` may be negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyStats {
  pub avg_today:     u32,
  pub avg_yesterday: u32,
  pub change:        i32,
  /// Display map over every user attached to the circle, coach included.
  pub members:       BTreeMap<Uuid, MemberAlignment>,
}

impl DailyStats {
  fn zero() -> Self {
    Self { avg_today: 0, avg_yesterday: 0, change: 0, members: BTreeMap::new() }
  }
}

// ─── Chunked batch reads ─────────────────────────────────────────────────────

/// Fetch one date's alignment records for `user_ids`, chunked at
/// [`FETCH_CHUNK`], positionally aligned with the input.
pub(crate) async fn fetch_alignments<S: AlignmentStore>(
  store: &S,
  user_ids: &[Uuid],
  date: NaiveDate,
) -> Result<Vec<Option<UserAlignment>>, S::Error> {
  let keys: Vec<AlignmentKey> =
    user_ids.iter().map(|id| AlignmentKey::new(*id, date)).collect();

  let mut records = Vec::with_capacity(keys.len());
  for chunk in keys.chunks(FETCH_CHUNK) {
    records.extend(store.user_alignments(chunk).await?);
  }
  Ok(records)
}

async fn fetch_summaries<S: AlignmentStore>(
  store: &S,
  user_ids: &[Uuid],
) -> Result<Vec<Option<UserAlignmentSummary>>, S::Error> {
  let mut summaries = Vec::with_capacity(user_ids.len());
  for chunk in user_ids.chunks(FETCH_CHUNK) {
    summaries.extend(store.user_summaries(chunk).await?);
  }
  Ok(summaries)
}

// ─── Aggregation ─────────────────────────────────────────────────────────────

/// `round(sum / count)` as the UI-facing integer average; `0` for an empty
/// circle rather than a division by zero.
fn rounded_average(sum: u32, count: usize) -> u32 {
  if count == 0 {
    0
  } else {
    (f64::from(sum) / count as f64).round() as u32
  }
}

/// Compute today's stats for a circle, resolving coach and membership first.
pub async fn daily_stats<S: AlignmentStore>(
  store: &S,
  circle_id: Uuid,
  as_of: Option<NaiveDate>,
) -> Result<DailyStats, S::Error> {
  let today = as_of.unwrap_or_else(crate::dates::today_utc);
  let coach_id = members::coach_of(store, circle_id).await?;
  let member_ids =
    members::members_excluding_coach(store, circle_id, coach_id).await?;
  let all_ids = members::all_user_ids(store, circle_id, coach_id).await?;
  daily_stats_with(store, &member_ids, &all_ids, today).await
}

/// Core of the aggregator, over already-resolved id lists. `member_ids` is
/// the coach-excluded averaging population; `all_ids` (members plus coach)
/// drives the display map only.
pub(crate) async fn daily_stats_with<S: AlignmentStore>(
  store: &S,
  member_ids: &[Uuid],
  all_ids: &[Uuid],
  today: NaiveDate,
) -> Result<DailyStats, S::Error> {
  if member_ids.is_empty() && all_ids.is_empty() {
    return Ok(DailyStats::zero());
  }

  let yesterday = day_before(today);

  // Today's records for everyone (display map needs the coach); yesterday's
  // only for the averaging population.
  let today_records = fetch_alignments(store, all_ids, today).await?;
  let yesterday_records = fetch_alignments(store, member_ids, yesterday).await?;
  let summaries = fetch_summaries(store, all_ids).await?;

  let today_scores: BTreeMap<Uuid, AlignmentScore> = all_ids
    .iter()
    .zip(&today_records)
    .map(|(id, record)| {
      (*id, record.as_ref().map(|r| r.alignment_score).unwrap_or_default())
    })
    .collect();

  let sum_today: u32 = member_ids
    .iter()
    .map(|id| u32::from(today_scores.get(id).copied().unwrap_or_default().points()))
    .sum();
  let sum_yesterday: u32 = yesterday_records
    .iter()
    .map(|record| {
      record.as_ref().map_or(0, |r| u32::from(r.alignment_score.points()))
    })
    .sum();

  let avg_today = rounded_average(sum_today, member_ids.len());
  let avg_yesterday = rounded_average(sum_yesterday, member_ids.len());

  let members = all_ids
    .iter()
    .zip(&summaries)
    .map(|(id, summary)| {
      let entry = MemberAlignment {
        alignment_score: today_scores.get(id).copied().unwrap_or_default(),
        current_streak:  summary.as_ref().map_or(0, |s| s.current_streak),
      };
      (*id, entry)
    })
    .collect();

  Ok(DailyStats {
    avg_today,
    avg_yesterday,
    change: avg_today as i32 - avg_yesterday as i32,
    members,
  })
}
