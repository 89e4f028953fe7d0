//! The percentile ranker.
//!
//! Ranks a circle against every other circle by today's average alignment
//! and expresses the rank as a "top N%" integer. This is a full-corpus scan
//! on every call — deliberately kept off the cached fast path, and only
//! reachable through the full-stats request.

use std::cmp::Ordering;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
  dates::today_utc,
  members,
  stats::fetch_alignments,
  store::AlignmentStore,
};

/// A circle's "top N%" standing, 1..=100 (1 is best).
pub async fn percentile<S: AlignmentStore>(
  store: &S,
  circle_id: Uuid,
  as_of: Option<NaiveDate>,
) -> Result<u8, S::Error> {
  let today = as_of.unwrap_or_else(today_utc);

  let circles = store.list_circles().await?;
  if circles.is_empty() {
    return Ok(100);
  }

  let mut averages: Vec<(Uuid, f64)> = Vec::with_capacity(circles.len());
  for circle in &circles {
    let avg = raw_average(store, circle.circle_id, circle.coach_id, today).await?;
    averages.push((circle.circle_id, avg));
  }

  // A circle missing from the corpus has zero members and so ranks last.
  if !averages.iter().any(|(id, _)| *id == circle_id) {
    averages.push((circle_id, 0.0));
  }

  averages.sort_by(|a, b| match b.1.total_cmp(&a.1) {
    // Stable tie-break so equal averages rank deterministically.
    Ordering::Equal => a.0.cmp(&b.0),
    other => other,
  });

  let total = averages.len();
  let rank = averages
    .iter()
    .position(|(id, _)| *id == circle_id)
    .map_or(total, |i| i + 1);

  Ok(top_percent(rank, total))
}

/// Unrounded averaging population for the ranking: non-coach members only,
/// missing records count as zero, empty circles average 0 (worst).
async fn raw_average<S: AlignmentStore>(
  store: &S,
  circle_id: Uuid,
  coach_id: Option<Uuid>,
  date: NaiveDate,
) -> Result<f64, S::Error> {
  let member_ids =
    members::members_excluding_coach(store, circle_id, coach_id).await?;
  if member_ids.is_empty() {
    return Ok(0.0);
  }

  let records = fetch_alignments(store, &member_ids, date).await?;
  let sum: u32 = records
    .iter()
    .map(|r| r.as_ref().map_or(0, |r| u32::from(r.alignment_score.points())))
    .sum();

  Ok(f64::from(sum) / member_ids.len() as f64)
}

/// `ceil(rank / total * 100)`, floored at 1.
fn top_percent(rank: usize, total: usize) -> u8 {
  (rank * 100).div_ceil(total).clamp(1, 100) as u8
}
