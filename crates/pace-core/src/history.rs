//! The contribution history builder.
//!
//! For a run of calendar days, the fraction of non-coach members who were
//! fully aligned each day. Past days are immutable: the per-day record is
//! computed once, persisted, and trusted thereafter. Today's record is still
//! mutable (members keep checking in), so it is always recomputed and never
//! persisted.

use chrono::NaiveDate;
use futures::future::join_all;
use uuid::Uuid;

use crate::{
  circle::{CircleAlignmentDay, KEPT_THRESHOLD},
  dates::{history_window, today_utc},
  members,
  stats::fetch_alignments,
  store::AlignmentStore,
};

/// Per-day computations are issued this many at a time.
pub const DAY_BATCH: usize = 10;

/// One point on the contribution timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContributionDay {
  pub date:            NaiveDate,
  /// `round(fraction_fully_aligned * 100)`, 0–100.
  pub completion_rate: u8,
}

// ─── Per-day computation ─────────────────────────────────────────────────────

/// Resolve one day's [`CircleAlignmentDay`], through the per-day cache for
/// past dates. `coach_id` is the already-resolved coach; membership is read
/// fresh for each computed day.
pub async fn circle_day<S: AlignmentStore>(
  store: &S,
  circle_id: Uuid,
  coach_id: Option<Uuid>,
  date: NaiveDate,
  today: NaiveDate,
) -> Result<CircleAlignmentDay, S::Error> {
  let in_past = date < today;

  if in_past && let Some(cached) = store.circle_day(circle_id, date).await? {
    return Ok(cached);
  }

  let member_ids =
    members::members_excluding_coach(store, circle_id, coach_id).await?;
  let records = fetch_alignments(store, &member_ids, date).await?;

  let num_fully_aligned =
    records.iter().flatten().filter(|r| r.fully_aligned).count() as u32;
  let total_members = member_ids.len() as u32;
  let fraction_fully_aligned = if total_members == 0 {
    0.0
  } else {
    f64::from(num_fully_aligned) / f64::from(total_members)
  };

  let day = CircleAlignmentDay {
    circle_id,
    date,
    fraction_fully_aligned,
    num_fully_aligned,
    total_members,
    kept: fraction_fully_aligned >= KEPT_THRESHOLD,
  };

  if in_past
    && let Err(e) = store.put_circle_day(&day).await
  {
    // The record is derived and deterministic; a lost write only means the
    // next reader recomputes it.
    tracing::warn!(%circle_id, %date, error = %e, "circle day write failed");
  }

  Ok(day)
}

// ─── Windowed history ────────────────────────────────────────────────────────

/// Build the contribution timeline for `[today - offset - days + 1 ..=
/// today - offset]`, oldest first. Days before the circle existed are
/// omitted. `offset` supports paginated lazy-loading.
pub async fn contribution_history<S: AlignmentStore>(
  store: &S,
  circle_id: Uuid,
  days: u32,
  offset: u32,
  as_of: Option<NaiveDate>,
) -> Result<Vec<ContributionDay>, S::Error> {
  let today = as_of.unwrap_or_else(today_utc);

  // Coach and creation date resolved exactly once for the whole window.
  let circle = store.circle(circle_id).await?;
  let coach_id = circle.as_ref().and_then(|c| c.coach_id);
  let created_on = circle.as_ref().map(|c| c.created_at.date_naive());

  let window = history_window(today, days, offset, created_on);

  let mut computed = Vec::with_capacity(window.len());
  for batch in window.chunks(DAY_BATCH) {
    let results = join_all(
      batch
        .iter()
        .map(|date| circle_day(store, circle_id, coach_id, *date, today)),
    )
    .await;
    for day in results {
      computed.push(day?);
    }
  }

  // The window iterates newest-first; callers want oldest-first.
  computed.reverse();

  Ok(
    computed
      .into_iter()
      .map(|day| ContributionDay {
        date:            day.date,
        completion_rate: (day.fraction_fully_aligned * 100.0).round() as u8,
      })
      .collect(),
  )
}
