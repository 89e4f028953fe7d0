//! The circle streak engine.
//!
//! Maintains the consecutive-kept-days counter with once-per-day update
//! semantics and a grace rule: a circle that failed today but kept yesterday
//! still shows yesterday's streak for the rest of today, and only rolls to
//! zero once a full day has passed with no continuation.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
  circle::CircleAlignmentSummary,
  dates::{day_before, today_utc},
  history::circle_day,
  members,
  store::AlignmentStore,
};

/// Evaluate (and persist, when something changed) the streak for a circle.
/// Idempotent within a calendar day.
pub async fn evaluate_streak<S: AlignmentStore>(
  store: &S,
  circle_id: Uuid,
  as_of: Option<NaiveDate>,
) -> Result<CircleAlignmentSummary, S::Error> {
  let today = as_of.unwrap_or_else(today_utc);
  let coach_id = members::coach_of(store, circle_id).await?;
  evaluate_streak_with(store, circle_id, coach_id, today).await
}

/// Streak evaluation with an already-resolved coach, for callers that have
/// resolved membership anyway (the stats path).
pub(crate) async fn evaluate_streak_with<S: AlignmentStore>(
  store: &S,
  circle_id: Uuid,
  coach_id: Option<Uuid>,
  today: NaiveDate,
) -> Result<CircleAlignmentSummary, S::Error> {
  let yesterday = day_before(today);

  let summary = store
    .circle_summary(circle_id)
    .await?
    .unwrap_or_else(|| CircleAlignmentSummary::empty(circle_id));

  // Already evaluated today: the summary is authoritative until midnight.
  if summary.last_kept_date == Some(today) {
    return Ok(summary);
  }

  // Today's record is still mutable, so it is always computed fresh.
  let day = circle_day(store, circle_id, coach_id, today, today).await?;

  if day.kept {
    let current_streak = if summary.last_kept_date == Some(yesterday) {
      summary.current_streak + 1
    } else {
      // A gap (or no prior streak): a new streak starts today.
      1
    };
    let updated = CircleAlignmentSummary {
      circle_id,
      current_streak,
      last_kept_date: Some(today),
    };

    // Conditional write: the guard holds the at-most-once-per-day invariant
    // against two simultaneous first-calls-of-the-day.
    if store.merge_circle_summary_guarded(&updated, today).await? {
      Ok(updated)
    } else {
      // Lost the race; whoever won already wrote today's transition.
      Ok(store.circle_summary(circle_id).await?.unwrap_or(updated))
    }
  } else if summary.last_kept_date == Some(yesterday) {
    // Grace day: the streak is not yet lost, keep displaying it.
    Ok(summary)
  } else if summary.current_streak != 0 {
    // More than a full day without a kept day: the streak is gone.
    let updated = CircleAlignmentSummary {
      circle_id,
      current_streak: 0,
      last_kept_date: summary.last_kept_date,
    };
    store.merge_circle_summary(&updated).await?;
    Ok(updated)
  } else {
    Ok(summary)
  }
}
