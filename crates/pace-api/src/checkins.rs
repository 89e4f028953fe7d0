//! Handler for recording a daily check-in.
//!
//! Writes the user's alignment record, rolls the per-user streak summary
//! forward, and invalidates the stats cache of every circle the user belongs
//! to — a stale same-day aggregate must never outlive a member's write.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use chrono::NaiveDate;
use pace_core::{
  alignment::{
    AlignmentComponents, AlignmentScore, UserAlignment, UserAlignmentSummary,
  },
  cache,
  dates::{day_before, today_utc},
  store::AlignmentStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CheckinBody {
  pub user_id:         Uuid,
  /// Defaults to today (UTC). Backfills are accepted but do not rewrite
  /// already-persisted circle day records.
  pub date:            Option<NaiveDate>,
  /// One of 0, 25, 50, 75, 100.
  pub alignment_score: u8,
  #[serde(default)]
  pub components:      AlignmentComponents,
}

/// `POST /checkins` — body: [`CheckinBody`]; returns 201 + the stored record.
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<CheckinBody>,
) -> Result<(StatusCode, Json<UserAlignment>), ApiError>
where
  S: AlignmentStore,
{
  let score = AlignmentScore::new(body.alignment_score)
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
  let date = body.date.unwrap_or_else(today_utc);

  let record = UserAlignment {
    user_id: body.user_id,
    date,
    alignment_score: score,
    fully_aligned: score.is_full(),
    components: body.components,
  };
  store.put_user_alignment(&record).await.map_err(ApiError::store)?;

  if record.fully_aligned {
    roll_user_streak(store.as_ref(), body.user_id, date).await?;
  }

  // Primary invalidation path: the next stats read for any affected circle
  // recomputes instead of serving the stale same-day value.
  let circles =
    store.circles_of_member(body.user_id).await.map_err(ApiError::store)?;
  for circle_id in circles {
    cache::invalidate(store.as_ref(), circle_id).await;
  }

  Ok((StatusCode::CREATED, Json(record)))
}

/// Advance the per-user streak for a fully-aligned `date`. Idempotent for
/// repeated fully-aligned writes on the same day.
async fn roll_user_streak<S: AlignmentStore>(
  store: &S,
  user_id: Uuid,
  date: NaiveDate,
) -> Result<(), ApiError> {
  let ids = [user_id];
  let summary = store
    .user_summaries(&ids)
    .await
    .map_err(ApiError::store)?
    .into_iter()
    .next()
    .flatten()
    .unwrap_or_else(|| UserAlignmentSummary::empty(user_id));

  let current_streak = match summary.last_aligned_date {
    Some(last) if last == date => summary.current_streak,
    Some(last) if last == day_before(date) => summary.current_streak + 1,
    _ => 1,
  };

  store
    .merge_user_summary(&UserAlignmentSummary {
      user_id,
      current_streak,
      last_aligned_date: Some(date),
    })
    .await
    .map_err(ApiError::store)
}
