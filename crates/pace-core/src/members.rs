//! Membership resolution.
//!
//! Member lists are read fresh on every call — there is no caching at this
//! layer (that happens one level up, at the stats cache). A circle that does
//! not exist resolves to zero members, never an error.

use uuid::Uuid;

use crate::store::AlignmentStore;

/// The coach of a circle, if it has one.
pub async fn coach_of<S: AlignmentStore>(
  store: &S,
  circle_id: Uuid,
) -> Result<Option<Uuid>, S::Error> {
  Ok(store.circle(circle_id).await?.and_then(|c| c.coach_id))
}

/// The circle's member ids with the coach filtered out. This is the list
/// every aggregate is computed over. `coach_id` is the already-resolved
/// coach, threaded through by callers to avoid a redundant circle lookup.
pub async fn members_excluding_coach<S: AlignmentStore>(
  store: &S,
  circle_id: Uuid,
  coach_id: Option<Uuid>,
) -> Result<Vec<Uuid>, S::Error> {
  let members = store.circle_members(circle_id).await?;
  Ok(members.into_iter().filter(|id| Some(*id) != coach_id).collect())
}

/// Every user id attached to the circle — members plus coach. Used only for
/// the per-member display map, the one surface that shows the coach.
pub async fn all_user_ids<S: AlignmentStore>(
  store: &S,
  circle_id: Uuid,
  coach_id: Option<Uuid>,
) -> Result<Vec<Uuid>, S::Error> {
  let mut ids = store.circle_members(circle_id).await?;
  if let Some(coach) = coach_id
    && !ids.contains(&coach)
  {
    ids.push(coach);
  }
  Ok(ids)
}
