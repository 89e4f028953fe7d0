//! Handlers for circle administration.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use chrono::Utc;
use pace_core::{circle::Circle, store::AlignmentStore};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct NewCircleBody {
  pub name:     String,
  pub coach_id: Option<Uuid>,
}

/// `POST /circles` — create a circle; the coach, if any, is fixed at
/// creation. Returns 201 + the stored circle.
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewCircleBody>,
) -> Result<(StatusCode, Json<Circle>), ApiError>
where
  S: AlignmentStore,
{
  let circle = Circle {
    circle_id:    Uuid::new_v4(),
    name:         body.name,
    coach_id:     body.coach_id,
    member_ids:   vec![],
    created_at:   Utc::now(),
    cached_stats: None,
  };
  store.create_circle(&circle).await.map_err(ApiError::store)?;

  // The coach participates in the chat and the display map, so they get a
  // membership record too; aggregation filters them out downstream.
  if let Some(coach) = circle.coach_id {
    store.add_member(circle.circle_id, coach).await.map_err(ApiError::store)?;
  }

  Ok((StatusCode::CREATED, Json(circle)))
}

/// `GET /circles/:id`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Circle>, ApiError>
where
  S: AlignmentStore,
{
  match store.circle(id).await.map_err(ApiError::store)? {
    Some(circle) => Ok(Json(circle)),
    None => Err(ApiError::NotFound(format!("circle {id}"))),
  }
}

#[derive(Debug, Deserialize)]
pub struct NewMemberBody {
  pub user_id: Uuid,
}

/// `POST /circles/:id/members` — add a member. Idempotent.
pub async fn add_member<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<NewMemberBody>,
) -> Result<StatusCode, ApiError>
where
  S: AlignmentStore,
{
  if store.circle(id).await.map_err(ApiError::store)?.is_none() {
    return Err(ApiError::NotFound(format!("circle {id}")));
  }
  store.add_member(id, body.user_id).await.map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}
