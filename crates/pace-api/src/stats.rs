//! Handlers for the circle stats endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/circles/:id/stats` | Fast path: aggregates + streak, cache-checked |
//! | `GET`  | `/circles/:id/stats/full` | Adds percentile + history; expensive, lazy-load it |
//! | `POST` | `/circles/:id/stats/invalidate` | Explicit cache invalidation hook |
//! | `GET`  | `/circles/:id/contributions` | Paginated history for infinite scroll |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use pace_core::{
  cache::{self, CircleStats, FullCircleStats},
  history::{self, ContributionDay},
  store::AlignmentStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

async fn require_circle<S: AlignmentStore>(
  store: &S,
  id: Uuid,
) -> Result<(), ApiError> {
  match store.circle(id).await.map_err(ApiError::store)? {
    Some(_) => Ok(()),
    None => Err(ApiError::NotFound(format!("circle {id}"))),
  }
}

// ─── Basic stats ─────────────────────────────────────────────────────────────

/// `GET /circles/:id/stats`
pub async fn basic<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<CircleStats>, ApiError>
where
  S: AlignmentStore + 'static,
{
  require_circle(store.as_ref(), id).await?;
  let stats = cache::basic_stats(&store, id).await.map_err(ApiError::store)?;
  Ok(Json(stats))
}

// ─── Full stats ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct FullParams {
  /// Days of contribution history to include. Default 30.
  pub history_days: Option<u32>,
}

/// `GET /circles/:id/stats/full[?history_days=30]`
pub async fn full<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<FullParams>,
) -> Result<Json<FullCircleStats>, ApiError>
where
  S: AlignmentStore + 'static,
{
  require_circle(store.as_ref(), id).await?;
  let days = params.history_days.unwrap_or(30);
  let stats =
    cache::full_stats(&store, id, days).await.map_err(ApiError::store)?;
  Ok(Json(stats))
}

// ─── Invalidation ────────────────────────────────────────────────────────────

/// `POST /circles/:id/stats/invalidate`
///
/// For callers outside this service that write alignment records through
/// another path and need the next stats read to recompute.
pub async fn invalidate<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: AlignmentStore + 'static,
{
  require_circle(store.as_ref(), id).await?;
  cache::invalidate(store.as_ref(), id).await;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Contribution history ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ContributionParams {
  /// Window length in days. Default 30.
  pub days:   Option<u32>,
  /// Days to skip back from today, for pagination. Default 0.
  pub offset: Option<u32>,
}

/// `GET /circles/:id/contributions[?days=30][&offset=0]`
pub async fn contributions<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<ContributionParams>,
) -> Result<Json<Vec<ContributionDay>>, ApiError>
where
  S: AlignmentStore + 'static,
{
  require_circle(store.as_ref(), id).await?;
  let timeline = history::contribution_history(
    store.as_ref(),
    id,
    params.days.unwrap_or(30),
    params.offset.unwrap_or(0),
    None,
  )
  .await
  .map_err(ApiError::store)?;
  Ok(Json(timeline))
}
