//! JSON REST API for Pace.
//!
//! Exposes an axum [`Router`] backed by any
//! [`pace_core::store::AlignmentStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", pace_api::api_router(store.clone()))
//! ```

pub mod checkins;
pub mod circles;
pub mod error;
pub mod stats;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use pace_core::store::AlignmentStore;
use serde::Deserialize;

pub use error::ApiError;

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: AlignmentStore + 'static,
{
  Router::new()
    // Circles
    .route("/circles", post(circles::create::<S>))
    .route("/circles/{id}", get(circles::get_one::<S>))
    .route("/circles/{id}/members", post(circles::add_member::<S>))
    // Stats
    .route("/circles/{id}/stats", get(stats::basic::<S>))
    .route("/circles/{id}/stats/full", get(stats::full::<S>))
    .route("/circles/{id}/stats/invalidate", post(stats::invalidate::<S>))
    .route("/circles/{id}/contributions", get(stats::contributions::<S>))
    // Check-ins
    .route("/checkins", post(checkins::create::<S>))
    .with_state(store)
}
