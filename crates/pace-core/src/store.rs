//! The `AlignmentStore` trait and supporting key types.
//!
//! The trait is implemented by storage backends (e.g. `pace-store-sqlite`).
//! The engine modules in this crate depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
  alignment::{UserAlignment, UserAlignmentSummary},
  circle::{CachedStats, Circle, CircleAlignmentDay, CircleAlignmentSummary},
};

// ─── Key type ────────────────────────────────────────────────────────────────

/// Composite key of a [`UserAlignment`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlignmentKey {
  pub user_id: Uuid,
  pub date:    NaiveDate,
}

impl AlignmentKey {
  pub fn new(user_id: Uuid, date: NaiveDate) -> Self { Self { user_id, date } }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the Pace document store.
///
/// Batch reads return one entry per requested key, in request order, with
/// `None` for records that do not exist — a missing alignment record is a
/// zero value to the engine, never an error. Callers are expected to keep
/// batches small (the engine chunks at 30 keys); implementations may reject
/// oversized batches at their own limit.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait AlignmentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Alignment records (owned by the check-in subsystem) ───────────────

  /// Fetch alignment records for a batch of keys, positionally.
  fn user_alignments<'a>(
    &'a self,
    keys: &'a [AlignmentKey],
  ) -> impl Future<Output = Result<Vec<Option<UserAlignment>>, Self::Error>> + Send + 'a;

  /// Fetch per-user rolling summaries for a batch of user ids, positionally.
  fn user_summaries<'a>(
    &'a self,
    user_ids: &'a [Uuid],
  ) -> impl Future<Output = Result<Vec<Option<UserAlignmentSummary>>, Self::Error>>
  + Send
  + 'a;

  /// Upsert a user's alignment record for a day. Only the current day's
  /// record is ever rewritten in practice; past days are immutable.
  fn put_user_alignment<'a>(
    &'a self,
    record: &'a UserAlignment,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Merge-write a user's rolling summary.
  fn merge_user_summary<'a>(
    &'a self,
    summary: &'a UserAlignmentSummary,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Circles & membership ──────────────────────────────────────────────

  /// Retrieve a circle by id. Returns `None` if not found.
  fn circle(
    &self,
    circle_id: Uuid,
  ) -> impl Future<Output = Result<Option<Circle>, Self::Error>> + Send + '_;

  /// Enumerate every circle in the system. Full-corpus read; only the
  /// percentile ranker uses it.
  fn list_circles(
    &self,
  ) -> impl Future<Output = Result<Vec<Circle>, Self::Error>> + Send + '_;

  /// The membership records for a circle (may include the coach). Read
  /// fresh on every call; caching happens at the stats layer.
  fn circle_members(
    &self,
    circle_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  /// The circles a user belongs to. Writers of alignment records use this
  /// to invalidate each affected circle's stats cache.
  fn circles_of_member(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  /// Persist a new circle (without any cache entry).
  fn create_circle<'a>(
    &'a self,
    circle: &'a Circle,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Add a membership record, keeping the circle's denormalized member list
  /// in step. Adding an existing member is a no-op.
  fn add_member(
    &self,
    circle_id: Uuid,
    user_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Derived per-day records ───────────────────────────────────────────

  /// Read the cached [`CircleAlignmentDay`] for a past date, if present.
  fn circle_day(
    &self,
    circle_id: Uuid,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Option<CircleAlignmentDay>, Self::Error>> + Send + '_;

  /// Persist a computed day record. Write-once: racing writers produce
  /// identical records, so the first write wins and the rest are ignored.
  fn put_circle_day<'a>(
    &'a self,
    day: &'a CircleAlignmentDay,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Circle streak summary ─────────────────────────────────────────────

  fn circle_summary(
    &self,
    circle_id: Uuid,
  ) -> impl Future<Output = Result<Option<CircleAlignmentSummary>, Self::Error>>
  + Send
  + '_;

  /// Merge-write a circle's streak summary (does not clobber unrelated
  /// fields on the underlying document).
  fn merge_circle_summary<'a>(
    &'a self,
    summary: &'a CircleAlignmentSummary,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Conditional merge-write: succeeds only while the persisted
  /// `last_kept_date` differs from `not_kept_on`. Returns `false` when the
  /// guard rejected the write — i.e. another caller already recorded a kept
  /// day for that date. This is the at-most-once-per-day barrier for streak
  /// increments.
  fn merge_circle_summary_guarded<'a>(
    &'a self,
    summary: &'a CircleAlignmentSummary,
    not_kept_on: NaiveDate,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  // ── Stats cache fields on the circle ──────────────────────────────────

  /// Write the whole cache entry (all fields, atomically, as a unit).
  fn write_stats_cache<'a>(
    &'a self,
    circle_id: Uuid,
    entry: &'a CachedStats,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Clear every cache field so the next read recomputes.
  fn clear_stats_cache(
    &self,
    circle_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
