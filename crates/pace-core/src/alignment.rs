//! Per-user alignment records.
//!
//! These are written by the check-in subsystem as the user completes their
//! daily actions; this engine only reads them (and reads the per-user summary
//! for the member display map). A record for a day that has fully elapsed is
//! immutable; the current day's record changes as the user checks in.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Score ───────────────────────────────────────────────────────────────────

/// A per-day alignment score. Always one of 0, 25, 50, 75 or 100.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct AlignmentScore(u8);

impl AlignmentScore {
  pub const ZERO: Self = Self(0);
  pub const FULL: Self = Self(100);

  pub fn new(points: u8) -> Result<Self> {
    match points {
      0 | 25 | 50 | 75 | 100 => Ok(Self(points)),
      other => Err(Error::InvalidScore(other)),
    }
  }

  pub fn points(self) -> u8 { self.0 }

  /// A user is fully aligned on a day iff they scored 100.
  pub fn is_full(self) -> bool { self.0 == 100 }
}

impl Default for AlignmentScore {
  fn default() -> Self { Self::ZERO }
}

impl TryFrom<u8> for AlignmentScore {
  type Error = Error;

  fn try_from(points: u8) -> Result<Self> { Self::new(points) }
}

impl From<AlignmentScore> for u8 {
  fn from(score: AlignmentScore) -> u8 { score.0 }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// The component flags behind a day's score. Owned by the check-in subsystem;
/// carried here untouched so the display layer can show a breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentComponents {
  pub logged_meals:      bool,
  pub logged_activity:   bool,
  pub logged_weight:     bool,
  pub completed_checkin: bool,
}

/// One record per (user, calendar date). Identity key: `user_id` + `date`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAlignment {
  pub user_id:         Uuid,
  pub date:            NaiveDate,
  pub alignment_score: AlignmentScore,
  /// True iff `alignment_score` is 100. Denormalized by the writer.
  pub fully_aligned:   bool,
  pub components:      AlignmentComponents,
}

/// One rolling summary per user: the consecutive fully-aligned-day streak.
/// The value is owned by the check-in subsystem; this engine reads it for the
/// circle member display map and never writes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAlignmentSummary {
  pub user_id:           Uuid,
  pub current_streak:    u32,
  pub last_aligned_date: Option<NaiveDate>,
}

impl UserAlignmentSummary {
  pub fn empty(user_id: Uuid) -> Self {
    Self { user_id, current_streak: 0, last_aligned_date: None }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn score_accepts_only_quartiles() {
    for points in [0u8, 25, 50, 75, 100] {
      assert_eq!(AlignmentScore::new(points).unwrap().points(), points);
    }
    for points in [1u8, 24, 60, 99, 101, 255] {
      assert!(AlignmentScore::new(points).is_err());
    }
  }

  #[test]
  fn only_a_hundred_is_full() {
    assert!(AlignmentScore::FULL.is_full());
    for points in [0u8, 25, 50, 75] {
      assert!(!AlignmentScore::new(points).unwrap().is_full());
    }
  }
}
