//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings and calendar dates as
//! `YYYY-MM-DD`. Structured fields (component flags, the member-alignment
//! map, the denormalized member id list) are stored as compact JSON. UUIDs
//! are stored as hyphenated lowercase strings.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use pace_core::{
  alignment::{
    AlignmentComponents, AlignmentScore, UserAlignment, UserAlignmentSummary,
  },
  circle::{
    CachedStats, Circle, CircleAlignmentDay, CircleAlignmentSummary,
    MemberAlignment,
  },
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Dates & instants ────────────────────────────────────────────────────────

pub fn encode_date(date: NaiveDate) -> String {
  date.format("%Y-%m-%d").to_string()
}

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  s.parse().map_err(|_| Error::DateParse(s.to_owned()))
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_member_map(
  map: &BTreeMap<Uuid, MemberAlignment>,
) -> Result<String> {
  Ok(serde_json::to_string(map)?)
}

pub fn decode_member_map(s: &str) -> Result<BTreeMap<Uuid, MemberAlignment>> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_components(components: &AlignmentComponents) -> Result<String> {
  Ok(serde_json::to_string(components)?)
}

pub fn encode_id_list(ids: &[Uuid]) -> Result<String> {
  Ok(serde_json::to_string(ids)?)
}

// ─── Raw row types ───────────────────────────────────────────────────────────

pub struct RawCircle {
  pub circle_id:                String,
  pub name:                     String,
  pub coach_id:                 Option<String>,
  pub created_at:               String,
  pub member_ids:               String,
  pub cached_avg_alignment:     Option<i64>,
  pub cached_alignment_change:  Option<i64>,
  pub cached_member_alignments: Option<String>,
  pub cached_at:                Option<String>,
  pub cached_at_ts:             Option<String>,
}

impl RawCircle {
  pub fn into_circle(self) -> Result<Circle> {
    // All cache fields must be present to form an entry; a partial set is
    // treated as no entry at all.
    let cached_stats = match (
      self.cached_avg_alignment,
      self.cached_alignment_change,
      self.cached_member_alignments,
      self.cached_at,
      self.cached_at_ts,
    ) {
      (Some(avg), Some(change), Some(map), Some(at), Some(ts)) => {
        Some(CachedStats {
          avg_alignment:     avg as u32,
          alignment_change:  change as i32,
          member_alignments: decode_member_map(&map)?,
          cached_at:         decode_date(&at)?,
          cached_at_ts:      decode_dt(&ts)?,
        })
      }
      _ => None,
    };

    Ok(Circle {
      circle_id: decode_uuid(&self.circle_id)?,
      name: self.name,
      coach_id: self.coach_id.as_deref().map(decode_uuid).transpose()?,
      member_ids: serde_json::from_str(&self.member_ids)?,
      created_at: decode_dt(&self.created_at)?,
      cached_stats,
    })
  }
}

pub struct RawUserAlignment {
  pub user_id:         String,
  pub date:            String,
  pub alignment_score: i64,
  pub fully_aligned:   bool,
  pub components:      String,
}

impl RawUserAlignment {
  pub fn into_alignment(self) -> Result<UserAlignment> {
    Ok(UserAlignment {
      user_id:         decode_uuid(&self.user_id)?,
      date:            decode_date(&self.date)?,
      alignment_score: AlignmentScore::new(self.alignment_score as u8)
        .map_err(Error::Core)?,
      fully_aligned:   self.fully_aligned,
      components:      serde_json::from_str(&self.components)?,
    })
  }
}

pub struct RawUserSummary {
  pub user_id:           String,
  pub current_streak:    i64,
  pub last_aligned_date: Option<String>,
}

impl RawUserSummary {
  pub fn into_summary(self) -> Result<UserAlignmentSummary> {
    Ok(UserAlignmentSummary {
      user_id:           decode_uuid(&self.user_id)?,
      current_streak:    self.current_streak as u32,
      last_aligned_date: self
        .last_aligned_date
        .as_deref()
        .map(decode_date)
        .transpose()?,
    })
  }
}

pub struct RawCircleDay {
  pub circle_id:              String,
  pub date:                   String,
  pub fraction_fully_aligned: f64,
  pub num_fully_aligned:      i64,
  pub total_members:          i64,
  pub kept:                   bool,
}

impl RawCircleDay {
  pub fn into_day(self) -> Result<CircleAlignmentDay> {
    Ok(CircleAlignmentDay {
      circle_id:              decode_uuid(&self.circle_id)?,
      date:                   decode_date(&self.date)?,
      fraction_fully_aligned: self.fraction_fully_aligned,
      num_fully_aligned:      self.num_fully_aligned as u32,
      total_members:          self.total_members as u32,
      kept:                   self.kept,
    })
  }
}

pub struct RawCircleSummary {
  pub circle_id:      String,
  pub current_streak: i64,
  pub last_kept_date: Option<String>,
}

impl RawCircleSummary {
  pub fn into_summary(self) -> Result<CircleAlignmentSummary> {
    Ok(CircleAlignmentSummary {
      circle_id:      decode_uuid(&self.circle_id)?,
      current_streak: self.current_streak as u32,
      last_kept_date: self
        .last_kept_date
        .as_deref()
        .map(decode_date)
        .transpose()?,
    })
  }
}
