//! [`SqliteStore`] — the SQLite implementation of [`AlignmentStore`].

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use pace_core::{
  alignment::{UserAlignment, UserAlignmentSummary},
  circle::{CachedStats, Circle, CircleAlignmentDay, CircleAlignmentSummary},
  store::{AlignmentKey, AlignmentStore},
};

use crate::{
  encode::{
    encode_components, encode_date, encode_dt, encode_id_list,
    encode_member_map, encode_uuid, RawCircle, RawCircleDay, RawCircleSummary,
    RawUserAlignment, RawUserSummary,
  },
  schema::SCHEMA,
  Error, Result,
};

const CIRCLE_COLUMNS: &str = "circle_id, name, coach_id, created_at, \
   member_ids, cached_avg_alignment, cached_alignment_change, \
   cached_member_alignments, cached_at, cached_at_ts";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Pace alignment store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  fn circle_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawCircle> {
    Ok(RawCircle {
      circle_id:                row.get(0)?,
      name:                     row.get(1)?,
      coach_id:                 row.get(2)?,
      created_at:               row.get(3)?,
      member_ids:               row.get(4)?,
      cached_avg_alignment:     row.get(5)?,
      cached_alignment_change:  row.get(6)?,
      cached_member_alignments: row.get(7)?,
      cached_at:                row.get(8)?,
      cached_at_ts:             row.get(9)?,
    })
  }
}

// ─── AlignmentStore impl ─────────────────────────────────────────────────────

impl AlignmentStore for SqliteStore {
  type Error = Error;

  // ── Alignment records ─────────────────────────────────────────────────────

  async fn user_alignments(
    &self,
    keys: &[AlignmentKey],
  ) -> Result<Vec<Option<UserAlignment>>> {
    let encoded: Vec<(String, String)> = keys
      .iter()
      .map(|k| (encode_uuid(k.user_id), encode_date(k.date)))
      .collect();

    let raws: Vec<Option<RawUserAlignment>> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT user_id, date, alignment_score, fully_aligned, components
           FROM user_alignments WHERE user_id = ?1 AND date = ?2",
        )?;

        let mut out = Vec::with_capacity(encoded.len());
        for (user_id, date) in &encoded {
          let raw = stmt
            .query_row(rusqlite::params![user_id, date], |row| {
              Ok(RawUserAlignment {
                user_id:         row.get(0)?,
                date:            row.get(1)?,
                alignment_score: row.get(2)?,
                fully_aligned:   row.get(3)?,
                components:      row.get(4)?,
              })
            })
            .optional()?;
          out.push(raw);
        }
        Ok(out)
      })
      .await?;

    raws
      .into_iter()
      .map(|raw| raw.map(RawUserAlignment::into_alignment).transpose())
      .collect()
  }

  async fn user_summaries(
    &self,
    user_ids: &[Uuid],
  ) -> Result<Vec<Option<UserAlignmentSummary>>> {
    let encoded: Vec<String> =
      user_ids.iter().copied().map(encode_uuid).collect();

    let raws: Vec<Option<RawUserSummary>> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT user_id, current_streak, last_aligned_date
           FROM user_alignment_summaries WHERE user_id = ?1",
        )?;

        let mut out = Vec::with_capacity(encoded.len());
        for user_id in &encoded {
          let raw = stmt
            .query_row(rusqlite::params![user_id], |row| {
              Ok(RawUserSummary {
                user_id:           row.get(0)?,
                current_streak:    row.get(1)?,
                last_aligned_date: row.get(2)?,
              })
            })
            .optional()?;
          out.push(raw);
        }
        Ok(out)
      })
      .await?;

    raws
      .into_iter()
      .map(|raw| raw.map(RawUserSummary::into_summary).transpose())
      .collect()
  }

  async fn put_user_alignment(&self, record: &UserAlignment) -> Result<()> {
    let user_id = encode_uuid(record.user_id);
    let date = encode_date(record.date);
    let score = i64::from(record.alignment_score.points());
    let fully_aligned = record.fully_aligned;
    let components = encode_components(&record.components)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO user_alignments
             (user_id, date, alignment_score, fully_aligned, components)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT(user_id, date) DO UPDATE SET
             alignment_score = excluded.alignment_score,
             fully_aligned   = excluded.fully_aligned,
             components      = excluded.components",
          rusqlite::params![user_id, date, score, fully_aligned, components],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn merge_user_summary(
    &self,
    summary: &UserAlignmentSummary,
  ) -> Result<()> {
    let user_id = encode_uuid(summary.user_id);
    let streak = i64::from(summary.current_streak);
    let last = summary.last_aligned_date.map(encode_date);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO user_alignment_summaries
             (user_id, current_streak, last_aligned_date)
           VALUES (?1, ?2, ?3)
           ON CONFLICT(user_id) DO UPDATE SET
             current_streak    = excluded.current_streak,
             last_aligned_date = excluded.last_aligned_date",
          rusqlite::params![user_id, streak, last],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Circles & membership ──────────────────────────────────────────────────

  async fn circle(&self, circle_id: Uuid) -> Result<Option<Circle>> {
    let id = encode_uuid(circle_id);

    let raw: Option<RawCircle> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {CIRCLE_COLUMNS} FROM circles WHERE circle_id = ?1"),
              rusqlite::params![id],
              Self::circle_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCircle::into_circle).transpose()
  }

  async fn list_circles(&self) -> Result<Vec<Circle>> {
    let raws: Vec<RawCircle> = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {CIRCLE_COLUMNS} FROM circles"))?;
        let rows = stmt
          .query_map([], Self::circle_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCircle::into_circle).collect()
  }

  async fn circle_members(&self, circle_id: Uuid) -> Result<Vec<Uuid>> {
    let id = encode_uuid(circle_id);

    let raw: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT user_id FROM circle_members
           WHERE circle_id = ?1 ORDER BY joined_at, user_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raw.iter().map(|s| crate::encode::decode_uuid(s)).collect()
  }

  async fn circles_of_member(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
    let id = encode_uuid(user_id);

    let raw: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT circle_id FROM circle_members WHERE user_id = ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raw.iter().map(|s| crate::encode::decode_uuid(s)).collect()
  }

  async fn create_circle(&self, circle: &Circle) -> Result<()> {
    let id = encode_uuid(circle.circle_id);
    let name = circle.name.clone();
    let coach = circle.coach_id.map(encode_uuid);
    let created_at = encode_dt(circle.created_at);
    let member_ids = encode_id_list(&circle.member_ids)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO circles (circle_id, name, coach_id, created_at, member_ids)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id, name, coach, created_at, member_ids],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn add_member(&self, circle_id: Uuid, user_id: Uuid) -> Result<()> {
    let circle = encode_uuid(circle_id);
    let user = encode_uuid(user_id);
    let joined_at = encode_dt(chrono::Utc::now());

    let member_ids_json: Option<String> = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO circle_members (circle_id, user_id, joined_at)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![circle, user, joined_at],
        )?;
        Ok(
          conn
            .query_row(
              "SELECT member_ids FROM circles WHERE circle_id = ?1",
              rusqlite::params![circle],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    // Keep the denormalized display list in step with the membership records.
    if let Some(json) = member_ids_json {
      let mut ids: Vec<Uuid> = serde_json::from_str(&json)?;
      if !ids.contains(&user_id) {
        ids.push(user_id);
        let circle = encode_uuid(circle_id);
        let updated = encode_id_list(&ids)?;
        self
          .conn
          .call(move |conn| {
            conn.execute(
              "UPDATE circles SET member_ids = ?2 WHERE circle_id = ?1",
              rusqlite::params![circle, updated],
            )?;
            Ok(())
          })
          .await?;
      }
    }
    Ok(())
  }

  // ── Derived per-day records ───────────────────────────────────────────────

  async fn circle_day(
    &self,
    circle_id: Uuid,
    date: NaiveDate,
  ) -> Result<Option<CircleAlignmentDay>> {
    let id = encode_uuid(circle_id);
    let date = encode_date(date);

    let raw: Option<RawCircleDay> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT circle_id, date, fraction_fully_aligned,
                      num_fully_aligned, total_members, kept
               FROM circle_alignment_days
               WHERE circle_id = ?1 AND date = ?2",
              rusqlite::params![id, date],
              |row| {
                Ok(RawCircleDay {
                  circle_id:              row.get(0)?,
                  date:                   row.get(1)?,
                  fraction_fully_aligned: row.get(2)?,
                  num_fully_aligned:      row.get(3)?,
                  total_members:          row.get(4)?,
                  kept:                   row.get(5)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCircleDay::into_day).transpose()
  }

  async fn put_circle_day(&self, day: &CircleAlignmentDay) -> Result<()> {
    let id = encode_uuid(day.circle_id);
    let date = encode_date(day.date);
    let fraction = day.fraction_fully_aligned;
    let num = i64::from(day.num_fully_aligned);
    let total = i64::from(day.total_members);
    let kept = day.kept;

    self
      .conn
      .call(move |conn| {
        // Write-once: racing writers compute identical records, so the
        // first insert wins and later ones are ignored.
        conn.execute(
          "INSERT OR IGNORE INTO circle_alignment_days
             (circle_id, date, fraction_fully_aligned,
              num_fully_aligned, total_members, kept)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id, date, fraction, num, total, kept],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Circle streak summary ─────────────────────────────────────────────────

  async fn circle_summary(
    &self,
    circle_id: Uuid,
  ) -> Result<Option<CircleAlignmentSummary>> {
    let id = encode_uuid(circle_id);

    let raw: Option<RawCircleSummary> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT circle_id, current_streak, last_kept_date
               FROM circle_alignment_summaries WHERE circle_id = ?1",
              rusqlite::params![id],
              |row| {
                Ok(RawCircleSummary {
                  circle_id:      row.get(0)?,
                  current_streak: row.get(1)?,
                  last_kept_date: row.get(2)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCircleSummary::into_summary).transpose()
  }

  async fn merge_circle_summary(
    &self,
    summary: &CircleAlignmentSummary,
  ) -> Result<()> {
    let id = encode_uuid(summary.circle_id);
    let streak = i64::from(summary.current_streak);
    let last = summary.last_kept_date.map(encode_date);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO circle_alignment_summaries
             (circle_id, current_streak, last_kept_date)
           VALUES (?1, ?2, ?3)
           ON CONFLICT(circle_id) DO UPDATE SET
             current_streak = excluded.current_streak,
             last_kept_date = excluded.last_kept_date",
          rusqlite::params![id, streak, last],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn merge_circle_summary_guarded(
    &self,
    summary: &CircleAlignmentSummary,
    not_kept_on: NaiveDate,
  ) -> Result<bool> {
    let id = encode_uuid(summary.circle_id);
    let streak = i64::from(summary.current_streak);
    let last = summary.last_kept_date.map(encode_date);
    let guard = encode_date(not_kept_on);

    let changed = self
      .conn
      .call(move |conn| {
        // `IS NOT` treats NULL as a distinct value, so a missing row or a
        // never-kept circle passes the guard.
        let n = conn.execute(
          "INSERT INTO circle_alignment_summaries
             (circle_id, current_streak, last_kept_date)
           VALUES (?1, ?2, ?3)
           ON CONFLICT(circle_id) DO UPDATE SET
             current_streak = excluded.current_streak,
             last_kept_date = excluded.last_kept_date
           WHERE circle_alignment_summaries.last_kept_date IS NOT ?4",
          rusqlite::params![id, streak, last, guard],
        )?;
        Ok(n)
      })
      .await?;

    Ok(changed > 0)
  }

  // ── Stats cache fields ────────────────────────────────────────────────────

  async fn write_stats_cache(
    &self,
    circle_id: Uuid,
    entry: &CachedStats,
  ) -> Result<()> {
    let id = encode_uuid(circle_id);
    let avg = i64::from(entry.avg_alignment);
    let change = i64::from(entry.alignment_change);
    let members = encode_member_map(&entry.member_alignments)?;
    let cached_at = encode_date(entry.cached_at);
    let cached_at_ts = encode_dt(entry.cached_at_ts);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE circles SET
             cached_avg_alignment     = ?2,
             cached_alignment_change  = ?3,
             cached_member_alignments = ?4,
             cached_at                = ?5,
             cached_at_ts             = ?6
           WHERE circle_id = ?1",
          rusqlite::params![id, avg, change, members, cached_at, cached_at_ts],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn clear_stats_cache(&self, circle_id: Uuid) -> Result<()> {
    let id = encode_uuid(circle_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE circles SET
             cached_avg_alignment     = NULL,
             cached_alignment_change  = NULL,
             cached_member_alignments = NULL,
             cached_at                = NULL,
             cached_at_ts             = NULL
           WHERE circle_id = ?1",
          rusqlite::params![id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
