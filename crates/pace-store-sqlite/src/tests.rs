//! Integration tests for the engine against an in-memory `SqliteStore`.

use std::sync::Arc;

use chrono::{Days, Duration, NaiveDate, Utc};
use pace_core::{
  alignment::{AlignmentComponents, AlignmentScore, UserAlignment, UserAlignmentSummary},
  cache,
  circle::{CachedStats, Circle, CircleAlignmentSummary},
  dates::today_utc,
  history, percentile, stats,
  store::AlignmentStore,
  streak,
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn d(s: &str) -> NaiveDate { s.parse().unwrap() }

/// Create a circle (created well in the past) with `member_count` members
/// plus the optional coach in the membership records.
async fn seed_circle(
  s: &SqliteStore,
  coach_id: Option<Uuid>,
  member_count: usize,
) -> (Uuid, Vec<Uuid>) {
  let circle_id = Uuid::new_v4();
  let circle = Circle {
    circle_id,
    name: "test circle".into(),
    coach_id,
    member_ids: vec![],
    // Fixed instant well before both the dates the tests pin (2025-06) and
    // any real wall-clock "today"; a clock-relative offset rots over time.
    created_at: d("2025-01-01").and_time(chrono::NaiveTime::MIN).and_utc(),
    cached_stats: None,
  };
  s.create_circle(&circle).await.unwrap();

  let mut members = Vec::with_capacity(member_count);
  for _ in 0..member_count {
    let user_id = Uuid::new_v4();
    s.add_member(circle_id, user_id).await.unwrap();
    members.push(user_id);
  }
  if let Some(coach) = coach_id {
    s.add_member(circle_id, coach).await.unwrap();
  }
  (circle_id, members)
}

async fn align(s: &SqliteStore, user_id: Uuid, date: NaiveDate, points: u8) {
  let record = UserAlignment {
    user_id,
    date,
    alignment_score: AlignmentScore::new(points).unwrap(),
    fully_aligned: points == 100,
    components: AlignmentComponents::default(),
  };
  s.put_user_alignment(&record).await.unwrap();
}

// ─── Daily stats aggregator ──────────────────────────────────────────────────

#[tokio::test]
async fn averages_round_to_nearest_integer() {
  let s = store().await;
  let today = d("2025-06-10");
  let yesterday = d("2025-06-09");
  let (circle_id, members) = seed_circle(&s, None, 4).await;

  for (user, points) in members.iter().zip([100u8, 75, 50, 25]) {
    align(&s, *user, today, points).await;
  }
  for (user, points) in members.iter().zip([100u8, 100, 50, 0]) {
    align(&s, *user, yesterday, points).await;
  }

  let daily = stats::daily_stats(&s, circle_id, Some(today)).await.unwrap();
  assert_eq!(daily.avg_today, 63); // round(250 / 4)
  assert_eq!(daily.avg_yesterday, 63);
  assert_eq!(daily.change, 0);
}

#[tokio::test]
async fn change_goes_negative_when_yesterday_was_better() {
  let s = store().await;
  let today = d("2025-06-10");
  let (circle_id, members) = seed_circle(&s, None, 1).await;

  align(&s, members[0], d("2025-06-09"), 100).await;
  align(&s, members[0], today, 25).await;

  let daily = stats::daily_stats(&s, circle_id, Some(today)).await.unwrap();
  assert_eq!(daily.avg_today, 25);
  assert_eq!(daily.avg_yesterday, 100);
  assert_eq!(daily.change, -75);
}

#[tokio::test]
async fn missing_records_count_as_zero() {
  let s = store().await;
  let today = d("2025-06-10");
  let (circle_id, members) = seed_circle(&s, None, 2).await;

  align(&s, members[0], today, 100).await;
  // members[1] never checked in.

  let daily = stats::daily_stats(&s, circle_id, Some(today)).await.unwrap();
  assert_eq!(daily.avg_today, 50);
  assert_eq!(daily.avg_yesterday, 0);
  assert_eq!(daily.change, 50);
  assert_eq!(
    daily.members.get(&members[1]).unwrap().alignment_score,
    AlignmentScore::ZERO
  );
}

#[tokio::test]
async fn empty_circle_yields_all_zero_stats() {
  let s = store().await;
  let (circle_id, _) = seed_circle(&s, None, 0).await;

  let daily = stats::daily_stats(&s, circle_id, Some(d("2025-06-10")))
    .await
    .unwrap();
  assert_eq!(daily.avg_today, 0);
  assert_eq!(daily.avg_yesterday, 0);
  assert_eq!(daily.change, 0);
  assert!(daily.members.is_empty());
}

#[tokio::test]
async fn unknown_circle_behaves_as_empty() {
  let s = store().await;
  let daily = stats::daily_stats(&s, Uuid::new_v4(), Some(d("2025-06-10")))
    .await
    .unwrap();
  assert_eq!(daily.avg_today, 0);
  assert!(daily.members.is_empty());
}

#[tokio::test]
async fn coach_score_never_enters_aggregates() {
  let s = store().await;
  let today = d("2025-06-10");
  let coach = Uuid::new_v4();
  let (circle_id, members) = seed_circle(&s, Some(coach), 2).await;

  align(&s, members[0], today, 50).await;
  align(&s, members[1], today, 50).await;
  align(&s, coach, today, 0).await;

  let low = stats::daily_stats(&s, circle_id, Some(today)).await.unwrap();
  let low_day = history::circle_day(&s, circle_id, Some(coach), today, today)
    .await
    .unwrap();

  // Swap the coach's score; every aggregate must be unchanged.
  align(&s, coach, today, 100).await;
  let high = stats::daily_stats(&s, circle_id, Some(today)).await.unwrap();
  let high_day = history::circle_day(&s, circle_id, Some(coach), today, today)
    .await
    .unwrap();

  assert_eq!(low.avg_today, high.avg_today);
  assert_eq!(low.avg_yesterday, high.avg_yesterday);
  assert_eq!(low.change, high.change);
  assert_eq!(low_day.fraction_fully_aligned, high_day.fraction_fully_aligned);
  assert_eq!(low_day.kept, high_day.kept);

  // The display map is the one surface that does show the coach.
  assert_eq!(
    low.members.get(&coach).unwrap().alignment_score,
    AlignmentScore::ZERO
  );
  assert_eq!(
    high.members.get(&coach).unwrap().alignment_score,
    AlignmentScore::FULL
  );
}

#[tokio::test]
async fn display_map_carries_per_user_streaks() {
  let s = store().await;
  let today = d("2025-06-10");
  let (circle_id, members) = seed_circle(&s, None, 2).await;

  s.merge_user_summary(&UserAlignmentSummary {
    user_id:           members[0],
    current_streak:    12,
    last_aligned_date: Some(today),
  })
  .await
  .unwrap();

  let daily = stats::daily_stats(&s, circle_id, Some(today)).await.unwrap();
  assert_eq!(daily.members.get(&members[0]).unwrap().current_streak, 12);
  assert_eq!(daily.members.get(&members[1]).unwrap().current_streak, 0);
}

#[tokio::test]
async fn batch_fetch_handles_more_members_than_one_chunk() {
  let s = store().await;
  let today = d("2025-06-10");
  // Twice the chunk size plus a remainder.
  let (circle_id, members) = seed_circle(&s, None, 65).await;

  for user in &members {
    align(&s, *user, today, 100).await;
  }

  let daily = stats::daily_stats(&s, circle_id, Some(today)).await.unwrap();
  assert_eq!(daily.avg_today, 100);
  assert_eq!(daily.members.len(), 65);
}

// ─── Contribution history ────────────────────────────────────────────────────

#[tokio::test]
async fn past_day_is_computed_once_and_persisted() {
  let s = store().await;
  let today = d("2025-06-10");
  let past = d("2025-06-08");
  let (circle_id, members) = seed_circle(&s, None, 2).await;

  align(&s, members[0], past, 100).await;

  let first = history::circle_day(&s, circle_id, None, past, today)
    .await
    .unwrap();
  assert_eq!(first.num_fully_aligned, 1);
  assert_eq!(first.total_members, 2);
  assert_eq!(first.fraction_fully_aligned, 0.5);
  assert!(first.kept);

  // The record must now be in the store.
  let stored = s.circle_day(circle_id, past).await.unwrap().unwrap();
  assert_eq!(stored, first);

  // A racing recompute yields the identical record.
  let second = history::circle_day(&s, circle_id, None, past, today)
    .await
    .unwrap();
  assert_eq!(second, first);

  // Once persisted, the past day is immutable truth: later alignment edits
  // do not change what is served.
  align(&s, members[1], past, 100).await;
  let third = history::circle_day(&s, circle_id, None, past, today)
    .await
    .unwrap();
  assert_eq!(third, first);
}

#[tokio::test]
async fn todays_day_is_always_recomputed_and_never_persisted() {
  let s = store().await;
  let today = d("2025-06-10");
  let (circle_id, members) = seed_circle(&s, None, 2).await;

  let before = history::circle_day(&s, circle_id, None, today, today)
    .await
    .unwrap();
  assert!(!before.kept);
  assert!(s.circle_day(circle_id, today).await.unwrap().is_none());

  align(&s, members[0], today, 100).await;
  align(&s, members[1], today, 100).await;

  let after = history::circle_day(&s, circle_id, None, today, today)
    .await
    .unwrap();
  assert_eq!(after.num_fully_aligned, 2);
  assert!(after.kept);
}

#[tokio::test]
async fn history_is_oldest_first_with_rounded_rates() {
  let s = store().await;
  let today = d("2025-06-10");
  let (circle_id, members) = seed_circle(&s, None, 3).await;

  // Two of three fully aligned yesterday, one the day before.
  align(&s, members[0], d("2025-06-09"), 100).await;
  align(&s, members[1], d("2025-06-09"), 100).await;
  align(&s, members[0], d("2025-06-08"), 100).await;

  let timeline =
    history::contribution_history(&s, circle_id, 3, 0, Some(today))
      .await
      .unwrap();

  assert_eq!(timeline.len(), 3);
  assert_eq!(timeline[0].date, d("2025-06-08"));
  assert_eq!(timeline[0].completion_rate, 33); // round(1/3 * 100)
  assert_eq!(timeline[1].date, d("2025-06-09"));
  assert_eq!(timeline[1].completion_rate, 67);
  assert_eq!(timeline[2].date, today);
  assert_eq!(timeline[2].completion_rate, 0);
}

#[tokio::test]
async fn history_pagination_shifts_the_window() {
  let s = store().await;
  let today = d("2025-06-10");
  let (circle_id, _) = seed_circle(&s, None, 1).await;

  let page =
    history::contribution_history(&s, circle_id, 2, 7, Some(today))
      .await
      .unwrap();

  assert_eq!(page.len(), 2);
  assert_eq!(page[0].date, d("2025-06-02"));
  assert_eq!(page[1].date, d("2025-06-03"));
}

#[tokio::test]
async fn history_stops_at_circle_creation() {
  let s = store().await;
  let today = today_utc();
  let circle_id = Uuid::new_v4();
  let circle = Circle {
    circle_id,
    name: "young circle".into(),
    coach_id: None,
    member_ids: vec![],
    created_at: Utc::now() - Duration::days(2),
    cached_stats: None,
  };
  s.create_circle(&circle).await.unwrap();
  s.add_member(circle_id, Uuid::new_v4()).await.unwrap();

  let timeline =
    history::contribution_history(&s, circle_id, 30, 0, Some(today))
      .await
      .unwrap();

  // Creation day, the day after, and today.
  assert_eq!(timeline.len(), 3);
  assert_eq!(timeline[0].date, today.checked_sub_days(Days::new(2)).unwrap());
}

// ─── Streak engine ───────────────────────────────────────────────────────────

async fn kept_today(s: &SqliteStore, members: &[Uuid], today: NaiveDate) {
  for user in members {
    align(s, *user, today, 100).await;
  }
}

#[tokio::test]
async fn kept_day_continues_a_streak_from_yesterday() {
  let s = store().await;
  let today = d("2025-06-10");
  let (circle_id, members) = seed_circle(&s, None, 2).await;
  kept_today(&s, &members, today).await;

  s.merge_circle_summary(&CircleAlignmentSummary {
    circle_id,
    current_streak: 3,
    last_kept_date: Some(d("2025-06-09")),
  })
  .await
  .unwrap();

  let summary = streak::evaluate_streak(&s, circle_id, Some(today)).await.unwrap();
  assert_eq!(summary.current_streak, 4);
  assert_eq!(summary.last_kept_date, Some(today));
}

#[tokio::test]
async fn kept_day_after_a_gap_starts_a_new_streak() {
  let s = store().await;
  let today = d("2025-06-10");
  let (circle_id, members) = seed_circle(&s, None, 2).await;
  kept_today(&s, &members, today).await;

  s.merge_circle_summary(&CircleAlignmentSummary {
    circle_id,
    current_streak: 5,
    last_kept_date: Some(d("2025-06-08")),
  })
  .await
  .unwrap();

  let summary = streak::evaluate_streak(&s, circle_id, Some(today)).await.unwrap();
  assert_eq!(summary.current_streak, 1);
  assert_eq!(summary.last_kept_date, Some(today));
}

#[tokio::test]
async fn missed_day_keeps_yesterdays_streak_for_the_rest_of_today() {
  let s = store().await;
  let today = d("2025-06-10");
  let (circle_id, _) = seed_circle(&s, None, 2).await;
  // Nobody aligned today.

  s.merge_circle_summary(&CircleAlignmentSummary {
    circle_id,
    current_streak: 2,
    last_kept_date: Some(d("2025-06-09")),
  })
  .await
  .unwrap();

  let summary = streak::evaluate_streak(&s, circle_id, Some(today)).await.unwrap();
  assert_eq!(summary.current_streak, 2);
  assert_eq!(summary.last_kept_date, Some(d("2025-06-09")));
}

#[tokio::test]
async fn streak_resets_once_a_full_day_has_passed() {
  let s = store().await;
  let today = d("2025-06-10");
  let (circle_id, _) = seed_circle(&s, None, 2).await;

  s.merge_circle_summary(&CircleAlignmentSummary {
    circle_id,
    current_streak: 4,
    last_kept_date: Some(d("2025-06-07")),
  })
  .await
  .unwrap();

  let summary = streak::evaluate_streak(&s, circle_id, Some(today)).await.unwrap();
  assert_eq!(summary.current_streak, 0);
  assert_eq!(summary.last_kept_date, Some(d("2025-06-07")));
}

#[tokio::test]
async fn evaluation_is_idempotent_within_a_day() {
  let s = store().await;
  let today = d("2025-06-10");
  let (circle_id, members) = seed_circle(&s, None, 2).await;
  kept_today(&s, &members, today).await;

  let first = streak::evaluate_streak(&s, circle_id, Some(today)).await.unwrap();
  assert_eq!(first.current_streak, 1);

  // A second evaluation the same day short-circuits on last_kept_date.
  let second = streak::evaluate_streak(&s, circle_id, Some(today)).await.unwrap();
  assert_eq!(second, first);
}

#[tokio::test]
async fn guarded_write_rejects_a_second_transition_for_the_same_day() {
  let s = store().await;
  let today = d("2025-06-10");
  let (circle_id, _) = seed_circle(&s, None, 1).await;

  let summary = CircleAlignmentSummary {
    circle_id,
    current_streak: 1,
    last_kept_date: Some(today),
  };
  assert!(s.merge_circle_summary_guarded(&summary, today).await.unwrap());

  // A racing caller that read the pre-transition summary must lose.
  let racing = CircleAlignmentSummary {
    circle_id,
    current_streak: 2,
    last_kept_date: Some(today),
  };
  assert!(!s.merge_circle_summary_guarded(&racing, today).await.unwrap());

  let stored = s.circle_summary(circle_id).await.unwrap().unwrap();
  assert_eq!(stored.current_streak, 1);
}

// ─── Percentile ranker ───────────────────────────────────────────────────────

#[tokio::test]
async fn percentile_ranks_by_todays_average() {
  let s = store().await;
  let today = d("2025-06-10");

  let (best, best_members) = seed_circle(&s, None, 2).await;
  let (middle, middle_members) = seed_circle(&s, None, 2).await;
  let (worst, _) = seed_circle(&s, None, 2).await;

  for user in &best_members {
    align(&s, *user, today, 100).await;
  }
  align(&s, middle_members[0], today, 50).await;
  // worst: nobody aligned.

  let best_pct = percentile::percentile(&s, best, Some(today)).await.unwrap();
  let middle_pct = percentile::percentile(&s, middle, Some(today)).await.unwrap();
  let worst_pct = percentile::percentile(&s, worst, Some(today)).await.unwrap();

  assert_eq!(best_pct, 34); // ceil(1/3 * 100)
  assert_eq!(middle_pct, 67);
  assert_eq!(worst_pct, 100);
  assert!(best_pct <= middle_pct && middle_pct <= worst_pct);
}

#[tokio::test]
async fn memberless_circle_sorts_last() {
  let s = store().await;
  let today = d("2025-06-10");

  let (scored, members) = seed_circle(&s, None, 1).await;
  align(&s, members[0], today, 25).await;
  let (empty, _) = seed_circle(&s, None, 0).await;

  let scored_pct = percentile::percentile(&s, scored, Some(today)).await.unwrap();
  let empty_pct = percentile::percentile(&s, empty, Some(today)).await.unwrap();

  assert!(scored_pct < empty_pct);
  assert_eq!(empty_pct, 100);
}

#[tokio::test]
async fn empty_corpus_is_top_hundred() {
  let s = store().await;
  let pct = percentile::percentile(&s, Uuid::new_v4(), Some(d("2025-06-10")))
    .await
    .unwrap();
  assert_eq!(pct, 100);
}

// ─── Stats cache ─────────────────────────────────────────────────────────────

fn sentinel_entry(cached_at: NaiveDate, age_secs: i64) -> CachedStats {
  CachedStats {
    avg_alignment:     99,
    alignment_change:  9,
    member_alignments: Default::default(),
    cached_at,
    cached_at_ts:      Utc::now() - Duration::seconds(age_secs),
  }
}

#[tokio::test]
async fn fresh_cache_entry_is_served() {
  let s = Arc::new(store().await);
  let today = today_utc();
  let (circle_id, members) = seed_circle(&s, None, 2).await;
  align(&s, members[0], today, 100).await;

  s.write_stats_cache(circle_id, &sentinel_entry(today, 10))
    .await
    .unwrap();

  let served = cache::basic_stats(&s, circle_id).await.unwrap();
  assert_eq!(served.avg_alignment, 99);
  assert_eq!(served.alignment_change, 9);
}

#[tokio::test]
async fn streak_is_never_served_from_the_cache() {
  let s = Arc::new(store().await);
  let today = today_utc();
  let (circle_id, _) = seed_circle(&s, None, 2).await;

  s.write_stats_cache(circle_id, &sentinel_entry(today, 10))
    .await
    .unwrap();
  s.merge_circle_summary(&CircleAlignmentSummary {
    circle_id,
    current_streak: 7,
    last_kept_date: Some(today),
  })
  .await
  .unwrap();

  let served = cache::basic_stats(&s, circle_id).await.unwrap();
  assert_eq!(served.avg_alignment, 99); // cache hit for the aggregates
  assert_eq!(served.streak.current_streak, 7); // read fresh all the same
}

#[tokio::test]
async fn invalidation_forces_a_recompute_within_the_ttl() {
  let s = Arc::new(store().await);
  let today = today_utc();
  let (circle_id, members) = seed_circle(&s, None, 2).await;
  align(&s, members[0], today, 100).await;
  align(&s, members[1], today, 50).await;

  s.write_stats_cache(circle_id, &sentinel_entry(today, 10))
    .await
    .unwrap();
  cache::invalidate(s.as_ref(), circle_id).await;

  let served = cache::basic_stats(&s, circle_id).await.unwrap();
  assert_eq!(served.avg_alignment, 75); // recomputed, not the sentinel
}

#[tokio::test]
async fn entry_older_than_the_ttl_is_a_miss() {
  let s = Arc::new(store().await);
  let today = today_utc();
  let (circle_id, members) = seed_circle(&s, None, 1).await;
  align(&s, members[0], today, 50).await;

  s.write_stats_cache(circle_id, &sentinel_entry(today, 6 * 60))
    .await
    .unwrap();

  let served = cache::basic_stats(&s, circle_id).await.unwrap();
  assert_eq!(served.avg_alignment, 50);
}

#[tokio::test]
async fn entry_from_a_previous_day_is_a_miss() {
  let s = Arc::new(store().await);
  let today = today_utc();
  let yesterday = today.checked_sub_days(Days::new(1)).unwrap();
  let (circle_id, members) = seed_circle(&s, None, 1).await;
  align(&s, members[0], today, 25).await;

  s.write_stats_cache(circle_id, &sentinel_entry(yesterday, 10))
    .await
    .unwrap();

  let served = cache::basic_stats(&s, circle_id).await.unwrap();
  assert_eq!(served.avg_alignment, 25);
}

#[tokio::test]
async fn unknown_circle_serves_empty_stats() {
  let s = Arc::new(store().await);
  let served = cache::basic_stats(&s, Uuid::new_v4()).await.unwrap();
  assert_eq!(served.avg_alignment, 0);
  assert!(served.members.is_empty());
  assert_eq!(served.streak.current_streak, 0);
}

// ─── Store round-trips ───────────────────────────────────────────────────────

#[tokio::test]
async fn circle_roundtrip_with_cache_entry() {
  let s = store().await;
  let coach = Uuid::new_v4();
  let (circle_id, _) = seed_circle(&s, Some(coach), 2).await;

  let today = today_utc();
  s.write_stats_cache(circle_id, &sentinel_entry(today, 0))
    .await
    .unwrap();

  let circle = s.circle(circle_id).await.unwrap().unwrap();
  assert_eq!(circle.coach_id, Some(coach));
  let cached = circle.cached_stats.unwrap();
  assert_eq!(cached.avg_alignment, 99);
  assert_eq!(cached.cached_at, today);

  s.clear_stats_cache(circle_id).await.unwrap();
  let circle = s.circle(circle_id).await.unwrap().unwrap();
  assert!(circle.cached_stats.is_none());
}

#[tokio::test]
async fn add_member_is_idempotent_and_tracks_the_display_list() {
  let s = store().await;
  let (circle_id, members) = seed_circle(&s, None, 2).await;

  s.add_member(circle_id, members[0]).await.unwrap();

  let listed = s.circle_members(circle_id).await.unwrap();
  assert_eq!(listed.len(), 2);

  let circle = s.circle(circle_id).await.unwrap().unwrap();
  assert_eq!(circle.member_ids.len(), 2);
  assert!(circle.member_ids.contains(&members[0]));
  assert!(circle.member_ids.contains(&members[1]));
}

#[tokio::test]
async fn membership_is_queryable_by_user() {
  let s = store().await;
  let user = Uuid::new_v4();
  let (first, _) = seed_circle(&s, None, 0).await;
  let (second, _) = seed_circle(&s, None, 0).await;
  s.add_member(first, user).await.unwrap();
  s.add_member(second, user).await.unwrap();

  let mut circles = s.circles_of_member(user).await.unwrap();
  circles.sort();
  let mut expected = vec![first, second];
  expected.sort();
  assert_eq!(circles, expected);
}
