//! Calendar-day helpers.
//!
//! All alignment bookkeeping is keyed by UTC calendar date. Operations that
//! need "today" accept an `as_of` override so tests (and backfills) can pin
//! the clock; these helpers supply the defaults and the window arithmetic.

use chrono::{Days, NaiveDate, Utc};

/// The current UTC calendar date.
pub fn today_utc() -> NaiveDate { Utc::now().date_naive() }

/// The calendar day before `date`.
pub fn day_before(date: NaiveDate) -> NaiveDate {
  // NaiveDate::MIN is centuries out of range for real data; saturate rather
  // than panic.
  date.checked_sub_days(Days::new(1)).unwrap_or(NaiveDate::MIN)
}

/// The dates covered by a history request, newest first.
///
/// The window is `[today - offset - days + 1 ..= today - offset]`, truncated
/// once a date precedes `not_before` (a circle has no history before it
/// existed).
pub fn history_window(
  today:      NaiveDate,
  days:       u32,
  offset:     u32,
  not_before: Option<NaiveDate>,
) -> Vec<NaiveDate> {
  let newest = today
    .checked_sub_days(Days::new(u64::from(offset)))
    .unwrap_or(NaiveDate::MIN);

  (0..days)
    .map_while(|i| newest.checked_sub_days(Days::new(u64::from(i))))
    .take_while(|date| not_before.is_none_or(|floor| *date >= floor))
    .collect()
}
