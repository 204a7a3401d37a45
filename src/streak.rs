//! Consecutive study-day tracking.

use chrono::NaiveDate;

use crate::models::StreakRecord;

/// Number of study dates retained; older ones are dropped first.
pub const MAX_STUDY_DATES: usize = 30;

/// Record a study session on `today`. Recording the same day twice is a no-op.
pub fn record_study_event(record: &StreakRecord, today: NaiveDate) -> StreakRecord {
    if record.study_dates.contains(&today) {
        return record.clone();
    }

    let previous = record
        .study_dates
        .range(..today)
        .next_back()
        .copied()
        .or(record.last_study_date.filter(|d| *d < today));

    let mut next = record.clone();
    next.study_dates.insert(today);
    next.total_study_days = next.total_study_days.saturating_add(1);

    let latest = record
        .study_dates
        .last()
        .copied()
        .into_iter()
        .chain(record.last_study_date)
        .max()
        .filter(|d| *d > today);
    next.last_study_date = Some(latest.unwrap_or(today));

    next.current_streak = match (latest, previous) {
        // A back-dated session can only fill a gap in the run ending at the
        // latest study day.
        (Some(latest), _) => walk_streak(&next, latest).max(record.current_streak),
        // Retained dates may not reach back to the start of a long streak.
        (None, Some(prev)) if (today - prev).num_days() == 1 => {
            walk_streak(&next, today).max(record.current_streak.saturating_add(1))
        }
        (None, _) => walk_streak(&next, today),
    };
    next.longest_streak = next.longest_streak.max(next.current_streak);
    trim_study_dates(&mut next);
    next
}

/// Normalize a record loaded from storage: a gap of more than one day since
/// the last study day breaks the streak.
pub fn refresh_on_load(record: &StreakRecord, today: NaiveDate) -> StreakRecord {
    let mut next = record.clone();
    let last = record
        .last_study_date
        .into_iter()
        .chain(record.study_dates.last().copied())
        .max();

    if let Some(last) = last {
        if (today - last).num_days() > 1 && next.current_streak != 0 {
            log::info!("Streak broken: last study day was {}", last);
            next.current_streak = 0;
        }
        next.last_study_date = Some(last);
    }
    next.longest_streak = next.longest_streak.max(next.current_streak);
    trim_study_dates(&mut next);
    next
}

/// Count consecutive days ending at `today`.
fn walk_streak(record: &StreakRecord, today: NaiveDate) -> u32 {
    let mut streak = 1;
    let mut expected = today;
    for date in record.study_dates.range(..today).rev() {
        if (expected - *date).num_days() > 1 {
            break;
        }
        streak += 1;
        expected = *date;
    }
    streak
}

fn trim_study_dates(record: &mut StreakRecord) {
    while record.study_dates.len() > MAX_STUDY_DATES {
        record.study_dates.pop_first();
    }
}
