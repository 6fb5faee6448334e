//! Review scheduler
//!
//! Maps a difficulty tier to its fixed day-offset schedule. Pure; the
//! current time is an explicit input of the `_at` variants.

use crate::config::{EASY_REVIEW_SCHEDULE, HARD_REVIEW_SCHEDULE, MEDIUM_REVIEW_SCHEDULE};
use crate::database::Difficulty;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewScheduler;

impl ReviewScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Day offsets for a tier; empty for `Difficulty::None`
    pub fn schedule(&self, difficulty: Difficulty) -> &'static [i64] {
        match difficulty {
            Difficulty::Easy => EASY_REVIEW_SCHEDULE,
            Difficulty::Medium => MEDIUM_REVIEW_SCHEDULE,
            Difficulty::Hard => HARD_REVIEW_SCHEDULE,
            Difficulty::None => &[],
        }
    }

    /// Number of reviews a fresh note of this tier goes through
    pub fn total_reviews(&self, difficulty: Difficulty) -> i64 {
        self.schedule(difficulty).len() as i64
    }

    pub fn next_review_date(&self, difficulty: Difficulty, reviews_left: i64) -> DateTime<Utc> {
        self.next_review_date_at(Utc::now(), difficulty, reviews_left)
    }

    /// Date of the next review when `reviews_left` reviews remain.
    ///
    /// Out-of-range counts and `Difficulty::None` yield `now`; callers only
    /// schedule when `reviews_left > 0`.
    pub fn next_review_date_at(
        &self,
        now: DateTime<Utc>,
        difficulty: Difficulty,
        reviews_left: i64,
    ) -> DateTime<Utc> {
        let schedule = self.schedule(difficulty);
        let length = schedule.len() as i64;

        if reviews_left < 1 || reviews_left > length {
            return now;
        }

        let days = schedule[(length - reviews_left) as usize];
        now + Duration::days(days)
    }

    /// `Some(date)` while reviews remain, `None` once the schedule is done
    pub fn schedule_next_at(
        &self,
        now: DateTime<Utc>,
        difficulty: Difficulty,
        reviews_left: i64,
    ) -> Option<DateTime<Utc>> {
        (reviews_left > 0).then(|| self.next_review_date_at(now, difficulty, reviews_left))
    }
}
