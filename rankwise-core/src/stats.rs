/// Aggregate comparison activity: totals, daily streak and a rolling week.
///
/// Owned by the engine and changed only through the methods below; nothing
/// global. Days are UTC midnights in epoch milliseconds.
use crate::constants::{ACTIVITY_WINDOW_DAYS, DAY_MS};
use crate::types::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DailyCount {
    pub day: Timestamp,
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActivityStats {
    pub total_comparisons: u64,
    pub tie_count: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_comparison_day: Option<Timestamp>,
    /// At most `ACTIVITY_WINDOW_DAYS` entries, oldest first.
    pub recent_days: Vec<DailyCount>,
}

/// Read-side view of `ActivityStats` for a given moment.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActivitySnapshot {
    pub total_comparisons: u64,
    pub tie_count: u64,
    pub today_comparisons: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// One count per day for the last week, oldest first, today last.
    pub last_7_days: Vec<DailyCount>,
}

/// UTC midnight of the day containing `ts`.
pub fn day_start(ts: Timestamp) -> Timestamp {
    ts - ts.rem_euclid(DAY_MS)
}

impl ActivityStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A `now` earlier than the last recorded day (clock skew) counts toward
    /// that day's totals but never moves the streak backwards.
    pub fn record_comparison(&mut self, is_tie: bool, now: Timestamp) {
        let today = day_start(now);

        self.total_comparisons += 1;
        if is_tie {
            self.tie_count += 1;
        }

        match self.last_comparison_day {
            Some(day) if today <= day => {}
            Some(day) if day == today - DAY_MS => {
                self.current_streak += 1;
            }
            _ => self.current_streak = 1,
        }
        self.longest_streak = self.longest_streak.max(self.current_streak);
        let latest = self.last_comparison_day.map_or(today, |day| day.max(today));
        self.last_comparison_day = Some(latest);

        match self.recent_days.binary_search_by_key(&today, |d| d.day) {
            Ok(i) => self.recent_days[i].count += 1,
            Err(i) => self.recent_days.insert(i, DailyCount { day: today, count: 1 }),
        }
        let window_start = latest - (ACTIVITY_WINDOW_DAYS as i64 - 1) * DAY_MS;
        self.recent_days.retain(|d| d.day >= window_start);
    }

    /// Reverses the counters of an undone comparison. Streaks are left as they are.
    pub fn revert_comparison(&mut self, is_tie: bool, created_at: Timestamp) {
        self.total_comparisons = self.total_comparisons.saturating_sub(1);
        if is_tie {
            self.tie_count = self.tie_count.saturating_sub(1);
        }
        let day = day_start(created_at);
        if let Some(entry) = self.recent_days.iter_mut().find(|d| d.day == day) {
            entry.count = entry.count.saturating_sub(1);
        }
    }

    pub fn snapshot(&self, now: Timestamp) -> ActivitySnapshot {
        let today = day_start(now);
        let count_on = |day: Timestamp| {
            self.recent_days
                .iter()
                .find(|d| d.day == day)
                .map_or(0, |d| d.count)
        };

        let last_7_days = (0..ACTIVITY_WINDOW_DAYS as i64)
            .rev()
            .map(|back| {
                let day = today - back * DAY_MS;
                DailyCount { day, count: count_on(day) }
            })
            .collect();

        ActivitySnapshot {
            total_comparisons: self.total_comparisons,
            tie_count: self.tie_count,
            today_comparisons: count_on(today),
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
            last_7_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOON: i64 = 12 * 60 * 60 * 1000;

    fn at_day(day: i64) -> Timestamp {
        day * DAY_MS + NOON
    }

    #[test]
    fn test_day_start() {
        assert_eq!(day_start(at_day(3)), 3 * DAY_MS);
        assert_eq!(day_start(3 * DAY_MS), 3 * DAY_MS);
        assert_eq!(day_start(-1), -DAY_MS);
    }

    #[test]
    fn test_streak_rules() {
        let mut stats = ActivityStats::new();
        stats.record_comparison(false, at_day(10));
        assert_eq!(stats.current_streak, 1);

        stats.record_comparison(false, at_day(10) + 1000);
        assert_eq!(stats.current_streak, 1);

        stats.record_comparison(true, at_day(11));
        stats.record_comparison(false, at_day(12));
        assert_eq!(stats.current_streak, 3);
        assert_eq!(stats.longest_streak, 3);

        // Gap resets the current streak but keeps the record.
        stats.record_comparison(false, at_day(20));
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.longest_streak, 3);
        assert_eq!(stats.total_comparisons, 5);
        assert_eq!(stats.tie_count, 1);
    }

    #[test]
    fn test_rolling_window_and_snapshot() {
        let mut stats = ActivityStats::new();
        for day in 0..10 {
            stats.record_comparison(false, at_day(day));
        }
        stats.record_comparison(false, at_day(9));
        assert_eq!(stats.recent_days.len(), ACTIVITY_WINDOW_DAYS);

        let snapshot = stats.snapshot(at_day(9));
        assert_eq!(snapshot.today_comparisons, 2);
        assert_eq!(snapshot.last_7_days.len(), 7);
        assert_eq!(snapshot.last_7_days[0].day, 3 * DAY_MS);
        assert_eq!(snapshot.last_7_days[6].count, 2);
    }

    #[test]
    fn test_earlier_day_keeps_streak_and_order() {
        let mut stats = ActivityStats::new();
        stats.record_comparison(false, at_day(9));
        stats.record_comparison(false, at_day(10));
        stats.record_comparison(false, at_day(8));

        assert_eq!(stats.current_streak, 2);
        assert_eq!(stats.last_comparison_day, Some(10 * DAY_MS));
        let days: Vec<Timestamp> = stats.recent_days.iter().map(|d| d.day).collect();
        assert_eq!(days, vec![8 * DAY_MS, 9 * DAY_MS, 10 * DAY_MS]);

        // The streak continues from the latest day, not the late arrival.
        stats.record_comparison(false, at_day(11));
        assert_eq!(stats.current_streak, 3);

        // Out-of-window late arrivals are dropped from the series but still counted.
        stats.record_comparison(false, at_day(1));
        assert_eq!(stats.recent_days.first().map(|d| d.day), Some(8 * DAY_MS));
        assert_eq!(stats.total_comparisons, 5);
    }

    #[test]
    fn test_revert_never_underflows() {
        let mut stats = ActivityStats::new();
        stats.revert_comparison(true, at_day(1));
        assert_eq!(stats.total_comparisons, 0);
        assert_eq!(stats.tie_count, 0);

        stats.record_comparison(true, at_day(1));
        stats.revert_comparison(true, at_day(1));
        assert_eq!(stats.total_comparisons, 0);
        assert_eq!(stats.snapshot(at_day(1)).today_comparisons, 0);
    }
}
