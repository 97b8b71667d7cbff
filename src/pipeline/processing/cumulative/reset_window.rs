use chrono::{Duration, NaiveDateTime, NaiveTime};

/// Longest interval for which every day is checked individually; anything
/// longer always covers a full window
const MAX_DAYS_SCANNED: i64 = 3;

/// Daily time-of-day window in which a counter drop counts as a reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl ResetWindow {
    /// `end < start` wraps past midnight; `end == start` covers the whole day
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    fn covers_whole_day(&self) -> bool {
        self.start == self.end
    }

    fn wraps(&self) -> bool {
        self.end < self.start
    }

    /// Whether the wall-clock interval `[from, to)` touches the window on any
    /// day. A zero-length interval touches it when its instant is inside.
    pub fn intersects(&self, from: NaiveDateTime, to: NaiveDateTime) -> bool {
        if self.covers_whole_day() {
            return true;
        }
        if to < from {
            return false;
        }
        if (to - from) > Duration::days(MAX_DAYS_SCANNED) {
            return true;
        }

        // Windows that wrap start on the previous day
        let mut day = from.date() - Duration::days(1);
        let last = to.date();
        while day <= last {
            let window_start = day.and_time(self.start);
            let window_end = if self.wraps() {
                (day + Duration::days(1)).and_time(self.end)
            } else {
                day.and_time(self.end)
            };
            let hit = if from == to {
                window_start <= from && from < window_end
            } else {
                from < window_end && window_start < to
            };
            if hit {
                return true;
            }
            day += Duration::days(1);
        }
        false
    }
}
