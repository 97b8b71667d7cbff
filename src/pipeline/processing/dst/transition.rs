use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// Widest DST shift searched around a skipped wall-clock time
const MAX_SHIFT_HOURS: i64 = 3;

/// How a wall-clock time maps onto real instants in a timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallClock {
    Unique(DateTime<Utc>),
    /// Falls in the hour repeated by a fall-back transition
    Repeated {
        earliest: DateTime<Utc>,
        latest: DateTime<Utc>,
    },
    /// Falls in the hour skipped by a spring-forward transition
    Skipped { transition: DateTime<Utc> },
}

impl WallClock {
    /// Instant used for validation: the earlier instant for repeated times and
    /// the transition itself for skipped times
    pub fn instant(self) -> DateTime<Utc> {
        match self {
            WallClock::Unique(instant) => instant,
            WallClock::Repeated { earliest, .. } => earliest,
            WallClock::Skipped { transition } => transition,
        }
    }
}

/// The repeated wall-clock hour around a fall-back transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatedWindow {
    pub transition: DateTime<Utc>,
    /// First repeated wall-clock time (inclusive)
    pub wall_start: NaiveDateTime,
    /// Wall-clock time at which the repetition ends (exclusive)
    pub wall_end: NaiveDateTime,
    /// Instant at which `wall_end` occurs
    pub reopens_at: DateTime<Utc>,
}

/// UTC offset of `tz` at `instant`, in seconds
pub fn offset_seconds(tz: &Tz, instant: DateTime<Utc>) -> i32 {
    tz.offset_from_utc_datetime(&instant.naive_utc())
        .fix()
        .local_minus_utc()
}

/// First whole second in `(from, to]` whose offset differs from the offset at
/// `from`. `None` when both ends share an offset.
pub fn find_transition(tz: &Tz, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let base = offset_seconds(tz, from);
    if to <= from || offset_seconds(tz, to) == base {
        return None;
    }
    let mut lo = from.timestamp();
    let mut hi = to.timestamp();
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        let instant = Utc.timestamp_opt(mid, 0).single()?;
        if offset_seconds(tz, instant) == base {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Utc.timestamp_opt(hi, 0).single()
}

/// Map a wall-clock time in `tz` onto real instants
pub fn resolve_wall_clock(tz: &Tz, wall: NaiveDateTime) -> WallClock {
    match tz.from_local_datetime(&wall) {
        LocalResult::Single(dt) => WallClock::Unique(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, latest) => WallClock::Repeated {
            earliest: earliest.with_timezone(&Utc),
            latest: latest.with_timezone(&Utc),
        },
        LocalResult::None => {
            let window = Duration::hours(MAX_SHIFT_HOURS);
            let before = tz.from_local_datetime(&(wall - window)).earliest();
            let after = tz.from_local_datetime(&(wall + window)).latest();
            let transition = match (before, after) {
                (Some(before), Some(after)) => find_transition(
                    tz,
                    before.with_timezone(&Utc),
                    after.with_timezone(&Utc),
                ),
                _ => None,
            };
            WallClock::Skipped {
                transition: transition.unwrap_or_else(|| Utc.from_utc_datetime(&wall)),
            }
        }
    }
}

/// Locate the repeated hour that contains an ambiguous wall-clock time
pub fn repeated_window(
    tz: &Tz,
    earliest: DateTime<Utc>,
    latest: DateTime<Utc>,
) -> Option<RepeatedWindow> {
    let transition = find_transition(tz, earliest, latest)?;
    let before = offset_seconds(tz, earliest) as i64;
    let after = offset_seconds(tz, latest) as i64;
    Some(RepeatedWindow {
        transition,
        wall_start: transition.naive_utc() + Duration::seconds(after),
        wall_end: transition.naive_utc() + Duration::seconds(before),
        reopens_at: transition + Duration::seconds(before - after),
    })
}

/// Wall-clock time of `instant` in `tz`
pub fn wall_clock_of(tz: &Tz, instant: DateTime<Utc>) -> NaiveDateTime {
    instant.with_timezone(tz).naive_local()
}
