use chrono::{DateTime, Duration, Local, LocalResult, NaiveDate, NaiveTime, Offset, TimeZone, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// `[start, end)` of the local calendar day containing `now`, expressed in UTC.
pub fn local_day_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    day_window_in(now, &Local)
}

/// `[start, end)` of the calendar day in `tz` containing `now`. Both ends are local midnights, so
/// the window is 23 or 25 hours long on days with a DST change.
pub fn day_window_in<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let date = now.with_timezone(tz).date_naive();
    let start = start_of_day(tz, date);
    let end = date.succ_opt().map_or(DateTime::<Utc>::MAX_UTC, |next| start_of_day(tz, next));
    (start, end)
}

/// First instant of `date` in `tz`. Midnight may be ambiguous or skipped by a DST change; a
/// skipped midnight starts the day at the first local minute that exists.
fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    let mut local = midnight;
    while local.date() == date {
        match tz.from_local_datetime(&local) {
            LocalResult::Single(start) => return start.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => local += Duration::minutes(1),
        }
    }

    // No valid minute all day; shift midnight by the zone's offset at that instant.
    let offset = tz.offset_from_utc_datetime(&midnight).fix();
    Utc.from_utc_datetime(&(midnight - Duration::seconds(i64::from(offset.local_minus_utc()))))
}
