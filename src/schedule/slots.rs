//! Slot generation: discretizes resolved availability windows into
//! fixed-duration bookable slots and tags each with its availability
//! against the current booking ledger.
//!
//! All slot arithmetic happens in the recruiter's time zone (a fixed UTC
//! offset), so local wall-clock times and UTC instants round-trip exactly.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use super::types::{DayWindows, Slot};

/// An occupied interval `[start, end)` taken from the ledger, before buffer
/// widening.
#[derive(Debug, Clone, Copy)]
pub struct ActiveWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Converts a local wall-clock time on a date to its UTC instant.
pub fn local_to_utc(date: NaiveDate, time: NaiveTime, tz: FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(time);
    Utc.from_utc_datetime(&(local - Duration::seconds(tz.local_minus_utc() as i64)))
}

/// The local calendar date a UTC instant falls on.
pub fn utc_to_local_date(at: DateTime<Utc>, tz: FixedOffset) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

/// Whether booking `[start, end)` would violate the occupancy invariant
/// against an existing booking, with `buffer` idle time required between
/// consecutive bookings in either direction.
fn violates_buffer(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    booked: &ActiveWindow,
    buffer: Duration,
) -> bool {
    start < booked.end + buffer && booked.start < end + buffer
}

/// Walks each resolved window in `slot_duration_minutes` steps and emits
/// every slot that fits entirely inside the window, in chronological order.
///
/// A slot is `available` iff booking it would keep at least
/// `buffer_minutes` of idle time to every window in `booked` — the same
/// rule the ledger enforces, so an available slot is always bookable at
/// the moment it was generated. Unavailable slots are emitted too, flagged,
/// for blocked-slot rendering.
pub fn generate_slots(
    days: &[DayWindows],
    slot_duration_minutes: u32,
    buffer_minutes: u32,
    tz: FixedOffset,
    booked: &[ActiveWindow],
) -> Vec<Slot> {
    if slot_duration_minutes == 0 {
        return Vec::new();
    }
    let duration = Duration::minutes(slot_duration_minutes as i64);
    let buffer = Duration::minutes(buffer_minutes as i64);

    let mut slots = Vec::new();
    for day in days {
        for window in &day.windows {
            let window_end = local_to_utc(day.date, window.end, tz);
            let mut start = local_to_utc(day.date, window.start, tz);
            while start + duration <= window_end {
                let end = start + duration;
                let available = !booked
                    .iter()
                    .any(|b| violates_buffer(start, end, b, buffer));
                slots.push(Slot {
                    start,
                    end,
                    available,
                    source_date: day.date,
                });
                start = end;
            }
        }
    }
    slots
}
