use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A half-open time-of-day interval `[start, end)` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// A window must start before it ends; no midnight wrap-around.
    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Open windows resolved for one calendar date.
#[derive(Debug, Clone, Serialize)]
pub struct DayWindows {
    pub date: NaiveDate,
    pub windows: Vec<TimeWindow>,
}

/// A derived bookable slot.
///
/// Slots have no identity and are never persisted: they are recomputed from
/// the availability configuration and the booking ledger on every request,
/// so they are always consistent with ledger state at read time. Slots with
/// `available = false` are still emitted so a calendar can render them as
/// blocked, but they must never be booked.
#[derive(Debug, Clone, Serialize)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub available: bool,
    pub source_date: NaiveDate,
}

/// How an interview is conducted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewType {
    Video,
    Phone,
    InPerson,
}

/// Discrete priority bucket; the primary queue sort key.
///
/// Ordered so that `Critical > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Lifecycle of a candidate queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Waiting,
    Scheduled,
    Expired,
    Removed,
}
