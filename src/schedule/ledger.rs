//! The booking ledger: authoritative store of interviews.
//!
//! Every slot-consuming write — engine bookings and manual admin actions
//! alike — goes through this type, and every check-then-write runs inside
//! one mutex critical section. A second writer racing for an overlapping
//! window loses with [`ScheduleError::Conflict`]; it can never slip between
//! the overlap check and the insert.
//!
//! Interviews are never hard-deleted. Cancelling (and the cancel half of a
//! move) only flips the status, so the ledger doubles as the audit trail.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ScheduleError;

use super::slots::ActiveWindow;
use super::types::InterviewType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl InterviewStatus {
    /// Whether an interview in this status still occupies calendar time.
    pub fn occupies_slot(self) -> bool {
        matches!(self, Self::Scheduled | Self::Confirmed | Self::Completed)
    }
}

/// A confirmed, cancelled, or moved interview record.
#[derive(Debug, Clone, Serialize)]
pub struct Interview {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub candidate_name: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub interview_type: InterviewType,
    pub status: InterviewStatus,
    pub notes: Option<String>,
    pub meeting_link: Option<String>,
    /// Set on the cancelled half of a move, pointing at its replacement.
    pub replaced_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Interview {
    pub fn end(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(self.duration_minutes as i64)
    }
}

/// What a caller asks the ledger to book.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub candidate_id: Uuid,
    pub candidate_name: String,
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
    pub interview_type: InterviewType,
    pub notes: Option<String>,
    pub meeting_link: Option<String>,
}

#[derive(Debug, Default)]
pub struct BookingLedger {
    inner: Mutex<HashMap<Uuid, Interview>>,
}

impl BookingLedger {
    /// Books an interview if the buffered window is free.
    ///
    /// The overlap check and the insert happen under one lock: either this
    /// call wins the window or it returns `Conflict`.
    pub fn create_interview(
        &self,
        request: BookingRequest,
        buffer_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<Interview, ScheduleError> {
        let end = request.start + Duration::minutes(request.duration_minutes as i64);
        let mut interviews = self.inner.lock();
        if Self::window_taken(&interviews, request.start, end, buffer_minutes, None) {
            warn!(
                candidate = %request.candidate_name,
                start = %request.start,
                "booking rejected: window taken"
            );
            return Err(ScheduleError::Conflict);
        }
        let interview = Interview {
            id: Uuid::new_v4(),
            candidate_id: request.candidate_id,
            candidate_name: request.candidate_name,
            scheduled_at: request.start,
            duration_minutes: request.duration_minutes,
            interview_type: request.interview_type,
            status: InterviewStatus::Scheduled,
            notes: request.notes,
            meeting_link: request.meeting_link,
            replaced_by: None,
            created_at: now,
        };
        interviews.insert(interview.id, interview.clone());
        info!(
            interview = %interview.id,
            candidate = %interview.candidate_name,
            start = %interview.scheduled_at,
            "interview booked"
        );
        Ok(interview)
    }

    /// Moves an interview: validates the new window (ignoring the moved
    /// interview itself), creates the replacement, and cancels the original
    /// with a link to it — all in one critical section, so both steps land
    /// or neither does.
    pub fn move_interview(
        &self,
        id: Uuid,
        new_start: DateTime<Utc>,
        buffer_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<Interview, ScheduleError> {
        let mut interviews = self.inner.lock();
        let old = interviews
            .get(&id)
            .ok_or(ScheduleError::InterviewNotFound(id))?
            .clone();
        if !old.status.occupies_slot() {
            return Err(ScheduleError::InterviewNotActive(id));
        }
        let new_end = new_start + Duration::minutes(old.duration_minutes as i64);
        if Self::window_taken(&interviews, new_start, new_end, buffer_minutes, Some(id)) {
            warn!(interview = %id, start = %new_start, "move rejected: window taken");
            return Err(ScheduleError::Conflict);
        }
        let replacement = Interview {
            id: Uuid::new_v4(),
            candidate_id: old.candidate_id,
            candidate_name: old.candidate_name.clone(),
            scheduled_at: new_start,
            duration_minutes: old.duration_minutes,
            interview_type: old.interview_type,
            status: InterviewStatus::Scheduled,
            notes: old.notes.clone(),
            meeting_link: old.meeting_link.clone(),
            replaced_by: None,
            created_at: now,
        };
        interviews.insert(replacement.id, replacement.clone());
        if let Some(original) = interviews.get_mut(&id) {
            original.status = InterviewStatus::Cancelled;
            original.replaced_by = Some(replacement.id);
        }
        info!(
            from = %id,
            to = %replacement.id,
            start = %new_start,
            "interview moved"
        );
        Ok(replacement)
    }

    /// Marks an interview cancelled, freeing its window. The record stays.
    pub fn cancel_interview(&self, id: Uuid) -> Result<Interview, ScheduleError> {
        let mut interviews = self.inner.lock();
        let interview = interviews
            .get_mut(&id)
            .ok_or(ScheduleError::InterviewNotFound(id))?;
        if !interview.status.occupies_slot() {
            return Err(ScheduleError::InterviewNotActive(id));
        }
        interview.status = InterviewStatus::Cancelled;
        info!(interview = %id, "interview cancelled");
        Ok(interview.clone())
    }

    /// Manual status transitions (confirm, complete, no-show). Cancellation
    /// must go through [`Self::cancel_interview`] or [`Self::move_interview`].
    pub fn set_status(
        &self,
        id: Uuid,
        status: InterviewStatus,
    ) -> Result<Interview, ScheduleError> {
        let mut interviews = self.inner.lock();
        let interview = interviews
            .get_mut(&id)
            .ok_or(ScheduleError::InterviewNotFound(id))?;
        if status == InterviewStatus::Cancelled || interview.status == InterviewStatus::Cancelled {
            return Err(ScheduleError::InterviewNotActive(id));
        }
        interview.status = status;
        Ok(interview.clone())
    }

    pub fn get(&self, id: Uuid) -> Option<Interview> {
        self.inner.lock().get(&id).cloned()
    }

    /// Occupied windows of every active interview, for slot generation.
    pub fn active_windows(&self) -> Vec<ActiveWindow> {
        self.inner
            .lock()
            .values()
            .filter(|i| i.status.occupies_slot())
            .map(|i| ActiveWindow {
                start: i.scheduled_at,
                end: i.end(),
            })
            .collect()
    }

    /// Interviews (any status) whose window intersects `[start, end)`,
    /// sorted by start time. Cancelled rows are included: the calendar
    /// renders them as history.
    pub fn interviews_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Interview> {
        let mut result: Vec<_> = self
            .inner
            .lock()
            .values()
            .filter(|i| i.scheduled_at < end && i.end() > start)
            .cloned()
            .collect();
        result.sort_by_key(|i| i.scheduled_at);
        result
    }

    /// Active interviews on a local calendar date.
    pub fn scheduled_count_on(&self, date: NaiveDate, tz: FixedOffset) -> usize {
        self.inner
            .lock()
            .values()
            .filter(|i| i.status.occupies_slot())
            .filter(|i| i.scheduled_at.with_timezone(&tz).date_naive() == date)
            .count()
    }

    /// Active interviews in the ISO week containing `date`.
    pub fn scheduled_count_in_week(&self, date: NaiveDate, tz: FixedOffset) -> usize {
        let week = date.iso_week();
        self.inner
            .lock()
            .values()
            .filter(|i| i.status.occupies_slot())
            .filter(|i| i.scheduled_at.with_timezone(&tz).date_naive().iso_week() == week)
            .count()
    }

    /// True when `[start, end)` widened by the buffer would overlap an
    /// active interview's buffered window. `exclude` skips one id (the
    /// interview being moved).
    fn window_taken(
        interviews: &HashMap<Uuid, Interview>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        buffer_minutes: u32,
        exclude: Option<Uuid>,
    ) -> bool {
        let buffer = Duration::minutes(buffer_minutes as i64);
        interviews
            .values()
            .filter(|i| exclude != Some(i.id))
            .filter(|i| i.status.occupies_slot())
            .any(|i| start < i.end() + buffer && i.scheduled_at < end + buffer)
    }
}
