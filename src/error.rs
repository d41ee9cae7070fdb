use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the scheduling core.
///
/// Capacity exhaustion and a stopped engine are deliberately not here:
/// both are normal outcomes reported through the run summary and the
/// engine state, not failures.
#[derive(Debug, Clone, Error)]
pub enum ScheduleError {
    /// Caller passed a reversed date range. No retry will help.
    #[error("invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    /// Availability template or override failed validation.
    #[error("invalid availability: {0}")]
    InvalidAvailability(String),
    /// The requested window overlaps an existing interview (buffer included).
    #[error("requested window overlaps an existing interview")]
    Conflict,
    #[error("interview {0} not found")]
    InterviewNotFound(Uuid),
    /// The interview exists but no longer occupies calendar time.
    #[error("interview {0} is not active")]
    InterviewNotActive(Uuid),
    #[error("candidate {0} not found in queue")]
    CandidateNotFound(Uuid),
}

impl ResponseError for ScheduleError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRange { .. } | Self::InvalidAvailability(_) => StatusCode::BAD_REQUEST,
            Self::Conflict | Self::InterviewNotActive(_) => StatusCode::CONFLICT,
            Self::InterviewNotFound(_) | Self::CandidateNotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "error": self.to_string() }))
    }
}
