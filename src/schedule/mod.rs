pub mod availability;
pub mod engine;
pub mod ledger;
pub mod queue;
pub mod slots;
pub mod types;

pub use availability::{DateOverride, WeeklyTemplate};
pub use engine::{CapacityCounter, EngineState, SchedulerEngine};
pub use ledger::{BookingRequest, Interview, InterviewStatus};
pub use queue::CandidateQueueEntry;
pub use slots::{local_to_utc, utc_to_local_date};
pub use types::{InterviewType, Slot, TimeWindow, UrgencyLevel};
