//! The candidate queue: an ordered set of candidates awaiting an interview.
//!
//! Extraction order is (urgency desc, priority score desc, added_at asc) —
//! the FIFO tie-break prevents starvation among equally-scored candidates.
//! Urgency is derived from contact attempts, elapsed wait, and deadline
//! proximity on every read; it is never cached, so it can't go stale.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ScheduleError;

use super::types::{QueueStatus, UrgencyLevel};

/// Per-attempt bump applied to the base priority score on re-scoring.
const ATTEMPT_SCORE_WEIGHT: f64 = 0.05;

/// A candidate waiting for an interview.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateQueueEntry {
    pub id: Uuid,
    pub candidate_name: String,
    /// Continuous score in [0, 1]; the secondary sort key.
    pub priority_score: f64,
    pub contact_attempts: u32,
    pub deadline: Option<DateTime<Utc>>,
    pub added_at: DateTime<Utc>,
    pub status: QueueStatus,
    /// Score as supplied at enqueue, before attempt-based re-scoring.
    #[serde(skip)]
    base_score: f64,
}

impl CandidateQueueEntry {
    /// Derives the urgency bucket as of `as_of`. Always computed fresh.
    pub fn urgency(&self, as_of: DateTime<Utc>) -> UrgencyLevel {
        derive_urgency(
            self.contact_attempts,
            as_of - self.added_at,
            self.deadline.map(|d| d - as_of),
        )
    }
}

/// Maps contact attempts, elapsed wait, and time-to-deadline to the discrete
/// urgency bucket. Monotone: more attempts or a longer wait never lowers
/// urgency.
pub fn derive_urgency(
    contact_attempts: u32,
    waited: Duration,
    time_to_deadline: Option<Duration>,
) -> UrgencyLevel {
    let deadline_within =
        |hours: i64| time_to_deadline.is_some_and(|t| t <= Duration::hours(hours));
    if contact_attempts >= 4 || waited >= Duration::days(7) || deadline_within(24) {
        UrgencyLevel::Critical
    } else if contact_attempts >= 2 || waited >= Duration::days(3) || deadline_within(72) {
        UrgencyLevel::High
    } else if contact_attempts >= 1 || waited >= Duration::days(1) {
        UrgencyLevel::Medium
    } else {
        UrgencyLevel::Low
    }
}

/// Ordered set of waiting candidates.
#[derive(Debug)]
pub struct CandidateQueue {
    entries: HashMap<Uuid, CandidateQueueEntry>,
    ttl: Duration,
}

impl CandidateQueue {
    pub fn new(ttl_days: i64) -> Self {
        Self {
            entries: HashMap::new(),
            ttl: Duration::days(ttl_days),
        }
    }

    /// Adds a candidate; the score is clamped into [0, 1].
    pub fn enqueue(
        &mut self,
        candidate_name: impl Into<String>,
        priority_score: f64,
        deadline: Option<DateTime<Utc>>,
        as_of: DateTime<Utc>,
    ) -> CandidateQueueEntry {
        let score = if priority_score.is_finite() {
            priority_score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let entry = CandidateQueueEntry {
            id: Uuid::new_v4(),
            candidate_name: candidate_name.into(),
            priority_score: score,
            contact_attempts: 0,
            deadline,
            added_at: as_of,
            status: QueueStatus::Waiting,
            base_score: score,
        };
        self.entries.insert(entry.id, entry.clone());
        entry
    }

    /// The highest-priority waiting entry, or `None` when the queue is
    /// empty or nothing is eligible — a normal condition, not a fault.
    pub fn dequeue_next_eligible(&mut self, as_of: DateTime<Utc>) -> Option<CandidateQueueEntry> {
        self.next_eligible_excluding(as_of, &HashSet::new())
    }

    /// Like [`Self::dequeue_next_eligible`], skipping ids in `excluded` —
    /// the engine uses this so one unmatchable candidate never blocks the
    /// rest of a run.
    pub fn next_eligible_excluding(
        &mut self,
        as_of: DateTime<Utc>,
        excluded: &HashSet<Uuid>,
    ) -> Option<CandidateQueueEntry> {
        self.expire_stale(as_of);
        self.entries
            .values()
            .filter(|e| e.status == QueueStatus::Waiting && !excluded.contains(&e.id))
            .max_by(|a, b| eligibility(a, b, as_of))
            .cloned()
    }

    /// Waiting entries not in `excluded`.
    pub fn count_eligible_excluding(
        &mut self,
        as_of: DateTime<Utc>,
        excluded: &HashSet<Uuid>,
    ) -> usize {
        self.expire_stale(as_of);
        self.entries
            .values()
            .filter(|e| e.status == QueueStatus::Waiting && !excluded.contains(&e.id))
            .count()
    }

    /// Recomputes the priority score from the base score and the attempt
    /// count.
    pub fn re_score(&mut self, id: Uuid) -> Result<CandidateQueueEntry, ScheduleError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(ScheduleError::CandidateNotFound(id))?;
        entry.priority_score =
            (entry.base_score + ATTEMPT_SCORE_WEIGHT * entry.contact_attempts as f64).clamp(0.0, 1.0);
        Ok(entry.clone())
    }

    /// Records one more contact attempt and re-scores the entry.
    pub fn record_contact_attempt(&mut self, id: Uuid) -> Result<CandidateQueueEntry, ScheduleError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(ScheduleError::CandidateNotFound(id))?;
        entry.contact_attempts += 1;
        self.re_score(id)
    }

    /// Transitions an entry out of eligibility once it has been booked.
    pub fn mark_scheduled(&mut self, id: Uuid) -> Result<(), ScheduleError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(ScheduleError::CandidateNotFound(id))?;
        entry.status = QueueStatus::Scheduled;
        Ok(())
    }

    /// Withdraws a candidate from the funnel.
    pub fn withdraw(&mut self, id: Uuid) -> Result<(), ScheduleError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(ScheduleError::CandidateNotFound(id))?;
        entry.status = QueueStatus::Removed;
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Option<&CandidateQueueEntry> {
        self.entries.get(&id)
    }

    /// All entries, most eligible first, after the expiry sweep.
    pub fn entries(&mut self, as_of: DateTime<Utc>) -> Vec<CandidateQueueEntry> {
        self.expire_stale(as_of);
        let mut all: Vec<_> = self.entries.values().cloned().collect();
        all.sort_by(|a, b| eligibility(b, a, as_of));
        all
    }

    pub fn waiting_count(&mut self, as_of: DateTime<Utc>) -> usize {
        self.count_eligible_excluding(as_of, &HashSet::new())
    }

    /// Waiting entries grouped by derived urgency.
    pub fn urgency_breakdown(&mut self, as_of: DateTime<Utc>) -> BTreeMap<UrgencyLevel, usize> {
        self.expire_stale(as_of);
        let mut breakdown = BTreeMap::new();
        for entry in self.entries.values() {
            if entry.status == QueueStatus::Waiting {
                *breakdown.entry(entry.urgency(as_of)).or_insert(0) += 1;
            }
        }
        breakdown
    }

    /// Moves waiting entries past the TTL to `Expired`. Runs on every
    /// read-path call so expired candidates never surface as eligible.
    fn expire_stale(&mut self, as_of: DateTime<Utc>) {
        for entry in self.entries.values_mut() {
            if entry.status == QueueStatus::Waiting && as_of - entry.added_at > self.ttl {
                entry.status = QueueStatus::Expired;
            }
        }
    }
}

/// Total order on eligibility: greater means dequeued sooner.
fn eligibility(
    a: &CandidateQueueEntry,
    b: &CandidateQueueEntry,
    as_of: DateTime<Utc>,
) -> Ordering {
    a.urgency(as_of)
        .cmp(&b.urgency(as_of))
        .then_with(|| a.priority_score.total_cmp(&b.priority_score))
        .then_with(|| b.added_at.cmp(&a.added_at)) // older entry wins
        .then_with(|| b.id.cmp(&a.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_empty_queue_yields_none() {
        let mut queue = CandidateQueue::new(30);
        assert!(queue.dequeue_next_eligible(at("2026-01-05T09:00:00Z")).is_none());
    }

    #[test]
    fn test_fifo_among_equals() {
        let mut queue = CandidateQueue::new(30);
        let now = at("2026-01-05T12:00:00Z");
        let first = queue.enqueue("Ada", 0.5, None, at("2026-01-05T09:00:00Z"));
        let second = queue.enqueue("Grace", 0.5, None, at("2026-01-05T10:00:00Z"));
        let third = queue.enqueue("Edsger", 0.5, None, at("2026-01-05T11:00:00Z"));

        let mut order = Vec::new();
        let mut taken = HashSet::new();
        while let Some(entry) = queue.next_eligible_excluding(now, &taken) {
            taken.insert(entry.id);
            order.push(entry.id);
        }
        assert_eq!(order, vec![first.id, second.id, third.id]);
    }

    #[test]
    fn test_score_breaks_ties_before_age() {
        let mut queue = CandidateQueue::new(30);
        let now = at("2026-01-05T12:00:00Z");
        let _older = queue.enqueue("Ada", 0.3, None, at("2026-01-05T09:00:00Z"));
        let stronger = queue.enqueue("Grace", 0.9, None, at("2026-01-05T10:00:00Z"));
        let next = queue.dequeue_next_eligible(now).unwrap();
        assert_eq!(next.id, stronger.id);
    }

    #[test]
    fn test_urgency_dominates_score() {
        let mut queue = CandidateQueue::new(30);
        let now = at("2026-01-05T12:00:00Z");
        let _strong = queue.enqueue("Grace", 1.0, None, at("2026-01-05T11:00:00Z"));
        // low score but deadline in 12 hours -> critical
        let urgent = queue.enqueue(
            "Ada",
            0.1,
            Some(at("2026-01-06T00:00:00Z")),
            at("2026-01-05T11:30:00Z"),
        );
        let next = queue.dequeue_next_eligible(now).unwrap();
        assert_eq!(next.id, urgent.id);
        assert_eq!(next.urgency(now), UrgencyLevel::Critical);
    }

    #[test]
    fn test_non_waiting_entries_excluded() {
        let mut queue = CandidateQueue::new(30);
        let now = at("2026-01-05T12:00:00Z");
        let entry = queue.enqueue("Ada", 0.5, None, now);
        queue.mark_scheduled(entry.id).unwrap();
        assert!(queue.dequeue_next_eligible(now).is_none());

        let entry = queue.enqueue("Grace", 0.5, None, now);
        queue.withdraw(entry.id).unwrap();
        assert!(queue.dequeue_next_eligible(now).is_none());
    }

    #[test]
    fn test_ttl_expiry() {
        let mut queue = CandidateQueue::new(30);
        let entry = queue.enqueue("Ada", 0.9, None, at("2025-12-01T09:00:00Z"));
        let now = at("2026-01-05T09:00:00Z"); // 35 days later
        assert!(queue.dequeue_next_eligible(now).is_none());
        assert_eq!(queue.get(entry.id).unwrap().status, QueueStatus::Expired);
    }

    #[test]
    fn test_score_clamped() {
        let mut queue = CandidateQueue::new(30);
        let now = at("2026-01-05T09:00:00Z");
        assert_eq!(queue.enqueue("Ada", 7.5, None, now).priority_score, 1.0);
        assert_eq!(queue.enqueue("Grace", -1.0, None, now).priority_score, 0.0);
    }

    #[test]
    fn test_contact_attempt_bumps_score_and_urgency() {
        let mut queue = CandidateQueue::new(30);
        let now = at("2026-01-05T09:00:00Z");
        let entry = queue.enqueue("Ada", 0.5, None, now);
        assert_eq!(entry.urgency(now), UrgencyLevel::Low);

        let entry = queue.record_contact_attempt(entry.id).unwrap();
        assert_eq!(entry.contact_attempts, 1);
        assert!((entry.priority_score - 0.55).abs() < 1e-9);
        assert_eq!(entry.urgency(now), UrgencyLevel::Medium);

        for _ in 0..3 {
            queue.record_contact_attempt(entry.id).unwrap();
        }
        let entry = queue.get(entry.id).unwrap();
        assert_eq!(entry.urgency(now), UrgencyLevel::Critical);
    }

    #[test]
    fn test_urgency_grows_with_wait() {
        let added = at("2026-01-01T09:00:00Z");
        let mut queue = CandidateQueue::new(30);
        let entry = queue.enqueue("Ada", 0.5, None, added);
        assert_eq!(entry.urgency(at("2026-01-01T10:00:00Z")), UrgencyLevel::Low);
        assert_eq!(entry.urgency(at("2026-01-02T10:00:00Z")), UrgencyLevel::Medium);
        assert_eq!(entry.urgency(at("2026-01-04T10:00:00Z")), UrgencyLevel::High);
        assert_eq!(entry.urgency(at("2026-01-08T10:00:00Z")), UrgencyLevel::Critical);
    }

    #[test]
    fn test_urgency_breakdown() {
        let mut queue = CandidateQueue::new(30);
        let now = at("2026-01-05T09:00:00Z");
        queue.enqueue("Ada", 0.5, None, now);
        queue.enqueue("Grace", 0.5, None, now);
        let urgent = queue.enqueue("Edsger", 0.5, None, now - Duration::days(4));
        let breakdown = queue.urgency_breakdown(now);
        assert_eq!(breakdown[&UrgencyLevel::Low], 2);
        assert_eq!(breakdown[&UrgencyLevel::High], 1);
        assert_eq!(queue.get(urgent.id).unwrap().status, QueueStatus::Waiting);
    }
}
