use chrono::{NaiveDate, NaiveTime};

use crate::models::TrainingSession;

/// A prospective booking for one coach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub coach_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// Half-open interval overlap: `[a_start, a_end)` against `[b_start, b_end)`.
/// An empty interval overlaps nothing.
pub fn overlaps(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < a_end && b_start < b_end && a_start < b_end && a_end > b_start
}

/// Returns the first existing session that the candidate collides with.
///
/// Only sessions owned by the candidate's coach on the same date count, and
/// `exclude_session_id` is skipped so that an edited session never collides
/// with its own stored row. Cancelled sessions do not occupy the coach.
pub fn find_conflict<'a>(
    candidate: &Candidate,
    existing: &'a [TrainingSession],
    exclude_session_id: Option<i64>,
) -> Option<&'a TrainingSession> {
    existing.iter().find(|session| {
        session.coach_id == candidate.coach_id
            && session.date == candidate.date
            && Some(session.id) != exclude_session_id
            && session.status.occupies_coach()
            && overlaps(
                candidate.start_time,
                candidate.end_time,
                session.start_time,
                session.end_time,
            )
    })
}

pub fn has_conflict(
    candidate: &Candidate,
    existing: &[TrainingSession],
    exclude_session_id: Option<i64>,
) -> bool {
    find_conflict(candidate, existing, exclude_session_id).is_some()
}
