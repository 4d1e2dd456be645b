use super::ids::{CourseId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A learner's membership in a course.
///
/// Unique per (user, course). `completed` is a one-way ratchet flipped by
/// explicit or automatic completion; only an explicit progress reset may
/// reopen it. A completed enrollment can no longer be removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub user: UserId,
    pub course: CourseId,
    pub enrolled_at: DateTime<Utc>,
    pub completed: bool,
}

impl Enrollment {
    pub fn new(user: UserId, course: CourseId) -> Self {
        Self {
            user,
            course,
            enrolled_at: Utc::now(),
            completed: false,
        }
    }
}
