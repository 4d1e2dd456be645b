use super::ids::{CourseId, LectureId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-course lecture completion for one learner.
///
/// One-to-one with an active enrollment: created alongside it, deleted
/// alongside it, cleared on explicit reset. The percentage is always
/// recomputed from the set size against the course's lecture count at
/// call time, never adjusted incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub user: UserId,
    pub course: CourseId,
    pub completed_lectures: BTreeSet<LectureId>,
    pub percentage: u8,
}

impl Progress {
    pub fn empty(user: UserId, course: CourseId) -> Self {
        Self {
            user,
            course,
            completed_lectures: BTreeSet::new(),
            percentage: 0,
        }
    }

    /// Toggles a lecture's membership in the completed set and recomputes
    /// the percentage. Returns whether the lecture is marked completed
    /// after the call.
    pub fn toggle(&mut self, lecture: LectureId, total_lectures: u32) -> bool {
        let now_completed = if !self.completed_lectures.remove(&lecture) {
            self.completed_lectures.insert(lecture);
            true
        } else {
            false
        };
        self.percentage = percentage_of(self.completed_lectures.len(), total_lectures);
        now_completed
    }

    pub fn clear(&mut self) {
        self.completed_lectures.clear();
        self.percentage = 0;
    }

    pub fn completed_count(&self) -> usize {
        self.completed_lectures.len()
    }
}

/// `round(100 * completed / total)`; an empty course is 0%, never a
/// division by zero.
pub fn percentage_of(completed: usize, total_lectures: u32) -> u8 {
    if total_lectures == 0 {
        return 0;
    }
    let pct = (completed as f64 / total_lectures as f64) * 100.0;
    pct.round().min(100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage_of(0, 4), 0);
        assert_eq!(percentage_of(1, 4), 25);
        assert_eq!(percentage_of(3, 4), 75);
        assert_eq!(percentage_of(4, 4), 100);
        assert_eq!(percentage_of(1, 3), 33);
        assert_eq!(percentage_of(2, 3), 67);
    }

    #[test]
    fn test_percentage_with_no_lectures() {
        assert_eq!(percentage_of(0, 0), 0);
    }

    #[test]
    fn test_toggle_on_and_off() {
        let mut progress = Progress::empty(UserId::new(), CourseId::new());
        let lecture = LectureId::new();

        assert!(progress.toggle(lecture, 4));
        assert_eq!(progress.percentage, 25);

        assert!(!progress.toggle(lecture, 4));
        assert_eq!(progress.percentage, 0);
    }

    #[test]
    fn test_percentage_recomputed_not_drifted() {
        let mut progress = Progress::empty(UserId::new(), CourseId::new());
        let lectures: Vec<LectureId> = (0..4).map(|_| LectureId::new()).collect();

        for lecture in &lectures {
            progress.toggle(*lecture, 4);
        }
        assert_eq!(progress.percentage, 100);

        // Toggling one off recomputes from the set, not by decrement.
        progress.toggle(lectures[2], 4);
        assert_eq!(progress.percentage, 75);
        assert_eq!(progress.completed_count(), 3);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut progress = Progress::empty(UserId::new(), CourseId::new());
        progress.toggle(LectureId::new(), 2);
        progress.clear();
        assert_eq!(progress.percentage, 0);
        assert!(progress.completed_lectures.is_empty());
    }
}
