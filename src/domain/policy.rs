use super::course::{CourseSummary, Role, UserIdentity};
use super::payment::Payment;

/// Whether the actor may see a course's sales and enrollment roster.
///
/// One policy for every component instead of per-method ownership
/// comparisons: the course's instructor and administrators qualify.
pub fn can_manage_course(actor: &UserIdentity, course: &CourseSummary) -> bool {
    actor.role == Role::Admin || course.instructor == actor.id
}

/// Whether the actor may read a payment row.
pub fn can_view_payment(actor: &UserIdentity, payment: &Payment) -> bool {
    actor.role == Role::Admin || payment.user == actor.id
}
