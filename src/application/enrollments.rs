use super::certificates::CertificateIssuer;
use super::spawn_notification;
use crate::domain::course::UserIdentity;
use crate::domain::enrollment::Enrollment;
use crate::domain::ids::{CourseId, UserId};
use crate::domain::policy;
use crate::domain::ports::{
    CompleteOutcome, CourseCatalogRef, EnrollmentStoreRef, InsertOutcome, NotifierRef,
    PaymentStoreRef, ProgressStoreRef,
};
use crate::domain::progress::Progress;
use crate::error::{CoreError, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Owns enrollments and their lifecycle: eligibility checks, the
/// enroll/complete/unenroll state machine, and the paired Progress row.
pub struct EnrollmentManager {
    enrollments: EnrollmentStoreRef,
    progress: ProgressStoreRef,
    payments: PaymentStoreRef,
    catalog: CourseCatalogRef,
    certificates: Arc<CertificateIssuer>,
    notifier: NotifierRef,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentSummary {
    pub enrollment: Enrollment,
    pub percentage: u8,
    pub completed_lectures: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseEnrollments {
    pub total: usize,
    pub enrollments: Vec<EnrollmentSummary>,
}

impl EnrollmentManager {
    pub fn new(
        enrollments: EnrollmentStoreRef,
        progress: ProgressStoreRef,
        payments: PaymentStoreRef,
        catalog: CourseCatalogRef,
        certificates: Arc<CertificateIssuer>,
        notifier: NotifierRef,
    ) -> Self {
        Self {
            enrollments,
            progress,
            payments,
            catalog,
            certificates,
            notifier,
        }
    }

    /// Enrolls the actor in a course.
    ///
    /// Free courses need only be published and not the actor's own. Paid
    /// courses additionally require a prior successful payment; the
    /// verification path calls this right after capturing one.
    ///
    /// Enrollment and its empty Progress row are created as a unit: if
    /// the Progress insert fails, the Enrollment is compensated away.
    pub async fn enroll(&self, actor: &UserIdentity, course_id: CourseId) -> Result<Enrollment> {
        let course = self
            .catalog
            .get(course_id)
            .await?
            .ok_or(CoreError::NotFound("course"))?;
        if !course.published {
            return Err(CoreError::Validation(
                "course is not published".to_string(),
            ));
        }
        if course.instructor == actor.id {
            return Err(CoreError::Validation(
                "instructors cannot enroll in their own course".to_string(),
            ));
        }
        if !course.is_free
            && self
                .payments
                .find_success(actor.id, course_id)
                .await?
                .is_none()
        {
            return Err(CoreError::Validation(
                "payment required before enrolling in a paid course".to_string(),
            ));
        }

        let enrollment = Enrollment::new(actor.id, course_id);
        // The insert is the uniqueness check; a duplicate key is the race
        // loser's signal.
        match self.enrollments.insert_new(enrollment.clone()).await? {
            InsertOutcome::Duplicate => {
                return Err(CoreError::Conflict(
                    "already enrolled in this course".to_string(),
                ));
            }
            InsertOutcome::Inserted => {}
        }

        match self
            .progress
            .insert_new(Progress::empty(actor.id, course_id))
            .await
        {
            Ok(InsertOutcome::Inserted) => {}
            Ok(InsertOutcome::Duplicate) => {
                // Stale row from an interrupted unenroll; start it over.
                self.progress.put(Progress::empty(actor.id, course_id)).await?;
            }
            Err(e) => {
                if let Err(cleanup) = self.enrollments.delete(actor.id, course_id).await {
                    warn!(error = %cleanup, user = %actor.id, course = %course_id,
                        "compensating enrollment delete failed");
                }
                return Err(e);
            }
        }

        info!(user = %actor.id, course = %course_id, "enrolled");
        spawn_notification(
            &self.notifier,
            &actor.email,
            &format!("Welcome to {}", course.title),
            &format!("<p>You are enrolled in <b>{}</b>.</p>", course.title),
        );
        Ok(enrollment)
    }

    /// Removes an active enrollment together with its Progress row.
    /// Completed enrollments are permanent.
    pub async fn unenroll(&self, actor: &UserIdentity, course_id: CourseId) -> Result<()> {
        let enrollment = self
            .enrollments
            .get(actor.id, course_id)
            .await?
            .ok_or(CoreError::NotFound("enrollment"))?;
        if enrollment.completed {
            return Err(CoreError::Validation(
                "completed enrollments cannot be removed".to_string(),
            ));
        }

        // Progress goes first; if the enrollment delete then fails, the
        // saved row is restored so neither half is left orphaned.
        let saved = self.progress.get(actor.id, course_id).await?;
        self.progress.delete(actor.id, course_id).await?;
        if let Err(e) = self.enrollments.delete(actor.id, course_id).await {
            if let Some(progress) = saved {
                if let Err(restore) = self.progress.put(progress).await {
                    warn!(error = %restore, user = %actor.id, course = %course_id,
                        "progress restore after failed unenroll also failed");
                }
            }
            return Err(e);
        }

        info!(user = %actor.id, course = %course_id, "unenrolled");
        Ok(())
    }

    /// Explicit completion endpoint. Conflict once already completed.
    pub async fn mark_completed(
        &self,
        actor: &UserIdentity,
        course_id: CourseId,
    ) -> Result<Enrollment> {
        self.complete_for(actor, course_id).await
    }

    /// Shared by the explicit endpoint and the 100%-progress trigger.
    ///
    /// The store's conditional write picks exactly one winner among
    /// concurrent completion attempts; the winner issues the certificate.
    /// Issuance failure is logged, never propagated: completion is the
    /// durable fact and issuance retries on the next explicit request.
    pub(crate) async fn complete_for(
        &self,
        actor: &UserIdentity,
        course_id: CourseId,
    ) -> Result<Enrollment> {
        let enrollment = match self.enrollments.complete(actor.id, course_id).await? {
            CompleteOutcome::Missing => return Err(CoreError::NotFound("enrollment")),
            CompleteOutcome::AlreadyCompleted => {
                return Err(CoreError::Conflict(
                    "course already marked as completed".to_string(),
                ));
            }
            CompleteOutcome::Completed(enrollment) => enrollment,
        };
        info!(user = %actor.id, course = %course_id, "course completed");

        match self.certificates.issue(actor.id, course_id).await {
            Ok(issued) if issued.is_new => {
                spawn_notification(
                    &self.notifier,
                    &actor.email,
                    "Your certificate is ready",
                    &format!(
                        "<p>Congratulations! Certificate <b>{}</b> has been issued.</p>",
                        issued.certificate.certificate_id
                    ),
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, user = %actor.id, course = %course_id,
                    "certificate issuance failed; completion stands");
            }
        }
        Ok(enrollment)
    }

    /// The actor's certificate for a completed course, issued on first
    /// request and returned idempotently afterwards.
    pub async fn request_certificate(
        &self,
        actor: &UserIdentity,
        course_id: CourseId,
    ) -> Result<super::certificates::IssuedCertificate> {
        let enrollment = self
            .enrollments
            .get(actor.id, course_id)
            .await?
            .ok_or(CoreError::NotFound("enrollment"))?;
        if !enrollment.completed {
            return Err(CoreError::Validation(
                "course is not completed yet".to_string(),
            ));
        }
        self.certificates.issue(actor.id, course_id).await
    }

    /// Reopens a completed enrollment. Reserved for the explicit progress
    /// reset path.
    pub(crate) async fn reopen(&self, user: UserId, course_id: CourseId) -> Result<()> {
        self.enrollments.reopen(user, course_id).await
    }

    /// Read-only lookup for sibling components and precondition checks.
    pub async fn find(&self, user: UserId, course_id: CourseId) -> Result<Option<Enrollment>> {
        self.enrollments.get(user, course_id).await
    }

    /// The actor's enrollments, optionally filtered by completion state.
    pub async fn my_enrollments(
        &self,
        actor: &UserIdentity,
        completed: Option<bool>,
    ) -> Result<Vec<Enrollment>> {
        let mut list = self.enrollments.list_for_user(actor.id).await?;
        if let Some(completed) = completed {
            list.retain(|e| e.completed == completed);
        }
        Ok(list)
    }

    /// Roster for the course's instructor or an administrator, each row
    /// enriched with its progress summary.
    pub async fn course_enrollments(
        &self,
        actor: &UserIdentity,
        course_id: CourseId,
    ) -> Result<CourseEnrollments> {
        let course = self
            .catalog
            .get(course_id)
            .await?
            .ok_or(CoreError::NotFound("course"))?;
        if !policy::can_manage_course(actor, &course) {
            return Err(CoreError::Forbidden(
                "only the course instructor or an administrator may view enrollments".to_string(),
            ));
        }

        let list = self.enrollments.list_for_course(course_id).await?;
        let mut enrollments = Vec::with_capacity(list.len());
        for enrollment in list {
            let progress = self.progress.get(enrollment.user, course_id).await?;
            let (percentage, completed_lectures) = match progress {
                Some(p) => (p.percentage, p.completed_count()),
                None => (0, 0),
            };
            enrollments.push(EnrollmentSummary {
                enrollment,
                percentage,
                completed_lectures,
            });
        }
        Ok(CourseEnrollments {
            total: enrollments.len(),
            enrollments,
        })
    }
}
