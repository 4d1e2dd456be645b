use super::enrollments::EnrollmentManager;
use crate::domain::course::UserIdentity;
use crate::domain::ids::{CourseId, LectureId};
use crate::domain::ports::{CourseCatalogRef, ProgressStoreRef};
use crate::domain::progress::Progress;
use crate::error::{CoreError, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Owns Progress rows: the completed-lecture set, the derived percentage,
/// and the automatic completion trigger.
pub struct ProgressTracker {
    progress: ProgressStoreRef,
    catalog: CourseCatalogRef,
    enrollments: Arc<EnrollmentManager>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToggleResult {
    /// Whether the toggled lecture is marked completed after this call.
    pub is_completed_now: bool,
    pub updated_percentage: u8,
    pub total_lectures: u32,
    pub course_completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressView {
    pub progress: Progress,
    pub total_lectures: u32,
    pub completed_count: usize,
}

impl ProgressTracker {
    pub fn new(
        progress: ProgressStoreRef,
        catalog: CourseCatalogRef,
        enrollments: Arc<EnrollmentManager>,
    ) -> Self {
        Self {
            progress,
            catalog,
            enrollments,
        }
    }

    /// Toggles one lecture's completion and recomputes the percentage
    /// against the course's lecture count at call time.
    ///
    /// Reaching 100% on an uncompleted enrollment marks the course
    /// completed (and issues the certificate) as a side effect; losing
    /// that race to a concurrent trigger is not an error. Toggling a
    /// lecture back off afterwards lowers the percentage but never
    /// reverts completion.
    pub async fn toggle_lecture(
        &self,
        actor: &UserIdentity,
        course_id: CourseId,
        lecture_id: LectureId,
    ) -> Result<ToggleResult> {
        let enrollment = self
            .enrollments
            .find(actor.id, course_id)
            .await?
            .ok_or_else(|| CoreError::Forbidden("not enrolled in this course".to_string()))?;

        // A client may hand us any lecture id; only lectures whose parent
        // section belongs to this course count.
        if !self.catalog.lecture_belongs_to(course_id, lecture_id).await? {
            return Err(CoreError::Validation(
                "lecture does not belong to this course".to_string(),
            ));
        }

        let mut progress = self
            .progress
            .get(actor.id, course_id)
            .await?
            .ok_or(CoreError::NotFound("progress"))?;
        let total_lectures = self.catalog.count_lectures(course_id).await?;
        let is_completed_now = progress.toggle(lecture_id, total_lectures);
        let updated_percentage = progress.percentage;
        self.progress.put(progress).await?;

        let mut course_completed = enrollment.completed;
        if updated_percentage >= 100 && !course_completed {
            match self.enrollments.complete_for(actor, course_id).await {
                Ok(_) => course_completed = true,
                // A concurrent trigger won; the course is completed.
                Err(CoreError::Conflict(_)) => course_completed = true,
                Err(e) => return Err(e),
            }
        }

        Ok(ToggleResult {
            is_completed_now,
            updated_percentage,
            total_lectures,
            course_completed,
        })
    }

    /// Clears the completed set and reopens a completed enrollment.
    /// Already-issued certificates are untouched.
    pub async fn reset_progress(
        &self,
        actor: &UserIdentity,
        course_id: CourseId,
    ) -> Result<ProgressView> {
        let enrollment = self
            .enrollments
            .find(actor.id, course_id)
            .await?
            .ok_or_else(|| CoreError::Forbidden("not enrolled in this course".to_string()))?;
        let mut progress = self
            .progress
            .get(actor.id, course_id)
            .await?
            .ok_or(CoreError::NotFound("progress"))?;

        progress.clear();
        self.progress.put(progress.clone()).await?;
        if enrollment.completed {
            self.enrollments.reopen(actor.id, course_id).await?;
        }
        info!(user = %actor.id, course = %course_id, "progress reset");

        let total_lectures = self.catalog.count_lectures(course_id).await?;
        Ok(ProgressView {
            completed_count: progress.completed_count(),
            progress,
            total_lectures,
        })
    }

    /// The actor's progress in a course, enriched with the lecture count.
    pub async fn course_progress(
        &self,
        actor: &UserIdentity,
        course_id: CourseId,
    ) -> Result<ProgressView> {
        self.enrollments
            .find(actor.id, course_id)
            .await?
            .ok_or_else(|| CoreError::Forbidden("not enrolled in this course".to_string()))?;
        let progress = self
            .progress
            .get(actor.id, course_id)
            .await?
            .ok_or(CoreError::NotFound("progress"))?;
        let total_lectures = self.catalog.count_lectures(course_id).await?;
        Ok(ProgressView {
            completed_count: progress.completed_count(),
            progress,
            total_lectures,
        })
    }
}
