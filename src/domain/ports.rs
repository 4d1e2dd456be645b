use super::certificate::Certificate;
use super::course::{CourseSummary, UserIdentity};
use super::enrollment::Enrollment;
use super::ids::{CourseId, LectureId, PaymentId, UserId};
use super::payment::{Payment, PaymentStatus};
use super::progress::Progress;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type EnrollmentStoreRef = Arc<dyn EnrollmentStore>;
pub type ProgressStoreRef = Arc<dyn ProgressStore>;
pub type CertificateStoreRef = Arc<dyn CertificateStore>;
pub type CourseCatalogRef = Arc<dyn CourseCatalog>;
pub type UserDirectoryRef = Arc<dyn UserDirectory>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type NotifierRef = Arc<dyn Notifier>;

/// Result of a conditional status transition on a payment row.
///
/// The transition is decided inside the store's critical section, never
/// by a read in the service layer, so racing verifiers get exactly one
/// `Applied`.
#[derive(Debug)]
pub enum MarkOutcome {
    Applied(Payment),
    /// No payment with that order handle.
    Missing,
    /// The row was not in the status the transition requires.
    WrongStatus(PaymentStatus),
    /// Another `Success` row already exists for this (user, course) pair,
    /// or the transaction id is already recorded elsewhere.
    DuplicateSuccess,
}

/// Result of an insert-if-absent write.
#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Result of the conditional `completed: false -> true` transition.
#[derive(Debug)]
pub enum CompleteOutcome {
    Completed(Enrollment),
    AlreadyCompleted,
    Missing,
}

/// Result of inserting a certificate under its two unique indexes.
#[derive(Debug)]
pub enum CertificateInsert {
    Inserted,
    /// The (user, course) pair already holds a certificate; the winner's
    /// row is returned so issuance stays idempotent.
    PairExists(Certificate),
    /// The random token collided; the issuer retries with a fresh one.
    IdCollision,
}

/// Ledger storage. Payments are append-only apart from the verification
/// status transitions.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Persists a new pending payment. The order handle and receipt are
    /// unique.
    async fn create(&self, payment: Payment) -> Result<()>;
    async fn get(&self, id: PaymentId) -> Result<Option<Payment>>;
    async fn get_by_order_handle(&self, order_handle: &str) -> Result<Option<Payment>>;
    /// The partial unique index: at most one `Success` row per pair.
    async fn find_success(&self, user: UserId, course: CourseId) -> Result<Option<Payment>>;
    async fn list_for_user(&self, user: UserId) -> Result<Vec<Payment>>;
    async fn list_for_course(&self, course: CourseId) -> Result<Vec<Payment>>;
    async fn list_all(&self) -> Result<Vec<Payment>>;
    /// Atomic `Pending -> Success`, recording the transaction id and
    /// enforcing the one-success-per-pair index in the same write.
    async fn mark_success(&self, order_handle: &str, transaction_id: &str) -> Result<MarkOutcome>;
    /// Atomic `Pending -> Failed`, recording the failure reason.
    async fn mark_failed(&self, order_handle: &str, reason: &str) -> Result<MarkOutcome>;
    /// Compensation for a verification whose enrollment step failed:
    /// `Success -> Pending`, clearing the transaction id.
    async fn revert_to_pending(&self, order_handle: &str) -> Result<()>;
}

#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Insert-if-absent on the (user, course) key; `Duplicate` is the
    /// race loser's signal, translated by the service to a domain
    /// conflict.
    async fn insert_new(&self, enrollment: Enrollment) -> Result<InsertOutcome>;
    async fn get(&self, user: UserId, course: CourseId) -> Result<Option<Enrollment>>;
    /// Atomic completion ratchet; concurrent triggers get exactly one
    /// `Completed`.
    async fn complete(&self, user: UserId, course: CourseId) -> Result<CompleteOutcome>;
    /// Explicit reset path only: `completed` back to false.
    async fn reopen(&self, user: UserId, course: CourseId) -> Result<()>;
    /// Returns whether a row was removed.
    async fn delete(&self, user: UserId, course: CourseId) -> Result<bool>;
    async fn list_for_user(&self, user: UserId) -> Result<Vec<Enrollment>>;
    async fn list_for_course(&self, course: CourseId) -> Result<Vec<Enrollment>>;
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn insert_new(&self, progress: Progress) -> Result<InsertOutcome>;
    async fn get(&self, user: UserId, course: CourseId) -> Result<Option<Progress>>;
    /// Last-write-wins replacement; the percentage inside is always
    /// derived from the set being written.
    async fn put(&self, progress: Progress) -> Result<()>;
    async fn delete(&self, user: UserId, course: CourseId) -> Result<bool>;
}

#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn insert_new(&self, certificate: Certificate) -> Result<CertificateInsert>;
    async fn get_by_pair(&self, user: UserId, course: CourseId) -> Result<Option<Certificate>>;
    async fn get_by_id(&self, certificate_id: &str) -> Result<Option<Certificate>>;
}

/// Read-only view onto the course catalog collaborator.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    async fn get(&self, course: CourseId) -> Result<Option<CourseSummary>>;
    /// Lecture count across all of the course's sections, at call time.
    async fn count_lectures(&self, course: CourseId) -> Result<u32>;
    /// Whether the lecture's parent section belongs to the course.
    async fn lecture_belongs_to(&self, course: CourseId, lecture: LectureId) -> Result<bool>;
}

/// Read-only view onto the user directory collaborator.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolves an access token to the caller's identity.
    async fn authenticate(&self, token: &str) -> Result<Option<UserIdentity>>;
    async fn get(&self, user: UserId) -> Result<Option<UserIdentity>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayOrder {
    pub order_handle: String,
}

/// Remote payment gateway. Creating an order is the core's only
/// synchronous external call; the ledger wraps it in a timeout.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
        notes: &BTreeMap<String, String>,
    ) -> Result<GatewayOrder>;
}

/// Outbound email. Callers spawn sends and never await them; failures are
/// the spawned task's to log.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()>;
}
