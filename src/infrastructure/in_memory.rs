use crate::domain::certificate::Certificate;
use crate::domain::enrollment::Enrollment;
use crate::domain::ids::{CourseId, PaymentId, UserId};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{
    CertificateInsert, CertificateStore, CompleteOutcome, EnrollmentStore, InsertOutcome,
    MarkOutcome, PaymentStore, ProgressStore,
};
use crate::domain::progress::Progress;
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct PaymentsInner {
    by_id: HashMap<PaymentId, Payment>,
    by_handle: HashMap<String, PaymentId>,
    /// Partial unique index: (user, course) pairs holding a Success row.
    success_pairs: HashMap<(UserId, CourseId), PaymentId>,
    transaction_ids: HashSet<String>,
}

/// Thread-safe in-memory payment ledger.
///
/// Every conditional transition runs under the single write guard, which
/// is what makes `mark_success`/`mark_failed` atomic and keeps the
/// one-Success-per-pair index consistent with the row it points at.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    inner: Arc<RwLock<PaymentsInner>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create(&self, payment: Payment) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.by_handle.contains_key(&payment.order_handle) {
            return Err(CoreError::Conflict(format!(
                "order handle {} already recorded",
                payment.order_handle
            )));
        }
        inner
            .by_handle
            .insert(payment.order_handle.clone(), payment.id);
        inner.by_id.insert(payment.id, payment);
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        let inner = self.inner.read().await;
        Ok(inner.by_id.get(&id).cloned())
    }

    async fn get_by_order_handle(&self, order_handle: &str) -> Result<Option<Payment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_handle
            .get(order_handle)
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    async fn find_success(&self, user: UserId, course: CourseId) -> Result<Option<Payment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .success_pairs
            .get(&(user, course))
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    async fn list_for_user(&self, user: UserId) -> Result<Vec<Payment>> {
        let inner = self.inner.read().await;
        let mut list: Vec<Payment> = inner
            .by_id
            .values()
            .filter(|p| p.user == user)
            .cloned()
            .collect();
        list.sort_by_key(|p| p.created_at);
        Ok(list)
    }

    async fn list_for_course(&self, course: CourseId) -> Result<Vec<Payment>> {
        let inner = self.inner.read().await;
        let mut list: Vec<Payment> = inner
            .by_id
            .values()
            .filter(|p| p.course == course)
            .cloned()
            .collect();
        list.sort_by_key(|p| p.created_at);
        Ok(list)
    }

    async fn list_all(&self) -> Result<Vec<Payment>> {
        let inner = self.inner.read().await;
        let mut list: Vec<Payment> = inner.by_id.values().cloned().collect();
        list.sort_by_key(|p| p.created_at);
        Ok(list)
    }

    async fn mark_success(&self, order_handle: &str, transaction_id: &str) -> Result<MarkOutcome> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let Some(&id) = inner.by_handle.get(order_handle) else {
            return Ok(MarkOutcome::Missing);
        };
        let Some(payment) = inner.by_id.get_mut(&id) else {
            return Ok(MarkOutcome::Missing);
        };
        if payment.status != PaymentStatus::Pending {
            return Ok(MarkOutcome::WrongStatus(payment.status));
        }
        let pair = (payment.user, payment.course);
        if inner.success_pairs.contains_key(&pair)
            || inner.transaction_ids.contains(transaction_id)
        {
            return Ok(MarkOutcome::DuplicateSuccess);
        }

        payment.status = PaymentStatus::Success;
        payment.transaction_id = Some(transaction_id.to_string());
        payment.failure_reason = None;
        let updated = payment.clone();
        inner.success_pairs.insert(pair, id);
        inner.transaction_ids.insert(transaction_id.to_string());
        Ok(MarkOutcome::Applied(updated))
    }

    async fn mark_failed(&self, order_handle: &str, reason: &str) -> Result<MarkOutcome> {
        let mut inner = self.inner.write().await;
        let Some(&id) = inner.by_handle.get(order_handle) else {
            return Ok(MarkOutcome::Missing);
        };
        let Some(payment) = inner.by_id.get_mut(&id) else {
            return Ok(MarkOutcome::Missing);
        };
        if payment.status != PaymentStatus::Pending {
            return Ok(MarkOutcome::WrongStatus(payment.status));
        }
        payment.status = PaymentStatus::Failed;
        payment.failure_reason = Some(reason.to_string());
        Ok(MarkOutcome::Applied(payment.clone()))
    }

    async fn revert_to_pending(&self, order_handle: &str) -> Result<()> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let Some(&id) = inner.by_handle.get(order_handle) else {
            return Err(CoreError::NotFound("payment"));
        };
        let Some(payment) = inner.by_id.get_mut(&id) else {
            return Err(CoreError::NotFound("payment"));
        };
        if payment.status != PaymentStatus::Success {
            return Ok(());
        }
        let pair = (payment.user, payment.course);
        let transaction_id = payment.transaction_id.take();
        payment.status = PaymentStatus::Pending;
        inner.success_pairs.remove(&pair);
        if let Some(tx) = transaction_id {
            inner.transaction_ids.remove(&tx);
        }
        Ok(())
    }
}

/// Thread-safe in-memory enrollment store keyed by (user, course).
#[derive(Default, Clone)]
pub struct InMemoryEnrollmentStore {
    inner: Arc<RwLock<HashMap<(UserId, CourseId), Enrollment>>>,
}

impl InMemoryEnrollmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EnrollmentStore for InMemoryEnrollmentStore {
    async fn insert_new(&self, enrollment: Enrollment) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().await;
        match inner.entry((enrollment.user, enrollment.course)) {
            std::collections::hash_map::Entry::Occupied(_) => Ok(InsertOutcome::Duplicate),
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(enrollment);
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn get(&self, user: UserId, course: CourseId) -> Result<Option<Enrollment>> {
        let inner = self.inner.read().await;
        Ok(inner.get(&(user, course)).cloned())
    }

    async fn complete(&self, user: UserId, course: CourseId) -> Result<CompleteOutcome> {
        let mut inner = self.inner.write().await;
        match inner.get_mut(&(user, course)) {
            None => Ok(CompleteOutcome::Missing),
            Some(enrollment) if enrollment.completed => Ok(CompleteOutcome::AlreadyCompleted),
            Some(enrollment) => {
                enrollment.completed = true;
                Ok(CompleteOutcome::Completed(enrollment.clone()))
            }
        }
    }

    async fn reopen(&self, user: UserId, course: CourseId) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.get_mut(&(user, course)) {
            None => Err(CoreError::NotFound("enrollment")),
            Some(enrollment) => {
                enrollment.completed = false;
                Ok(())
            }
        }
    }

    async fn delete(&self, user: UserId, course: CourseId) -> Result<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.remove(&(user, course)).is_some())
    }

    async fn list_for_user(&self, user: UserId) -> Result<Vec<Enrollment>> {
        let inner = self.inner.read().await;
        let mut list: Vec<Enrollment> = inner
            .values()
            .filter(|e| e.user == user)
            .cloned()
            .collect();
        list.sort_by_key(|e| e.enrolled_at);
        Ok(list)
    }

    async fn list_for_course(&self, course: CourseId) -> Result<Vec<Enrollment>> {
        let inner = self.inner.read().await;
        let mut list: Vec<Enrollment> = inner
            .values()
            .filter(|e| e.course == course)
            .cloned()
            .collect();
        list.sort_by_key(|e| e.enrolled_at);
        Ok(list)
    }
}

/// Thread-safe in-memory progress store. Writes are last-write-wins; the
/// percentage stored always comes from the set being written.
#[derive(Default, Clone)]
pub struct InMemoryProgressStore {
    inner: Arc<RwLock<HashMap<(UserId, CourseId), Progress>>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn insert_new(&self, progress: Progress) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().await;
        match inner.entry((progress.user, progress.course)) {
            std::collections::hash_map::Entry::Occupied(_) => Ok(InsertOutcome::Duplicate),
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(progress);
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn get(&self, user: UserId, course: CourseId) -> Result<Option<Progress>> {
        let inner = self.inner.read().await;
        Ok(inner.get(&(user, course)).cloned())
    }

    async fn put(&self, progress: Progress) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.insert((progress.user, progress.course), progress);
        Ok(())
    }

    async fn delete(&self, user: UserId, course: CourseId) -> Result<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.remove(&(user, course)).is_some())
    }
}

#[derive(Default)]
struct CertificatesInner {
    by_pair: HashMap<(UserId, CourseId), Certificate>,
    by_id: HashMap<String, (UserId, CourseId)>,
}

/// Thread-safe in-memory certificate store with both unique indexes
/// checked in one critical section.
#[derive(Default, Clone)]
pub struct InMemoryCertificateStore {
    inner: Arc<RwLock<CertificatesInner>>,
}

impl InMemoryCertificateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CertificateStore for InMemoryCertificateStore {
    async fn insert_new(&self, certificate: Certificate) -> Result<CertificateInsert> {
        let mut inner = self.inner.write().await;
        let pair = (certificate.user, certificate.course);
        if let Some(existing) = inner.by_pair.get(&pair) {
            return Ok(CertificateInsert::PairExists(existing.clone()));
        }
        if inner.by_id.contains_key(&certificate.certificate_id) {
            return Ok(CertificateInsert::IdCollision);
        }
        inner
            .by_id
            .insert(certificate.certificate_id.clone(), pair);
        inner.by_pair.insert(pair, certificate);
        Ok(CertificateInsert::Inserted)
    }

    async fn get_by_pair(&self, user: UserId, course: CourseId) -> Result<Option<Certificate>> {
        let inner = self.inner.read().await;
        Ok(inner.by_pair.get(&(user, course)).cloned())
    }

    async fn get_by_id(&self, certificate_id: &str) -> Result<Option<Certificate>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_id
            .get(certificate_id)
            .and_then(|pair| inner.by_pair.get(pair))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn pending(user: UserId, course: CourseId, handle: &str) -> Payment {
        Payment::pending(
            PaymentId::new(),
            user,
            course,
            5_000,
            "INR",
            handle,
            handle,
            BTreeMap::new(),
        )
    }

    #[tokio::test]
    async fn test_mark_success_is_single_shot() {
        let store = InMemoryPaymentStore::new();
        let user = UserId::new();
        let course = CourseId::new();
        store.create(pending(user, course, "order_1")).await.unwrap();

        let first = store.mark_success("order_1", "txn_1").await.unwrap();
        assert!(matches!(first, MarkOutcome::Applied(_)));

        let second = store.mark_success("order_1", "txn_1").await.unwrap();
        assert!(matches!(
            second,
            MarkOutcome::WrongStatus(PaymentStatus::Success)
        ));
    }

    #[tokio::test]
    async fn test_success_pair_index_blocks_second_payment() {
        let store = InMemoryPaymentStore::new();
        let user = UserId::new();
        let course = CourseId::new();
        store.create(pending(user, course, "order_1")).await.unwrap();
        store.create(pending(user, course, "order_2")).await.unwrap();

        store.mark_success("order_1", "txn_1").await.unwrap();
        let second = store.mark_success("order_2", "txn_2").await.unwrap();
        assert!(matches!(second, MarkOutcome::DuplicateSuccess));

        let found = store.find_success(user, course).await.unwrap().unwrap();
        assert_eq!(found.order_handle, "order_1");
    }

    #[tokio::test]
    async fn test_revert_to_pending_clears_index_and_transaction() {
        let store = InMemoryPaymentStore::new();
        let user = UserId::new();
        let course = CourseId::new();
        store.create(pending(user, course, "order_1")).await.unwrap();
        store.mark_success("order_1", "txn_1").await.unwrap();

        store.revert_to_pending("order_1").await.unwrap();
        let payment = store.get_by_order_handle("order_1").await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.transaction_id.is_none());
        assert!(store.find_success(user, course).await.unwrap().is_none());

        // The same order and transaction can now be captured again.
        let again = store.mark_success("order_1", "txn_1").await.unwrap();
        assert!(matches!(again, MarkOutcome::Applied(_)));
    }

    #[tokio::test]
    async fn test_mark_failed_records_reason() {
        let store = InMemoryPaymentStore::new();
        store
            .create(pending(UserId::new(), CourseId::new(), "order_1"))
            .await
            .unwrap();

        store.mark_failed("order_1", "signature mismatch").await.unwrap();
        let payment = store.get_by_order_handle("order_1").await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.failure_reason.as_deref(), Some("signature mismatch"));
    }

    #[tokio::test]
    async fn test_enrollment_insert_new_detects_duplicates() {
        let store = InMemoryEnrollmentStore::new();
        let enrollment = Enrollment::new(UserId::new(), CourseId::new());

        assert_eq!(
            store.insert_new(enrollment.clone()).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert_new(enrollment).await.unwrap(),
            InsertOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn test_enrollment_complete_has_one_winner() {
        let store = InMemoryEnrollmentStore::new();
        let user = UserId::new();
        let course = CourseId::new();
        store.insert_new(Enrollment::new(user, course)).await.unwrap();

        assert!(matches!(
            store.complete(user, course).await.unwrap(),
            CompleteOutcome::Completed(_)
        ));
        assert!(matches!(
            store.complete(user, course).await.unwrap(),
            CompleteOutcome::AlreadyCompleted
        ));
        assert!(matches!(
            store.complete(UserId::new(), course).await.unwrap(),
            CompleteOutcome::Missing
        ));
    }

    #[tokio::test]
    async fn test_certificate_pair_unique_and_id_collision() {
        let store = InMemoryCertificateStore::new();
        let user = UserId::new();
        let course = CourseId::new();
        let cert = Certificate::new(user, course);

        assert!(matches!(
            store.insert_new(cert.clone()).await.unwrap(),
            CertificateInsert::Inserted
        ));

        // Same pair, different token: the winner's row comes back.
        let rival = Certificate::new(user, course);
        match store.insert_new(rival).await.unwrap() {
            CertificateInsert::PairExists(existing) => {
                assert_eq!(existing.certificate_id, cert.certificate_id);
            }
            other => panic!("expected PairExists, got {other:?}"),
        }

        // Different pair, colliding token.
        let mut collider = Certificate::new(UserId::new(), CourseId::new());
        collider.certificate_id = cert.certificate_id.clone();
        assert!(matches!(
            store.insert_new(collider).await.unwrap(),
            CertificateInsert::IdCollision
        ));

        let fetched = store
            .get_by_id(&cert.certificate_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.user, user);
    }
}
