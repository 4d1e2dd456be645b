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
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Payment rows keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";
/// Order handle -> payment id.
pub const CF_PAYMENTS_BY_HANDLE: &str = "payments_by_handle";
/// Partial unique index: (user, course) -> payment id of the Success row.
pub const CF_SUCCESS_INDEX: &str = "success_index";
/// Recorded gateway transaction ids.
pub const CF_TRANSACTION_IDS: &str = "transaction_ids";
/// Enrollment rows keyed by (user, course).
pub const CF_ENROLLMENTS: &str = "enrollments";
/// Progress rows keyed by (user, course).
pub const CF_PROGRESS: &str = "progress";
/// Certificate rows keyed by (user, course).
pub const CF_CERTIFICATES: &str = "certificates";
/// Certificate id -> (user, course).
pub const CF_CERTIFICATES_BY_ID: &str = "certificates_by_id";

const ALL_CFS: [&str; 8] = [
    CF_PAYMENTS,
    CF_PAYMENTS_BY_HANDLE,
    CF_SUCCESS_INDEX,
    CF_TRANSACTION_IDS,
    CF_ENROLLMENTS,
    CF_PROGRESS,
    CF_CERTIFICATES,
    CF_CERTIFICATES_BY_ID,
];

fn storage_err(e: rocksdb::Error) -> CoreError {
    CoreError::Internal(format!("rocksdb: {e}"))
}

fn pair_key(user: UserId, course: CourseId) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..16].copy_from_slice(user.0.as_bytes());
    key[16..].copy_from_slice(course.0.as_bytes());
    key
}

/// Persistent store implementation backed by RocksDB.
///
/// One column family per entity plus the unique indexes the invariants
/// need. RocksDB gives no multi-key transactions here, so every
/// conditional read-modify-write sequence runs under `write_gate`; plain
/// reads go straight to the DB.
///
/// `Clone` shares the underlying `Arc<DB>` and gate, so the same instance
/// serves all four store ports.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    write_gate: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates the database, ensuring all column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();
        let db = DB::open_cf_descriptors(&opts, path, descriptors).map_err(storage_err)?;
        Ok(Self {
            db: Arc::new(db),
            write_gate: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| CoreError::Internal(format!("column family {name} not found")))
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf)?;
        match self.db.get_cf(cf, key).map_err(storage_err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf)?;
        self.db
            .put_cf(cf, key, serde_json::to_vec(value)?)
            .map_err(storage_err)
    }

    fn get_raw(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(cf)?;
        self.db.get_cf(cf, key).map_err(storage_err)
    }

    fn put_raw(&self, cf: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.cf(cf)?;
        self.db.put_cf(cf, key, value).map_err(storage_err)
    }

    fn delete_raw(&self, cf: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf(cf)?;
        self.db.delete_cf(cf, key).map_err(storage_err)
    }

    fn payment_by_handle(&self, order_handle: &str) -> Result<Option<Payment>> {
        match self.get_raw(CF_PAYMENTS_BY_HANDLE, order_handle.as_bytes())? {
            Some(id_bytes) => self.get_json(CF_PAYMENTS, &id_bytes),
            None => Ok(None),
        }
    }

    fn scan_payments(&self) -> Result<Vec<Payment>> {
        let cf = self.cf(CF_PAYMENTS)?;
        let mut payments = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item.map_err(storage_err)?;
            payments.push(serde_json::from_slice(&value)?);
        }
        payments.sort_by_key(|p: &Payment| p.created_at);
        Ok(payments)
    }
}

#[async_trait]
impl PaymentStore for RocksDbStore {
    async fn create(&self, payment: Payment) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        if self
            .get_raw(CF_PAYMENTS_BY_HANDLE, payment.order_handle.as_bytes())?
            .is_some()
        {
            return Err(CoreError::Conflict(format!(
                "order handle {} already recorded",
                payment.order_handle
            )));
        }
        self.put_raw(
            CF_PAYMENTS_BY_HANDLE,
            payment.order_handle.as_bytes(),
            payment.id.0.as_bytes(),
        )?;
        self.put_json(CF_PAYMENTS, payment.id.0.as_bytes(), &payment)
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.get_json(CF_PAYMENTS, id.0.as_bytes())
    }

    async fn get_by_order_handle(&self, order_handle: &str) -> Result<Option<Payment>> {
        self.payment_by_handle(order_handle)
    }

    async fn find_success(&self, user: UserId, course: CourseId) -> Result<Option<Payment>> {
        match self.get_raw(CF_SUCCESS_INDEX, &pair_key(user, course))? {
            Some(id_bytes) => self.get_json(CF_PAYMENTS, &id_bytes),
            None => Ok(None),
        }
    }

    async fn list_for_user(&self, user: UserId) -> Result<Vec<Payment>> {
        let mut payments = self.scan_payments()?;
        payments.retain(|p| p.user == user);
        Ok(payments)
    }

    async fn list_for_course(&self, course: CourseId) -> Result<Vec<Payment>> {
        let mut payments = self.scan_payments()?;
        payments.retain(|p| p.course == course);
        Ok(payments)
    }

    async fn list_all(&self) -> Result<Vec<Payment>> {
        self.scan_payments()
    }

    async fn mark_success(&self, order_handle: &str, transaction_id: &str) -> Result<MarkOutcome> {
        let _gate = self.write_gate.lock().await;
        let Some(mut payment) = self.payment_by_handle(order_handle)? else {
            return Ok(MarkOutcome::Missing);
        };
        if payment.status != PaymentStatus::Pending {
            return Ok(MarkOutcome::WrongStatus(payment.status));
        }
        let pair = pair_key(payment.user, payment.course);
        if self.get_raw(CF_SUCCESS_INDEX, &pair)?.is_some()
            || self
                .get_raw(CF_TRANSACTION_IDS, transaction_id.as_bytes())?
                .is_some()
        {
            return Ok(MarkOutcome::DuplicateSuccess);
        }

        payment.status = PaymentStatus::Success;
        payment.transaction_id = Some(transaction_id.to_string());
        payment.failure_reason = None;
        self.put_raw(CF_SUCCESS_INDEX, &pair, payment.id.0.as_bytes())?;
        self.put_raw(
            CF_TRANSACTION_IDS,
            transaction_id.as_bytes(),
            payment.id.0.as_bytes(),
        )?;
        self.put_json(CF_PAYMENTS, payment.id.0.as_bytes(), &payment)?;
        Ok(MarkOutcome::Applied(payment))
    }

    async fn mark_failed(&self, order_handle: &str, reason: &str) -> Result<MarkOutcome> {
        let _gate = self.write_gate.lock().await;
        let Some(mut payment) = self.payment_by_handle(order_handle)? else {
            return Ok(MarkOutcome::Missing);
        };
        if payment.status != PaymentStatus::Pending {
            return Ok(MarkOutcome::WrongStatus(payment.status));
        }
        payment.status = PaymentStatus::Failed;
        payment.failure_reason = Some(reason.to_string());
        self.put_json(CF_PAYMENTS, payment.id.0.as_bytes(), &payment)?;
        Ok(MarkOutcome::Applied(payment))
    }

    async fn revert_to_pending(&self, order_handle: &str) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let Some(mut payment) = self.payment_by_handle(order_handle)? else {
            return Err(CoreError::NotFound("payment"));
        };
        if payment.status != PaymentStatus::Success {
            return Ok(());
        }
        self.delete_raw(CF_SUCCESS_INDEX, &pair_key(payment.user, payment.course))?;
        if let Some(transaction_id) = payment.transaction_id.take() {
            self.delete_raw(CF_TRANSACTION_IDS, transaction_id.as_bytes())?;
        }
        payment.status = PaymentStatus::Pending;
        self.put_json(CF_PAYMENTS, payment.id.0.as_bytes(), &payment)
    }
}

#[async_trait]
impl EnrollmentStore for RocksDbStore {
    async fn insert_new(&self, enrollment: Enrollment) -> Result<InsertOutcome> {
        let _gate = self.write_gate.lock().await;
        let key = pair_key(enrollment.user, enrollment.course);
        if self.get_raw(CF_ENROLLMENTS, &key)?.is_some() {
            return Ok(InsertOutcome::Duplicate);
        }
        self.put_json(CF_ENROLLMENTS, &key, &enrollment)?;
        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, user: UserId, course: CourseId) -> Result<Option<Enrollment>> {
        self.get_json(CF_ENROLLMENTS, &pair_key(user, course))
    }

    async fn complete(&self, user: UserId, course: CourseId) -> Result<CompleteOutcome> {
        let _gate = self.write_gate.lock().await;
        let key = pair_key(user, course);
        let Some(mut enrollment) = self.get_json::<Enrollment>(CF_ENROLLMENTS, &key)? else {
            return Ok(CompleteOutcome::Missing);
        };
        if enrollment.completed {
            return Ok(CompleteOutcome::AlreadyCompleted);
        }
        enrollment.completed = true;
        self.put_json(CF_ENROLLMENTS, &key, &enrollment)?;
        Ok(CompleteOutcome::Completed(enrollment))
    }

    async fn reopen(&self, user: UserId, course: CourseId) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let key = pair_key(user, course);
        let Some(mut enrollment) = self.get_json::<Enrollment>(CF_ENROLLMENTS, &key)? else {
            return Err(CoreError::NotFound("enrollment"));
        };
        enrollment.completed = false;
        self.put_json(CF_ENROLLMENTS, &key, &enrollment)
    }

    async fn delete(&self, user: UserId, course: CourseId) -> Result<bool> {
        let _gate = self.write_gate.lock().await;
        let key = pair_key(user, course);
        let existed = self.get_raw(CF_ENROLLMENTS, &key)?.is_some();
        if existed {
            self.delete_raw(CF_ENROLLMENTS, &key)?;
        }
        Ok(existed)
    }

    async fn list_for_user(&self, user: UserId) -> Result<Vec<Enrollment>> {
        let cf = self.cf(CF_ENROLLMENTS)?;
        let mut list = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item.map_err(storage_err)?;
            let enrollment: Enrollment = serde_json::from_slice(&value)?;
            if enrollment.user == user {
                list.push(enrollment);
            }
        }
        list.sort_by_key(|e| e.enrolled_at);
        Ok(list)
    }

    async fn list_for_course(&self, course: CourseId) -> Result<Vec<Enrollment>> {
        let cf = self.cf(CF_ENROLLMENTS)?;
        let mut list = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item.map_err(storage_err)?;
            let enrollment: Enrollment = serde_json::from_slice(&value)?;
            if enrollment.course == course {
                list.push(enrollment);
            }
        }
        list.sort_by_key(|e| e.enrolled_at);
        Ok(list)
    }
}

#[async_trait]
impl ProgressStore for RocksDbStore {
    async fn insert_new(&self, progress: Progress) -> Result<InsertOutcome> {
        let _gate = self.write_gate.lock().await;
        let key = pair_key(progress.user, progress.course);
        if self.get_raw(CF_PROGRESS, &key)?.is_some() {
            return Ok(InsertOutcome::Duplicate);
        }
        self.put_json(CF_PROGRESS, &key, &progress)?;
        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, user: UserId, course: CourseId) -> Result<Option<Progress>> {
        self.get_json(CF_PROGRESS, &pair_key(user, course))
    }

    async fn put(&self, progress: Progress) -> Result<()> {
        let key = pair_key(progress.user, progress.course);
        self.put_json(CF_PROGRESS, &key, &progress)
    }

    async fn delete(&self, user: UserId, course: CourseId) -> Result<bool> {
        let _gate = self.write_gate.lock().await;
        let key = pair_key(user, course);
        let existed = self.get_raw(CF_PROGRESS, &key)?.is_some();
        if existed {
            self.delete_raw(CF_PROGRESS, &key)?;
        }
        Ok(existed)
    }
}

#[async_trait]
impl CertificateStore for RocksDbStore {
    async fn insert_new(&self, certificate: Certificate) -> Result<CertificateInsert> {
        let _gate = self.write_gate.lock().await;
        let pair = pair_key(certificate.user, certificate.course);
        if let Some(existing) = self.get_json::<Certificate>(CF_CERTIFICATES, &pair)? {
            return Ok(CertificateInsert::PairExists(existing));
        }
        if self
            .get_raw(CF_CERTIFICATES_BY_ID, certificate.certificate_id.as_bytes())?
            .is_some()
        {
            return Ok(CertificateInsert::IdCollision);
        }
        self.put_raw(
            CF_CERTIFICATES_BY_ID,
            certificate.certificate_id.as_bytes(),
            &pair,
        )?;
        self.put_json(CF_CERTIFICATES, &pair, &certificate)?;
        Ok(CertificateInsert::Inserted)
    }

    async fn get_by_pair(&self, user: UserId, course: CourseId) -> Result<Option<Certificate>> {
        self.get_json(CF_CERTIFICATES, &pair_key(user, course))
    }

    async fn get_by_id(&self, certificate_id: &str) -> Result<Option<Certificate>> {
        match self.get_raw(CF_CERTIFICATES_BY_ID, certificate_id.as_bytes())? {
            Some(pair) => self.get_json(CF_CERTIFICATES, &pair),
            None => Ok(None),
        }
    }
}
