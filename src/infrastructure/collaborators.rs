use crate::application::signature;
use crate::domain::course::{CourseSummary, UserIdentity};
use crate::domain::ids::{CourseId, LectureId, UserId};
use crate::domain::ports::{
    CourseCatalog, GatewayOrder, Notifier, PaymentGateway, UserDirectory,
};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// A course section as the catalog models it: an ordered group of
/// lectures.
#[derive(Debug, Clone, Deserialize)]
pub struct SectionSeed {
    pub id: Uuid,
    pub lectures: Vec<LectureId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourseSeed {
    #[serde(flatten)]
    pub course: CourseSummary,
    #[serde(default)]
    pub sections: Vec<SectionSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserSeed {
    #[serde(flatten)]
    pub identity: UserIdentity,
    /// Access token the script presents as `actor`.
    pub token: String,
}

/// Seed data for the collaborator fakes, loaded from a JSON fixture by
/// the CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    pub users: Vec<UserSeed>,
    pub courses: Vec<CourseSeed>,
}

/// In-memory stand-in for the course catalog service.
#[derive(Default)]
pub struct InMemoryCourseCatalog {
    courses: RwLock<HashMap<CourseId, CourseSeed>>,
}

impl InMemoryCourseCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, seed: CourseSeed) {
        let mut courses = self.courses.write().await;
        courses.insert(seed.course.id, seed);
    }

    pub async fn seed(&self, seeds: Vec<CourseSeed>) {
        let mut courses = self.courses.write().await;
        for seed in seeds {
            courses.insert(seed.course.id, seed);
        }
    }
}

#[async_trait]
impl CourseCatalog for InMemoryCourseCatalog {
    async fn get(&self, course: CourseId) -> Result<Option<CourseSummary>> {
        let courses = self.courses.read().await;
        Ok(courses.get(&course).map(|seed| seed.course.clone()))
    }

    async fn count_lectures(&self, course: CourseId) -> Result<u32> {
        let courses = self.courses.read().await;
        Ok(courses
            .get(&course)
            .map(|seed| seed.sections.iter().map(|s| s.lectures.len() as u32).sum())
            .unwrap_or(0))
    }

    async fn lecture_belongs_to(&self, course: CourseId, lecture: LectureId) -> Result<bool> {
        let courses = self.courses.read().await;
        Ok(courses
            .get(&course)
            .map(|seed| {
                seed.sections
                    .iter()
                    .any(|section| section.lectures.contains(&lecture))
            })
            .unwrap_or(false))
    }
}

/// In-memory stand-in for the user directory service.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    inner: RwLock<DirectoryInner>,
}

#[derive(Default)]
struct DirectoryInner {
    users: HashMap<UserId, UserIdentity>,
    tokens: HashMap<String, UserId>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, seeds: Vec<UserSeed>) {
        let mut inner = self.inner.write().await;
        for seed in seeds {
            inner.tokens.insert(seed.token, seed.identity.id);
            inner.users.insert(seed.identity.id, seed.identity);
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn authenticate(&self, token: &str) -> Result<Option<UserIdentity>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tokens
            .get(token)
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    async fn get(&self, user: UserId) -> Result<Option<UserIdentity>> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(&user).cloned())
    }
}

/// A settled gateway transaction, as the checkout flow would report it
/// back to the client.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub transaction_id: String,
    pub signature: String,
}

/// Sandbox payment gateway.
///
/// Hands out sequential order handles so scripted runs are
/// deterministic, and can settle an order the way the real gateway's
/// checkout would: producing a transaction id plus a signature over
/// `order_handle|transaction_id` with the shared secret. Failure and
/// latency injection cover the ledger's timeout path.
pub struct InMemoryPaymentGateway {
    secret: String,
    next_order: AtomicU64,
    next_transaction: AtomicU64,
    fail_next: AtomicBool,
    delay: RwLock<Option<Duration>>,
    orders: RwLock<HashMap<String, i64>>,
}

impl InMemoryPaymentGateway {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            next_order: AtomicU64::new(1),
            next_transaction: AtomicU64::new(1),
            fail_next: AtomicBool::new(false),
            delay: RwLock::new(None),
            orders: RwLock::new(HashMap::new()),
        }
    }

    /// The next `create_order` call fails with a gateway error.
    pub fn fail_next_order(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Every `create_order` call sleeps this long before answering.
    pub async fn delay_orders(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Settles an order out-of-band, returning what the client would
    /// post to the verification endpoint.
    pub async fn settle(&self, order_handle: &str) -> Option<Settlement> {
        let orders = self.orders.read().await;
        if !orders.contains_key(order_handle) {
            return None;
        }
        let n = self.next_transaction.fetch_add(1, Ordering::SeqCst);
        let transaction_id = format!("txn_{n:06}");
        let signature = signature::sign(&self.secret, order_handle, &transaction_id);
        Some(Settlement {
            transaction_id,
            signature,
        })
    }

    /// Like [`Self::settle`] but with a corrupted signature, for
    /// exercising the mismatch path.
    pub async fn settle_tampered(&self, order_handle: &str) -> Option<Settlement> {
        let mut settlement = self.settle(order_handle).await?;
        settlement.signature = signature::sign("wrong-secret", order_handle, &settlement.transaction_id);
        Some(settlement)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_order(
        &self,
        amount: i64,
        _currency: &str,
        _receipt: &str,
        _notes: &BTreeMap<String, String>,
    ) -> Result<GatewayOrder> {
        if let Some(delay) = *self.delay.read().await {
            tokio::time::sleep(delay).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CoreError::Unavailable(
                "gateway rejected the order".to_string(),
            ));
        }
        let n = self.next_order.fetch_add(1, Ordering::SeqCst);
        let order_handle = format!("order_{n:06}");
        self.orders.write().await.insert(order_handle.clone(), amount);
        Ok(GatewayOrder { order_handle })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
}

/// Notifier that records every send, for asserting on side effects.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Arc<RwLock<Vec<SentMail>>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All subsequent sends fail, for proving callers never depend on
    /// delivery.
    pub fn fail_sends(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<SentMail> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, subject: &str, _html_body: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::Unavailable("smtp relay down".to_string()));
        }
        self.sent.write().await.push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
        });
        Ok(())
    }
}

/// Notifier for the CLI: logs instead of delivering.
#[derive(Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, to: &str, subject: &str, _html_body: &str) -> Result<()> {
        info!(%to, %subject, "email dispatched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn seeded_course(lectures_per_section: &[usize]) -> (CourseSeed, Vec<LectureId>) {
        let mut all = Vec::new();
        let sections = lectures_per_section
            .iter()
            .map(|&n| {
                let lectures: Vec<LectureId> = (0..n).map(|_| LectureId::new()).collect();
                all.extend(lectures.iter().copied());
                SectionSeed {
                    id: Uuid::new_v4(),
                    lectures,
                }
            })
            .collect();
        let seed = CourseSeed {
            course: CourseSummary {
                id: CourseId::new(),
                title: "Rust Foundations".into(),
                price: dec!(50),
                is_free: false,
                published: true,
                instructor: UserId::new(),
            },
            sections,
        };
        (seed, all)
    }

    #[tokio::test]
    async fn test_catalog_counts_across_sections() {
        let catalog = InMemoryCourseCatalog::new();
        let (seed, lectures) = seeded_course(&[2, 3]);
        let course_id = seed.course.id;
        catalog.upsert(seed).await;

        assert_eq!(catalog.count_lectures(course_id).await.unwrap(), 5);
        assert!(
            catalog
                .lecture_belongs_to(course_id, lectures[4])
                .await
                .unwrap()
        );
        assert!(
            !catalog
                .lecture_belongs_to(course_id, LectureId::new())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_gateway_settlement_signature_verifies() {
        let gateway = InMemoryPaymentGateway::new("secret");
        let order = gateway
            .create_order(5_000, "INR", "rcpt_1", &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(order.order_handle, "order_000001");

        let settlement = gateway.settle(&order.order_handle).await.unwrap();
        assert!(signature::verify(
            "secret",
            &order.order_handle,
            &settlement.transaction_id,
            &settlement.signature
        ));

        let tampered = gateway.settle_tampered(&order.order_handle).await.unwrap();
        assert!(!signature::verify(
            "secret",
            &order.order_handle,
            &tampered.transaction_id,
            &tampered.signature
        ));
    }

    #[tokio::test]
    async fn test_gateway_failure_injection_is_one_shot() {
        let gateway = InMemoryPaymentGateway::new("secret");
        gateway.fail_next_order();
        assert!(
            gateway
                .create_order(100, "INR", "r", &BTreeMap::new())
                .await
                .is_err()
        );
        assert!(
            gateway
                .create_order(100, "INR", "r", &BTreeMap::new())
                .await
                .is_ok()
        );
    }
}
