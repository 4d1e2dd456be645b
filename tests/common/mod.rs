use coursemart::application::ledger::VerifiedPayment;
use coursemart::application::{Collaborators, CoreServices, StoreSet};
use coursemart::config::AppConfig;
use coursemart::domain::course::{CourseSummary, Role, UserIdentity};
use coursemart::domain::ids::{CourseId, LectureId, UserId};
use coursemart::infrastructure::collaborators::{
    CourseSeed, InMemoryCourseCatalog, InMemoryPaymentGateway, InMemoryUserDirectory,
    RecordingNotifier, SectionSeed, UserSeed,
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const SECRET: &str = "test-secret";

#[allow(dead_code)]
pub struct TestWorld {
    pub services: CoreServices,
    pub catalog: Arc<InMemoryCourseCatalog>,
    pub users: Arc<InMemoryUserDirectory>,
    pub gateway: Arc<InMemoryPaymentGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub learner: UserIdentity,
    pub second_learner: UserIdentity,
    pub instructor: UserIdentity,
    pub admin: UserIdentity,
    pub paid_course: CourseId,
    pub free_course: CourseId,
    /// The paid course's four lectures, across two sections.
    pub lectures: Vec<LectureId>,
    /// The free course's two lectures.
    pub free_lectures: Vec<LectureId>,
}

pub fn identity(name: &str, role: Role) -> UserIdentity {
    UserIdentity {
        id: UserId::new(),
        email: format!("{}@example.com", name.to_lowercase()),
        name: name.to_string(),
        role,
    }
}

fn course_seed(
    title: &str,
    price: rust_decimal::Decimal,
    is_free: bool,
    published: bool,
    instructor: UserId,
    lectures_per_section: &[usize],
) -> (CourseSeed, Vec<LectureId>) {
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
            title: title.to_string(),
            price,
            is_free,
            published,
            instructor,
        },
        sections,
    };
    (seed, all)
}

/// A fully wired core over in-memory stores and seeded fakes: one paid
/// course (50.00, four lectures), one free course (two lectures), a
/// couple of learners, the instructor owning both courses, and an admin.
#[allow(dead_code)]
pub async fn world() -> TestWorld {
    let learner = identity("Asha", Role::Learner);
    let second_learner = identity("Ravi", Role::Learner);
    let instructor = identity("Nadia", Role::Instructor);
    let admin = identity("Root", Role::Admin);

    let (paid_seed, lectures) =
        course_seed("Systems Programming", dec!(50.00), false, true, instructor.id, &[2, 2]);
    let (free_seed, free_lectures) =
        course_seed("Intro to Rust", dec!(0), true, true, instructor.id, &[2]);
    let paid_course = paid_seed.course.id;
    let free_course = free_seed.course.id;

    let catalog = Arc::new(InMemoryCourseCatalog::new());
    catalog.seed(vec![paid_seed, free_seed]).await;

    let users = Arc::new(InMemoryUserDirectory::new());
    users
        .seed(
            [&learner, &second_learner, &instructor, &admin]
                .into_iter()
                .map(|identity| UserSeed {
                    identity: identity.clone(),
                    token: format!("tok_{}", identity.name.to_lowercase()),
                })
                .collect(),
        )
        .await;

    let gateway = Arc::new(InMemoryPaymentGateway::new(SECRET));
    let notifier = Arc::new(RecordingNotifier::new());

    let config = AppConfig {
        server_secret: SECRET.to_string(),
        gateway_timeout_ms: 250,
        ..AppConfig::default()
    };
    let services = CoreServices::new(
        config,
        StoreSet::in_memory(),
        Collaborators {
            catalog: catalog.clone(),
            users: users.clone(),
            gateway: gateway.clone(),
            notifier: notifier.clone(),
        },
    );

    TestWorld {
        services,
        catalog,
        users,
        gateway,
        notifier,
        learner,
        second_learner,
        instructor,
        admin,
        paid_course,
        free_course,
        lectures,
        free_lectures,
    }
}

/// Creates an order, settles it at the gateway fake, and verifies the
/// payment: the whole purchase path in one call.
#[allow(dead_code)]
pub async fn purchase(
    world: &TestWorld,
    buyer: &UserIdentity,
    course: CourseId,
) -> VerifiedPayment {
    let order = world
        .services
        .ledger
        .create_order(buyer, course)
        .await
        .expect("order creation failed");
    let settlement = world
        .gateway
        .settle(&order.order_handle)
        .await
        .expect("order unknown to gateway");
    world
        .services
        .ledger
        .verify_payment(
            buyer,
            &order.order_handle,
            &settlement.transaction_id,
            &settlement.signature,
        )
        .await
        .expect("verification failed")
}

/// Polls the recording notifier until at least `count` mails landed.
/// Notifications are spawned tasks, so tests must wait, not assume.
#[allow(dead_code)]
pub async fn wait_for_mail(notifier: &RecordingNotifier, count: usize) {
    for _ in 0..100 {
        if notifier.sent().await.len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {count} notifications, got {:?}", notifier.sent().await);
}
