pub mod certificates;
pub mod enrollments;
pub mod ledger;
pub mod progress;
pub mod signature;

use crate::config::AppConfig;
use crate::domain::ports::{
    CertificateStoreRef, CourseCatalogRef, EnrollmentStoreRef, NotifierRef, PaymentGatewayRef,
    PaymentStoreRef, ProgressStoreRef, UserDirectoryRef,
};
use certificates::CertificateIssuer;
use enrollments::EnrollmentManager;
use ledger::PaymentLedger;
use progress::ProgressTracker;
use std::sync::Arc;
use tracing::warn;

/// Storage backends for the four owned entities.
#[derive(Clone)]
pub struct StoreSet {
    pub payments: PaymentStoreRef,
    pub enrollments: EnrollmentStoreRef,
    pub progress: ProgressStoreRef,
    pub certificates: CertificateStoreRef,
}

/// External collaborators the core consumes but does not own.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: CourseCatalogRef,
    pub users: UserDirectoryRef,
    pub gateway: PaymentGatewayRef,
    pub notifier: NotifierRef,
}

/// The wired commerce core.
///
/// Construction order follows the dependency chain: certificates stand
/// alone, enrollments issue certificates, progress drives enrollments,
/// and the ledger enrolls after verification.
#[derive(Clone)]
pub struct CoreServices {
    pub ledger: Arc<PaymentLedger>,
    pub enrollments: Arc<EnrollmentManager>,
    pub progress: Arc<ProgressTracker>,
    pub certificates: Arc<CertificateIssuer>,
}

impl CoreServices {
    pub fn new(config: AppConfig, stores: StoreSet, collaborators: Collaborators) -> Self {
        let certificates = Arc::new(CertificateIssuer::new(
            stores.certificates,
            Arc::clone(&collaborators.catalog),
            Arc::clone(&collaborators.users),
        ));
        let enrollments = Arc::new(EnrollmentManager::new(
            stores.enrollments,
            Arc::clone(&stores.progress),
            Arc::clone(&stores.payments),
            Arc::clone(&collaborators.catalog),
            Arc::clone(&certificates),
            Arc::clone(&collaborators.notifier),
        ));
        let progress = Arc::new(ProgressTracker::new(
            stores.progress,
            Arc::clone(&collaborators.catalog),
            Arc::clone(&enrollments),
        ));
        let ledger = Arc::new(PaymentLedger::new(
            stores.payments,
            collaborators.catalog,
            collaborators.gateway,
            Arc::clone(&enrollments),
            collaborators.notifier,
            config,
        ));
        Self {
            ledger,
            enrollments,
            progress,
            certificates,
        }
    }
}

/// Dispatches a notification after the primary mutation has committed.
///
/// The send is never awaited by the caller and its failure never fails
/// the triggering operation; the spawned task logs the error instead.
pub(crate) fn spawn_notification(notifier: &NotifierRef, to: &str, subject: &str, html_body: &str) {
    let notifier = Arc::clone(notifier);
    let to = to.to_string();
    let subject = subject.to_string();
    let html_body = html_body.to_string();
    tokio::spawn(async move {
        if let Err(e) = notifier.send(&to, &subject, &html_body).await {
            warn!(error = %e, %to, %subject, "notification delivery failed");
        }
    });
}
