use super::enrollments::EnrollmentManager;
use super::{signature, spawn_notification};
use crate::config::AppConfig;
use crate::domain::course::UserIdentity;
use crate::domain::enrollment::Enrollment;
use crate::domain::ids::{CourseId, PaymentId};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::policy;
use crate::domain::ports::{
    CourseCatalogRef, MarkOutcome, NotifierRef, PaymentGatewayRef, PaymentStoreRef,
};
use crate::error::{CoreError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Owns Payment rows: order creation against the remote gateway,
/// cryptographic verification, and revenue reads.
pub struct PaymentLedger {
    payments: PaymentStoreRef,
    catalog: CourseCatalogRef,
    gateway: PaymentGatewayRef,
    enrollments: Arc<EnrollmentManager>,
    notifier: NotifierRef,
    config: AppConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderCreated {
    pub order_handle: String,
    pub amount: i64,
    pub currency: String,
    pub payment_id: PaymentId,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedPayment {
    pub payment: Payment,
    pub enrollment: Enrollment,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseRevenue {
    pub count: usize,
    pub total_amount: i64,
    pub payments: Vec<Payment>,
}

impl PaymentLedger {
    pub fn new(
        payments: PaymentStoreRef,
        catalog: CourseCatalogRef,
        gateway: PaymentGatewayRef,
        enrollments: Arc<EnrollmentManager>,
        notifier: NotifierRef,
        config: AppConfig,
    ) -> Self {
        Self {
            payments,
            catalog,
            gateway,
            enrollments,
            notifier,
            config,
        }
    }

    /// Creates a pending payment order for a purchasable course.
    ///
    /// The gateway call is the core's only synchronous external
    /// dependency; it runs under the configured timeout and surfaces a
    /// retryable failure on expiry.
    pub async fn create_order(
        &self,
        actor: &UserIdentity,
        course_id: CourseId,
    ) -> Result<OrderCreated> {
        let course = self
            .catalog
            .get(course_id)
            .await?
            .ok_or(CoreError::NotFound("course"))?;
        if !course.published {
            return Err(CoreError::Validation(
                "course is not available for purchase".to_string(),
            ));
        }
        if course.is_free {
            return Err(CoreError::Validation(
                "course is free; enroll directly".to_string(),
            ));
        }
        if course.instructor == actor.id {
            return Err(CoreError::Validation(
                "instructors cannot purchase their own course".to_string(),
            ));
        }
        if self.enrollments.find(actor.id, course_id).await?.is_some() {
            return Err(CoreError::Conflict(
                "already enrolled in this course".to_string(),
            ));
        }
        if self
            .payments
            .find_success(actor.id, course_id)
            .await?
            .is_some()
        {
            return Err(CoreError::Conflict(
                "course already purchased".to_string(),
            ));
        }

        let amount = course.amount_minor()?;
        let payment_id = PaymentId::new();
        let mut receipt = format!("rcpt_{}", payment_id.0.simple());
        receipt.truncate(self.config.receipt_max_len);
        let notes = BTreeMap::from([
            ("user".to_string(), actor.id.to_string()),
            ("course".to_string(), course_id.to_string()),
            ("payment".to_string(), payment_id.to_string()),
        ]);

        let order = tokio::time::timeout(
            Duration::from_millis(self.config.gateway_timeout_ms),
            self.gateway
                .create_order(amount, &self.config.currency, &receipt, &notes),
        )
        .await
        .map_err(|_| CoreError::Unavailable("payment gateway timed out".to_string()))?
        .map_err(|e| CoreError::Unavailable(format!("payment gateway error: {e}")))?;

        let payment = Payment::pending(
            payment_id,
            actor.id,
            course_id,
            amount,
            &self.config.currency,
            &order.order_handle,
            &receipt,
            notes,
        );
        self.payments.create(payment).await?;
        info!(user = %actor.id, course = %course_id, order_handle = %order.order_handle, amount,
            "payment order created");

        Ok(OrderCreated {
            order_handle: order.order_handle,
            amount,
            currency: self.config.currency.clone(),
            payment_id,
        })
    }

    /// Verifies a client-reported payment against the server-side HMAC
    /// and, on success, enrolls the learner as one unit of work.
    ///
    /// A mismatched signature fails the payment permanently for this
    /// order. A matched one transitions `Pending -> Success` through the
    /// store's conditional write, so a concurrent duplicate verification
    /// observes the transition and returns a conflict instead of
    /// double-enrolling. If enrollment cannot be created, the success
    /// transition is compensated back to pending and the caller may
    /// retry.
    pub async fn verify_payment(
        &self,
        actor: &UserIdentity,
        order_handle: &str,
        transaction_id: &str,
        client_signature: &str,
    ) -> Result<VerifiedPayment> {
        let payment = self
            .payments
            .get_by_order_handle(order_handle)
            .await?
            .ok_or(CoreError::NotFound("payment"))?;
        if payment.user != actor.id {
            return Err(CoreError::Forbidden(
                "payment does not belong to the caller".to_string(),
            ));
        }
        match payment.status {
            PaymentStatus::Success => {
                return Err(CoreError::Conflict("payment already verified".to_string()));
            }
            PaymentStatus::Failed | PaymentStatus::Refunded => {
                return Err(CoreError::Validation(
                    "payment is no longer verifiable; create a new order".to_string(),
                ));
            }
            PaymentStatus::Pending => {}
        }

        if !signature::verify(
            &self.config.server_secret,
            order_handle,
            transaction_id,
            client_signature,
        ) {
            match self
                .payments
                .mark_failed(order_handle, "signature mismatch")
                .await?
            {
                // A concurrent valid verification beat this bogus one.
                MarkOutcome::WrongStatus(PaymentStatus::Success) => {
                    return Err(CoreError::Conflict("payment already verified".to_string()));
                }
                _ => {
                    warn!(%order_handle, user = %actor.id, "payment signature mismatch");
                    return Err(CoreError::SignatureMismatch {
                        order_handle: order_handle.to_string(),
                    });
                }
            }
        }

        let payment = match self
            .payments
            .mark_success(order_handle, transaction_id)
            .await?
        {
            MarkOutcome::Applied(payment) => payment,
            MarkOutcome::Missing => return Err(CoreError::NotFound("payment")),
            MarkOutcome::WrongStatus(PaymentStatus::Success) => {
                return Err(CoreError::Conflict("payment already verified".to_string()));
            }
            MarkOutcome::WrongStatus(_) => {
                return Err(CoreError::Validation(
                    "payment is no longer verifiable; create a new order".to_string(),
                ));
            }
            MarkOutcome::DuplicateSuccess => {
                return Err(CoreError::Conflict("course already purchased".to_string()));
            }
        };

        let enrollment = match self.enrollments.enroll(actor, payment.course).await {
            Ok(enrollment) => enrollment,
            // Already enrolled (e.g. a racing free-path enroll won): the
            // payment is not dangling, an enrollment exists.
            Err(CoreError::Conflict(_)) => {
                match self.enrollments.find(actor.id, payment.course).await? {
                    Some(existing) => existing,
                    None => return self.compensate(order_handle, "enrollment vanished").await,
                }
            }
            Err(e) => return self.compensate(order_handle, &e.to_string()).await,
        };

        info!(user = %actor.id, order_handle = %order_handle, "payment verified and learner enrolled");
        spawn_notification(
            &self.notifier,
            &actor.email,
            "Payment received",
            &format!(
                "<p>Your payment of {} {} was verified. Happy learning!</p>",
                payment.amount, payment.currency
            ),
        );
        Ok(VerifiedPayment {
            payment,
            enrollment,
        })
    }

    /// Rolls a captured payment back to pending after a failed enrollment
    /// so the verification can be retried. A success row without an
    /// enrollment must never persist.
    async fn compensate(&self, order_handle: &str, cause: &str) -> Result<VerifiedPayment> {
        if let Err(revert) = self.payments.revert_to_pending(order_handle).await {
            error!(%order_handle, error = %revert, cause,
                "failed to revert captured payment after enrollment failure");
        } else {
            warn!(%order_handle, cause, "payment reverted to pending after enrollment failure");
        }
        Err(CoreError::Unavailable(
            "enrollment could not be created; retry verification".to_string(),
        ))
    }

    /// A single payment row; owner or administrator only.
    pub async fn get_payment(&self, actor: &UserIdentity, id: PaymentId) -> Result<Payment> {
        let payment = self
            .payments
            .get(id)
            .await?
            .ok_or(CoreError::NotFound("payment"))?;
        if !policy::can_view_payment(actor, &payment) {
            return Err(CoreError::Forbidden(
                "payment does not belong to the caller".to_string(),
            ));
        }
        Ok(payment)
    }

    pub async fn list_my_payments(&self, actor: &UserIdentity) -> Result<Vec<Payment>> {
        self.payments.list_for_user(actor.id).await
    }

    /// Successful-payment totals for a course; instructor or
    /// administrator only.
    pub async fn course_revenue(
        &self,
        actor: &UserIdentity,
        course_id: CourseId,
    ) -> Result<CourseRevenue> {
        let course = self
            .catalog
            .get(course_id)
            .await?
            .ok_or(CoreError::NotFound("course"))?;
        if !policy::can_manage_course(actor, &course) {
            return Err(CoreError::Forbidden(
                "only the course instructor or an administrator may view revenue".to_string(),
            ));
        }

        let mut payments = self.payments.list_for_course(course_id).await?;
        payments.retain(|p| p.status == PaymentStatus::Success);
        let total_amount = payments.iter().map(|p| p.amount).sum();
        Ok(CourseRevenue {
            count: payments.len(),
            total_amount,
            payments,
        })
    }

    /// Every payment row, for the CSV export.
    pub async fn export_payments(&self) -> Result<Vec<Payment>> {
        self.payments.list_all().await
    }
}
