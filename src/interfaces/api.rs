use crate::application::CoreServices;
use crate::domain::course::UserIdentity;
use crate::domain::ids::{CourseId, LectureId, PaymentId};
use crate::domain::ports::UserDirectoryRef;
use crate::error::{CoreError, Result};
use crate::infrastructure::collaborators::InMemoryPaymentGateway;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::error;

/// One request line of the driver script; each variant maps to one of the
/// service endpoints. `actor` carries the caller's access token.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ApiRequest {
    CreateOrder {
        actor: String,
        course: CourseId,
    },
    VerifyPayment {
        actor: String,
        order_handle: String,
        transaction_id: String,
        signature: String,
    },
    GetPayment {
        actor: String,
        payment: PaymentId,
    },
    ListMyPayments {
        actor: String,
    },
    CourseRevenue {
        actor: String,
        course: CourseId,
    },
    Enroll {
        actor: String,
        course: CourseId,
    },
    MyEnrollments {
        actor: String,
        #[serde(default)]
        completed: Option<bool>,
    },
    Unenroll {
        actor: String,
        course: CourseId,
    },
    MarkCompleted {
        actor: String,
        course: CourseId,
    },
    CourseEnrollments {
        actor: String,
        course: CourseId,
    },
    CourseProgress {
        actor: String,
        course: CourseId,
    },
    ToggleLecture {
        actor: String,
        course: CourseId,
        lecture: LectureId,
    },
    ResetProgress {
        actor: String,
        course: CourseId,
    },
    GenerateCertificate {
        actor: String,
        course: CourseId,
    },
    /// Public endpoint; no actor.
    VerifyCertificate {
        certificate_id: String,
    },
    /// Sandbox-only: settle a pending order the way the gateway checkout
    /// would, returning the transaction id and signature to verify with.
    SettleOrder {
        order_handle: String,
        #[serde(default)]
        tampered: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub ok: bool,
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn success(body: Value) -> Self {
        Self {
            ok: true,
            status: 200,
            body,
        }
    }

    fn failure(e: CoreError) -> Self {
        // Unexpected errors are logged with full context and masked.
        let message = if e.is_internal() {
            error!(error = %e, "request failed unexpectedly");
            "internal error".to_string()
        } else {
            e.to_string()
        };
        Self {
            ok: false,
            status: e.status_code(),
            body: json!({ "error": message, "retryable": e.is_retryable() }),
        }
    }
}

/// Maps transport requests onto the core services; the HTTP layer proper
/// is a thin shell around this.
pub struct ApiRouter {
    services: CoreServices,
    directory: UserDirectoryRef,
    sandbox_gateway: Option<Arc<InMemoryPaymentGateway>>,
}

impl ApiRouter {
    pub fn new(services: CoreServices, directory: UserDirectoryRef) -> Self {
        Self {
            services,
            directory,
            sandbox_gateway: None,
        }
    }

    /// Enables the sandbox settle op against the given gateway fake.
    pub fn with_sandbox_gateway(mut self, gateway: Arc<InMemoryPaymentGateway>) -> Self {
        self.sandbox_gateway = Some(gateway);
        self
    }

    pub async fn handle(&self, request: ApiRequest) -> ApiResponse {
        match self.dispatch(request).await {
            Ok(body) => ApiResponse::success(body),
            Err(e) => ApiResponse::failure(e),
        }
    }

    async fn actor(&self, token: &str) -> Result<UserIdentity> {
        self.directory
            .authenticate(token)
            .await?
            .ok_or_else(|| CoreError::Forbidden("unknown or expired access token".to_string()))
    }

    async fn dispatch(&self, request: ApiRequest) -> Result<Value> {
        match request {
            ApiRequest::CreateOrder { actor, course } => {
                let actor = self.actor(&actor).await?;
                Ok(serde_json::to_value(
                    self.services.ledger.create_order(&actor, course).await?,
                )?)
            }
            ApiRequest::VerifyPayment {
                actor,
                order_handle,
                transaction_id,
                signature,
            } => {
                let actor = self.actor(&actor).await?;
                Ok(serde_json::to_value(
                    self.services
                        .ledger
                        .verify_payment(&actor, &order_handle, &transaction_id, &signature)
                        .await?,
                )?)
            }
            ApiRequest::GetPayment { actor, payment } => {
                let actor = self.actor(&actor).await?;
                Ok(serde_json::to_value(
                    self.services.ledger.get_payment(&actor, payment).await?,
                )?)
            }
            ApiRequest::ListMyPayments { actor } => {
                let actor = self.actor(&actor).await?;
                Ok(serde_json::to_value(
                    self.services.ledger.list_my_payments(&actor).await?,
                )?)
            }
            ApiRequest::CourseRevenue { actor, course } => {
                let actor = self.actor(&actor).await?;
                Ok(serde_json::to_value(
                    self.services.ledger.course_revenue(&actor, course).await?,
                )?)
            }
            ApiRequest::Enroll { actor, course } => {
                let actor = self.actor(&actor).await?;
                Ok(serde_json::to_value(
                    self.services.enrollments.enroll(&actor, course).await?,
                )?)
            }
            ApiRequest::MyEnrollments { actor, completed } => {
                let actor = self.actor(&actor).await?;
                Ok(serde_json::to_value(
                    self.services
                        .enrollments
                        .my_enrollments(&actor, completed)
                        .await?,
                )?)
            }
            ApiRequest::Unenroll { actor, course } => {
                let actor = self.actor(&actor).await?;
                self.services.enrollments.unenroll(&actor, course).await?;
                Ok(json!({ "removed": true }))
            }
            ApiRequest::MarkCompleted { actor, course } => {
                let actor = self.actor(&actor).await?;
                Ok(serde_json::to_value(
                    self.services
                        .enrollments
                        .mark_completed(&actor, course)
                        .await?,
                )?)
            }
            ApiRequest::CourseEnrollments { actor, course } => {
                let actor = self.actor(&actor).await?;
                Ok(serde_json::to_value(
                    self.services
                        .enrollments
                        .course_enrollments(&actor, course)
                        .await?,
                )?)
            }
            ApiRequest::CourseProgress { actor, course } => {
                let actor = self.actor(&actor).await?;
                Ok(serde_json::to_value(
                    self.services
                        .progress
                        .course_progress(&actor, course)
                        .await?,
                )?)
            }
            ApiRequest::ToggleLecture {
                actor,
                course,
                lecture,
            } => {
                let actor = self.actor(&actor).await?;
                Ok(serde_json::to_value(
                    self.services
                        .progress
                        .toggle_lecture(&actor, course, lecture)
                        .await?,
                )?)
            }
            ApiRequest::ResetProgress { actor, course } => {
                let actor = self.actor(&actor).await?;
                Ok(serde_json::to_value(
                    self.services
                        .progress
                        .reset_progress(&actor, course)
                        .await?,
                )?)
            }
            ApiRequest::GenerateCertificate { actor, course } => {
                let actor = self.actor(&actor).await?;
                Ok(serde_json::to_value(
                    self.services
                        .enrollments
                        .request_certificate(&actor, course)
                        .await?,
                )?)
            }
            ApiRequest::VerifyCertificate { certificate_id } => Ok(serde_json::to_value(
                self.services.certificates.verify(&certificate_id).await?,
            )?),
            ApiRequest::SettleOrder {
                order_handle,
                tampered,
            } => {
                let gateway = self.sandbox_gateway.as_ref().ok_or_else(|| {
                    CoreError::Validation("sandbox settlement is not available".to_string())
                })?;
                let settlement = if tampered {
                    gateway.settle_tampered(&order_handle).await
                } else {
                    gateway.settle(&order_handle).await
                };
                let settlement =
                    settlement.ok_or(CoreError::NotFound("payment"))?;
                Ok(json!({
                    "order_handle": order_handle,
                    "transaction_id": settlement.transaction_id,
                    "signature": settlement.signature,
                }))
            }
        }
    }
}
