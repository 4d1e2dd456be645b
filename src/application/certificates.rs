use crate::domain::certificate::Certificate;
use crate::domain::ids::{CourseId, UserId};
use crate::domain::ports::{
    CertificateInsert, CertificateStoreRef, CourseCatalogRef, UserDirectoryRef,
};
use crate::error::{CoreError, Result};
use serde::Serialize;
use tracing::info;

/// Fresh-token retries before giving up on a 128-bit space. Hitting this
/// means the RNG is broken, not that we were unlucky.
const MAX_TOKEN_RETRIES: usize = 4;

/// Issues completion certificates and serves the public verification
/// endpoint.
pub struct CertificateIssuer {
    certificates: CertificateStoreRef,
    catalog: CourseCatalogRef,
    users: UserDirectoryRef,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedCertificate {
    pub certificate: Certificate,
    pub is_new: bool,
}

/// Public view of a certificate. Deliberately free of payment amounts and
/// internal identifiers.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateView {
    pub learner_name: String,
    pub course_title: String,
    pub instructor_name: String,
    pub issued_at: String,
    pub certificate_id: String,
}

impl CertificateIssuer {
    pub fn new(
        certificates: CertificateStoreRef,
        catalog: CourseCatalogRef,
        users: UserDirectoryRef,
    ) -> Self {
        Self {
            certificates,
            catalog,
            users,
        }
    }

    /// Idempotent issuance: the first caller for a pair creates the row
    /// (`is_new = true`), every later or concurrent caller gets the same
    /// stored certificate back. Token collisions retry with a fresh token.
    ///
    /// The caller has already confirmed completion; enrollment state is
    /// not re-validated here.
    pub async fn issue(&self, user: UserId, course: CourseId) -> Result<IssuedCertificate> {
        if let Some(existing) = self.certificates.get_by_pair(user, course).await? {
            return Ok(IssuedCertificate {
                certificate: existing,
                is_new: false,
            });
        }

        for _ in 0..MAX_TOKEN_RETRIES {
            let certificate = Certificate::new(user, course);
            match self.certificates.insert_new(certificate.clone()).await? {
                CertificateInsert::Inserted => {
                    info!(%user, %course, certificate_id = %certificate.certificate_id, "certificate issued");
                    return Ok(IssuedCertificate {
                        certificate,
                        is_new: true,
                    });
                }
                CertificateInsert::PairExists(existing) => {
                    return Ok(IssuedCertificate {
                        certificate: existing,
                        is_new: false,
                    });
                }
                CertificateInsert::IdCollision => continue,
            }
        }
        Err(CoreError::Internal(
            "certificate token collisions exhausted retries".to_string(),
        ))
    }

    /// Public, unauthenticated verification by certificate id.
    pub async fn verify(&self, certificate_id: &str) -> Result<CertificateView> {
        let certificate = self
            .certificates
            .get_by_id(certificate_id)
            .await?
            .ok_or(CoreError::NotFound("certificate"))?;
        let course = self
            .catalog
            .get(certificate.course)
            .await?
            .ok_or(CoreError::NotFound("course"))?;
        let learner = self
            .users
            .get(certificate.user)
            .await?
            .ok_or(CoreError::NotFound("user"))?;
        let instructor_name = match self.users.get(course.instructor).await? {
            Some(identity) => identity.name,
            None => String::new(),
        };

        Ok(CertificateView {
            learner_name: learner.name,
            course_title: course.title,
            instructor_name,
            issued_at: certificate.issued_at.format("%B %-d, %Y").to_string(),
            certificate_id: certificate.certificate_id,
        })
    }

    /// The actor's certificate for a course, if one has been issued.
    pub async fn find(&self, user: UserId, course: CourseId) -> Result<Option<Certificate>> {
        self.certificates.get_by_pair(user, course).await
    }
}
