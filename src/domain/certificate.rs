use super::ids::{CourseId, UserId};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Proof of course completion.
///
/// Unique per (user, course). The `certificate_id` is the only value the
/// public verification endpoint accepts, so it carries 128 bits of
/// randomness; the store's unique index catches the negligible collision
/// case and the issuer retries with a fresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub user: UserId,
    pub course: CourseId,
    pub certificate_id: String,
    pub issued_at: DateTime<Utc>,
}

impl Certificate {
    pub fn new(user: UserId, course: CourseId) -> Self {
        Self {
            user,
            course,
            certificate_id: generate_token(),
            issued_at: Utc::now(),
        }
    }
}

/// 128-bit random token, hex-encoded (32 characters).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
