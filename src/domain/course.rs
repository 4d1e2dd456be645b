use super::ids::{CourseId, UserId};
use crate::error::{CoreError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Learner,
    Instructor,
    Admin,
}

/// Caller identity resolved by the user directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: Role,
}

/// Read model of a course as served by the catalog collaborator.
///
/// The commerce core never mutates courses; it only reads this snapshot
/// to decide purchasability and ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub id: CourseId,
    pub title: String,
    /// List price in major currency units.
    pub price: Decimal,
    pub is_free: bool,
    pub published: bool,
    pub instructor: UserId,
}

impl CourseSummary {
    /// Price converted to the smallest currency unit, rounded half away
    /// from zero.
    pub fn amount_minor(&self) -> Result<i64> {
        let minor = (self.price * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        match minor.to_i64() {
            Some(amount) if amount > 0 => Ok(amount),
            _ => Err(CoreError::Validation(format!(
                "course price {} cannot be charged",
                self.price
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn course_priced(price: Decimal) -> CourseSummary {
        CourseSummary {
            id: CourseId::new(),
            title: "Systems Programming".into(),
            price,
            is_free: false,
            published: true,
            instructor: UserId::new(),
        }
    }

    #[test]
    fn test_amount_minor_whole_price() {
        assert_eq!(course_priced(dec!(50)).amount_minor().unwrap(), 5_000);
    }

    #[test]
    fn test_amount_minor_fractional_price() {
        assert_eq!(course_priced(dec!(49.99)).amount_minor().unwrap(), 4_999);
        assert_eq!(course_priced(dec!(49.995)).amount_minor().unwrap(), 5_000);
    }

    #[test]
    fn test_amount_minor_rejects_non_positive() {
        assert!(matches!(
            course_priced(dec!(0)).amount_minor(),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            course_priced(dec!(-5)).amount_minor(),
            Err(CoreError::Validation(_))
        ));
    }
}
