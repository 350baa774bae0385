//! Status lifecycle shared by advances and claims:
//! `pending → approved | rejected`, then `approved → paid`.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::model::attendance::round2;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[derive(Display, EnumString, AsRefStr, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
}

impl RequestStatus {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        raw.parse().map_err(|_| {
            tracing::error!(status = raw, "Unknown request status stored");
            ApiError::Internal
        })
    }

    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Approved, Paid)
        )
    }

    pub fn ensure_transition(self, next: RequestStatus) -> Result<(), ApiError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(ApiError::conflict(format!(
                "Cannot move a {self} request to {next}"
            )))
        }
    }

    /// Edits and deletes are only allowed before any decision was made.
    pub fn ensure_editable(self) -> Result<(), ApiError> {
        if self == RequestStatus::Pending {
            Ok(())
        } else {
            Err(ApiError::conflict(format!(
                "Request is {self} and can no longer be changed"
            )))
        }
    }
}

/// Result of applying a payment to an approved request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaymentOutcome {
    pub paid: f64,
    pub remaining: f64,
    pub status: RequestStatus,
}

/// Applies `payment` (or the full balance when `None`) to an approved request.
pub fn apply_payment(
    status: RequestStatus,
    remaining: f64,
    payment: Option<f64>,
) -> Result<PaymentOutcome, ApiError> {
    if status != RequestStatus::Approved {
        return Err(ApiError::conflict(format!(
            "Only approved requests can be paid, this one is {status}"
        )));
    }

    let remaining = round2(remaining);
    let paid = round2(payment.unwrap_or(remaining));

    if paid <= 0.0 {
        return Err(ApiError::invalid("amount", "amount must be greater than zero"));
    }
    if paid > remaining {
        return Err(ApiError::invalid(
            "amount",
            format!("amount exceeds the remaining balance of {remaining:.2}"),
        ));
    }

    let left = round2(remaining - paid);
    let status = if left <= 0.0 {
        RequestStatus::Paid
    } else {
        RequestStatus::Approved
    };

    Ok(PaymentOutcome {
        paid,
        remaining: left.max(0.0),
        status,
    })
}

/// Positive amount rounded to cents.
pub fn normalize_amount(amount: f64) -> Result<f64, ApiError> {
    let rounded = round2(amount);
    if !amount.is_finite() || rounded <= 0.0 {
        return Err(ApiError::invalid("amount", "amount must be greater than zero"));
    }
    Ok(rounded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;
    use RequestStatus::*;

    #[test]
    fn only_forward_transitions_are_legal() {
        let legal = [(Pending, Approved), (Pending, Rejected), (Approved, Paid)];
        for from in RequestStatus::iter() {
            for to in RequestStatus::iter() {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn illegal_transition_is_a_conflict() {
        let err = Rejected.ensure_transition(Paid).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert!(Pending.ensure_transition(Approved).is_ok());
    }

    #[test]
    fn only_pending_is_editable() {
        assert!(Pending.ensure_editable().is_ok());
        for status in [Approved, Rejected, Paid] {
            assert!(status.ensure_editable().is_err());
        }
    }

    #[test]
    fn full_payment_settles_request() {
        let outcome = apply_payment(Approved, 150.0, None).unwrap();
        assert_eq!(
            outcome,
            PaymentOutcome { paid: 150.0, remaining: 0.0, status: Paid }
        );
    }

    #[test]
    fn partial_payment_keeps_request_approved() {
        let outcome = apply_payment(Approved, 100.0, Some(40.25)).unwrap();
        assert_eq!(outcome.remaining, 59.75);
        assert_eq!(outcome.status, Approved);

        let outcome = apply_payment(Approved, outcome.remaining, Some(59.75)).unwrap();
        assert_eq!(outcome.remaining, 0.0);
        assert_eq!(outcome.status, Paid);
    }

    #[test]
    fn overpayment_is_rejected() {
        let err = apply_payment(Approved, 10.0, Some(10.01)).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn non_positive_payment_is_rejected() {
        assert!(apply_payment(Approved, 10.0, Some(0.0)).is_err());
        assert!(apply_payment(Approved, 10.0, Some(-5.0)).is_err());
    }

    #[test]
    fn payment_requires_approval() {
        for status in [Pending, Rejected, Paid] {
            let err = apply_payment(status, 10.0, None).unwrap_err();
            assert!(matches!(err, ApiError::Conflict(_)));
        }
    }

    #[test]
    fn amounts_are_rounded_and_positive() {
        assert_eq!(normalize_amount(12.346).unwrap(), 12.35);
        assert_eq!(normalize_amount(99.5).unwrap(), 99.5);
        assert!(normalize_amount(0.001).is_err());
        assert!(normalize_amount(-1.0).is_err());
        assert!(normalize_amount(f64::NAN).is_err());
    }

    #[test]
    fn stored_status_parses() {
        assert_eq!(RequestStatus::parse("paid").unwrap(), Paid);
        assert!(RequestStatus::parse("archived").is_err());
    }
}
