//! Explicit request validation.
//!
//! Replaces transport-framework form binding with plain functions that
//! return a structured list of field-level error codes. The lifecycle
//! engine runs these before touching the ledger; web layers can also call
//! them directly to render errors next to their fields.

use crate::types::{BuyerDetails, Money, TicketCategory, TicketRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of email and full-name fields
pub const MAX_CONTACT_FIELD_LEN: usize = 255;
/// Maximum length of the billing address field
pub const MAX_BILLING_ADDRESS_LEN: usize = 2048;

/// Stable validation error codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationCode {
    /// No line requested a positive quantity
    SelectAtLeastOne,
    /// Total requested quantity exceeds the per-reservation maximum
    OverMaximum,
    /// Referenced category is not published
    UnknownCategory,
    /// Category's sale window is not open
    CategoryNotOnSale,
    /// Category is invitation-only
    AccessRestricted,
    /// Email is empty
    EmailMissing,
    /// Email does not look like an address
    NotAnEmail,
    /// Full name is empty
    FullNameMissing,
    /// Field exceeds its maximum length
    FieldTooLong,
    /// Paid reservation submitted without a card token
    MissingCardToken,
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::SelectAtLeastOne => "select_at_least_one",
            Self::OverMaximum => "over_maximum",
            Self::UnknownCategory => "unknown_category",
            Self::CategoryNotOnSale => "category_not_on_sale",
            Self::AccessRestricted => "access_restricted",
            Self::EmailMissing => "email_missing",
            Self::NotAnEmail => "not_an_email",
            Self::FullNameMissing => "fullname_missing",
            Self::FieldTooLong => "field_too_long",
            Self::MissingCardToken => "missing_card_token",
        };
        write!(f, "{code}")
    }
}

/// One field-level validation failure
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field the error applies to ("reservation" for whole-request errors)
    pub field: String,
    /// Stable error code
    pub code: ValidationCode,
}

impl FieldError {
    /// Creates a new `FieldError`
    #[must_use]
    pub fn new(field: impl Into<String>, code: ValidationCode) -> Self {
        Self {
            field: field.into(),
            code,
        }
    }
}

/// Validates a reservation request against the per-reservation maximum and
/// each category's saleability at `now`.
///
/// `lookup` resolves a category id to its published definition; requests
/// for unknown categories are reported per line. Lines with zero quantity
/// are ignored, matching how empty form rows are dropped upstream.
#[must_use]
pub fn validate_reservation_request(
    requests: &[TicketRequest],
    max_tickets: u32,
    now: DateTime<Utc>,
    lookup: impl Fn(&crate::types::CategoryId) -> Option<TicketCategory>,
) -> Vec<FieldError> {
    let mut errors = Vec::new();

    let selected: Vec<&TicketRequest> = requests.iter().filter(|r| r.quantity > 0).collect();
    let total: u32 = selected
        .iter()
        .fold(0u32, |acc, r| acc.saturating_add(r.quantity));

    if total == 0 {
        errors.push(FieldError::new("reservation", ValidationCode::SelectAtLeastOne));
    }
    if total > max_tickets {
        errors.push(FieldError::new("reservation", ValidationCode::OverMaximum));
    }

    for (idx, request) in selected.iter().enumerate() {
        let field = format!("reservation[{idx}]");
        match lookup(&request.category_id) {
            None => errors.push(FieldError::new(field, ValidationCode::UnknownCategory)),
            Some(category) => {
                if !category.sale_window.is_open(now) {
                    errors.push(FieldError::new(field.clone(), ValidationCode::CategoryNotOnSale));
                }
                if category.access_restricted {
                    errors.push(FieldError::new(field, ValidationCode::AccessRestricted));
                }
            }
        }
    }

    errors
}

/// Validates buyer contact fields
#[must_use]
pub fn validate_buyer(buyer: &BuyerDetails) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if buyer.email.trim().is_empty() {
        errors.push(FieldError::new("email", ValidationCode::EmailMissing));
    } else if !buyer.email.contains('@') {
        errors.push(FieldError::new("email", ValidationCode::NotAnEmail));
    }
    if buyer.email.len() > MAX_CONTACT_FIELD_LEN {
        errors.push(FieldError::new("email", ValidationCode::FieldTooLong));
    }

    if buyer.full_name.trim().is_empty() {
        errors.push(FieldError::new("full_name", ValidationCode::FullNameMissing));
    }
    if buyer.full_name.len() > MAX_CONTACT_FIELD_LEN {
        errors.push(FieldError::new("full_name", ValidationCode::FieldTooLong));
    }

    if buyer.billing_address.len() > MAX_BILLING_ADDRESS_LEN {
        errors.push(FieldError::new("billing_address", ValidationCode::FieldTooLong));
    }

    errors
}

/// Validates a payment submission: buyer fields plus, for paid
/// reservations, the presence of a gateway card token
#[must_use]
pub fn validate_payment_form(
    buyer: &BuyerDetails,
    reservation_cost: Money,
    card_token: Option<&str>,
) -> Vec<FieldError> {
    let mut errors = validate_buyer(buyer);

    if !reservation_cost.is_zero() && card_token.is_none_or(|t| t.trim().is_empty()) {
        errors.push(FieldError::new("card_token", ValidationCode::MissingCardToken));
    }

    errors
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Capacity, CategoryId, EventId, SaleWindow};
    use chrono::Duration;

    fn category(id: CategoryId, now: DateTime<Utc>, restricted: bool) -> TicketCategory {
        TicketCategory::new(
            id,
            EventId::new(),
            "General".to_string(),
            Capacity::new(100),
            Money::from_cents(1000),
            SaleWindow::new(now - Duration::hours(1), now + Duration::hours(1), "UTC".to_string()),
            restricted,
        )
    }

    #[test]
    fn test_empty_selection_rejected() {
        let now = Utc::now();
        let errors = validate_reservation_request(&[], 5, now, |_| None);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ValidationCode::SelectAtLeastOne);
    }

    #[test]
    fn test_zero_quantity_lines_ignored() {
        let now = Utc::now();
        let id = CategoryId::new();
        let requests = [TicketRequest::new(id, 0)];
        let errors = validate_reservation_request(&requests, 5, now, |_| None);
        // the zero line is dropped, leaving an empty selection
        assert_eq!(errors[0].code, ValidationCode::SelectAtLeastOne);
    }

    #[test]
    fn test_over_maximum_rejected() {
        let now = Utc::now();
        let id = CategoryId::new();
        let requests = [TicketRequest::new(id, 6)];
        let errors =
            validate_reservation_request(&requests, 5, now, |cid| Some(category(*cid, now, false)));
        assert!(errors.iter().any(|e| e.code == ValidationCode::OverMaximum));
    }

    #[test]
    fn test_access_restricted_category_rejected() {
        let now = Utc::now();
        let id = CategoryId::new();
        let requests = [TicketRequest::new(id, 1)];
        let errors =
            validate_reservation_request(&requests, 5, now, |cid| Some(category(*cid, now, true)));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ValidationCode::AccessRestricted);
    }

    #[test]
    fn test_sale_window_closed_rejected() {
        let now = Utc::now();
        let id = CategoryId::new();
        let requests = [TicketRequest::new(id, 1)];
        let errors = validate_reservation_request(&requests, 5, now + Duration::hours(2), |cid| {
            Some(category(*cid, now, false))
        });
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ValidationCode::CategoryNotOnSale);
    }

    #[test]
    fn test_buyer_validation() {
        let valid = BuyerDetails::new(
            "ada@example.com".to_string(),
            "Ada Lovelace".to_string(),
            "12 Crunch St".to_string(),
        );
        assert!(validate_buyer(&valid).is_empty());

        let bad_email = BuyerDetails::new(
            "not-an-email".to_string(),
            "Ada Lovelace".to_string(),
            String::new(),
        );
        let errors = validate_buyer(&bad_email);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ValidationCode::NotAnEmail);

        let blank = BuyerDetails::new(String::new(), "  ".to_string(), String::new());
        let codes: Vec<_> = validate_buyer(&blank).iter().map(|e| e.code).collect();
        assert!(codes.contains(&ValidationCode::EmailMissing));
        assert!(codes.contains(&ValidationCode::FullNameMissing));
    }

    #[test]
    fn test_card_token_required_only_for_paid_reservations() {
        let buyer = BuyerDetails::new(
            "ada@example.com".to_string(),
            "Ada Lovelace".to_string(),
            String::new(),
        );
        let paid = validate_payment_form(&buyer, Money::from_cents(1000), None);
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].code, ValidationCode::MissingCardToken);

        let free = validate_payment_form(&buyer, Money::ZERO, None);
        assert!(free.is_empty());

        let tokened = validate_payment_form(&buyer, Money::from_cents(1000), Some("tok_visa"));
        assert!(tokened.is_empty());
    }
}
