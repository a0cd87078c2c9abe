//! Per-item validation of inbound executions.
//!
//! Rules run in a fixed order and the first violation wins:
//! required fields, then length limits, then enumerated values, then
//! numeric sign constraints.

use std::fmt;

use rust_decimal::Decimal;

use super::record::NewExecution;
use super::request::ExecutionRequest;
use super::value_objects::{ExecutionStatus, TradeType};
use crate::domain::shared::Timestamp;

/// Maximum length of the status field.
pub const MAX_STATUS_LEN: usize = 20;
/// Maximum length of the trade type field.
pub const MAX_TRADE_TYPE_LEN: usize = 10;
/// Maximum length of the destination field.
pub const MAX_DESTINATION_LEN: usize = 20;
/// Maximum length of the instrument key.
pub const MAX_SECURITY_ID_LEN: usize = 24;
/// Maximum length of the external reference id.
pub const MAX_EXTERNAL_REFERENCE_LEN: usize = 64;

/// The rule a rejected item violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationRule {
    /// Field absent or blank.
    Required,
    /// Field longer than allowed.
    TooLong {
        /// Maximum accepted length.
        max: usize,
        /// Submitted length.
        actual: usize,
    },
    /// Value outside the enumerated set.
    NotAllowed {
        /// Submitted value.
        value: String,
        /// Accepted values.
        allowed: &'static [&'static str],
    },
    /// Must be strictly greater than zero.
    NotPositive,
    /// Must not be negative.
    Negative,
}

/// A rejected item: the offending field and the rule it broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Wire name of the offending field.
    pub field: &'static str,
    /// Violated rule.
    pub rule: ValidationRule,
}

impl ValidationError {
    const fn new(field: &'static str, rule: ValidationRule) -> Self {
        Self { field, rule }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = self.field;
        match &self.rule {
            ValidationRule::Required => write!(f, "{field} is required"),
            ValidationRule::TooLong { max, actual } => {
                write!(f, "{field} exceeds maximum length of {max} (got {actual})")
            }
            ValidationRule::NotAllowed { value, allowed } => {
                write!(
                    f,
                    "{field} '{value}' is not one of [{}]",
                    allowed.join(", ")
                )
            }
            ValidationRule::NotPositive => write!(f, "{field} must be greater than zero"),
            ValidationRule::Negative => write!(f, "{field} must not be negative"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Stateless validator for `ExecutionRequest`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionValidator;

impl ExecutionValidator {
    /// Create a validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validate one item and convert it into an insertable record.
    ///
    /// `received_at` is stamped on the record when validation passes.
    pub fn validate(
        &self,
        request: &ExecutionRequest,
        received_at: Timestamp,
    ) -> Result<NewExecution, ValidationError> {
        let status = required("status", request.status.as_deref())?;
        let trade_type = required("tradeType", request.trade_type.as_deref())?;
        let destination = required("destination", request.destination.as_deref())?;
        let security_id = required("securityId", request.security_id.as_deref())?;
        let quantity = request
            .quantity
            .ok_or(ValidationError::new("quantity", ValidationRule::Required))?;
        let external_reference_id = request
            .external_reference_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());

        max_len("status", status, MAX_STATUS_LEN)?;
        max_len("tradeType", trade_type, MAX_TRADE_TYPE_LEN)?;
        max_len("destination", destination, MAX_DESTINATION_LEN)?;
        max_len("securityId", security_id, MAX_SECURITY_ID_LEN)?;
        if let Some(reference) = external_reference_id {
            max_len("externalReferenceId", reference, MAX_EXTERNAL_REFERENCE_LEN)?;
        }

        let status = ExecutionStatus::parse(status).ok_or_else(|| {
            not_allowed("status", status, ExecutionStatus::ALLOWED)
        })?;
        let trade_type = TradeType::parse(trade_type)
            .ok_or_else(|| not_allowed("tradeType", trade_type, TradeType::ALLOWED))?;

        positive("quantity", quantity)?;
        if let Some(price) = request.limit_price {
            positive("limitPrice", price)?;
        }
        let version = request.version.unwrap_or(0);
        if version < 0 {
            return Err(ValidationError::new("version", ValidationRule::Negative));
        }

        Ok(NewExecution {
            status,
            trade_type,
            destination: destination.to_string(),
            security_id: security_id.to_string(),
            quantity,
            limit_price: request.limit_price,
            external_reference_id: external_reference_id.map(str::to_string),
            version,
            received_at,
        })
    }
}

fn required<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str, ValidationError> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ValidationError::new(field, ValidationRule::Required)),
    }
}

fn max_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let actual = value.chars().count();
    if actual > max {
        return Err(ValidationError::new(
            field,
            ValidationRule::TooLong { max, actual },
        ));
    }
    Ok(())
}

fn not_allowed(field: &'static str, value: &str, allowed: &'static [&'static str]) -> ValidationError {
    ValidationError::new(
        field,
        ValidationRule::NotAllowed {
            value: value.to_string(),
            allowed,
        },
    )
}

fn positive(field: &'static str, value: Decimal) -> Result<(), ValidationError> {
    if value <= Decimal::ZERO {
        return Err(ValidationError::new(field, ValidationRule::NotPositive));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    fn valid_request() -> ExecutionRequest {
        ExecutionRequest {
            status: Some("NEW".to_string()),
            trade_type: Some("BUY".to_string()),
            destination: Some("NYSE".to_string()),
            security_id: Some("AAPL".to_string()),
            quantity: Some(dec!(100)),
            limit_price: Some(dec!(187.25)),
            external_reference_id: Some("ext-1".to_string()),
            version: None,
        }
    }

    #[test]
    fn accepts_valid_request() {
        let received_at = Timestamp::now();
        let record = ExecutionValidator::new()
            .validate(&valid_request(), received_at)
            .unwrap();

        assert_eq!(record.status, ExecutionStatus::New);
        assert_eq!(record.trade_type, TradeType::Buy);
        assert_eq!(record.quantity, dec!(100));
        assert_eq!(record.version, 0);
        assert_eq!(record.received_at, received_at);
    }

    #[test]
    fn accepts_missing_limit_price() {
        let mut request = valid_request();
        request.limit_price = None;
        assert!(
            ExecutionValidator::new()
                .validate(&request, Timestamp::now())
                .is_ok()
        );
    }

    #[test]
    fn blank_external_reference_is_dropped() {
        let mut request = valid_request();
        request.external_reference_id = Some("   ".to_string());
        let record = ExecutionValidator::new()
            .validate(&request, Timestamp::now())
            .unwrap();
        assert!(record.external_reference_id.is_none());
    }

    #[test_case(|r: &mut ExecutionRequest| r.status = None, "status" ; "missing status")]
    #[test_case(|r: &mut ExecutionRequest| r.trade_type = Some(" ".into()), "tradeType" ; "blank trade type")]
    #[test_case(|r: &mut ExecutionRequest| r.destination = None, "destination" ; "missing destination")]
    #[test_case(|r: &mut ExecutionRequest| r.security_id = None, "securityId" ; "missing security")]
    #[test_case(|r: &mut ExecutionRequest| r.quantity = None, "quantity" ; "missing quantity")]
    fn rejects_missing_required_field(mutate: fn(&mut ExecutionRequest), field: &str) {
        let mut request = valid_request();
        mutate(&mut request);
        let err = ExecutionValidator::new()
            .validate(&request, Timestamp::now())
            .unwrap_err();
        assert_eq!(err.field, field);
        assert_eq!(err.rule, ValidationRule::Required);
        assert_eq!(err.to_string(), format!("{field} is required"));
    }

    #[test]
    fn rejects_overlong_destination() {
        let mut request = valid_request();
        request.destination = Some("X".repeat(MAX_DESTINATION_LEN + 1));
        let err = ExecutionValidator::new()
            .validate(&request, Timestamp::now())
            .unwrap_err();
        assert_eq!(err.field, "destination");
        assert!(matches!(err.rule, ValidationRule::TooLong { max: 20, actual: 21 }));
    }

    #[test]
    fn rejects_unknown_trade_type() {
        let mut request = valid_request();
        request.trade_type = Some("SHORT".to_string());
        let err = ExecutionValidator::new()
            .validate(&request, Timestamp::now())
            .unwrap_err();
        assert_eq!(err.field, "tradeType");
        assert_eq!(err.to_string(), "tradeType 'SHORT' is not one of [BUY, SELL]");
    }

    #[test_case(dec!(0) ; "zero")]
    #[test_case(dec!(-5) ; "negative")]
    fn rejects_non_positive_quantity(quantity: Decimal) {
        let mut request = valid_request();
        request.quantity = Some(quantity);
        let err = ExecutionValidator::new()
            .validate(&request, Timestamp::now())
            .unwrap_err();
        assert_eq!(err.to_string(), "quantity must be greater than zero");
    }

    #[test]
    fn rejects_non_positive_limit_price() {
        let mut request = valid_request();
        request.limit_price = Some(dec!(0));
        let err = ExecutionValidator::new()
            .validate(&request, Timestamp::now())
            .unwrap_err();
        assert_eq!(err.field, "limitPrice");
        assert_eq!(err.rule, ValidationRule::NotPositive);
    }

    #[test]
    fn rejects_negative_version() {
        let mut request = valid_request();
        request.version = Some(-1);
        let err = ExecutionValidator::new()
            .validate(&request, Timestamp::now())
            .unwrap_err();
        assert_eq!(err.field, "version");
    }

    #[test]
    fn required_fields_are_checked_before_lengths() {
        let mut request = valid_request();
        request.status = Some("S".repeat(MAX_STATUS_LEN + 5));
        request.quantity = None;
        let err = ExecutionValidator::new()
            .validate(&request, Timestamp::now())
            .unwrap_err();
        assert_eq!(err.field, "quantity");
    }

    #[test]
    fn lengths_are_checked_before_enum_membership() {
        let mut request = valid_request();
        request.status = Some("S".repeat(MAX_STATUS_LEN + 5));
        let err = ExecutionValidator::new()
            .validate(&request, Timestamp::now())
            .unwrap_err();
        assert!(matches!(err.rule, ValidationRule::TooLong { .. }));
    }

    #[test]
    fn enum_membership_is_checked_before_signs() {
        let mut request = valid_request();
        request.status = Some("DONE".to_string());
        request.quantity = Some(dec!(-1));
        let err = ExecutionValidator::new()
            .validate(&request, Timestamp::now())
            .unwrap_err();
        assert_eq!(err.field, "status");
    }
}
