use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use validator::Validate;

use crate::error::AppError;

/// upokt per POKT
pub const UPOKT_PER_POKT: i64 = 1_000_000;

const ADDRESS_PREFIX: &str = "pokt1";
const ADDRESS_BODY_LEN: usize = 38;
const MAX_SERVICE_ID_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Validation error: {0}")]
    InvalidInput(String),
}

impl From<ValidationError> for AppError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::InvalidInput(msg) => AppError::InvalidInput(msg),
        }
    }
}

/// Run `validator` rules on a request body and flatten the field errors.
pub fn validate_body<T: Validate>(value: &T) -> Result<(), ValidationError> {
    value.validate().map_err(|e| {
        let errors = e
            .field_errors()
            .into_iter()
            .map(|(field, errors)| {
                let error_messages: Vec<String> = errors
                    .iter()
                    .map(|e| e.message.as_ref().map(|s| s.to_string()).unwrap_or_default())
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<String>>()
            .join("; ");

        ValidationError::InvalidInput(format!("Validation failed: {}", errors))
    })
}

/// Bech32 account address: `pokt1` + 38 lowercase alphanumerics
pub fn validate_address(address: &str) -> Result<(), ValidationError> {
    let valid = address
        .strip_prefix(ADDRESS_PREFIX)
        .map(|body| {
            body.len() == ADDRESS_BODY_LEN
                && body
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        })
        .unwrap_or(false);

    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidInput(
            "invalid address format: must match pokt1 followed by 38 lowercase alphanumeric characters"
                .to_string(),
        ))
    }
}

/// Service ids end up inside a generated YAML file, keep them boring.
pub fn validate_service_id(id: &str) -> Result<(), ValidationError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_SERVICE_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidInput(
            "invalid service ID: must be 1-64 alphanumeric, dash, or underscore characters"
                .to_string(),
        ))
    }
}

/// Convert a POKT amount to upokt, truncating below one upokt.
pub fn pokt_to_upokt(pokt: Decimal) -> Result<i64, ValidationError> {
    if pokt <= Decimal::ZERO {
        return Err(ValidationError::InvalidInput(
            "amount must be positive".to_string(),
        ));
    }

    let upokt = pokt
        .checked_mul(Decimal::from(UPOKT_PER_POKT))
        .map(|v| v.trunc())
        .and_then(|v| v.to_i64())
        .ok_or_else(|| ValidationError::InvalidInput("amount too large".to_string()))?;

    if upokt <= 0 {
        return Err(ValidationError::InvalidInput(
            "amount must be at least 1 upokt".to_string(),
        ));
    }
    Ok(upokt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_address() {
        assert!(validate_address("pokt1qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqq").is_ok());
        assert!(validate_address("pokt1a2b3c4d5e6f7g8h9j0k1l2m3n4p5q6r7s8t9u0").is_ok());

        assert!(validate_address("").is_err());
        assert!(validate_address("pokt1short").is_err());
        assert!(validate_address("cosmos1qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqq").is_err());
        assert!(validate_address("pokt1QQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQ").is_err());
        assert!(validate_address("pokt1qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqq;").is_err());
    }

    #[test]
    fn test_validate_service_id() {
        assert!(validate_service_id("anvil").is_ok());
        assert!(validate_service_id("eth_mainnet-1").is_ok());

        assert!(validate_service_id("").is_err());
        assert!(validate_service_id("anvil\nstake_amount: 1upokt").is_err());
        assert!(validate_service_id(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validation_error_is_bad_request() {
        use axum::{http::StatusCode, response::IntoResponse};

        let error: AppError = validate_service_id("").unwrap_err().into();
        assert!(matches!(error, AppError::InvalidInput(_)));
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_pokt_to_upokt() {
        assert_eq!(pokt_to_upokt(dec!(1)).unwrap(), 1_000_000);
        assert_eq!(pokt_to_upokt(dec!(4.5)).unwrap(), 4_500_000);
        assert_eq!(pokt_to_upokt(dec!(0.0000019)).unwrap(), 1);

        assert!(pokt_to_upokt(dec!(0)).is_err());
        assert!(pokt_to_upokt(dec!(-3)).is_err());
        assert!(pokt_to_upokt(dec!(0.0000001)).is_err());
        assert!(pokt_to_upokt(dec!(10000000000000000)).is_err());
    }
}
