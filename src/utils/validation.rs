//! Validation utilities

use crate::money::Money;
use crate::types::{ReconcileError, ReconcileResult};

/// Validate that a monetary amount is strictly positive.
pub fn validate_positive_amount(amount: Money) -> ReconcileResult<()> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(ReconcileError::Validation(
            "amount must be positive".to_string(),
        ))
    }
}

/// Validate that two currency codes agree.
pub fn validate_currency(expected: &str, actual: &str) -> ReconcileResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ReconcileError::CurrencyMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

/// Validate that an identifier is non-empty and reasonably sized.
pub fn validate_id(id: &str, what: &str) -> ReconcileResult<()> {
    if id.trim().is_empty() {
        return Err(ReconcileError::Validation(format!(
            "{what} ID cannot be empty"
        )));
    }
    if id.len() > 64 {
        return Err(ReconcileError::Validation(format!(
            "{what} ID cannot exceed 64 characters"
        )));
    }
    Ok(())
}
