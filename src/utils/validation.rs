//! Validation utilities

use std::collections::HashSet;
use std::hash::Hash;

use crate::types::*;

/// Check that every member agrees with the batch and with each other.
///
/// Checks currency, direction, journal and payment method in that order and
/// reports the first mismatch. An empty member set is always valid.
pub fn check_membership(batch: &BatchPayment, members: &[Payment]) -> BatchResult<()> {
    if members.is_empty() {
        return Ok(());
    }

    if !single_value(members, |p| p.currency_id.as_deref(), Some(batch.currency_id.as_str())) {
        return Err(BatchError::CurrencyMismatch);
    }

    if !single_value(members, |p| p.direction, batch.batch_type.direction()) {
        return Err(BatchError::DirectionMismatch);
    }

    if !single_value(members, |p| p.journal_id.as_deref(), Some(batch.journal_id.as_str())) {
        return Err(BatchError::JournalMismatch);
    }

    if !single_value(
        members,
        |p| p.payment_method_id.as_deref(),
        Some(batch.payment_method_id.as_str()),
    ) {
        return Err(BatchError::PaymentMethodMismatch);
    }

    Ok(())
}

/// True when all members map to exactly `expected`
fn single_value<'a, T, F>(members: &'a [Payment], field: F, expected: T) -> bool
where
    T: Eq + Hash,
    F: Fn(&'a Payment) -> T,
{
    let values: HashSet<T> = members.iter().map(field).collect();
    values.len() == 1 && values.contains(&expected)
}

/// Check that a batch names a journal, payment method and currency
pub fn validate_key(key: &BatchKey) -> BatchResult<()> {
    let fields = [
        ("journal", &key.journal_id),
        ("payment method", &key.payment_method_id),
        ("currency", &key.currency_id),
    ];
    match fields.iter().find(|(_, value)| value.trim().is_empty()) {
        Some((field, _)) => Err(BatchError::BlankScope(*field)),
        None => Ok(()),
    }
}

/// Validate an explicitly supplied batch reference
pub fn validate_reference(name: &str) -> BatchResult<()> {
    if name.trim().is_empty() {
        return Err(BatchError::InvalidReference(
            "Batch reference cannot be empty".to_string(),
        ));
    }

    if name.len() > 64 {
        return Err(BatchError::InvalidReference(
            "Batch reference cannot exceed 64 characters".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    fn batch() -> BatchPayment {
        BatchPayment::new(
            "BATCH/OUT/0001".to_string(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            "acme".to_string(),
            BatchType::Outbound,
            BatchKey::new("bank".to_string(), "manual".to_string(), "EUR".to_string()),
        )
    }

    fn vendor_payment(amount: i64) -> Payment {
        Payment::new(
            "acme".to_string(),
            PaymentDirection::Outbound,
            BigDecimal::from(amount),
        )
        .with_scope("bank", "manual", "EUR")
        .posted()
    }

    #[test]
    fn test_empty_members_are_valid() {
        assert!(check_membership(&batch(), &[]).is_ok());
    }

    #[test]
    fn test_matching_members_are_valid() {
        let members = vec![vendor_payment(10), vendor_payment(20)];
        assert!(check_membership(&batch(), &members).is_ok());
    }

    #[test]
    fn test_currency_mismatch() {
        let members = vec![
            vendor_payment(10),
            vendor_payment(20).with_scope("bank", "manual", "USD"),
        ];
        assert!(matches!(
            check_membership(&batch(), &members),
            Err(BatchError::CurrencyMismatch)
        ));

        // Members agree with each other but not with the batch
        let members = vec![vendor_payment(10).with_scope("bank", "manual", "USD")];
        assert!(matches!(
            check_membership(&batch(), &members),
            Err(BatchError::CurrencyMismatch)
        ));
    }

    #[test]
    fn test_direction_mismatch() {
        let mut customer = vendor_payment(10);
        customer.direction = PaymentDirection::Inbound;
        assert!(matches!(
            check_membership(&batch(), &[customer]),
            Err(BatchError::DirectionMismatch)
        ));
    }

    #[test]
    fn test_journal_and_method_mismatch() {
        let members = vec![vendor_payment(10).with_scope("cash", "manual", "EUR")];
        assert!(matches!(
            check_membership(&batch(), &members),
            Err(BatchError::JournalMismatch)
        ));

        let members = vec![
            vendor_payment(10),
            vendor_payment(10).with_scope("bank", "sepa_ct", "EUR"),
        ];
        assert!(matches!(
            check_membership(&batch(), &members),
            Err(BatchError::PaymentMethodMismatch)
        ));
    }

    #[test]
    fn test_validate_key() {
        let key = BatchKey::new("bank".to_string(), "manual".to_string(), "EUR".to_string());
        assert!(validate_key(&key).is_ok());

        let key = BatchKey::new("bank".to_string(), " ".to_string(), String::new());
        assert!(matches!(
            validate_key(&key),
            Err(BatchError::BlankScope("payment method"))
        ));
    }

    #[test]
    fn test_validate_reference() {
        assert!(validate_reference("BATCH/OUT/0007").is_ok());
        assert!(validate_reference("  ").is_err());
        assert!(validate_reference(&"X".repeat(65)).is_err());
    }
}
