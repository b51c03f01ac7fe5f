//! Selection checks and partitioning for batch creation

use crate::types::*;

/// Check that a payment selection can be turned into batches.
///
/// Returns the common batch type. Rules are checked in a fixed order and the
/// first violated rule is reported with the offending payment ids.
pub fn check_selection(payments: &[Payment], company_id: &str) -> BatchResult<BatchType> {
    if payments.is_empty() {
        return Err(BatchError::EmptySelection);
    }

    let unposted = ids_where(payments, |p| !p.is_posted());
    if !unposted.is_empty() {
        return Err(BatchError::PaymentNotPosted {
            payment_ids: unposted,
        });
    }

    let batched = ids_where(payments, |p| p.batch_id.is_some());
    if !batched.is_empty() {
        return Err(BatchError::AlreadyInBatch {
            payment_ids: batched,
        });
    }

    let internal = ids_where(payments, |p| p.direction == PaymentDirection::Internal);
    if !internal.is_empty() {
        return Err(BatchError::InternalTransfer {
            payment_ids: internal,
        });
    }

    let direction = payments[0].direction;
    if payments.iter().any(|p| p.direction != direction) {
        return Err(BatchError::MixedDirections);
    }

    let foreign = ids_where(payments, |p| p.company_id != company_id);
    if !foreign.is_empty() {
        return Err(BatchError::ForeignCompany {
            payment_ids: foreign,
        });
    }

    let unscoped = ids_where(payments, |p| p.batch_key().is_none());
    if !unscoped.is_empty() {
        return Err(BatchError::MissingScope {
            payment_ids: unscoped,
        });
    }

    // Internal transfers were rejected above
    direction
        .batch_type()
        .ok_or_else(|| BatchError::InternalTransfer {
            payment_ids: payments.iter().map(|p| p.id).collect(),
        })
}

/// Partition payments by journal, method and currency, in first-seen key order.
///
/// Payments without a complete key are skipped; run [`check_selection`] first.
pub fn partition(payments: &[Payment]) -> Vec<(BatchKey, Vec<&Payment>)> {
    let mut groups: Vec<(BatchKey, Vec<&Payment>)> = Vec::new();

    for payment in payments {
        let Some(key) = payment.batch_key() else {
            continue;
        };
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(payment),
            None => groups.push((key, vec![payment])),
        }
    }

    groups
}

fn ids_where(payments: &[Payment], predicate: impl Fn(&Payment) -> bool) -> Vec<uuid::Uuid> {
    payments
        .iter()
        .filter(|&p| predicate(p))
        .map(|p| p.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    fn vendor_payment(journal: &str, method: &str, currency: &str) -> Payment {
        Payment::new(
            "acme".to_string(),
            PaymentDirection::Outbound,
            BigDecimal::from(100),
        )
        .with_scope(journal, method, currency)
        .posted()
    }

    #[test]
    fn test_empty_selection() {
        assert!(matches!(
            check_selection(&[], "acme"),
            Err(BatchError::EmptySelection)
        ));
    }

    #[test]
    fn test_unposted_payment_reported() {
        let mut draft = vendor_payment("bank", "manual", "EUR");
        draft.state = PaymentState::Draft;
        let draft_id = draft.id;
        let selection = vec![vendor_payment("bank", "manual", "EUR"), draft];

        match check_selection(&selection, "acme") {
            Err(BatchError::PaymentNotPosted { payment_ids }) => {
                assert_eq!(payment_ids, vec![draft_id])
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_rule_order_posting_before_membership() {
        let mut draft = vendor_payment("bank", "manual", "EUR");
        draft.state = PaymentState::Draft;
        let mut batched = vendor_payment("bank", "manual", "EUR");
        batched.batch_id = Some(uuid::Uuid::new_v4());

        assert!(matches!(
            check_selection(&[batched.clone(), draft], "acme"),
            Err(BatchError::PaymentNotPosted { .. })
        ));
        assert!(matches!(
            check_selection(&[batched], "acme"),
            Err(BatchError::AlreadyInBatch { .. })
        ));
    }

    #[test]
    fn test_internal_transfer_rejected() {
        let mut transfer = vendor_payment("bank", "manual", "EUR");
        transfer.direction = PaymentDirection::Internal;
        assert!(matches!(
            check_selection(&[transfer], "acme"),
            Err(BatchError::InternalTransfer { .. })
        ));
    }

    #[test]
    fn test_mixed_directions_rejected() {
        let mut customer = vendor_payment("bank", "manual", "EUR");
        customer.direction = PaymentDirection::Inbound;
        assert!(matches!(
            check_selection(&[vendor_payment("bank", "manual", "EUR"), customer], "acme"),
            Err(BatchError::MixedDirections)
        ));
    }

    #[test]
    fn test_foreign_company_rejected() {
        let mut other = vendor_payment("bank", "manual", "EUR");
        other.company_id = "globex".to_string();
        assert!(matches!(
            check_selection(&[other], "acme"),
            Err(BatchError::ForeignCompany { .. })
        ));
    }

    #[test]
    fn test_missing_scope_rejected() {
        let mut unscoped = vendor_payment("bank", "manual", "EUR");
        unscoped.payment_method_id = None;
        assert!(matches!(
            check_selection(&[unscoped], "acme"),
            Err(BatchError::MissingScope { .. })
        ));
    }

    #[test]
    fn test_valid_selection_returns_type() {
        let selection = vec![
            vendor_payment("bank", "manual", "EUR"),
            vendor_payment("cash", "manual", "USD"),
        ];
        assert_eq!(
            check_selection(&selection, "acme").unwrap(),
            BatchType::Outbound
        );
    }

    #[test]
    fn test_partition_keeps_first_seen_order() {
        let selection = vec![
            vendor_payment("bank", "manual", "EUR"),
            vendor_payment("bank", "sepa_ct", "EUR"),
            vendor_payment("bank", "manual", "EUR"),
            vendor_payment("cash", "manual", "EUR"),
            vendor_payment("bank", "sepa_ct", "EUR"),
        ];

        let groups = partition(&selection);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].0.payment_method_id, "manual");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[0].1[0].id, selection[0].id);
        assert_eq!(groups[0].1[1].id, selection[2].id);
        assert_eq!(groups[1].0.payment_method_id, "sepa_ct");
        assert_eq!(groups[1].1.len(), 2);
        assert_eq!(groups[2].0.journal_id, "cash");
        assert_eq!(groups[2].1.len(), 1);
    }
}
