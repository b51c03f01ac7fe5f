//! Batch status and total derivation

use bigdecimal::BigDecimal;

use crate::types::*;

/// Status of a batch derived purely from its members.
///
/// No members is draft. Every member reconciled is reconciled, otherwise every
/// member posted is validated, otherwise draft.
pub fn aggregate_state(members: &[Payment]) -> BatchState {
    if members.is_empty() {
        return BatchState::Draft;
    }

    if members.iter().all(|p| p.is_reconciled) {
        BatchState::Reconciled
    } else if members.iter().all(Payment::is_posted) {
        BatchState::Validated
    } else {
        BatchState::Draft
    }
}

/// Status of a batch derived from its settlement entry.
pub fn settlement_state(entry: Option<&SettlementEntry>) -> BatchState {
    match entry {
        Some(entry) if entry.settlement_status.is_settled() => BatchState::Reconciled,
        Some(entry) if entry.state == EntryState::Posted => BatchState::Validated,
        _ => BatchState::Draft,
    }
}

/// Sum of member amounts
pub fn amount_total(members: &[Payment]) -> BigDecimal {
    members.iter().map(|p| &p.amount).sum()
}

/// Refresh the denormalized total, count and state of a batch
pub fn apply_totals(batch: &mut BatchPayment, members: &[Payment], state: BatchState) {
    batch.amount_total = amount_total(members);
    batch.payment_count = members.len();
    batch.state = state;
    batch.touch();
}
