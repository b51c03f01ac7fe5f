//! Settlement entry rules for the settlement-entry state policy

use crate::types::*;

/// Debit and credit accounts of a batch's settlement entry.
///
/// Customer batches debit the bank account and credit the method's
/// outstanding receipts account. Vendor batches debit the outstanding
/// payments account and credit the bank account.
pub fn settlement_accounts(
    batch: &BatchPayment,
    journal: &BankJournal,
    method: &PaymentMethod,
) -> BatchResult<(String, String)> {
    let outstanding = method
        .outstanding_account_id
        .clone()
        .ok_or_else(|| BatchError::MissingOutstandingAccount(method.name.clone()))?;
    let bank = journal
        .default_account_id
        .clone()
        .ok_or_else(|| BatchError::MissingBankAccount(journal.name.clone()))?;

    Ok(match batch.batch_type {
        BatchType::Inbound => (bank, outstanding),
        BatchType::Outbound => (outstanding, bank),
    })
}

/// Build the request for the entry moving the batch total to the bank
pub fn settlement_request(
    batch: &BatchPayment,
    journal: &BankJournal,
    method: &PaymentMethod,
) -> BatchResult<SettlementRequest> {
    let (debit_account_id, credit_account_id) = settlement_accounts(batch, journal, method)?;

    Ok(SettlementRequest {
        journal_id: batch.journal_id.clone(),
        date: batch.date,
        reference: batch.name.clone(),
        currency_id: batch.currency_id.clone(),
        amount: batch.amount_total.clone(),
        debit_account_id,
        credit_account_id,
    })
}

/// Check that a batch may be validated against its current members
pub fn check_validation(batch: &BatchPayment, members: &[Payment]) -> BatchResult<()> {
    if members.is_empty() {
        return Err(BatchError::EmptyBatch(batch.name.clone()));
    }

    if members.iter().any(|p| !p.is_posted()) {
        return Err(BatchError::UnpostedMembers(batch.name.clone()));
    }

    Ok(())
}
