//! Batch payment workflow example

use batch_payment_core::utils::{MemoryLedger, MemorySequence, MemoryStorage};
use batch_payment_core::{
    BankJournal, BatchConfig, BatchPayments, Payment, PaymentDirection, PaymentMethod,
    SettlementStatus, StatePolicy,
};
use bigdecimal::BigDecimal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Batch Payment Core - Workflow Example\n");

    let storage = MemoryStorage::new();
    storage.insert_journal(BankJournal {
        id: "bank".to_string(),
        name: "Bank".to_string(),
        default_account_id: Some("101401".to_string()),
    })?;
    storage.insert_payment_method(PaymentMethod {
        id: "manual".to_string(),
        name: "Manual".to_string(),
        outstanding_account_id: Some("101402".to_string()),
    })?;

    // 1. Member aggregation: status follows the payments
    println!("Grouping vendor payments (member aggregation)...");
    let mut service = BatchPayments::new(
        storage.clone(),
        Box::new(MemorySequence::new()),
        "acme".to_string(),
        BatchConfig::default(),
    );

    let mut selection = Vec::new();
    for (currency, amount) in [("EUR", 100), ("EUR", 50), ("USD", 75)] {
        let payment = Payment::new(
            "acme".to_string(),
            PaymentDirection::Outbound,
            BigDecimal::from(amount),
        )
        .with_scope("bank", "manual", currency)
        .posted();
        storage.insert_payment(payment.clone())?;
        selection.push(payment.id);
    }

    let created = service.create_from_selection(&selection).await?;
    for batch in &created.batches {
        println!(
            "  Created {} [{}] {} {} ({} payments)",
            batch.name, batch.state, batch.amount_total, batch.currency_id, batch.payment_count
        );
    }
    println!("  Opening: {}\n", created.action.title);

    for payment_id in &selection[..2] {
        if let Some(batch) = service.set_payment_reconciled(*payment_id, true).await? {
            println!("  Reconciled payment, {} is now {}", batch.name, batch.state);
        }
    }
    println!();

    // 2. Settlement entry: status follows the booked entry
    println!("Validating a customer batch (settlement entry)...");
    let ledger = MemoryLedger::new();
    let mut settlement_service = BatchPayments::new(
        storage.clone(),
        Box::new(MemorySequence::new()),
        "acme".to_string(),
        BatchConfig::default().with_policy(StatePolicy::SettlementEntry),
    )
    .with_settlement_ledger(Box::new(ledger.clone()));

    let receipt = Payment::new(
        "acme".to_string(),
        PaymentDirection::Inbound,
        BigDecimal::from(240),
    )
    .with_scope("bank", "manual", "EUR")
    .with_reference("INV/2024/0042")
    .posted();
    storage.insert_payment(receipt.clone())?;

    let created = settlement_service
        .create_from_selection(&[receipt.id])
        .await?;
    let batch_id = created.batches[0].id;
    println!("  Created {} [{}]", created.batches[0].name, created.batches[0].state);

    let batch = settlement_service.validate_batch(batch_id).await?;
    println!("  Validated {} [{}]", batch.name, batch.state);

    if let Some(entry_id) = batch.settlement_entry_id {
        ledger.settle(entry_id, SettlementStatus::Paid)?;
    }
    let batch = settlement_service.refresh_batch(batch_id).await?;
    println!("  Bank matched the entry, {} is now {}\n", batch.name, batch.state);

    let report = settlement_service.batch_report(batch_id).await?;
    println!("Report for {} ({}):", report.name, report.batch_type.label());
    for line in &report.lines {
        println!(
            "  {} {}",
            line.reference.as_deref().unwrap_or("-"),
            line.amount
        );
    }
    println!("  Total: {} {}", report.amount_total, report.currency_id);

    Ok(())
}
