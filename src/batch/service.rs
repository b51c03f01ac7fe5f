//! Main batch payment service that coordinates grouping, membership and settlement

use uuid::Uuid;

use crate::batch::{grouping, settlement, state, BatchManager};
use crate::config::{BatchConfig, StatePolicy};
use crate::traits::*;
use crate::types::*;

/// Batch payment service for one company
pub struct BatchPayments<S: PaymentStore> {
    pub(crate) manager: BatchManager<S>,
}

impl<S: PaymentStore> BatchPayments<S> {
    /// Create a new service with the given storage and numbering backends
    pub fn new(
        storage: S,
        sequence: Box<dyn SequenceGenerator>,
        company_id: String,
        config: BatchConfig,
    ) -> Self {
        Self {
            manager: BatchManager::new(storage, sequence, company_id, config),
        }
    }

    /// Create a new service with a custom membership validator
    pub fn with_validator(mut self, validator: Box<dyn MembershipValidator>) -> Self {
        self.manager = self.manager.with_validator(validator);
        self
    }

    /// Attach the ledger used by the settlement-entry policy
    pub fn with_settlement_ledger(mut self, ledger: Box<dyn SettlementLedger>) -> Self {
        self.manager = self.manager.with_settlement_ledger(ledger);
        self
    }

    pub fn config(&self) -> &BatchConfig {
        self.manager.config()
    }

    /// Group a selection of posted payments into one batch per
    /// (journal, payment method, currency).
    ///
    /// Either every selected payment ends up in a new batch or nothing is
    /// written. A single batch opens in detail view, several open as a list.
    pub async fn create_from_selection(
        &mut self,
        payment_ids: &[Uuid],
    ) -> BatchResult<BatchCreation> {
        let payments = self.manager.load_payments(payment_ids).await?;
        let batch_type = match grouping::check_selection(&payments, &self.manager.company_id) {
            Ok(batch_type) => batch_type,
            Err(err) => {
                tracing::warn!("Rejected payment selection: {}", err);
                return Err(err);
            }
        };

        let mut changes = self.manager.change_set();
        let mut batches = Vec::new();
        for (key, group) in grouping::partition(&payments) {
            let batch = self
                .manager
                .new_batch(NewBatch {
                    name: None,
                    date: None,
                    batch_type,
                    key,
                })
                .await?;

            let members: Vec<Payment> = group
                .into_iter()
                .cloned()
                .map(|mut p| {
                    p.batch_id = Some(batch.id);
                    p
                })
                .collect();
            self.manager.validator.validate_members(&batch, &members)?;

            let batch = self.manager.recompute(batch, &members).await?;
            changes
                .attach
                .extend(members.iter().map(|p| (p.id, batch.id)));
            changes.upsert_batches.push(batch.clone());
            batches.push(batch);
        }

        self.manager.storage.commit(changes).await?;

        tracing::info!(
            "Created {} {} batch(es) from {} payments",
            batches.len(),
            batch_type.label(),
            payments.len()
        );

        let action = match batches.as_slice() {
            [single] => ViewAction::batch_detail(single.id),
            _ => ViewAction::batch_list(batches.iter().map(|b| b.id).collect()),
        };
        Ok(BatchCreation { batches, action })
    }

    fn require_settlement_policy(&self, action: &'static str) -> BatchResult<()> {
        match self.manager.config.state_policy {
            StatePolicy::SettlementEntry => Ok(()),
            policy => Err(BatchError::UnsupportedAction {
                action,
                policy: policy.as_str(),
            }),
        }
    }

    /// Book and post the settlement entry of a draft batch
    pub async fn validate_batch(&mut self, batch_id: Uuid) -> BatchResult<BatchPayment> {
        self.require_settlement_policy("validate")?;

        let mut batch = self.manager.get_batch_required(batch_id).await?;
        if !batch.is_draft() {
            return Err(BatchError::BatchNotDraft {
                name: batch.name,
                state: batch.state,
            });
        }
        let members = self.manager.members(batch_id).await?;
        settlement::check_validation(&batch, &members)?;
        batch.amount_total = state::amount_total(&members);

        let storage = &self.manager.storage;
        let journal = storage
            .get_journal(&batch.journal_id)
            .await?
            .ok_or_else(|| BatchError::JournalNotFound(batch.journal_id.clone()))?;
        let method = storage
            .get_payment_method(&batch.payment_method_id)
            .await?
            .ok_or_else(|| BatchError::PaymentMethodNotFound(batch.payment_method_id.clone()))?;
        let request = settlement::settlement_request(&batch, &journal, &method)?;

        let ledger = self.manager.ledger_mut()?;
        // A draft batch may still carry a draft entry from an earlier attempt
        if let Some(stale) = batch.settlement_entry_id.take() {
            match ledger.delete_entry(stale).await {
                Ok(()) | Err(BatchError::SettlementEntryNotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        let entry = ledger.create_entry(request).await?;
        if let Err(err) = ledger.post_entry(entry.id).await {
            ledger.delete_entry(entry.id).await?;
            return Err(err);
        }
        batch.settlement_entry_id = Some(entry.id);

        let batch = match self.store_batch(batch, &members).await {
            Ok(batch) => batch,
            Err(err) => {
                // No stored batch links the entry
                let ledger = self.manager.ledger_mut()?;
                ledger.unpost_entry(entry.id).await?;
                ledger.delete_entry(entry.id).await?;
                return Err(err);
            }
        };

        tracing::info!(
            "Validated batch {} for {} {}",
            batch.name,
            batch.amount_total,
            batch.currency_id
        );
        Ok(batch)
    }

    /// Recompute a batch against its members and store it
    async fn store_batch(
        &mut self,
        batch: BatchPayment,
        members: &[Payment],
    ) -> BatchResult<BatchPayment> {
        let batch = self.manager.recompute(batch, members).await?;
        self.manager
            .storage
            .commit(ChangeSet {
                upsert_batches: vec![batch.clone()],
                ..self.manager.change_set()
            })
            .await?;
        Ok(batch)
    }

    /// Unpost and remove a batch's settlement entry, returning it to draft
    pub async fn reset_to_draft(&mut self, batch_id: Uuid) -> BatchResult<BatchPayment> {
        self.require_settlement_policy("reset to draft")?;

        let mut batch = self.manager.get_batch_required(batch_id).await?;
        if let Some(entry_id) = batch.settlement_entry_id {
            let ledger = self.manager.ledger_mut()?;
            if let Some(entry) = ledger.get_entry(entry_id).await? {
                if entry.state == EntryState::Posted {
                    ledger.unpost_entry(entry_id).await?;
                }
                ledger.delete_entry(entry_id).await?;
            }
        }
        batch.settlement_entry_id = None;

        let members = self.manager.members(batch_id).await?;
        let batch = self.store_batch(batch, &members).await?;

        tracing::info!("Reset batch {} to draft", batch.name);
        Ok(batch)
    }

    /// The list view of a batch's payments
    pub async fn view_payments(&self, batch_id: Uuid) -> BatchResult<ViewAction> {
        self.manager.get_batch_required(batch_id).await?;
        let members = self.manager.members(batch_id).await?;
        Ok(ViewAction::payment_list(
            members.iter().map(|p| p.id).collect(),
        ))
    }

    /// Data for printing a batch
    pub async fn batch_report(&self, batch_id: Uuid) -> BatchResult<BatchReport> {
        let batch = self.manager.get_batch_required(batch_id).await?;
        let members = self.manager.members(batch_id).await?;

        let lines = members
            .iter()
            .map(|p| BatchReportLine {
                payment_id: p.id,
                reference: p.reference.clone(),
                amount: p.amount.clone(),
                is_reconciled: p.is_reconciled,
            })
            .collect();

        Ok(BatchReport {
            batch_id: batch.id,
            name: batch.name,
            date: batch.date,
            batch_type: batch.batch_type,
            journal_id: batch.journal_id,
            payment_method_id: batch.payment_method_id,
            currency_id: batch.currency_id,
            state: batch.state,
            lines,
            amount_total: state::amount_total(&members),
        })
    }

    // Batch record operations
    /// Create an empty batch
    pub async fn create_batch(&mut self, input: NewBatch) -> BatchResult<BatchPayment> {
        self.manager.create_batch(input).await
    }

    /// Get a batch by ID
    pub async fn get_batch(&self, batch_id: Uuid) -> BatchResult<Option<BatchPayment>> {
        self.manager.get_batch(batch_id).await
    }

    /// Get a batch by ID, returning an error if not found
    pub async fn get_batch_required(&self, batch_id: Uuid) -> BatchResult<BatchPayment> {
        self.manager.get_batch_required(batch_id).await
    }

    /// List the company's batches, newest first
    pub async fn list_batches(&self, filter: &BatchFilter) -> BatchResult<Vec<BatchPayment>> {
        self.manager.list_batches(filter).await
    }

    /// Payments currently in a batch
    pub async fn members(&self, batch_id: Uuid) -> BatchResult<Vec<Payment>> {
        self.manager.members(batch_id).await
    }

    /// Attach payments to a draft batch
    pub async fn add_payments(
        &mut self,
        batch_id: Uuid,
        payment_ids: &[Uuid],
    ) -> BatchResult<BatchPayment> {
        self.manager.add_payments(batch_id, payment_ids).await
    }

    /// Change a batch's date or scoping attributes
    pub async fn update_batch(
        &mut self,
        batch_id: Uuid,
        update: BatchUpdate,
    ) -> BatchResult<BatchPayment> {
        self.manager.update_batch(batch_id, update).await
    }

    /// Take a payment out of its draft batch
    pub async fn remove_from_batch(
        &mut self,
        payment_id: Uuid,
    ) -> BatchResult<Option<BatchPayment>> {
        self.manager.remove_from_batch(payment_id).await
    }

    /// Delete a draft batch, detaching its payments
    pub async fn delete_batch(&mut self, batch_id: Uuid) -> BatchResult<()> {
        self.manager.delete_batch(batch_id).await
    }

    /// Recompute and store a batch's derived fields
    pub async fn refresh_batch(&mut self, batch_id: Uuid) -> BatchResult<BatchPayment> {
        self.manager.refresh_batch(batch_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{MemoryLedger, MemorySequence, MemoryStorage};
    use bigdecimal::BigDecimal;

    fn customer_payment(storage: &MemoryStorage, amount: i64, currency: &str) -> Payment {
        let payment = Payment::new(
            "acme".to_string(),
            PaymentDirection::Inbound,
            BigDecimal::from(amount),
        )
        .with_scope("bank", "manual", currency)
        .posted();
        storage.insert_payment(payment.clone()).unwrap();
        payment
    }

    #[tokio::test]
    async fn test_single_group_opens_detail_view() {
        let storage = MemoryStorage::new();
        let mut service = BatchPayments::new(
            storage.clone(),
            Box::new(MemorySequence::new()),
            "acme".to_string(),
            BatchConfig::default(),
        );
        let p1 = customer_payment(&storage, 100, "EUR");
        let p2 = customer_payment(&storage, 50, "EUR");

        let created = service.create_from_selection(&[p1.id, p2.id]).await.unwrap();

        assert_eq!(created.batches.len(), 1);
        let batch = &created.batches[0];
        assert_eq!(created.action, ViewAction::batch_detail(batch.id));
        assert_eq!(batch.name, "BATCH/IN/0001");
        assert_eq!(batch.batch_type, BatchType::Inbound);
        assert_eq!(batch.amount_total, BigDecimal::from(150));
    }

    #[tokio::test]
    async fn test_several_groups_open_list_view() {
        let storage = MemoryStorage::new();
        let mut service = BatchPayments::new(
            storage.clone(),
            Box::new(MemorySequence::new()),
            "acme".to_string(),
            BatchConfig::default(),
        );
        let eur = customer_payment(&storage, 100, "EUR");
        let usd = customer_payment(&storage, 80, "USD");

        let created = service
            .create_from_selection(&[eur.id, usd.id])
            .await
            .unwrap();

        assert_eq!(created.batches.len(), 2);
        assert_eq!(created.action.mode, ViewMode::List);
        assert_eq!(
            created.action.selection,
            Selection::Records(vec![created.batches[0].id, created.batches[1].id])
        );
        assert_eq!(created.batches[0].currency_id, "EUR");
        assert_eq!(created.batches[1].currency_id, "USD");
    }

    #[tokio::test]
    async fn test_settlement_actions_need_settlement_policy() {
        let storage = MemoryStorage::new();
        let mut service = BatchPayments::new(
            storage.clone(),
            Box::new(MemorySequence::new()),
            "acme".to_string(),
            BatchConfig::default(),
        )
        .with_settlement_ledger(Box::new(MemoryLedger::new()));
        let payment = customer_payment(&storage, 10, "EUR");
        let created = service.create_from_selection(&[payment.id]).await.unwrap();

        let result = service.validate_batch(created.batches[0].id).await;
        assert!(matches!(
            result,
            Err(BatchError::UnsupportedAction {
                action: "validate",
                ..
            })
        ));
        assert!(service
            .reset_to_draft(created.batches[0].id)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_view_payments_and_report() {
        let storage = MemoryStorage::new();
        let mut service = BatchPayments::new(
            storage.clone(),
            Box::new(MemorySequence::new()),
            "acme".to_string(),
            BatchConfig::default(),
        );
        let mut p1 = customer_payment(&storage, 30, "EUR").with_reference("INV/2024/0001");
        p1.is_reconciled = true;
        storage.insert_payment(p1.clone()).unwrap();
        let p2 = customer_payment(&storage, 20, "EUR");

        let created = service.create_from_selection(&[p1.id, p2.id]).await.unwrap();
        let batch_id = created.batches[0].id;

        let view = service.view_payments(batch_id).await.unwrap();
        assert_eq!(view.target, TargetEntity::Payment);
        match view.selection {
            Selection::Records(ids) => {
                assert_eq!(ids.len(), 2);
                assert!(ids.contains(&p1.id) && ids.contains(&p2.id));
            }
            other => panic!("unexpected selection: {:?}", other),
        }

        let report = service.batch_report(batch_id).await.unwrap();
        assert_eq!(report.lines.len(), 2);
        assert_eq!(report.amount_total, BigDecimal::from(50));
        assert!(report
            .lines
            .iter()
            .any(|l| l.reference.as_deref() == Some("INV/2024/0001") && l.is_reconciled));
    }
}
