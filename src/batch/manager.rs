//! Batch record management: numbering, membership and derived totals

use std::collections::HashSet;
use uuid::Uuid;

use crate::batch::{grouping, state};
use crate::config::{BatchConfig, StatePolicy};
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::{validate_key, validate_reference};

/// Batch manager for handling batch records of one company
pub struct BatchManager<S: PaymentStore> {
    pub(crate) storage: S,
    sequence: Box<dyn SequenceGenerator>,
    ledger: Option<Box<dyn SettlementLedger>>,
    pub(crate) validator: Box<dyn MembershipValidator>,
    pub(crate) config: BatchConfig,
    pub(crate) company_id: String,
}

impl<S: PaymentStore> BatchManager<S> {
    /// Create a new batch manager
    pub fn new(
        storage: S,
        sequence: Box<dyn SequenceGenerator>,
        company_id: String,
        config: BatchConfig,
    ) -> Self {
        Self {
            storage,
            sequence,
            ledger: None,
            validator: Box::new(DefaultMembershipValidator),
            config,
            company_id,
        }
    }

    /// Replace the default membership validator
    pub fn with_validator(mut self, validator: Box<dyn MembershipValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Attach the ledger holding settlement entries
    pub fn with_settlement_ledger(mut self, ledger: Box<dyn SettlementLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub(crate) fn ledger_mut(&mut self) -> BatchResult<&mut dyn SettlementLedger> {
        match self.ledger.as_mut() {
            Some(ledger) => Ok(ledger.as_mut()),
            None => Err(BatchError::SettlementLedgerMissing),
        }
    }

    /// Empty change set carrying how the store derives batch state
    pub(crate) fn change_set(&self) -> ChangeSet {
        ChangeSet {
            member_state: self.config.state_policy == StatePolicy::MemberAggregation,
            ..ChangeSet::default()
        }
    }

    /// Next reference for a batch of the given type, or the placeholder
    async fn next_reference(&self, batch_type: BatchType) -> BatchResult<String> {
        let code = self.config.sequence_code(batch_type);
        Ok(self
            .sequence
            .next_by_code(code)
            .await?
            .unwrap_or_else(|| self.config.placeholder_reference.clone()))
    }

    /// Build an unsaved batch, numbering it when no reference is given
    pub(crate) async fn new_batch(&self, input: NewBatch) -> BatchResult<BatchPayment> {
        validate_key(&input.key)?;
        let name = match input.name {
            Some(name) if name != self.config.placeholder_reference => {
                validate_reference(&name)?;
                name
            }
            _ => self.next_reference(input.batch_type).await?,
        };
        let date = input
            .date
            .unwrap_or_else(|| chrono::Utc::now().date_naive());

        Ok(BatchPayment::new(
            name,
            date,
            self.company_id.clone(),
            input.batch_type,
            input.key,
        ))
    }

    /// Create an empty batch
    pub async fn create_batch(&mut self, input: NewBatch) -> BatchResult<BatchPayment> {
        let batch = self.new_batch(input).await?;

        self.storage
            .commit(ChangeSet {
                upsert_batches: vec![batch.clone()],
                ..self.change_set()
            })
            .await?;

        tracing::info!("Created batch {} ({})", batch.name, batch.batch_type.label());
        Ok(batch)
    }

    /// Get a batch of this company by ID
    pub async fn get_batch(&self, batch_id: Uuid) -> BatchResult<Option<BatchPayment>> {
        Ok(self
            .storage
            .get_batch(batch_id)
            .await?
            .filter(|b| b.company_id == self.company_id))
    }

    /// Get a batch by ID, returning an error if not found
    pub async fn get_batch_required(&self, batch_id: Uuid) -> BatchResult<BatchPayment> {
        self.get_batch(batch_id)
            .await?
            .ok_or(BatchError::BatchNotFound(batch_id))
    }

    /// List batches, newest first
    pub async fn list_batches(&self, filter: &BatchFilter) -> BatchResult<Vec<BatchPayment>> {
        let mut batches: Vec<BatchPayment> = self
            .storage
            .list_batches(&self.company_id)
            .await?
            .into_iter()
            .filter(|b| filter.matches(b))
            .collect();
        batches.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(batches)
    }

    /// Payments currently in a batch
    pub async fn members(&self, batch_id: Uuid) -> BatchResult<Vec<Payment>> {
        self.storage.get_batch_payments(batch_id).await
    }

    /// Load payments by ID, dropping duplicates and keeping first-seen order
    pub async fn load_payments(&self, payment_ids: &[Uuid]) -> BatchResult<Vec<Payment>> {
        let mut seen = HashSet::new();
        let mut payments = Vec::with_capacity(payment_ids.len());
        for &payment_id in payment_ids {
            if !seen.insert(payment_id) {
                continue;
            }
            let payment = self
                .storage
                .get_payment(payment_id)
                .await?
                .ok_or(BatchError::PaymentNotFound(payment_id))?;
            payments.push(payment);
        }
        Ok(payments)
    }

    /// Status of a batch under the configured policy
    pub async fn derive_state(
        &self,
        batch: &BatchPayment,
        members: &[Payment],
    ) -> BatchResult<BatchState> {
        match self.config.state_policy {
            StatePolicy::MemberAggregation => Ok(state::aggregate_state(members)),
            StatePolicy::SettlementEntry => {
                let entry = match (batch.settlement_entry_id, self.ledger.as_ref()) {
                    (None, _) => None,
                    (Some(entry_id), Some(ledger)) => ledger.get_entry(entry_id).await?,
                    (Some(_), None) => return Err(BatchError::SettlementLedgerMissing),
                };
                Ok(state::settlement_state(entry.as_ref()))
            }
        }
    }

    /// Refresh total, count and status of a batch against the given members
    pub(crate) async fn recompute(
        &self,
        mut batch: BatchPayment,
        members: &[Payment],
    ) -> BatchResult<BatchPayment> {
        let new_state = self.derive_state(&batch, members).await?;
        if new_state != batch.state {
            tracing::debug!("Batch {} moves from {} to {}", batch.name, batch.state, new_state);
        }
        state::apply_totals(&mut batch, members, new_state);
        Ok(batch)
    }

    /// Recompute and store a batch's derived fields
    pub async fn refresh_batch(&mut self, batch_id: Uuid) -> BatchResult<BatchPayment> {
        let batch = self.get_batch_required(batch_id).await?;
        let members = self.members(batch_id).await?;
        let batch = self.recompute(batch, &members).await?;

        self.storage
            .commit(ChangeSet {
                upsert_batches: vec![batch.clone()],
                ..self.change_set()
            })
            .await?;
        Ok(batch)
    }

    /// Attach posted payments to an existing draft batch
    pub async fn add_payments(
        &mut self,
        batch_id: Uuid,
        payment_ids: &[Uuid],
    ) -> BatchResult<BatchPayment> {
        let batch = self.get_batch_required(batch_id).await?;
        if !batch.is_draft() {
            return Err(BatchError::BatchNotDraft {
                name: batch.name,
                state: batch.state,
            });
        }

        let incoming: Vec<Payment> = self
            .load_payments(payment_ids)
            .await?
            .into_iter()
            .filter(|p| p.batch_id != Some(batch_id))
            .collect();
        if incoming.is_empty() {
            return Ok(batch);
        }
        grouping::check_selection(&incoming, &self.company_id)?;

        let mut members = self.members(batch_id).await?;
        members.extend(incoming.iter().cloned().map(|mut p| {
            p.batch_id = Some(batch_id);
            p
        }));
        self.validator.validate_members(&batch, &members)?;

        let batch = self.recompute(batch, &members).await?;
        self.storage
            .commit(ChangeSet {
                upsert_batches: vec![batch.clone()],
                attach: incoming.iter().map(|p| (p.id, batch_id)).collect(),
                ..self.change_set()
            })
            .await?;

        tracing::info!("Added {} payments to batch {}", incoming.len(), batch.name);
        Ok(batch)
    }

    /// Change a batch's date or scoping attributes
    pub async fn update_batch(
        &mut self,
        batch_id: Uuid,
        update: BatchUpdate,
    ) -> BatchResult<BatchPayment> {
        let mut batch = self.get_batch_required(batch_id).await?;
        let scope_changed = update.changes_scope();

        if let Some(date) = update.date {
            batch.date = date;
        }
        if let Some(batch_type) = update.batch_type {
            batch.batch_type = batch_type;
        }
        if let Some(journal_id) = update.journal_id {
            batch.journal_id = journal_id;
        }
        if let Some(payment_method_id) = update.payment_method_id {
            batch.payment_method_id = payment_method_id;
        }
        if let Some(currency_id) = update.currency_id {
            batch.currency_id = currency_id;
        }

        validate_key(&batch.key())?;

        let members = self.members(batch_id).await?;
        if scope_changed {
            self.validator.validate_members(&batch, &members)?;
        }

        let batch = self.recompute(batch, &members).await?;
        self.storage
            .commit(ChangeSet {
                upsert_batches: vec![batch.clone()],
                ..self.change_set()
            })
            .await?;
        Ok(batch)
    }

    /// Take a payment out of its batch; the batch must be in draft.
    ///
    /// Returns the updated batch, or `None` when the payment was not batched.
    pub async fn remove_from_batch(
        &mut self,
        payment_id: Uuid,
    ) -> BatchResult<Option<BatchPayment>> {
        let payment = self
            .storage
            .get_payment(payment_id)
            .await?
            .ok_or(BatchError::PaymentNotFound(payment_id))?;
        let Some(batch_id) = payment.batch_id else {
            return Ok(None);
        };

        let batch = self.get_batch_required(batch_id).await?;
        if !batch.is_draft() {
            return Err(BatchError::BatchNotDraft {
                name: batch.name,
                state: batch.state,
            });
        }

        let members: Vec<Payment> = self
            .members(batch_id)
            .await?
            .into_iter()
            .filter(|p| p.id != payment_id)
            .collect();
        let batch = self.recompute(batch, &members).await?;

        self.storage
            .commit(ChangeSet {
                upsert_batches: vec![batch.clone()],
                detach: vec![payment_id],
                ..self.change_set()
            })
            .await?;

        tracing::info!("Removed payment {} from batch {}", payment_id, batch.name);
        Ok(Some(batch))
    }

    /// Delete a draft batch, detaching its payments
    pub async fn delete_batch(&mut self, batch_id: Uuid) -> BatchResult<()> {
        let batch = self.get_batch_required(batch_id).await?;
        if !batch.is_draft() {
            return Err(BatchError::BatchNotDraft {
                name: batch.name,
                state: batch.state,
            });
        }

        // A draft batch can only hold a draft entry
        if let Some(entry_id) = batch.settlement_entry_id {
            match self.ledger_mut()?.delete_entry(entry_id).await {
                Ok(()) | Err(BatchError::SettlementEntryNotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }

        let members = self.members(batch_id).await?;
        self.storage
            .commit(ChangeSet {
                detach: members.iter().map(|p| p.id).collect(),
                delete_batches: vec![batch_id],
                ..self.change_set()
            })
            .await?;

        tracing::info!(
            "Deleted batch {} and detached {} payments",
            batch.name,
            members.len()
        );
        Ok(())
    }
}
