//! Member payment tracking
//!
//! Posting and bank reconciliation happen outside this crate. These hooks
//! record the new payment state and, when the payment sits in a batch,
//! recompute that batch in the same commit.

use uuid::Uuid;

use crate::batch::BatchPayments;
use crate::traits::*;
use crate::types::*;

impl<S: PaymentStore> BatchPayments<S> {
    /// Record a payment's posting state
    pub async fn set_payment_state(
        &mut self,
        payment_id: Uuid,
        state: PaymentState,
    ) -> BatchResult<Option<BatchPayment>> {
        self.update_member(payment_id, |payment| payment.state = state)
            .await
    }

    /// Record whether a payment has been matched against a bank statement
    pub async fn set_payment_reconciled(
        &mut self,
        payment_id: Uuid,
        is_reconciled: bool,
    ) -> BatchResult<Option<BatchPayment>> {
        self.update_member(payment_id, |payment| payment.is_reconciled = is_reconciled)
            .await
    }

    /// Apply a change to a payment and recompute its batch, if any.
    ///
    /// Returns the recomputed batch.
    async fn update_member<F>(
        &mut self,
        payment_id: Uuid,
        change: F,
    ) -> BatchResult<Option<BatchPayment>>
    where
        F: FnOnce(&mut Payment),
    {
        let manager = &mut self.manager;
        let mut payment = manager
            .storage
            .get_payment(payment_id)
            .await?
            .ok_or(BatchError::PaymentNotFound(payment_id))?;
        change(&mut payment);
        payment.updated_at = chrono::Utc::now().naive_utc();

        let mut changes = manager.change_set();
        let batch = match payment.batch_id {
            Some(batch_id) => {
                let batch = manager.get_batch_required(batch_id).await?;
                let members: Vec<Payment> = manager
                    .members(batch_id)
                    .await?
                    .into_iter()
                    .map(|p| if p.id == payment.id { payment.clone() } else { p })
                    .collect();
                let batch = manager.recompute(batch, &members).await?;
                changes.upsert_batches.push(batch.clone());
                Some(batch)
            }
            None => None,
        };

        changes.update_payments.push(payment);
        manager.storage.commit(changes).await?;
        Ok(batch)
    }
}
