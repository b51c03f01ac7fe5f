//! In-memory storage implementation for testing

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::batch::state;
use crate::traits::*;
use crate::types::*;

pub(crate) fn poisoned<T>(_: T) -> BatchError {
    BatchError::Storage("memory storage lock poisoned".to_string())
}

/// In-memory storage implementation for testing and development
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    payments: Arc<RwLock<HashMap<Uuid, Payment>>>,
    batches: Arc<RwLock<HashMap<Uuid, BatchPayment>>>,
    journals: Arc<RwLock<HashMap<String, BankJournal>>>,
    methods: Arc<RwLock<HashMap<String, PaymentMethod>>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            payments: Arc::new(RwLock::new(HashMap::new())),
            batches: Arc::new(RwLock::new(HashMap::new())),
            journals: Arc::new(RwLock::new(HashMap::new())),
            methods: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert or replace a payment, as the surrounding accounting system would
    pub fn insert_payment(&self, payment: Payment) -> BatchResult<()> {
        self.payments
            .write()
            .map_err(poisoned)?
            .insert(payment.id, payment);
        Ok(())
    }

    pub fn insert_journal(&self, journal: BankJournal) -> BatchResult<()> {
        self.journals
            .write()
            .map_err(poisoned)?
            .insert(journal.id.clone(), journal);
        Ok(())
    }

    pub fn insert_payment_method(&self, method: PaymentMethod) -> BatchResult<()> {
        self.methods
            .write()
            .map_err(poisoned)?
            .insert(method.id.clone(), method);
        Ok(())
    }

    /// Number of stored batches across all companies
    pub fn batch_count(&self) -> BatchResult<usize> {
        Ok(self.batches.read().map_err(poisoned)?.len())
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> BatchResult<()> {
        self.payments.write().map_err(poisoned)?.clear();
        self.batches.write().map_err(poisoned)?.clear();
        self.journals.write().map_err(poisoned)?.clear();
        self.methods.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentStore for MemoryStorage {
    async fn get_payment(&self, payment_id: Uuid) -> BatchResult<Option<Payment>> {
        Ok(self.payments.read().map_err(poisoned)?.get(&payment_id).cloned())
    }

    async fn get_batch_payments(&self, batch_id: Uuid) -> BatchResult<Vec<Payment>> {
        let payments = self.payments.read().map_err(poisoned)?;
        let mut members: Vec<Payment> = payments
            .values()
            .filter(|p| p.batch_id == Some(batch_id))
            .cloned()
            .collect();
        members.sort_by_key(|p| (p.created_at, p.id));
        Ok(members)
    }

    async fn get_batch(&self, batch_id: Uuid) -> BatchResult<Option<BatchPayment>> {
        Ok(self.batches.read().map_err(poisoned)?.get(&batch_id).cloned())
    }

    async fn list_batches(&self, company_id: &str) -> BatchResult<Vec<BatchPayment>> {
        let batches = self.batches.read().map_err(poisoned)?;
        Ok(batches
            .values()
            .filter(|b| b.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn get_journal(&self, journal_id: &str) -> BatchResult<Option<BankJournal>> {
        Ok(self.journals.read().map_err(poisoned)?.get(journal_id).cloned())
    }

    async fn get_payment_method(&self, method_id: &str) -> BatchResult<Option<PaymentMethod>> {
        Ok(self.methods.read().map_err(poisoned)?.get(method_id).cloned())
    }

    async fn commit(&mut self, changes: ChangeSet) -> BatchResult<()> {
        // Lock order: batches, then payments
        let mut batches = self.batches.write().map_err(poisoned)?;
        let mut payments = self.payments.write().map_err(poisoned)?;

        // Check everything before the first write
        let known_payment = |id: &Uuid| {
            if payments.contains_key(id) {
                Ok(())
            } else {
                Err(BatchError::PaymentNotFound(*id))
            }
        };
        for id in changes
            .detach
            .iter()
            .chain(changes.update_payments.iter().map(|p| &p.id))
            .chain(changes.attach.iter().map(|(payment_id, _)| payment_id))
        {
            known_payment(id)?;
        }

        let detached: HashSet<Uuid> = changes.detach.iter().copied().collect();
        let conflicts: Vec<Uuid> = changes
            .attach
            .iter()
            .filter_map(|(payment_id, _)| payments.get(payment_id))
            .filter(|p| p.batch_id.is_some() && !detached.contains(&p.id))
            .map(|p| p.id)
            .collect();
        if !conflicts.is_empty() {
            return Err(BatchError::AlreadyInBatch {
                payment_ids: conflicts,
            });
        }

        let upserted: HashSet<Uuid> = changes.upsert_batches.iter().map(|b| b.id).collect();
        for (_, batch_id) in &changes.attach {
            if !batches.contains_key(batch_id) && !upserted.contains(batch_id) {
                return Err(BatchError::BatchNotFound(*batch_id));
            }
        }
        for batch_id in &changes.delete_batches {
            if !batches.contains_key(batch_id) {
                return Err(BatchError::BatchNotFound(*batch_id));
            }
        }

        // Batches whose members change, as linked before this commit
        let mut touched: HashSet<Uuid> = changes
            .detach
            .iter()
            .chain(changes.update_payments.iter().map(|p| &p.id))
            .filter_map(|id| payments.get(id).and_then(|p| p.batch_id))
            .collect();
        touched.extend(upserted.iter().copied());
        touched.extend(changes.attach.iter().map(|(_, batch_id)| *batch_id));

        for batch in changes.upsert_batches {
            batches.insert(batch.id, batch);
        }

        // Membership only changes through attach and detach
        for update in changes.update_payments {
            if let Some(payment) = payments.get_mut(&update.id) {
                let batch_id = payment.batch_id;
                *payment = Payment { batch_id, ..update };
            }
        }

        let now = chrono::Utc::now().naive_utc();
        for payment_id in &changes.detach {
            if let Some(payment) = payments.get_mut(payment_id) {
                payment.batch_id = None;
                payment.updated_at = now;
            }
        }
        for (payment_id, batch_id) in &changes.attach {
            if let Some(payment) = payments.get_mut(payment_id) {
                payment.batch_id = Some(*batch_id);
                payment.updated_at = now;
            }
        }

        for batch_id in &changes.delete_batches {
            batches.remove(batch_id);
            for payment in payments.values_mut() {
                if payment.batch_id == Some(*batch_id) {
                    payment.batch_id = None;
                }
            }
        }

        // Derived fields follow the committed membership, not the caller's snapshot
        for batch_id in touched {
            let Some(batch) = batches.get_mut(&batch_id) else {
                continue;
            };
            let members: Vec<Payment> = payments
                .values()
                .filter(|p| p.batch_id == Some(batch_id))
                .cloned()
                .collect();
            let new_state = if changes.member_state {
                state::aggregate_state(&members)
            } else {
                batch.state
            };
            state::apply_totals(batch, &members, new_state);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    fn posted_payment() -> Payment {
        Payment::new(
            "acme".to_string(),
            PaymentDirection::Inbound,
            BigDecimal::from(40),
        )
        .with_scope("bank", "manual", "EUR")
        .posted()
    }

    fn batch() -> BatchPayment {
        BatchPayment::new(
            "BATCH/IN/0001".to_string(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            "acme".to_string(),
            BatchType::Inbound,
            BatchKey::new("bank".to_string(), "manual".to_string(), "EUR".to_string()),
        )
    }

    #[tokio::test]
    async fn test_commit_attaches_payments() {
        let mut storage = MemoryStorage::new();
        let payment = posted_payment();
        storage.insert_payment(payment.clone()).unwrap();
        let batch = batch();

        storage
            .commit(ChangeSet {
                upsert_batches: vec![batch.clone()],
                attach: vec![(payment.id, batch.id)],
                ..ChangeSet::default()
            })
            .await
            .unwrap();

        let members = storage.get_batch_payments(batch.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, payment.id);
    }

    #[tokio::test]
    async fn test_second_attach_fails_without_side_effects() {
        let mut storage = MemoryStorage::new();
        let payment = posted_payment();
        storage.insert_payment(payment.clone()).unwrap();
        let first = batch();
        let second = batch();

        storage
            .commit(ChangeSet {
                upsert_batches: vec![first.clone()],
                attach: vec![(payment.id, first.id)],
                ..ChangeSet::default()
            })
            .await
            .unwrap();

        let result = storage
            .commit(ChangeSet {
                upsert_batches: vec![second.clone()],
                attach: vec![(payment.id, second.id)],
                ..ChangeSet::default()
            })
            .await;

        assert!(matches!(result, Err(BatchError::AlreadyInBatch { .. })));
        assert!(storage.get_batch(second.id).await.unwrap().is_none());
        let stored = storage.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.batch_id, Some(first.id));
    }

    #[tokio::test]
    async fn test_delete_batch_clears_links() {
        let mut storage = MemoryStorage::new();
        let payment = posted_payment();
        storage.insert_payment(payment.clone()).unwrap();
        let batch = batch();

        storage
            .commit(ChangeSet {
                upsert_batches: vec![batch.clone()],
                attach: vec![(payment.id, batch.id)],
                ..ChangeSet::default()
            })
            .await
            .unwrap();
        storage
            .commit(ChangeSet {
                delete_batches: vec![batch.id],
                ..ChangeSet::default()
            })
            .await
            .unwrap();

        assert_eq!(storage.batch_count().unwrap(), 0);
        let stored = storage.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.batch_id, None);
    }

    #[tokio::test]
    async fn test_commit_recomputes_from_committed_members() {
        let mut storage = MemoryStorage::new();
        let first = posted_payment();
        let second = posted_payment().reconciled();
        storage.insert_payment(first.clone()).unwrap();
        storage.insert_payment(second.clone()).unwrap();
        let stale = batch();

        storage
            .commit(ChangeSet {
                upsert_batches: vec![stale.clone()],
                attach: vec![(first.id, stale.id)],
                member_state: true,
                ..ChangeSet::default()
            })
            .await
            .unwrap();
        // A writer holding the batch as read before the first attach
        storage
            .commit(ChangeSet {
                upsert_batches: vec![stale.clone()],
                attach: vec![(second.id, stale.id)],
                member_state: true,
                ..ChangeSet::default()
            })
            .await
            .unwrap();

        let stored = storage.get_batch(stale.id).await.unwrap().unwrap();
        assert_eq!(stored.amount_total, BigDecimal::from(80));
        assert_eq!(stored.payment_count, 2);
        assert_eq!(stored.state, BatchState::Validated);

        // Updating a member refreshes its batch even without an upsert
        let mut reconciled = first.clone();
        reconciled.is_reconciled = true;
        storage
            .commit(ChangeSet {
                update_payments: vec![reconciled],
                member_state: true,
                ..ChangeSet::default()
            })
            .await
            .unwrap();
        let stored = storage.get_batch(stale.id).await.unwrap().unwrap();
        assert_eq!(stored.state, BatchState::Reconciled);

        // Without member state the stored state is left alone
        storage
            .commit(ChangeSet {
                detach: vec![second.id],
                ..ChangeSet::default()
            })
            .await
            .unwrap();
        let stored = storage.get_batch(stale.id).await.unwrap().unwrap();
        assert_eq!(stored.amount_total, BigDecimal::from(40));
        assert_eq!(stored.payment_count, 1);
        assert_eq!(stored.state, BatchState::Reconciled);
    }

    #[tokio::test]
    async fn test_unknown_payment_rejected() {
        let mut storage = MemoryStorage::new();
        let batch = batch();
        let missing = Uuid::new_v4();

        let result = storage
            .commit(ChangeSet {
                upsert_batches: vec![batch],
                attach: vec![(missing, Uuid::new_v4())],
                ..ChangeSet::default()
            })
            .await;

        assert!(matches!(result, Err(BatchError::PaymentNotFound(id)) if id == missing));
        assert_eq!(storage.batch_count().unwrap(), 0);
    }
}
