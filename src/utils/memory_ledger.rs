//! In-memory settlement ledger

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::traits::SettlementLedger;
use crate::types::*;
use crate::utils::memory_storage::poisoned;

/// Settlement entries kept in memory, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    entries: Arc<RwLock<HashMap<Uuid, SettlementEntry>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the bank settling a posted entry, as statement matching would
    pub fn settle(&self, entry_id: Uuid, status: SettlementStatus) -> BatchResult<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let entry = entries
            .get_mut(&entry_id)
            .ok_or(BatchError::SettlementEntryNotFound(entry_id))?;
        if entry.state != EntryState::Posted {
            return Err(BatchError::Storage(format!(
                "entry {} must be posted before it can be settled",
                entry.reference
            )));
        }
        entry.settlement_status = status;
        Ok(())
    }

    pub fn entry_count(&self) -> BatchResult<usize> {
        Ok(self.entries.read().map_err(poisoned)?.len())
    }
}

#[async_trait]
impl SettlementLedger for MemoryLedger {
    async fn create_entry(&mut self, request: SettlementRequest) -> BatchResult<SettlementEntry> {
        if request.debit_account_id == request.credit_account_id {
            return Err(BatchError::Storage(format!(
                "entry {} debits and credits the same account",
                request.reference
            )));
        }

        let entry = SettlementEntry::from_request(request);
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn get_entry(&self, entry_id: Uuid) -> BatchResult<Option<SettlementEntry>> {
        Ok(self.entries.read().map_err(poisoned)?.get(&entry_id).cloned())
    }

    async fn post_entry(&mut self, entry_id: Uuid) -> BatchResult<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let entry = entries
            .get_mut(&entry_id)
            .ok_or(BatchError::SettlementEntryNotFound(entry_id))?;
        if !entry.is_balanced() {
            return Err(BatchError::Storage(format!(
                "entry {} is not balanced",
                entry.reference
            )));
        }
        match entry.state {
            EntryState::Draft => {
                entry.state = EntryState::Posted;
                Ok(())
            }
            EntryState::Posted => Ok(()),
            EntryState::Cancelled => Err(BatchError::Storage(format!(
                "entry {} is cancelled",
                entry.reference
            ))),
        }
    }

    async fn unpost_entry(&mut self, entry_id: Uuid) -> BatchResult<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let entry = entries
            .get_mut(&entry_id)
            .ok_or(BatchError::SettlementEntryNotFound(entry_id))?;
        entry.state = EntryState::Draft;
        entry.settlement_status = SettlementStatus::NotPaid;
        Ok(())
    }

    async fn delete_entry(&mut self, entry_id: Uuid) -> BatchResult<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let current = entries
            .get(&entry_id)
            .map(|entry| (entry.state, entry.reference.clone()));
        match current {
            None => Err(BatchError::SettlementEntryNotFound(entry_id)),
            Some((EntryState::Posted, reference)) => Err(BatchError::Storage(format!(
                "posted entry {} cannot be deleted",
                reference
            ))),
            Some(_) => {
                entries.remove(&entry_id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    fn request() -> SettlementRequest {
        SettlementRequest {
            journal_id: "bank".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            reference: "BATCH/OUT/0001".to_string(),
            currency_id: "EUR".to_string(),
            amount: BigDecimal::from(75),
            debit_account_id: "outstanding_payments".to_string(),
            credit_account_id: "bank_account".to_string(),
        }
    }

    #[tokio::test]
    async fn test_entry_lifecycle() {
        let mut ledger = MemoryLedger::new();
        let entry = ledger.create_entry(request()).await.unwrap();
        assert_eq!(entry.state, EntryState::Draft);

        ledger.post_entry(entry.id).await.unwrap();
        ledger.settle(entry.id, SettlementStatus::Paid).unwrap();
        let stored = ledger.get_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.state, EntryState::Posted);
        assert!(stored.settlement_status.is_settled());

        // Posted entries must be unposted before deletion
        assert!(ledger.delete_entry(entry.id).await.is_err());
        ledger.unpost_entry(entry.id).await.unwrap();
        ledger.delete_entry(entry.id).await.unwrap();
        assert_eq!(ledger.entry_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_settle_requires_posting() {
        let mut ledger = MemoryLedger::new();
        let entry = ledger.create_entry(request()).await.unwrap();
        assert!(ledger.settle(entry.id, SettlementStatus::Paid).is_err());
    }
}
