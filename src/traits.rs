//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use uuid::Uuid;

use crate::types::*;
use crate::utils::validation::check_membership;

/// Storage abstraction for payments and batches
///
/// This trait lets the batch core run on any backend (PostgreSQL, SQLite,
/// in-memory, etc.). Every mutation goes through [`PaymentStore::commit`],
/// which must apply a [`ChangeSet`] atomically.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Get a payment by ID
    async fn get_payment(&self, payment_id: Uuid) -> BatchResult<Option<Payment>>;

    /// Get the payments currently linked to a batch
    async fn get_batch_payments(&self, batch_id: Uuid) -> BatchResult<Vec<Payment>>;

    /// Get a batch by ID
    async fn get_batch(&self, batch_id: Uuid) -> BatchResult<Option<BatchPayment>>;

    /// List the batches of a company
    async fn list_batches(&self, company_id: &str) -> BatchResult<Vec<BatchPayment>>;

    /// Get a bank journal by ID
    async fn get_journal(&self, journal_id: &str) -> BatchResult<Option<BankJournal>>;

    /// Get a payment method by ID
    async fn get_payment_method(&self, method_id: &str) -> BatchResult<Option<PaymentMethod>>;

    /// Apply all writes of a change set, or none of them.
    ///
    /// Implementations must re-check under their own lock that every payment
    /// in `attach` is still unbatched and fail with
    /// [`BatchError::AlreadyInBatch`] otherwise. Within the same lock, every
    /// batch that is upserted, attached to, or holds a detached or updated
    /// payment gets its total and count recomputed from its committed
    /// members, and its state too when [`ChangeSet::member_state`] is set.
    async fn commit(&mut self, changes: ChangeSet) -> BatchResult<()>;
}

/// Numbering service handing out batch references
#[async_trait]
pub trait SequenceGenerator: Send + Sync {
    /// Next value for the given sequence code; monotonic per code
    async fn next_by_code(&self, code: &str) -> BatchResult<Option<String>>;
}

/// Ledger service owning the settlement entries of validated batches
#[async_trait]
pub trait SettlementLedger: Send + Sync {
    /// Create a draft two-line entry
    async fn create_entry(&mut self, request: SettlementRequest) -> BatchResult<SettlementEntry>;

    async fn get_entry(&self, entry_id: Uuid) -> BatchResult<Option<SettlementEntry>>;

    async fn post_entry(&mut self, entry_id: Uuid) -> BatchResult<()>;

    /// Return a posted entry to draft
    async fn unpost_entry(&mut self, entry_id: Uuid) -> BatchResult<()>;

    async fn delete_entry(&mut self, entry_id: Uuid) -> BatchResult<()>;
}

/// Trait for implementing custom membership rules
pub trait MembershipValidator: Send + Sync {
    /// Validate a batch against the payments it would hold after a mutation
    fn validate_members(&self, batch: &BatchPayment, members: &[Payment]) -> BatchResult<()>;
}

/// Default validator: members share currency, direction, journal and method with the batch
pub struct DefaultMembershipValidator;

impl MembershipValidator for DefaultMembershipValidator {
    fn validate_members(&self, batch: &BatchPayment, members: &[Payment]) -> BatchResult<()> {
        check_membership(batch, members)
    }
}
