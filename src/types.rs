//! Core types and data structures for batch payments

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Direction of an individual payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentDirection {
    /// Vendor payment - money leaves the bank account
    Outbound,
    /// Customer payment - money arrives in the bank account
    Inbound,
    /// Transfer between two internal accounts, never batched
    Internal,
}

impl PaymentDirection {
    /// The batch type able to hold payments of this direction
    pub fn batch_type(&self) -> Option<BatchType> {
        match self {
            PaymentDirection::Outbound => Some(BatchType::Outbound),
            PaymentDirection::Inbound => Some(BatchType::Inbound),
            PaymentDirection::Internal => None,
        }
    }
}

/// Posting state of an individual payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentState {
    Draft,
    Posted,
    Cancelled,
}

/// Batch type, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchType {
    /// Vendor payments
    Outbound,
    /// Customer payments
    Inbound,
}

impl BatchType {
    /// Payment direction every member of a batch of this type must have
    pub fn direction(&self) -> PaymentDirection {
        match self {
            BatchType::Outbound => PaymentDirection::Outbound,
            BatchType::Inbound => PaymentDirection::Inbound,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BatchType::Outbound => "Vendor Payments",
            BatchType::Inbound => "Customer Payments",
        }
    }
}

/// Derived status of a batch. Never written by users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchState {
    Draft,
    Validated,
    Reconciled,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BatchState::Draft => "draft",
            BatchState::Validated => "validated",
            BatchState::Reconciled => "reconciled",
        };
        f.write_str(label)
    }
}

/// Grouping key shared by every payment of one batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchKey {
    pub journal_id: String,
    pub payment_method_id: String,
    pub currency_id: String,
}

impl BatchKey {
    pub fn new(journal_id: String, payment_method_id: String, currency_id: String) -> Self {
        Self {
            journal_id,
            payment_method_id,
            currency_id,
        }
    }
}

/// A posted vendor or customer payment, extended with its batch membership
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Unique identifier for the payment
    pub id: Uuid,
    /// Company owning the payment
    pub company_id: String,
    /// Optional memo or payment reference
    pub reference: Option<String>,
    pub direction: PaymentDirection,
    pub state: PaymentState,
    /// Set once the payment is matched against a bank statement
    pub is_reconciled: bool,
    /// Bank journal (bank account reference)
    pub journal_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub currency_id: Option<String>,
    pub amount: BigDecimal,
    /// Batch this payment belongs to, if any
    pub batch_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Payment {
    /// Create a new draft payment with no scoping references
    pub fn new(company_id: String, direction: PaymentDirection, amount: BigDecimal) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4(),
            company_id,
            reference: None,
            direction,
            state: PaymentState::Draft,
            is_reconciled: false,
            journal_id: None,
            payment_method_id: None,
            currency_id: None,
            amount,
            batch_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the journal, payment method and currency references
    pub fn with_scope(
        mut self,
        journal_id: impl Into<String>,
        payment_method_id: impl Into<String>,
        currency_id: impl Into<String>,
    ) -> Self {
        self.journal_id = Some(journal_id.into());
        self.payment_method_id = Some(payment_method_id.into());
        self.currency_id = Some(currency_id.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn posted(mut self) -> Self {
        self.state = PaymentState::Posted;
        self
    }

    pub fn reconciled(mut self) -> Self {
        self.is_reconciled = true;
        self
    }

    pub fn is_posted(&self) -> bool {
        self.state == PaymentState::Posted
    }

    /// The grouping key, if all three references are present and non-empty
    pub fn batch_key(&self) -> Option<BatchKey> {
        let present = |value: &Option<String>| {
            value
                .as_ref()
                .filter(|v| !v.trim().is_empty())
                .cloned()
        };
        Some(BatchKey::new(
            present(&self.journal_id)?,
            present(&self.payment_method_id)?,
            present(&self.currency_id)?,
        ))
    }
}

/// Batch payment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPayment {
    /// Unique identifier for the batch
    pub id: Uuid,
    /// Reference code assigned from the numbering service
    pub name: String,
    /// Batch date
    pub date: NaiveDate,
    pub batch_type: BatchType,
    pub company_id: String,
    /// Bank journal (bank account reference)
    pub journal_id: String,
    pub payment_method_id: String,
    pub currency_id: String,
    /// Derived status, recomputed whenever its inputs change
    pub state: BatchState,
    /// Sum of member payment amounts
    pub amount_total: BigDecimal,
    /// Number of member payments
    pub payment_count: usize,
    /// Settlement entry created by validation, if any
    pub settlement_entry_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl BatchPayment {
    /// Create a new, empty draft batch
    pub fn new(
        name: String,
        date: NaiveDate,
        company_id: String,
        batch_type: BatchType,
        key: BatchKey,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4(),
            name,
            date,
            batch_type,
            company_id,
            journal_id: key.journal_id,
            payment_method_id: key.payment_method_id,
            currency_id: key.currency_id,
            state: BatchState::Draft,
            amount_total: BigDecimal::from(0),
            payment_count: 0,
            settlement_entry_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> BatchKey {
        BatchKey::new(
            self.journal_id.clone(),
            self.payment_method_id.clone(),
            self.currency_id.clone(),
        )
    }

    pub fn is_draft(&self) -> bool {
        self.state == BatchState::Draft
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().naive_utc();
    }
}

/// Input for creating a batch by hand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBatch {
    /// Explicit reference; `None` draws one from the numbering service
    pub name: Option<String>,
    /// Defaults to today
    pub date: Option<NaiveDate>,
    pub batch_type: BatchType,
    pub key: BatchKey,
}

/// Changes to a batch's date or scoping attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchUpdate {
    pub date: Option<NaiveDate>,
    pub batch_type: Option<BatchType>,
    pub journal_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub currency_id: Option<String>,
}

impl BatchUpdate {
    /// Whether the update touches an attribute the membership constraints depend on
    pub fn changes_scope(&self) -> bool {
        self.batch_type.is_some()
            || self.journal_id.is_some()
            || self.payment_method_id.is_some()
            || self.currency_id.is_some()
    }
}

/// Filter for listing batches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchFilter {
    pub state: Option<BatchState>,
    pub batch_type: Option<BatchType>,
}

impl BatchFilter {
    pub fn matches(&self, batch: &BatchPayment) -> bool {
        self.state.is_none_or(|s| batch.state == s)
            && self.batch_type.is_none_or(|t| batch.batch_type == t)
    }
}

/// Bank or cash journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankJournal {
    pub id: String,
    pub name: String,
    /// Bank account the journal books into
    pub default_account_id: Option<String>,
}

/// Payment method, e.g. manual or SEPA credit transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    pub name: String,
    /// Outstanding receipts/payments account used until the bank settles
    pub outstanding_account_id: Option<String>,
}

/// Posting state of a settlement entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryState {
    Draft,
    Posted,
    Cancelled,
}

/// Settlement progress of a posted entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementStatus {
    NotPaid,
    Partial,
    InPayment,
    Paid,
}

impl SettlementStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, SettlementStatus::Paid | SettlementStatus::InPayment)
    }
}

/// Request for the two-line entry moving a batch total to the bank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub journal_id: String,
    pub date: NaiveDate,
    /// Batch reference, used as entry reference and line label
    pub reference: String,
    pub currency_id: String,
    pub amount: BigDecimal,
    pub debit_account_id: String,
    pub credit_account_id: String,
}

/// Line of a settlement entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementLine {
    pub account_id: String,
    pub label: String,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
}

/// Ledger entry backing a validated batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementEntry {
    pub id: Uuid,
    pub journal_id: String,
    pub date: NaiveDate,
    pub reference: String,
    pub currency_id: String,
    pub lines: Vec<SettlementLine>,
    pub state: EntryState,
    pub settlement_status: SettlementStatus,
}

impl SettlementEntry {
    /// Build a draft balanced entry from a request
    pub fn from_request(request: SettlementRequest) -> Self {
        let zero = BigDecimal::from(0);
        let lines = vec![
            SettlementLine {
                account_id: request.debit_account_id,
                label: request.reference.clone(),
                debit: request.amount.clone(),
                credit: zero.clone(),
            },
            SettlementLine {
                account_id: request.credit_account_id,
                label: request.reference.clone(),
                debit: zero,
                credit: request.amount,
            },
        ];
        Self {
            id: Uuid::new_v4(),
            journal_id: request.journal_id,
            date: request.date,
            reference: request.reference,
            currency_id: request.currency_id,
            lines,
            state: EntryState::Draft,
            settlement_status: SettlementStatus::NotPaid,
        }
    }

    pub fn total_debits(&self) -> BigDecimal {
        self.lines.iter().map(|l| &l.debit).sum()
    }

    pub fn total_credits(&self) -> BigDecimal {
        self.lines.iter().map(|l| &l.credit).sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debits() == self.total_credits()
    }
}

/// Entity a view action opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetEntity {
    Batch,
    Payment,
}

/// Records a view action opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    Record(Uuid),
    Records(Vec<Uuid>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewMode {
    Detail,
    List,
}

/// Structured description of the view to open after an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewAction {
    pub title: String,
    pub target: TargetEntity,
    pub selection: Selection,
    pub mode: ViewMode,
}

impl ViewAction {
    /// Detail view of a single batch
    pub fn batch_detail(batch_id: Uuid) -> Self {
        Self {
            title: "Batch Payment".to_string(),
            target: TargetEntity::Batch,
            selection: Selection::Record(batch_id),
            mode: ViewMode::Detail,
        }
    }

    /// List view filtered to the given batches
    pub fn batch_list(batch_ids: Vec<Uuid>) -> Self {
        Self {
            title: "Batch Payments".to_string(),
            target: TargetEntity::Batch,
            selection: Selection::Records(batch_ids),
            mode: ViewMode::List,
        }
    }

    /// List view filtered to the given payments
    pub fn payment_list(payment_ids: Vec<Uuid>) -> Self {
        Self {
            title: "Payments".to_string(),
            target: TargetEntity::Payment,
            selection: Selection::Records(payment_ids),
            mode: ViewMode::List,
        }
    }
}

/// Result of grouping a payment selection into batches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCreation {
    /// Newly created batches in first-seen key order
    pub batches: Vec<BatchPayment>,
    pub action: ViewAction,
}

/// One payment line of a batch report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReportLine {
    pub payment_id: Uuid,
    pub reference: Option<String>,
    pub amount: BigDecimal,
    pub is_reconciled: bool,
}

/// Data handed to the report renderer for one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub name: String,
    pub date: NaiveDate,
    pub batch_type: BatchType,
    pub journal_id: String,
    pub payment_method_id: String,
    pub currency_id: String,
    pub state: BatchState,
    pub lines: Vec<BatchReportLine>,
    pub amount_total: BigDecimal,
}

/// Atomic set of writes committed by one operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Batches to insert or overwrite
    pub upsert_batches: Vec<BatchPayment>,
    /// Batches to remove, after all links are updated
    pub delete_batches: Vec<Uuid>,
    /// (payment, batch) links to create; the payment must be unbatched at commit
    pub attach: Vec<(Uuid, Uuid)>,
    /// Payments whose batch link is cleared
    pub detach: Vec<Uuid>,
    /// Payments whose posting state or reconciliation flag changed
    pub update_payments: Vec<Payment>,
    /// Stored batches take their state from their members
    pub member_state: bool,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.upsert_batches.is_empty()
            && self.delete_batches.is_empty()
            && self.attach.is_empty()
            && self.detach.is_empty()
            && self.update_payments.is_empty()
    }
}

/// Broad class of a [`BatchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// User-correctable input problem; nothing was written
    Precondition,
    /// Batch members disagree with each other or with the batch
    Consistency,
    /// Missing accounts or services; a setup problem, not a user error
    Configuration,
    NotFound,
    Storage,
}

/// Errors that can occur in the batch payment system
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("No payments selected")]
    EmptySelection,
    #[error("Only posted payments can be added to a batch: {payment_ids:?}")]
    PaymentNotPosted { payment_ids: Vec<Uuid> },
    #[error("Payments are already in a batch, remove them first: {payment_ids:?}")]
    AlreadyInBatch { payment_ids: Vec<Uuid> },
    #[error("Internal transfers cannot be added to a batch: {payment_ids:?}")]
    InternalTransfer { payment_ids: Vec<Uuid> },
    #[error("All selected payments must be of the same type (inbound or outbound)")]
    MixedDirections,
    #[error("Payments belong to another company: {payment_ids:?}")]
    ForeignCompany { payment_ids: Vec<Uuid> },
    #[error("Payments are missing a journal, payment method or currency: {payment_ids:?}")]
    MissingScope { payment_ids: Vec<Uuid> },
    #[error("Batch {name} is {state}, only draft batches can be changed this way")]
    BatchNotDraft { name: String, state: BatchState },
    #[error("Invalid batch reference: {0}")]
    InvalidReference(String),
    #[error("Batch {0} cannot be blank")]
    BlankScope(&'static str),
    #[error("Batch {0} has no payments")]
    EmptyBatch(String),
    #[error("All payments in batch {0} must be posted")]
    UnpostedMembers(String),
    #[error("Action '{action}' is not available under the {policy} state policy")]
    UnsupportedAction {
        action: &'static str,
        policy: &'static str,
    },
    #[error("All payments in a batch must have the same currency as the batch")]
    CurrencyMismatch,
    #[error("Payment type must match batch type")]
    DirectionMismatch,
    #[error("All payments in a batch must have the same journal as the batch")]
    JournalMismatch,
    #[error("All payments in a batch must have the same payment method as the batch")]
    PaymentMethodMismatch,
    #[error("Payment method '{0}' is missing an outstanding account")]
    MissingOutstandingAccount(String),
    #[error("Journal '{0}' is missing a default bank account")]
    MissingBankAccount(String),
    #[error("No settlement ledger configured")]
    SettlementLedgerMissing,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Batch not found: {0}")]
    BatchNotFound(Uuid),
    #[error("Payment not found: {0}")]
    PaymentNotFound(Uuid),
    #[error("Journal not found: {0}")]
    JournalNotFound(String),
    #[error("Payment method not found: {0}")]
    PaymentMethodNotFound(String),
    #[error("Settlement entry not found: {0}")]
    SettlementEntryNotFound(Uuid),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl BatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BatchError::EmptySelection
            | BatchError::PaymentNotPosted { .. }
            | BatchError::AlreadyInBatch { .. }
            | BatchError::InternalTransfer { .. }
            | BatchError::MixedDirections
            | BatchError::ForeignCompany { .. }
            | BatchError::MissingScope { .. }
            | BatchError::BatchNotDraft { .. }
            | BatchError::InvalidReference(_)
            | BatchError::BlankScope(_)
            | BatchError::EmptyBatch(_)
            | BatchError::UnpostedMembers(_)
            | BatchError::UnsupportedAction { .. } => ErrorKind::Precondition,
            BatchError::CurrencyMismatch
            | BatchError::DirectionMismatch
            | BatchError::JournalMismatch
            | BatchError::PaymentMethodMismatch => ErrorKind::Consistency,
            BatchError::MissingOutstandingAccount(_)
            | BatchError::MissingBankAccount(_)
            | BatchError::SettlementLedgerMissing
            | BatchError::InvalidConfig(_) => ErrorKind::Configuration,
            BatchError::BatchNotFound(_)
            | BatchError::PaymentNotFound(_)
            | BatchError::JournalNotFound(_)
            | BatchError::PaymentMethodNotFound(_)
            | BatchError::SettlementEntryNotFound(_) => ErrorKind::NotFound,
            BatchError::Storage(_) => ErrorKind::Storage,
        }
    }
}

/// Result type for batch operations
pub type BatchResult<T> = Result<T, BatchError>;
