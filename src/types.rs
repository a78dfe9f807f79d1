//! Core types and data structures for the reconciliation system

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::money::Money;

/// Invoice lifecycle status.
///
/// Apart from the externally imposed `Cancelled` trap state, status is a
/// pure function of the paid/remaining amounts and the due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoiceStatus {
    /// Created by an external billing workflow, not yet sent.
    Draft,
    /// Sent to the customer, nothing paid yet.
    Sent,
    /// Partially settled by payments and/or credit notes.
    Partial,
    /// Fully settled; `amount_remaining` is zero.
    Paid,
    /// Nothing paid and the due date has passed.
    Overdue,
    /// Externally cancelled; freezes all further mutation.
    Cancelled,
}

/// An obligation owed by a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier for the invoice
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Human-facing invoice number (e.g. "FV-2024-0001")
    pub number: String,
    /// Customer display name, used by the transaction matcher
    pub customer_name: String,
    /// Optional order reference, used by the transaction matcher
    pub order_reference: Option<String>,
    /// ISO currency code
    pub currency: String,
    /// Net amount before tax
    pub subtotal: Money,
    /// Tax amount
    pub tax: Money,
    /// Gross amount owed; `subtotal + tax`
    pub total: Money,
    /// Sum of all applied monetary events
    pub amount_paid: Money,
    /// What is still owed; `total - amount_paid`
    pub amount_remaining: Money,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    /// Stamped when the invoice flips to `Paid`
    pub paid_date: Option<NaiveDate>,
    /// Optimistic-concurrency token; bumped on every committed mutation
    pub version: u64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Parameters for creating a new invoice.
pub struct InvoiceParams {
    pub id: String,
    pub tenant_id: String,
    pub number: String,
    pub customer_name: String,
    pub order_reference: Option<String>,
    pub currency: String,
    pub subtotal: Money,
    pub tax: Money,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
}

impl Invoice {
    /// Create a new invoice in `Draft` with nothing paid.
    ///
    /// Fails with [`ReconcileError::Validation`] when `subtotal + tax`
    /// overflows the minor-unit range.
    pub fn new(params: InvoiceParams) -> ReconcileResult<Self> {
        let now = chrono::Utc::now().naive_utc();
        let total = params
            .subtotal
            .checked_add(params.tax)
            .ok_or_else(|| ReconcileError::Validation("invoice total overflows".to_string()))?;
        Ok(Self {
            id: params.id,
            tenant_id: params.tenant_id,
            number: params.number,
            customer_name: params.customer_name,
            order_reference: params.order_reference,
            currency: params.currency,
            subtotal: params.subtotal,
            tax: params.tax,
            total,
            amount_paid: Money::zero(),
            amount_remaining: total,
            status: InvoiceStatus::Draft,
            issue_date: params.issue_date,
            due_date: params.due_date,
            paid_date: None,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether the invoice can still receive payments or credits.
    pub fn is_open(&self) -> bool {
        !matches!(self.status, InvoiceStatus::Cancelled | InvoiceStatus::Paid)
            && self.amount_remaining.is_positive()
    }

    /// Externally imposed cancellation; the invoice becomes immutable.
    pub fn cancel(&mut self) {
        self.status = InvoiceStatus::Cancelled;
        self.updated_at = chrono::Utc::now().naive_utc();
    }
}

/// Credit note lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreditNoteStatus {
    /// Created and validated; reserves nothing against the invoice cap.
    Draft,
    /// Activated; counts against the invoice's creditable cap.
    Issued,
    /// Applied to the invoice balance. Terminal; cannot be un-applied.
    Applied,
}

/// A bounded reversal of part of an invoice's obligation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditNote {
    pub id: String,
    pub invoice_id: String,
    /// Net portion of the credited amount
    pub subtotal: Money,
    /// Tax portion of the credited amount
    pub tax: Money,
    /// Gross credited amount; `subtotal + tax`
    pub total: Money,
    pub reason: String,
    pub status: CreditNoteStatus,
    /// Stamped on `Draft -> Issued`
    pub issue_date: Option<NaiveDate>,
    /// Stamped on `Issued -> Applied`
    pub applied_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// How a payment arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    BankTransfer,
    Card,
    Cash,
    /// Recorded by the match applier from a confirmed bank transaction.
    BankReconciliation,
}

/// Payment status. This engine only ever records completed payments;
/// pending/failed gateway states live with the external payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Completed,
}

/// An atomic monetary event reducing an invoice's remaining balance.
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub invoice_id: String,
    pub amount: Money,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub completed_at: NaiveDateTime,
    pub notes: Option<String>,
    /// Caller-supplied key making `record_partial_payment` retry-safe
    pub idempotency_key: Option<String>,
    /// Additional metadata
    pub metadata: HashMap<String, String>,
}

/// An unattributed incoming fund movement from a bank feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: String,
    pub date: NaiveDate,
    pub amount: Money,
    pub currency: String,
    pub counterparty_name: Option<String>,
    pub counterparty_account: Option<String>,
    pub description: Option<String>,
    /// Numeric payment reference used in regional bank transfers
    pub variable_symbol: Option<String>,
    /// Set exactly once, by the match applier
    pub matched_invoice_id: Option<String>,
}

impl BankTransaction {
    pub fn is_matched(&self) -> bool {
        self.matched_invoice_id.is_some()
    }
}

/// Per-signal match factors computed for one candidate invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchFactors {
    /// Transaction amount equals the remaining balance (within epsilon)
    pub amount_match: bool,
    /// Decays with distance between transaction date and due/issue date
    pub date_proximity: f64,
    /// Variable symbol equals the reference derived from the invoice number
    pub vs_match: bool,
    /// Token-set overlap between counterparty and customer name
    pub name_match: f64,
    /// Overlap between transaction description and invoice metadata
    pub text_similarity: f64,
}

/// Qualitative confidence bands matching the operator-facing thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_score(confidence: f64) -> Self {
        if confidence >= 0.9 {
            ConfidenceLevel::High
        } else if confidence >= 0.7 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// A derived, non-persistent ranking artifact. Recomputed on demand and
/// never stored as ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSuggestion {
    pub invoice_id: String,
    /// Composite confidence in [0, 1]
    pub confidence: f64,
    /// Human-readable synthesis of which factors fired
    pub reason: String,
    pub factors: MatchFactors,
}

impl MatchSuggestion {
    pub fn confidence_level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_score(self.confidence)
    }
}

/// Errors that can occur in the reconciliation core.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("delta {requested} exceeds remaining balance {remaining}")]
    InsufficientRemainingBalance { requested: Money, remaining: Money },
    #[error("payment {requested} exceeds remaining balance {remaining}")]
    ExceedsRemainingBalance { requested: Money, remaining: Money },
    #[error("credit {requested} exceeds creditable amount {creditable}")]
    CreditExceedsInvoice { requested: Money, creditable: Money },
    #[error("invoice {0} is cancelled and immutable")]
    InvoiceCancelled(String),
    #[error("credit note {0} is not in draft state")]
    AlreadyIssued(String),
    #[error("credit note {0} has not been issued")]
    NotIssued(String),
    #[error("transaction {0} is already matched")]
    AlreadyMatched(String),
    #[error("a payment with idempotency key {0} is already recorded")]
    DuplicateIdempotencyKey(String),
    #[error("invoice {id} was modified concurrently (expected version {expected})")]
    VersionConflict { id: String, expected: u64 },
    #[error("invoice not found: {0}")]
    InvoiceNotFound(String),
    #[error("credit note not found: {0}")]
    CreditNoteNotFound(String),
    #[error("bank transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: String, actual: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),
}

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
