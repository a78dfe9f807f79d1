//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use bigdecimal::{BigDecimal, One};

use crate::money::Money;
use crate::types::*;

/// Storage abstraction for the reconciliation core.
///
/// This trait allows the engine to work with any transactional backend
/// (PostgreSQL, MySQL, SQLite, in-memory, etc.). Plain reads may serve a
/// consistent snapshot; the `commit_*` methods are **atomic units**: a SQL
/// implementation wraps each in one database transaction, and every unit
/// validates `expected_version` against the stored invoice, failing with
/// [`ReconcileError::VersionConflict`] without writing anything if another
/// writer got there first. Callers pass the invoice with its version
/// already bumped to `expected_version + 1`.
///
/// Transient backend failures surface as
/// [`ReconcileError::PersistenceUnavailable`]; callers may retry the whole
/// operation with the same idempotency key.
#[async_trait]
pub trait ReconciliationStorage: Send + Sync {
    /// Get an invoice by ID
    async fn get_invoice(&self, invoice_id: &str) -> ReconcileResult<Option<Invoice>>;

    /// List a tenant's open invoices (non-cancelled, non-fully-paid)
    async fn list_open_invoices(&self, tenant_id: &str) -> ReconcileResult<Vec<Invoice>>;

    /// Save a new invoice (seeding; invoices are created by external workflows)
    async fn save_invoice(&mut self, invoice: &Invoice) -> ReconcileResult<()>;

    /// Commit a bare ledger mutation under the version check
    async fn commit_invoice(&mut self, invoice: &Invoice, expected_version: u64)
        -> ReconcileResult<()>;

    /// Get a credit note by ID
    async fn get_credit_note(&self, credit_note_id: &str) -> ReconcileResult<Option<CreditNote>>;

    /// List all credit notes raised against one invoice
    async fn list_invoice_credit_notes(&self, invoice_id: &str)
        -> ReconcileResult<Vec<CreditNote>>;

    /// Save a new credit note
    async fn save_credit_note(&mut self, credit_note: &CreditNote) -> ReconcileResult<()>;

    /// Update an existing credit note (status transitions short of Applied)
    async fn update_credit_note(&mut self, credit_note: &CreditNote) -> ReconcileResult<()>;

    /// Get a payment by ID
    async fn get_payment(&self, payment_id: &str) -> ReconcileResult<Option<Payment>>;

    /// Look up a previously recorded payment by its idempotency key
    async fn find_payment_by_idempotency_key(&self, key: &str)
        -> ReconcileResult<Option<Payment>>;

    /// Get a bank transaction by ID
    async fn get_bank_transaction(
        &self,
        transaction_id: &str,
    ) -> ReconcileResult<Option<BankTransaction>>;

    /// Save a new (unmatched) bank transaction
    async fn save_bank_transaction(&mut self, transaction: &BankTransaction)
        -> ReconcileResult<()>;

    /// Atomically commit a ledger update together with its payment record.
    /// Never records a payment without the balance change, or the reverse.
    /// The payment's idempotency key is a unique constraint: a key already
    /// indexed fails the whole unit with
    /// [`ReconcileError::DuplicateIdempotencyKey`] without writing, so two
    /// writers racing the same key can never both land.
    async fn commit_payment_application(
        &mut self,
        invoice: &Invoice,
        expected_version: u64,
        payment: &Payment,
    ) -> ReconcileResult<()>;

    /// Atomically commit a ledger update together with the credit note's
    /// flip to `Applied`.
    async fn commit_credit_application(
        &mut self,
        invoice: &Invoice,
        expected_version: u64,
        credit_note: &CreditNote,
    ) -> ReconcileResult<()>;

    /// Atomically commit a confirmed match: ledger update, payment record,
    /// and the transaction marked as matched. Fails with `AlreadyMatched`
    /// if the stored transaction was matched in the meantime.
    async fn commit_match_application(
        &mut self,
        invoice: &Invoice,
        expected_version: u64,
        payment: &Payment,
        transaction: &BankTransaction,
    ) -> ReconcileResult<()>;
}

/// Policy for splitting a gross credited amount into subtotal and tax.
///
/// The default proportional split assumes a uniform tax rate across the
/// invoice's line items, which under- or over-states the tax portion for
/// mixed-rate invoices. Inject a custom policy where line-item data is
/// available.
pub trait TaxSplitPolicy: Send + Sync {
    /// Split `amount` into `(subtotal, tax)` summing exactly to `amount`.
    fn split(&self, invoice: &Invoice, amount: Money) -> ReconcileResult<(Money, Money)>;
}

/// Best-effort proportional split using the invoice's effective tax rate
/// `invoice.tax / invoice.subtotal`.
pub struct ProportionalTaxSplit;

impl TaxSplitPolicy for ProportionalTaxSplit {
    fn split(&self, invoice: &Invoice, amount: Money) -> ReconcileResult<(Money, Money)> {
        // Zero-subtotal invoices carry no derivable rate; the whole credit
        // is treated as net.
        if !invoice.subtotal.is_positive() {
            return Ok((amount, Money::zero()));
        }

        let rate = invoice.tax.to_decimal() / invoice.subtotal.to_decimal();
        let gross_factor = BigDecimal::one() + rate;
        let subtotal = Money::from_decimal_rounded(&(amount.to_decimal() / gross_factor))
            .ok_or_else(|| {
                ReconcileError::Validation("credit amount out of range for tax split".to_string())
            })?;
        let tax = amount.checked_sub(subtotal).ok_or_else(|| {
            ReconcileError::Validation("credit amount out of range for tax split".to_string())
        })?;

        Ok((subtotal, tax))
    }
}
