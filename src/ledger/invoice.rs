//! Invoice state machine: balance deltas and status recomputation
//!
//! Every mutation of an invoice's paid/owed amounts flows through
//! [`apply_delta`], the single primitive that keeps `amount_paid +
//! amount_remaining == total` and recomputes status. Persistence-bound
//! callers (payment recorder, credit note manager, match applier) run the
//! same transition and commit it inside their own atomic storage unit.

use chrono::NaiveDate;

use crate::money::Money;
use crate::traits::ReconciliationStorage;
use crate::types::*;

/// Why a balance delta is being applied. Recorded in logs; a credit note
/// reduces the remaining balance exactly like a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEntryKind {
    Payment,
    Credit,
}

/// Bounded retries for optimistic-concurrency commits before the conflict
/// is surfaced to the caller.
pub const MAX_COMMIT_RETRIES: usize = 3;

/// Apply a positive balance delta to an invoice, in place.
///
/// Rejections leave the invoice untouched:
/// - [`ReconcileError::InvoiceCancelled`]: cancelled is a trap state
/// - [`ReconcileError::Validation`]: non-positive delta
/// - [`ReconcileError::InsufficientRemainingBalance`]: delta exceeds what
///   is owed
///
/// On success `amount_paid`/`amount_remaining` shift by `delta` and status
/// is recomputed: zero remaining flips to `Paid` (stamping `paid_date`),
/// anything paid with a rest owed is `Partial`, an unpaid invoice past its
/// due date is `Overdue`, otherwise the status is left unchanged.
pub fn apply_delta(
    invoice: &mut Invoice,
    delta: Money,
    kind: LedgerEntryKind,
    now: NaiveDate,
) -> ReconcileResult<()> {
    if invoice.status == InvoiceStatus::Cancelled {
        return Err(ReconcileError::InvoiceCancelled(invoice.id.clone()));
    }
    if !delta.is_positive() {
        return Err(ReconcileError::Validation(
            "ledger delta must be positive".to_string(),
        ));
    }
    if delta > invoice.amount_remaining {
        return Err(ReconcileError::InsufficientRemainingBalance {
            requested: delta,
            remaining: invoice.amount_remaining,
        });
    }

    invoice.amount_paid = invoice
        .amount_paid
        .checked_add(delta)
        .ok_or_else(|| ReconcileError::Validation("amount_paid overflow".to_string()))?;
    invoice.amount_remaining = invoice
        .amount_remaining
        .checked_sub(delta)
        .ok_or_else(|| ReconcileError::Validation("amount_remaining underflow".to_string()))?;

    recompute_status(invoice, now);
    invoice.updated_at = chrono::Utc::now().naive_utc();

    tracing::debug!(
        invoice_id = %invoice.id,
        ?kind,
        delta = %delta,
        remaining = %invoice.amount_remaining,
        status = ?invoice.status,
        "applied ledger delta"
    );

    Ok(())
}

fn recompute_status(invoice: &mut Invoice, now: NaiveDate) {
    if invoice.amount_remaining.is_zero() {
        invoice.status = InvoiceStatus::Paid;
        invoice.paid_date = Some(now);
    } else if invoice.amount_paid.is_positive() {
        invoice.status = InvoiceStatus::Partial;
    } else if now > invoice.due_date {
        invoice.status = InvoiceStatus::Overdue;
    }
    // else: unchanged from Sent/Draft
}

/// Storage-bound ledger for callers that mutate an invoice balance on its
/// own, outside a payment or credit-note commit unit.
pub struct InvoiceLedger<S: ReconciliationStorage> {
    storage: S,
}

impl<S: ReconciliationStorage> InvoiceLedger<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Get an invoice by ID, returning an error if not found
    pub async fn get_invoice_required(&self, invoice_id: &str) -> ReconcileResult<Invoice> {
        self.storage
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| ReconcileError::InvoiceNotFound(invoice_id.to_string()))
    }

    /// Apply a balance delta to a stored invoice.
    ///
    /// Read, transition, and commit under the invoice's version check;
    /// a concurrent writer triggers a bounded re-read/re-validate retry, so
    /// two racing mutations can never both pass a stale balance check.
    pub async fn apply_delta(
        &mut self,
        invoice_id: &str,
        delta: Money,
        kind: LedgerEntryKind,
    ) -> ReconcileResult<Invoice> {
        let mut attempts = 0;
        loop {
            let mut invoice = self.get_invoice_required(invoice_id).await?;
            let expected = invoice.version;
            apply_delta(&mut invoice, delta, kind, chrono::Utc::now().date_naive())?;
            invoice.version = expected + 1;

            match self.storage.commit_invoice(&invoice, expected).await {
                Ok(()) => return Ok(invoice),
                Err(ReconcileError::VersionConflict { .. }) if attempts + 1 < MAX_COMMIT_RETRIES => {
                    attempts += 1;
                    tracing::debug!(invoice_id, attempts, "ledger commit conflicted, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
