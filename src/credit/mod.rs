//! Credit note management: bounded reversals of an invoice's obligation

use chrono::Utc;
use uuid::Uuid;

use crate::ledger::{apply_delta, LedgerEntryKind, MAX_COMMIT_RETRIES};
use crate::money::Money;
use crate::traits::{ProportionalTaxSplit, ReconciliationStorage, TaxSplitPolicy};
use crate::types::*;
use crate::utils::validation::{validate_id, validate_positive_amount};

/// Manager for creating, issuing, and applying credit notes against the
/// invoice ledger.
pub struct CreditNoteManager<S: ReconciliationStorage> {
    storage: S,
    tax_split: Box<dyn TaxSplitPolicy>,
}

impl<S: ReconciliationStorage> CreditNoteManager<S> {
    /// Create a manager with the default proportional tax split.
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            tax_split: Box::new(ProportionalTaxSplit),
        }
    }

    /// Create a manager with a custom tax split policy.
    pub fn with_tax_split(storage: S, tax_split: Box<dyn TaxSplitPolicy>) -> Self {
        Self { storage, tax_split }
    }

    async fn get_invoice_required(&self, invoice_id: &str) -> ReconcileResult<Invoice> {
        self.storage
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| ReconcileError::InvoiceNotFound(invoice_id.to_string()))
    }

    async fn get_credit_note_required(&self, credit_note_id: &str) -> ReconcileResult<CreditNote> {
        self.storage
            .get_credit_note(credit_note_id)
            .await?
            .ok_or_else(|| ReconcileError::CreditNoteNotFound(credit_note_id.to_string()))
    }

    /// Gross amount still creditable against an invoice: its remaining
    /// balance minus what issued-but-unapplied credit notes reserve. Applied
    /// notes already sit in `amount_paid`, so issued and applied notes
    /// together can never exceed the invoice's original total, and a fully
    /// settled invoice credits nothing. Draft notes reserve nothing.
    pub async fn max_creditable(&self, invoice: &Invoice) -> ReconcileResult<Money> {
        let reserved: Money = self
            .storage
            .list_invoice_credit_notes(&invoice.id)
            .await?
            .into_iter()
            .filter(|note| note.status == CreditNoteStatus::Issued)
            .map(|note| note.total)
            .sum();
        invoice
            .amount_remaining
            .checked_sub(reserved)
            .ok_or_else(|| ReconcileError::Validation("credit reservation underflow".to_string()))
    }

    /// Create a draft credit note for `amount` against an invoice.
    ///
    /// Fails with [`ReconcileError::CreditExceedsInvoice`] when the amount
    /// exceeds what is still creditable (see [`Self::max_creditable`]). The
    /// gross amount is split into subtotal and tax by the injected
    /// [`TaxSplitPolicy`].
    pub async fn create(
        &mut self,
        invoice_id: &str,
        amount: Money,
        reason: &str,
    ) -> ReconcileResult<CreditNote> {
        validate_id(invoice_id, "invoice")?;
        validate_positive_amount(amount)?;
        let invoice = self.get_invoice_required(invoice_id).await?;
        if invoice.status == InvoiceStatus::Cancelled {
            return Err(ReconcileError::InvoiceCancelled(invoice.id));
        }

        let creditable = self.max_creditable(&invoice).await?;
        if amount > creditable {
            return Err(ReconcileError::CreditExceedsInvoice {
                requested: amount,
                creditable,
            });
        }

        let (subtotal, tax) = self.tax_split.split(&invoice, amount)?;
        let note = CreditNote {
            id: Uuid::new_v4().to_string(),
            invoice_id: invoice.id.clone(),
            subtotal,
            tax,
            total: amount,
            reason: reason.to_string(),
            status: CreditNoteStatus::Draft,
            issue_date: None,
            applied_at: None,
            created_at: Utc::now().naive_utc(),
        };
        self.storage.save_credit_note(&note).await?;

        tracing::info!(
            credit_note_id = %note.id,
            invoice_id = %invoice.id,
            amount = %amount,
            "created draft credit note"
        );
        Ok(note)
    }

    /// Activate a draft credit note, stamping its issue date.
    ///
    /// Only `Draft -> Issued` is legal; anything else fails with
    /// [`ReconcileError::AlreadyIssued`] and has no side effects. The
    /// creditable cap is re-validated here: drafts reserve nothing, so
    /// several drafts can each fit the cap at creation time while their sum
    /// does not, and the flip to `Issued` is where the reservation becomes
    /// binding. A flip that would push issued + applied notes past the
    /// invoice total fails with [`ReconcileError::CreditExceedsInvoice`].
    pub async fn issue(&mut self, credit_note_id: &str) -> ReconcileResult<CreditNote> {
        let mut note = self.get_credit_note_required(credit_note_id).await?;
        if note.status != CreditNoteStatus::Draft {
            return Err(ReconcileError::AlreadyIssued(note.id));
        }

        let invoice = self.get_invoice_required(&note.invoice_id).await?;
        if invoice.status == InvoiceStatus::Cancelled {
            return Err(ReconcileError::InvoiceCancelled(invoice.id));
        }
        let creditable = self.max_creditable(&invoice).await?;
        if note.total > creditable {
            return Err(ReconcileError::CreditExceedsInvoice {
                requested: note.total,
                creditable,
            });
        }

        note.status = CreditNoteStatus::Issued;
        note.issue_date = Some(Utc::now().date_naive());
        self.storage.update_credit_note(&note).await?;

        tracing::info!(credit_note_id = %note.id, invoice_id = %note.invoice_id, "issued credit note");
        Ok(note)
    }

    /// Apply an issued credit note to its invoice's balance.
    ///
    /// The note's flip to `Applied` and the ledger mutation commit as one
    /// atomic unit; neither ever lands without the other. A draft note
    /// fails with [`ReconcileError::NotIssued`]. Re-applying a note that is
    /// already `Applied` is a safe retry: it returns the stored note and
    /// the current invoice without mutating anything.
    pub async fn apply(
        &mut self,
        credit_note_id: &str,
    ) -> ReconcileResult<(CreditNote, Invoice)> {
        let mut attempts = 0;
        loop {
            let mut note = self.get_credit_note_required(credit_note_id).await?;
            match note.status {
                CreditNoteStatus::Draft => return Err(ReconcileError::NotIssued(note.id)),
                CreditNoteStatus::Applied => {
                    let invoice = self.get_invoice_required(&note.invoice_id).await?;
                    return Ok((note, invoice));
                }
                CreditNoteStatus::Issued => {}
            }

            let mut invoice = self.get_invoice_required(&note.invoice_id).await?;
            let expected = invoice.version;
            apply_delta(
                &mut invoice,
                note.total,
                LedgerEntryKind::Credit,
                Utc::now().date_naive(),
            )?;
            invoice.version = expected + 1;

            note.status = CreditNoteStatus::Applied;
            note.applied_at = Some(Utc::now().naive_utc());

            match self
                .storage
                .commit_credit_application(&invoice, expected, &note)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        credit_note_id = %note.id,
                        invoice_id = %invoice.id,
                        credited = %note.total,
                        remaining = %invoice.amount_remaining,
                        "applied credit note"
                    );
                    return Ok((note, invoice));
                }
                Err(ReconcileError::VersionConflict { .. }) if attempts + 1 < MAX_COMMIT_RETRIES => {
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
