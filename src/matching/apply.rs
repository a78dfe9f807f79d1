//! Committing operator-confirmed matches

use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

use crate::ledger::{apply_delta, LedgerEntryKind, MAX_COMMIT_RETRIES};
use crate::traits::ReconciliationStorage;
use crate::types::*;
use crate::utils::validation::{validate_currency, validate_id, validate_positive_amount};

/// The three records committed together by a confirmed match.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub transaction: BankTransaction,
    pub payment: Payment,
    pub invoice: Invoice,
}

/// Applies an operator-confirmed match: records the transaction amount as a
/// bank-reconciliation payment and marks the transaction consumed.
pub struct MatchApplier<S: ReconciliationStorage> {
    storage: S,
}

impl<S: ReconciliationStorage> MatchApplier<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    async fn get_invoice_required(&self, invoice_id: &str) -> ReconcileResult<Invoice> {
        self.storage
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| ReconcileError::InvoiceNotFound(invoice_id.to_string()))
    }

    async fn get_transaction_required(
        &self,
        transaction_id: &str,
    ) -> ReconcileResult<BankTransaction> {
        self.storage
            .get_bank_transaction(transaction_id)
            .await?
            .ok_or_else(|| ReconcileError::TransactionNotFound(transaction_id.to_string()))
    }

    /// Commit a confirmed match of a bank transaction to an invoice.
    ///
    /// Validates that the transaction is still unmatched
    /// ([`ReconcileError::AlreadyMatched`] otherwise) and the invoice is
    /// open, then commits the transaction marking, the payment record, and
    /// the ledger update as one atomic unit. A lost version race triggers
    /// bounded re-validation, so concurrent confirmations of the same
    /// transaction resolve to one success and one `AlreadyMatched`.
    pub async fn confirm_match(
        &mut self,
        transaction_id: &str,
        invoice_id: &str,
    ) -> ReconcileResult<MatchOutcome> {
        validate_id(transaction_id, "transaction")?;
        validate_id(invoice_id, "invoice")?;
        let mut attempts = 0;
        loop {
            let mut transaction = self.get_transaction_required(transaction_id).await?;
            if transaction.is_matched() {
                return Err(ReconcileError::AlreadyMatched(transaction.id));
            }

            let mut invoice = self.get_invoice_required(invoice_id).await?;
            validate_currency(&invoice.currency, &transaction.currency)?;
            validate_positive_amount(transaction.amount)?;

            let expected = invoice.version;
            apply_delta(
                &mut invoice,
                transaction.amount,
                LedgerEntryKind::Payment,
                Utc::now().date_naive(),
            )
            .map_err(|err| match err {
                ReconcileError::InsufficientRemainingBalance {
                    requested,
                    remaining,
                } => ReconcileError::ExceedsRemainingBalance {
                    requested,
                    remaining,
                },
                other => other,
            })?;
            invoice.version = expected + 1;

            transaction.matched_invoice_id = Some(invoice.id.clone());
            let payment = Payment {
                id: Uuid::new_v4().to_string(),
                invoice_id: invoice.id.clone(),
                amount: transaction.amount,
                currency: transaction.currency.clone(),
                method: PaymentMethod::BankReconciliation,
                status: PaymentStatus::Completed,
                completed_at: Utc::now().naive_utc(),
                notes: transaction.description.clone(),
                idempotency_key: Some(format!("bank-txn:{}", transaction.id)),
                metadata: HashMap::from([(
                    "bank_transaction_id".to_string(),
                    transaction.id.clone(),
                )]),
            };

            match self
                .storage
                .commit_match_application(&invoice, expected, &payment, &transaction)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        transaction_id = %transaction.id,
                        invoice_id = %invoice.id,
                        amount = %transaction.amount,
                        status = ?invoice.status,
                        "confirmed bank transaction match"
                    );
                    return Ok(MatchOutcome {
                        transaction,
                        payment,
                        invoice,
                    });
                }
                Err(ReconcileError::VersionConflict { .. }) if attempts + 1 < MAX_COMMIT_RETRIES => {
                    attempts += 1;
                    tracing::debug!(transaction_id, attempts, "match commit conflicted, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
